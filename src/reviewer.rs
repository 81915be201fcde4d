use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::coordinator::{CommitReport, TransactionCoordinator};
use crate::error::{Result, TallyError};
use crate::extractor::{invalid_fields, month_folder};
use crate::models::Record;
use crate::workspace::Workspace;

/// Corrected fields for a record the extractor could not read.
#[derive(Debug, Clone, Default)]
pub struct ManualEntry {
    pub date: String,
    pub amount: String,
    pub merchant: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub query: Option<String>,
    pub category: Option<String>,
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(category) = &self.category {
            if record.category != *category {
                return false;
            }
        }
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                [&record.merchant, &record.description, &record.category]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&q))
            }
            _ => true,
        }
    }

    /// Matching records with their pending index.
    pub fn apply(&self, records: &[Record]) -> Vec<(usize, Record)> {
        records
            .iter()
            .enumerate()
            .filter(|(_, r)| self.matches(r))
            .map(|(i, r)| (i, r.clone()))
            .collect()
    }
}

/// Apply `f` to the pending record at `index` and persist, undoing the edit if
/// the write fails.
fn edit_pending<F>(ws: &Workspace, index: usize, f: F) -> Result<Record>
where
    F: FnOnce(&mut Record),
{
    let before = ws.data().get_pending(index).ok_or(TallyError::NoSuchRecord(index))?;
    let after = ws.data().update_pending(index, f).ok_or(TallyError::NoSuchRecord(index))?;
    if let Err(e) = ws.persist_pending() {
        ws.data().update_pending(index, |r| *r = before);
        return Err(e);
    }
    Ok(after)
}

/// A blank category clears the field; anything else must be one of the
/// configured categories.
fn check_category(ws: &Workspace, category: &str) -> Result<()> {
    let category = category.trim();
    let allowed = &ws.settings().categories;
    if category.is_empty() || allowed.is_empty() || allowed.iter().any(|a| a == category) {
        return Ok(());
    }
    Err(TallyError::Validation(format!("category '{category}' is not configured")))
}

pub fn set_category(ws: &Workspace, index: usize, category: &str) -> Result<Record> {
    check_category(ws, category)?;
    edit_pending(ws, index, |r| r.apply_category(category))
}

pub fn set_description(ws: &Workspace, index: usize, text: &str) -> Result<Record> {
    let text = text.trim().to_string();
    edit_pending(ws, index, |r| r.description = text)
}

pub fn suggestion_for(ws: &Workspace, index: usize) -> Result<Option<String>> {
    let record = ws.data().get_pending(index).ok_or(TallyError::NoSuchRecord(index))?;
    Ok(ws.suggest(&record.merchant))
}

/// Move a pending record into the ledger.
///
/// The record stays in the pending set until the ledger append has succeeded,
/// so a pending rewrite from another thread can never drop it. A failure to
/// learn from the confirmation does not undo the completion.
pub fn mark_done(ws: &Workspace, index: usize, category: Option<&str>) -> Result<Record> {
    let mut done = ws.data().get_pending(index).ok_or(TallyError::NoSuchRecord(index))?;
    if let Some(category) = category {
        check_category(ws, category)?;
        done.apply_category(category);
    }
    let done = done.complete(Utc::now());

    ws.store().append_completed(&done)?;
    if !ws.data().append_completed(done.clone()) {
        warn!(digest = %done.digest, "Completed record had already left the pending set");
    }
    info!(digest = %done.digest, merchant = %done.merchant, "Marked done");

    // the ledger wins on next open if this rewrite is lost
    if let Err(e) = ws.persist_pending() {
        warn!(error = %e, "Pending set not rewritten after completion");
    }

    if !done.category.trim().is_empty() {
        if let Err(e) = ws.learn(&done.merchant, &done.category) {
            error!(merchant = %done.merchant, error = %e, "Could not save merchant knowledge");
        }
    }
    Ok(done)
}

/// Complete several records. Indices refer to the pending set before the call.
pub fn mark_done_many(ws: &Workspace, indices: &[usize], category: Option<&str>) -> Result<Vec<Record>> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut done = Vec::with_capacity(sorted.len());
    for index in sorted.into_iter().rev() {
        done.push(mark_done(ws, index, category)?);
    }
    done.reverse();
    Ok(done)
}

/// Replace the extracted fields of a quarantined record and file it under its
/// month folder. Nothing changes when the entry does not validate.
pub fn resolve_attention(
    ws: &Workspace,
    index: usize,
    entry: ManualEntry,
    dest_root: &Path,
) -> Result<(Record, CommitReport)> {
    let merchant = entry.merchant.trim().to_string();
    let bad = invalid_fields(&entry.date, &entry.amount, &merchant);
    if !bad.is_empty() {
        return Err(TallyError::Validation(format!("invalid {}", bad.join(", "))));
    }
    let category = entry.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
    if let Some(c) = category {
        check_category(ws, c)?;
    }

    let before = ws.data().get_pending(index).ok_or(TallyError::NoSuchRecord(index))?;
    let month = month_folder(&entry.date)
        .ok_or_else(|| TallyError::Validation(format!("invalid date {}", entry.date)))?;

    let mut tc = TransactionCoordinator::new();
    let new_path = tc.stage_move(&before.path, &dest_root.join(month));

    let mut updated = before.clone();
    updated.date = entry.date.clone();
    updated.amount = entry.amount.clone();
    updated.merchant = merchant;
    updated.path = new_path;
    if let Some(c) = category {
        updated.apply_category(c);
    }

    let report = tc.commit(|| {
        ws.data().update_pending(index, |r| *r = updated.clone());
        ws.persist_pending().map_err(|e| {
            ws.data().update_pending(index, |r| *r = before.clone());
            e
        })
    })?;
    info!(digest = %updated.digest, path = %updated.path.display(), "Resolved quarantined record");
    Ok((updated, report))
}

#[derive(Debug, Default)]
pub struct DeleteReport {
    pub removed: Vec<Record>,
    /// Screenshots that could not be removed, with the error text.
    pub kept_files: Vec<(PathBuf, String)>,
}

/// Drop pending records and their screenshots. Indices refer to the pending
/// set before the call; one bad index rejects the whole batch.
///
/// The digests are forgotten, so the same bytes can be scanned in again.
/// Files are removed only after the pending set has been rewritten.
pub fn delete_many(ws: &Workspace, indices: &[usize]) -> Result<DeleteReport> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let pending = ws.data().pending();
    if let Some(&bad) = sorted.iter().find(|&&i| i >= pending.len()) {
        return Err(TallyError::NoSuchRecord(bad));
    }
    let targets: Vec<(usize, Record)> = sorted.iter().map(|&i| (i, pending[i].clone())).collect();

    for (index, record) in targets.iter().rev() {
        ws.data().remove_pending(*index);
        ws.data().forget(&record.digest);
    }
    if let Err(e) = ws.persist_pending() {
        for (index, record) in &targets {
            ws.data().insert_pending(*index, record.clone());
        }
        return Err(e);
    }

    let mut report = DeleteReport::default();
    for (_, record) in targets {
        match std::fs::remove_file(&record.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %record.path.display(), error = %e, "Screenshot not deleted");
                report.kept_files.push((record.path.clone(), e.to_string()));
            }
        }
        info!(digest = %record.digest, merchant = %record.merchant, "Deleted pending record");
        report.removed.push(record);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::categorizer::KNOWLEDGE_FILE;
    use crate::extractor::Extractor;
    use crate::models::{ExtractionEntry, RecordStatus, QUARANTINE_DIR};
    use crate::workspace::tests::{record, test_settings};
    use crate::worker::IngestionWorker;

    fn test_ws() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(test_settings(dir.path())).unwrap();
        (dir, ws)
    }

    fn seeded() -> (tempfile::TempDir, Workspace) {
        let (dir, ws) = test_ws();
        ws.add_pending(record("a")).unwrap();
        ws.add_pending(Record {
            merchant: "Opal Travel".into(),
            ..record("b")
        })
        .unwrap();
        (dir, ws)
    }

    #[test]
    fn test_full_aldi_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::open(test_settings(dir.path())).unwrap());
        let inbox = dir.path().join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();
        std::fs::write(inbox.join("Screenshot_20250914_1.jpg"), b"aldi").unwrap();

        let extractor: Arc<dyn Extractor> = Arc::new(|_: &Path| -> Result<ExtractionEntry> {
            Ok(ExtractionEntry {
                merchant: "ALDI".into(),
                amount: "-$12.30".into(),
                date: "14092025".into(),
                subcategory: "Groceries".into(),
                needs_attention: false,
                error: None,
            })
        });
        let (tx, _rx) = crossbeam::channel::unbounded();
        let shots = dir.path().join("shots");
        let summary = IngestionWorker::new(Arc::clone(&ws), extractor).run(&inbox, &shots, &tx);
        assert_eq!(summary.processed, 1);
        assert!(shots.join("2025-09").join("Screenshot_20250914_1.jpg").exists());

        let done = mark_done(&ws, 0, Some("Food")).unwrap();
        assert_eq!(done.status, RecordStatus::Done);
        assert!(done.completed_at.is_some());

        let ledger = ws.store().load_completed().unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].category, "Food");
        assert_eq!(ledger[0].merchant, "ALDI");
        assert!(ledger[0].completed_at.is_some());
        assert!(ws.store().load_pending().unwrap().is_empty());

        let knowledge = crate::categorizer::SuggestionEngine::load(&dir.path().join("data").join(KNOWLEDGE_FILE), 100);
        assert_eq!(knowledge.len(), 1);
        assert_eq!(knowledge.get_suggestion("aldi", 1).as_deref(), Some("Food"));
        assert_eq!(knowledge.get_suggestion("ALDI", 2), None);
    }

    #[test]
    fn test_set_category_updates_description_and_persists() {
        let (_dir, ws) = seeded();
        set_description(&ws, 0, "weekly shop").unwrap();
        let r = set_category(&ws, 0, "Food").unwrap();
        assert_eq!(r.description, "Food - weekly shop");
        assert_eq!(ws.store().load_pending().unwrap()[0].category, "Food");
    }

    #[test]
    fn test_edit_unknown_index() {
        let (_dir, ws) = seeded();
        assert!(matches!(set_category(&ws, 9, "Food"), Err(TallyError::NoSuchRecord(9))));
        assert!(matches!(mark_done(&ws, 9, None), Err(TallyError::NoSuchRecord(9))));
    }

    #[test]
    fn test_failed_edit_is_undone() {
        let (dir, ws) = seeded();
        std::fs::remove_dir_all(dir.path().join("data")).unwrap();
        assert!(set_category(&ws, 0, "Food").is_err());
        assert_eq!(ws.data().get_pending(0).unwrap().category, "");
    }

    #[test]
    fn test_failed_ledger_append_leaves_record_pending() {
        let (_dir, ws) = seeded();
        let ledger = ws.store().completed_path();
        std::fs::remove_file(&ledger).unwrap();
        std::fs::create_dir(&ledger).unwrap();

        assert!(mark_done(&ws, 1, Some("Transport")).is_err());
        let pending = ws.data().pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].digest, "b");
        assert_eq!(pending[1].category, "");
        assert_eq!(ws.data().completed_len(), 0);

        // a later rewrite of the pending set still carries the record
        ws.add_pending(record("c")).unwrap();
        let on_disk: Vec<_> = ws.store().load_pending().unwrap().into_iter().map(|r| r.digest).collect();
        assert_eq!(on_disk, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_completions_alongside_adds_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        let ws = Arc::new(Workspace::open(settings.clone()).unwrap());
        for i in 0..10 {
            ws.add_pending(record(&format!("seed{i}"))).unwrap();
        }

        let adder = {
            let ws = Arc::clone(&ws);
            std::thread::spawn(move || {
                for i in 0..50 {
                    ws.add_pending(record(&format!("new{i}"))).unwrap();
                }
            })
        };
        for _ in 0..10 {
            let seed = ws.data().pending().iter().position(|r| r.digest.starts_with("seed")).unwrap();
            mark_done(&ws, seed, None).unwrap();
        }
        adder.join().unwrap();
        drop(ws);

        let ws = Workspace::open(settings).unwrap();
        let mut seen: Vec<String> = ws
            .store()
            .load_pending()
            .unwrap()
            .into_iter()
            .chain(ws.store().load_completed().unwrap())
            .map(|r| r.digest)
            .collect();
        assert_eq!(seen.len(), 60);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 60);
        assert_eq!(ws.data().completed_len(), 10);
        assert_eq!(ws.data().pending_len(), 50);
    }

    #[test]
    fn test_unconfigured_category_is_refused() {
        let (_dir, ws) = seeded();
        let err = set_category(&ws, 0, "Holidays").unwrap_err();
        assert!(matches!(err, TallyError::Validation(_)));
        assert!(matches!(mark_done(&ws, 0, Some("Holidays")), Err(TallyError::Validation(_))));
        assert_eq!(ws.data().get_pending(0).unwrap(), record("a"));
        assert_eq!(ws.store().load_pending().unwrap()[0], record("a"));
        assert_eq!(ws.data().completed_len(), 0);

        // blank clears, whatever is configured
        set_category(&ws, 0, "Food").unwrap();
        assert_eq!(set_category(&ws, 0, "  ").unwrap().category, "");
    }

    #[test]
    fn test_delete_many_forgets_records_and_files() {
        let (dir, ws) = test_ws();
        let shots = dir.path().join("shots");
        std::fs::create_dir_all(&shots).unwrap();
        for d in ["a", "b", "c"] {
            let path = shots.join(format!("Screenshot_{d}.jpg"));
            std::fs::write(&path, d).unwrap();
            ws.add_pending(Record { path, ..record(d) }).unwrap();
        }

        let report = delete_many(&ws, &[2, 0, 2]).unwrap();
        let removed: Vec<_> = report.removed.iter().map(|r| r.digest.as_str()).collect();
        assert_eq!(removed, vec!["a", "c"]);
        assert!(report.kept_files.is_empty());
        assert!(!shots.join("Screenshot_a.jpg").exists());
        assert!(shots.join("Screenshot_b.jpg").exists());
        assert!(!shots.join("Screenshot_c.jpg").exists());

        assert!(!ws.data().is_known("a"));
        assert!(ws.data().is_known("b"));
        let on_disk: Vec<_> = ws.store().load_pending().unwrap().into_iter().map(|r| r.digest).collect();
        assert_eq!(on_disk, vec!["b"]);
    }

    #[test]
    fn test_delete_many_rejects_bad_index_before_touching_anything() {
        let (_dir, ws) = seeded();
        assert!(matches!(delete_many(&ws, &[0, 5]), Err(TallyError::NoSuchRecord(5))));
        assert_eq!(ws.data().pending_len(), 2);
    }

    #[test]
    fn test_failed_delete_puts_records_back() {
        let (dir, ws) = seeded();
        ws.add_pending(record("c")).unwrap();
        std::fs::remove_dir_all(dir.path().join("data")).unwrap();

        assert!(delete_many(&ws, &[0, 2]).is_err());
        let digests: Vec<_> = ws.data().pending().into_iter().map(|r| r.digest).collect();
        assert_eq!(digests, vec!["a", "b", "c"]);
        assert!(ws.data().is_known("a"));
        assert!(ws.data().is_known("c"));
    }

    #[test]
    fn test_learning_failure_keeps_completion() {
        let (dir, ws) = seeded();
        // a directory where the knowledge file should be makes its save fail
        std::fs::create_dir_all(dir.path().join("data").join(KNOWLEDGE_FILE)).unwrap();
        let done = mark_done(&ws, 0, Some("Food")).unwrap();
        assert!(done.is_done());
        assert_eq!(ws.store().load_completed().unwrap().len(), 1);
        assert_eq!(ws.knowledge_len(), 0);
    }

    #[test]
    fn test_mark_done_many_uses_indices_from_before_the_call() {
        let (_dir, ws) = seeded();
        ws.add_pending(record("c")).unwrap();
        let done = mark_done_many(&ws, &[0, 2], None).unwrap();
        let digests: Vec<_> = done.iter().map(|r| r.digest.as_str()).collect();
        assert_eq!(digests, vec!["a", "c"]);
        assert_eq!(ws.data().pending()[0].digest, "b");
    }

    #[test]
    fn test_resolve_attention_moves_and_updates() {
        let (dir, ws) = test_ws();
        let quarantine = dir.path().join("shots").join(QUARANTINE_DIR);
        std::fs::create_dir_all(&quarantine).unwrap();
        let path = quarantine.join("Screenshot_x.jpg");
        std::fs::write(&path, b"x").unwrap();
        ws.add_pending(Record {
            path: path.clone(),
            merchant: "Error".into(),
            ..record("q")
        })
        .unwrap();

        let entry = ManualEntry {
            date: "03032025".into(),
            amount: "-$4.50".into(),
            merchant: " Bakers Delight ".into(),
            category: Some("Food".into()),
        };
        let (updated, report) = resolve_attention(&ws, 0, entry, &dir.path().join("shots")).unwrap();
        assert!(report.is_clean());
        let expected = dir.path().join("shots").join("2025-03").join("Screenshot_x.jpg");
        assert_eq!(updated.path, expected);
        assert_eq!(updated.merchant, "Bakers Delight");
        assert_eq!(updated.category, "Food");
        assert!(expected.exists());
        assert_eq!(ws.store().load_pending().unwrap()[0], updated);
    }

    #[test]
    fn test_resolve_attention_rejects_bad_fields() {
        let (dir, ws) = seeded();
        let entry = ManualEntry {
            date: "31022025".into(),
            amount: "$0.00".into(),
            merchant: "ALDI".into(),
            category: None,
        };
        let err = resolve_attention(&ws, 0, entry, dir.path()).unwrap_err();
        assert!(matches!(err, TallyError::Validation(_)));
        assert_eq!(ws.data().pending()[0], record("a"));
    }

    #[test]
    fn test_filter() {
        let (_dir, ws) = seeded();
        set_category(&ws, 1, "Transport").unwrap();
        let all = ws.data().pending();
        let by_query = RecordFilter {
            query: Some("opal".into()),
            category: None,
        };
        assert_eq!(by_query.apply(&all).len(), 1);
        assert_eq!(by_query.apply(&all)[0].0, 1);
        let by_category = RecordFilter {
            query: None,
            category: Some("Transport".into()),
        };
        assert_eq!(by_category.apply(&all).len(), 1);
        assert_eq!(RecordFilter::default().apply(&all).len(), 2);
    }
}
