use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::atomic::atomic_rewrite;
use crate::error::Result;
use crate::models::{Record, RecordStatus};

pub const PENDING_FILE: &str = "pending.csv";
pub const COMPLETED_FILE: &str = "completed.csv";

pub const PENDING_HEADER: [&str; 9] = [
    "digest", "filename", "path", "date", "amount", "merchant", "category", "description", "status",
];
pub const COMPLETED_HEADER: [&str; 10] = [
    "digest", "filename", "path", "date", "amount", "merchant", "category", "description", "status",
    "completed_at",
];

#[derive(Serialize)]
struct PendingRowRef<'a> {
    digest: &'a str,
    filename: &'a str,
    path: &'a Path,
    date: &'a str,
    amount: &'a str,
    merchant: &'a str,
    category: &'a str,
    description: &'a str,
    status: RecordStatus,
}

impl<'a> From<&'a Record> for PendingRowRef<'a> {
    fn from(r: &'a Record) -> Self {
        Self {
            digest: &r.digest,
            filename: &r.filename,
            path: &r.path,
            date: &r.date,
            amount: &r.amount,
            merchant: &r.merchant,
            category: &r.category,
            description: &r.description,
            status: RecordStatus::Pending,
        }
    }
}

#[derive(Deserialize)]
struct PendingRow {
    digest: String,
    filename: String,
    path: PathBuf,
    date: String,
    amount: String,
    merchant: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    description: String,
    status: String,
}

impl PendingRow {
    fn into_record(self) -> Option<Record> {
        if !self.status.trim().eq_ignore_ascii_case("pending") {
            return None;
        }
        Some(Record {
            digest: self.digest,
            filename: self.filename,
            path: self.path,
            date: self.date,
            amount: self.amount,
            merchant: self.merchant,
            category: self.category,
            description: self.description,
            status: RecordStatus::Pending,
            completed_at: None,
        })
    }
}

/// Owns the two record files: a rewritable pending set and an append-only ledger.
pub struct PersistenceStore {
    data_dir: PathBuf,
}

impl PersistenceStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
        }
    }

    pub fn pending_path(&self) -> PathBuf {
        self.data_dir.join(PENDING_FILE)
    }

    pub fn completed_path(&self) -> PathBuf {
        self.data_dir.join(COMPLETED_FILE)
    }

    pub fn ensure_files(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let pending = self.pending_path();
        if !pending.exists() {
            atomic_rewrite(&pending, |out| write_header(out, &PENDING_HEADER))?;
        }
        let completed = self.completed_path();
        if !completed.exists() {
            atomic_rewrite(&completed, |out| write_header(out, &COMPLETED_HEADER))?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pending working set
    // -----------------------------------------------------------------------

    /// Replace the whole pending set.
    pub fn save_pending(&self, records: &[Record]) -> Result<()> {
        atomic_rewrite(&self.pending_path(), |out| {
            let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(out);
            wtr.write_record(PENDING_HEADER)?;
            for r in records {
                wtr.serialize(PendingRowRef::from(r))?;
            }
            wtr.flush()
        })?;
        debug!(rows = records.len(), "Saved pending set");
        Ok(())
    }

    pub fn load_pending(&self) -> Result<Vec<Record>> {
        let path = self.pending_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&path)?;
        let mut records = Vec::new();
        for (i, row) in rdr.deserialize::<PendingRow>().enumerate() {
            match row {
                Ok(row) => {
                    if let Some(record) = row.into_record() {
                        records.push(record);
                    }
                }
                Err(e) => warn!(path = %path.display(), row = i + 1, error = %e, "Skipping unreadable pending row"),
            }
        }
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Completed ledger
    // -----------------------------------------------------------------------

    /// Append one completed record as a single write, then fsync.
    ///
    /// A trailing fragment left by an interrupted append is cut off first.
    pub fn append_completed(&self, record: &Record) -> Result<()> {
        let path = self.completed_path();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let len = truncate_torn_tail(&mut file, &path)?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if len == 0 {
            wtr.write_record(COMPLETED_HEADER)?;
        }
        wtr.serialize(record)?;
        let buf = wtr.into_inner().map_err(|e| e.into_error())?;

        file.write_all(&buf)?;
        file.flush()?;
        file.sync_all()?;
        debug!(digest = %record.digest, "Appended to ledger");
        Ok(())
    }

    pub fn load_completed(&self) -> Result<Vec<Record>> {
        let path = self.completed_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut data = fs::read(&path)?;
        if let Some(end) = complete_prefix_len(&data) {
            if end < data.len() {
                warn!(path = %path.display(), bytes = data.len() - end, "Ignoring torn ledger tail");
                data.truncate(end);
            }
        }

        let mut rdr = csv::Reader::from_reader(data.as_slice());
        let mut records = Vec::new();
        for (i, row) in rdr.deserialize::<Record>().enumerate() {
            match row {
                Ok(record) if record.is_done() => records.push(record),
                Ok(record) => {
                    warn!(path = %path.display(), row = i + 1, digest = %record.digest, "Skipping ledger row not marked done")
                }
                Err(e) => warn!(path = %path.display(), row = i + 1, error = %e, "Skipping unreadable ledger row"),
            }
        }
        Ok(records)
    }
}

fn write_header(out: &mut dyn Write, header: &[&str]) -> std::io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    wtr.write_record(header)?;
    wtr.flush()
}

/// Length of the newline-terminated prefix, or `None` when the data is empty
/// or already ends with a newline.
fn complete_prefix_len(data: &[u8]) -> Option<usize> {
    match data.last() {
        None | Some(b'\n') => None,
        Some(_) => Some(data.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1)),
    }
}

/// Returns the file length after any torn tail has been removed.
fn truncate_torn_tail(file: &mut File, path: &Path) -> Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(len);
    }

    file.seek(SeekFrom::Start(0))?;
    let mut data = Vec::with_capacity(len as usize);
    file.read_to_end(&mut data)?;
    let keep = complete_prefix_len(&data).unwrap_or(data.len()) as u64;
    warn!(path = %path.display(), bytes = len - keep, "Truncating torn ledger tail");
    file.set_len(keep)?;
    file.sync_all()?;
    Ok(keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn test_store() -> (tempfile::TempDir, PersistenceStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        store.ensure_files().unwrap();
        (dir, store)
    }

    fn record(n: usize) -> Record {
        Record {
            digest: format!("{n:064x}"),
            filename: format!("Screenshot_2025091{n}_1.jpg"),
            path: PathBuf::from(format!("/shots/2025-09/Screenshot_2025091{n}_1.jpg")),
            date: "14092025".into(),
            amount: "-$12.30".into(),
            merchant: "ALDI, Marrickville".into(),
            category: "Food".into(),
            description: "Food - \"weekly\" shop".into(),
            status: RecordStatus::Pending,
            completed_at: None,
        }
    }

    fn done(n: usize) -> Record {
        record(n).complete(Utc.with_ymd_and_hms(2025, 9, 20, 8, 30, 0).unwrap())
    }

    #[test]
    fn test_ensure_files_writes_headers() {
        let (_dir, store) = test_store();
        let pending = fs::read_to_string(store.pending_path()).unwrap();
        let completed = fs::read_to_string(store.completed_path()).unwrap();
        assert_eq!(pending, "digest,filename,path,date,amount,merchant,category,description,status\n");
        assert!(completed.trim_end().ends_with("status,completed_at"));
        assert!(store.load_pending().unwrap().is_empty());
        assert!(store.load_completed().unwrap().is_empty());
    }

    #[test]
    fn test_pending_save_and_load() {
        let (_dir, store) = test_store();
        let records = vec![record(1), record(2)];
        store.save_pending(&records).unwrap();
        assert_eq!(store.load_pending().unwrap(), records);
    }

    #[test]
    fn test_empty_pending_keeps_header() {
        let (_dir, store) = test_store();
        store.save_pending(&[record(1)]).unwrap();
        store.save_pending(&[]).unwrap();
        let text = fs::read_to_string(store.pending_path()).unwrap();
        assert!(text.starts_with("digest,"));
        assert!(store.load_pending().unwrap().is_empty());
    }

    #[test]
    fn test_load_pending_skips_non_pending_rows() {
        let (_dir, store) = test_store();
        let text = "digest,filename,path,date,amount,merchant,category,description,status\n\
                    aa,a.jpg,/a.jpg,14092025,-$1.00,ALDI,,,pending\n\
                    bb,b.jpg,/b.jpg,14092025,-$2.00,Coles,,,done\n";
        fs::write(store.pending_path(), text).unwrap();
        let loaded = store.load_pending().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].digest, "aa");
    }

    #[test]
    fn test_append_durability_with_torn_tail() {
        let (_dir, store) = test_store();
        for n in 0..5 {
            store.append_completed(&done(n)).unwrap();
        }
        // crash mid-append
        let mut f = OpenOptions::new().append(true).open(store.completed_path()).unwrap();
        f.write_all(b"ffff,Screenshot_torn.jpg,/shots/").unwrap();
        drop(f);

        let loaded = store.load_completed().unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded[4], done(4));

        store.append_completed(&done(5)).unwrap();
        let loaded = store.load_completed().unwrap();
        assert_eq!(loaded.len(), 6);
        assert_eq!(loaded[5], done(5));
        let text = fs::read_to_string(store.completed_path()).unwrap();
        assert!(!text.contains("Screenshot_torn"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_append_to_missing_ledger_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        store.append_completed(&done(1)).unwrap();
        let text = fs::read_to_string(store.completed_path()).unwrap();
        assert!(text.starts_with("digest,filename"));
        assert_eq!(store.load_completed().unwrap(), vec![done(1)]);
    }

    #[test]
    fn test_load_completed_skips_rows_not_done() {
        let (_dir, store) = test_store();
        store.append_completed(&record(1)).unwrap();
        store.append_completed(&done(2)).unwrap();
        assert_eq!(store.load_completed().unwrap(), vec![done(2)]);
    }

    #[test]
    fn test_completed_at_survives_reload() {
        let (_dir, store) = test_store();
        store.append_completed(&done(3)).unwrap();
        let loaded = store.load_completed().unwrap();
        assert_eq!(loaded[0].status, RecordStatus::Done);
        assert_eq!(
            loaded[0].completed_at,
            Some(Utc.with_ymd_and_hms(2025, 9, 20, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_complete_prefix_len() {
        assert_eq!(complete_prefix_len(b""), None);
        assert_eq!(complete_prefix_len(b"a\nb\n"), None);
        assert_eq!(complete_prefix_len(b"a\nb"), Some(2));
        assert_eq!(complete_prefix_len(b"header"), Some(0));
    }
}
