use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const QUARANTINE_DIR: &str = "NEEDS_ATTENTION";
pub const FALLBACK_DIR: &str = "Organized";
pub const BACKUP_DIR: &str = "BACKUPS";

pub const DEFAULT_DATE: &str = "01012025";
pub const DEFAULT_AMOUNT: &str = "$0.00";
pub const FALLBACK_CATEGORY: &str = "Uncategorised";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Done,
}

/// One screenshot's worth of expense data, keyed by the file's content digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub digest: String,
    pub filename: String,
    pub path: PathBuf,
    pub date: String,
    pub amount: String,
    pub merchant: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub status: RecordStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn pending(digest: &str, filename: &str, path: PathBuf, entry: &ExtractionEntry) -> Self {
        Self {
            digest: digest.to_string(),
            filename: filename.to_string(),
            path,
            date: entry.date.clone(),
            amount: entry.amount.clone(),
            merchant: entry.merchant.clone(),
            category: String::new(),
            description: String::new(),
            status: RecordStatus::Pending,
            completed_at: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == RecordStatus::Done
    }

    /// Assign a category and keep the note part of the description.
    pub fn apply_category(&mut self, category: &str) {
        let category = category.trim();
        if !category.is_empty() {
            self.description = update_description(&self.description, &self.category, category);
        }
        self.category = category.to_string();
    }

    /// Transition to Done. Consumes the record so a Done record cannot be edited afterwards.
    pub fn complete(mut self, at: DateTime<Utc>) -> Self {
        self.status = RecordStatus::Done;
        self.completed_at = Some(at);
        self
    }
}

// ---------------------------------------------------------------------------
// Derived description: "<category> - <note>"
// ---------------------------------------------------------------------------

pub fn format_description(category: &str, note: &str) -> String {
    if note.trim().is_empty() || note.trim() == category.trim() {
        return category.to_string();
    }
    format!("{category} - {note}")
}

pub fn split_description(description: &str) -> (&str, &str) {
    match description.split_once(" - ") {
        Some((category, note)) => (category, note),
        None => ("", description),
    }
}

/// Swap the category prefix of `current`. A description that is only the old
/// category carries no note.
pub fn update_description(current: &str, old_category: &str, new_category: &str) -> String {
    if current.trim().is_empty() || current.trim() == old_category.trim() {
        return new_category.to_string();
    }
    let (_, note) = split_description(current);
    format_description(new_category, note)
}

/// What the extractor produced for one digest. Also the cache value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionEntry {
    #[serde(alias = "MerchantOCRValue")]
    pub merchant: String,
    #[serde(alias = "amount_raw")]
    pub amount: String,
    #[serde(alias = "date_raw")]
    pub date: String,
    #[serde(default = "default_subcategory")]
    pub subcategory: String,
    #[serde(default)]
    pub needs_attention: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_subcategory() -> String {
    FALLBACK_CATEGORY.to_string()
}

impl ExtractionEntry {
    /// Placeholder for a file the extractor could not read at all.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            merchant: "Error".to_string(),
            amount: DEFAULT_AMOUNT.to_string(),
            date: DEFAULT_DATE.to_string(),
            subcategory: FALLBACK_CATEGORY.to_string(),
            needs_attention: true,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionEntry {
    pub merchant: String,
    pub category: String,
    pub confirmations: u32,
    pub first_seen: DateTime<Utc>,
    pub last_confirmed: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub processed: usize,
    pub needs_attention: usize,
    pub failed: usize,
    pub skipped_known: usize,
    pub total: usize,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ExtractionEntry {
        ExtractionEntry {
            merchant: "ALDI".into(),
            amount: "-$12.30".into(),
            date: "14092025".into(),
            subcategory: "Groceries".into(),
            needs_attention: false,
            error: None,
        }
    }

    #[test]
    fn test_format_description() {
        assert_eq!(format_description("Food", ""), "Food");
        assert_eq!(format_description("Food", "Food"), "Food");
        assert_eq!(format_description("Food", "lunch with client"), "Food - lunch with client");
    }

    #[test]
    fn test_update_description_keeps_note() {
        assert_eq!(update_description("", "", "Food"), "Food");
        assert_eq!(update_description("Food - lunch", "Food", "Transport"), "Transport - lunch");
        assert_eq!(update_description("bus ticket", "", "Transport"), "Transport - bus ticket");
        assert_eq!(update_description("Food", "Food", "Transport"), "Transport");
        assert_eq!(update_description("Transport", "", "Transport"), "Transport");
    }

    #[test]
    fn test_apply_category_sets_description() {
        let mut r = Record::pending("abc", "a.jpg", "a.jpg".into(), &entry());
        r.apply_category("Food");
        assert_eq!(r.category, "Food");
        assert_eq!(r.description, "Food");
        r.description = "Food - weekly shop".into();
        r.apply_category("Supplies");
        assert_eq!(r.description, "Supplies - weekly shop");
    }

    #[test]
    fn test_complete_sets_timestamp() {
        let r = Record::pending("abc", "a.jpg", "a.jpg".into(), &entry());
        assert!(!r.is_done());
        assert!(r.completed_at.is_none());
        let done = r.complete(Utc::now());
        assert!(done.is_done());
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_entry_accepts_legacy_field_names() {
        let json = r#"{"MerchantOCRValue": "Bakers Delight", "amount_raw": "-$4.50", "date_raw": "02032025"}"#;
        let e: ExtractionEntry = serde_json::from_str(json).unwrap();
        assert_eq!(e.merchant, "Bakers Delight");
        assert_eq!(e.subcategory, FALLBACK_CATEGORY);
        assert!(!e.needs_attention);
    }

    #[test]
    fn test_failed_entry_needs_attention() {
        let e = ExtractionEntry::failed("cannot open image");
        assert!(e.needs_attention);
        assert_eq!(e.error.as_deref(), Some("cannot open image"));
    }
}
