use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::atomic::atomic_rewrite;
use crate::error::Result;
use crate::models::SuggestionEntry;

pub const KNOWLEDGE_FILE: &str = "merchant_knowledge.json";
pub const SCHEMA_VERSION: u64 = 2;

pub fn normalize_merchant(merchant: &str) -> String {
    merchant.trim().to_lowercase()
}

#[derive(Serialize)]
struct KnowledgeDocRef<'a> {
    schema_version: u64,
    entries: &'a [SuggestionEntry],
}

#[derive(Deserialize)]
struct KnowledgeDoc {
    entries: Vec<SuggestionEntry>,
}

#[derive(Deserialize)]
struct LegacyEntry {
    merchant: String,
    category: String,
    #[serde(default)]
    confirmations: Option<u32>,
    #[serde(default)]
    first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    last_confirmed: Option<DateTime<Utc>>,
}

/// Frequency table of merchant -> category confirmations.
///
/// Entries are kept in insertion order, which is also the tie-break order for
/// suggestions. Every mutation is flushed to disk before returning.
pub struct SuggestionEngine {
    path: PathBuf,
    max_entries: usize,
    entries: Vec<SuggestionEntry>,
}

impl SuggestionEngine {
    pub fn new(path: &Path, max_entries: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            max_entries: max_entries.max(1),
            entries: Vec::new(),
        }
    }

    /// Load the table. Corrupt or unknown-version files give an empty table.
    pub fn load(path: &Path, max_entries: usize) -> Self {
        let mut engine = Self::new(path, max_entries);
        if !path.exists() {
            return engine;
        }
        let value: Value = match std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|data| serde_json::from_slice(&data).map_err(|e| e.to_string()))
        {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Knowledge file unreadable, starting empty");
                return engine;
            }
        };

        match value.get("schema_version").and_then(Value::as_u64) {
            Some(SCHEMA_VERSION) => match serde_json::from_value::<KnowledgeDoc>(value) {
                Ok(doc) => {
                    engine.entries = doc.entries;
                    engine.trim_to_capacity();
                    debug!(entries = engine.entries.len(), "Loaded merchant knowledge");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Knowledge file corrupt, starting empty"),
            },
            Some(other) => {
                warn!(path = %path.display(), version = other, "Unknown knowledge schema, starting empty");
            }
            None => match serde_json::from_value::<Vec<LegacyEntry>>(value) {
                Ok(rows) => {
                    engine.upgrade(rows);
                    info!(entries = engine.entries.len(), "Upgrading legacy merchant knowledge");
                    if let Err(e) = engine.save() {
                        warn!(path = %path.display(), error = %e, "Could not rewrite upgraded knowledge");
                    }
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Knowledge file corrupt, starting empty"),
            },
        }
        engine
    }

    fn upgrade(&mut self, rows: Vec<LegacyEntry>) {
        let now = Utc::now();
        for row in rows {
            let merchant = normalize_merchant(&row.merchant);
            let category = row.category.trim().to_string();
            if merchant.is_empty() || category.is_empty() {
                continue;
            }
            let count = row.confirmations.unwrap_or(1).max(1);
            let last = row.last_confirmed.unwrap_or(now);
            match self
                .entries
                .iter_mut()
                .find(|e| e.merchant == merchant && e.category == category)
            {
                Some(existing) => {
                    existing.confirmations = existing.confirmations.saturating_add(count);
                    existing.last_confirmed = existing.last_confirmed.max(last);
                }
                None => self.entries.push(SuggestionEntry {
                    merchant,
                    category,
                    confirmations: count,
                    first_seen: row.first_seen.unwrap_or(last),
                    last_confirmed: last,
                }),
            }
        }
        self.trim_to_capacity();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn learn_confirmation(&mut self, merchant: &str, category: &str) -> Result<()> {
        self.learn_confirmation_at(merchant, category, Utc::now())
    }

    /// Record one confirmation. On a failed save the table is left as it was.
    pub fn learn_confirmation_at(&mut self, merchant: &str, category: &str, now: DateTime<Utc>) -> Result<()> {
        let merchant = normalize_merchant(merchant);
        let category = category.trim();
        if merchant.is_empty() || category.is_empty() {
            return Ok(());
        }

        let before = self.entries.clone();
        match self
            .entries
            .iter_mut()
            .find(|e| e.merchant == merchant && e.category == category)
        {
            Some(existing) => {
                existing.confirmations = existing.confirmations.saturating_add(1);
                existing.last_confirmed = now;
            }
            None => {
                if self.entries.len() >= self.max_entries {
                    self.evict_oldest();
                }
                self.entries.push(SuggestionEntry {
                    merchant,
                    category: category.to_string(),
                    confirmations: 1,
                    first_seen: now,
                    last_confirmed: now,
                });
            }
        }

        if let Err(e) = self.save() {
            self.entries = before;
            return Err(e);
        }
        Ok(())
    }

    /// Category with the highest confirmation total for this merchant, if that
    /// total reaches `threshold`. Equal totals go to the category seen first.
    pub fn get_suggestion(&self, merchant: &str, threshold: u32) -> Option<String> {
        let merchant = normalize_merchant(merchant);
        if merchant.is_empty() {
            return None;
        }
        let mut totals: Vec<(&str, u32)> = Vec::new();
        for e in self.entries.iter().filter(|e| e.merchant == merchant) {
            match totals.iter_mut().find(|(c, _)| *c == e.category) {
                Some((_, total)) => *total = total.saturating_add(e.confirmations),
                None => totals.push((e.category.as_str(), e.confirmations)),
            }
        }

        let mut best: Option<(&str, u32)> = None;
        for (category, total) in totals {
            if best.map_or(true, |(_, t)| total > t) {
                best = Some((category, total));
            }
        }
        best.filter(|(_, total)| *total >= threshold.max(1))
            .map(|(category, _)| category.to_string())
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_confirmed)
            .map(|(i, _)| i);
        if let Some(i) = oldest {
            let gone = self.entries.remove(i);
            debug!(merchant = %gone.merchant, category = %gone.category, "Evicted knowledge entry");
        }
    }

    fn trim_to_capacity(&mut self) {
        while self.entries.len() > self.max_entries {
            self.evict_oldest();
        }
    }

    pub fn save(&self) -> Result<()> {
        let doc = KnowledgeDocRef {
            schema_version: SCHEMA_VERSION,
            entries: &self.entries,
        };
        atomic_rewrite(&self.path, |out| Ok(serde_json::to_writer_pretty(out, &doc)?))
    }
}
