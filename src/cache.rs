use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::atomic::atomic_rewrite;
use crate::error::{Result, TallyError};
use crate::models::ExtractionEntry;

pub const CACHE_FILE: &str = "ocr_cache.json";
pub const SCHEMA_VERSION: u64 = 2;

#[derive(Serialize, Deserialize)]
struct CachedEntry {
    digest: String,
    #[serde(flatten)]
    entry: ExtractionEntry,
}

#[derive(Serialize)]
struct CacheDocRef<'a> {
    schema_version: u64,
    entries: Vec<CachedEntryRef<'a>>,
}

#[derive(Serialize)]
struct CachedEntryRef<'a> {
    digest: &'a str,
    #[serde(flatten)]
    entry: &'a ExtractionEntry,
}

#[derive(Deserialize)]
struct CacheDoc {
    entries: Vec<CachedEntry>,
}

/// Bounded digest -> extraction result map with least-recently-used eviction.
pub struct ExtractionCache {
    inner: LruCache<String, ExtractionEntry>,
}

impl ExtractionCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    /// A hit counts as a use.
    pub fn get(&mut self, digest: &str) -> Option<ExtractionEntry> {
        self.inner.get(digest).cloned()
    }

    pub fn put(&mut self, digest: &str, entry: ExtractionEntry) {
        if let Some((evicted, _)) = self.inner.push(digest.to_string(), entry) {
            if evicted != digest {
                debug!(digest = %evicted, "Evicted cache entry");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Load a saved cache. Never fails: a missing, corrupt or unknown-version
    /// file gives an empty cache.
    pub fn load_from_file(path: &Path, capacity: usize) -> Self {
        let mut cache = Self::new(capacity);
        if !path.exists() {
            return cache;
        }
        let value = match std::fs::read(path)
            .map_err(TallyError::from)
            .and_then(|data| Ok(serde_json::from_slice::<Value>(&data)?))
        {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache unreadable, starting empty");
                return cache;
            }
        };

        match parse_document(value) {
            Ok(Parsed::Current(entries)) => {
                for e in entries {
                    cache.put(&e.digest, e.entry);
                }
                debug!(entries = cache.len(), "Loaded extraction cache");
            }
            Ok(Parsed::Legacy(map)) => {
                for (digest, entry) in map {
                    cache.put(&digest, entry);
                }
                info!(entries = cache.len(), "Upgrading legacy extraction cache");
                if let Err(e) = cache.save_to_file(path) {
                    warn!(path = %path.display(), error = %e, "Could not rewrite upgraded cache");
                }
            }
            Ok(Parsed::Unsupported(version)) => {
                warn!(path = %path.display(), version, "Unknown cache schema, starting empty");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache corrupt, starting empty");
            }
        }
        cache
    }

    /// Entries are written least- to most-recently used so a reload keeps recency.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let doc = CacheDocRef {
            schema_version: SCHEMA_VERSION,
            entries: self
                .inner
                .iter()
                .rev()
                .map(|(digest, entry)| CachedEntryRef { digest, entry })
                .collect(),
        };
        atomic_rewrite(path, |out| Ok(serde_json::to_writer_pretty(out, &doc)?))
    }
}

enum Parsed {
    Current(Vec<CachedEntry>),
    Legacy(BTreeMap<String, ExtractionEntry>),
    Unsupported(u64),
}

fn parse_document(value: Value) -> serde_json::Result<Parsed> {
    match value.get("schema_version").map(Value::as_u64) {
        Some(Some(SCHEMA_VERSION)) => {
            let doc: CacheDoc = serde_json::from_value(value)?;
            Ok(Parsed::Current(doc.entries))
        }
        Some(Some(other)) => Ok(Parsed::Unsupported(other)),
        Some(None) => Ok(Parsed::Unsupported(0)),
        None => Ok(Parsed::Legacy(serde_json::from_value(value)?)),
    }
}
