use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::cache::{ExtractionCache, CACHE_FILE};
use crate::categorizer::{SuggestionEngine, KNOWLEDGE_FILE};
use crate::datastore::DataStore;
use crate::error::{Result, TallyError};
use crate::models::{ExtractionEntry, Record};
use crate::settings::Settings;
use crate::store::PersistenceStore;

/// Held for the life of a `Workspace`; one process per data directory.
pub const LOCK_FILE: &str = ".lock";

/// Everything a scan or a review session needs, opened from `Settings`.
///
/// Lock order: `pending_write` may be held while the data store's lock is
/// taken for a snapshot, never the other way round.
pub struct Workspace {
    _dir_lock: File,
    settings: Settings,
    data: DataStore,
    store: PersistenceStore,
    cache: Mutex<ExtractionCache>,
    suggestions: Mutex<SuggestionEngine>,
    pending_write: Mutex<()>,
}

impl Workspace {
    pub fn open(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let data_dir = settings.data_path();
        fs::create_dir_all(&data_dir)?;
        let dir_lock = lock_data_dir(&data_dir)?;
        let store = PersistenceStore::new(&data_dir);
        store.ensure_files()?;

        let completed = store.load_completed()?;
        let loaded = store.load_pending()?;
        let loaded_len = loaded.len();
        let pending = reconcile(loaded, &completed);
        if pending.len() != loaded_len {
            warn!(dropped = loaded_len - pending.len(), "Dropped pending rows already in the ledger or duplicated");
            store.save_pending(&pending)?;
        }

        let cache = ExtractionCache::load_from_file(&data_dir.join(CACHE_FILE), settings.cache_max_entries);
        let suggestions = SuggestionEngine::load(&data_dir.join(KNOWLEDGE_FILE), settings.knowledge_max_entries);
        info!(
            pending = pending.len(),
            completed = completed.len(),
            cached = cache.len(),
            knowledge = suggestions.len(),
            "Opened workspace"
        );

        Ok(Self {
            _dir_lock: dir_lock,
            settings,
            data: DataStore::new(pending, completed),
            store,
            cache: Mutex::new(cache),
            suggestions: Mutex::new(suggestions),
            pending_write: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn data(&self) -> &DataStore {
        &self.data
    }

    pub fn store(&self) -> &PersistenceStore {
        &self.store
    }

    pub fn cache_path(&self) -> PathBuf {
        self.settings.data_path().join(CACHE_FILE)
    }

    pub fn knowledge_path(&self) -> PathBuf {
        self.settings.data_path().join(KNOWLEDGE_FILE)
    }

    // -----------------------------------------------------------------------
    // Pending set
    // -----------------------------------------------------------------------

    /// Write the current pending mirror to disk.
    pub fn persist_pending(&self) -> Result<()> {
        let _guard = self.pending_write.lock();
        let snapshot = self.data.pending();
        self.store.save_pending(&snapshot)
    }

    /// Insert and persist. On failure the record is taken out of the mirror again.
    pub fn add_pending(&self, record: Record) -> Result<()> {
        let digest = record.digest.clone();
        if !self.data.add_pending(record) {
            return Err(TallyError::Duplicate(digest));
        }
        if let Err(e) = self.persist_pending() {
            self.data.remove_pending_by_digest(&digest);
            return Err(e);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cache and suggestions
    // -----------------------------------------------------------------------

    pub fn cached(&self, digest: &str) -> Option<ExtractionEntry> {
        self.cache.lock().get(digest)
    }

    pub fn cache_result(&self, digest: &str, entry: ExtractionEntry) {
        self.cache.lock().put(digest, entry);
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Nothing is written while the cache is empty and has never been saved.
    pub fn save_cache(&self) -> Result<()> {
        let path = self.cache_path();
        let cache = self.cache.lock();
        if cache.is_empty() && !path.exists() {
            return Ok(());
        }
        cache.save_to_file(&path)
    }

    pub fn suggest(&self, merchant: &str) -> Option<String> {
        self.suggestions
            .lock()
            .get_suggestion(merchant, self.settings.learning_threshold)
    }

    pub fn learn(&self, merchant: &str, category: &str) -> Result<()> {
        self.suggestions.lock().learn_confirmation(merchant, category)
    }

    pub fn knowledge_len(&self) -> usize {
        self.suggestions.lock().len()
    }
}

/// Take the advisory lock on `<data_dir>/.lock`, or fail with `Locked` while
/// another process holds it.
fn lock_data_dir(data_dir: &Path) -> Result<File> {
    let path = data_dir.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock
            || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
        {
            Err(TallyError::Locked(data_dir.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Drop pending rows whose digest is already in the ledger, and repeated
/// pending digests after the first.
fn reconcile(pending: Vec<Record>, completed: &[Record]) -> Vec<Record> {
    let mut seen: HashSet<String> = completed.iter().map(|r| r.digest.clone()).collect();
    pending
        .into_iter()
        .filter(|r| {
            let fresh = seen.insert(r.digest.clone());
            if !fresh {
                warn!(digest = %r.digest, filename = %r.filename, "Pending row already recorded");
            }
            fresh
        })
        .collect()
}
