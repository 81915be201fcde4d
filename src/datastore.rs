use std::collections::HashSet;

use parking_lot::Mutex;

use crate::models::Record;

#[derive(Default)]
struct Inner {
    pending: Vec<Record>,
    completed: Vec<Record>,
    known: HashSet<String>,
}

/// In-memory mirror of both record stores plus every digest ever seen.
///
/// The only state shared between the scan worker and the interactive side.
/// Reads hand out copies; the lock is never held across I/O.
#[derive(Default)]
pub struct DataStore {
    inner: Mutex<Inner>,
}

impl DataStore {
    pub fn new(pending: Vec<Record>, completed: Vec<Record>) -> Self {
        let known = pending
            .iter()
            .chain(completed.iter())
            .map(|r| r.digest.clone())
            .collect();
        Self {
            inner: Mutex::new(Inner {
                pending,
                completed,
                known,
            }),
        }
    }

    pub fn pending(&self) -> Vec<Record> {
        self.inner.lock().pending.clone()
    }

    pub fn completed(&self) -> Vec<Record> {
        self.inner.lock().completed.clone()
    }

    pub fn is_known(&self, digest: &str) -> bool {
        self.inner.lock().known.contains(digest)
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn completed_len(&self) -> usize {
        self.inner.lock().completed.len()
    }

    pub fn get_pending(&self, index: usize) -> Option<Record> {
        self.inner.lock().pending.get(index).cloned()
    }

    /// Returns false, and changes nothing, when the digest is already known.
    pub fn add_pending(&self, record: Record) -> bool {
        let mut inner = self.inner.lock();
        if !inner.known.insert(record.digest.clone()) {
            return false;
        }
        inner.pending.push(record);
        true
    }

    /// The digest stays known; see `forget`.
    pub fn remove_pending(&self, index: usize) -> Option<Record> {
        let mut inner = self.inner.lock();
        if index >= inner.pending.len() {
            return None;
        }
        Some(inner.pending.remove(index))
    }

    /// Let a digest be scanned in again. Returns false while a record in either
    /// set still carries it.
    pub fn forget(&self, digest: &str) -> bool {
        let mut inner = self.inner.lock();
        let held = inner.pending.iter().chain(inner.completed.iter()).any(|r| r.digest == digest);
        !held && inner.known.remove(digest)
    }

    /// Undo an `add_pending` whose commit failed. The digest is forgotten so a
    /// later scan picks the file up again.
    pub fn remove_pending_by_digest(&self, digest: &str) -> Option<Record> {
        let mut inner = self.inner.lock();
        let pos = inner.pending.iter().position(|r| r.digest == digest)?;
        inner.known.remove(digest);
        Some(inner.pending.remove(pos))
    }

    /// Put a record back at `index` (clamped to the end).
    pub fn insert_pending(&self, index: usize, record: Record) {
        let mut inner = self.inner.lock();
        let at = index.min(inner.pending.len());
        inner.known.insert(record.digest.clone());
        inner.pending.insert(at, record);
    }

    /// Apply `f` to the pending record at `index` and return a copy of the result.
    pub fn update_pending<F>(&self, index: usize, f: F) -> Option<Record>
    where
        F: FnOnce(&mut Record),
    {
        let mut inner = self.inner.lock();
        let record = inner.pending.get_mut(index)?;
        f(record);
        Some(record.clone())
    }

    /// Add a completed record and retire the pending row with the same digest
    /// in one step, so no snapshot sees the record in neither set. Returns
    /// whether a pending row was there.
    pub fn append_completed(&self, done: Record) -> bool {
        let mut inner = self.inner.lock();
        let pos = inner.pending.iter().position(|r| r.digest == done.digest);
        if let Some(pos) = pos {
            inner.pending.remove(pos);
        }
        inner.known.insert(done.digest.clone());
        inner.completed.push(done);
        pos.is_some()
    }
}
