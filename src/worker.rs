use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::NaiveDate;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::coordinator::TransactionCoordinator;
use crate::error::{Result, TallyError};
use crate::extractor::{month_folder, Extractor};
use crate::hasher::hash_file;
use crate::models::{ExtractionEntry, Record, ScanSummary, FALLBACK_DIR, QUARANTINE_DIR};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Hashing,
    Extracting,
    Staging,
    Committing,
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    Progress(String),
    Item {
        record: Record,
        needs_attention: bool,
        suggested: Option<String>,
    },
    Failed {
        path: PathBuf,
        error: String,
    },
    Finished(ScanSummary),
}

enum Outcome {
    Known,
    Committed {
        record: Record,
        needs_attention: bool,
        suggested: Option<String>,
    },
}

/// Shared flag asking a scan to stop after the file in hand. Clones share it,
/// so a signal handler can hold one while the scan thread reads another.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Discovery, dedup, extraction and commit for one scan.
pub struct IngestionWorker {
    workspace: Arc<Workspace>,
    extractor: Arc<dyn Extractor>,
    stop: StopSignal,
    state: Arc<Mutex<ScanState>>,
    limit: Option<usize>,
}

impl IngestionWorker {
    pub fn new(workspace: Arc<Workspace>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            workspace,
            extractor,
            stop: StopSignal::default(),
            state: Arc::new(Mutex::new(ScanState::Idle)),
            limit: None,
        }
    }

    /// Stop by itself once this many records have been committed.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    fn set_state(&self, state: ScanState) {
        *self.state.lock() = state;
    }

    /// Run on a dedicated thread.
    pub fn spawn(self, search_root: PathBuf, dest_root: PathBuf) -> Result<ScanHandle> {
        let (tx, rx) = channel::unbounded();
        let stop = self.stop_signal();
        let state = Arc::clone(&self.state);
        let thread = thread::Builder::new()
            .name("tally-scan".to_string())
            .spawn(move || self.run(&search_root, &dest_root, &tx))?;
        Ok(ScanHandle {
            events: rx,
            stop,
            state,
            thread,
        })
    }

    /// Scan `search_root` and file new screenshots under `dest_root`.
    ///
    /// Per-file errors are reported as `Failed` events and never end the scan.
    pub fn run(&self, search_root: &Path, dest_root: &Path, events: &Sender<ScanEvent>) -> ScanSummary {
        let mut summary = ScanSummary::default();
        self.set_state(ScanState::Scanning);
        info!(search_root = %search_root.display(), dest_root = %dest_root.display(), "Scan started");

        let candidates = discover(
            search_root,
            dest_root,
            &self.workspace.settings().file_prefix,
            &self.workspace.settings().extensions,
        );
        summary.total = candidates.len();
        send(events, ScanEvent::Progress(format!("Found {} candidate files", summary.total)));

        let mut committed = 0usize;
        for (i, path) in candidates.iter().enumerate() {
            if self.stop.is_stopped() || self.limit.is_some_and(|n| committed >= n) {
                summary.cancelled = true;
                break;
            }
            let name = file_name(path);
            send(
                events,
                ScanEvent::Progress(format!("Processing ({}/{}): {name}", i + 1, summary.total)),
            );

            match self.process(path, dest_root, events) {
                Ok(Outcome::Known) => {
                    debug!(path = %path.display(), "Already recorded");
                    summary.skipped_known += 1;
                }
                Ok(Outcome::Committed {
                    record,
                    needs_attention,
                    suggested,
                }) => {
                    committed += 1;
                    if needs_attention {
                        summary.needs_attention += 1;
                    } else {
                        summary.processed += 1;
                    }
                    send(
                        events,
                        ScanEvent::Item {
                            record,
                            needs_attention,
                            suggested,
                        },
                    );
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping file");
                    summary.failed += 1;
                    send(
                        events,
                        ScanEvent::Failed {
                            path: path.clone(),
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        if let Err(e) = self.workspace.save_cache() {
            warn!(error = %e, "Could not save extraction cache");
        }

        self.set_state(if summary.cancelled {
            ScanState::Cancelled
        } else {
            ScanState::Idle
        });
        info!(
            processed = summary.processed,
            needs_attention = summary.needs_attention,
            failed = summary.failed,
            skipped = summary.skipped_known,
            cancelled = summary.cancelled,
            "Scan finished"
        );
        send(
            events,
            ScanEvent::Progress(format!(
                "Scan complete: {} processed, {} need attention",
                summary.processed, summary.needs_attention
            )),
        );
        send(events, ScanEvent::Finished(summary.clone()));
        summary
    }

    fn process(&self, path: &Path, dest_root: &Path, events: &Sender<ScanEvent>) -> Result<Outcome> {
        let ws = &self.workspace;

        self.set_state(ScanState::Hashing);
        let digest = hash_file(path)?;
        if ws.data().is_known(&digest) {
            return Ok(Outcome::Known);
        }

        self.set_state(ScanState::Extracting);
        let entry = match ws.cached(&digest) {
            Some(hit) => {
                debug!(digest = %digest, "Cache hit");
                hit
            }
            None => match self.extractor.extract(path) {
                Ok(entry) => {
                    ws.cache_result(&digest, entry.clone());
                    entry
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Extraction failed, quarantining");
                    ExtractionEntry::failed(e.to_string())
                }
            },
        };
        let needs_attention = entry.needs_attention || entry.error.is_some();

        self.set_state(ScanState::Staging);
        let name = file_name(path);
        let target = dest_dir(dest_root, &entry, needs_attention, &name, &ws.settings().file_prefix);
        let mut tc = TransactionCoordinator::new();
        let final_path = tc.stage_move(path, &target);

        let mut record = Record::pending(&digest, &name, final_path, &entry);
        let suggested = ws.suggest(&entry.merchant);
        if let Some(category) = &suggested {
            record.apply_category(category);
        }

        self.set_state(ScanState::Committing);
        let report = tc.commit(|| ws.add_pending(record.clone()))?;
        for (m, err) in &report.unmoved {
            send(
                events,
                ScanEvent::Progress(format!(
                    "Recorded {} but could not move it to {}: {err}",
                    m.src.display(),
                    m.dest.display()
                )),
            );
        }

        Ok(Outcome::Committed {
            record,
            needs_attention,
            suggested,
        })
    }
}

/// A scan running on its own thread.
pub struct ScanHandle {
    events: Receiver<ScanEvent>,
    stop: StopSignal,
    state: Arc<Mutex<ScanState>>,
    thread: JoinHandle<ScanSummary>,
}

impl ScanHandle {
    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    /// Stopping finishes the current file first.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock()
    }

    pub fn join(self) -> Result<ScanSummary> {
        self.thread
            .join()
            .map_err(|_| TallyError::Other("scan thread panicked".into()))
    }
}

fn send(events: &Sender<ScanEvent>, event: ScanEvent) {
    // a caller that stopped listening does not stop the scan
    let _ = events.send(event);
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Discovery and destination
// ---------------------------------------------------------------------------

/// Candidate files under `search_root`, sorted by path. Directories inside
/// `dest_root` are skipped unless both roots are the same directory.
pub fn discover(search_root: &Path, dest_root: &Path, prefix: &str, extensions: &[String]) -> Vec<PathBuf> {
    let search_root = std::fs::canonicalize(search_root).unwrap_or_else(|_| search_root.to_path_buf());
    let dest_root = std::fs::canonicalize(dest_root).unwrap_or_else(|_| dest_root.to_path_buf());
    let skip_dest = dest_root != search_root;

    let mut found: Vec<PathBuf> = WalkDir::new(&search_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(skip_dest && e.depth() > 0 && e.file_type().is_dir() && e.path().starts_with(&dest_root)))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!(error = %err, "Unreadable entry during discovery");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_candidate(e.path(), prefix, extensions))
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

fn is_candidate(path: &Path, prefix: &str, extensions: &[String]) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(prefix));
    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|want| want.eq_ignore_ascii_case(e)));
    name_ok && ext_ok
}

/// Quarantine, else the month of the extracted date, else the month in the
/// file name, else the fallback folder.
pub fn dest_dir(dest_root: &Path, entry: &ExtractionEntry, needs_attention: bool, filename: &str, prefix: &str) -> PathBuf {
    if needs_attention {
        return dest_root.join(QUARANTINE_DIR);
    }
    if let Some(month) = month_folder(&entry.date) {
        return dest_root.join(month);
    }
    if let Some(month) = month_from_filename(filename, prefix) {
        return dest_root.join(month);
    }
    dest_root.join(FALLBACK_DIR)
}

/// `Screenshot_20250914_...` gives `2025-09`.
fn month_from_filename(filename: &str, prefix: &str) -> Option<String> {
    let stamp = filename.strip_prefix(prefix)?.get(..8)?;
    let date = NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()?;
    Some(date.format("%Y-%m").to_string())
}
