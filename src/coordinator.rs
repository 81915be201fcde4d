use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, TallyError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMove {
    pub src: PathBuf,
    pub dest: PathBuf,
}

#[derive(Debug, Default)]
pub struct CommitReport {
    pub moved: Vec<StagedMove>,
    /// Moves that failed after the record was committed, with the error text.
    pub unmoved: Vec<(StagedMove, String)>,
}

impl CommitReport {
    pub fn is_clean(&self) -> bool {
        self.unmoved.is_empty()
    }
}

/// Couples file relocation to a persistence commit: records first, files second.
#[derive(Debug, Default)]
pub struct TransactionCoordinator {
    staged: Vec<StagedMove>,
}

impl TransactionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn staged(&self) -> &[StagedMove] {
        &self.staged
    }

    /// Record a move of `src` into `dest_dir` and return the path it will get.
    /// Nothing on disk changes until `commit`.
    pub fn stage_move(&mut self, src: &Path, dest_dir: &Path) -> PathBuf {
        let dest = self.free_dest(src, dest_dir);
        debug!(src = %src.display(), dest = %dest.display(), "Staged move");
        self.staged.push(StagedMove {
            src: src.to_path_buf(),
            dest: dest.clone(),
        });
        dest
    }

    fn free_dest(&self, src: &Path, dest_dir: &Path) -> PathBuf {
        let name = src.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let first = dest_dir.join(&name);
        if first == src {
            return first;
        }
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
            _ => (name.clone(), String::new()),
        };

        let mut candidate = first;
        let mut n = 1;
        while candidate.exists() || self.staged.iter().any(|m| m.dest == candidate) {
            candidate = dest_dir.join(format!("{stem}-{n}{ext}"));
            n += 1;
        }
        candidate
    }

    /// Run `persist`, then execute the staged moves in order.
    ///
    /// If `persist` fails nothing is moved and the staged list is cleared.
    /// A move that fails after a successful persist lands in `unmoved`.
    pub fn commit<F>(&mut self, persist: F) -> Result<CommitReport>
    where
        F: FnOnce() -> Result<()>,
    {
        if let Err(e) = persist() {
            warn!(staged = self.staged().len(), error = %e, "Commit failed, discarding staged moves");
            self.rollback();
            return Err(TallyError::CommitFailed(Box::new(e)));
        }

        let staged = std::mem::take(&mut self.staged);
        let mut report = CommitReport::default();
        for m in staged {
            match move_file(&m.src, &m.dest) {
                Ok(()) => report.moved.push(m),
                Err(e) => {
                    warn!(src = %m.src.display(), dest = %m.dest.display(), error = %e, "Move failed after commit");
                    report.unmoved.push((m, e.to_string()));
                }
            }
        }
        if !report.moved.is_empty() {
            info!(moved = report.moved.len(), unmoved = report.unmoved.len(), "Committed");
        }
        Ok(report)
    }

    pub fn rollback(&mut self) {
        if !self.staged.is_empty() {
            debug!(staged = self.staged.len(), "Rolled back staged moves");
        }
        self.staged.clear();
    }
}

/// Rename, falling back to copy + remove across filesystems. An existing file
/// at `dest` is never replaced.
pub fn move_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    if src == dest {
        return Ok(());
    }
    if dest.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", dest.display()),
        ));
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !src.exists() {
                return Err(rename_err);
            }
            fs::copy(src, dest)?;
            fs::remove_file(src)
        }
    }
}
