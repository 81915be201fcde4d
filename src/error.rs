use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Could not hash {}: {source}", path.display())]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The live file was never touched.
    #[error("Nothing written to {}: {source}", path.display())]
    PersistNotWritten {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The write failed after the live file was at risk; the backup was put back.
    #[error("Write to {} failed, previous contents restored: {source}", path.display())]
    PersistRestored {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Commit failed, staged moves discarded: {0}")]
    CommitFailed(Box<TallyError>),

    #[error("Invalid value: {0}")]
    Validation(String),

    #[error("Already recorded: {0}")]
    Duplicate(String),

    #[error("No pending record #{0}")]
    NoSuchRecord(usize),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Another tally command is using {}; try again when it has finished", .0.display())]
    Locked(PathBuf),

    #[error("Could not install the Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("{0}")]
    Other(String),
}

impl TallyError {
    /// Nothing on disk changed, so the same command may simply be run again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PersistNotWritten { .. } | Self::PersistRestored { .. } | Self::Locked(_) => true,
            Self::CommitFailed(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TallyError>;
