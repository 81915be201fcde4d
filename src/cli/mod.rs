pub mod backup;
pub mod check;
pub mod config;
pub mod export;
pub mod init;
pub mod records;
pub mod review;
pub mod scan;
pub mod status;

use clap::{Parser, Subcommand};

use crate::error::{Result, TallyError};
use crate::settings::{load_settings, settings_file_exists, Settings};
use crate::workspace::Workspace;

pub(crate) fn saved_settings() -> Result<Settings> {
    if !settings_file_exists() {
        return Err(TallyError::Settings("not set up yet, run `tally init` first".into()));
    }
    Ok(load_settings())
}

/// Open the workspace described by the saved settings.
pub(crate) fn open_workspace() -> Result<Workspace> {
    Workspace::open(saved_settings()?)
}

/// The CLI numbers records from 1.
pub(crate) fn to_index(n: usize) -> Result<usize> {
    n.checked_sub(1).ok_or(TallyError::NoSuchRecord(0))
}

#[derive(Parser)]
#[command(name = "tally", about = "Turn bank app screenshots into a durable expense ledger.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up tally: choose the data, search and screenshot directories.
    Init {
        /// Path for tally data (default: ~/Documents/tally)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Directory scanned for new screenshots (default: ~/Downloads)
        #[arg(long = "search-root")]
        search_root: Option<String>,
        /// Where organized screenshots go (default: ~/Pictures/Screenshots)
        #[arg(long = "screenshot-dir")]
        screenshot_dir: Option<String>,
    },
    /// Find new screenshots, extract them and file them by month.
    Scan {
        /// Stop after this many new records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List pending records.
    Pending {
        /// Case-insensitive text to look for in merchant, description and category
        #[arg(long)]
        query: Option<String>,
        /// Only this category
        #[arg(long)]
        category: Option<String>,
    },
    /// List completed records.
    Completed,
    /// Set the category of a pending record.
    Categorize {
        /// Record number (shown in `tally pending`)
        number: usize,
        category: String,
    },
    /// Set the description of a pending record.
    Describe {
        /// Record number (shown in `tally pending`)
        number: usize,
        text: String,
    },
    /// Move pending records to the completed ledger.
    Done {
        /// Record numbers (shown in `tally pending`)
        #[arg(required = true)]
        numbers: Vec<usize>,
        /// Category to set before completing
        #[arg(long)]
        category: Option<String>,
    },
    /// Remove pending records and delete their screenshots.
    Delete {
        /// Record numbers (shown in `tally pending`)
        #[arg(required = true)]
        numbers: Vec<usize>,
    },
    /// Enter the fields of a record that could not be read, and file it.
    Fix {
        /// Record number (shown in `tally pending`)
        number: usize,
        /// Date as DDMMYYYY
        #[arg(long)]
        date: String,
        /// Amount as -$D.DD
        #[arg(long)]
        amount: String,
        #[arg(long)]
        merchant: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Show the learned category for a pending record's merchant.
    Suggest {
        /// Record number (shown in `tally pending`)
        number: usize,
    },
    /// Find pending records whose screenshot is not where it should be.
    Check {
        /// Move found files to their recorded path
        #[arg(long)]
        repair: bool,
    },
    /// Copy all data files into a timestamped backup folder.
    Backup,
    /// Export the completed ledger as CSV.
    Export {
        /// Output path (default: ~/Desktop/tally-completed-YYYYMMDD-HHMMSS.csv)
        #[arg(long)]
        output: Option<String>,
    },
    /// Show or change the category list and learning threshold.
    Config {
        /// Comma-separated category list, replacing the current one
        #[arg(long)]
        categories: Option<String>,
        /// Confirmations needed before a merchant's category is suggested
        #[arg(long)]
        threshold: Option<u32>,
    },
    /// Show directories and record counts.
    Status,
}
