use std::sync::Arc;

use colored::Colorize;

use crate::cli::open_workspace;
use crate::error::Result;
use crate::extractor::SidecarExtractor;
use crate::fmt::display_date;
use crate::worker::{IngestionWorker, ScanEvent, ScanState};

pub fn run(limit: Option<usize>) -> Result<()> {
    let ws = Arc::new(open_workspace()?);
    let search_root = ws.settings().search_path();
    let dest_root = ws.settings().screenshot_path();
    std::fs::create_dir_all(&dest_root)?;

    let extractor = Arc::new(SidecarExtractor::new()?);
    let handle = IngestionWorker::new(Arc::clone(&ws), extractor)
        .with_limit(limit)
        .spawn(search_root, dest_root)?;

    let stop = handle.stop_signal();
    ctrlc::set_handler(move || {
        eprintln!("{}", "Stopping after the current file...".yellow());
        stop.stop();
    })?;

    for event in handle.events().iter() {
        match event {
            ScanEvent::Progress(msg) => println!("{}", msg.dimmed()),
            ScanEvent::Item {
                record,
                needs_attention,
                suggested,
            } => {
                let line = format!(
                    "  {}  {}  {}  {}",
                    display_date(&record.date),
                    record.amount,
                    record.merchant,
                    record.path.display()
                );
                if needs_attention {
                    println!("{} {line}", "!".yellow().bold());
                } else {
                    println!("{} {line}", "+".green().bold());
                }
                if let Some(category) = suggested {
                    println!("    suggested category: {}", category.cyan());
                }
            }
            ScanEvent::Failed { path, error } => {
                println!("{} {}: {error}", "x".red().bold(), path.display());
            }
            ScanEvent::Finished(_) => break,
        }
    }

    let stopped_early = handle.state() == ScanState::Cancelled;
    let summary = handle.join()?;
    println!();
    println!("New records:      {}", summary.processed);
    println!("Need attention:   {}", summary.needs_attention);
    println!("Already recorded: {}", summary.skipped_known);
    println!("Failed:           {}", summary.failed);
    if stopped_early {
        println!("{}", "Scan stopped early; records above are saved.".yellow());
    }
    Ok(())
}
