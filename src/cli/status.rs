use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::{load_settings, settings_file_exists};
use crate::workspace::Workspace;

pub fn run() -> Result<()> {
    let settings = load_settings();
    println!("Data dir:     {}", settings.data_path().display());
    println!("Search root:  {}", settings.search_path().display());
    println!("Screenshots:  {}", settings.screenshot_path().display());

    if !settings_file_exists() {
        println!();
        println!("Not set up yet. Run `tally init` to set up.");
        return Ok(());
    }

    let ws = Workspace::open(settings)?;
    let ledger_size = std::fs::metadata(ws.store().completed_path()).map(|m| m.len()).unwrap_or(0);

    println!();
    println!("Pending:       {}", ws.data().pending_len());
    println!("Completed:     {}", ws.data().completed_len());
    println!("Ledger size:   {}", format_bytes(ledger_size));
    println!("Cached scans:  {}", ws.cache_len());
    println!("Merchants:     {}", ws.knowledge_len());
    Ok(())
}
