use colored::Colorize;

use crate::error::Result;
use crate::settings::{load_settings, save_settings, settings_path, shellexpand_path};
use crate::workspace::Workspace;

pub fn run(data_dir: Option<String>, search_root: Option<String>, screenshot_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(p) = data_dir {
        settings.data_dir = shellexpand_path(&p);
    }
    if let Some(p) = search_root {
        settings.search_root = shellexpand_path(&p);
    }
    if let Some(p) = screenshot_dir {
        settings.screenshot_dir = shellexpand_path(&p);
    }
    settings.validate()?;

    std::fs::create_dir_all(settings.data_path())?;
    std::fs::create_dir_all(settings.screenshot_path())?;
    let ws = Workspace::open(settings.clone())?;
    save_settings(&settings)?;

    println!("{}", "tally is ready.".green().bold());
    println!("Data dir:     {}", settings.data_path().display());
    println!("Search root:  {}", settings.search_path().display());
    println!("Screenshots:  {}", settings.screenshot_path().display());
    println!("Settings:     {}", settings_path().display());
    println!(
        "Records:      {} pending, {} completed",
        ws.data().pending_len(),
        ws.data().completed_len()
    );
    Ok(())
}
