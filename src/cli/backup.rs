use std::path::{Path, PathBuf};

use tracing::info;

use crate::cli::open_workspace;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::models::BACKUP_DIR;
use crate::settings::settings_path;

pub fn run() -> Result<()> {
    let ws = open_workspace()?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let dest = ws.settings().screenshot_path().join(BACKUP_DIR).join(stamp.to_string());

    let sources = [
        ws.store().pending_path(),
        ws.store().completed_path(),
        ws.cache_path(),
        ws.knowledge_path(),
        settings_path(),
    ];
    let copied = backup_files(&sources, &dest)?;

    let size: u64 = copied.iter().filter_map(|p| std::fs::metadata(p).ok()).map(|m| m.len()).sum();
    info!(dest = %dest.display(), files = copied.len(), "Backup written");
    println!("Backup saved to {}", dest.display());
    println!("Files: {}  Size: {}", copied.len(), format_bytes(size));
    Ok(())
}

/// Copy the files that exist into `dest`, returning the copies.
fn backup_files(sources: &[PathBuf], dest: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dest)?;
    let mut copied = Vec::new();
    for src in sources.iter().filter(|p| p.exists()) {
        if let Some(name) = src.file_name() {
            let target = dest.join(name);
            std::fs::copy(src, &target)?;
            copied.push(target);
        }
    }
    Ok(copied)
}
