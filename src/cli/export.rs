use std::path::PathBuf;

use crate::cli::open_workspace;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::shellexpand_path;

pub fn run(output: Option<String>) -> Result<()> {
    let ws = open_workspace()?;

    let dest = match output {
        Some(p) => PathBuf::from(shellexpand_path(&p)),
        None => {
            let dir = dirs::desktop_dir()
                .filter(|d| d.is_dir())
                .unwrap_or_else(|| ws.settings().data_path().join("exports"));
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            dir.join(format!("tally-completed-{stamp}.csv"))
        }
    };
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::copy(ws.store().completed_path(), &dest)?;
    let size = std::fs::metadata(&dest)?.len();
    println!("Exported {} records to {}", ws.data().completed_len(), dest.display());
    println!("Size: {}", format_bytes(size));
    Ok(())
}
