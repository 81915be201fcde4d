use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Full log to `log_file` (level from `RUST_LOG`, default `info`) and
/// warnings to stderr. Without a usable log file only stderr is set up.
pub fn init(log_file: Option<&Path>) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(LevelFilter::WARN);

    let file = log_file.and_then(|path| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok()?;
        }
        OpenOptions::new().create(true).append(true).open(path).ok()
    });

    let file_layer = file.map(|f| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt::layer()
            .with_writer(Mutex::new(f))
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true)
            .with_filter(filter)
    });

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init();
    if installed.is_ok() {
        if let Some(path) = log_file {
            tracing::debug!(path = %path.display(), "Logging initialized");
        }
    }
}
