use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::atomic::atomic_rewrite;
use crate::error::{Result, TallyError};

pub const DEFAULT_CATEGORIES: &[&str] = &["Food", "Transport", "Medical", "Client Session", "Supplies", "Other"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where the record stores, cache, knowledge file and log live.
    pub data_dir: String,
    /// Scanned for new screenshots.
    pub search_root: String,
    /// Organized screenshots, quarantine and backups go here.
    pub screenshot_dir: String,
    pub categories: Vec<String>,
    pub learning_threshold: u32,
    pub cache_max_entries: usize,
    pub knowledge_max_entries: usize,
    pub file_prefix: String,
    pub extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let home = home_dir();
        Self {
            data_dir: home.join("Documents").join("tally").to_string_lossy().to_string(),
            search_root: home.join("Downloads").to_string_lossy().to_string(),
            screenshot_dir: home.join("Pictures").join("Screenshots").to_string_lossy().to_string(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            learning_threshold: 2,
            cache_max_entries: 1000,
            knowledge_max_entries: 10_000,
            file_prefix: "Screenshot_".to_string(),
            extensions: vec!["jpg".to_string(), "jpeg".to_string()],
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.categories.iter().all(|c| c.trim().is_empty()) {
            return Err(TallyError::Settings("at least one category is required".into()));
        }
        for (i, c) in self.categories.iter().enumerate() {
            if self.categories[..i].contains(c) {
                return Err(TallyError::Settings(format!("category '{c}' is listed twice")));
            }
        }
        if self.learning_threshold < 1 {
            return Err(TallyError::Settings("learning_threshold must be at least 1".into()));
        }
        if self.cache_max_entries < 1 {
            return Err(TallyError::Settings("cache_max_entries must be at least 1".into()));
        }
        if self.knowledge_max_entries < 1 {
            return Err(TallyError::Settings("knowledge_max_entries must be at least 1".into()));
        }
        if self.data_dir.trim().is_empty() {
            return Err(TallyError::Settings("data_dir is not set".into()));
        }
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(TallyError::Settings("no file extensions configured".into()));
        }
        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn search_path(&self) -> PathBuf {
        PathBuf::from(&self.search_root)
    }

    pub fn screenshot_path(&self) -> PathBuf {
        PathBuf::from(&self.screenshot_dir)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_path().join("tally.log")
    }
}

/// Category list from comma- or newline-separated text, trimmed, without
/// blanks or repeats.
pub fn parse_categories(text: &str) -> Vec<String> {
    let mut categories: Vec<String> = Vec::new();
    for c in text.split([',', '\n']).map(str::trim).filter(|c| !c.is_empty()) {
        if !categories.iter().any(|have| have == c) {
            categories.push(c.to_string());
        }
    }
    categories
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn config_dir() -> PathBuf {
    home_dir().join(".config").join("tally")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Settings unreadable, using defaults");
            return Settings::default();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Settings corrupt, using defaults");
        Settings::default()
    })
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(config_dir())?;
    save_settings_to(settings, &settings_path())
}

fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    settings.validate()?;
    atomic_rewrite(path, |out| {
        serde_json::to_writer_pretty(&mut *out, settings)?;
        out.write_all(b"\n")
    })
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
