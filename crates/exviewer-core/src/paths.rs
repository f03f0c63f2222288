//! Path provider abstraction.
//!
//! Resolves where the database, settings, logs and downloaded gallery
//! folders live, so the core never hardcodes a data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

/// Trait for providing application data paths.
pub trait PathProvider: Send + Sync {
    /// Get the root application data directory.
    fn app_data_dir(&self) -> PathBuf;

    /// Get the database directory.
    fn database_dir(&self) -> PathBuf {
        self.app_data_dir().join("Database")
    }

    /// Root of the downloaded image cache; one folder per gallery id.
    fn cache_dir(&self) -> PathBuf {
        self.app_data_dir().join("LocalCache")
    }

    /// Folder holding the downloaded images of one gallery.
    fn gallery_dir(&self, gallery_id: i64) -> PathBuf {
        self.cache_dir().join(gallery_id.to_string())
    }

    /// Get the settings file path.
    fn settings_path(&self) -> PathBuf {
        self.app_data_dir().join("Config").join("settings.json")
    }

    /// Get the logs directory.
    fn logs_dir(&self) -> PathBuf {
        self.app_data_dir().join("Logs")
    }

    /// Get the database file path.
    fn database_path(&self) -> PathBuf {
        self.database_dir().join("exviewer.db")
    }
}

/// Shared reference to a PathProvider implementation.
pub type SharedPathProvider = Arc<dyn PathProvider>;

/// Default path provider using the platform data dir (`%APPDATA%/ExViewer/`,
/// `~/.local/share/ExViewer/`, ...).
#[derive(Debug, Clone)]
pub struct DefaultPathProvider {
    app_data_dir: PathBuf,
}

impl DefaultPathProvider {
    pub fn new() -> Self {
        let app_data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ExViewer");
        Self { app_data_dir }
    }

    /// Create a provider rooted at a custom base directory.
    ///
    /// Useful for testing and for the `--data-dir` flag.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            app_data_dir: base_dir,
        }
    }
}

impl Default for DefaultPathProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PathProvider for DefaultPathProvider {
    fn app_data_dir(&self) -> PathBuf {
        self.app_data_dir.clone()
    }
}

/// Size summary of a cache folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStats {
    pub file_count: u64,
    pub total_bytes: u64,
}

/// Walk `dir` and sum up its files. A missing folder counts as empty.
pub fn folder_stats(dir: &Path) -> FolderStats {
    let mut stats = FolderStats::default();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            stats.file_count += 1;
            stats.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    stats
}
