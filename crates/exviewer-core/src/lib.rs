//! ExViewer Core Library
//!
//! Core logic of the ExViewer gallery client: scraping gallery listings,
//! downloading page images through a per-image state machine, and caching
//! everything locally so it is never fetched twice.
//!
//! # Architecture
//!
//! - `models`: Data structures (gallery metadata, image records, settings)
//! - `db`: SQLite cache store with DAOs
//! - `services`: HTTP client, HTML parser, `GalleryImage`, `Gallery`
//! - `events`: Event emission abstraction (EventSink trait)
//! - `paths`: Path provider abstraction (PathProvider trait)
//! - `jobs`: Job management and cancellation system
//! - `utils`: Error handling and utilities
//!
//! # Example
//!
//! ```no_run
//! use exviewer_core::{events::NoOpEventSink, paths::DefaultPathProvider, ExViewerCore};
//! use std::sync::Arc;
//!
//! # async fn demo() -> exviewer_core::AppResult<()> {
//! let core = ExViewerCore::new(Arc::new(DefaultPathProvider::new()), Arc::new(NoOpEventSink))?;
//! let mut gallery = core.open_gallery(618395, "0439fa3666").await?;
//! gallery.load_more_items().await?;
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod events;
pub mod jobs;
pub mod models;
pub mod paths;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use db::Database;
pub use events::{EventSink, NoOpEventSink, SharedEventSink};
pub use jobs::{CancelToken, JobId, JobManager};
pub use models::{AppSettings, ConnectionStrategy, GalleryInfo, GalleryMetadata, ImageLoadingState};
pub use paths::{DefaultPathProvider, PathProvider, SharedPathProvider};
pub use services::{
    ExClient, Gallery, GalleryImage, SearchLaunch, ServiceContext, SettingsManager,
};
pub use utils::{AppError, AppResult, CommandError};

use std::sync::Arc;

/// ExViewer core application context.
///
/// Holds the shared resources every frontend needs: the cache database,
/// path provider, event sink, job manager and the site client built from
/// the persisted settings.
pub struct ExViewerCore {
    /// Services share this context
    context: ServiceContext,
    /// Job manager for tracking long-running tasks
    job_manager: Arc<JobManager>,
    settings_manager: SettingsManager,
}

impl ExViewerCore {
    /// Create a new ExViewerCore instance.
    ///
    /// Loads the settings, opens (and migrates) the database and builds a
    /// reqwest-backed client.
    pub fn new(path_provider: SharedPathProvider, event_sink: SharedEventSink) -> AppResult<Self> {
        let settings_manager = SettingsManager::new(path_provider.as_ref())?;
        let settings = settings_manager.load()?;
        let client = ExClient::from_settings(&settings)?;
        Self::with_client(path_provider, event_sink, client, settings, settings_manager)
    }

    /// Create an instance around an existing client (custom transports).
    pub fn with_client(
        path_provider: SharedPathProvider,
        event_sink: SharedEventSink,
        client: ExClient,
        settings: AppSettings,
        settings_manager: SettingsManager,
    ) -> AppResult<Self> {
        let db = Database::open_with_provider(path_provider.as_ref())?;
        db.init()?;

        Ok(Self {
            context: ServiceContext {
                client,
                db,
                paths: path_provider,
                events: event_sink,
                settings: Arc::new(settings),
            },
            job_manager: Arc::new(JobManager::new()),
            settings_manager,
        })
    }

    /// Get the shared service context.
    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    /// Get the database reference.
    pub fn database(&self) -> &Database {
        &self.context.db
    }

    /// Get the path provider reference.
    pub fn paths(&self) -> &SharedPathProvider {
        &self.context.paths
    }

    /// Get the event sink reference.
    pub fn events(&self) -> &SharedEventSink {
        &self.context.events
    }

    /// Get the job manager reference.
    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.job_manager
    }

    /// Settings the context was built with.
    pub fn settings(&self) -> &AppSettings {
        &self.context.settings
    }

    pub fn settings_manager(&self) -> &SettingsManager {
        &self.settings_manager
    }

    /// A cached page image restored from its record without touching the network.
    ///
    /// Returns `None` when there is no record or the file has gone missing.
    pub fn cached_image(&self, gallery_id: i64, page_id: u32) -> AppResult<Option<Arc<GalleryImage>>> {
        let record = self.context.db.get_image_record(gallery_id, page_id)?;
        Ok(record.and_then(|r| GalleryImage::load_cached(&self.context, &r)))
    }

    /// Open a gallery: the stored row when known, otherwise fetched through the API.
    pub async fn open_gallery(&self, id: i64, token: &str) -> AppResult<Gallery> {
        if let Some(gallery) = Gallery::try_load_gallery(&self.context, id)? {
            if gallery.token() == token && gallery.metadata().available {
                return Ok(gallery);
            }
        }

        let info = GalleryInfo::new(id, token);
        Gallery::fetch_galleries(&self.context, std::slice::from_ref(&info))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("画廊 {}", id)))
    }
}
