//! Event emission abstraction.
//!
//! Observable mutations of galleries and images are published through an
//! [`EventSink`] instead of being marshalled onto a UI thread, so any
//! frontend (CLI, GUI, tests) can subscribe.

use std::sync::Arc;

use base64::Engine;
use serde::Serialize;

use crate::models::{ImageLoadingState, SaveGalleryProgress};

/// Emitted whenever an image changes state or progress.
pub const IMAGE_STATE_CHANGED: &str = "image-state-changed";
/// Emitted when a cropped thumbnail becomes available.
pub const IMAGE_THUMB_READY: &str = "image-thumb-ready";
/// Emitted while a gallery is being saved.
pub const GALLERY_SAVE_PROGRESS: &str = "gallery-save-progress";

/// Trait for emitting events to the frontend.
pub trait EventSink: Send + Sync {
    /// Emit an event with the given name and JSON payload.
    fn emit(&self, event_name: &str, payload_json: &str);
}

/// Extension trait for EventSink that provides typed emit functionality.
pub trait EventSinkExt {
    /// Emit an event with a typed payload that will be serialized to JSON.
    fn emit_typed<T: Serialize>(&self, event_name: &str, payload: &T);
}

impl<S: EventSink + ?Sized> EventSinkExt for S {
    fn emit_typed<T: Serialize>(&self, event_name: &str, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => self.emit(event_name, &json),
            Err(e) => {
                tracing::error!("Failed to serialize event payload: {}", e);
            }
        }
    }
}

/// Shared reference to an EventSink implementation.
pub type SharedEventSink = Arc<dyn EventSink>;

/// Payload of [`IMAGE_STATE_CHANGED`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStatePayload {
    pub gallery_id: i64,
    pub page_id: u32,
    pub state: ImageLoadingState,
    pub progress: u8,
    pub original_loaded: bool,
}

/// Payload of [`IMAGE_THUMB_READY`]; the PNG bytes travel as base64.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbReadyPayload {
    pub gallery_id: i64,
    pub page_id: u32,
    pub png_base64: String,
}

impl ThumbReadyPayload {
    pub fn new(gallery_id: i64, page_id: u32, png: &[u8]) -> Self {
        Self {
            gallery_id,
            page_id,
            png_base64: base64::engine::general_purpose::STANDARD.encode(png),
        }
    }
}

/// Payload of [`GALLERY_SAVE_PROGRESS`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressPayload {
    pub gallery_id: i64,
    #[serde(flatten)]
    pub progress: SaveGalleryProgress,
}

/// No-op event sink for testing or when events are not needed.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event_name: &str, _payload_json: &str) {}
}
