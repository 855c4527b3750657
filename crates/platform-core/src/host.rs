//! Host collaborator traits.

use std::path::{Path, PathBuf};

use glimpse_common::error::GlimpseResult;
use glimpse_media_model::{MediaStream, TrackConstraints};

use crate::source::CaptureSource;

/// The desktop shell the recording core runs inside.
///
/// Implementations own the native pieces: source enumeration, the save
/// dialog, writing to disk, and any recording indicator.
#[async_trait::async_trait]
pub trait DesktopHost: Send + Sync {
    /// Enumerate selectable screens and windows.
    async fn get_sources(&self) -> GlimpseResult<Vec<CaptureSource>>;

    /// Record which source the next display-media grant resolves to.
    fn set_source(&self, id: &str);

    /// Ask the user where to save an artifact of the given MIME type.
    /// `None` means the user cancelled.
    async fn get_save_path(&self, mime_type_hint: &str) -> GlimpseResult<Option<PathBuf>>;

    /// Persist artifact bytes.
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> GlimpseResult<()>;

    /// Recording has started.
    fn start_recording(&self);

    /// Recording has stopped.
    fn stop_recording(&self);
}

/// The host's display-media grant.
#[async_trait::async_trait]
pub trait DisplayMedia: Send + Sync {
    /// Acquire a live video stream for the currently selected source.
    ///
    /// Fails with `CaptureDenied` when no selected source can be resolved or
    /// the user dismisses the picker.
    async fn get_display_media(&self, constraints: &TrackConstraints)
        -> GlimpseResult<MediaStream>;
}
