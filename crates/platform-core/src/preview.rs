//! Live preview sink.

use glimpse_media_model::MediaStream;

/// Something that shows the live capture to the user.
pub trait PreviewSink: Send + Sync {
    /// Start showing `stream`.
    fn attach(&self, stream: &MediaStream);

    /// Stop showing whatever is attached. A no-op if nothing is.
    fn detach(&self);
}

/// Preview sink for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPreview;

impl PreviewSink for NullPreview {
    fn attach(&self, stream: &MediaStream) {
        tracing::trace!(stream = stream.id(), "Preview attach ignored");
    }

    fn detach(&self) {}
}
