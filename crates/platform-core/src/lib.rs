//! Glimpse platform core contracts.
//!
//! This crate defines the narrow interface the recording core uses to talk to
//! its host, without coupling to a concrete desktop backend:
//! - **Sources:** selectable screens/windows and the process-wide selection
//! - **Host:** enumeration, save dialog, file write, lifecycle notifications
//! - **Display media:** the grant that turns the selection into a live stream
//! - **Preview:** the live preview sink

pub mod host;
pub mod mime;
pub mod preview;
pub mod source;

pub use host::{DesktopHost, DisplayMedia};
pub use mime::{extension_for_mime, mime_essence, SaveDialogOptions};
pub use preview::{NullPreview, PreviewSink};
pub use source::{CaptureSource, SourceSelection};

use serde::{Deserialize, Serialize};

/// Information about a connected monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorInfo {
    /// Monitor name/identifier.
    pub name: String,
    /// Resolution in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Position in the virtual desktop (pixels).
    pub x: i32,
    pub y: i32,
    /// Whether this monitor is primary.
    pub primary: bool,
}

impl MonitorInfo {
    /// Inclusive bottom-right corner in virtual desktop pixels.
    pub fn end_point(&self) -> (i32, i32) {
        (
            self.x + self.width.max(1) as i32 - 1,
            self.y + self.height.max(1) as i32 - 1,
        )
    }
}

/// Display server / platform family used for capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayServer {
    Wayland,
    X11,
    #[default]
    Unknown,
}
