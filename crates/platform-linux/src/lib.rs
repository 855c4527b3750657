//! Glimpse Linux Platform Integration
//!
//! The X11 desktop host:
//! - **Sources:** monitors from `xrandr`, windows from `wmctrl`, and an
//!   optional test pattern, with PNG thumbnails
//! - **Display media:** GStreamer capture published as a live video track
//! - **Saving:** a non-interactive save location in the output directory
//! - **Permissions:** capability detection and user guidance

pub mod display;
pub mod host;
mod media;
pub mod permissions;
pub mod save;
pub mod target;
pub mod thumbnail;

pub use display::{detect_display_server, detect_monitors, list_windows, WindowInfo};
pub use host::{LinuxHost, LinuxHostConfig};
pub use target::SourceTarget;
