//! Capture source ids understood by the Linux host.

use std::fmt;

use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_platform_core::MonitorInfo;

/// What a source id points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTarget {
    /// Monitor by `xrandr --listmonitors` index.
    Screen(usize),
    /// Top-level X11 window.
    Window(u64),
    /// Synthetic `videotestsrc` pattern.
    TestPattern,
}

impl SourceTarget {
    /// Parse `screen:<index>:0`, `window:<xid>:0`, or `test:0:0`.
    pub fn parse(id: &str) -> Option<Self> {
        let mut parts = id.split(':');
        let kind = parts.next()?;
        let value = parts.next()?;
        match kind {
            "screen" => value.parse().ok().map(Self::Screen),
            "window" => value.parse().ok().map(Self::Window),
            "test" => Some(Self::TestPattern),
            _ => None,
        }
    }

    pub fn id(&self) -> String {
        self.to_string()
    }

    /// GStreamer source fragment producing raw frames for this target.
    pub fn source_fragment(&self, monitors: &[MonitorInfo]) -> GlimpseResult<String> {
        match self {
            Self::Screen(index) => {
                let monitor = monitors.get(*index).ok_or_else(|| {
                    GlimpseError::capture(format!("Monitor {index} is not connected"))
                })?;
                let (endx, endy) = monitor.end_point();
                Ok(format!(
                    "ximagesrc use-damage=false show-pointer=true startx={} starty={} endx={endx} endy={endy}",
                    monitor.x, monitor.y
                ))
            }
            Self::Window(xid) => Ok(format!(
                "ximagesrc use-damage=false show-pointer=true xid={xid}"
            )),
            Self::TestPattern => Ok(
                "videotestsrc is-live=true pattern=smpte ! video/x-raw,width=1280,height=720"
                    .to_string(),
            ),
        }
    }
}

impl fmt::Display for SourceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Screen(index) => write!(f, "screen:{index}:0"),
            Self::Window(xid) => write!(f, "window:{xid}:0"),
            Self::TestPattern => f.write_str("test:0:0"),
        }
    }
}
