//! Display server detection and X11 screen/window enumeration.

use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_platform_core::{DisplayServer, MonitorInfo};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// A top-level X11 window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub xid: u64,
    pub title: String,
}

/// Detect the current display server.
pub fn detect_display_server() -> DisplayServer {
    if std::env::var("WAYLAND_DISPLAY").is_ok() {
        DisplayServer::Wayland
    } else if std::env::var("DISPLAY").is_ok() {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}

/// Enumerate monitors with `xrandr --listmonitors`.
pub async fn detect_monitors() -> GlimpseResult<Vec<MonitorInfo>> {
    let stdout = run_tool("xrandr", &["--listmonitors"]).await?;
    let monitors = parse_xrandr_monitors(&stdout);
    tracing::debug!(count = monitors.len(), "Detected monitors");
    Ok(monitors)
}

/// Enumerate top-level windows with `wmctrl -l`.
pub async fn list_windows() -> GlimpseResult<Vec<WindowInfo>> {
    let stdout = run_tool("wmctrl", &["-l"]).await?;
    Ok(parse_wmctrl_windows(&stdout))
}

async fn run_tool(program: &str, args: &[&str]) -> GlimpseResult<String> {
    let output = Command::new(program).args(args).output().await.map_err(|e| {
        GlimpseError::platform(format!("Failed to run {program}: {e}"))
    })?;
    if !output.status.success() {
        return Err(GlimpseError::platform(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `xrandr --listmonitors` output.
///
/// ```text
/// Monitors: 2
///  0: +*eDP-1 1920/344x1080/193+0+0  eDP-1
///  1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1
/// ```
pub fn parse_xrandr_monitors(output: &str) -> Vec<MonitorInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            fields.next()?.strip_suffix(':')?;
            let flags = fields.next()?;
            let geometry = fields.next()?;
            let name = fields
                .next()
                .unwrap_or_else(|| flags.trim_start_matches(['+', '*']));
            let (width, height, x, y) = parse_geometry(geometry)?;
            Some(MonitorInfo {
                name: name.to_string(),
                width,
                height,
                x,
                y,
                primary: flags.contains('*'),
            })
        })
        .collect()
}

/// `W/mmwxH/mmh+X+Y`
fn parse_geometry(geometry: &str) -> Option<(u32, u32, i32, i32)> {
    let mut parts = geometry.split('+');
    let size = parts.next()?;
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let (w, h) = size.split_once('x')?;
    let width = w.split('/').next()?.parse().ok()?;
    let height = h.split('/').next()?.parse().ok()?;
    Some((width, height, x, y))
}

/// Parse `wmctrl -l` output: `<xid> <desktop> <host> <title...>`.
pub fn parse_wmctrl_windows(output: &str) -> Vec<WindowInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut rest = line.trim();
            let mut fields = [""; 3];
            for field in &mut fields {
                let (head, tail) = rest.split_once(char::is_whitespace)?;
                *field = head;
                rest = tail.trim_start();
            }
            let xid = u64::from_str_radix(fields[0].trim_start_matches("0x"), 16).ok()?;
            let title = rest.trim();
            (!title.is_empty()).then(|| WindowInfo {
                xid,
                title: title.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xrandr_monitors_parse() {
        let output = "Monitors: 2\n 0: +*eDP-1 1920/344x1080/193+0+0  eDP-1\n 1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1\n";
        let monitors = parse_xrandr_monitors(output);

        assert_eq!(monitors.len(), 2);
        assert_eq!(monitors[0].name, "eDP-1");
        assert!(monitors[0].primary);
        assert_eq!((monitors[1].width, monitors[1].height), (2560, 1440));
        assert_eq!((monitors[1].x, monitors[1].y), (1920, 0));
        assert!(!monitors[1].primary);
    }

    #[test]
    fn xrandr_garbage_is_skipped() {
        assert!(parse_xrandr_monitors("Monitors: 0\nnonsense line\n").is_empty());
    }

    #[test]
    fn wmctrl_titles_keep_spaces() {
        let output = "0x03a00003  0 workstation Terminal - vim  notes.md\n0x04000007 -1 workstation \n";
        let windows = parse_wmctrl_windows(output);

        assert_eq!(
            windows,
            vec![WindowInfo {
                xid: 0x03a00003,
                title: "Terminal - vim  notes.md".to_string(),
            }]
        );
    }
}
