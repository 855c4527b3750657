//! Capability detection for Linux capture.
//!
//! Glimpse captures through X11 (`ximagesrc`) and enumerates sources with
//! `xrandr` and `wmctrl`; each piece is checked here with a hint on how to
//! get it.

use glimpse_platform_core::DisplayServer;
use gstreamer as gst;
use serde::Serialize;

use crate::display::detect_display_server;
use crate::media::init_gstreamer;

/// A system capability that Glimpse may need.
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// GStreamer elements the capture and thumbnail pipelines use.
pub const CAPTURE_ELEMENTS: [&str; 6] = [
    "ximagesrc",
    "videoconvert",
    "videorate",
    "videoscale",
    "appsink",
    "pngenc",
];

/// Check all capabilities and report status.
pub fn check_capabilities() -> Vec<Capability> {
    vec![
        check_display_server(),
        check_gstreamer_elements(),
        check_tool(
            "xrandr",
            "Monitor enumeration",
            true,
            "Install xrandr: sudo apt install x11-xserver-utils",
        ),
        check_tool(
            "wmctrl",
            "Window enumeration for window capture",
            false,
            "Install wmctrl: sudo apt install wmctrl",
        ),
    ]
}

fn check_display_server() -> Capability {
    let server = detect_display_server();
    let available = server == DisplayServer::X11;
    let fix_instructions = match server {
        DisplayServer::X11 => None,
        DisplayServer::Wayland => Some(
            "Wayland sessions are not supported; log in to an X11 session or run under Xwayland with DISPLAY set"
                .to_string(),
        ),
        DisplayServer::Unknown => {
            Some("Run inside a graphical session with DISPLAY set".to_string())
        }
    };

    Capability {
        name: "X11 Display".to_string(),
        description: format!("Display server for screen capture (detected: {server:?})"),
        available,
        required: true,
        fix_instructions,
    }
}

fn check_gstreamer_elements() -> Capability {
    let missing: Vec<&str> = match init_gstreamer() {
        Ok(()) => CAPTURE_ELEMENTS
            .iter()
            .copied()
            .filter(|name| gst::ElementFactory::find(name).is_none())
            .collect(),
        Err(_) => CAPTURE_ELEMENTS.to_vec(),
    };

    Capability {
        name: "GStreamer Capture Elements".to_string(),
        description: format!("GStreamer plugins: {}", CAPTURE_ELEMENTS.join(", ")),
        available: missing.is_empty(),
        required: true,
        fix_instructions: (!missing.is_empty()).then(|| {
            format!(
                "Missing {}; install gstreamer1.0-plugins-base and gstreamer1.0-plugins-good",
                missing.join(", ")
            )
        }),
    }
}

fn check_tool(program: &str, description: &str, required: bool, fix: &str) -> Capability {
    let available = std::process::Command::new("sh")
        .args(["-c", &format!("command -v {program}")])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    Capability {
        name: program.to_string(),
        description: description.to_string(),
        available,
        required,
        fix_instructions: (!available).then(|| fix.to_string()),
    }
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("Glimpse System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_covers_every_check() {
        let names: Vec<String> = check_capabilities().into_iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            ["X11 Display", "GStreamer Capture Elements", "xrandr", "wmctrl"]
        );
    }

    #[test]
    fn missing_tools_carry_a_fix() {
        let cap = check_tool("glimpse-no-such-tool", "nothing", false, "install it");
        assert!(!cap.available);
        assert_eq!(cap.fix_instructions.as_deref(), Some("install it"));
    }
}
