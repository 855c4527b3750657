//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::clock::DEFAULT_FRAME_RATE;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory the save pipeline proposes files in.
    pub output_dir: PathBuf,

    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// When the orchestrator routes the capture through the frame compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompositorMode {
    /// Only when an enabled backend needs a normalised pixel source.
    #[default]
    Auto,
    Always,
    Never,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Capture frame-rate target.
    pub capture_fps: f64,

    /// Frame rate of the stream handed to encoders.
    pub record_fps: f64,

    /// Container/codec MIME type for the container backend.
    pub video_mime_type: String,

    /// Container bit rate in MiB per second.
    pub bit_rate_mib: f64,

    /// Whether the container backend starts enabled.
    pub container_enabled: bool,

    /// Whether the palette (GIF) backend starts enabled.
    pub palette_enabled: bool,

    /// GIF encode options.
    pub gif: GifDefaults,

    /// How long to wait for the host's source picker before giving up.
    pub picker_timeout_secs: u64,

    pub compositor: CompositorMode,
}

/// Default palette encoder options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GifDefaults {
    pub fps: f64,

    /// NeuQuant sample factor, 1 (best) to 30 (fastest).
    pub quality: u8,

    /// Dithering mode name, e.g. `none`, `FloydSteinberg`, `Atkinson-serpentine`.
    pub dither: String,

    /// Number of parallel quantisation workers.
    pub workers: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "glimpse=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            recording: RecordingDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            capture_fps: DEFAULT_FRAME_RATE,
            record_fps: DEFAULT_FRAME_RATE,
            video_mime_type: "video/webm;codecs=vp9".to_string(),
            bit_rate_mib: 2.5,
            container_enabled: true,
            palette_enabled: false,
            gif: GifDefaults::default(),
            picker_timeout_secs: 60,
            compositor: CompositorMode::Auto,
        }
    }
}

impl Default for GifDefaults {
    fn default() -> Self {
        Self {
            fps: 10.0,
            quality: 10,
            dither: "none".to_string(),
            workers: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("glimpse").join("config.json")
}

/// Default directory for saved recordings.
fn default_output_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join("Videos")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let json = r#"{ "recording": { "palette_enabled": true, "gif": { "fps": 15 } } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert!(config.recording.palette_enabled);
        assert_eq!(config.recording.gif.fps, 15.0);
        assert_eq!(config.recording.gif.quality, 10);
        assert_eq!(config.recording.video_mime_type, "video/webm;codecs=vp9");
        assert_eq!(config.recording.compositor, CompositorMode::Auto);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn compositor_mode_is_lowercase_on_the_wire() {
        let json = serde_json::to_string(&CompositorMode::Always).unwrap();
        assert_eq!(json, "\"always\"");
    }
}
