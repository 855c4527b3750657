//! The Linux desktop host.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_media_model::{MediaStream, TrackConstraints};
use glimpse_platform_core::{CaptureSource, DesktopHost, DisplayMedia, MonitorInfo, SourceSelection};

use crate::display::{detect_monitors, list_windows};
use crate::media::start_capture_stream;
use crate::save::{propose_save_path, write_artifact};
use crate::target::SourceTarget;
use crate::thumbnail::{fit_within, snapshot, THUMBNAIL_EDGE};

/// Options of the Linux host.
#[derive(Debug, Clone)]
pub struct LinuxHostConfig {
    /// Directory artifacts are saved into.
    pub output_dir: PathBuf,
    /// Take a snapshot of every source when enumerating.
    pub thumbnails: bool,
    /// Offer a synthetic test pattern source.
    pub test_source: bool,
}

/// X11 host backed by `xrandr`, `wmctrl`, and GStreamer.
pub struct LinuxHost {
    config: LinuxHostConfig,
    selection: SourceSelection,
    recording: AtomicBool,
}

impl LinuxHost {
    pub fn new(config: LinuxHostConfig) -> Self {
        Self {
            config,
            selection: SourceSelection::new(),
            recording: AtomicBool::new(false),
        }
    }

    pub fn selection(&self) -> &SourceSelection {
        &self.selection
    }

    /// Whether the host shows the recording indicator.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    async fn monitors(&self) -> Vec<MonitorInfo> {
        match detect_monitors().await {
            Ok(monitors) => monitors,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list monitors");
                Vec::new()
            }
        }
    }

    async fn enumerate(&self, monitors: &[MonitorInfo]) -> Vec<(SourceTarget, String)> {
        let mut targets: Vec<(SourceTarget, String)> = monitors
            .iter()
            .enumerate()
            .map(|(index, monitor)| (SourceTarget::Screen(index), monitor.name.clone()))
            .collect();

        match list_windows().await {
            Ok(windows) => targets.extend(
                windows
                    .into_iter()
                    .map(|window| (SourceTarget::Window(window.xid), window.title)),
            ),
            Err(e) => tracing::debug!(error = %e, "Window listing unavailable"),
        }

        if self.config.test_source {
            targets.push((SourceTarget::TestPattern, "Test pattern".to_string()));
        }
        targets
    }

    async fn thumbnail(&self, target: SourceTarget, monitors: &[MonitorInfo]) -> String {
        let fragment = match target.source_fragment(monitors) {
            Ok(fragment) => fragment,
            Err(_) => return String::new(),
        };
        let size = match target {
            SourceTarget::Screen(index) => monitors
                .get(index)
                .map(|m| fit_within(m.width, m.height, THUMBNAIL_EDGE))
                .unwrap_or_else(|| fit_within(0, 0, THUMBNAIL_EDGE)),
            SourceTarget::Window(_) => fit_within(0, 0, THUMBNAIL_EDGE),
            SourceTarget::TestPattern => fit_within(1280, 720, THUMBNAIL_EDGE),
        };

        match tokio::task::spawn_blocking(move || snapshot(&fragment, size)).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                tracing::debug!(source = %target, error = %e, "Thumbnail failed");
                String::new()
            }
            Err(e) => {
                tracing::debug!(source = %target, error = %e, "Thumbnail task failed");
                String::new()
            }
        }
    }
}

#[async_trait::async_trait]
impl DesktopHost for LinuxHost {
    async fn get_sources(&self) -> GlimpseResult<Vec<CaptureSource>> {
        let monitors = self.monitors().await;
        let mut sources = Vec::new();
        for (target, name) in self.enumerate(&monitors).await {
            let thumbnail = if self.config.thumbnails {
                self.thumbnail(target, &monitors).await
            } else {
                String::new()
            };
            sources.push(CaptureSource {
                name,
                id: target.id(),
                thumbnail,
            });
        }
        tracing::debug!(count = sources.len(), "Enumerated capture sources");
        Ok(sources)
    }

    fn set_source(&self, id: &str) {
        self.selection.set(id);
    }

    async fn get_save_path(&self, mime_type_hint: &str) -> GlimpseResult<Option<PathBuf>> {
        Ok(Some(propose_save_path(&self.config.output_dir, mime_type_hint)))
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> GlimpseResult<()> {
        write_artifact(path, bytes).await
    }

    fn start_recording(&self) {
        self.recording.store(true, Ordering::SeqCst);
        tracing::info!("Recording indicator on");
    }

    fn stop_recording(&self) {
        self.recording.store(false, Ordering::SeqCst);
        tracing::info!("Recording indicator off");
    }
}

#[async_trait::async_trait]
impl DisplayMedia for LinuxHost {
    async fn get_display_media(
        &self,
        constraints: &TrackConstraints,
    ) -> GlimpseResult<MediaStream> {
        let selected = self
            .selection
            .current()
            .ok_or_else(|| GlimpseError::capture_denied("No capture source selected"))?;
        let target = SourceTarget::parse(&selected).ok_or_else(|| {
            GlimpseError::capture_denied(format!("Unknown capture source {selected}"))
        })?;

        let monitors = self.monitors().await;
        let sources = self.enumerate(&monitors).await;
        let Some((_, name)) = sources.into_iter().find(|(t, _)| *t == target) else {
            return Err(GlimpseError::capture_denied(format!(
                "Capture source {selected} is not available"
            )));
        };

        let fragment = target.source_fragment(&monitors)?;
        let fps = constraints.frame_rate.unwrap_or_default();
        start_capture_stream(&name, &fragment, fps)
    }
}
