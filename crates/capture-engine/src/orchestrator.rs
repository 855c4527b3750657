//! Recording orchestrator.
//!
//! Owns the encoder backends and the record stream. A recording derives one
//! record stream from the live capture, fans it out to every enabled
//! backend, and on stop collects one artifact per started backend and hands
//! each to the [`SavePipeline`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use glimpse_common::clock::normalize_frame_rate;
use glimpse_common::config::{CompositorMode, RecordingDefaults};
use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_encoders::{
    BackendKind, ContainerBackend, EncoderBackend, OptionValue, PaletteBackend, PaletteOptions,
    StreamEncoderFactory,
};
use glimpse_media_model::{MediaStream, TrackConstraints};
use glimpse_platform_core::DesktopHost;
use glimpse_render_engine::{CompositorStats, FrameCompositor, Resampler};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::save::SavePipeline;
use crate::session::{CaptureRequest, CaptureSessionManager};

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// Events emitted on recording lifecycle transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    Started { backends: Vec<BackendKind> },
    BackendFailed { kind: BackendKind, message: String },
    Saved { kind: BackendKind, path: PathBuf },
    SaveCancelled { kind: BackendKind },
    Stopped,
}

/// Orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    /// Frame rate of the record stream handed to backends.
    pub record_fps: f64,
    pub compositor: CompositorMode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            record_fps: normalize_frame_rate(None),
            compositor: CompositorMode::Auto,
        }
    }
}

impl From<&RecordingDefaults> for OrchestratorConfig {
    fn from(defaults: &RecordingDefaults) -> Self {
        Self {
            record_fps: normalize_frame_rate(Some(defaults.record_fps)),
            compositor: defaults.compositor,
        }
    }
}

/// Result of `start_recording`.
#[derive(Debug, Default)]
pub struct StartOutcome {
    pub started: Vec<BackendKind>,
    /// Enabled backends that failed to start. The recording runs without them.
    pub failures: Vec<(BackendKind, GlimpseError)>,
    /// Whether the record stream goes through the frame compositor.
    pub composited: bool,
}

/// A saved artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub kind: BackendKind,
    pub path: PathBuf,
    pub mime_type: String,
    pub len: usize,
}

/// Result of `stop_recording`.
#[derive(Debug, Default)]
pub struct StopOutcome {
    pub saved: Vec<SavedArtifact>,
    /// Backends whose save dialog was cancelled.
    pub cancelled: Vec<BackendKind>,
    /// Encode and persist failures, per backend.
    pub failures: Vec<(BackendKind, GlimpseError)>,
    /// Failure of the record stream itself, e.g. a compositor pull error.
    pub stream_error: Option<GlimpseError>,
    pub compositor: Option<CompositorStats>,
}

impl StopOutcome {
    /// Artifacts delivered by backends, saved or not.
    pub fn artifact_count(&self) -> usize {
        self.saved.len()
            + self.cancelled.len()
            + self
                .failures
                .iter()
                .filter(|(_, e)| matches!(e, GlimpseError::Persist { .. }))
                .count()
    }
}

enum RecordSource {
    Composited(FrameCompositor),
    Direct(Resampler),
}

struct ActiveRecording {
    stream: MediaStream,
    source: RecordSource,
    started: Vec<BackendKind>,
}

/// Build the two stock backends from recording defaults.
pub fn default_backends(
    defaults: &RecordingDefaults,
    factory: Arc<dyn StreamEncoderFactory>,
) -> GlimpseResult<Vec<Arc<dyn EncoderBackend>>> {
    let container = ContainerBackend::new(factory);
    container.set_video_type(&defaults.video_mime_type)?;
    container.set_bit_rate(defaults.bit_rate_mib)?;
    container.set_enabled(defaults.container_enabled);

    let palette = PaletteBackend::new(PaletteOptions::from_defaults(&defaults.gif));
    palette.set_enabled(defaults.palette_enabled);

    Ok(vec![Arc::new(container), Arc::new(palette)])
}

/// Drives capture, the record stream, and the encoder backends.
pub struct RecordingOrchestrator {
    capture: CaptureSessionManager,
    host: Arc<dyn DesktopHost>,
    save: SavePipeline,
    backends: BTreeMap<BackendKind, Arc<dyn EncoderBackend>>,
    config: OrchestratorConfig,
    recording: Option<ActiveRecording>,
    events: broadcast::Sender<RecordingEvent>,
}

impl RecordingOrchestrator {
    pub fn new(
        capture: CaptureSessionManager,
        host: Arc<dyn DesktopHost>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            capture,
            save: SavePipeline::new(host.clone()),
            host,
            backends: BTreeMap::new(),
            config,
            recording: None,
            events,
        }
    }

    /// Register a backend, replacing any earlier backend of the same kind.
    pub fn register_backend(&mut self, backend: Arc<dyn EncoderBackend>) {
        let kind = backend.kind();
        if self.backends.insert(kind, backend).is_some() {
            tracing::debug!(%kind, "Replaced encoder backend");
        }
    }

    pub fn with_backends(
        mut self,
        backends: impl IntoIterator<Item = Arc<dyn EncoderBackend>>,
    ) -> Self {
        for backend in backends {
            self.register_backend(backend);
        }
        self
    }

    pub fn backend(&self, kind: BackendKind) -> Option<&Arc<dyn EncoderBackend>> {
        self.backends.get(&kind)
    }

    pub fn capture(&self) -> &CaptureSessionManager {
        &self.capture
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> RecordingState {
        if self.recording.is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    /// True while any backend has a run that has not delivered its artifact.
    pub fn is_recording(&self) -> bool {
        self.backends.values().any(|backend| backend.is_active())
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_capturing()
    }

    /// Enable or disable a backend for the next recording.
    pub fn set_backend_enabled(&self, kind: BackendKind, enabled: bool) -> GlimpseResult<()> {
        self.require_backend(kind)?.set_enabled(enabled);
        if self.recording.is_some() {
            tracing::debug!(%kind, enabled, "Backend toggle applies to the next recording");
        }
        Ok(())
    }

    /// Set a backend option by name.
    pub fn configure_backend(
        &self,
        kind: BackendKind,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> GlimpseResult<()> {
        self.require_backend(kind)?.set_option(name, value.into())
    }

    /// Container bit rate in MiB per second.
    pub fn set_bit_rate(&self, mib: f64) -> GlimpseResult<()> {
        self.configure_backend(BackendKind::Container, "bitRate", mib)
    }

    /// Container/codec MIME type, e.g. `video/webm;codecs=vp9`.
    pub fn set_video_type(&self, mime: &str) -> GlimpseResult<()> {
        self.configure_backend(BackendKind::Container, "mimeType", mime)
    }

    fn require_backend(&self, kind: BackendKind) -> GlimpseResult<&Arc<dyn EncoderBackend>> {
        self.backends
            .get(&kind)
            .ok_or_else(|| GlimpseError::config(format!("No {kind} backend registered")))
    }

    /// Start a capture session.
    ///
    /// Rejected with `AlreadyRecording` while a recording depends on the
    /// current capture.
    pub async fn start_capture(&mut self, request: CaptureRequest) -> GlimpseResult<MediaStream> {
        if self.recording.is_some() {
            return Err(GlimpseError::AlreadyRecording);
        }
        self.capture.start_capture(request).await
    }

    /// Capture frame-rate target; see [`CaptureSessionManager::set_frame_rate`].
    pub fn set_frame_rate(&mut self, fps: Option<f64>) -> f64 {
        self.capture.set_frame_rate(fps)
    }

    /// Record stream frame rate. Applied live when recording.
    pub fn set_record_frame_rate(&mut self, fps: Option<f64>) -> f64 {
        self.config.record_fps = normalize_frame_rate(fps);
        if let Some(track) = self
            .recording
            .as_ref()
            .and_then(|recording| recording.stream.video_track())
        {
            let constraints = TrackConstraints {
                frame_rate: Some(self.config.record_fps),
            };
            if let Err(e) = track.apply_constraints(&constraints) {
                tracing::warn!(error = %e, "Could not apply frame rate to record stream");
            }
        }
        self.config.record_fps
    }

    /// Stop capturing, stopping any recording first.
    pub async fn stop_capture(&mut self) -> Option<StopOutcome> {
        let outcome = if self.recording.is_some() {
            match self.stop_recording().await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::warn!(error = %e, "Stopping recording before capture failed");
                    None
                }
            }
        } else {
            None
        };
        self.capture.stop_capture();
        outcome
    }

    /// Start recording the live capture with every enabled backend.
    ///
    /// The enabled set is fixed here. Backends that fail to start are
    /// reported in the outcome; if every enabled backend fails, the record
    /// stream is torn down and the first failure is returned.
    pub async fn start_recording(&mut self) -> GlimpseResult<StartOutcome> {
        if self.recording.is_some() {
            return Err(GlimpseError::AlreadyRecording);
        }
        let capture = self
            .capture
            .stream()
            .cloned()
            .ok_or(GlimpseError::NoActiveCapture)?;

        let enabled: Vec<Arc<dyn EncoderBackend>> = self
            .backends
            .values()
            .filter(|backend| backend.is_enabled())
            .cloned()
            .collect();

        let composited = match self.config.compositor {
            CompositorMode::Always => true,
            CompositorMode::Never => false,
            CompositorMode::Auto => enabled.iter().any(|b| b.needs_normalized_frames()),
        };

        let (stream, source) = if composited {
            let compositor = FrameCompositor::start(&capture)?;
            let stream = compositor.capture_stream(self.config.record_fps);
            (stream, RecordSource::Composited(compositor))
        } else {
            let resampler = Resampler::start(&capture, self.config.record_fps)?;
            (resampler.stream().clone(), RecordSource::Direct(resampler))
        };

        let mut outcome = StartOutcome {
            composited,
            ..StartOutcome::default()
        };
        for backend in &enabled {
            let kind = backend.kind();
            match backend.start(&stream) {
                Ok(()) => outcome.started.push(kind),
                Err(e) => {
                    tracing::warn!(%kind, error = %e, "Backend failed to start");
                    let _ = self.events.send(RecordingEvent::BackendFailed {
                        kind,
                        message: e.to_string(),
                    });
                    outcome.failures.push((kind, e));
                }
            }
        }

        if !enabled.is_empty() && outcome.started.is_empty() {
            stream.stop();
            release_source(source).await;
            let (_, first) = outcome
                .failures
                .into_iter()
                .next()
                .ok_or_else(|| GlimpseError::encode("all", "No backend started"))?;
            return Err(first);
        }

        tracing::info!(
            backends = ?outcome.started,
            composited,
            fps = self.config.record_fps,
            "Recording started"
        );
        self.recording = Some(ActiveRecording {
            stream,
            source,
            started: outcome.started.clone(),
        });
        self.host.start_recording();
        let _ = self.events.send(RecordingEvent::Started {
            backends: outcome.started.clone(),
        });
        Ok(outcome)
    }

    /// Stop every started backend, release the record stream, and save each
    /// artifact as it arrives.
    pub async fn stop_recording(&mut self) -> GlimpseResult<StopOutcome> {
        let recording = self.recording.take().ok_or(GlimpseError::NotRecording)?;
        let mut outcome = StopOutcome::default();

        let mut pending = FuturesUnordered::new();
        for kind in &recording.started {
            let Some(backend) = self.backends.get(kind) else {
                continue;
            };
            match backend.stop() {
                Ok(artifact) => pending.push(async move { (artifact.kind(), artifact.await) }),
                Err(e) => {
                    tracing::warn!(%kind, error = %e, "Backend failed to stop");
                    outcome.failures.push((*kind, e));
                }
            }
        }

        // Backends have their stop signal; only now may the stream go.
        recording.stream.stop();
        match recording.source {
            RecordSource::Composited(compositor) => match compositor.shutdown().await {
                Ok(stats) => outcome.compositor = Some(stats),
                Err(e) => {
                    tracing::warn!(error = %e, "Record stream failed");
                    outcome.stream_error = Some(e);
                }
            },
            RecordSource::Direct(resampler) => {
                if let Err(e) = resampler.shutdown().await {
                    tracing::warn!(error = %e, "Record stream failed");
                    outcome.stream_error = Some(e);
                }
            }
        }
        self.host.stop_recording();

        while let Some((kind, delivered)) = pending.next().await {
            let artifact = match delivered {
                Ok(artifact) => artifact,
                Err(e) => {
                    tracing::warn!(%kind, error = %e, "Backend produced no artifact");
                    let _ = self.events.send(RecordingEvent::BackendFailed {
                        kind,
                        message: e.to_string(),
                    });
                    outcome.failures.push((kind, e));
                    continue;
                }
            };

            let mime_type = artifact.mime_type.clone();
            let len = artifact.bytes.len();
            match self.save.persist(artifact).await {
                Ok(Some(path)) => {
                    let _ = self.events.send(RecordingEvent::Saved {
                        kind,
                        path: path.clone(),
                    });
                    outcome.saved.push(SavedArtifact {
                        kind,
                        path,
                        mime_type,
                        len,
                    });
                }
                Ok(None) => {
                    let _ = self.events.send(RecordingEvent::SaveCancelled { kind });
                    outcome.cancelled.push(kind);
                }
                Err(e) => outcome.failures.push((kind, e)),
            }
        }

        tracing::info!(
            saved = outcome.saved.len(),
            cancelled = outcome.cancelled.len(),
            failures = outcome.failures.len(),
            "Recording stopped"
        );
        let _ = self.events.send(RecordingEvent::Stopped);
        Ok(outcome)
    }
}

async fn release_source(source: RecordSource) {
    let result = match source {
        RecordSource::Composited(compositor) => compositor.shutdown().await.map(|_| ()),
        RecordSource::Direct(resampler) => resampler.shutdown().await.map(|_| ()),
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "Record stream ended with an error");
    }
}
