//! Capture session management.

use std::sync::Arc;
use std::time::Duration;

use glimpse_common::clock::normalize_frame_rate;
use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_media_model::{MediaStream, TrackConstraints};
use glimpse_platform_core::{DesktopHost, DisplayMedia, PreviewSink};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What to capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    /// Source id to select before requesting display media. `None` keeps
    /// whatever the host has selected.
    pub source_id: Option<String>,

    /// Frame-rate target; replaces the manager's target when set.
    pub frame_rate: Option<f64>,
}

impl CaptureRequest {
    pub fn source(id: impl Into<String>) -> Self {
        Self {
            source_id: Some(id.into()),
            frame_rate: None,
        }
    }
}

/// Capture lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Started {
        stream_id: u64,
        source_id: Option<String>,
    },
    Stopped {
        stream_id: u64,
    },
    FrameRateChanged {
        fps: f64,
        /// Whether the live track accepted the new rate.
        applied_live: bool,
    },
}

/// A live capture.
#[derive(Debug)]
struct CaptureSession {
    stream: MediaStream,
    source_id: Option<String>,
}

/// Acquires and releases the raw capture stream.
///
/// At most one session is live. Starting a new capture while one is live
/// stops the old session first.
pub struct CaptureSessionManager {
    host: Arc<dyn DesktopHost>,
    media: Arc<dyn DisplayMedia>,
    preview: Arc<dyn PreviewSink>,
    frame_rate: f64,
    picker_timeout: Duration,
    session: Option<CaptureSession>,
    events: broadcast::Sender<CaptureEvent>,
}

impl CaptureSessionManager {
    pub fn new(
        host: Arc<dyn DesktopHost>,
        media: Arc<dyn DisplayMedia>,
        preview: Arc<dyn PreviewSink>,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            host,
            media,
            preview,
            frame_rate: normalize_frame_rate(None),
            picker_timeout: Duration::from_secs(60),
            session: None,
            events,
        }
    }

    /// How long `start_capture` waits on the host picker.
    pub fn with_picker_timeout(mut self, timeout: Duration) -> Self {
        self.picker_timeout = timeout;
        self
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    /// The live capture stream, if any.
    pub fn stream(&self) -> Option<&MediaStream> {
        self.session
            .as_ref()
            .map(|session| &session.stream)
            .filter(|stream| stream.is_active())
    }

    pub fn is_capturing(&self) -> bool {
        self.stream().is_some()
    }

    /// Acquire a capture stream for `request`.
    ///
    /// Fails with `CaptureDenied` when the host cannot resolve the source, the
    /// user dismisses the picker, or the picker does not answer in time.
    pub async fn start_capture(&mut self, request: CaptureRequest) -> GlimpseResult<MediaStream> {
        if let Some(fps) = request.frame_rate {
            self.frame_rate = normalize_frame_rate(Some(fps));
        }

        if self.session.is_some() {
            tracing::info!("Superseding live capture session");
            self.stop_capture();
        }

        if let Some(id) = &request.source_id {
            self.host.set_source(id);
        }

        let constraints = TrackConstraints {
            frame_rate: Some(self.frame_rate),
        };
        let granted =
            tokio::time::timeout(self.picker_timeout, self.media.get_display_media(&constraints))
                .await;

        let stream = match granted {
            Err(_) => {
                tracing::warn!(timeout = ?self.picker_timeout, "Display media request timed out");
                return Err(GlimpseError::capture_denied("Source picker timed out"));
            }
            Ok(Err(e)) if e.is_user_cancelled() => {
                tracing::info!(error = %e, "Capture denied");
                return Err(e);
            }
            Ok(Err(GlimpseError::Capture { message })) => {
                return Err(GlimpseError::capture(message));
            }
            Ok(Err(e)) => return Err(GlimpseError::capture(e.to_string())),
            Ok(Ok(stream)) => stream,
        };

        if stream.video_track().is_none() {
            stream.stop();
            return Err(GlimpseError::capture("Granted stream has no video track"));
        }

        self.preview.attach(&stream);
        tracing::info!(
            stream = stream.id(),
            source = ?request.source_id,
            fps = self.frame_rate,
            "Capture started"
        );
        let _ = self.events.send(CaptureEvent::Started {
            stream_id: stream.id(),
            source_id: request.source_id.clone(),
        });

        self.session = Some(CaptureSession {
            stream: stream.clone(),
            source_id: request.source_id,
        });
        Ok(stream)
    }

    /// Stop every track of the current capture. A no-op without one.
    pub fn stop_capture(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.preview.detach();
        session.stream.stop();
        tracing::info!(
            stream = session.stream.id(),
            source = ?session.source_id,
            "Capture stopped"
        );
        let _ = self.events.send(CaptureEvent::Stopped {
            stream_id: session.stream.id(),
        });
    }

    /// Set the frame-rate target and try to apply it to the live track.
    ///
    /// Missing, zero, or negative values become the default. Failing to
    /// apply the rate live is logged; the target still changes. Returns the
    /// new target.
    pub fn set_frame_rate(&mut self, fps: Option<f64>) -> f64 {
        self.frame_rate = normalize_frame_rate(fps);

        let applied_live = match self.stream().and_then(MediaStream::video_track) {
            Some(track) => match track.apply_constraints(&TrackConstraints {
                frame_rate: Some(self.frame_rate),
            }) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        fps = self.frame_rate,
                        error = %e,
                        "Could not apply frame rate to live capture"
                    );
                    false
                }
            },
            None => false,
        };

        let _ = self.events.send(CaptureEvent::FrameRateChanged {
            fps: self.frame_rate,
            applied_live,
        });
        self.frame_rate
    }
}
