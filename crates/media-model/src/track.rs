//! Live video tracks and their readers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glimpse_common::error::{GlimpseError, GlimpseResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::watch;

use crate::frame::VideoFrame;

/// Frames a slow reader may fall behind before it starts skipping.
const FRAME_BUFFER: usize = 8;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Constraints a consumer may ask a live track to honour.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackConstraints {
    pub frame_rate: Option<f64>,
}

/// Current settings of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSettings {
    /// Size of the most recent frame, zero before the first one.
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl TrackSettings {
    pub fn with_frame_rate(frame_rate: f64) -> Self {
        Self {
            width: 0,
            height: 0,
            frame_rate,
        }
    }
}

/// Lifecycle of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackState {
    Live,
    /// Stopped by a consumer or ended by its producer.
    Ended,
    /// The producer hit an error; readers see it once buffered frames are drained.
    Failed(String),
}

/// Producer-side control hooks for a track.
///
/// Implemented by whatever feeds the track (a capture pipeline, the
/// compositor) so that constraints and stop requests reach it.
pub trait TrackSource: Send + Sync {
    /// Apply new constraints to the running producer.
    fn apply_constraints(&self, constraints: &TrackConstraints) -> GlimpseResult<()>;

    /// Halt the producer. Called at most once.
    fn stop(&self);
}

struct TrackInner {
    id: u64,
    label: String,
    frames: broadcast::Sender<VideoFrame>,
    state: watch::Sender<TrackState>,
    settings: Mutex<TrackSettings>,
    source: Option<Arc<dyn TrackSource>>,
}

/// Shared handle to a live video track.
#[derive(Clone)]
pub struct VideoTrack {
    inner: Arc<TrackInner>,
}

impl fmt::Debug for VideoTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoTrack")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl VideoTrack {
    /// Create a track with no producer-side hooks.
    pub fn new(label: impl Into<String>, settings: TrackSettings) -> (Self, TrackWriter) {
        Self::build(label.into(), settings, None)
    }

    /// Create a track whose constraints and stop requests reach `source`.
    pub fn with_source(
        label: impl Into<String>,
        settings: TrackSettings,
        source: Arc<dyn TrackSource>,
    ) -> (Self, TrackWriter) {
        Self::build(label.into(), settings, Some(source))
    }

    fn build(
        label: String,
        settings: TrackSettings,
        source: Option<Arc<dyn TrackSource>>,
    ) -> (Self, TrackWriter) {
        let (frames, _) = broadcast::channel(FRAME_BUFFER);
        let (state, _) = watch::channel(TrackState::Live);
        let inner = Arc::new(TrackInner {
            id: NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed),
            label,
            frames,
            state,
            settings: Mutex::new(settings),
            source,
        });
        (
            Self {
                inner: inner.clone(),
            },
            TrackWriter { inner },
        )
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn settings(&self) -> TrackSettings {
        *self.inner.settings.lock()
    }

    pub fn state(&self) -> TrackState {
        self.inner.state.borrow().clone()
    }

    pub fn is_live(&self) -> bool {
        *self.inner.state.borrow() == TrackState::Live
    }

    /// Apply constraints to the live track.
    ///
    /// Settings only change once the producer accepted the constraints.
    pub fn apply_constraints(&self, constraints: &TrackConstraints) -> GlimpseResult<()> {
        if !self.is_live() {
            return Err(GlimpseError::media(format!(
                "Track {} is no longer live",
                self.inner.label
            )));
        }
        if let Some(fps) = constraints.frame_rate {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(GlimpseError::media(format!("Invalid frame rate {fps}")));
            }
        }
        if let Some(source) = &self.inner.source {
            source.apply_constraints(constraints)?;
        }
        if let Some(fps) = constraints.frame_rate {
            self.inner.settings.lock().frame_rate = fps;
        }
        Ok(())
    }

    /// Stop the track. Idempotent.
    pub fn stop(&self) {
        let stopped = self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Ended;
                true
            } else {
                false
            }
        });
        if stopped {
            tracing::debug!(track = %self.inner.label, id = self.inner.id, "Track stopped");
            if let Some(source) = &self.inner.source {
                source.stop();
            }
        }
    }

    /// Open a reader that receives every frame pushed from now on.
    pub fn reader(&self) -> FrameReader {
        FrameReader {
            frames: self.inner.frames.subscribe(),
            state: self.inner.state.subscribe(),
            skipped: 0,
        }
    }
}

/// Producer side of a [`VideoTrack`].
pub struct TrackWriter {
    inner: Arc<TrackInner>,
}

impl TrackWriter {
    /// Publish a frame. Returns false once the track is no longer live.
    pub fn push(&self, frame: VideoFrame) -> bool {
        if *self.inner.state.borrow() != TrackState::Live {
            return false;
        }
        {
            let mut settings = self.inner.settings.lock();
            settings.width = frame.width();
            settings.height = frame.height();
        }
        // No receivers is fine: nobody is reading yet.
        let _ = self.inner.frames.send(frame);
        true
    }

    /// Mark the track finished from the producer side.
    pub fn end(&self) {
        self.transition(TrackState::Ended);
    }

    /// Mark the track failed; readers surface `reason` after draining.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(track = %self.inner.label, %reason, "Track failed");
        self.transition(TrackState::Failed(reason));
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.state.borrow() != TrackState::Live
    }

    /// Resolve once the track leaves the live state.
    pub async fn closed(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|s| *s != TrackState::Live).await;
    }

    pub fn track_id(&self) -> u64 {
        self.inner.id
    }

    fn transition(&self, next: TrackState) {
        self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = next;
                true
            } else {
                false
            }
        });
    }
}

/// Pulls frames from a track.
pub struct FrameReader {
    frames: broadcast::Receiver<VideoFrame>,
    state: watch::Receiver<TrackState>,
    skipped: u64,
}

impl FrameReader {
    /// Wait for the next frame.
    ///
    /// Frames already sent to this reader are returned before the end of
    /// the track is reported. Returns `Ok(None)` once the track has ended
    /// and an error if its producer failed.
    pub async fn read(&mut self) -> GlimpseResult<Option<VideoFrame>> {
        loop {
            match self.frames.try_recv() {
                Ok(frame) => return Ok(Some(frame)),
                Err(TryRecvError::Lagged(n)) => {
                    self.note_skipped(n);
                    continue;
                }
                Err(TryRecvError::Closed) => return self.finished(),
                Err(TryRecvError::Empty) => {}
            }

            if let Some(terminal) = self.terminal() {
                return terminal;
            }

            tokio::select! {
                received = self.frames.recv() => match received {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(RecvError::Lagged(n)) => self.note_skipped(n),
                    Err(RecvError::Closed) => return self.finished(),
                },
                changed = self.state.changed() => {
                    if changed.is_err() {
                        return self.finished();
                    }
                }
            }
        }
    }

    /// Take a buffered frame without waiting.
    pub fn try_read(&mut self) -> Option<VideoFrame> {
        loop {
            match self.frames.try_recv() {
                Ok(frame) => return Some(frame),
                Err(TryRecvError::Lagged(n)) => self.note_skipped(n),
                Err(_) => return None,
            }
        }
    }

    /// Frames skipped because this reader fell behind.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn note_skipped(&mut self, n: u64) {
        self.skipped += n;
        tracing::trace!(skipped = n, "Frame reader lagged");
    }

    fn terminal(&self) -> Option<GlimpseResult<Option<VideoFrame>>> {
        match &*self.state.borrow() {
            TrackState::Live => None,
            TrackState::Ended => Some(Ok(None)),
            TrackState::Failed(reason) => Some(Err(GlimpseError::media(format!(
                "Track failed: {reason}"
            )))),
        }
    }

    fn finished(&self) -> GlimpseResult<Option<VideoFrame>> {
        self.terminal().unwrap_or(Ok(None))
    }
}
