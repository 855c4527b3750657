//! The run loop shared by both backend variants.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_media_model::{FrameReader, VideoFrame};
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};

use crate::backend::{BackendEvent, BackendKind, EncodedArtifact, PendingArtifact};

/// Where a recorder sends the frames it reads.
#[async_trait::async_trait]
pub(crate) trait FrameSink: Send {
    async fn accept(&mut self, frame: VideoFrame) -> GlimpseResult<()>;

    /// Flush everything and produce the artifact.
    async fn finish(self: Box<Self>) -> GlimpseResult<EncodedArtifact>;
}

/// Handle to a running recorder task.
struct ActiveRecorder {
    stop_tx: Option<oneshot::Sender<()>>,
    artifact_rx: Option<oneshot::Receiver<GlimpseResult<EncodedArtifact>>>,
    finished: Arc<AtomicBool>,
}

impl ActiveRecorder {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Holds a backend's recorder from `start` until its artifact is delivered.
pub(crate) struct RecorderSlot {
    kind: BackendKind,
    active: Mutex<Option<ActiveRecorder>>,
    events: broadcast::Sender<BackendEvent>,
}

impl RecorderSlot {
    pub(crate) fn new(kind: BackendKind) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            kind,
            active: Mutex::new(None),
            events,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|recorder| !recorder.is_finished())
    }

    /// Fail with `BackendBusy` unless the slot can take a new run.
    pub(crate) fn ensure_idle(&self) -> GlimpseResult<()> {
        if self.is_active() {
            return Err(GlimpseError::backend_busy(self.kind.as_str()));
        }
        Ok(())
    }

    /// Spawn a recorder reading `reader` into `sink`.
    pub(crate) fn begin(&self, reader: FrameReader, sink: Box<dyn FrameSink>) -> GlimpseResult<()> {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|recorder| !recorder.is_finished()) {
            return Err(GlimpseError::backend_busy(self.kind.as_str()));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (artifact_tx, artifact_rx) = oneshot::channel();
        let finished = Arc::new(AtomicBool::new(false));

        tokio::spawn(run(
            self.kind,
            reader,
            sink,
            stop_rx,
            artifact_tx,
            finished.clone(),
            self.events.clone(),
        ));

        *active = Some(ActiveRecorder {
            stop_tx: Some(stop_tx),
            artifact_rx: Some(artifact_rx),
            finished,
        });
        let _ = self.events.send(BackendEvent::Started { kind: self.kind });
        tracing::info!(backend = %self.kind, "Encoder backend started");
        Ok(())
    }

    /// Signal the running recorder to stop.
    pub(crate) fn end(&self) -> GlimpseResult<PendingArtifact> {
        let mut active = self.active.lock();
        let recorder = active.as_mut().ok_or(GlimpseError::NotRecording)?;
        let (Some(stop_tx), Some(artifact_rx)) =
            (recorder.stop_tx.take(), recorder.artifact_rx.take())
        else {
            return Err(GlimpseError::NotRecording);
        };

        let _ = stop_tx.send(());
        tracing::info!(backend = %self.kind, "Encoder backend stopping");
        Ok(PendingArtifact::new(self.kind, artifact_rx))
    }
}

async fn run(
    kind: BackendKind,
    mut reader: FrameReader,
    mut sink: Box<dyn FrameSink>,
    mut stop_rx: oneshot::Receiver<()>,
    artifact_tx: oneshot::Sender<GlimpseResult<EncodedArtifact>>,
    finished: Arc<AtomicBool>,
    events: broadcast::Sender<BackendEvent>,
) {
    let mut stop_requested = false;
    let mut frames = 0u64;

    let outcome: GlimpseResult<()> = loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => {
                stop_requested = true;
                break drain(&mut reader, sink.as_mut(), &mut frames).await;
            }
            pulled = reader.read() => match pulled {
                Ok(Some(frame)) => {
                    frames += 1;
                    if let Err(e) = sink.accept(frame).await {
                        break Err(e);
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(GlimpseError::encode(kind.as_str(), e.to_string())),
            },
        }
    };

    if let Err(e) = &outcome {
        tracing::error!(backend = %kind, error = %e, "Encoder backend failed");
        let _ = events.send(BackendEvent::Failed {
            kind,
            message: e.to_string(),
        });
    }

    // The artifact only goes out after stop() was called.
    if !stop_requested {
        let _ = stop_rx.await;
    }

    let result = match outcome {
        Ok(()) => sink.finish().await,
        Err(e) => Err(e),
    };

    let _ = events.send(BackendEvent::Stopped { kind });
    match &result {
        Ok(artifact) => {
            tracing::info!(
                backend = %kind,
                frames,
                bytes = artifact.bytes.len(),
                mime = %artifact.mime_type,
                "Encoder backend produced artifact"
            );
            let _ = events.send(BackendEvent::DataAvailable {
                kind,
                len: artifact.bytes.len(),
            });
        }
        Err(e) => tracing::warn!(backend = %kind, error = %e, "Encoder backend finished without artifact"),
    }

    finished.store(true, Ordering::SeqCst);
    let _ = artifact_tx.send(result);
}

/// Hand frames already buffered for this reader to the sink.
async fn drain(
    reader: &mut FrameReader,
    sink: &mut dyn FrameSink,
    frames: &mut u64,
) -> GlimpseResult<()> {
    while let Some(frame) = reader.try_read() {
        *frames += 1;
        sink.accept(frame).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimpse_media_model::{TrackSettings, VideoTrack};

    struct CountingSink {
        seen: Vec<u64>,
    }

    #[async_trait::async_trait]
    impl FrameSink for CountingSink {
        async fn accept(&mut self, frame: VideoFrame) -> GlimpseResult<()> {
            self.seen.push(frame.timestamp_ns());
            Ok(())
        }

        async fn finish(self: Box<Self>) -> GlimpseResult<EncodedArtifact> {
            Ok(EncodedArtifact {
                bytes: self.seen.iter().map(|ts| *ts as u8).collect(),
                mime_type: "test/count".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn buffered_frames_reach_the_sink_before_finish() {
        let (track, writer) = VideoTrack::new("record", TrackSettings::with_frame_rate(30.0));
        let slot = RecorderSlot::new(BackendKind::Container);
        slot.begin(track.reader(), Box::new(CountingSink { seen: Vec::new() }))
            .unwrap();

        for ts in 1..=3 {
            writer.push(VideoFrame::solid(1, 1, ts, [0; 4]));
        }
        let artifact = slot.end().unwrap().await.unwrap();

        assert_eq!(artifact.bytes, vec![1, 2, 3]);
        assert!(!slot.is_active());
    }

    #[tokio::test]
    async fn restart_before_delivery_is_rejected() {
        let (track, _writer) = VideoTrack::new("record", TrackSettings::with_frame_rate(30.0));
        let slot = RecorderSlot::new(BackendKind::Palette);
        slot.begin(track.reader(), Box::new(CountingSink { seen: Vec::new() }))
            .unwrap();

        let err = slot
            .begin(track.reader(), Box::new(CountingSink { seen: Vec::new() }))
            .unwrap_err();
        assert!(matches!(err, GlimpseError::BackendBusy { .. }));

        let pending = slot.end().unwrap();
        assert!(matches!(slot.end().unwrap_err(), GlimpseError::NotRecording));
        pending.await.unwrap();

        slot.begin(track.reader(), Box::new(CountingSink { seen: Vec::new() }))
            .unwrap();
    }

    #[tokio::test]
    async fn ended_track_waits_for_stop() {
        let (track, writer) = VideoTrack::new("record", TrackSettings::with_frame_rate(30.0));
        let slot = RecorderSlot::new(BackendKind::Container);
        let mut events = slot.subscribe();
        slot.begin(track.reader(), Box::new(CountingSink { seen: Vec::new() }))
            .unwrap();

        writer.end();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(slot.is_active());

        slot.end().unwrap().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            BackendEvent::Started {
                kind: BackendKind::Container
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            BackendEvent::Stopped {
                kind: BackendKind::Container
            }
        );
    }
}
