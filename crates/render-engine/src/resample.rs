//! Direct re-sampler: forwards capture frames at a lower rate.
//!
//! Used when no backend needs a fixed-size pixel source. Frames are kept or
//! dropped by their capture timestamps, so nothing is redrawn or copied.

use std::sync::Arc;

use glimpse_common::clock::{normalize_frame_rate, RateController};
use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_media_model::{
    FrameReader, MediaStream, TrackConstraints, TrackSource, TrackWriter, VideoTrack,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A record stream derived by dropping capture frames.
pub struct Resampler {
    stream: MediaStream,
    task: JoinHandle<GlimpseResult<u64>>,
}

struct RateControl {
    fps_tx: watch::Sender<f64>,
}

impl TrackSource for RateControl {
    fn apply_constraints(&self, constraints: &TrackConstraints) -> GlimpseResult<()> {
        if let Some(fps) = constraints.frame_rate {
            self.fps_tx.send_replace(normalize_frame_rate(Some(fps)));
        }
        Ok(())
    }

    fn stop(&self) {}
}

impl Resampler {
    /// Start forwarding frames of `source`'s video track at `fps`.
    pub fn start(source: &MediaStream, fps: f64) -> GlimpseResult<Self> {
        let track = source
            .video_track()
            .ok_or_else(|| GlimpseError::compositor("Source stream has no video track"))?;

        let fps = normalize_frame_rate(Some(fps));
        let (fps_tx, fps_rx) = watch::channel(fps);
        let mut settings = track.settings();
        settings.frame_rate = fps;
        let (output, writer) = VideoTrack::with_source(
            "resampled",
            settings,
            Arc::new(RateControl { fps_tx }),
        );

        let task = tokio::spawn(forward(track.reader(), writer, fps_rx));
        tracing::debug!(source = %track.label(), fps, "Direct re-sampler started");

        Ok(Self {
            stream: MediaStream::from_track(output),
            task,
        })
    }

    /// The re-sampled stream.
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    /// Stop the output stream and return how many frames were forwarded.
    pub async fn shutdown(self) -> GlimpseResult<u64> {
        self.stream.stop();
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(GlimpseError::compositor(format!("Re-sampler aborted: {e}"))),
        }
    }
}

async fn forward(
    mut reader: FrameReader,
    writer: TrackWriter,
    mut fps_rx: watch::Receiver<f64>,
) -> GlimpseResult<u64> {
    let mut rate = RateController::new(*fps_rx.borrow_and_update());
    let mut forwarded = 0u64;

    loop {
        tokio::select! {
            _ = writer.closed() => return Ok(forwarded),
            changed = fps_rx.changed() => {
                if changed.is_ok() {
                    rate = RateController::new(*fps_rx.borrow_and_update());
                }
            }
            pulled = reader.read() => match pulled {
                Ok(Some(frame)) => {
                    if rate.should_tick(frame.timestamp_ns()) && writer.push(frame) {
                        forwarded += 1;
                    }
                }
                Ok(None) => {
                    writer.end();
                    return Ok(forwarded);
                }
                Err(e) => {
                    writer.fail(e.to_string());
                    return Err(GlimpseError::compositor(format!("Frame pull failed: {e}")));
                }
            },
        }
    }
}
