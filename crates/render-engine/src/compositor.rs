//! Frame compositor: redraws a capture onto a surface and re-samples it.
//!
//! A single pull loop reads the source track as fast as frames arrive and
//! draws each one onto the shared [`Surface`], closing the source frame
//! straight after. Output streams created by
//! [`FrameCompositor::capture_stream`] copy the surface out on their own
//! timer, so their frame rate is independent of the pull rate.

use std::sync::Arc;
use std::time::Duration;

use glimpse_common::clock::{normalize_frame_rate, RecordingClock};
use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_media_model::{
    FrameReader, MediaStream, TrackConstraints, TrackSettings, TrackSource, TrackWriter,
    VideoTrack,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::surface::Surface;

/// Counters reported when the compositor shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompositorStats {
    pub frames_drawn: u64,
    pub resizes: u64,
    /// Source frames dropped because the pull loop fell behind.
    pub frames_skipped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PullStatus {
    Running,
    Finished,
    Failed(String),
}

/// Re-samples a capture stream through an off-screen surface.
pub struct FrameCompositor {
    surface: Arc<Mutex<Surface>>,
    clock: RecordingClock,
    stop_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<PullStatus>,
    pull_task: JoinHandle<GlimpseResult<CompositorStats>>,
    samplers: Mutex<Vec<JoinHandle<()>>>,
}

impl FrameCompositor {
    /// Start pulling frames from the first video track of `source`.
    pub fn start(source: &MediaStream) -> GlimpseResult<Self> {
        let track = source
            .video_track()
            .ok_or_else(|| GlimpseError::compositor("Source stream has no video track"))?;
        if !track.is_live() {
            return Err(GlimpseError::compositor(format!(
                "Source track {} is not live",
                track.label()
            )));
        }

        let surface = Arc::new(Mutex::new(Surface::new()));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(PullStatus::Running);

        let pull_task = tokio::spawn(pull_loop(
            track.reader(),
            surface.clone(),
            stop_rx,
            status_tx,
        ));

        tracing::info!(source = %track.label(), "Frame compositor started");

        Ok(Self {
            surface,
            clock: RecordingClock::start(),
            stop_tx,
            status_rx,
            pull_task,
            samplers: Mutex::new(Vec::new()),
        })
    }

    /// Expose the surface as a live stream sampled at `fps`.
    ///
    /// The output track accepts frame-rate constraints while live. It ends
    /// when the compositor shuts down and fails if the pull loop fails.
    pub fn capture_stream(&self, fps: f64) -> MediaStream {
        let fps = normalize_frame_rate(Some(fps));
        let (fps_tx, fps_rx) = watch::channel(fps);
        let control = Arc::new(SamplerControl { fps_tx });
        let (track, writer) = VideoTrack::with_source(
            "compositor",
            TrackSettings::with_frame_rate(fps),
            control,
        );

        let sampler = tokio::spawn(sample_loop(
            self.surface.clone(),
            writer,
            fps_rx,
            self.status_rx.clone(),
            self.clock.clone(),
        ));
        self.samplers.lock().push(sampler);

        tracing::debug!(fps, track = track.id(), "Compositor output stream created");
        MediaStream::from_track(track)
    }

    /// Current surface size.
    pub fn surface_dimensions(&self) -> (u32, u32) {
        self.surface.lock().dimensions()
    }

    pub fn is_running(&self) -> bool {
        *self.status_rx.borrow() == PullStatus::Running
    }

    /// Stop pulling, end every output stream, and report how the pull loop went.
    ///
    /// A frame pull failure that stopped the loop earlier is returned here.
    pub async fn shutdown(self) -> GlimpseResult<CompositorStats> {
        let _ = self.stop_tx.send(true);

        let result = match self.pull_task.await {
            Ok(result) => result,
            Err(e) => Err(GlimpseError::compositor(format!("Pull loop aborted: {e}"))),
        };

        let samplers = std::mem::take(&mut *self.samplers.lock());
        for sampler in samplers {
            let _ = sampler.await;
        }

        match &result {
            Ok(stats) => tracing::info!(
                frames = stats.frames_drawn,
                resizes = stats.resizes,
                skipped = stats.frames_skipped,
                "Frame compositor stopped"
            ),
            Err(e) => tracing::error!(error = %e, "Frame compositor stopped with error"),
        }
        result
    }
}

async fn pull_loop(
    mut reader: FrameReader,
    surface: Arc<Mutex<Surface>>,
    mut stop_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<PullStatus>,
) -> GlimpseResult<CompositorStats> {
    let mut stats = CompositorStats::default();

    let result = loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break Ok(()),
            pulled = reader.read() => match pulled {
                Ok(Some(frame)) => {
                    let resized = surface.lock().draw(&frame);
                    if resized {
                        stats.resizes += 1;
                        tracing::debug!(
                            width = frame.width(),
                            height = frame.height(),
                            "Compositor surface resized"
                        );
                    }
                    frame.close();
                    stats.frames_drawn += 1;
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(GlimpseError::compositor(format!("Frame pull failed: {e}"))),
            },
        }
    };
    stats.frames_skipped = reader.skipped();

    match result {
        Ok(()) => {
            let _ = status_tx.send(PullStatus::Finished);
            Ok(stats)
        }
        Err(e) => {
            tracing::error!(error = %e, "Compositor pull loop failed");
            let _ = status_tx.send(PullStatus::Failed(e.to_string()));
            Err(e)
        }
    }
}

/// Control hooks for a compositor output track.
struct SamplerControl {
    fps_tx: watch::Sender<f64>,
}

impl TrackSource for SamplerControl {
    fn apply_constraints(&self, constraints: &TrackConstraints) -> GlimpseResult<()> {
        if let Some(fps) = constraints.frame_rate {
            self.fps_tx.send_replace(normalize_frame_rate(Some(fps)));
        }
        Ok(())
    }

    fn stop(&self) {
        tracing::trace!("Compositor output track stopped");
    }
}

fn sample_interval(fps: f64) -> Interval {
    let mut ticker = interval(Duration::from_secs_f64(1.0 / normalize_frame_rate(Some(fps))));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn terminal_status(status_rx: &mut watch::Receiver<PullStatus>) -> PullStatus {
    match status_rx.wait_for(|status| *status != PullStatus::Running).await {
        Ok(status) => status.clone(),
        Err(_) => PullStatus::Finished,
    }
}

async fn sample_loop(
    surface: Arc<Mutex<Surface>>,
    writer: TrackWriter,
    mut fps_rx: watch::Receiver<f64>,
    mut status_rx: watch::Receiver<PullStatus>,
    clock: RecordingClock,
) {
    let mut ticker = sample_interval(*fps_rx.borrow_and_update());

    loop {
        tokio::select! {
            _ = writer.closed() => break,
            status = terminal_status(&mut status_rx) => {
                match status {
                    PullStatus::Failed(reason) => writer.fail(reason),
                    _ => writer.end(),
                }
                break;
            }
            changed = fps_rx.changed() => {
                if changed.is_err() {
                    writer.end();
                    break;
                }
                let fps = *fps_rx.borrow_and_update();
                tracing::debug!(fps, "Compositor sample rate changed");
                ticker = sample_interval(fps);
            }
            _ = ticker.tick() => {
                let snapshot = surface.lock().snapshot(clock.elapsed_ns());
                match snapshot {
                    Ok(Some(frame)) => {
                        writer.push(frame);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        writer.fail(e.to_string());
                        break;
                    }
                }
            }
        }
    }
}
