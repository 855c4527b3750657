//! GStreamer-backed display media.
//!
//! A capture pipeline ends in an `appsink` whose samples are published on a
//! [`VideoTrack`]. The frame rate sits in a named capsfilter so constraints
//! can change it while the pipeline plays.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use glimpse_common::clock::normalize_frame_rate;
use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_media_model::{
    MediaStream, TrackConstraints, TrackSettings, TrackSource, TrackWriter, VideoFrame, VideoTrack,
};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

const BUS_POLL: Duration = Duration::from_millis(100);

/// Raw RGBA caps at `fps`.
pub(crate) fn rgba_caps(fps: f64) -> gst::Caps {
    gst::Caps::builder("video/x-raw")
        .field("format", "RGBA")
        .field("framerate", frame_rate_fraction(fps))
        .build()
}

/// `fps` as a GStreamer fraction with millihertz precision.
pub(crate) fn frame_rate_fraction(fps: f64) -> gst::Fraction {
    let millis = (normalize_frame_rate(Some(fps)) * 1000.0).round() as i32;
    let divisor = gcd(millis, 1000);
    gst::Fraction::new(millis / divisor, 1000 / divisor)
}

fn gcd(a: i32, b: i32) -> i32 {
    if b == 0 {
        a.max(1)
    } else {
        gcd(b, a % b)
    }
}

/// Launch string of a capture pipeline reading from `source_fragment`.
pub(crate) fn capture_launch(source_fragment: &str) -> String {
    format!(
        "{source_fragment} ! queue max-size-buffers=8 leaky=downstream ! videoconvert ! videorate ! capsfilter name=rate ! appsink name=sink sync=false max-buffers=2 drop=true"
    )
}

/// Start a capture pipeline and expose it as a single-track stream.
pub(crate) fn start_capture_stream(
    label: &str,
    source_fragment: &str,
    fps: f64,
) -> GlimpseResult<MediaStream> {
    init_gstreamer()?;
    let fps = normalize_frame_rate(Some(fps));
    let launch = capture_launch(source_fragment);
    tracing::debug!(%launch, "Building capture pipeline");

    let pipeline = gst::parse::launch(&launch)
        .map_err(|e| GlimpseError::capture(format!("Failed to build capture pipeline: {e}")))?
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| GlimpseError::capture("Capture launch string did not produce a pipeline"))?;
    let rate_filter = pipeline
        .by_name("rate")
        .ok_or_else(|| GlimpseError::capture("Capture pipeline has no rate filter"))?;
    let appsink = pipeline
        .by_name("sink")
        .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
        .ok_or_else(|| GlimpseError::capture("Capture pipeline has no appsink"))?;
    rate_filter.set_property("caps", rgba_caps(fps));

    let control = Arc::new(PipelineControl {
        pipeline: pipeline.clone(),
        rate_filter,
    });
    let (track, writer) =
        VideoTrack::with_source(label, TrackSettings::with_frame_rate(fps), control);
    let writer = Arc::new(writer);

    let sink_writer = Arc::downgrade(&writer);
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let frame = sample_to_frame(&sample).ok_or(gst::FlowError::Error)?;
                let writer = sink_writer.upgrade().ok_or(gst::FlowError::Eos)?;
                if writer.push(frame) {
                    Ok(gst::FlowSuccess::Ok)
                } else {
                    Err(gst::FlowError::Eos)
                }
            })
            .build(),
    );

    if let Err(e) = pipeline.set_state(gst::State::Playing) {
        let _ = pipeline.set_state(gst::State::Null);
        return Err(GlimpseError::capture(format!(
            "Failed to start capture pipeline: {e:?}"
        )));
    }

    let bus = pipeline
        .bus()
        .ok_or_else(|| GlimpseError::capture("Capture pipeline has no bus"))?;
    std::thread::Builder::new()
        .name("glimpse-capture-bus".into())
        .spawn(move || watch_bus(bus, writer))
        .map_err(|e| GlimpseError::capture(format!("Failed to watch capture bus: {e}")))?;

    tracing::info!(source = label, fps, "Capture pipeline playing");
    Ok(MediaStream::from_track(track))
}

fn sample_to_frame(sample: &gst::Sample) -> Option<VideoFrame> {
    let structure = sample.caps()?.structure(0)?;
    let width = structure.get::<i32>("width").ok()?;
    let height = structure.get::<i32>("height").ok()?;
    let buffer = sample.buffer()?;
    let pts = buffer.pts().map(|t| t.nseconds()).unwrap_or_default();
    let map = buffer.map_readable().ok()?;
    VideoFrame::new(width as u32, height as u32, pts, map.as_slice().to_vec()).ok()
}

/// Forward pipeline end and errors to the track until it closes.
fn watch_bus(bus: gst::Bus, writer: Arc<TrackWriter>) {
    while !writer.is_closed() {
        let Some(msg) = bus.timed_pop(gst::ClockTime::from_nseconds(BUS_POLL.as_nanos() as u64))
        else {
            continue;
        };
        match msg.view() {
            gst::MessageView::Eos(_) => {
                tracing::info!(track = writer.track_id(), "Capture source ended");
                writer.end();
            }
            gst::MessageView::Error(err) => {
                writer.fail(format!(
                    "{} ({})",
                    err.error(),
                    err.debug().unwrap_or_default()
                ));
            }
            _ => {}
        }
    }
}

struct PipelineControl {
    pipeline: gst::Pipeline,
    rate_filter: gst::Element,
}

impl TrackSource for PipelineControl {
    fn apply_constraints(&self, constraints: &TrackConstraints) -> GlimpseResult<()> {
        if let Some(fps) = constraints.frame_rate {
            self.rate_filter.set_property("caps", rgba_caps(fps));
            tracing::debug!(fps, "Capture frame rate updated");
        }
        Ok(())
    }

    fn stop(&self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(error = ?e, "Failed to stop capture pipeline");
        }
    }
}

impl Drop for PipelineControl {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

pub(crate) fn init_gstreamer() -> GlimpseResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string())) {
        Ok(()) => Ok(()),
        Err(e) => Err(GlimpseError::platform(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_rates_survive() {
        assert_eq!(frame_rate_fraction(30.0), gst::Fraction::new(30, 1));
        assert_eq!(frame_rate_fraction(29.97), gst::Fraction::new(2997, 100));
        assert_eq!(frame_rate_fraction(0.0), gst::Fraction::new(60, 1));
    }

    #[test]
    fn launch_ends_in_named_rate_filter_and_sink() {
        let launch = capture_launch("videotestsrc is-live=true");
        assert!(launch.starts_with("videotestsrc is-live=true ! "));
        assert!(launch.contains("capsfilter name=rate"));
        assert!(launch.ends_with("appsink name=sink sync=false max-buffers=2 drop=true"));
    }
}
