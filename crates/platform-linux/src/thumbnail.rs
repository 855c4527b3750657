//! Source thumbnails as PNG data URLs.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use glimpse_common::error::{GlimpseError, GlimpseResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use crate::media::init_gstreamer;

/// Longest thumbnail edge in pixels.
pub const THUMBNAIL_EDGE: u32 = 400;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(3);

/// Scale `width` x `height` to fit a `edge` square, keeping the aspect ratio.
/// Both sides come out even and at least 2.
pub fn fit_within(width: u32, height: u32, edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (edge, edge * 3 / 4);
    }
    let scale = (edge as f64 / width as f64).min(edge as f64 / height as f64);
    let even = |v: f64| ((v.round() as u32) & !1).max(2);
    (even(width as f64 * scale), even(height as f64 * scale))
}

pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Take one frame from `source_fragment` and return it as a PNG data URL.
///
/// Blocks for up to a few seconds; call it off the async thread.
pub fn snapshot(source_fragment: &str, size: (u32, u32)) -> GlimpseResult<String> {
    init_gstreamer()?;
    let (width, height) = size;
    let launch = format!(
        "{source_fragment} ! videoconvert ! videoscale ! video/x-raw,width={width},height={height} ! pngenc snapshot=true ! appsink name=sink sync=false"
    );

    let pipeline = gst::parse::launch(&launch)
        .map_err(|e| GlimpseError::platform(format!("Failed to build thumbnail pipeline: {e}")))?
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| GlimpseError::platform("Thumbnail launch string did not produce a pipeline"))?;
    let appsink = pipeline
        .by_name("sink")
        .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
        .ok_or_else(|| GlimpseError::platform("Thumbnail pipeline has no appsink"))?;

    pipeline
        .set_state(gst::State::Playing)
        .map_err(|e| GlimpseError::platform(format!("Failed to start thumbnail pipeline: {e:?}")))?;

    let sample = appsink.try_pull_sample(gst::ClockTime::from_nseconds(
        SNAPSHOT_TIMEOUT.as_nanos() as u64,
    ));
    let _ = pipeline.set_state(gst::State::Null);

    let sample = sample.ok_or_else(|| GlimpseError::platform("Timed out waiting for thumbnail"))?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| GlimpseError::platform("Thumbnail sample has no buffer"))?;
    let map = buffer
        .map_readable()
        .map_err(|_| GlimpseError::platform("Thumbnail buffer is not readable"))?;
    Ok(png_data_url(map.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_and_portrait_fit() {
        assert_eq!(fit_within(1920, 1080, 400), (400, 224));
        assert_eq!(fit_within(1080, 1920, 400), (224, 400));
        assert_eq!(fit_within(0, 0, 400), (400, 300));
    }

    #[test]
    fn data_url_is_base64_png() {
        let url = png_data_url(&[0x89, b'P', b'N', b'G']);
        assert_eq!(url, "data:image/png;base64,iVBORw==");
    }
}
