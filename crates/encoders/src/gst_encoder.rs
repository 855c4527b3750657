//! GStreamer-backed stream encoder.
//!
//! Frames enter through an `appsrc`, are converted and scaled to the size of
//! the first frame, encoded and muxed, and leave through an `appsink` whose
//! samples are collected as container chunks.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_media_model::VideoFrame;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use parking_lot::Mutex;

use crate::container::{ContainerFormat, StreamEncoder, StreamEncoderFactory};

const EOS_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds encoders from GStreamer launch strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct GstEncoderFactory;

impl GstEncoderFactory {
    pub fn new() -> Self {
        Self
    }

    /// Elements of `format` missing from the GStreamer registry.
    pub fn missing_elements(format: ContainerFormat) -> GlimpseResult<Vec<&'static str>> {
        init_gstreamer()?;
        Ok(format
            .required_elements()
            .iter()
            .copied()
            .filter(|name| gst::ElementFactory::find(name).is_none())
            .collect())
    }
}

impl StreamEncoderFactory for GstEncoderFactory {
    fn create(
        &self,
        format: ContainerFormat,
        bit_rate: u64,
        frame_rate: f64,
    ) -> GlimpseResult<Box<dyn StreamEncoder>> {
        init_gstreamer()?;

        let missing = Self::missing_elements(format)?;
        if !missing.is_empty() {
            return Err(GlimpseError::encode(
                "container",
                format!("Missing GStreamer elements for {format}: {}", missing.join(", ")),
            ));
        }

        let launch = format!(
            "appsrc name=src is-live=true format=time ! videoconvert ! videoscale ! capsfilter name=size ! queue ! {} ! appsink name=sink sync=false",
            format.launch_fragment(bit_rate)
        );
        tracing::debug!(%launch, "Building container encoder pipeline");

        GstStreamEncoder::from_launch(&launch, frame_rate).map(|e| Box::new(e) as Box<dyn StreamEncoder>)
    }
}

struct GstStreamEncoder {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    size_filter: gst::Element,
    chunks: Arc<Mutex<Vec<Vec<u8>>>>,
    frame_rate: gst::Fraction,
    /// Output size, fixed by the first frame.
    output_size: Option<(u32, u32)>,
    input_size: Option<(u32, u32)>,
    first_pts: Option<u64>,
}

impl GstStreamEncoder {
    fn from_launch(launch: &str, frame_rate: f64) -> GlimpseResult<Self> {
        let element = gst::parse::launch(launch).map_err(|e| {
            GlimpseError::encode("container", format!("Failed to build pipeline: {e}"))
        })?;
        let pipeline = element.dynamic_cast::<gst::Pipeline>().map_err(|_| {
            GlimpseError::encode("container", "Launch string did not produce a pipeline")
        })?;

        let appsrc = pipeline
            .by_name("src")
            .and_then(|e| e.dynamic_cast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| GlimpseError::encode("container", "Pipeline has no appsrc"))?;
        let appsink = pipeline
            .by_name("sink")
            .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
            .ok_or_else(|| GlimpseError::encode("container", "Pipeline has no appsink"))?;
        let size_filter = pipeline
            .by_name("size")
            .ok_or_else(|| GlimpseError::encode("container", "Pipeline has no size filter"))?;

        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink_chunks = chunks.clone();
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                    sink_chunks.lock().push(map.as_slice().to_vec());
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            GlimpseError::encode("container", format!("Failed to start encoder pipeline: {e:?}"))
        })?;

        let fps = frame_rate.round().clamp(1.0, 240.0) as i32;
        Ok(Self {
            pipeline,
            appsrc,
            size_filter,
            chunks,
            frame_rate: gst::Fraction::new(fps, 1),
            output_size: None,
            input_size: None,
            first_pts: None,
        })
    }

    fn check_bus(&self) -> GlimpseResult<()> {
        match self.pipeline.bus() {
            Some(bus) => first_bus_error(&bus),
            None => Ok(()),
        }
    }

    fn update_caps(&mut self, width: u32, height: u32) {
        if self.output_size.is_none() {
            // x264 needs even dimensions.
            let out_w = (width & !1).max(2);
            let out_h = (height & !1).max(2);
            let caps = gst::Caps::builder("video/x-raw")
                .field("width", out_w as i32)
                .field("height", out_h as i32)
                .build();
            self.size_filter.set_property("caps", &caps);
            self.output_size = Some((out_w, out_h));
            tracing::debug!(width = out_w, height = out_h, "Container output size fixed");
        }

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "RGBA")
            .field("width", width as i32)
            .field("height", height as i32)
            .field("framerate", self.frame_rate)
            .build();
        self.appsrc.set_caps(Some(&caps));
        self.input_size = Some((width, height));
    }

    fn drain_bus_until_eos(&self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= EOS_TIMEOUT {
                tracing::warn!("Container EOS drain timed out after 10s");
                break;
            }
            let remaining = EOS_TIMEOUT - elapsed;
            match bus.timed_pop(gst::ClockTime::from_nseconds(remaining.as_nanos() as u64)) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Eos(_) => {
                        tracing::debug!("Container pipeline drained");
                        break;
                    }
                    gst::MessageView::Error(e) => {
                        tracing::warn!(error = %e.error(), "Pipeline error during EOS drain");
                        break;
                    }
                    _ => {}
                },
                None => {
                    tracing::warn!("Container EOS drain timed out after 10s");
                    break;
                }
            }
        }
    }
}

impl StreamEncoder for GstStreamEncoder {
    fn push_frame(&mut self, frame: &VideoFrame) -> GlimpseResult<()> {
        self.check_bus()?;

        if self.input_size != Some(frame.dimensions()) {
            self.update_caps(frame.width(), frame.height());
        }

        let first = *self.first_pts.get_or_insert(frame.timestamp_ns());
        let pts = frame.timestamp_ns().saturating_sub(first);

        let mut buffer = gst::Buffer::from_mut_slice(frame.pixels().to_vec());
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gst::ClockTime::from_nseconds(pts));
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| GlimpseError::encode("container", format!("Failed to push frame: {e:?}")))?;
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.chunks.lock())
    }

    fn finish(self: Box<Self>) -> GlimpseResult<Vec<Vec<u8>>> {
        if self.first_pts.is_some() {
            if self.appsrc.end_of_stream().is_err() {
                tracing::warn!("Failed to send EOS; container output may be truncated");
            } else {
                self.drain_bus_until_eos();
            }
        } else {
            tracing::warn!("Container encoder finished without frames");
        }

        self.pipeline.set_state(gst::State::Null).map_err(|e| {
            GlimpseError::encode("container", format!("Failed to stop encoder pipeline: {e:?}"))
        })?;

        Ok(std::mem::take(&mut *self.chunks.lock()))
    }
}

impl Drop for GstStreamEncoder {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Drain queued bus messages, stopping at the first error.
fn first_bus_error(bus: &gst::Bus) -> GlimpseResult<()> {
    while let Some(msg) = bus.pop() {
        if let gst::MessageView::Error(err) = msg.view() {
            return Err(GlimpseError::encode(
                "container",
                format!(
                    "Pipeline error: {} ({})",
                    err.error(),
                    err.debug().unwrap_or_default()
                ),
            ));
        }
    }
    Ok(())
}

fn init_gstreamer() -> GlimpseResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(GlimpseError::encode(
            "container",
            format!("Failed to initialize GStreamer: {e}"),
        )),
    }
}
