//! Palette (animated GIF) encoder backend.
//!
//! Frames are sampled at the GIF frame rate by timestamp, quantised on
//! blocking worker tasks (at most `workers` in flight), and written in
//! order. Each frame's delay is the gap to the next sampled frame.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use glimpse_common::clock::RateController;
use glimpse_common::config::GifDefaults;
use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_media_model::{MediaStream, VideoFrame};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::backend::{
    BackendEvent, BackendKind, EncodedArtifact, EncoderBackend, OptionValue, PendingArtifact,
};
use crate::quantize::{quantize, Dithering, QuantizedFrame};
use crate::recorder::{FrameSink, RecorderSlot};

pub const GIF_MIME_TYPE: &str = "image/gif";

/// How often the animation loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Repeat {
    /// Play once; no loop extension is written.
    Once,
    #[default]
    Forever,
    Times(u16),
}

impl Repeat {
    /// `-1` plays once, `0` loops forever, `n` loops `n` times.
    pub fn from_count(count: f64) -> Option<Self> {
        if !count.is_finite() {
            return None;
        }
        match count.round() as i64 {
            -1 => Some(Self::Once),
            0 => Some(Self::Forever),
            n if n > 0 && n <= u16::MAX as i64 => Some(Self::Times(n as u16)),
            _ => None,
        }
    }
}

/// Palette encoder options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaletteOptions {
    pub frame_rate: f64,
    /// NeuQuant sample factor, 1 (best) to 30 (fastest).
    pub quality: u8,
    pub dithering: Dithering,
    pub workers: usize,
    pub repeat: Repeat,
}

impl Default for PaletteOptions {
    fn default() -> Self {
        Self {
            frame_rate: 10.0,
            quality: 10,
            dithering: Dithering::None,
            workers: 2,
            repeat: Repeat::Forever,
        }
    }
}

impl PaletteOptions {
    /// Options from the config file; unknown dithering names fall back to none.
    pub fn from_defaults(gif: &GifDefaults) -> Self {
        let dithering = Dithering::parse(&gif.dither).unwrap_or_else(|| {
            tracing::warn!(dither = %gif.dither, "Unknown dithering mode in config, using none");
            Dithering::None
        });
        Self {
            frame_rate: normalize_gif_rate(gif.fps),
            quality: gif.quality.clamp(1, 30),
            dithering,
            workers: gif.workers.max(1),
            repeat: Repeat::Forever,
        }
    }
}

fn normalize_gif_rate(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        PaletteOptions::default().frame_rate
    }
}

/// Backend producing an animated GIF.
pub struct PaletteBackend {
    options: Mutex<PaletteOptions>,
    enabled: AtomicBool,
    slot: RecorderSlot,
}

impl Default for PaletteBackend {
    fn default() -> Self {
        Self::new(PaletteOptions::default())
    }
}

impl PaletteBackend {
    pub fn new(options: PaletteOptions) -> Self {
        Self {
            options: Mutex::new(options),
            enabled: AtomicBool::new(false),
            slot: RecorderSlot::new(BackendKind::Palette),
        }
    }

    pub fn options(&self) -> PaletteOptions {
        *self.options.lock()
    }
}

fn option_number(name: &str, value: &OptionValue) -> GlimpseResult<f64> {
    value
        .as_number()
        .filter(|n| n.is_finite())
        .ok_or_else(|| GlimpseError::config(format!("{name} must be a number")))
}

impl EncoderBackend for PaletteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Palette
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn output_type(&self) -> String {
        GIF_MIME_TYPE.to_string()
    }

    fn set_option(&self, name: &str, value: OptionValue) -> GlimpseResult<()> {
        let mut options = self.options.lock();
        match name {
            "frameRate" | "fps" => {
                let fps = option_number(name, &value)?;
                if fps <= 0.0 {
                    return Err(GlimpseError::config(format!("Invalid GIF frame rate {fps}")));
                }
                options.frame_rate = fps;
            }
            "quality" => {
                let quality = option_number(name, &value)?;
                options.quality = quality.round().clamp(1.0, 30.0) as u8;
            }
            "dither" => {
                let text = value.as_text();
                options.dithering = Dithering::parse(&text)
                    .ok_or_else(|| GlimpseError::config(format!("Unknown dithering mode {text}")))?;
            }
            "workers" => {
                let workers = option_number(name, &value)?;
                options.workers = workers.round().max(1.0) as usize;
            }
            "repeat" => {
                let count = option_number(name, &value)?;
                options.repeat = Repeat::from_count(count)
                    .ok_or_else(|| GlimpseError::config(format!("Invalid repeat count {count}")))?;
            }
            _ => {
                tracing::debug!(backend = "palette", option = name, "Ignoring unknown option");
                return Ok(());
            }
        }
        tracing::debug!(backend = "palette", option = name, options = ?*options, "Palette option set");
        Ok(())
    }

    fn start(&self, stream: &MediaStream) -> GlimpseResult<()> {
        let track = stream
            .video_track()
            .ok_or_else(|| GlimpseError::encode("palette", "Stream has no video track"))?;
        let options = self.options();

        self.slot.begin(track.reader(), Box::new(GifSink::new(options)))
    }

    fn stop(&self) -> GlimpseResult<PendingArtifact> {
        self.slot.end()
    }

    fn is_active(&self) -> bool {
        self.slot.is_active()
    }

    fn needs_normalized_frames(&self) -> bool {
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.slot.subscribe()
    }
}

type GifEncoder = gif::Encoder<Vec<u8>>;

struct GifSink {
    options: PaletteOptions,
    rate: RateController,
    encoder: Option<GifEncoder>,
    screen: (u16, u16),
    pending: VecDeque<(u64, JoinHandle<QuantizedFrame>)>,
    written: u64,
}

impl GifSink {
    fn new(options: PaletteOptions) -> Self {
        Self {
            rate: RateController::new(options.frame_rate),
            options,
            encoder: None,
            screen: (0, 0),
            pending: VecDeque::new(),
            written: 0,
        }
    }

    fn open(&mut self, width: u16, height: u16) -> GlimpseResult<()> {
        let mut encoder = gif::Encoder::new(Vec::new(), width, height, &[]).map_err(gif_error)?;
        match self.options.repeat {
            Repeat::Once => {}
            Repeat::Forever => encoder.set_repeat(gif::Repeat::Infinite).map_err(gif_error)?,
            Repeat::Times(n) => encoder.set_repeat(gif::Repeat::Finite(n)).map_err(gif_error)?,
        }
        self.screen = (width, height);
        self.encoder = Some(encoder);
        tracing::debug!(width, height, "GIF encoder opened");
        Ok(())
    }

    /// Write the oldest pending frame.
    async fn write_oldest(&mut self) -> GlimpseResult<()> {
        let Some((timestamp, handle)) = self.pending.pop_front() else {
            return Ok(());
        };
        let next = self.pending.front().map(|(ts, _)| *ts);
        let quantized = handle
            .await
            .map_err(|e| GlimpseError::encode("palette", format!("Quantiser task failed: {e}")))?;

        let mut frame = gif::Frame::default();
        frame.width = quantized.width;
        frame.height = quantized.height;
        frame.delay = frame_delay_cs(timestamp, next, self.rate.interval_ns());
        frame.palette = Some(quantized.palette);
        frame.buffer = Cow::Owned(quantized.indices);

        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| GlimpseError::encode("palette", "GIF encoder not open"))?;
        encoder.write_frame(&frame).map_err(gif_error)?;
        self.written += 1;
        Ok(())
    }
}

#[async_trait::async_trait]
impl FrameSink for GifSink {
    async fn accept(&mut self, frame: VideoFrame) -> GlimpseResult<()> {
        if !self.rate.should_tick(frame.timestamp_ns()) {
            frame.close();
            return Ok(());
        }
        if self.encoder.is_none() {
            let width = frame.width().clamp(1, u16::MAX as u32) as u16;
            let height = frame.height().clamp(1, u16::MAX as u32) as u16;
            self.open(width, height)?;
        }

        let (max_w, max_h) = self.screen;
        let quality = self.options.quality;
        let dithering = self.options.dithering;
        let timestamp = frame.timestamp_ns();
        let handle = tokio::task::spawn_blocking(move || {
            let quantized = quantize(&frame, max_w, max_h, quality, dithering);
            frame.close();
            quantized
        });
        self.pending.push_back((timestamp, handle));

        while self.pending.len() > self.options.workers {
            self.write_oldest().await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> GlimpseResult<EncodedArtifact> {
        while !self.pending.is_empty() {
            self.write_oldest().await?;
        }
        if self.encoder.is_none() {
            // No frames: still emit a valid, empty animation.
            self.open(1, 1)?;
        }

        let written = self.written;
        let bytes = match self.encoder.take() {
            Some(encoder) => encoder.into_inner().map_err(|e| {
                GlimpseError::encode("palette", format!("Failed to finish GIF: {e}"))
            })?,
            None => Vec::new(),
        };
        tracing::debug!(frames = written, bytes = bytes.len(), "GIF finished");

        Ok(EncodedArtifact {
            bytes,
            mime_type: GIF_MIME_TYPE.to_string(),
        })
    }
}

/// Frame delay in centiseconds. Browsers treat delays under 2 as 10, so
/// nothing shorter is written.
fn frame_delay_cs(timestamp: u64, next: Option<u64>, interval_ns: u64) -> u16 {
    let gap_ns = match next {
        Some(next) if next > timestamp => next - timestamp,
        _ => interval_ns,
    } as f64;
    (gap_ns / 10_000_000.0).round().clamp(2.0, u16::MAX as f64) as u16
}

fn gif_error(e: gif::EncodingError) -> GlimpseError {
    GlimpseError::encode("palette", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimpse_media_model::{TrackSettings, VideoTrack};

    #[test]
    fn options_validate_values() {
        let backend = PaletteBackend::default();
        backend.set_option("quality", 50u32.into()).unwrap();
        backend.set_option("dither", "Stucki-serpentine".into()).unwrap();
        backend.set_option("workers", 0u32.into()).unwrap();
        backend.set_option("repeat", OptionValue::Number(-1.0)).unwrap();
        backend.set_option("background", "#fff".into()).unwrap();

        let options = backend.options();
        assert_eq!(options.quality, 30);
        assert_eq!(options.workers, 1);
        assert_eq!(options.repeat, Repeat::Once);
        assert_eq!(options.dithering.name(), "Stucki-serpentine");

        assert!(backend.set_option("dither", "Ordered".into()).is_err());
        assert!(backend.set_option("fps", OptionValue::Number(0.0)).is_err());
    }

    #[test]
    fn delay_comes_from_timestamps() {
        let interval = RateController::new(25.0).interval_ns();
        assert_eq!(frame_delay_cs(0, Some(100_000_000), interval), 10);
        assert_eq!(frame_delay_cs(0, Some(5_000_000), interval), 2);
        assert_eq!(frame_delay_cs(0, None, interval), 4);
    }

    #[test]
    fn config_defaults_map_to_options() {
        let gif = GifDefaults {
            fps: 0.0,
            quality: 0,
            dither: "FalseFloydSteinberg".to_string(),
            workers: 4,
        };
        let options = PaletteOptions::from_defaults(&gif);
        assert_eq!(options.frame_rate, 10.0);
        assert_eq!(options.quality, 1);
        assert_eq!(options.workers, 4);
        assert_eq!(options.dithering.name(), "FalseFloydSteinberg");
    }

    #[tokio::test]
    async fn produces_gif_sampled_at_its_own_rate() {
        let backend = PaletteBackend::default();
        let (track, writer) = VideoTrack::new("record", TrackSettings::with_frame_rate(60.0));
        let stream = MediaStream::from_track(track);
        backend.start(&stream).unwrap();

        // One second at 20 fps; the GIF keeps every other frame.
        for i in 0..20u64 {
            writer.push(VideoFrame::solid(8, 8, i * 50_000_000, [i as u8 * 10, 0, 0, 255]));
            tokio::task::yield_now().await;
        }

        let artifact = backend.stop().unwrap().await.unwrap();
        assert_eq!(artifact.mime_type, "image/gif");
        assert!(artifact.bytes.starts_with(b"GIF89a"));
        assert_eq!(artifact.bytes.last(), Some(&0x3b));
        assert!(!backend.is_active());
    }

    #[tokio::test]
    async fn empty_recording_still_yields_one_gif() {
        let backend = PaletteBackend::default();
        let (track, _writer) = VideoTrack::new("record", TrackSettings::with_frame_rate(60.0));
        backend.start(&MediaStream::from_track(track)).unwrap();

        let artifact = backend.stop().unwrap().await.unwrap();
        assert!(artifact.bytes.starts_with(b"GIF89a"));
        assert_eq!(artifact.mime_type, GIF_MIME_TYPE);
    }
}
