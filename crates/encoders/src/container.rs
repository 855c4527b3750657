//! Container encoder backend: streaming video encoder + muxer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_media_model::{MediaStream, VideoFrame};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::backend::{
    BackendEvent, BackendKind, EncodedArtifact, EncoderBackend, OptionValue, PendingArtifact,
};
use crate::recorder::{FrameSink, RecorderSlot};

/// Caller bit-rate unit: values passed to `set_bit_rate` are multiplied by this.
pub const BIT_RATE_UNIT: f64 = 1024.0 * 1024.0;

/// The supported container/codec combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContainerFormat {
    #[default]
    WebmVp9,
    WebmVp8,
    Mp4,
    ThreeGpp,
    ThreeGpp2,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 5] = [
        Self::WebmVp9,
        Self::WebmVp8,
        Self::Mp4,
        Self::ThreeGpp,
        Self::ThreeGpp2,
    ];

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::WebmVp9 => "video/webm;codecs=vp9",
            Self::WebmVp8 => "video/webm;codecs=vp8",
            Self::Mp4 => "video/mp4",
            Self::ThreeGpp => "video/3gpp",
            Self::ThreeGpp2 => "video/3gpp2",
        }
    }

    /// Display label for pickers.
    pub fn label(self) -> &'static str {
        match self {
            Self::WebmVp9 => "WebM (VP9)",
            Self::WebmVp8 => "WebM (VP8)",
            Self::Mp4 => "MP4 (H.264)",
            Self::ThreeGpp => "3GPP",
            Self::ThreeGpp2 => "3GPP2",
        }
    }

    /// Look up a format by MIME type. Case and whitespace around `;` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let wanted: String = mime
            .split(';')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(";")
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.mime_type() == wanted)
    }

    /// GStreamer encoder and muxer, taking raw video and emitting a byte stream.
    ///
    /// `bit_rate` is in bytes per second; the encoders take bits.
    pub fn launch_fragment(self, bit_rate: u64) -> String {
        let bps = bit_rate.saturating_mul(8);
        let kbps = (bps / 1000).max(1);
        match self {
            Self::WebmVp9 => format!(
                "vp9enc target-bitrate={bps} deadline=1 cpu-used=8 row-mt=true ! webmmux streamable=true"
            ),
            Self::WebmVp8 => format!(
                "vp8enc target-bitrate={bps} deadline=1 cpu-used=8 ! webmmux streamable=true"
            ),
            Self::Mp4 => format!(
                "x264enc bitrate={kbps} tune=zerolatency speed-preset=veryfast ! h264parse ! mp4mux streamable=true fragment-duration=1000"
            ),
            // qtmux has no dedicated 3GPP2 brand; both use the 3GPP muxer.
            Self::ThreeGpp | Self::ThreeGpp2 => format!(
                "x264enc bitrate={kbps} tune=zerolatency speed-preset=veryfast ! video/x-h264,profile=baseline ! h264parse ! 3gppmux streamable=true fragment-duration=1000"
            ),
        }
    }

    /// GStreamer elements the fragment needs.
    pub fn required_elements(self) -> &'static [&'static str] {
        match self {
            Self::WebmVp9 => &["vp9enc", "webmmux"],
            Self::WebmVp8 => &["vp8enc", "webmmux"],
            Self::Mp4 => &["x264enc", "h264parse", "mp4mux"],
            Self::ThreeGpp | Self::ThreeGpp2 => &["x264enc", "h264parse", "3gppmux"],
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// An encoder that turns frames into container byte chunks.
pub trait StreamEncoder: Send {
    fn push_frame(&mut self, frame: &VideoFrame) -> GlimpseResult<()>;

    /// Chunks emitted since the last call.
    fn take_chunks(&mut self) -> Vec<Vec<u8>>;

    /// Flush and return the remaining chunks. May block.
    fn finish(self: Box<Self>) -> GlimpseResult<Vec<Vec<u8>>>;
}

/// Builds [`StreamEncoder`]s for a recording.
pub trait StreamEncoderFactory: Send + Sync {
    fn create(
        &self,
        format: ContainerFormat,
        bit_rate: u64,
        frame_rate: f64,
    ) -> GlimpseResult<Box<dyn StreamEncoder>>;
}

#[derive(Debug, Clone, Copy)]
struct ContainerOptions {
    format: ContainerFormat,
    bit_rate: u64,
}

/// Backend wrapping a streaming media encoder.
pub struct ContainerBackend {
    factory: Arc<dyn StreamEncoderFactory>,
    options: Mutex<ContainerOptions>,
    enabled: AtomicBool,
    slot: RecorderSlot,
}

impl ContainerBackend {
    pub fn new(factory: Arc<dyn StreamEncoderFactory>) -> Self {
        Self {
            factory,
            options: Mutex::new(ContainerOptions {
                format: ContainerFormat::default(),
                bit_rate: scale_bit_rate(2.5),
            }),
            enabled: AtomicBool::new(true),
            slot: RecorderSlot::new(BackendKind::Container),
        }
    }

    /// Set the target bit rate in caller units (MiB per second).
    pub fn set_bit_rate(&self, mib: f64) -> GlimpseResult<()> {
        if !(mib.is_finite() && mib > 0.0) {
            return Err(GlimpseError::config(format!("Invalid bit rate {mib}")));
        }
        self.options.lock().bit_rate = scale_bit_rate(mib);
        Ok(())
    }

    /// The bit rate handed to the encoder.
    pub fn bit_rate(&self) -> u64 {
        self.options.lock().bit_rate
    }

    pub fn set_format(&self, format: ContainerFormat) {
        self.options.lock().format = format;
    }

    pub fn format(&self) -> ContainerFormat {
        self.options.lock().format
    }

    /// Select the format by MIME type.
    pub fn set_video_type(&self, mime: &str) -> GlimpseResult<()> {
        let format = ContainerFormat::from_mime(mime)
            .ok_or_else(|| GlimpseError::config(format!("Unsupported video type {mime}")))?;
        self.set_format(format);
        Ok(())
    }
}

fn scale_bit_rate(mib: f64) -> u64 {
    (mib * BIT_RATE_UNIT).round() as u64
}

impl EncoderBackend for ContainerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn output_type(&self) -> String {
        self.format().mime_type().to_string()
    }

    fn set_option(&self, name: &str, value: OptionValue) -> GlimpseResult<()> {
        match name {
            "bitRate" | "bitrate" => {
                let mib = value
                    .as_number()
                    .ok_or_else(|| GlimpseError::config("bitRate must be a number"))?;
                self.set_bit_rate(mib)
            }
            "mimeType" | "codec" => self.set_video_type(&value.as_text()),
            _ => {
                tracing::debug!(backend = "container", option = name, "Ignoring unknown option");
                Ok(())
            }
        }
    }

    fn start(&self, stream: &MediaStream) -> GlimpseResult<()> {
        self.slot.ensure_idle()?;
        let track = stream
            .video_track()
            .ok_or_else(|| GlimpseError::encode("container", "Stream has no video track"))?;

        let options = *self.options.lock();
        let encoder = self
            .factory
            .create(options.format, options.bit_rate, track.settings().frame_rate)?;

        tracing::debug!(
            format = %options.format,
            bit_rate = options.bit_rate,
            "Container encoder created"
        );

        self.slot.begin(
            track.reader(),
            Box::new(ContainerSink {
                encoder,
                chunks: Vec::new(),
                mime_type: options.format.mime_type().to_string(),
            }),
        )
    }

    fn stop(&self) -> GlimpseResult<PendingArtifact> {
        self.slot.end()
    }

    fn is_active(&self) -> bool {
        self.slot.is_active()
    }

    fn needs_normalized_frames(&self) -> bool {
        false
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.slot.subscribe()
    }
}

struct ContainerSink {
    encoder: Box<dyn StreamEncoder>,
    chunks: Vec<Vec<u8>>,
    mime_type: String,
}

#[async_trait::async_trait]
impl FrameSink for ContainerSink {
    async fn accept(&mut self, frame: VideoFrame) -> GlimpseResult<()> {
        self.encoder.push_frame(&frame)?;
        frame.close();
        self.chunks
            .extend(self.encoder.take_chunks().into_iter().filter(|c| !c.is_empty()));
        Ok(())
    }

    async fn finish(self: Box<Self>) -> GlimpseResult<EncodedArtifact> {
        let ContainerSink {
            encoder,
            mut chunks,
            mime_type,
        } = *self;

        let tail = tokio::task::spawn_blocking(move || encoder.finish())
            .await
            .map_err(|e| GlimpseError::encode("container", format!("Encoder task failed: {e}")))??;
        chunks.extend(tail.into_iter().filter(|c| !c.is_empty()));

        Ok(EncodedArtifact {
            bytes: chunks.concat(),
            mime_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimpse_media_model::{TrackSettings, VideoTrack};

    /// Emits an `f` chunk per frame and `end` when finished.
    struct ByteEncoder;

    impl StreamEncoder for ByteEncoder {
        fn push_frame(&mut self, _frame: &VideoFrame) -> GlimpseResult<()> {
            Ok(())
        }

        fn take_chunks(&mut self) -> Vec<Vec<u8>> {
            vec![b"f".to_vec()]
        }

        fn finish(self: Box<Self>) -> GlimpseResult<Vec<Vec<u8>>> {
            Ok(vec![b"end".to_vec()])
        }
    }

    struct ByteFactory {
        seen_bit_rate: Mutex<Option<u64>>,
    }

    impl StreamEncoderFactory for ByteFactory {
        fn create(
            &self,
            _format: ContainerFormat,
            bit_rate: u64,
            _frame_rate: f64,
        ) -> GlimpseResult<Box<dyn StreamEncoder>> {
            *self.seen_bit_rate.lock() = Some(bit_rate);
            Ok(Box::new(ByteEncoder))
        }
    }

    fn backend() -> (ContainerBackend, Arc<ByteFactory>) {
        let factory = Arc::new(ByteFactory {
            seen_bit_rate: Mutex::new(None),
        });
        (ContainerBackend::new(factory.clone()), factory)
    }

    #[test]
    fn bit_rate_is_scaled_by_mebibyte() {
        let (backend, _) = backend();
        backend.set_bit_rate(2.5).unwrap();
        assert_eq!(backend.bit_rate(), 2_621_440);
        assert!(backend.set_bit_rate(0.0).is_err());
    }

    #[test]
    fn launch_fragment_passes_bits_per_second() {
        let vp9 = ContainerFormat::WebmVp9.launch_fragment(2_621_440);
        assert!(vp9.starts_with("vp9enc target-bitrate=20971520 "));

        let vp8 = ContainerFormat::WebmVp8.launch_fragment(2_621_440);
        assert!(vp8.starts_with("vp8enc target-bitrate=20971520 "));

        let mp4 = ContainerFormat::Mp4.launch_fragment(2_621_440);
        assert!(mp4.starts_with("x264enc bitrate=20971 "));

        let tiny = ContainerFormat::ThreeGpp.launch_fragment(10);
        assert!(tiny.starts_with("x264enc bitrate=1 "));
    }

    #[test]
    fn mime_lookup_covers_the_enumerated_set() {
        for format in ContainerFormat::ALL {
            assert_eq!(ContainerFormat::from_mime(format.mime_type()), Some(format));
        }
        assert_eq!(
            ContainerFormat::from_mime("video/webm; codecs=VP8"),
            Some(ContainerFormat::WebmVp8)
        );
        assert_eq!(ContainerFormat::from_mime("video/ogg"), None);
    }

    #[test]
    fn unknown_option_is_ignored() {
        let (backend, _) = backend();
        backend.set_option("keyframeInterval", 5u32.into()).unwrap();
        backend.set_option("codec", "video/mp4".into()).unwrap();
        assert_eq!(backend.output_type(), "video/mp4");
        assert!(backend.set_option("bitRate", "lots".into()).is_err());
    }

    #[tokio::test]
    async fn artifact_concatenates_chunks_and_carries_mime() {
        let (backend, factory) = backend();
        backend.set_bit_rate(1.0).unwrap();
        let (track, writer) = VideoTrack::new("record", TrackSettings::with_frame_rate(30.0));
        let stream = MediaStream::from_track(track);

        backend.start(&stream).unwrap();
        assert!(backend.is_active());
        writer.push(VideoFrame::solid(2, 2, 0, [0; 4]));
        writer.push(VideoFrame::solid(2, 2, 1, [0; 4]));

        let artifact = backend.stop().unwrap().await.unwrap();
        assert_eq!(artifact.bytes, b"ffend".to_vec());
        assert_eq!(artifact.mime_type, "video/webm;codecs=vp9");
        assert_eq!(*factory.seen_bit_rate.lock(), Some(1_048_576));
        assert!(!backend.is_active());
    }
}
