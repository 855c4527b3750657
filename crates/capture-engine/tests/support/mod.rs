//! In-memory host, display media, and encoder fakes.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glimpse_capture_engine::{
    CaptureSessionManager, OrchestratorConfig, RecordingOrchestrator,
};
use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_encoders::{
    ContainerBackend, ContainerFormat, EncoderBackend, PaletteBackend, PaletteOptions,
    StreamEncoder, StreamEncoderFactory,
};
use glimpse_media_model::{
    MediaStream, TrackConstraints, TrackSettings, TrackSource, VideoFrame, VideoTrack,
};
use glimpse_platform_core::{
    extension_for_mime, CaptureSource, DesktopHost, DisplayMedia, PreviewSink, SourceSelection,
};
use parking_lot::Mutex;

pub const SCREEN: &str = "screen:0:0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAnswer {
    Accept,
    Cancel,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

pub struct FakeHost {
    pub selection: SourceSelection,
    sources: Vec<CaptureSource>,
    pub save_answer: Mutex<SaveAnswer>,
    pub fail_writes: AtomicBool,
    pub save_hints: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<Written>>,
    pub lifecycle: Mutex<Vec<&'static str>>,
    saves: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            selection: SourceSelection::new(),
            sources: vec![
                CaptureSource {
                    name: "Built-in display".into(),
                    id: SCREEN.into(),
                    thumbnail: String::new(),
                },
                CaptureSource {
                    name: "Terminal".into(),
                    id: "window:42:0".into(),
                    thumbnail: String::new(),
                },
            ],
            save_answer: Mutex::new(SaveAnswer::Accept),
            fail_writes: AtomicBool::new(false),
            save_hints: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(Vec::new()),
            saves: AtomicUsize::new(0),
        })
    }

    pub fn answer_saves_with(&self, answer: SaveAnswer) {
        *self.save_answer.lock() = answer;
    }

    pub fn written_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self
            .writes
            .lock()
            .iter()
            .filter_map(|w| w.path.extension().map(|e| e.to_string_lossy().into_owned()))
            .collect();
        extensions.sort();
        extensions
    }
}

#[async_trait::async_trait]
impl DesktopHost for FakeHost {
    async fn get_sources(&self) -> GlimpseResult<Vec<CaptureSource>> {
        Ok(self.sources.clone())
    }

    fn set_source(&self, id: &str) {
        self.selection.set(id);
    }

    async fn get_save_path(&self, mime_type_hint: &str) -> GlimpseResult<Option<PathBuf>> {
        self.save_hints.lock().push(mime_type_hint.to_string());
        match *self.save_answer.lock() {
            SaveAnswer::Cancel => Ok(None),
            SaveAnswer::Fail => Err(GlimpseError::platform("dialog crashed")),
            SaveAnswer::Accept => {
                let n = self.saves.fetch_add(1, Ordering::SeqCst);
                Ok(Some(PathBuf::from(format!(
                    "/home/user/Videos/capture-{n}.{}",
                    extension_for_mime(mime_type_hint)
                ))))
            }
        }
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> GlimpseResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GlimpseError::Io(std::io::Error::other("disk full")));
        }
        self.writes.lock().push(Written {
            path: path.to_path_buf(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn start_recording(&self) {
        self.lifecycle.lock().push("start");
    }

    fn stop_recording(&self) {
        self.lifecycle.lock().push("stop");
    }
}

/// Producer hooks of a fake capture track.
pub struct FakeSource {
    reject_constraints: bool,
    pub applied: Mutex<Vec<f64>>,
    pub stopped: AtomicBool,
    lost: AtomicBool,
}

impl FakeSource {
    /// Make the producer fail the track on its next frame.
    pub fn lose_device(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }
}

impl TrackSource for FakeSource {
    fn apply_constraints(&self, constraints: &TrackConstraints) -> GlimpseResult<()> {
        if self.reject_constraints {
            return Err(GlimpseError::media("constraint rejected"));
        }
        if let Some(fps) = constraints.frame_rate {
            self.applied.lock().push(fps);
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Grants a synthetic stream that pushes 8x6 frames every few milliseconds.
pub struct FakeDisplayMedia {
    host: Arc<FakeHost>,
    pub hang: AtomicBool,
    pub reject_constraints: AtomicBool,
    pub requested: Mutex<Vec<TrackConstraints>>,
    pub sources: Mutex<Vec<Arc<FakeSource>>>,
}

impl FakeDisplayMedia {
    pub fn new(host: Arc<FakeHost>) -> Arc<Self> {
        Arc::new(Self {
            host,
            hang: AtomicBool::new(false),
            reject_constraints: AtomicBool::new(false),
            requested: Mutex::new(Vec::new()),
            sources: Mutex::new(Vec::new()),
        })
    }

    pub fn last_source(&self) -> Option<Arc<FakeSource>> {
        self.sources.lock().last().cloned()
    }
}

#[async_trait::async_trait]
impl DisplayMedia for FakeDisplayMedia {
    async fn get_display_media(
        &self,
        constraints: &TrackConstraints,
    ) -> GlimpseResult<MediaStream> {
        self.requested.lock().push(*constraints);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let sources = self.host.get_sources().await?;
        let source = self
            .host
            .selection
            .resolve(&sources)
            .ok_or_else(|| GlimpseError::capture_denied("No capture source selected"))?;

        let hooks = Arc::new(FakeSource {
            reject_constraints: self.reject_constraints.load(Ordering::SeqCst),
            applied: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            lost: AtomicBool::new(false),
        });
        self.sources.lock().push(hooks.clone());
        let producer = hooks.clone();

        let fps = constraints.frame_rate.unwrap_or(60.0);
        let (track, writer) =
            VideoTrack::with_source(source.name.clone(), TrackSettings::with_frame_rate(fps), hooks);

        tokio::spawn(async move {
            let mut ts = 0u64;
            loop {
                if producer.lost.load(Ordering::SeqCst) {
                    writer.fail("capture device lost");
                    break;
                }
                let shade = (ts / 1_000_000 % 256) as u8;
                if !writer.push(VideoFrame::solid(8, 6, ts, [shade, 40, 200, 255])) {
                    break;
                }
                ts += 5_000_000;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        Ok(MediaStream::from_track(track))
    }
}

#[derive(Default)]
pub struct CountingPreview {
    pub attached: AtomicUsize,
    pub detached: AtomicUsize,
}

impl PreviewSink for CountingPreview {
    fn attach(&self, _stream: &MediaStream) {
        self.attached.fetch_add(1, Ordering::SeqCst);
    }

    fn detach(&self) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}

/// Writes one `f` per frame and `end` on finish.
struct ChunkEncoder {
    fail_finish: bool,
}

impl StreamEncoder for ChunkEncoder {
    fn push_frame(&mut self, _frame: &VideoFrame) -> GlimpseResult<()> {
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<Vec<u8>> {
        vec![b"f".to_vec()]
    }

    fn finish(self: Box<Self>) -> GlimpseResult<Vec<Vec<u8>>> {
        if self.fail_finish {
            return Err(GlimpseError::encode("container", "muxer rejected the stream"));
        }
        Ok(vec![b"end".to_vec()])
    }
}

#[derive(Default)]
pub struct FakeEncoderFactory {
    pub fail: AtomicBool,
    pub fail_finish: AtomicBool,
    pub created: Mutex<Vec<(ContainerFormat, u64)>>,
    pub frame_rates: Mutex<Vec<f64>>,
}

impl StreamEncoderFactory for FakeEncoderFactory {
    fn create(
        &self,
        format: ContainerFormat,
        bit_rate: u64,
        frame_rate: f64,
    ) -> GlimpseResult<Box<dyn StreamEncoder>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GlimpseError::encode("container", "encoder unavailable"));
        }
        self.created.lock().push((format, bit_rate));
        self.frame_rates.lock().push(frame_rate);
        Ok(Box::new(ChunkEncoder {
            fail_finish: self.fail_finish.load(Ordering::SeqCst),
        }))
    }
}

pub struct Rig {
    pub host: Arc<FakeHost>,
    pub media: Arc<FakeDisplayMedia>,
    pub preview: Arc<CountingPreview>,
    pub factory: Arc<FakeEncoderFactory>,
    pub container: Arc<ContainerBackend>,
    pub palette: Arc<PaletteBackend>,
    pub orchestrator: RecordingOrchestrator,
}

impl Rig {
    pub fn new() -> Self {
        let host = FakeHost::new();
        let media = FakeDisplayMedia::new(host.clone());
        let preview = Arc::new(CountingPreview::default());
        let factory = Arc::new(FakeEncoderFactory::default());

        let container = Arc::new(ContainerBackend::new(factory.clone()));
        let palette = Arc::new(PaletteBackend::new(PaletteOptions::default()));

        let capture = CaptureSessionManager::new(host.clone(), media.clone(), preview.clone());
        let orchestrator =
            RecordingOrchestrator::new(capture, host.clone(), OrchestratorConfig::default())
                .with_backends([
                    container.clone() as Arc<dyn EncoderBackend>,
                    palette.clone() as Arc<dyn EncoderBackend>,
                ]);

        Self {
            host,
            media,
            preview,
            factory,
            container,
            palette,
            orchestrator,
        }
    }

    pub fn enable(&self, container: bool, palette: bool) {
        self.container.set_enabled(container);
        self.palette.set_enabled(palette);
    }
}

/// Let the fake capture and the record stream run for a while.
pub async fn run_for(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
