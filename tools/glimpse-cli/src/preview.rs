//! Headless preview that counts frames instead of drawing them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glimpse_media_model::MediaStream;
use glimpse_platform_core::PreviewSink;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct FrameCounter {
    frames: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames seen since the last attach.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl PreviewSink for FrameCounter {
    fn attach(&self, stream: &MediaStream) {
        let Some(track) = stream.video_track() else {
            return;
        };
        let mut reader = track.reader();
        let frames = self.frames.clone();
        frames.store(0, Ordering::Relaxed);

        let task = tokio::spawn(async move {
            while let Ok(Some(frame)) = reader.read().await {
                let seen = frames.fetch_add(1, Ordering::Relaxed) + 1;
                if seen == 1 {
                    let (width, height) = frame.dimensions();
                    tracing::info!(width, height, "First frame received");
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    fn detach(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
