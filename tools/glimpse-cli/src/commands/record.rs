//! Record a source until Ctrl+C or a fixed duration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use glimpse_capture_engine::{
    default_backends, CaptureRequest, CaptureSessionManager, OrchestratorConfig,
    RecordingOrchestrator,
};
use glimpse_common::config::AppConfig;
use glimpse_encoders::{BackendKind, GstEncoderFactory};
use glimpse_platform_core::DesktopHost;
use glimpse_platform_linux::{LinuxHost, LinuxHostConfig};

use crate::preview::FrameCounter;

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Source id from `glimpse sources` (default: first screen)
    #[arg(short, long)]
    source: Option<String>,

    /// Capture frame rate
    #[arg(long)]
    fps: Option<f64>,

    /// Frame rate of the stream handed to encoders
    #[arg(long)]
    record_fps: Option<f64>,

    /// Video MIME type, e.g. video/webm;codecs=vp9 or video/mp4
    #[arg(long)]
    codec: Option<String>,

    /// Video bit rate in MiB per second
    #[arg(long)]
    bitrate: Option<f64>,

    /// Skip the video container output
    #[arg(long)]
    no_video: bool,

    /// Also write an animated GIF
    #[arg(long)]
    gif: bool,

    #[arg(long)]
    gif_fps: Option<f64>,

    /// GIF quality, 1 (best) to 30 (fastest)
    #[arg(long)]
    gif_quality: Option<u8>,

    /// GIF dithering, e.g. none, FloydSteinberg, Atkinson-serpentine
    #[arg(long)]
    gif_dither: Option<String>,

    #[arg(long)]
    gif_workers: Option<usize>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(short, long)]
    duration: Option<u64>,

    /// Offer the synthetic test pattern as a source
    #[arg(long)]
    test_source: bool,
}

impl RecordArgs {
    fn apply(&self, config: &mut AppConfig) {
        let recording = &mut config.recording;
        if let Some(fps) = self.fps {
            recording.capture_fps = fps;
        }
        if let Some(fps) = self.record_fps {
            recording.record_fps = fps;
        }
        if let Some(codec) = &self.codec {
            recording.video_mime_type = codec.clone();
        }
        if let Some(bitrate) = self.bitrate {
            recording.bit_rate_mib = bitrate;
        }
        if self.no_video {
            recording.container_enabled = false;
        }
        if self.gif {
            recording.palette_enabled = true;
        }
        if let Some(fps) = self.gif_fps {
            recording.gif.fps = fps;
        }
        if let Some(quality) = self.gif_quality {
            recording.gif.quality = quality;
        }
        if let Some(workers) = self.gif_workers {
            recording.gif.workers = workers;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
    }
}

pub async fn run(mut config: AppConfig, args: RecordArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    let defaults = config.recording.clone();

    let host = Arc::new(LinuxHost::new(LinuxHostConfig {
        output_dir: config.output_dir.clone(),
        thumbnails: false,
        test_source: args.test_source,
    }));
    let source_id = match args.source.clone() {
        Some(id) => id,
        None => first_screen(host.as_ref()).await?,
    };

    let preview = Arc::new(FrameCounter::new());
    let capture = CaptureSessionManager::new(host.clone(), host.clone(), preview.clone())
        .with_picker_timeout(Duration::from_secs(defaults.picker_timeout_secs));
    let mut orchestrator =
        RecordingOrchestrator::new(capture, host.clone(), OrchestratorConfig::from(&defaults));
    for backend in default_backends(&defaults, Arc::new(GstEncoderFactory::new()))? {
        orchestrator.register_backend(backend);
    }
    if let Some(dither) = &args.gif_dither {
        orchestrator
            .configure_backend(BackendKind::Palette, "dither", dither.as_str())
            .context("Invalid --gif-dither")?;
    }

    println!("Recording {source_id}");
    println!("  Output: {}", config.output_dir.display());
    println!("  FPS: {} (record {})", defaults.capture_fps, defaults.record_fps);
    if defaults.container_enabled {
        println!("  Video: {} at {} MiB/s", defaults.video_mime_type, defaults.bit_rate_mib);
    }
    if defaults.palette_enabled {
        println!("  GIF: {} fps", defaults.gif.fps);
    }
    println!();

    let mut request = CaptureRequest::source(&source_id);
    request.frame_rate = Some(defaults.capture_fps);
    orchestrator
        .start_capture(request)
        .await
        .with_context(|| format!("Could not capture {source_id}"))?;

    let started = match orchestrator.start_recording().await {
        Ok(started) => started,
        Err(e) => {
            orchestrator.stop_capture().await;
            return Err(e).context("Could not start recording");
        }
    };
    for (kind, error) in &started.failures {
        println!("[WARN] {kind} did not start: {error}");
    }

    match args.duration {
        Some(secs) => {
            println!("Recording for {secs}s...");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            println!("Press Ctrl+C to stop recording...");
            tokio::signal::ctrl_c().await?;
        }
    }

    println!();
    let frames = preview.frames();
    let Some(outcome) = orchestrator.stop_capture().await else {
        anyhow::bail!("Recording did not stop cleanly");
    };

    tracing::info!(frames, "Capture finished");
    for saved in &outcome.saved {
        println!(
            "Saved {} ({}, {} bytes) to {}",
            saved.kind,
            saved.mime_type,
            saved.len,
            saved.path.display()
        );
    }
    for kind in &outcome.cancelled {
        println!("Save of {kind} output was cancelled");
    }
    for (kind, error) in &outcome.failures {
        println!("[FAIL] {kind}: {error}");
    }
    if let Some(error) = &outcome.stream_error {
        println!("[FAIL] Record stream: {error}");
    }
    if let Some(stats) = outcome.compositor {
        tracing::debug!(?stats, "Compositor stats");
    }

    if outcome.saved.is_empty() {
        anyhow::bail!("No recording was saved");
    }
    Ok(())
}

async fn first_screen(host: &LinuxHost) -> anyhow::Result<String> {
    let sources = host.get_sources().await?;
    sources
        .iter()
        .find(|source| source.id.starts_with("screen:"))
        .or_else(|| sources.first())
        .map(|source| source.id.clone())
        .context("No capture sources found; pass --source")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RecordArgs,
    }

    #[test]
    fn flags_override_config() {
        let harness = Harness::parse_from([
            "record",
            "--fps",
            "30",
            "--codec",
            "video/mp4",
            "--no-video",
            "--gif",
            "--gif-quality",
            "5",
            "--output",
            "/tmp/out",
        ]);
        let mut config = AppConfig::default();
        harness.args.apply(&mut config);

        assert_eq!(config.recording.capture_fps, 30.0);
        assert_eq!(config.recording.video_mime_type, "video/mp4");
        assert!(!config.recording.container_enabled);
        assert!(config.recording.palette_enabled);
        assert_eq!(config.recording.gif.quality, 5);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn no_flags_keep_config() {
        let harness = Harness::parse_from(["record"]);
        let mut config = AppConfig::default();
        harness.args.apply(&mut config);

        let defaults = AppConfig::default();
        assert_eq!(config.recording.video_mime_type, defaults.recording.video_mime_type);
        assert_eq!(config.output_dir, defaults.output_dir);
    }
}
