//! Glimpse Capture Engine
//!
//! Owns the capture session and the recording lifecycle. The orchestrator
//! derives a record stream from the live capture, fans it out to every
//! enabled encoder backend, and hands each finished artifact to the host's
//! save dialog.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │               RecordingOrchestrator               │
//! │  ┌───────────────────┐                            │
//! │  │ CaptureSession    │ raw stream                 │
//! │  │ Manager           ├──────────┐                 │
//! │  └───────────────────┘          ▼                 │
//! │                     ┌───────────────────────────┐ │
//! │                     │ FrameCompositor/Resampler │ │
//! │                     └─────────────┬─────────────┘ │
//! │                   record stream   │               │
//! │              ┌────────────────────┴───┐           │
//! │              ▼                        ▼           │
//! │     ┌─────────────────┐     ┌─────────────────┐   │
//! │     │ ContainerBackend│     │ PaletteBackend  │   │
//! │     └────────┬────────┘     └────────┬────────┘   │
//! │              └──────────┬────────────┘            │
//! │                         ▼ artifacts               │
//! │                  ┌──────────────┐                 │
//! │                  │ SavePipeline │                 │
//! │                  └──────────────┘                 │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod orchestrator;
pub mod save;
pub mod session;

pub use orchestrator::*;
pub use save::SavePipeline;
pub use session::*;
