//! Glimpse Render Engine
//!
//! Derives the record stream encoders consume from the raw capture stream.
//!
//! # Pipeline Architecture
//!
//! ```text
//! capture track ──► pull loop ──► Surface (resized to each frame)
//!                                    │
//!                                    ├── sampler @ fps A ──► record track
//!                                    └── sampler @ fps B ──► record track
//! ```
//!
//! The pull loop draws every frame it receives; the samplers copy the
//! surface out at their own rate. When no fixed-size pixel source is needed,
//! [`Resampler`] forwards capture frames directly at a lower rate.

pub mod compositor;
pub mod resample;
pub mod surface;

pub use compositor::{CompositorStats, FrameCompositor};
pub use resample::Resampler;
pub use surface::Surface;
