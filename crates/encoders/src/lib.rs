//! Glimpse Encoders
//!
//! Encoder backends consume a record stream and produce one artifact per
//! recording. Two variants share the [`EncoderBackend`] contract:
//! - **Container:** streams frames through a GStreamer encoder/muxer and
//!   concatenates the emitted chunks (WebM, MP4, 3GPP)
//! - **Palette:** samples frames at its own rate, quantises them to 256
//!   colours and writes an animated GIF
//!
//! `stop()` never hands back bytes directly: it returns a
//! [`PendingArtifact`] that resolves once the encoder has finished.

pub mod backend;
pub mod container;
pub mod gst_encoder;
pub mod palette;
pub mod quantize;
mod recorder;

pub use backend::*;
pub use container::{ContainerBackend, ContainerFormat, StreamEncoder, StreamEncoderFactory};
pub use gst_encoder::GstEncoderFactory;
pub use palette::{PaletteBackend, PaletteOptions, Repeat};
pub use quantize::{DitherKernel, Dithering};
