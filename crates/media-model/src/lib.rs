//! Glimpse Media Model
//!
//! Defines the in-process media contracts every other Glimpse crate talks in:
//! - **Frames:** Timestamped RGBA video frames
//! - **Tracks:** Live video tracks with settings, constraints, and a
//!   multi-reader frame fan-out
//! - **Streams:** Groups of tracks handed between capture, compositing,
//!   and encoding
//!
//! A track has exactly one producer ([`TrackWriter`]) and any number of
//! consumers ([`FrameReader`]). Stopping a track never discards frames a
//! reader has already been sent.

pub mod frame;
pub mod stream;
pub mod track;

pub use frame::*;
pub use stream::*;
pub use track::*;
