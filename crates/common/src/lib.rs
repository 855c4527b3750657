//! Glimpse Common Utilities
//!
//! Shared infrastructure for all Glimpse crates:
//! - Error types and result aliases
//! - Clock and rate control for frame sampling
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
