//! Clock and rate utilities for frame sampling.
//!
//! Every stream derived during a recording is timestamped against a
//! monotonic epoch captured when the stream was created. This module provides:
//! - The recording clock (monotonic epoch)
//! - Frame-rate normalisation
//! - A rate controller that decides which frames to keep at a target rate

use std::time::Instant;

/// Frame rate used when a caller supplies nothing usable.
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

/// Normalise a caller-supplied frame rate.
///
/// Missing, zero, negative and non-finite values fall back to
/// [`DEFAULT_FRAME_RATE`], so no zero or negative constraint is ever produced.
pub fn normalize_frame_rate(fps: Option<f64>) -> f64 {
    match fps {
        Some(fps) if fps.is_finite() && fps > 0.0 => fps,
        _ => DEFAULT_FRAME_RATE,
    }
}

/// A recording clock that provides monotonic timestamps relative to
/// a fixed epoch.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    epoch: Instant,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Get nanoseconds elapsed since the epoch.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Frame rate controller used to sample a stream at a lower rate.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given rate in frames per second.
    pub fn new(target_fps: f64) -> Self {
        let fps = normalize_frame_rate(Some(target_fps));
        Self {
            target_interval_ns: (1_000_000_000.0 / fps) as u64,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    ///
    /// Ticks stay on a fixed grid of target intervals, so a source whose
    /// interval does not divide the target's still yields the target rate.
    /// After a gap of more than one interval the grid restarts at the frame.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        let interval = self.target_interval_ns;
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last.saturating_add(interval) => {
                let next = last + interval;
                let anchor = if current_ns >= next.saturating_add(interval) {
                    current_ns
                } else {
                    next
                };
                self.last_tick_ns = Some(anchor);
                true
            }
            _ => false,
        }
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.target_interval_ns
    }
}
