//! Per-tick frame timing
//!
//! The host's render loop owns the real clock; [`FrameClock`] is a small
//! helper for hosts that don't have one of their own.

use std::time::{Duration, Instant};

/// Timing context for one render tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTiming {
    /// Monotonic tick counter, starting at 0
    pub frame_index: u64,
    /// Time since the previous tick (clamped)
    pub delta: Duration,
    /// Sum of all deltas so far
    pub total: Duration,
}

/// Produces [`FrameTiming`] values from wall-clock time.
#[derive(Debug, Clone)]
pub struct FrameClock {
    /// Maximum delta time clamp (long stalls count as one slow frame)
    max_delta: Duration,
    /// Delta reported for the first tick
    nominal_delta: Duration,
    last_tick: Option<Instant>,
    frame_index: u64,
    total: Duration,
}

impl FrameClock {
    /// Create a clock for a nominal tick rate in Hz.
    pub fn new(tick_rate: u32) -> Self {
        let nominal_delta = Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64);
        Self {
            max_delta: Duration::from_millis(100),
            nominal_delta,
            last_tick: None,
            frame_index: 0,
            total: Duration::ZERO,
        }
    }

    pub fn nominal_delta(&self) -> Duration {
        self.nominal_delta
    }

    /// Advance using the current time.
    pub fn tick(&mut self) -> FrameTiming {
        self.tick_at(Instant::now())
    }

    /// Advance using an explicit timestamp.
    pub fn tick_at(&mut self, now: Instant) -> FrameTiming {
        let delta = match self.last_tick {
            Some(last) => now.saturating_duration_since(last).min(self.max_delta),
            None => self.nominal_delta,
        };
        self.last_tick = Some(now);
        self.total += delta;

        let timing = FrameTiming {
            frame_index: self.frame_index,
            delta,
            total: self.total,
        };
        self.frame_index += 1;
        timing
    }
}
