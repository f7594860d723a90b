//! Frame timing.

use std::time::{Duration, Instant};

/// Measures total elapsed time and per-frame deltas.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Total time since creation.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time since the previous `tick`, then restart the delta.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts presented frames and reports a rate once per `window`.
#[derive(Debug)]
pub struct FpsCounter {
    window: Duration,
    accumulated: Duration,
    frames: u32,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            accumulated: Duration::ZERO,
            frames: 0,
        }
    }

    /// Record one frame that took `delta`.
    ///
    /// Returns the average frames per second whenever a full window has elapsed.
    pub fn record(&mut self, delta: Duration) -> Option<f64> {
        self.frames += 1;
        self.accumulated += delta;
        if self.accumulated < self.window {
            return None;
        }
        let fps = f64::from(self.frames) / self.accumulated.as_secs_f64();
        self.frames = 0;
        self.accumulated = Duration::ZERO;
        Some(fps)
    }
}
