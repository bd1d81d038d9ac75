//! Frame timing
//!
//! Tracks the scaled frame delta, total elapsed time and the fixed-step
//! accumulator used to schedule `fixed_update` passes.

use std::time::Duration;

/// Frame timing state advanced once per engine tick
#[derive(Debug, Clone)]
pub struct Time {
    delta: f32,
    unscaled_delta: f32,
    elapsed: f64,
    frame_count: u64,
    time_scale: f32,
    max_delta: f32,
    fixed_timestep: f32,
    accumulator: f32,
}

impl Time {
    /// Create a timer with the given fixed step and delta clamp (seconds)
    pub fn new(fixed_timestep: f32, max_delta: f32) -> Self {
        Self {
            delta: 0.0,
            unscaled_delta: 0.0,
            elapsed: 0.0,
            frame_count: 0,
            time_scale: 1.0,
            max_delta,
            fixed_timestep,
            accumulator: 0.0,
        }
    }

    /// Advance by a wall-clock frame duration.
    ///
    /// The raw delta is clamped to `max_delta` before scaling. Returns
    /// `true` if clamping happened.
    pub fn advance(&mut self, frame: Duration) -> bool {
        let raw = frame.as_secs_f32();
        let clamped = raw > self.max_delta;
        self.unscaled_delta = raw.min(self.max_delta);
        self.delta = self.unscaled_delta * self.time_scale;
        self.elapsed += f64::from(self.delta);
        self.accumulator += self.delta;
        self.frame_count += 1;
        clamped
    }

    /// Take up to `max_steps` whole fixed steps out of the accumulator.
    ///
    /// When the cap is hit the leftover backlog is discarded. Returns the
    /// number of steps taken and whether any backlog was discarded.
    pub fn consume_fixed_steps(&mut self, max_steps: u32) -> (u32, bool) {
        if self.fixed_timestep <= 0.0 {
            return (0, false);
        }
        let mut steps = 0;
        while self.accumulator >= self.fixed_timestep && steps < max_steps {
            self.accumulator -= self.fixed_timestep;
            steps += 1;
        }
        let dropped = self.accumulator >= self.fixed_timestep;
        if dropped {
            self.accumulator = 0.0;
        }
        (steps, dropped)
    }

    /// Scaled delta of the last frame in seconds
    #[must_use]
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Clamped but unscaled delta of the last frame in seconds
    #[must_use]
    pub fn unscaled_delta(&self) -> f32 {
        self.unscaled_delta
    }

    /// Scaled time since the first frame in seconds
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Number of frames advanced so far
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Fixed step length in seconds
    #[must_use]
    pub fn fixed_timestep(&self) -> f32 {
        self.fixed_timestep
    }

    /// Unconsumed fixed-step time in seconds
    #[must_use]
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Current time scale
    #[must_use]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Set the time scale (negative values are treated as zero)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new(0.02, 0.25)
    }
}
