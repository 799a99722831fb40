//! Fixed-step simulation clock.
//!
//! The simulation is headless, so frame time is fed in by the caller instead
//! of being read from the wall clock. Each fixed step advances `now` by
//! exactly `fixed_dt`.

/// Most fixed steps run for a single `accumulate` call.
const MAX_STEPS_PER_FRAME: u32 = 10;

/// Fixed-timestep accumulator.
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Leftover time not yet consumed by a fixed step
    accumulator: f32,
    /// Seconds per fixed step
    fixed_dt: f32,
    /// Largest frame delta accepted
    max_dt: f32,
    /// Fixed steps taken so far
    ticks: u64,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(60)
    }
}

impl SimClock {
    /// Creates a clock running `tick_rate` fixed steps per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        Self {
            accumulator: 0.0,
            fixed_dt: 1.0 / tick_rate.max(1) as f32,
            max_dt: 0.25,
            ticks: 0,
        }
    }

    /// Seconds per fixed step.
    #[must_use]
    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Simulated seconds elapsed.
    ///
    /// Derived from the step count so long runs do not drift.
    #[must_use]
    pub fn now(&self) -> f32 {
        (self.ticks as f64 * f64::from(self.fixed_dt)) as f32
    }

    /// Fixed steps taken so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Adds frame time and returns how many fixed steps are due.
    pub fn accumulate(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.clamp(0.0, self.max_dt);
        let mut count = 0;

        while self.accumulator >= self.fixed_dt && count < MAX_STEPS_PER_FRAME {
            self.accumulator -= self.fixed_dt;
            count += 1;
        }

        // Still behind: drop the backlog
        if self.accumulator > self.fixed_dt * 2.0 {
            self.accumulator = 0.0;
        }

        count
    }

    /// Marks one fixed step as taken.
    pub fn advance(&mut self) {
        self.ticks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_counts_whole_steps() {
        let mut clock = SimClock::new(10);
        assert_eq!(clock.accumulate(0.05), 0);
        assert_eq!(clock.accumulate(0.06), 1);
        assert_eq!(clock.accumulate(0.2), 2);
    }

    #[test]
    fn test_accumulate_clamps_large_frames() {
        let mut clock = SimClock::new(100);
        // 5s frame is clamped to 0.25s
        assert_eq!(clock.accumulate(5.0), 10);
        // Backlog beyond two steps was dropped
        assert_eq!(clock.accumulate(0.0), 0);
    }

    #[test]
    fn test_negative_delta_ignored() {
        let mut clock = SimClock::new(60);
        assert_eq!(clock.accumulate(-1.0), 0);
    }

    #[test]
    fn test_now_tracks_ticks() {
        let mut clock = SimClock::new(50);
        for _ in 0..100 {
            clock.advance();
        }
        assert_eq!(clock.ticks(), 100);
        assert!((clock.now() - 2.0).abs() < 1e-5);
    }
}
