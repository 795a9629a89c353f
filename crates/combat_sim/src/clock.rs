//! Monotonic simulation clock.

/// Simulation time in seconds, advanced once per step.
///
/// Cooldown expiries are absolute timestamps on this clock.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimClock {
    now: f64,
    tick: u64,
}

impl SimClock {
    /// A clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation time in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of steps taken so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance by `dt` seconds. Negative deltas are treated as zero.
    pub fn advance(&mut self, dt: f64) {
        self.now += dt.max(0.0);
        self.tick += 1;
    }
}
