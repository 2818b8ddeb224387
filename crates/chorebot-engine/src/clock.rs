//! Time sources for evaluation.
//!
//! State records and expressions work in `f64` seconds. The engine reads
//! "now" from a [`Clock`] so tests can drive time by hand.

use std::time::Instant;

use parking_lot::Mutex;

/// Source of the current engine time, in seconds.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> f64;
}

/// Monotonic clock counting seconds since its creation.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    /// Time zero.
    origin: Instant,
}

impl SystemClock {
    /// Start a clock at zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current reading.
    now: Mutex<f64>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to `t`.
    pub fn set(&self, t: f64) {
        *self.now.lock() = t;
    }

    /// Move forward by `dt` seconds.
    pub fn advance(&self, dt: f64) {
        *self.now.lock() += dt;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}
