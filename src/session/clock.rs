// src/session/clock.rs — Wall-clock source for session timestamps
//
// Timestamps are Unix seconds as f64 so an absolute end time can be sent
// across the process boundary and compared on the other side.

use std::sync::{Arc, Mutex};

use chrono::Utc;

pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, seconds: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += seconds;
        }
    }

    pub fn set(&self, at: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.lock().map(|n| *n).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_unix_seconds() {
        let now = SystemClock.now();
        // After 2020-01-01.
        assert!(now > 1_577_836_800.0);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(100.0);
        let other = clock.clone();
        clock.advance(2.5);
        assert_eq!(other.now(), 102.5);
        other.set(7.0);
        assert_eq!(clock.now(), 7.0);
    }
}
