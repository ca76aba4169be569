//! Simulation clock.
//!
//! WRITE operations stamp the records they create. The clock is injected into
//! the toolkit so that replaying the same actions against the same snapshot
//! produces the same state.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

/// Source of "now" for toolkit operations.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current simulated instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current simulated date as `YYYY-MM-DD`.
    fn today(&self) -> String {
        self.now().format("%Y-%m-%d").to_string()
    }
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Creates a clock frozen at `at`.
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self(default_simulation_time())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Instant used when a task does not pin its own simulation time.
#[must_use]
pub fn default_simulation_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Formats an instant the way ledger records store it.
#[must_use]
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
