//! Injected time source.
//!
//! Pure derivations never read the clock. The cascade and mutation helpers
//! consult it only when the caller passes a zero timestamp, and then read it
//! exactly once per call.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Provides the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to. Each read returns the current value
/// and then advances it by `step` so tests can tell consecutive reads apart.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
    step: i64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
            step: 0,
        }
    }

    /// A clock that advances by `step` after every read.
    pub fn ticking(start: i64, step: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
            step,
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn peek(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }
}

/// Returns `timestamp` when non-zero, else one reading of `clock`.
pub fn resolve_timestamp(timestamp: i64, clock: &dyn Clock) -> i64 {
    if timestamp != 0 {
        timestamp
    } else {
        clock.now_millis()
    }
}
