//! Monotonic time source used for position math

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Monotonic nanosecond clock.
///
/// Implementations must never go backwards, must be callable from any thread
/// without extra synchronization and must be cheap enough for a real-time
/// path. Only the difference between two readings carries meaning.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Seconds elapsed between two clock readings. Saturates at zero.
pub fn elapsed_secs(earlier: u64, later: u64) -> f64 {
    later.saturating_sub(earlier) as f64 / NANOS_PER_SEC
}

/// Wall-clock backed implementation anchored at construction time.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        // u64 nanoseconds cover ~584 years of uptime
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Hand-driven clock for deterministic tests and offline rendering.
///
/// Time only moves when [`ManualClock::advance`] is called.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| {
                Some(now.saturating_add(by))
            })
            .ok();
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.nanos.load(Ordering::Acquire)
    }
}
