//! Clock adapters.
//!
//! - [`MonotonicClock`]: `std::time::Instant` since process start for
//!   engine timing, `chrono::Utc::now()` for wall-clock stamps.
//! - [`ManualClock`]: a clock the caller advances by hand.  Clones share
//!   the same time, so a test can hand one to a background thread and
//!   still drive it.

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};

use crate::app::ports::Clock;
use crate::fsm::timer::Timestamp;

/// Production clock.  Copies share the same origin.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Time since the clock was created.
    pub fn uptime(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.origin.elapsed().as_millis() as u64)
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and simulations.
///
/// Wall time is `epoch + monotonic offset`, so both sides move together.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
    epoch: DateTime<Utc>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Starts at zero, with wall time at the Unix epoch.
    pub fn new() -> Self {
        Self::with_epoch(DateTime::UNIX_EPOCH)
    }

    pub fn with_epoch(epoch: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(0)),
            epoch,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }

    fn wall_time(&self) -> DateTime<Utc> {
        let offset = self.millis.load(Ordering::SeqCst);
        self.epoch + TimeDelta::milliseconds(offset as i64)
    }
}
