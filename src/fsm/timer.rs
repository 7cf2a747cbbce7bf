//! Timer / countdown management.
//!
//! Every mode records the instant it was entered.  Modes that run for a
//! bounded time also capture their window length **at entry**, so a config
//! hot-reload mid-window never shortens or stretches a window that is
//! already running.  All comparisons use elapsed time, never wall clock.

use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Monotonic instant, in milliseconds since the controller started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1000)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl core::ops::Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

/// Tracks how long the current mode has been active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeTimer {
    entered_at: Timestamp,
    window: Option<Duration>,
}

impl ModeTimer {
    pub fn new(now: Timestamp) -> Self {
        Self {
            entered_at: now,
            window: None,
        }
    }

    /// Start timing a new mode.  `window` is frozen until the next restart.
    pub fn restart(&mut self, now: Timestamp, window: Option<Duration>) {
        self.entered_at = now;
        self.window = window;
    }

    pub fn entered_at(&self) -> Timestamp {
        self.entered_at
    }

    pub fn window(&self) -> Option<Duration> {
        self.window
    }

    pub fn elapsed(&self, now: Timestamp) -> Duration {
        now.saturating_since(self.entered_at)
    }

    /// `true` once the captured window has fully elapsed.  Modes without a
    /// window never expire.
    pub fn expired(&self, now: Timestamp) -> bool {
        self.window.is_some_and(|w| self.elapsed(now) >= w)
    }
}
