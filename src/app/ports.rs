//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (sensors, relay, buttons, storage, status sinks, clock)
//! implement these traits.  The [`AppService`](super::service::AppService)
//! consumes them via generics, so the domain core never touches hardware
//! directly and tests can drive it with mocks and a manual clock.
//!
//! ## Contracts
//!
//! - **SensorPort** never fails outright: unreachable sensors come back as
//!   `None` fields.
//! - **RelayPort** is idempotent and safe to call every tick.
//! - **ButtonSource** is drained fully once per tick, in insertion order.
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **StatusSink** is fire-and-forget and must not block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ControllerConfig;
use crate::error::ActuatorError;
use crate::fsm::Mode;
use crate::fsm::context::SensorSnapshot;
use crate::fsm::overrides::ButtonEvent;
use crate::fsm::timer::Timestamp;

use super::events::StatusEvent;

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Time source.  Engine timing uses the monotonic side only; wall time is
/// stamped on checkpoints and telemetry.
pub trait Clock {
    fn now(&self) -> Timestamp;
    fn wall_time(&self) -> DateTime<Utc>;
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this to obtain sensor data.
pub trait SensorPort {
    /// Return the freshest snapshot, stamped `now`.  Must not block beyond
    /// a bounded timeout; missing sensors are `None`.
    fn read(&mut self, now: Timestamp) -> SensorSnapshot;
}

// ───────────────────────────────────────────────────────────────
// Relay port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the pump relay.
pub trait RelayPort {
    fn set(&mut self, on: bool) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Button source (driving adapter: operator → domain)
// ───────────────────────────────────────────────────────────────

/// Debounced press events captured since the last drain.
pub trait ButtonSource {
    fn drain_events(&mut self) -> Vec<ButtonEvent>;
}

// ───────────────────────────────────────────────────────────────
// Status sink (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits [`StatusEvent`]s through this port.  Delivery is
/// at-most-once; sinks drop rather than block.
pub trait StatusSink {
    fn emit(&mut self, event: &StatusEvent);
}

/// Fan-out to two sinks.
impl<A: StatusSink, B: StatusSink> StatusSink for (A, B) {
    fn emit(&mut self, event: &StatusEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

/// An optional sink; `None` discards.
impl<T: StatusSink> StatusSink for Option<T> {
    fn emit(&mut self, event: &StatusEvent) {
        if let Some(sink) = self {
            sink.emit(event);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the controller configuration.
///
/// Implementations MUST validate before persisting.  Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], never silently clamped.
pub trait ConfigPort {
    /// Returns [`ControllerConfig::default()`] if nothing is stored yet.
    fn load(&self) -> Result<ControllerConfig, ConfigError>;

    fn save(&self, config: &ControllerConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Checkpoint port (driven adapter: domain ↔ crash-recovery state)
// ───────────────────────────────────────────────────────────────

/// Relay level as persisted: `"ON"` / `"OFF"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayState {
    #[serde(rename = "ON")]
    On,
    #[default]
    #[serde(rename = "OFF")]
    Off,
}

impl From<bool> for RelayState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// Engine state persisted on every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    pub relay_state: RelayState,
    pub mode: Mode,
    #[serde(alias = "last_action")]
    pub last_action_reason: String,
    pub manual_stop_latched: bool,
    #[serde(alias = "last_action_time", deserialize_with = "wall_time::deserialize")]
    pub last_transition_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "wall_time::deserialize")]
    pub last_pump_start_time: Option<DateTime<Utc>>,
}

/// Checkpoint times are written as RFC 3339 but older config files hold
/// epoch seconds (`1717243200.5`).  Both are accepted on load.
mod wall_time {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stamp {
        Rfc3339(DateTime<Utc>),
        EpochSeconds(f64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<Stamp>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Stamp::Rfc3339(at)) => Ok(Some(at)),
            Some(Stamp::EpochSeconds(secs)) => {
                let millis = (secs * 1000.0).round();
                if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
                    return Err(D::Error::custom("epoch timestamp out of range"));
                }
                DateTime::from_timestamp_millis(millis as i64)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom("epoch timestamp out of range"))
            }
        }
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            relay_state: RelayState::Off,
            mode: Mode::Idle,
            last_action_reason: String::new(),
            manual_stop_latched: false,
            last_transition_at: None,
            last_pump_start_time: None,
        }
    }
}

pub trait CheckpointPort {
    /// Returns [`Checkpoint::default()`] if nothing is stored yet.
    fn load_checkpoint(&self) -> Result<Checkpoint, ConfigError>;

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] and [`CheckpointPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No stored document.
    NotFound,
    /// Stored document failed to parse.
    Corrupted,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Reading, writing or renaming the backing file failed.
    Io,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
