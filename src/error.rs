//! Unified error types for the pool controller.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! tick driver's error handling uniform.  Leaf variants are `Copy` so they
//! can be passed through the safety supervisor and FSM without allocation.
//!
//! | Category            | Handling                                         |
//! |---------------------|--------------------------------------------------|
//! | `SensorUnavailable` | recovered locally, reading becomes `None`        |
//! | `ActuatorWriteFailed` | retried once, then escalated to `Stopped`      |
//! | `ConfigLoad`        | fatal at startup, last-known-good mid-run        |
//! | `ConfigSave`        | logged, retried on the next tick                 |

use core::fmt;

use crate::app::ports::ConfigError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be read or returned implausible data.
    SensorUnavailable(SensorError),
    /// A relay command failed.
    ActuatorWriteFailed(ActuatorError),
    /// A safety interlock tripped.
    Safety(SafetyFault),
    /// Configuration could not be loaded or failed validation.
    ConfigLoad(ConfigError),
    /// Configuration or checkpoint could not be persisted.
    ConfigSave(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorUnavailable(e) => write!(f, "sensor unavailable: {e}"),
            Self::ActuatorWriteFailed(e) => write!(f, "actuator write failed: {e}"),
            Self::Safety(e) => write!(f, "safety: {e}"),
            Self::ConfigLoad(e) => write!(f, "config load: {e}"),
            Self::ConfigSave(e) => write!(f, "config save: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The device node does not exist (probe unplugged, driver not loaded).
    NotPresent,
    /// Reading the device node failed.
    ReadFailed,
    /// DS18B20 scratchpad CRC did not validate.
    CrcMismatch,
    /// The device returned text we could not parse.
    Malformed,
    /// DS18B20 returned its 85 °C power-on reset value.
    PowerOnReset,
    /// Reading is outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPresent => write!(f, "device not present"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::Malformed => write!(f, "malformed reading"),
            Self::PowerOnReset => write!(f, "power-on reset value"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl std::error::Error for SensorError {}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::SensorUnavailable(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// GPIO value write failed.
    GpioWriteFailed,
    /// The GPIO line could not be exported or configured.
    GpioUnavailable,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
            Self::GpioUnavailable => write!(f, "GPIO unavailable"),
        }
    }
}

impl std::error::Error for ActuatorError {}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::ActuatorWriteFailed(e)
    }
}

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Safety faults drive the engine into `Stopped` and are accumulated in a
/// bitfield by the safety supervisor so that simultaneous faults can be
/// tracked together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyFault {
    /// A decision-critical reading has been missing beyond the grace period.
    SensorsUnavailable = 0b0000_0001,
    /// The relay rejected a write and its retry.
    ActuatorWriteFailed = 0b0000_0010,
}

impl SafetyFault {
    /// Every fault, in reporting order.
    pub const ALL: [Self; 2] = [Self::SensorsUnavailable, Self::ActuatorWriteFailed];

    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorsUnavailable => write!(f, "sensors unavailable"),
            Self::ActuatorWriteFailed => write!(f, "relay write failed"),
        }
    }
}

impl From<SafetyFault> for Error {
    fn from(e: SafetyFault) -> Self {
        Self::Safety(e)
    }
}

/// Controller-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
