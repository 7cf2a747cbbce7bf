//! Outbound status events.
//!
//! The [`AppService`](super::service::AppService) emits at most one of
//! these per tick through the [`StatusSink`](super::ports::StatusSink)
//! port.  Sinks on the other side log them or export them as telemetry;
//! they never feed back into decisions.

use chrono::{DateTime, Utc};

use crate::error::SafetyFault;
use crate::fsm::Mode;
use crate::fsm::context::{Reason, SensorSnapshot};
use crate::fsm::timer::Timestamp;
use crate::sensors::average::AverageReadings;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// The service has started (carries the initial mode).
    Started(ModeStatus),

    /// The engine moved between modes.
    ModeChanged { from: Mode, status: ModeStatus },

    /// A safety fault forced the pump off.  Needs operator attention.
    Fatal { fault: SafetyFault, status: ModeStatus },

    /// Periodic telemetry snapshot.
    Telemetry(TelemetryData),

    /// Final event before the process exits.
    ShutDown(ModeStatus),
}

impl StatusEvent {
    /// Mode status carried by every variant.
    pub fn status(&self) -> &ModeStatus {
        match self {
            Self::Started(s)
            | Self::ModeChanged { status: s, .. }
            | Self::Fatal { status: s, .. }
            | Self::ShutDown(s) => s,
            Self::Telemetry(t) => &t.status,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// What the engine is doing and why.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeStatus {
    pub mode: Mode,
    pub pump_on: bool,
    pub reason: Reason,
    pub manual_stop_latched: bool,
    pub at: Timestamp,
}

/// A point-in-time telemetry snapshot suitable for logging or transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryData {
    pub status: ModeStatus,
    /// Latest raw readings.
    pub sensors: SensorSnapshot,
    /// Rolling averages over `average_samples` ticks.
    pub averages: AverageReadings,
    pub fault_flags: u8,
    pub wall_time: DateTime<Utc>,
}
