//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the blackboard that state handlers read from and write
//! to: the latest sensor snapshot, the config captured for this tick, the
//! mode timer, the relay level the current mode asks for, and the operator
//! latch.  The tick driver fills in `now`, `sensors` and `config` before
//! every step; the engine owns the rest.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::Mode;
use super::timer::{ModeTimer, Timestamp};
use crate::config::ControllerConfig;

// ---------------------------------------------------------------------------
// Sensor snapshot (read-only to state handlers; produced by the sensor port)
// ---------------------------------------------------------------------------

/// A point-in-time snapshot of every sensor.  Any reading may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Pool water entering the collector (°C).
    pub inlet_temp: Option<f32>,
    /// Water leaving the solar collector (°C).
    pub collector_temp: Option<f32>,
    /// Outside air (°C).  Reported only; never used in decisions.
    pub ambient_temp: Option<f32>,
    /// Illuminance at the collector (lux).
    pub light_level: Option<f32>,
    pub observed_at: Timestamp,
}

impl SensorSnapshot {
    /// A snapshot with every reading missing.
    pub const fn unavailable(at: Timestamp) -> Self {
        Self {
            inlet_temp: None,
            collector_temp: None,
            ambient_temp: None,
            light_level: None,
            observed_at: at,
        }
    }

    /// Collector minus inlet.  `None` when either side is missing.
    pub fn temp_delta(&self) -> Option<f32> {
        Some(self.collector_temp? - self.inlet_temp?)
    }

    /// `true` when every reading the engine decides on is present.
    pub fn decision_inputs_present(&self) -> bool {
        self.inlet_temp.is_some() && self.collector_temp.is_some() && self.light_level.is_some()
    }
}

// ---------------------------------------------------------------------------
// Reason
// ---------------------------------------------------------------------------

/// Why the last transition happened.  Carried in status events and the
/// checkpoint for operators; decision logic never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    Startup,
    StartButton,
    ForceRunButton,
    EmergencyStop,
    SolarGain,
    AnalysisDue,
    AnalysisConfirmed,
    AnalysisRejected,
    RunComplete,
    LightBelowThreshold,
    DeltaBelowThreshold,
    ReadingUnavailable,
    SensorFault,
    ActuatorFault,
    Shutdown,
    RestoredLatch,
}

impl Reason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::StartButton => "start button",
            Self::ForceRunButton => "force-run button",
            Self::EmergencyStop => "emergency stop",
            Self::SolarGain => "solar gain",
            Self::AnalysisDue => "analysis interval elapsed",
            Self::AnalysisConfirmed => "analysis confirmed gain",
            Self::AnalysisRejected => "analysis found no gain",
            Self::RunComplete => "run complete",
            Self::LightBelowThreshold => "light below threshold",
            Self::DeltaBelowThreshold => "temperature delta below threshold",
            Self::ReadingUnavailable => "reading unavailable",
            Self::SensorFault => "sensor fault",
            Self::ActuatorFault => "relay fault",
            Self::Shutdown => "shutdown",
            Self::RestoredLatch => "emergency stop restored",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Controller state (value view of the engine)
// ---------------------------------------------------------------------------

/// The engine's state as a plain value, for checkpoints and status events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub mode: Mode,
    /// Level the current mode commands.  Never `true` in `Stopped`.
    pub pump_on: bool,
    pub mode_entered_at: Timestamp,
    pub last_action_reason: Reason,
    pub manual_stop_latched: bool,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Inputs (written by the tick driver) --
    pub now: Timestamp,
    pub sensors: SensorSnapshot,
    /// Config for this tick.  Windows already running keep the length they
    /// captured on entry (see [`ModeTimer`]).
    pub config: ControllerConfig,

    // -- Engine state --
    pub timer: ModeTimer,
    pub pump_on: bool,
    pub manual_stop_latched: bool,
    pub last_action_reason: Reason,
}

impl FsmContext {
    pub fn new(config: ControllerConfig, now: Timestamp) -> Self {
        Self {
            now,
            sensors: SensorSnapshot::unavailable(now),
            config,
            timer: ModeTimer::new(now),
            pump_on: false,
            manual_stop_latched: false,
            last_action_reason: Reason::Startup,
        }
    }

    /// Light at or above the threshold.  Missing light is "not met".
    pub fn light_strong(&self) -> bool {
        self.sensors
            .light_level
            .is_some_and(|lux| lux >= self.config.light_threshold_lux)
    }

    /// Light present and below the threshold.  Missing light is "not met".
    pub fn light_weak(&self) -> bool {
        self.sensors
            .light_level
            .is_some_and(|lux| lux < self.config.light_threshold_lux)
    }

    /// Δtemp at or above the threshold.  Missing Δtemp is "not met".
    pub fn delta_met(&self) -> bool {
        self.sensors
            .temp_delta()
            .is_some_and(|d| d >= self.config.temp_delta_threshold_c)
    }

    pub fn window_expired(&self) -> bool {
        self.timer.expired(self.now)
    }
}
