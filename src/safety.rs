//! Safety supervisor.
//!
//! The supervisor runs **every tick after the sensor read** and accumulates
//! a latched fault bitmask.  The tick driver escalates any active fault to
//! `Stopped` with a fatal status event.
//!
//! ## Fault lifecycle
//!
//! 1. A condition persists: a decision-critical reading has been missing
//!    for longer than the grace period, or the relay rejected a write and
//!    its retry.
//! 2. The supervisor sets the corresponding bit.
//! 3. The tick driver forces the engine into `Stopped`; the relay is held
//!    OFF.
//! 4. Bits stay set even if the condition clears.  Only an operator Start
//!    in `Stopped` calls [`SafetySupervisor::acknowledge`], which clears
//!    every bit and restarts the grace period.
//!
//! Short sensor gaps never raise a fault: the engine already treats a
//! missing reading as "threshold not met".

use core::time::Duration;

use log::{error, info};

use crate::config::ControllerConfig;
use crate::error::SafetyFault;
use crate::fsm::context::SensorSnapshot;
use crate::fsm::timer::Timestamp;

/// Safety supervisor.
pub struct SafetySupervisor {
    grace: Duration,
    /// Latched fault bitmask.
    faults: u8,
    /// Start of the current run of incomplete snapshots.
    missing_since: Option<Timestamp>,
}

impl SafetySupervisor {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            grace: config.sensor_fault_grace(),
            faults: 0,
            missing_since: None,
        }
    }

    /// Apply a reloaded grace period.  A gap already in progress is judged
    /// against the new value.
    pub fn set_grace(&mut self, grace: Duration) {
        self.grace = grace;
    }

    /// Evaluate the latest snapshot.  Returns the updated fault bitmask.
    pub fn evaluate(&mut self, snap: &SensorSnapshot, now: Timestamp) -> u8 {
        if snap.decision_inputs_present() {
            if self.missing_since.take().is_some() {
                info!("SAFETY: sensor readings restored");
            }
        } else {
            let since = *self.missing_since.get_or_insert(now);
            if now.saturating_since(since) >= self.grace {
                self.raise(SafetyFault::SensorsUnavailable);
            }
        }

        self.faults
    }

    /// The relay failed its write and the retry.
    pub fn raise_actuator_fault(&mut self) {
        self.raise(SafetyFault::ActuatorWriteFailed);
    }

    /// Operator acknowledged the stop.  Clears every fault.
    pub fn acknowledge(&mut self, now: Timestamp) {
        if self.faults != 0 {
            info!("SAFETY: faults 0b{:08b} acknowledged", self.faults);
        }
        self.faults = 0;
        self.missing_since = self.missing_since.map(|_| now);
    }

    /// Current fault bitmask.
    pub fn faults(&self) -> u8 {
        self.faults
    }

    /// True if **any** fault is active.
    pub fn has_faults(&self) -> bool {
        self.faults != 0
    }

    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.faults & fault.mask() != 0
    }

    // ── Internal ──────────────────────────────────────────────────

    fn raise(&mut self, fault: SafetyFault) {
        if self.faults & fault.mask() == 0 {
            error!("SAFETY FAULT SET: {fault}");
        }
        self.faults |= fault.mask();
    }
}
