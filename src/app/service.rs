//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the decision engine, safety supervisor and shared
//! context.  All I/O flows through port traits injected at call sites,
//! making the entire service testable with mock adapters and a manual
//! clock.
//!
//! ```text
//!   SensorPort ──▶ ┌──────────────────────────┐ ──▶ StatusSink
//! ButtonSource ──▶ │        AppService        │ ──▶ CheckpointPort
//!        Clock ──▶ │  FSM · Safety · Averages │
//!                  └──────────────────────────┘ ──▶ RelayPort
//! ```
//!
//! ## One tick
//!
//! 1. Read a sensor snapshot and update the rolling averages.
//! 2. Let the safety supervisor judge the snapshot.
//! 3. Drain button events and resolve the single winning press.
//! 4. Offer the press to the engine.  If it caused no transition, escalate
//!    any unreported safety fault.  If that did nothing either, run the
//!    sensor and timer rules.  At most one transition happens.
//! 5. Write the relay if the commanded level is not yet confirmed.
//! 6. Persist a checkpoint if anything changed (or the last save failed).
//! 7. Emit at most one status event: `Fatal` > `ModeChanged` > `Telemetry`.

use core::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::config::ControllerConfig;
use crate::error::{self, Error, SafetyFault};
use crate::fsm::context::{ControllerState, FsmContext, Reason};
use crate::fsm::overrides;
use crate::fsm::states::build_state_table;
use crate::fsm::timer::Timestamp;
use crate::fsm::{Fsm, Mode, ModeChange};
use crate::safety::SafetySupervisor;
use crate::sensors::average::SensorAverages;

use super::commands::AppCommand;
use super::events::{ModeStatus, StatusEvent, TelemetryData};
use super::ports::{
    ButtonSource, Checkpoint, CheckpointPort, Clock, RelayPort, SensorPort, StatusSink,
};

// ───────────────────────────────────────────────────────────────
// Relay bookkeeping
// ───────────────────────────────────────────────────────────────

/// Consecutive failed writes before the relay is declared faulty.
const RELAY_FAILURE_LIMIT: u8 = 2;

#[derive(Debug, Default)]
struct RelayTracker {
    /// Last level the relay accepted.  `None` at startup and after a failure.
    confirmed: Option<bool>,
    consecutive_failures: u8,
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    fsm: Fsm,
    ctx: FsmContext,
    safety: SafetySupervisor,
    averages: SensorAverages,
    relay: RelayTracker,
    /// Fault bits already announced with a `Fatal` event.
    reported_faults: u8,
    last_telemetry: Option<Timestamp>,
    telemetry_requested: bool,
    checkpoint_dirty: bool,
    last_transition_at: Option<DateTime<Utc>>,
    last_pump_start: Option<DateTime<Utc>>,
    tick_count: u64,
}

impl AppService {
    /// Construct the service from configuration and the last checkpoint.
    ///
    /// A checkpoint with the emergency-stop latch set puts the engine back
    /// in `Stopped`.  A checkpoint claiming the relay was ON is ignored:
    /// the pump always starts OFF.
    ///
    /// Does **not** start the engine: call [`start`](Self::start) next.
    pub fn new(config: ControllerConfig, restored: &Checkpoint) -> Self {
        let safety = SafetySupervisor::new(&config);
        let averages = SensorAverages::new(config.average_samples);
        let mut ctx = FsmContext::new(config, Timestamp::ZERO);

        let initial = if restored.manual_stop_latched {
            ctx.manual_stop_latched = true;
            Mode::Stopped
        } else {
            Mode::Idle
        };

        Self {
            fsm: Fsm::new(build_state_table(), initial),
            ctx,
            safety,
            averages,
            relay: RelayTracker::default(),
            reported_faults: 0,
            last_telemetry: None,
            telemetry_requested: false,
            checkpoint_dirty: true,
            last_transition_at: restored.last_transition_at,
            last_pump_start: restored.last_pump_start_time,
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter the initial mode, force the relay OFF and announce startup.
    pub fn start(
        &mut self,
        clock: &impl Clock,
        relay: &mut impl RelayPort,
        sink: &mut impl StatusSink,
    ) {
        self.ctx.now = clock.now();
        let reason = if self.ctx.manual_stop_latched {
            warn!("Emergency stop was latched before restart; staying stopped until Start");
            Reason::RestoredLatch
        } else {
            Reason::Startup
        };
        self.fsm.start(&mut self.ctx, reason);
        self.last_transition_at = Some(clock.wall_time());

        self.apply_relay(relay);

        sink.emit(&StatusEvent::Started(self.status()));
        info!("AppService started in {:?}", self.fsm.current_mode());
    }

    /// Bring the pump to a safe stop before exit: force `Stopped`, write
    /// OFF (with one immediate retry), persist, announce.
    pub fn shutdown(
        &mut self,
        clock: &impl Clock,
        relay: &mut impl RelayPort,
        store: &impl CheckpointPort,
        sink: &mut impl StatusSink,
    ) {
        self.ctx.now = clock.now();
        if let Some(change) = self
            .fsm
            .force_transition(Mode::Stopped, Reason::Shutdown, &mut self.ctx)
        {
            self.record_change(&change, clock);
        }

        for attempt in 1..=RELAY_FAILURE_LIMIT {
            match relay.set(false) {
                Ok(()) => {
                    self.relay.confirmed = Some(false);
                    break;
                }
                Err(e) => {
                    self.relay.confirmed = None;
                    error!("Shutdown: relay OFF attempt {attempt} failed: {e}");
                }
            }
        }

        self.checkpoint_dirty = true;
        self.flush_checkpoint(store);
        sink.emit(&StatusEvent::ShutDown(self.status()));
        info!("AppService shut down after {} ticks", self.tick_count);
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`RelayPort`], which avoids a double mutable borrow while keeping the
    /// port boundary explicit.
    pub fn tick(
        &mut self,
        clock: &impl Clock,
        hw: &mut (impl SensorPort + RelayPort),
        buttons: &mut impl ButtonSource,
        store: &impl CheckpointPort,
        sink: &mut impl StatusSink,
    ) -> Option<ModeChange> {
        self.tick_count += 1;
        let now = clock.now();
        self.ctx.now = now;

        // 1. Sensors
        let snapshot = hw.read(now);
        self.ctx.sensors = snapshot;
        self.averages.push(&snapshot);

        // 2. Safety evaluation
        self.safety.evaluate(&snapshot, now);

        // 3. Buttons
        let events = buttons.drain_events();
        let press = overrides::resolve(&events).map(|ev| ev.button);

        // 4. Engine: button > safety escalation > sensor rules
        let mut fatal = None;
        let latched = self.ctx.manual_stop_latched;
        let mut change = press.and_then(|b| self.fsm.handle_button(&mut self.ctx, b));
        if self.ctx.manual_stop_latched != latched {
            // Stop while already stopped latches without a transition.
            self.checkpoint_dirty = true;
        }
        if change.is_none() {
            if let Some((fault, escalation)) = self.escalate() {
                fatal = Some(fault);
                change = escalation;
            }
        }
        if change.is_none() && fatal.is_none() {
            change = self.fsm.update(&mut self.ctx);
        }
        if let Some(c) = &change {
            self.record_change(c, clock);
        }

        // 5. Relay
        self.apply_relay(hw);

        // 6. Checkpoint
        self.flush_checkpoint(store);

        // 7. Status
        let event = if let Some(fault) = fatal {
            Some(StatusEvent::Fatal {
                fault,
                status: self.status(),
            })
        } else if let Some(c) = change {
            Some(StatusEvent::ModeChanged {
                from: c.from,
                status: self.status(),
            })
        } else if self.telemetry_due(now) {
            self.telemetry_requested = false;
            self.last_telemetry = Some(now);
            Some(StatusEvent::Telemetry(self.build_telemetry(clock)))
        } else {
            None
        };
        if let Some(ev) = event {
            sink.emit(&ev);
        }

        change
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command between ticks.
    ///
    /// An invalid config is rejected and the running one stays in place.
    pub fn handle_command(&mut self, cmd: AppCommand) -> error::Result<()> {
        match cmd {
            AppCommand::UpdateConfig(new_config) => {
                if let Err(e) = new_config.validate() {
                    warn!("Config update rejected, keeping last known good: {e}");
                    return Err(Error::ConfigLoad(e));
                }
                if new_config == self.ctx.config {
                    return Ok(());
                }
                self.safety.set_grace(new_config.sensor_fault_grace());
                self.averages.set_window(new_config.average_samples);
                self.ctx.config = new_config;
                info!("Configuration updated at runtime");
            }
            AppCommand::RequestTelemetry => {
                self.telemetry_requested = true;
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.fsm.current_mode()
    }

    /// Relay level the engine commands.
    pub fn pump_on(&self) -> bool {
        self.ctx.pump_on
    }

    pub fn state(&self) -> ControllerState {
        self.fsm.state(&self.ctx)
    }

    pub fn status(&self) -> ModeStatus {
        ModeStatus {
            mode: self.fsm.current_mode(),
            pump_on: self.ctx.pump_on,
            reason: self.ctx.last_action_reason,
            manual_stop_latched: self.ctx.manual_stop_latched,
            at: self.ctx.timer.entered_at(),
        }
    }

    /// Current active fault bitmask (0 = no faults).
    pub fn fault_flags(&self) -> u8 {
        self.safety.faults()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.ctx.config
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Whether the relay has confirmed the commanded level.
    pub fn relay_confirmed(&self) -> bool {
        self.relay.confirmed == Some(self.ctx.pump_on)
    }

    /// The recovery record for the current state.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            relay_state: self.ctx.pump_on.into(),
            mode: self.fsm.current_mode(),
            last_action_reason: self.ctx.last_action_reason.to_string(),
            manual_stop_latched: self.ctx.manual_stop_latched,
            last_transition_at: self.last_transition_at,
            last_pump_start_time: self.last_pump_start,
        }
    }

    pub fn build_telemetry(&self, clock: &impl Clock) -> TelemetryData {
        TelemetryData {
            status: self.status(),
            sensors: self.ctx.sensors,
            averages: self.averages.readings(),
            fault_flags: self.safety.faults(),
            wall_time: clock.wall_time(),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Force `Stopped` for the first fault not yet announced.  Returns the
    /// fault and the transition (`None` if already stopped).  Any other
    /// fresh fault is announced on a later tick.
    fn escalate(&mut self) -> Option<(SafetyFault, Option<ModeChange>)> {
        if !self.safety.has_faults() {
            return None;
        }
        let fault = SafetyFault::ALL
            .into_iter()
            .find(|f| self.safety.has_fault(*f) && self.reported_faults & f.mask() == 0)?;
        self.reported_faults |= fault.mask();
        let faults = self.safety.faults();

        let reason = match fault {
            SafetyFault::SensorsUnavailable => Reason::SensorFault,
            SafetyFault::ActuatorWriteFailed => Reason::ActuatorFault,
        };
        error!("Safety fault: {fault}, forcing pump off (flags=0b{faults:08b})");
        let change = self
            .fsm
            .force_transition(Mode::Stopped, reason, &mut self.ctx);
        Some((fault, change))
    }

    fn record_change(&mut self, change: &ModeChange, clock: &impl Clock) {
        let wall = clock.wall_time();
        self.last_transition_at = Some(wall);
        if self.ctx.pump_on && !self.fsm.pump_on_in(change.from) {
            self.last_pump_start = Some(wall);
        }
        if change.from == Mode::Stopped {
            self.safety.acknowledge(change.at);
            self.reported_faults = 0;
        }
        self.checkpoint_dirty = true;
    }

    /// Write the commanded level unless the relay already confirmed it.
    fn apply_relay(&mut self, relay: &mut impl RelayPort) {
        let desired = self.ctx.pump_on;
        if self.relay.confirmed == Some(desired) {
            return;
        }

        match relay.set(desired) {
            Ok(()) => {
                if self.relay.consecutive_failures > 0 {
                    info!("Relay recovered after {} failed writes", self.relay.consecutive_failures);
                }
                self.relay.confirmed = Some(desired);
                self.relay.consecutive_failures = 0;
            }
            Err(e) => {
                self.relay.confirmed = None;
                self.relay.consecutive_failures = self.relay.consecutive_failures.saturating_add(1);
                if self.relay.consecutive_failures < RELAY_FAILURE_LIMIT {
                    warn!("Relay write (on={desired}) failed: {e}; retrying next tick");
                } else {
                    if self.relay.consecutive_failures == RELAY_FAILURE_LIMIT {
                        error!("Relay write (on={desired}) failed again: {e}");
                    }
                    self.safety.raise_actuator_fault();
                }
            }
        }
    }

    fn flush_checkpoint(&mut self, store: &impl CheckpointPort) {
        if !self.checkpoint_dirty {
            return;
        }
        match store.save_checkpoint(&self.checkpoint()) {
            Ok(()) => self.checkpoint_dirty = false,
            Err(e) => warn!("{}; retrying next tick", Error::ConfigSave(e)),
        }
    }

    fn telemetry_due(&self, now: Timestamp) -> bool {
        if self.telemetry_requested {
            return true;
        }
        let interval = Duration::from_secs(u64::from(self.ctx.config.telemetry_interval_s));
        self.last_telemetry
            .is_none_or(|last| now.saturating_since(last) >= interval)
    }
}
