//! Mock adapters for integration tests.
//!
//! Every port the service touches has an in-memory stand-in that records
//! what it was asked to do, plus a [`Rig`] that wires them to an
//! [`AppService`] driven by a [`ManualClock`].

use std::cell::{Cell, RefCell};
use std::time::Duration;

use pipool::adapters::time::ManualClock;
use pipool::app::events::StatusEvent;
use pipool::app::ports::{
    ButtonSource, Checkpoint, CheckpointPort, Clock, ConfigError, RelayPort, SensorPort,
    StatusSink,
};
use pipool::app::service::AppService;
use pipool::config::ControllerConfig;
use pipool::error::ActuatorError;
use pipool::fsm::context::SensorSnapshot;
use pipool::fsm::overrides::{Button, ButtonEvent};
use pipool::fsm::timer::Timestamp;
use pipool::fsm::{Mode, ModeChange};

// ── Readings ──────────────────────────────────────────────────

/// Sunny and the collector is warmer than the pool.
pub fn sunny() -> SensorSnapshot {
    readings(24.0, 28.0, 40_000.0)
}

/// Dark, no gain.
pub fn night() -> SensorSnapshot {
    readings(24.0, 24.0, 50.0)
}

pub fn readings(inlet: f32, collector: f32, light: f32) -> SensorSnapshot {
    SensorSnapshot {
        inlet_temp: Some(inlet),
        collector_temp: Some(collector),
        ambient_temp: Some(21.0),
        light_level: Some(light),
        observed_at: Timestamp::ZERO,
    }
}

pub fn all_missing() -> SensorSnapshot {
    SensorSnapshot::unavailable(Timestamp::ZERO)
}

// ── MockHardware ──────────────────────────────────────────────

/// Sensor readings set by the test, and a relay that records every write
/// attempt and can be told to fail.
pub struct MockHardware {
    pub readings: SensorSnapshot,
    /// Every `set` call, successful or not.
    pub attempts: Vec<bool>,
    /// Level the relay last accepted.
    pub level: Option<bool>,
    /// Upcoming writes to reject.
    pub fail_next: u32,
    /// Reject every write while set.
    pub broken: bool,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new(readings: SensorSnapshot) -> Self {
        Self {
            readings,
            attempts: Vec::new(),
            level: None,
            fail_next: 0,
            broken: false,
        }
    }

    pub fn pump_on(&self) -> bool {
        self.level == Some(true)
    }
}

impl SensorPort for MockHardware {
    fn read(&mut self, now: Timestamp) -> SensorSnapshot {
        SensorSnapshot {
            observed_at: now,
            ..self.readings
        }
    }
}

impl RelayPort for MockHardware {
    fn set(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.attempts.push(on);
        if self.broken || self.fail_next > 0 {
            self.fail_next = self.fail_next.saturating_sub(1);
            return Err(ActuatorError::GpioWriteFailed);
        }
        self.level = Some(on);
        Ok(())
    }
}

// ── MockButtons ───────────────────────────────────────────────

#[derive(Default)]
pub struct MockButtons {
    queue: Vec<ButtonEvent>,
}

impl MockButtons {
    pub fn push(&mut self, button: Button, at: Timestamp) {
        self.queue.push(ButtonEvent::new(button, at));
    }
}

impl ButtonSource for MockButtons {
    fn drain_events(&mut self) -> Vec<ButtonEvent> {
        std::mem::take(&mut self.queue)
    }
}

// ── MockStore ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockStore {
    pub saved: RefCell<Vec<Checkpoint>>,
    pub failing: Cell<bool>,
}

#[allow(dead_code)]
impl MockStore {
    pub fn last(&self) -> Option<Checkpoint> {
        self.saved.borrow().last().cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saved.borrow().len()
    }
}

impl CheckpointPort for MockStore {
    fn load_checkpoint(&self) -> Result<Checkpoint, ConfigError> {
        Ok(self.last().unwrap_or_default())
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), ConfigError> {
        if self.failing.get() {
            return Err(ConfigError::Io);
        }
        self.saved.borrow_mut().push(checkpoint.clone());
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<StatusEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn fatals(&self) -> usize {
        self.events.iter().filter(|e| e.is_fatal()).count()
    }

    pub fn mode_changes(&self) -> Vec<(Mode, Mode)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StatusEvent::ModeChanged { from, status } => Some((*from, status.mode)),
                _ => None,
            })
            .collect()
    }

    pub fn telemetry_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, StatusEvent::Telemetry(_)))
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl StatusSink for RecordingSink {
    fn emit(&mut self, event: &StatusEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// A started service wired to mocks.
pub struct Rig {
    pub app: AppService,
    pub clock: ManualClock,
    pub hw: MockHardware,
    pub buttons: MockButtons,
    pub store: MockStore,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(config: ControllerConfig, readings: SensorSnapshot) -> Self {
        Self::restored(config, readings, &Checkpoint::default())
    }

    pub fn restored(config: ControllerConfig, readings: SensorSnapshot, cp: &Checkpoint) -> Self {
        let mut rig = Self {
            app: AppService::new(config, cp),
            clock: ManualClock::new(),
            hw: MockHardware::new(readings),
            buttons: MockButtons::default(),
            store: MockStore::default(),
            sink: RecordingSink::default(),
        };
        rig.app.start(&rig.clock, &mut rig.hw, &mut rig.sink);
        rig
    }

    /// Advance the clock by one poll interval and tick.
    pub fn tick(&mut self) -> Option<ModeChange> {
        let poll = self.app.config().poll_interval();
        self.tick_after(poll)
    }

    pub fn tick_after(&mut self, dt: Duration) -> Option<ModeChange> {
        self.clock.advance(dt);
        self.app.tick(
            &self.clock,
            &mut self.hw,
            &mut self.buttons,
            &self.store,
            &mut self.sink,
        )
    }

    /// Tick at the poll interval until at least `span` has passed.  Returns
    /// every transition taken.
    pub fn run_for(&mut self, span: Duration) -> Vec<ModeChange> {
        let end = self.clock.now() + span;
        let mut changes = Vec::new();
        while self.clock.now() < end {
            changes.extend(self.tick());
        }
        changes
    }

    /// Queue a press stamped now; it acts on the next tick.
    pub fn press(&mut self, button: Button) {
        let now = self.clock.now();
        self.buttons.push(button, now);
    }

    pub fn mode(&self) -> Mode {
        self.app.mode()
    }

    pub fn shutdown(&mut self) {
        self.app
            .shutdown(&self.clock, &mut self.hw, &self.store, &mut self.sink);
    }
}

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}
