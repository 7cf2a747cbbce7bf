//! Fault handling: sensor grace period, relay retry and escalation,
//! checkpoint save failures, shutdown and latch recovery.

use crate::mock_hw::{Rig, all_missing, night, secs, sunny};

use pipool::app::events::StatusEvent;
use pipool::app::ports::{Checkpoint, RelayState};
use pipool::config::ControllerConfig;
use pipool::error::SafetyFault;
use pipool::fsm::Mode;
use pipool::fsm::context::Reason;
use pipool::fsm::overrides::Button;

fn short_grace() -> ControllerConfig {
    ControllerConfig {
        sensor_fault_grace_s: 60,
        ..Default::default()
    }
}

fn last_fatal(r: &Rig) -> Option<SafetyFault> {
    r.sink.events.iter().rev().find_map(|e| match e {
        StatusEvent::Fatal { fault, .. } => Some(*fault),
        _ => None,
    })
}

// ── Sensor fault ──────────────────────────────────────────────

#[test]
fn sensors_missing_past_grace_stop_the_engine() {
    let mut r = Rig::new(short_grace(), all_missing());
    // First gap seen at t = 5; still inside the grace at t = 60.
    r.run_for(secs(60));
    assert_eq!(r.mode(), Mode::Idle);
    assert_eq!(r.sink.fatals(), 0);

    let change = r.tick().unwrap();
    assert_eq!(change.to, Mode::Stopped);
    assert_eq!(change.reason, Reason::SensorFault);
    assert_eq!(last_fatal(&r), Some(SafetyFault::SensorsUnavailable));
    assert!(r.sink.events.last().unwrap().is_fatal());
    assert_ne!(r.app.fault_flags(), 0);
}

#[test]
fn fault_stays_latched_until_start() {
    let mut r = Rig::new(short_grace(), all_missing());
    r.run_for(secs(65));
    assert_eq!(r.mode(), Mode::Stopped);

    r.hw.readings = sunny();
    assert!(r.run_for(secs(120)).is_empty());
    assert_eq!(r.sink.fatals(), 1, "a latched fault is announced once");
    assert_ne!(r.app.fault_flags(), 0);

    r.press(Button::Start);
    assert_eq!(r.tick().unwrap().to, Mode::Idle);
    assert_eq!(r.app.fault_flags(), 0);
    assert_eq!(r.tick().unwrap().to, Mode::AutoRun);
}

#[test]
fn start_while_sensors_still_missing_restarts_the_grace() {
    let mut r = Rig::new(short_grace(), all_missing());
    r.run_for(secs(65));
    r.press(Button::Start);
    r.tick();
    assert_eq!(r.mode(), Mode::Idle);

    // A full grace period must pass again before the next fault.
    r.run_for(secs(55));
    assert_eq!(r.mode(), Mode::Idle);
    r.run_for(secs(10));
    assert_eq!(r.mode(), Mode::Stopped);
    assert_eq!(r.sink.fatals(), 2);
}

#[test]
fn fault_while_already_stopped_is_still_reported() {
    let mut r = Rig::new(short_grace(), night());
    r.press(Button::Stop);
    r.tick();
    assert_eq!(r.mode(), Mode::Stopped);

    r.hw.readings = all_missing();
    let changes = r.run_for(secs(70));
    assert!(changes.is_empty());
    assert_eq!(last_fatal(&r), Some(SafetyFault::SensorsUnavailable));
}

#[test]
fn button_transition_wins_and_fault_escalates_next_tick() {
    let mut r = Rig::new(short_grace(), all_missing());
    r.run_for(secs(60));
    r.press(Button::Start);

    // Fault condition is reached this tick, but the press acts first.
    let change = r.tick().unwrap();
    assert_eq!(change.to, Mode::WaterReplacement);
    assert!(matches!(r.sink.events.last(), Some(StatusEvent::ModeChanged { .. })));

    let change = r.tick().unwrap();
    assert_eq!(change.to, Mode::Stopped);
    assert_eq!(change.reason, Reason::SensorFault);
    assert!(!r.hw.pump_on());
}

#[test]
fn stop_after_a_fault_latches_across_a_restart() {
    let mut r = Rig::new(short_grace(), all_missing());
    r.run_for(secs(65));
    assert_eq!(r.mode(), Mode::Stopped);
    assert!(!r.store.last().unwrap().manual_stop_latched);

    // Already stopped: no transition, but the latch must reach the store.
    r.press(Button::Stop);
    assert!(r.tick().is_none());
    assert!(r.app.state().manual_stop_latched);
    let cp = r.store.last().unwrap();
    assert!(cp.manual_stop_latched);
    assert_eq!(cp.mode, Mode::Stopped);

    // Power cut, sensors back, sun out: the restart stays stopped.
    let mut restarted = Rig::restored(short_grace(), sunny(), &cp);
    assert!(restarted.tick().is_none());
    assert_eq!(restarted.mode(), Mode::Stopped);
    assert!(!restarted.hw.pump_on());
}

#[test]
fn second_fault_is_announced_on_a_later_tick() {
    let mut r = Rig::new(short_grace(), all_missing());
    // Gap first seen at t = 5; sensor fault due at t = 65.
    r.run_for(secs(50));
    r.press(Button::Start);
    r.hw.fail_next = 2;
    assert_eq!(r.tick().unwrap().to, Mode::WaterReplacement); // t = 55, ON fails
    assert!(r.tick().is_none()); // t = 60, retry fails, relay fault raised
    assert_eq!(r.sink.fatals(), 0);

    // t = 65: both faults are fresh; the sensor fault goes first.
    let change = r.tick().unwrap();
    assert_eq!(change.to, Mode::Stopped);
    assert_eq!(change.reason, Reason::SensorFault);
    assert_eq!(last_fatal(&r), Some(SafetyFault::SensorsUnavailable));

    // t = 70: the relay fault follows without another transition.
    assert!(r.tick().is_none());
    assert_eq!(last_fatal(&r), Some(SafetyFault::ActuatorWriteFailed));
    assert_eq!(r.sink.fatals(), 2);

    r.run_for(secs(30));
    assert_eq!(r.sink.fatals(), 2);
}

// ── Relay fault ───────────────────────────────────────────────

#[test]
fn single_relay_failure_is_retried_next_tick() {
    let mut r = Rig::new(ControllerConfig::default(), sunny());
    r.hw.fail_next = 1;
    r.tick();
    assert_eq!(r.mode(), Mode::AutoRun);
    assert!(!r.hw.pump_on());
    assert!(!r.app.relay_confirmed());

    r.tick();
    assert!(r.hw.pump_on());
    assert!(r.app.relay_confirmed());
    assert_eq!(r.hw.attempts, vec![false, true, true]);
    assert_eq!(r.sink.fatals(), 0);
}

#[test]
fn repeated_relay_failure_escalates_to_stopped() {
    let mut r = Rig::new(ControllerConfig::default(), sunny());
    r.hw.fail_next = 2;
    r.tick(); // write ON fails
    r.tick(); // retry fails, fault raised
    assert_eq!(r.mode(), Mode::AutoRun);
    assert_eq!(r.sink.fatals(), 0);

    let change = r.tick().unwrap();
    assert_eq!(change.to, Mode::Stopped);
    assert_eq!(change.reason, Reason::ActuatorFault);
    assert_eq!(last_fatal(&r), Some(SafetyFault::ActuatorWriteFailed));
    assert_eq!(r.hw.attempts, vec![false, true, true, false]);
    assert_eq!(r.hw.level, Some(false));
}

#[test]
fn dead_relay_keeps_retrying_off_and_never_on() {
    let mut r = Rig::new(ControllerConfig::default(), sunny());
    r.hw.broken = true;
    r.run_for(secs(60));
    assert_eq!(r.mode(), Mode::Stopped);
    assert_eq!(r.sink.fatals(), 1);

    let stop_index = r.hw.attempts.iter().rposition(|on| *on).unwrap();
    assert!(r.hw.attempts[stop_index + 1..].iter().all(|on| !on));
    assert!(r.hw.attempts.len() > stop_index + 5, "OFF is retried every tick");

    r.hw.broken = false;
    let writes = r.hw.attempts.len();
    r.run_for(secs(30));
    assert_eq!(r.hw.attempts.len(), writes + 1);
    assert_eq!(r.hw.level, Some(false));
    assert_eq!(r.mode(), Mode::Stopped);
}

// ── Checkpoints ───────────────────────────────────────────────

#[test]
fn failed_checkpoint_save_is_retried() {
    let mut r = Rig::new(ControllerConfig::default(), sunny());
    r.store.failing.set(true);
    r.tick();
    assert_eq!(r.mode(), Mode::AutoRun);
    assert_eq!(r.store.save_count(), 0);

    r.store.failing.set(false);
    r.tick();
    let cp = r.store.last().unwrap();
    assert_eq!(cp.mode, Mode::AutoRun);
    assert_eq!(cp.relay_state, RelayState::On);

    // Nothing changed since: no further writes.
    let saves = r.store.save_count();
    r.run_for(secs(30));
    assert_eq!(r.store.save_count(), saves);
}

#[test]
fn latched_checkpoint_restarts_stopped() {
    let cp = Checkpoint {
        mode: Mode::Stopped,
        manual_stop_latched: true,
        ..Default::default()
    };
    let mut r = Rig::restored(ControllerConfig::default(), sunny(), &cp);
    assert_eq!(r.mode(), Mode::Stopped);
    match r.sink.events.first() {
        Some(StatusEvent::Started(s)) => {
            assert_eq!(s.reason, Reason::RestoredLatch);
            assert!(s.manual_stop_latched);
        }
        other => panic!("expected Started, got {other:?}"),
    }

    assert!(r.run_for(secs(60)).is_empty());
    assert!(!r.hw.pump_on());

    r.press(Button::Start);
    assert_eq!(r.tick().unwrap().to, Mode::Idle);
    assert!(!r.store.last().unwrap().manual_stop_latched);
}

#[test]
fn relay_on_in_checkpoint_still_starts_off() {
    let cp = Checkpoint {
        relay_state: RelayState::On,
        mode: Mode::AutoRun,
        ..Default::default()
    };
    let r = Rig::restored(ControllerConfig::default(), night(), &cp);
    assert_eq!(r.mode(), Mode::Idle);
    assert_eq!(r.hw.attempts, vec![false]);
}

// ── Shutdown ──────────────────────────────────────────────────

#[test]
fn shutdown_turns_the_pump_off_and_persists() {
    let mut r = Rig::new(ControllerConfig::default(), sunny());
    r.tick();
    assert!(r.hw.pump_on());

    r.shutdown();
    assert_eq!(r.mode(), Mode::Stopped);
    assert_eq!(r.hw.level, Some(false));

    let cp = r.store.last().unwrap();
    assert_eq!(cp.mode, Mode::Stopped);
    assert_eq!(cp.relay_state, RelayState::Off);
    assert_eq!(cp.last_action_reason, "shutdown");
    assert!(!cp.manual_stop_latched, "a clean shutdown does not latch");

    match r.sink.events.last() {
        Some(StatusEvent::ShutDown(s)) => assert!(!s.pump_on),
        other => panic!("expected ShutDown, got {other:?}"),
    }
}

#[test]
fn shutdown_retries_a_failed_off_write_once() {
    let mut r = Rig::new(ControllerConfig::default(), sunny());
    r.tick();
    r.hw.fail_next = 1;
    r.shutdown();
    assert_eq!(r.hw.attempts, vec![false, true, false, false]);
    assert_eq!(r.hw.level, Some(false));
}

#[test]
fn shutdown_keeps_an_operator_latch() {
    let mut r = Rig::new(ControllerConfig::default(), night());
    r.press(Button::Stop);
    r.tick();
    r.shutdown();
    assert!(r.store.last().unwrap().manual_stop_latched);
}
