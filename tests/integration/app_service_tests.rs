//! Integration tests for the AppService → FSM → relay pipeline.
//!
//! Each test drives a started service with mock ports and a manual clock
//! and asserts on relay writes, mode changes and emitted status events.

use crate::mock_hw::{Rig, night, readings, secs, sunny};

use pipool::app::commands::AppCommand;
use pipool::app::events::StatusEvent;
use pipool::app::ports::RelayState;
use pipool::config::ControllerConfig;
use pipool::fsm::Mode;
use pipool::fsm::context::Reason;
use pipool::fsm::overrides::Button;

fn rig(readings: pipool::fsm::context::SensorSnapshot) -> Rig {
    Rig::new(ControllerConfig::default(), readings)
}

// ── Startup ───────────────────────────────────────────────────

#[test]
fn start_forces_relay_off_and_announces_idle() {
    let r = rig(night());
    assert_eq!(r.mode(), Mode::Idle);
    assert_eq!(r.hw.attempts, vec![false]);
    match &r.sink.events[..] {
        [StatusEvent::Started(s)] => {
            assert_eq!(s.mode, Mode::Idle);
            assert_eq!(s.reason, Reason::Startup);
            assert!(!s.pump_on);
        }
        other => panic!("expected a single Started event, got {other:?}"),
    }
}

#[test]
fn relay_is_only_written_when_the_level_changes() {
    let mut r = rig(night());
    r.run_for(secs(60));
    assert_eq!(r.hw.attempts, vec![false], "quiet idle must not rewrite the relay");
    assert!(r.app.relay_confirmed());
}

// ── Solar gain ────────────────────────────────────────────────

#[test]
fn sunny_and_warm_collector_starts_auto_run() {
    let mut r = rig(sunny());
    let change = r.tick().expect("transition");
    assert_eq!((change.from, change.to), (Mode::Idle, Mode::AutoRun));
    assert_eq!(change.reason, Reason::SolarGain);
    assert!(r.hw.pump_on());

    let cp = r.store.last().unwrap();
    assert_eq!(cp.mode, Mode::AutoRun);
    assert_eq!(cp.relay_state, RelayState::On);
    assert_eq!(cp.last_action_reason, "solar gain");
    assert!(cp.last_pump_start_time.is_some());
}

#[test]
fn bright_but_no_gain_stays_idle() {
    let mut r = rig(readings(24.0, 24.2, 40_000.0));
    assert!(r.run_for(secs(120)).is_empty());
    assert!(!r.hw.pump_on());
}

#[test]
fn auto_run_stops_when_light_drops() {
    let mut r = rig(sunny());
    r.tick();
    r.hw.readings = readings(24.0, 28.0, 2_000.0);
    let change = r.tick().unwrap();
    assert_eq!(change.to, Mode::Idle);
    assert_eq!(change.reason, Reason::LightBelowThreshold);
    assert!(!r.hw.pump_on());
}

#[test]
fn auto_run_stops_when_delta_collapses() {
    let mut r = rig(sunny());
    r.tick();
    r.hw.readings = readings(26.0, 26.1, 40_000.0);
    let change = r.tick().unwrap();
    assert_eq!(change.reason, Reason::DeltaBelowThreshold);
    assert_eq!(r.mode(), Mode::Idle);
}

#[test]
fn hysteresis_keeps_auto_run_inside_the_band() {
    let cfg = ControllerConfig {
        temp_delta_threshold_c: 1.0,
        temp_delta_hysteresis_c: 0.4,
        ..Default::default()
    };
    let mut r = Rig::new(cfg, readings(24.0, 25.5, 40_000.0));
    r.tick();
    assert_eq!(r.mode(), Mode::AutoRun);

    r.hw.readings = readings(24.0, 24.7, 40_000.0);
    assert!(r.tick().is_none(), "0.7 is inside the 0.6 floor");

    r.hw.readings = readings(24.0, 24.5, 40_000.0);
    assert_eq!(r.tick().unwrap().reason, Reason::DeltaBelowThreshold);
}

#[test]
fn missing_reading_in_auto_run_is_fail_safe_off() {
    let mut r = rig(sunny());
    r.tick();
    r.hw.readings.collector_temp = None;
    let change = r.tick().unwrap();
    assert_eq!(change.reason, Reason::ReadingUnavailable);
    assert!(!r.hw.pump_on());
    assert_eq!(r.sink.fatals(), 0, "a short gap is not a fault");

    r.hw.readings = sunny();
    assert_eq!(r.tick().unwrap().to, Mode::AutoRun);
}

// ── Analysis window ───────────────────────────────────────────

#[test]
fn analysis_runs_after_the_idle_interval_and_can_confirm_gain() {
    let mut r = rig(night());
    r.run_for(secs(595));
    assert_eq!(r.mode(), Mode::Idle);

    let change = r.tick().unwrap();
    assert_eq!(change.to, Mode::AnalysisWindow);
    assert_eq!(change.reason, Reason::AnalysisDue);
    assert!(r.hw.pump_on());

    // Fresh water reaches the sensor and shows a gain.
    r.hw.readings = readings(24.0, 25.0, 3_000.0);
    let changes = r.run_for(secs(300));
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].to, Mode::AutoRun);
    assert_eq!(changes[0].reason, Reason::AnalysisConfirmed);
}

#[test]
fn analysis_without_gain_returns_to_idle() {
    let mut r = rig(night());
    r.run_for(secs(600));
    assert_eq!(r.mode(), Mode::AnalysisWindow);

    let changes = r.run_for(secs(300));
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].reason, Reason::AnalysisRejected);
    assert_eq!(r.mode(), Mode::Idle);
    assert!(!r.hw.pump_on());
}

// ── Buttons ───────────────────────────────────────────────────

#[test]
fn start_in_idle_runs_a_water_replacement_cycle() {
    let mut r = rig(night());
    r.press(Button::Start);
    let change = r.tick().unwrap();
    assert_eq!(change.to, Mode::WaterReplacement);
    assert!(r.hw.pump_on());

    let changes = r.run_for(secs(300));
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].to, Mode::Idle);
    assert_eq!(changes[0].reason, Reason::RunComplete);
    assert!(!r.hw.pump_on());
}

#[test]
fn force_run_in_the_dark_runs_manually() {
    let mut r = rig(night());
    r.press(Button::ForceRun);
    assert_eq!(r.tick().unwrap().to, Mode::ManualRun);
    assert!(r.hw.pump_on());

    r.run_for(secs(300));
    assert_eq!(r.mode(), Mode::Idle);
}

#[test]
fn force_run_in_bright_light_is_ignored_but_rules_still_run() {
    let mut r = rig(readings(24.0, 24.0, 40_000.0));
    r.press(Button::ForceRun);
    assert!(r.tick().is_none());
    assert_eq!(r.mode(), Mode::Idle);

    // Same tick: an ignored button does not suppress solar gain.
    r.hw.readings = sunny();
    r.press(Button::ForceRun);
    assert_eq!(r.tick().unwrap().to, Mode::AutoRun);
}

#[test]
fn force_run_during_auto_run_is_a_no_op() {
    let mut r = rig(sunny());
    r.tick();
    r.sink.clear();
    r.press(Button::ForceRun);
    assert!(r.tick().is_none());
    assert_eq!(r.mode(), Mode::AutoRun);
    assert!(r.sink.mode_changes().is_empty());
}

#[test]
fn start_toggles_a_running_pump_off() {
    let mut r = rig(sunny());
    r.tick();
    r.press(Button::Start);
    let change = r.tick().unwrap();
    assert_eq!((change.from, change.to), (Mode::AutoRun, Mode::Idle));
    assert_eq!(change.reason, Reason::StartButton);
    assert!(!r.hw.pump_on());
}

#[test]
fn emergency_stop_latches_until_start() {
    let mut r = rig(sunny());
    r.tick();
    r.press(Button::Stop);
    let change = r.tick().unwrap();
    assert_eq!(change.to, Mode::Stopped);
    assert_eq!(change.reason, Reason::EmergencyStop);
    assert!(!r.hw.pump_on());
    assert!(r.store.last().unwrap().manual_stop_latched);

    // Sun keeps shining; nothing but Start releases the stop.
    assert!(r.run_for(secs(900)).is_empty());
    r.press(Button::ForceRun);
    assert!(r.tick().is_none());

    r.press(Button::Start);
    assert_eq!(r.tick().unwrap().to, Mode::Idle);
    assert!(!r.app.state().manual_stop_latched);
    assert_eq!(r.tick().unwrap().to, Mode::AutoRun);
}

#[test]
fn stop_beats_start_in_the_same_tick() {
    let mut r = rig(night());
    r.press(Button::Start);
    r.press(Button::Stop);
    r.press(Button::ForceRun);
    assert_eq!(r.tick().unwrap().to, Mode::Stopped);
}

#[test]
fn button_transition_suppresses_sensor_rules_for_that_tick() {
    let mut r = rig(sunny());
    r.press(Button::Start);
    // Start in Idle wins over solar gain.
    assert_eq!(r.tick().unwrap().to, Mode::WaterReplacement);
}

// ── Status events ─────────────────────────────────────────────

#[test]
fn at_most_one_event_per_tick_with_mode_change_first() {
    let mut r = rig(sunny());
    r.sink.clear();
    r.tick();
    assert_eq!(r.sink.events.len(), 1);
    assert!(matches!(r.sink.events[0], StatusEvent::ModeChanged { from: Mode::Idle, .. }));

    for _ in 0..10 {
        let before = r.sink.events.len();
        r.tick();
        assert!(r.sink.events.len() - before <= 1);
    }
}

#[test]
fn telemetry_follows_the_configured_interval() {
    let mut r = rig(night());
    r.sink.clear();
    r.run_for(secs(20));
    // Ticks at 5, 10, 15, 20 with a 10 s interval: 5 and 15.
    assert_eq!(r.sink.telemetry_count(), 2);

    let Some(StatusEvent::Telemetry(t)) = r.sink.events.last() else {
        panic!("expected telemetry");
    };
    assert_eq!(t.averages.inlet_temp, Some(24.0));
    assert_eq!(t.averages.light_level, Some(50.0));
    assert_eq!(t.fault_flags, 0);
}

#[test]
fn requested_telemetry_is_sent_on_the_next_quiet_tick() {
    let mut r = rig(night());
    r.tick();
    r.sink.clear();
    r.app.handle_command(AppCommand::RequestTelemetry).unwrap();
    r.tick();
    assert_eq!(r.sink.telemetry_count(), 1);
}

// ── Configuration ─────────────────────────────────────────────

#[test]
fn hot_reload_applies_to_the_next_window_only() {
    let mut r = rig(night());
    r.run_for(secs(100));
    let cfg = ControllerConfig {
        analysis_interval_s: 1_200,
        ..Default::default()
    };
    r.app.handle_command(AppCommand::UpdateConfig(cfg)).unwrap();

    // The running idle window keeps its 600 s.
    r.run_for(secs(500));
    assert_eq!(r.mode(), Mode::AnalysisWindow);

    // 300 s analysis, rejected at t = 900.
    r.run_for(secs(300));
    assert_eq!(r.mode(), Mode::Idle);

    // The new idle window is 1200 s: still idle at t = 1600 ...
    r.run_for(secs(700));
    assert_eq!(r.mode(), Mode::Idle);
    // ... and analysing at t = 2100.
    r.run_for(secs(500));
    assert_eq!(r.mode(), Mode::AnalysisWindow);
}

#[test]
fn rejected_reload_keeps_running_config() {
    let mut r = rig(night());
    let bad = ControllerConfig {
        light_threshold_lux: -5.0,
        ..Default::default()
    };
    assert!(r.app.handle_command(AppCommand::UpdateConfig(bad)).is_err());
    assert_eq!(r.app.config(), &ControllerConfig::default());
    r.tick();
    assert_eq!(r.mode(), Mode::Idle);
}
