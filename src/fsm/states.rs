//! Concrete state handler functions and table builder.
//!
//! Each mode is one row of plain `fn` pointers plus two static columns: the
//! relay level the mode commands and the window it times.
//!
//! ```text
//!  IDLE ──[light ≥ T and Δ ≥ T]──▶ AUTO_RUN ──[light < T | Δ low | missing]──▶ IDLE
//!  IDLE ──[analysis interval]────▶ ANALYSIS ──[window, Δ ≥ T]──▶ AUTO_RUN
//!                                           └─[window, Δ < T]──▶ IDLE
//!  IDLE ──[Start]────────────────▶ WATER_REPLACEMENT ──[window]──▶ IDLE
//!  IDLE ──[ForceRun, dark]───────▶ MANUAL_RUN ─────────[window]──▶ IDLE
//!
//!  any mode ──[Stop | fault]──▶ STOPPED ──[Start]──▶ IDLE
//! ```
//!
//! Start in any pump-on mode toggles back to `Idle`.  Emergency-Stop is
//! handled by the engine itself, ahead of this table.

use core::time::Duration;

use log::info;

use super::context::{FsmContext, Reason};
use super::overrides::Button;
use super::{Mode, StateDescriptor, Transition};
use crate::config::ControllerConfig;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; Mode::COUNT] {
    [
        // Index 0: Idle
        StateDescriptor {
            mode: Mode::Idle,
            name: "Idle",
            pump_on: false,
            window: analysis_window,
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
            on_button: idle_button,
        },
        // Index 1: ManualRun
        StateDescriptor {
            mode: Mode::ManualRun,
            name: "ManualRun",
            pump_on: true,
            window: replace_window,
            on_enter: Some(run_enter),
            on_exit: None,
            on_update: timed_run_update,
            on_button: running_button,
        },
        // Index 2: AnalysisWindow
        StateDescriptor {
            mode: Mode::AnalysisWindow,
            name: "AnalysisWindow",
            pump_on: true,
            window: replace_window,
            on_enter: Some(run_enter),
            on_exit: None,
            on_update: analysis_update,
            on_button: running_button,
        },
        // Index 3: WaterReplacement
        StateDescriptor {
            mode: Mode::WaterReplacement,
            name: "WaterReplacement",
            pump_on: true,
            window: replace_window,
            on_enter: Some(run_enter),
            on_exit: None,
            on_update: timed_run_update,
            on_button: running_button,
        },
        // Index 4: AutoRun
        StateDescriptor {
            mode: Mode::AutoRun,
            name: "AutoRun",
            pump_on: true,
            window: no_window,
            on_enter: Some(auto_run_enter),
            on_exit: None,
            on_update: auto_run_update,
            on_button: running_button,
        },
        // Index 5: Stopped
        StateDescriptor {
            mode: Mode::Stopped,
            name: "Stopped",
            pump_on: false,
            window: no_window,
            on_enter: Some(stopped_enter),
            on_exit: Some(stopped_exit),
            on_update: stopped_update,
            on_button: stopped_button,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Windows (captured on entry)
// ═══════════════════════════════════════════════════════════════════════════

fn analysis_window(cfg: &ControllerConfig) -> Option<Duration> {
    Some(cfg.analysis_interval())
}

fn replace_window(cfg: &ControllerConfig) -> Option<Duration> {
    Some(cfg.water_replace_time())
}

fn no_window(_: &ControllerConfig) -> Option<Duration> {
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE: pump off, watching for solar gain
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut FsmContext) {
    info!(
        "IDLE: pump off, next analysis in {}s",
        ctx.config.analysis_interval_s
    );
}

fn idle_update(ctx: &FsmContext) -> Option<Transition> {
    if ctx.light_strong() && ctx.delta_met() {
        return Some(Transition::new(Mode::AutoRun, Reason::SolarGain));
    }

    if ctx.window_expired() {
        return Some(Transition::new(Mode::AnalysisWindow, Reason::AnalysisDue));
    }

    None
}

fn idle_button(ctx: &FsmContext, button: Button) -> Option<Transition> {
    match button {
        Button::Start => Some(Transition::new(Mode::WaterReplacement, Reason::StartButton)),
        Button::ForceRun if ctx.light_weak() => {
            Some(Transition::new(Mode::ManualRun, Reason::ForceRunButton))
        }
        Button::ForceRun => {
            info!(
                "IDLE: force-run ignored, light {:?} lux not below {}",
                ctx.sensors.light_level, ctx.config.light_threshold_lux
            );
            None
        }
        Button::Stop => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Timed runs: MANUAL_RUN, ANALYSIS_WINDOW, WATER_REPLACEMENT
// ═══════════════════════════════════════════════════════════════════════════

fn run_enter(ctx: &mut FsmContext) {
    info!(
        "RUN: pump on for {:?} ({})",
        ctx.timer.window().unwrap_or_default(),
        ctx.last_action_reason
    );
}

fn timed_run_update(ctx: &FsmContext) -> Option<Transition> {
    ctx.window_expired()
        .then_some(Transition::new(Mode::Idle, Reason::RunComplete))
}

/// At the end of the analysis run the collector loop holds fresh water, so
/// the delta is trustworthy again.
fn analysis_update(ctx: &FsmContext) -> Option<Transition> {
    if !ctx.window_expired() {
        return None;
    }

    if ctx.delta_met() {
        info!(
            "ANALYSIS: delta {:?}°C meets {}°C, continuing",
            ctx.sensors.temp_delta(),
            ctx.config.temp_delta_threshold_c
        );
        Some(Transition::new(Mode::AutoRun, Reason::AnalysisConfirmed))
    } else {
        info!(
            "ANALYSIS: delta {:?}°C below {}°C, stopping",
            ctx.sensors.temp_delta(),
            ctx.config.temp_delta_threshold_c
        );
        Some(Transition::new(Mode::Idle, Reason::AnalysisRejected))
    }
}

/// Start toggles the pump off from any running mode.  Force-run has no
/// effect while the pump is already on.
fn running_button(_ctx: &FsmContext, button: Button) -> Option<Transition> {
    match button {
        Button::Start => Some(Transition::new(Mode::Idle, Reason::StartButton)),
        Button::ForceRun => {
            info!("RUN: force-run ignored, pump already running");
            None
        }
        Button::Stop => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  AUTO_RUN: sun is heating the water
// ═══════════════════════════════════════════════════════════════════════════

fn auto_run_enter(ctx: &mut FsmContext) {
    info!(
        "AUTO_RUN: light {:?} lux, delta {:?}°C",
        ctx.sensors.light_level,
        ctx.sensors.temp_delta()
    );
}

fn auto_run_update(ctx: &FsmContext) -> Option<Transition> {
    let (Some(lux), Some(delta)) = (ctx.sensors.light_level, ctx.sensors.temp_delta()) else {
        return Some(Transition::new(Mode::Idle, Reason::ReadingUnavailable));
    };

    if lux < ctx.config.light_threshold_lux {
        return Some(Transition::new(Mode::Idle, Reason::LightBelowThreshold));
    }

    let floor = ctx.config.temp_delta_threshold_c - ctx.config.temp_delta_hysteresis_c;
    if delta < floor {
        return Some(Transition::new(Mode::Idle, Reason::DeltaBelowThreshold));
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  STOPPED: operator stop or unrecoverable fault; pump held off
// ═══════════════════════════════════════════════════════════════════════════

fn stopped_enter(ctx: &mut FsmContext) {
    info!(
        "STOPPED: pump held off ({}), latched={}",
        ctx.last_action_reason, ctx.manual_stop_latched
    );
}

fn stopped_exit(ctx: &mut FsmContext) {
    ctx.manual_stop_latched = false;
    info!("STOPPED: released by operator");
}

fn stopped_update(_ctx: &FsmContext) -> Option<Transition> {
    None
}

fn stopped_button(_ctx: &FsmContext, button: Button) -> Option<Transition> {
    match button {
        Button::Start => Some(Transition::new(Mode::Idle, Reason::StartButton)),
        Button::ForceRun => {
            info!("STOPPED: force-run ignored, press Start to release");
            None
        }
        Button::Stop => None,
    }
}
