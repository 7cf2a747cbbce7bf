//! Function-pointer finite state machine engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                           │
//! │  ┌──────────────────┬──────┬────────┬───────┬──────┬────────┬────────┐│
//! │  │ Mode             │ pump │ window │ enter │ exit │ update │ button ││
//! │  ├──────────────────┼──────┼────────┼───────┼──────┼────────┼────────┤│
//! │  │ Idle             │ off  │ analys │ fn    │  -   │ fn     │ fn     ││
//! │  │ ManualRun        │ ON   │ replace│ fn    │  -   │ fn     │ fn     ││
//! │  │ AnalysisWindow   │ ON   │ replace│ fn    │  -   │ fn     │ fn     ││
//! │  │ WaterReplacement │ ON   │ replace│ fn    │  -   │ fn     │ fn     ││
//! │  │ AutoRun          │ ON   │   -    │ fn    │  -   │ fn     │ fn     ││
//! │  │ Stopped          │ off  │   -    │ fn    │ fn   │ fn     │ fn     ││
//! │  └──────────────────┴──────┴────────┴───────┴──────┴────────┴────────┘│
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine first offers the resolved button press (if any) to
//! the current row's `on_button`.  Emergency-Stop never reaches the table:
//! the engine handles it directly.  Only if no button produced a transition
//! does it call `on_update` for sensor and timer driven rules.  At most one
//! transition happens per step.
//!
//! A transition runs `on_exit` for the old row, then sets the relay level
//! and restarts the [`ModeTimer`](timer::ModeTimer) with the new row's
//! window, then runs `on_enter`.

pub mod context;
pub mod overrides;
pub mod states;
pub mod timer;

use core::time::Duration;

use context::{ControllerState, FsmContext, Reason};
use log::info;
use overrides::Button;
use serde::{Deserialize, Serialize};
use timer::Timestamp;

use crate::config::ControllerConfig;

// ---------------------------------------------------------------------------
// Mode identity
// ---------------------------------------------------------------------------

/// Operating modes.  Exactly one is active at any time.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    Idle = 0,
    ManualRun = 1,
    AnalysisWindow = 2,
    WaterReplacement = 3,
    AutoRun = 4,
    Stopped = 5,
}

impl Mode {
    /// Total number of modes, used to size the table array.
    pub const COUNT: usize = 6;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Idle,
        Self::ManualRun,
        Self::AnalysisWindow,
        Self::WaterReplacement,
        Self::AutoRun,
        Self::Stopped,
    ];

    /// Convert an index back to `Mode`.  Out-of-range indices assert in
    /// debug builds and fall back to `Stopped` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::ManualRun,
            2 => Self::AnalysisWindow,
            3 => Self::WaterReplacement,
            4 => Self::AutoRun,
            5 => Self::Stopped,
            _ => {
                debug_assert!(false, "invalid mode index: {idx}");
                Self::Stopped
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// A handler's request to move to another mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: Mode,
    pub reason: Reason,
}

impl Transition {
    pub const fn new(to: Mode, reason: Reason) -> Self {
        Self { to, reason }
    }
}

/// A transition the engine actually performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub from: Mode,
    pub to: Mode,
    pub reason: Reason,
    pub at: Timestamp,
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// `on_enter` / `on_exit`.  Run exactly once per transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Per-tick sensor and timer rules.  `Some` requests a transition.
pub type StateUpdateFn = fn(&FsmContext) -> Option<Transition>;

/// Button handler for Start and Force-Run.
pub type ButtonFn = fn(&FsmContext, Button) -> Option<Transition>;

/// Window length captured when the mode is entered.
pub type WindowFn = fn(&ControllerConfig) -> Option<Duration>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single mode.
pub struct StateDescriptor {
    pub mode: Mode,
    pub name: &'static str,
    /// Relay level commanded while this mode is active.
    pub pump_on: bool,
    pub window: WindowFn,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
    pub on_button: ButtonFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The decision engine.
///
/// Owns the state table and the index of the current mode.  Everything else
/// lives in the [`FsmContext`] threaded through every call.
pub struct Fsm {
    /// Fixed-size table indexed by `Mode as usize`.
    table: [StateDescriptor; Mode::COUNT],
    current: usize,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; Mode::COUNT], initial: Mode) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Enter the initial mode.  Call once after construction, before the
    /// first `step()`.
    pub fn start(&mut self, ctx: &mut FsmContext, reason: Reason) {
        info!("FSM starting in mode: {}", self.table[self.current].name);
        self.enter(ctx, reason);
    }

    /// Advance the engine by one tick.
    ///
    /// `press` is the winner of this tick's button batch (see
    /// [`overrides::resolve`]).  Returns the transition taken, if any.
    pub fn step(&mut self, ctx: &mut FsmContext, press: Option<Button>) -> Option<ModeChange> {
        if let Some(change) = press.and_then(|b| self.handle_button(ctx, b)) {
            return Some(change);
        }
        self.update(ctx)
    }

    /// Offer one button press to the engine.
    pub fn handle_button(&mut self, ctx: &mut FsmContext, button: Button) -> Option<ModeChange> {
        let t = self.button(button, ctx)?;
        self.apply(t, ctx)
    }

    /// Evaluate the current mode's sensor and timer rules.
    pub fn update(&mut self, ctx: &mut FsmContext) -> Option<ModeChange> {
        let next = (self.table[self.current].on_update)(ctx)?;
        self.apply(next, ctx)
    }

    /// Jump straight to `to` (safety escalation, shutdown).  No-op if the
    /// engine is already there.
    pub fn force_transition(
        &mut self,
        to: Mode,
        reason: Reason,
        ctx: &mut FsmContext,
    ) -> Option<ModeChange> {
        self.apply(Transition::new(to, reason), ctx)
    }

    pub fn current_mode(&self) -> Mode {
        self.table[self.current].mode
    }

    /// Relay level the given mode commands.
    pub fn pump_on_in(&self, mode: Mode) -> bool {
        self.table[mode as usize].pump_on
    }

    /// Value view of the engine for checkpoints and status events.
    pub fn state(&self, ctx: &FsmContext) -> ControllerState {
        ControllerState {
            mode: self.current_mode(),
            pump_on: ctx.pump_on,
            mode_entered_at: ctx.timer.entered_at(),
            last_action_reason: ctx.last_action_reason,
            manual_stop_latched: ctx.manual_stop_latched,
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn button(&self, button: Button, ctx: &mut FsmContext) -> Option<Transition> {
        if button == Button::Stop {
            ctx.manual_stop_latched = true;
            if self.current_mode() == Mode::Stopped {
                info!("FSM: emergency stop while stopped, latch re-asserted");
                return None;
            }
            return Some(Transition::new(Mode::Stopped, Reason::EmergencyStop));
        }
        (self.table[self.current].on_button)(ctx, button)
    }

    fn apply(&mut self, t: Transition, ctx: &mut FsmContext) -> Option<ModeChange> {
        let from = self.current_mode();
        if t.to == from {
            return None;
        }

        info!(
            "FSM transition: {} -> {} ({})",
            self.table[self.current].name,
            self.table[t.to as usize].name,
            t.reason
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = t.to as usize;
        self.enter(ctx, t.reason);

        Some(ModeChange {
            from,
            to: t.to,
            reason: t.reason,
            at: ctx.now,
        })
    }

    fn enter(&mut self, ctx: &mut FsmContext, reason: Reason) {
        let row = &self.table[self.current];
        ctx.pump_on = row.pump_on;
        ctx.last_action_reason = reason;
        ctx.timer.restart(ctx.now, (row.window)(&ctx.config));
        if let Some(enter) = row.on_enter {
            enter(ctx);
        }
    }
}
