//! Button events and the per-tick precedence resolver.
//!
//! The button source debounces presses and queues them; the tick loop
//! drains the queue once per tick and hands the batch to [`resolve`], which
//! picks the single press that gets to act:
//!
//! ```text
//!   Stop  >  Start  >  ForceRun  >  (sensor-derived evaluation)
//! ```
//!
//! Lower-priority presses in the same batch are dropped with a log line so
//! an operator can see why a press had no effect.

use log::debug;
use serde::{Deserialize, Serialize};

use super::timer::Timestamp;

/// The three front-panel buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    /// B1: start a cycle, toggle the pump off, or release an emergency stop.
    Start,
    /// B2: run the pump for one water-replacement window while it is dark.
    ForceRun,
    /// B3: emergency stop.  Latches until Start.
    Stop,
}

impl Button {
    /// Higher wins.
    pub const fn priority(self) -> u8 {
        match self {
            Self::Stop => 3,
            Self::Start => 2,
            Self::ForceRun => 1,
        }
    }
}

/// One debounced, edge-triggered press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub at: Timestamp,
}

impl ButtonEvent {
    pub const fn new(button: Button, at: Timestamp) -> Self {
        Self { button, at }
    }
}

/// Pick the highest-priority press from one tick's batch.
///
/// Ties between repeated presses of the same button resolve to the first
/// one in insertion order.
pub fn resolve(events: &[ButtonEvent]) -> Option<ButtonEvent> {
    let mut winner: Option<ButtonEvent> = None;
    for ev in events {
        match winner {
            Some(w) if ev.button.priority() <= w.button.priority() => {
                debug!("Button {:?} superseded by {:?} this tick", ev.button, w.button);
            }
            Some(w) => {
                debug!("Button {:?} superseded by {:?} this tick", w.button, ev.button);
                winner = Some(*ev);
            }
            None => winner = Some(*ev),
        }
    }
    winner
}
