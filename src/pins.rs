//! Default BCM pin assignments for the pool controller board.
//!
//! These seed [`HardwareConfig`](crate::config::HardwareConfig); a site can
//! override any of them in the config file.

// ---------------------------------------------------------------------------
// Pump relay
// ---------------------------------------------------------------------------

/// Digital output driving the pump relay coil (active HIGH by default).
pub const PUMP_RELAY_GPIO: u32 = 17;

// ---------------------------------------------------------------------------
// Front-panel buttons (active LOW, external pull-ups)
// ---------------------------------------------------------------------------

/// B1: Start / toggle.
pub const START_BUTTON_GPIO: u32 = 5;
/// B2: Force-run.
pub const FORCE_RUN_BUTTON_GPIO: u32 = 6;
/// B3: Emergency stop.
pub const STOP_BUTTON_GPIO: u32 = 13;
