//! GPIO access, the pump relay and the front-panel buttons.

pub mod button;
pub mod gpio;
pub mod relay;
