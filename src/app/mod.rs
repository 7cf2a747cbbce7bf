//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the orchestration around the pump decision engine:
//! tick sequencing, relay retry, safety escalation, checkpointing and
//! status emission.  All interaction with hardware happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable without
//! real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
