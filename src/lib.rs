//! PiPool controller library.
//!
//! Exposes the decision engine, the application service and the Linux
//! adapters so the binary, the integration tests and the fuzz targets all
//! drive the same code.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod pins;
pub mod safety;
pub mod sensors;
