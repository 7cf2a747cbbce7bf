//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (config file
//! watcher, signals) that the [`AppService`](super::service::AppService)
//! interprets between ticks.

use crate::config::ControllerConfig;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Hot-reload configuration.  Rejected configs leave the running one
    /// in place.
    UpdateConfig(ControllerConfig),

    /// Emit a telemetry event on the next quiet tick.
    RequestTelemetry,
}
