//! Log-based status sink.
//!
//! Implements [`StatusSink`] by writing one structured line per event
//! through the `log` facade (routed to `tracing-subscriber` by the binary).
//! The telemetry exporter implements the same trait for machine-readable
//! output.

use log::{error, info};

use crate::app::events::StatusEvent;
use crate::app::ports::StatusSink;

/// Adapter that logs every [`StatusEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

fn fmt_reading(value: Option<f32>, unit: &str) -> String {
    match value {
        Some(v) => format!("{v:.1}{unit}"),
        None => "--".into(),
    }
}

impl StatusSink for LogEventSink {
    fn emit(&mut self, event: &StatusEvent) {
        match event {
            StatusEvent::Telemetry(t) => {
                info!(
                    "TELEM | mode={:?} | pump={} | inlet={} collector={} ambient={} | \
                     light={} | reason={} | faults=0b{:08b}",
                    t.status.mode,
                    if t.status.pump_on { "ON" } else { "OFF" },
                    fmt_reading(t.averages.inlet_temp, "\u{00b0}C"),
                    fmt_reading(t.averages.collector_temp, "\u{00b0}C"),
                    fmt_reading(t.averages.ambient_temp, "\u{00b0}C"),
                    fmt_reading(t.averages.light_level, "lx"),
                    t.status.reason,
                    t.fault_flags,
                );
            }
            StatusEvent::ModeChanged { from, status } => {
                info!(
                    "MODE  | {:?} -> {:?} ({}) pump={}",
                    from,
                    status.mode,
                    status.reason,
                    if status.pump_on { "ON" } else { "OFF" },
                );
            }
            StatusEvent::Fatal { fault, status } => {
                error!(
                    "FATAL | {} | mode={:?} pump={} | press Start to resume",
                    fault,
                    status.mode,
                    if status.pump_on { "ON" } else { "OFF" },
                );
            }
            StatusEvent::Started(status) => {
                info!(
                    "START | mode={:?} ({}) latched={}",
                    status.mode, status.reason, status.manual_stop_latched
                );
            }
            StatusEvent::ShutDown(status) => {
                info!("STOP  | mode={:?} ({})", status.mode, status.reason);
            }
        }
    }
}
