//! Telemetry exporter.
//!
//! A [`StatusSink`] that turns status events into JSON lines and appends
//! them to a file on a background writer thread.  The tick loop only does
//! a `try_send` on a bounded channel; when the writer falls behind, records
//! are dropped and counted, never queued without bound.
//!
//! ```text
//! {"ts":"2024-06-01T12:00:00Z","event":"telemetry","temperature_E":24.1,
//!  "temperature_S":27.9,"temperature_A":21.0,"light":32000.0,
//!  "mode":"AutoRun","pump":"ON","reason":"solar gain","faults":0}
//! ```
//!
//! The `temperature_E` / `temperature_S` / `temperature_A` keys (inlet,
//! collector, ambient) are the names downstream dashboards already chart.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use serde::Serialize;

use crate::app::events::StatusEvent;
use crate::app::ports::{RelayState, StatusSink};
use crate::fsm::Mode;

/// Records buffered between the tick loop and the writer thread.
const EXPORT_CAPACITY: usize = 32;

/// One exported line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub ts: DateTime<Utc>,
    pub event: &'static str,
    #[serde(rename = "temperature_E", skip_serializing_if = "Option::is_none")]
    pub inlet_temp: Option<f32>,
    #[serde(rename = "temperature_S", skip_serializing_if = "Option::is_none")]
    pub collector_temp: Option<f32>,
    #[serde(rename = "temperature_A", skip_serializing_if = "Option::is_none")]
    pub ambient_temp: Option<f32>,
    #[serde(rename = "light", skip_serializing_if = "Option::is_none")]
    pub light_level: Option<f32>,
    pub mode: Mode,
    pub pump: RelayState,
    pub reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    pub faults: u8,
}

impl TelemetryRecord {
    /// Telemetry events carry the rolling averages; every other event is
    /// exported without readings and stamped `now`.
    pub fn from_event(event: &StatusEvent, now: DateTime<Utc>) -> Self {
        let status = event.status();
        let mut record = Self {
            ts: now,
            event: "",
            inlet_temp: None,
            collector_temp: None,
            ambient_temp: None,
            light_level: None,
            mode: status.mode,
            pump: status.pump_on.into(),
            reason: status.reason.as_str(),
            fault: None,
            faults: 0,
        };
        match event {
            StatusEvent::Telemetry(t) => {
                record.event = "telemetry";
                record.ts = t.wall_time;
                record.inlet_temp = t.averages.inlet_temp;
                record.collector_temp = t.averages.collector_temp;
                record.ambient_temp = t.averages.ambient_temp;
                record.light_level = t.averages.light_level;
                record.faults = t.fault_flags;
            }
            StatusEvent::ModeChanged { .. } => record.event = "mode_changed",
            StatusEvent::Fatal { fault, .. } => {
                record.event = "fatal";
                record.fault = Some(fault.to_string());
                record.faults = fault.mask();
            }
            StatusEvent::Started(_) => record.event = "started",
            StatusEvent::ShutDown(_) => record.event = "shut_down",
        }
        record
    }
}

/// Sending half, owned by the tick loop.
pub struct TelemetryExporter {
    tx: Sender<TelemetryRecord>,
    dropped: u64,
}

impl TelemetryExporter {
    /// An exporter and the receiving end of its channel, without a writer.
    pub fn with_channel(capacity: usize) -> (Self, Receiver<TelemetryRecord>) {
        let (tx, rx) = channel::bounded(capacity);
        (Self { tx, dropped: 0 }, rx)
    }

    /// Append records to `path` from a background thread.
    pub fn spawn(path: &Path) -> io::Result<(Self, TelemetryWriter)> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Exporting telemetry to {}", path.display());
        Self::spawn_with(BufWriter::new(file))
    }

    /// Write records to any sink from a background thread.
    pub fn spawn_with<W>(out: W) -> io::Result<(Self, TelemetryWriter)>
    where
        W: Write + Send + 'static,
    {
        let (exporter, rx) = Self::with_channel(EXPORT_CAPACITY);
        let handle = thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || write_records(&rx, out))?;
        Ok((exporter, TelemetryWriter { handle }))
    }

    /// Records dropped because the writer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl StatusSink for TelemetryExporter {
    fn emit(&mut self, event: &StatusEvent) {
        let record = TelemetryRecord::from_event(event, Utc::now());
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!("Telemetry queue full, {} records dropped so far", self.dropped);
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                debug!("Telemetry writer gone, record dropped");
            }
        }
    }
}

/// Handle to the writer thread.  It exits once every exporter is dropped.
pub struct TelemetryWriter {
    handle: JoinHandle<()>,
}

impl TelemetryWriter {
    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("Telemetry writer thread panicked");
        }
    }
}

fn write_records<W: Write>(rx: &Receiver<TelemetryRecord>, mut out: W) {
    for record in rx {
        let written = serde_json::to_writer(&mut out, &record)
            .map_err(io::Error::from)
            .and_then(|()| out.write_all(b"\n"))
            .and_then(|()| out.flush());
        if let Err(e) = written {
            warn!("Telemetry write failed: {e}");
        }
    }
    debug!("Telemetry writer stopped");
}
