//! Sensor subsystem: individual drivers, the aggregating [`SensorHub`], and
//! the background [`SensorFeed`].
//!
//! The hub reads every probe once and produces a [`SensorSnapshot`] in which
//! any failed reading is `None`.  Because one-wire conversions are slow, the
//! binary runs the hub on its own thread through a `SensorFeed`; the tick
//! loop only ever takes the newest snapshot off a channel.

pub mod average;
pub mod light;
pub mod temperature;

use core::time::Duration;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, TrySendError};
use log::{debug, info, warn};

use crate::app::ports::{Clock, SensorPort};
use crate::config::HardwareConfig;
use crate::error::SensorError;
use crate::fsm::context::SensorSnapshot;
use crate::fsm::timer::Timestamp;
use light::Bh1750;
use temperature::Ds18b20;

/// Snapshots buffered between the feed thread and the tick loop.
const FEED_CAPACITY: usize = 8;

// ---------------------------------------------------------------------------
// SensorHub
// ---------------------------------------------------------------------------

/// Aggregates all sensor drivers and produces a unified snapshot.
pub struct SensorHub {
    inlet: Ds18b20,
    collector: Ds18b20,
    ambient: Ds18b20,
    light: Bh1750,
    /// Last error per channel, so failures are logged once per change.
    last_errors: [Option<SensorError>; 4],
}

impl SensorHub {
    pub fn new(inlet: Ds18b20, collector: Ds18b20, ambient: Ds18b20, light: Bh1750) -> Self {
        Self {
            inlet,
            collector,
            ambient,
            light,
            last_errors: [None; 4],
        }
    }

    pub fn from_config(hw: &HardwareConfig) -> Self {
        let root = Path::new(&hw.sysfs_root);
        Self::new(
            Ds18b20::new(root, &hw.inlet_probe_id),
            Ds18b20::new(root, &hw.collector_probe_id),
            Ds18b20::new(root, &hw.ambient_probe_id),
            Bh1750::new(root, &hw.light_iio_device),
        )
    }

    /// Read every sensor.  A single flaky probe yields a `None` field and
    /// never fails the whole snapshot.
    pub fn read_all(&mut self, now: Timestamp) -> SensorSnapshot {
        let inlet = self.inlet.read();
        let collector = self.collector.read();
        let ambient = self.ambient.read();
        let light = self.light.read();

        SensorSnapshot {
            inlet_temp: self.track(0, "inlet", inlet),
            collector_temp: self.track(1, "collector", collector),
            ambient_temp: self.track(2, "ambient", ambient),
            light_level: self.track(3, "light", light),
            observed_at: now,
        }
    }

    fn track(&mut self, slot: usize, name: &str, result: Result<f32, SensorError>) -> Option<f32> {
        let err = result.err();
        if err != self.last_errors[slot] {
            match err {
                Some(e) => warn!("Sensor {name} unavailable: {e}"),
                None => info!("Sensor {name} recovered"),
            }
            self.last_errors[slot] = err;
        }
        result.ok()
    }
}

impl SensorPort for SensorHub {
    fn read(&mut self, now: Timestamp) -> SensorSnapshot {
        self.read_all(now)
    }
}

// ---------------------------------------------------------------------------
// SensorFeed
// ---------------------------------------------------------------------------

/// Runs a [`SensorPort`] on a background thread and hands snapshots to the
/// tick loop over a bounded channel.
///
/// The tick loop keeps only the newest snapshot.  A snapshot older than
/// `max_age` is reported as all-`None`, so a hung probe degrades to the
/// fail-safe path instead of freezing the last reading.
pub struct SensorFeed {
    rx: Receiver<SensorSnapshot>,
    latest: Option<SensorSnapshot>,
    max_age: Duration,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SensorFeed {
    pub fn spawn<S, C>(
        mut source: S,
        clock: C,
        period: Duration,
        max_age: Duration,
    ) -> std::io::Result<Self>
    where
        S: SensorPort + Send + 'static,
        C: Clock + Send + 'static,
    {
        let (tx, rx) = channel::bounded(FEED_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("sensor-feed".into())
            .spawn(move || {
                info!("Sensor feed running every {period:?}");
                while !stop_flag.load(Ordering::Relaxed) {
                    let snap = source.read(clock.now());
                    match tx.try_send(snap) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => debug!("Sensor feed full, snapshot dropped"),
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                    thread::sleep(period);
                }
                debug!("Sensor feed stopped");
            })?;

        Ok(Self::from_receiver(rx, max_age, stop, Some(handle)))
    }

    /// Build a feed around an existing channel.  Used by tests that push
    /// snapshots by hand.
    pub fn from_receiver(
        rx: Receiver<SensorSnapshot>,
        max_age: Duration,
        stop: Arc<AtomicBool>,
        handle: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            rx,
            latest: None,
            max_age,
            stop,
            handle,
        }
    }

    /// Newest snapshot, or all-`None` if it is missing or stale.
    pub fn latest(&mut self, now: Timestamp) -> SensorSnapshot {
        if let Some(newest) = self.rx.try_iter().last() {
            self.latest = Some(newest);
        }
        match self.latest {
            Some(snap) if now.saturating_since(snap.observed_at) <= self.max_age => snap,
            Some(snap) => {
                debug!(
                    "Sensor snapshot stale ({:?} old)",
                    now.saturating_since(snap.observed_at)
                );
                SensorSnapshot::unavailable(now)
            }
            None => SensorSnapshot::unavailable(now),
        }
    }

    /// Ask the feed thread to exit and wait for it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Sensor feed thread panicked");
            }
        }
    }
}

impl SensorPort for SensorFeed {
    fn read(&mut self, now: Timestamp) -> SensorSnapshot {
        self.latest(now)
    }
}

impl Drop for SensorFeed {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
