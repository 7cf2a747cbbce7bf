//! Hardware adapter: bridges the sensor side and the relay to the domain
//! port traits.
//!
//! [`AppService::tick`](crate::app::service::AppService::tick) takes one
//! value that is both a [`SensorPort`] and a [`RelayPort`].  This adapter
//! bundles any pair of the two, so the binary can pair a threaded
//! [`SensorFeed`] with a sysfs relay and tests can pair fakes.

use crate::app::ports::{RelayPort, SensorPort};
use crate::drivers::gpio::SysfsPin;
use crate::drivers::relay::RelayDriver;
use crate::error::ActuatorError;
use crate::fsm::context::SensorSnapshot;
use crate::fsm::timer::Timestamp;
use crate::sensors::SensorFeed;

/// The production pairing: sensors on a background thread, relay on a
/// sysfs GPIO line.
pub type PiHardware = HardwareAdapter<SensorFeed, RelayDriver<SysfsPin>>;

pub struct HardwareAdapter<S, R> {
    sensors: S,
    relay: R,
}

impl<S, R> HardwareAdapter<S, R> {
    pub fn new(sensors: S, relay: R) -> Self {
        Self { sensors, relay }
    }

    pub fn into_parts(self) -> (S, R) {
        (self.sensors, self.relay)
    }
}

impl<S: SensorPort, R> SensorPort for HardwareAdapter<S, R> {
    fn read(&mut self, now: Timestamp) -> SensorSnapshot {
        self.sensors.read(now)
    }
}

impl<S, R: RelayPort> RelayPort for HardwareAdapter<S, R> {
    fn set(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.relay.set(on)
    }
}
