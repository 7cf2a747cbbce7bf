//! Pump relay driver.
//!
//! A dumb actuator over any `embedded-hal` output pin.  Retry policy and
//! fault escalation live in the application service; this driver only maps
//! ON/OFF to a line level (honouring active-low boards) and reports write
//! failures as [`ActuatorError`].

use embedded_hal::digital::{Error as _, OutputPin};
use log::{info, warn};

use crate::app::ports::RelayPort;
use crate::error::ActuatorError;

pub struct RelayDriver<P: OutputPin> {
    pin: P,
    active_low: bool,
    /// Last level the pin accepted.
    on: Option<bool>,
}

impl<P: OutputPin> RelayDriver<P> {
    pub fn new(pin: P, active_low: bool) -> Self {
        Self {
            pin,
            active_low,
            on: None,
        }
    }

    /// Drive the relay.  Always touches the pin, even if the level is
    /// unchanged.
    pub fn switch(&mut self, on: bool) -> Result<(), ActuatorError> {
        let high = on != self.active_low;
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };

        if let Err(e) = result {
            warn!("Relay write failed ({:?}): {e:?}", e.kind());
            self.on = None;
            return Err(ActuatorError::GpioWriteFailed);
        }

        if self.on != Some(on) {
            info!("Relay {}", if on { "ON" } else { "OFF" });
        }
        self.on = Some(on);
        Ok(())
    }

    pub fn is_on(&self) -> Option<bool> {
        self.on
    }
}

impl<P: OutputPin> RelayPort for RelayDriver<P> {
    fn set(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.switch(on)
    }
}
