//! DS18B20 one-wire temperature probe.
//!
//! The Linux `w1_therm` driver exposes each probe as
//! `<sysfs>/bus/w1/devices/28-<serial>/w1_slave`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line must end in `YES` (scratchpad CRC valid).  The second
//! carries the temperature in millidegrees.  A read takes the kernel up to
//! 750 ms per probe, which is why the sensors are polled off the tick
//! thread (see [`SensorFeed`](super::SensorFeed)).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::SensorError;

/// Family code prefix for DS18B20 device directories.
const FAMILY_PREFIX: &str = "28-";

/// Value the probe reports before its first conversion.
const POWER_ON_RESET_MILLI_C: i32 = 85_000;

/// Datasheet measurement range.
const MIN_C: f32 = -55.0;
const MAX_C: f32 = 125.0;

pub struct Ds18b20 {
    path: PathBuf,
}

impl Ds18b20 {
    /// `serial` is the device id without the `28-` family prefix.
    pub fn new(sysfs_root: &Path, serial: &str) -> Self {
        let path = sysfs_root
            .join("bus/w1/devices")
            .join(format!("{FAMILY_PREFIX}{serial}"))
            .join("w1_slave");
        Self { path }
    }

    pub fn read(&self) -> Result<f32, SensorError> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SensorError::NotPresent,
            _ => SensorError::ReadFailed,
        })?;
        parse_w1_slave(&text)
    }
}

/// Parse the two-line `w1_slave` text into degrees Celsius.
pub fn parse_w1_slave(text: &str) -> Result<f32, SensorError> {
    let mut lines = text.lines();
    let crc_line = lines.next().ok_or(SensorError::Malformed)?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorError::CrcMismatch);
    }

    let data_line = lines.next().ok_or(SensorError::Malformed)?;
    let (_, value) = data_line.rsplit_once("t=").ok_or(SensorError::Malformed)?;
    let milli: i32 = value.trim().parse().map_err(|_| SensorError::Malformed)?;
    if milli == POWER_ON_RESET_MILLI_C {
        return Err(SensorError::PowerOnReset);
    }

    let celsius = milli as f32 / 1000.0;
    if !(MIN_C..=MAX_C).contains(&celsius) {
        return Err(SensorError::OutOfRange);
    }
    Ok(celsius)
}
