//! BH1750 ambient light sensor via the Linux IIO subsystem.
//!
//! With the `bh1750` kernel driver bound, the device appears as
//! `<sysfs>/bus/iio/devices/iio:deviceN/` with `in_illuminance_raw` and
//! `in_illuminance_scale`.  Lux is `raw × scale`.  A missing scale file is
//! treated as a scale of 1.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::SensorError;

/// Highest illuminance the sensor can report (65535 counts / 1.2).
const MAX_LUX: f32 = 54_613.0;

pub struct Bh1750 {
    raw_path: PathBuf,
    scale_path: PathBuf,
}

impl Bh1750 {
    pub fn new(sysfs_root: &Path, iio_device: &str) -> Self {
        let dir = sysfs_root.join("bus/iio/devices").join(iio_device);
        Self {
            raw_path: dir.join("in_illuminance_raw"),
            scale_path: dir.join("in_illuminance_scale"),
        }
    }

    pub fn read(&self) -> Result<f32, SensorError> {
        let raw = read_number(&self.raw_path)?;
        let scale = match read_number(&self.scale_path) {
            Ok(s) => s,
            Err(SensorError::NotPresent) => 1.0,
            Err(e) => return Err(e),
        };
        lux_from_raw(raw, scale)
    }
}

/// Convert IIO raw counts and scale into lux, rejecting impossible values.
pub fn lux_from_raw(raw: f32, scale: f32) -> Result<f32, SensorError> {
    let lux = raw * scale;
    if !lux.is_finite() || !(0.0..=MAX_LUX * 1.01).contains(&lux) {
        return Err(SensorError::OutOfRange);
    }
    Ok(lux)
}

fn read_number(path: &Path) -> Result<f32, SensorError> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => SensorError::NotPresent,
        _ => SensorError::ReadFailed,
    })?;
    text.trim().parse().map_err(|_| SensorError::Malformed)
}
