//! Controller configuration parameters.
//!
//! [`ControllerConfig`] holds the tunable decision thresholds and windows.
//! It is loaded once at start and may be hot-reloaded between ticks.
//! [`HardwareConfig`] holds pin and device wiring and is read at startup only.
//!
//! Both live in the same flat JSON object as the crash-recovery checkpoint.
//! Field aliases accept the key names used by earlier deployments
//! (`light_threshold`, `water_replace_time`, ...).

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Decision thresholds and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    // --- Thresholds ---
    /// Illuminance (lux) at or above which the sun is considered strong.
    #[serde(alias = "light_threshold")]
    pub light_threshold_lux: f32,
    /// Collector minus inlet temperature (°C) needed to run the pump.
    #[serde(alias = "temp_delta_threshold")]
    pub temp_delta_threshold_c: f32,
    /// AutoRun keeps running until Δtemp drops below threshold minus this.
    pub temp_delta_hysteresis_c: f32,

    // --- Windows ---
    /// Run time needed to flush stagnant water out of the collector loop (s).
    #[serde(alias = "water_replace_time")]
    pub water_replace_time_s: u32,
    /// Idle time after which an analysis run refreshes the readings (s).
    #[serde(alias = "analysis_interval")]
    pub analysis_interval_s: u32,

    // --- Timing ---
    /// Control tick period (s).
    pub poll_interval_s: u32,
    /// Samples in the rolling averages reported with telemetry.
    pub average_samples: u8,
    /// How long a decision-critical reading may stay missing before the
    /// engine stops on a sensor fault (s).
    pub sensor_fault_grace_s: u32,
    /// Telemetry report interval (s).
    pub telemetry_interval_s: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            light_threshold_lux: 10_000.0,
            temp_delta_threshold_c: 0.5,
            temp_delta_hysteresis_c: 0.0,

            water_replace_time_s: 300, // 5 min
            analysis_interval_s: 600,  // 10 min

            poll_interval_s: 5,
            average_samples: 30,
            sensor_fault_grace_s: 600,
            telemetry_interval_s: 10,
        }
    }
}

impl ControllerConfig {
    pub fn water_replace_time(&self) -> Duration {
        Duration::from_secs(u64::from(self.water_replace_time_s))
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.analysis_interval_s))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.poll_interval_s))
    }

    pub fn sensor_fault_grace(&self) -> Duration {
        Duration::from_secs(u64::from(self.sensor_fault_grace_s))
    }

    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100_000.0).contains(&self.light_threshold_lux) {
            return Err(ConfigError::ValidationFailed(
                "light_threshold_lux must be 0–100000",
            ));
        }
        if !(0.0..=20.0).contains(&self.temp_delta_threshold_c) {
            return Err(ConfigError::ValidationFailed(
                "temp_delta_threshold_c must be 0.0–20.0",
            ));
        }
        if !(0.0..=self.temp_delta_threshold_c).contains(&self.temp_delta_hysteresis_c) {
            return Err(ConfigError::ValidationFailed(
                "temp_delta_hysteresis_c must be between 0 and temp_delta_threshold_c",
            ));
        }
        if !(10..=3600).contains(&self.water_replace_time_s) {
            return Err(ConfigError::ValidationFailed(
                "water_replace_time_s must be 10–3600",
            ));
        }
        if !(60..=86_400).contains(&self.analysis_interval_s) {
            return Err(ConfigError::ValidationFailed(
                "analysis_interval_s must be 60–86400",
            ));
        }
        if !(1..=10).contains(&self.poll_interval_s) {
            return Err(ConfigError::ValidationFailed(
                "poll_interval_s must be 1–10",
            ));
        }
        if !(1..=crate::sensors::average::MAX_SAMPLES as u8).contains(&self.average_samples) {
            return Err(ConfigError::ValidationFailed(
                "average_samples must be 1–64",
            ));
        }
        if !(self.poll_interval_s..=86_400).contains(&self.sensor_fault_grace_s) {
            return Err(ConfigError::ValidationFailed(
                "sensor_fault_grace_s must be poll_interval_s–86400",
            ));
        }
        if !(1..=3600).contains(&self.telemetry_interval_s) {
            return Err(ConfigError::ValidationFailed(
                "telemetry_interval_s must be 1–3600",
            ));
        }
        Ok(())
    }
}

/// Physical wiring.  Read once at startup; changes need a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Root of the sysfs tree.  Point at a scratch directory to simulate.
    pub sysfs_root: String,
    /// Offset added to BCM numbers for the sysfs GPIO interface.
    pub gpio_chip_base: u32,

    #[serde(alias = "pump_relay_pin")]
    pub relay_pin: u32,
    /// Drive the relay line low to energise it.
    pub relay_active_low: bool,
    #[serde(alias = "button_b1_pin")]
    pub start_button_pin: u32,
    #[serde(alias = "button_b2_pin")]
    pub force_run_button_pin: u32,
    #[serde(alias = "button_b3_pin")]
    pub stop_button_pin: u32,
    pub button_debounce_ms: u32,

    /// DS18B20 serials (without the `28-` family prefix).
    pub inlet_probe_id: String,
    pub collector_probe_id: String,
    pub ambient_probe_id: String,
    /// IIO device exposing the BH1750, e.g. `iio:device0`.
    pub light_iio_device: String,

    /// Sensor snapshots older than this are reported as unavailable (s).
    pub sensor_max_age_s: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            sysfs_root: "/sys".into(),
            gpio_chip_base: 0,

            relay_pin: crate::pins::PUMP_RELAY_GPIO,
            relay_active_low: false,
            start_button_pin: crate::pins::START_BUTTON_GPIO,
            force_run_button_pin: crate::pins::FORCE_RUN_BUTTON_GPIO,
            stop_button_pin: crate::pins::STOP_BUTTON_GPIO,
            button_debounce_ms: 200,

            inlet_probe_id: "0000006bbe43".into(),
            collector_probe_id: "00000069d1fe".into(),
            ambient_probe_id: "0000006b6275".into(),
            light_iio_device: "iio:device0".into(),

            sensor_max_age_s: 30,
        }
    }
}

impl HardwareConfig {
    pub fn sensor_max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.sensor_max_age_s))
    }

    pub fn button_debounce(&self) -> Duration {
        Duration::from_millis(u64::from(self.button_debounce_ms))
    }
}
