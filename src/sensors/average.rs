//! Rolling averages of the raw readings, reported with telemetry.
//!
//! Backed by a fixed-capacity `heapless::Deque`; the configured window
//! (`average_samples`) may be smaller than the buffer and can change on a
//! config reload.  Missing readings are skipped, not counted as zero.

use heapless::Deque;

use crate::fsm::context::SensorSnapshot;

/// Upper bound for `average_samples`.
pub const MAX_SAMPLES: usize = 64;

pub struct RollingAverage {
    samples: Deque<f32, MAX_SAMPLES>,
    window: usize,
}

impl RollingAverage {
    pub fn new(window: usize) -> Self {
        Self {
            samples: Deque::new(),
            window: window.clamp(1, MAX_SAMPLES),
        }
    }

    pub fn push(&mut self, value: f32) {
        while self.samples.len() >= self.window {
            self.samples.pop_front();
        }
        // Cannot fail: the loop above leaves room for one more.
        let _ = self.samples.push_back(value);
    }

    /// Shrinking the window drops the oldest samples.
    pub fn set_window(&mut self, window: usize) {
        self.window = window.clamp(1, MAX_SAMPLES);
        while self.samples.len() > self.window {
            self.samples.pop_front();
        }
    }

    pub fn mean(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f32 = self.samples.iter().sum();
        Some(sum / self.samples.len() as f32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Averaged values, `None` where no sample has been seen in the window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AverageReadings {
    pub inlet_temp: Option<f32>,
    pub collector_temp: Option<f32>,
    pub ambient_temp: Option<f32>,
    pub light_level: Option<f32>,
}

/// One [`RollingAverage`] per sensor.
pub struct SensorAverages {
    inlet: RollingAverage,
    collector: RollingAverage,
    ambient: RollingAverage,
    light: RollingAverage,
}

impl SensorAverages {
    pub fn new(window: u8) -> Self {
        let w = usize::from(window);
        Self {
            inlet: RollingAverage::new(w),
            collector: RollingAverage::new(w),
            ambient: RollingAverage::new(w),
            light: RollingAverage::new(w),
        }
    }

    pub fn push(&mut self, snap: &SensorSnapshot) {
        let pairs = [
            (&mut self.inlet, snap.inlet_temp),
            (&mut self.collector, snap.collector_temp),
            (&mut self.ambient, snap.ambient_temp),
            (&mut self.light, snap.light_level),
        ];
        for (avg, reading) in pairs {
            if let Some(v) = reading {
                avg.push(v);
            }
        }
    }

    pub fn set_window(&mut self, window: u8) {
        let w = usize::from(window);
        for avg in [&mut self.inlet, &mut self.collector, &mut self.ambient, &mut self.light] {
            avg.set_window(w);
        }
    }

    pub fn readings(&self) -> AverageReadings {
        AverageReadings {
            inlet_temp: self.inlet.mean(),
            collector_temp: self.collector.mean(),
            ambient_temp: self.ambient.mean(),
            light_level: self.light.mean(),
        }
    }
}
