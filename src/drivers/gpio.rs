//! Linux sysfs GPIO line exposed through the `embedded-hal` digital traits.
//!
//! ```text
//! <sysfs>/class/gpio/export          ← write "<n>" to claim the line
//! <sysfs>/class/gpio/gpio<n>/direction   "in" | "low" | "high"
//! <sysfs>/class/gpio/gpio<n>/value       "0" | "1"
//! ```
//!
//! `n` is the BCM number plus the chip base.  Writing `low`/`high` to
//! `direction` configures an output and sets its level in one step, so the
//! relay never glitches on during export.
//!
//! Pointing the sysfs root at a scratch directory gives a working
//! simulation: the files are plain text either way.

use core::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};

/// A sysfs GPIO operation failed.
#[derive(Debug)]
pub struct GpioError {
    pub line: u32,
    pub op: &'static str,
    pub source: io::Error,
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpio{} {}: {}", self.line, self.op, self.source)
    }
}

impl std::error::Error for GpioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl digital::Error for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct SysfsPin {
    line: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Claim `bcm` as an output driven to `initial_high`.
    pub fn output(
        sysfs_root: &Path,
        chip_base: u32,
        bcm: u32,
        initial_high: bool,
    ) -> Result<Self, GpioError> {
        let direction = if initial_high { "high" } else { "low" };
        Self::open(sysfs_root, sysfs_line(chip_base, bcm)?, direction)
    }

    /// Claim `bcm` as an input.
    pub fn input(sysfs_root: &Path, chip_base: u32, bcm: u32) -> Result<Self, GpioError> {
        Self::open(sysfs_root, sysfs_line(chip_base, bcm)?, "in")
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn open(sysfs_root: &Path, line: u32, direction: &'static str) -> Result<Self, GpioError> {
        let class = sysfs_root.join("class/gpio");
        let dir = class.join(format!("gpio{line}"));
        let err = |op, source| GpioError { line, op, source };

        if !dir.exists() {
            fs::write(class.join("export"), line.to_string()).map_err(|e| err("export", e))?;
        }
        fs::write(dir.join("direction"), direction).map_err(|e| err("direction", e))?;

        Ok(Self {
            line,
            value_path: dir.join("value"),
        })
    }

    fn write_level(&mut self, high: bool) -> Result<(), GpioError> {
        fs::write(&self.value_path, if high { "1" } else { "0" }).map_err(|source| GpioError {
            line: self.line,
            op: "write",
            source,
        })
    }

    fn read_level(&self) -> Result<bool, GpioError> {
        let text = fs::read_to_string(&self.value_path).map_err(|source| GpioError {
            line: self.line,
            op: "read",
            source,
        })?;
        Ok(text.trim() == "1")
    }
}

/// Kernel line number for a BCM pin on the chip starting at `chip_base`.
fn sysfs_line(chip_base: u32, bcm: u32) -> Result<u32, GpioError> {
    chip_base.checked_add(bcm).ok_or_else(|| GpioError {
        line: bcm,
        op: "resolve",
        source: io::Error::new(io::ErrorKind::InvalidInput, "chip base + pin overflows"),
    })
}

impl ErrorType for SysfsPin {
    type Error = GpioError;
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write_level(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write_level(true)
    }
}

impl InputPin for SysfsPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.read_level()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.read_level().map(|high| !high)
    }
}
