//! JSON file store.
//!
//! Implements both [`ConfigPort`] and [`CheckpointPort`] over a single flat
//! JSON object on disk, the same document operators edit by hand:
//!
//! ```json
//! {
//!   "light_threshold_lux": 10000,     <- ControllerConfig
//!   "relay_pin": 17,                  <- HardwareConfig
//!   "relay_state": "OFF",             <- Checkpoint
//!   "mode": "Idle",
//!   ...
//! }
//! ```
//!
//! Each section is decoded from the whole object and ignores keys it does
//! not own.  Writes are read-modify-write: a section's keys are merged into
//! the current document, so saving a checkpoint never clobbers the config
//! and unknown keys survive.  The new document goes to a temporary file
//! that is then renamed over the original.
//!
//! A missing file is not an error: every section falls back to its
//! defaults.

use std::cell::Cell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::app::ports::{Checkpoint, CheckpointPort, ConfigError, ConfigPort};
use crate::config::{ControllerConfig, HardwareConfig};

type Document = Map<String, Value>;

/// Legacy key names and the canonical key that replaces each.  The legacy
/// spelling is dropped whenever the canonical key is written, since serde
/// rejects a document carrying both.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("light_threshold", "light_threshold_lux"),
    ("temp_delta_threshold", "temp_delta_threshold_c"),
    ("water_replace_time", "water_replace_time_s"),
    ("analysis_interval", "analysis_interval_s"),
    ("pump_relay_pin", "relay_pin"),
    ("button_b1_pin", "start_button_pin"),
    ("button_b2_pin", "force_run_button_pin"),
    ("button_b3_pin", "stop_button_pin"),
    ("last_action", "last_action_reason"),
    ("last_action_time", "last_transition_at"),
];

pub struct JsonFileStore {
    path: PathBuf,
    /// Modification time of the document as last read or written.
    seen_mtime: Cell<Option<SystemTime>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen_mtime: Cell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wiring section.  Read at startup only.
    pub fn load_hardware(&self) -> Result<HardwareConfig, ConfigError> {
        let doc = self.read_document()?;
        section(doc.as_ref())
    }

    /// Re-read the controller config if the file changed since it was last
    /// read or written.  `Ok(None)` when nothing changed or the file is
    /// gone.
    pub fn reload_if_changed(&self) -> Result<Option<ControllerConfig>, ConfigError> {
        let Some(mtime) = self.current_mtime() else {
            return Ok(None);
        };
        if self.seen_mtime.get() == Some(mtime) {
            return Ok(None);
        }
        debug!("{} changed on disk, reloading", self.path.display());
        self.load().map(Some)
    }

    fn current_mtime(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Parse the document.  `Ok(None)` if the file does not exist.
    fn read_document(&self) -> Result<Option<Document>, ConfigError> {
        // Record the mtime before reading so an edit racing the read is
        // picked up on the next poll rather than lost.
        let mtime = self.current_mtime();
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!("Reading {} failed: {e}", self.path.display());
                return Err(ConfigError::Io);
            }
        };
        self.seen_mtime.set(mtime);

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(doc)) => Ok(Some(doc)),
            Ok(_) => {
                warn!("{} is not a JSON object", self.path.display());
                Err(ConfigError::Corrupted)
            }
            Err(e) => {
                warn!("{} failed to parse: {e}", self.path.display());
                Err(ConfigError::Corrupted)
            }
        }
    }

    /// Merge `value`'s keys into the stored document and write it back.
    fn merge_and_write<T: Serialize>(&self, value: &T) -> Result<(), ConfigError> {
        let mut doc = self.read_document()?.unwrap_or_default();

        let fields = match serde_json::to_value(value) {
            Ok(Value::Object(fields)) => fields,
            _ => return Err(ConfigError::Corrupted),
        };
        for (key, val) in fields {
            if let Some((legacy, _)) = LEGACY_KEYS.iter().find(|(_, canonical)| *canonical == key) {
                doc.remove(*legacy);
            }
            doc.insert(key, val);
        }

        self.write_document(&doc)
    }

    fn write_document(&self, doc: &Document) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(doc).map_err(|_| ConfigError::Corrupted)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let io_err = |op: &str, e: std::io::Error| {
            warn!("{op} {} failed: {e}", self.path.display());
            ConfigError::Io
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| io_err("Creating directory for", e))?;
        }
        fs::write(&tmp, text).map_err(|e| io_err("Writing temp file for", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_err("Replacing", e))?;

        self.seen_mtime.set(self.current_mtime());
        Ok(())
    }
}

/// Decode one section from the whole document, or its defaults when there
/// is no document yet.
fn section<T: DeserializeOwned + Default>(doc: Option<&Document>) -> Result<T, ConfigError> {
    let Some(doc) = doc else {
        return Ok(T::default());
    };
    serde_json::from_value(Value::Object(doc.clone())).map_err(|e| {
        warn!("Config section rejected: {e}");
        ConfigError::Corrupted
    })
}

impl ConfigPort for JsonFileStore {
    fn load(&self) -> Result<ControllerConfig, ConfigError> {
        let doc = self.read_document()?;
        if doc.is_none() {
            info!("{} not found, using default config", self.path.display());
        }
        let config: ControllerConfig = section(doc.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn save(&self, config: &ControllerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.merge_and_write(config)?;
        info!("Config saved to {}", self.path.display());
        Ok(())
    }
}

impl CheckpointPort for JsonFileStore {
    fn load_checkpoint(&self) -> Result<Checkpoint, ConfigError> {
        let doc = self.read_document()?;
        section(doc.as_ref())
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), ConfigError> {
        self.merge_and_write(checkpoint)?;
        debug!(
            "Checkpoint saved: mode={:?} relay={:?}",
            checkpoint.mode, checkpoint.relay_state
        );
        Ok(())
    }
}
