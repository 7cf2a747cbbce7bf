//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements                  | Connects to                 |
//! |--------------|-----------------------------|-----------------------------|
//! | `hardware`   | SensorPort, RelayPort       | sensor feed + relay driver  |
//! | `json_store` | ConfigPort, CheckpointPort  | flat JSON document on disk  |
//! | `log_sink`   | StatusSink                  | `log` / tracing output      |
//! | `telemetry`  | StatusSink                  | JSON-lines file             |
//! | `time`       | Clock                       | `Instant` + `chrono::Utc`   |

pub mod hardware;
pub mod json_store;
pub mod log_sink;
pub mod telemetry;
pub mod time;
