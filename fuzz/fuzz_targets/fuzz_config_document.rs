//! Fuzz target: config document decoding
//!
//! Parses arbitrary bytes the way the JSON store does (one flat object,
//! each section decoded from the whole document) and verifies:
//! - No panics on any input
//! - A config that passes validation survives a JSON round trip
//! - Any decodable checkpoint re-encodes and decodes to itself
//!
//! cargo fuzz run fuzz_config_document

#![no_main]

use libfuzzer_sys::fuzz_target;
use pipool::app::ports::Checkpoint;
use pipool::config::{ControllerConfig, HardwareConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    if !doc.is_object() {
        return;
    }

    if let Ok(cfg) = serde_json::from_value::<ControllerConfig>(doc.clone()) {
        if cfg.validate().is_ok() {
            let json = serde_json::to_string(&cfg).expect("valid config serialises");
            let back: ControllerConfig = serde_json::from_str(&json).expect("round trip");
            assert_eq!(back, cfg);
            assert!(back.validate().is_ok());
        }
    }

    let _ = serde_json::from_value::<HardwareConfig>(doc.clone());

    if let Ok(cp) = serde_json::from_value::<Checkpoint>(doc) {
        let json = serde_json::to_string(&cp).expect("checkpoint serialises");
        let back: Checkpoint = serde_json::from_str(&json).expect("round trip");
        assert_eq!(back, cp);
    }
});
