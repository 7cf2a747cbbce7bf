//! Fuzz target: DS18B20 `w1_slave` parser
//!
//! Feeds arbitrary text to `parse_w1_slave` and verifies:
//! - No panics on any input
//! - Every accepted reading lies inside the probe's rated range
//!
//! cargo fuzz run fuzz_w1_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use pipool::sensors::temperature::parse_w1_slave;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(celsius) = parse_w1_slave(text) {
        assert!(celsius.is_finite());
        assert!((-55.0..=125.0).contains(&celsius));
        assert!((celsius - 85.0).abs() > f32::EPSILON, "power-on value accepted");
    }
});
