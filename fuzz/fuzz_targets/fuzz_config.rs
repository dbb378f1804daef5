//! Fuzz target for config.json parsing.
//!
//! Tests that configuration parsing and validation handle arbitrary input
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sp_core::config::ServerConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = serde_json::from_slice::<ServerConfig>(data) {
        let _ = config.validate();
    }
});
