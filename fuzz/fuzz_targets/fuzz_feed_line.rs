//! Fuzz target for event feed line parsing.
//!
//! Tests that `parse_line` handles arbitrary bytes without panicking, and
//! that every accepted line carries the prefix.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sp_core::source::{parse_line, DATA_PREFIX};

fuzz_target!(|data: &[u8]| {
    if parse_line(data).is_ok() {
        assert!(data.starts_with(DATA_PREFIX));
    }
});
