//! Fuzz target for `/analysis` query validation.
//!
//! Tests that query decoding and duration parsing handle arbitrary input
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sp_core::analysis::{parse_duration, AnalysisRequest};

fuzz_target!(|data: &str| {
    let _ = AnalysisRequest::from_query(data);
    let _ = parse_duration(data);
});
