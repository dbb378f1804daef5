//! Analysis requests: validation, duration parsing and the report shape
//! returned by the `/analysis` endpoint and the `analyze` command.

use serde::ser::{Serialize, SerializeMap, Serializer};
use sp_common::{Dimension, Error, Result, Statistics};
use std::time::Duration;

use crate::session::EventStream;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Largest accepted duration, in nanoseconds (about 292 years).
const MAX_NANOS: u128 = i64::MAX as u128;

/// A validated analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub dimension: Dimension,
    pub duration: Duration,
}

impl AnalysisRequest {
    /// Validate raw `dimension` and `duration` values.
    ///
    /// Empty values count as missing.
    pub fn new(dimension: &str, duration: &str) -> Result<Self> {
        if dimension.is_empty() {
            return Err(Error::MissingParameter { name: "dimension" });
        }
        if duration.is_empty() {
            return Err(Error::MissingParameter { name: "duration" });
        }
        Ok(AnalysisRequest {
            dimension: dimension.parse()?,
            duration: parse_duration(duration)?,
        })
    }

    /// Validate the `dimension` and `duration` parameters of a URL query
    /// string. The first occurrence of each parameter wins.
    pub fn from_query(query: &str) -> Result<Self> {
        let pairs = parse_query(query);
        let mut dimension = None;
        let mut duration = None;
        for (key, value) in &pairs {
            match key.as_str() {
                "dimension" if dimension.is_none() => dimension = Some(value.as_str()),
                "duration" if duration.is_none() => duration = Some(value.as_str()),
                _ => {}
            }
        }
        Self::new(dimension.unwrap_or(""), duration.unwrap_or(""))
    }
}

/// Parse a duration such as `"300ms"`, `"1.5h"` or `"2h45m"`.
///
/// Accepts an optional sign followed by one or more decimal numbers, each
/// with a unit among `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `"0"`
/// needs no unit. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = |reason: &str| Error::InvalidDuration {
        value: input.to_string(),
        reason: reason.to_string(),
    };

    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid("empty duration"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (whole, after) = split_digits(rest);
        let (fraction, after) = match after.strip_prefix('.') {
            Some(after_dot) => split_digits(after_dot),
            None => ("", after),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("expected a number"));
        }

        let unit_len = after
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        let scale = match unit {
            "" => return Err(invalid("missing unit")),
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SECOND,
            "m" => 60 * NANOS_PER_SECOND,
            "h" => 3600 * NANOS_PER_SECOND,
            _ => return Err(invalid(&format!("unknown unit {:?}", unit))),
        };

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("overflow"))?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(|| invalid("overflow"))?;
        nanos += fraction_nanos(fraction, scale);

        total = total
            .checked_add(nanos)
            .filter(|&t| t <= MAX_NANOS)
            .ok_or_else(|| invalid("overflow"))?;
        rest = after;
    }

    if negative && total > 0 {
        return Err(Error::NegativeDuration {
            value: input.to_string(),
        });
    }
    // Bounded by MAX_NANOS above.
    Ok(Duration::from_nanos(total as u64))
}

fn split_digits(s: &str) -> (&str, &str) {
    let len = s.bytes().take_while(u8::is_ascii_digit).count();
    s.split_at(len)
}

/// Nanoseconds contributed by the fractional digits of a number in `scale`
/// units, truncated.
fn fraction_nanos(digits: &str, scale: u128) -> u128 {
    let mut numerator: u128 = 0;
    let mut denominator: u128 = 1;
    for d in digits.bytes() {
        // Digits beyond nanosecond precision of the largest unit are noise.
        if denominator >= 10u128.pow(20) {
            break;
        }
        numerator = numerator * 10 + u128::from(d - b'0');
        denominator *= 10;
    }
    numerator * scale / denominator
}

/// Split a URL query string into decoded key/value pairs.
///
/// `+` decodes to a space and `%XX` to the escaped byte. Malformed escapes
/// are kept literally.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let escaped = bytes
                    .get(i + 1..i + 3)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(byte) = escaped {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(b'%');
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Statistics for one dimension, serialized with dimension-prefixed
/// percentile keys (`likes_p50`, `likes_p90`, `likes_p99`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisReport {
    pub dimension: Dimension,
    pub statistics: Statistics,
}

impl AnalysisReport {
    pub fn new(dimension: Dimension, statistics: Statistics) -> Self {
        AnalysisReport {
            dimension,
            statistics,
        }
    }

    /// Report as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Serialize for AnalysisReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let stats = &self.statistics;
        let name = self.dimension.name();
        let mut map = serializer.serialize_map(Some(6))?;
        map.serialize_entry("total_posts", &stats.total_posts)?;
        map.serialize_entry("minimum_timestamp", &stats.minimum_timestamp)?;
        map.serialize_entry("maximum_timestamp", &stats.maximum_timestamp)?;
        map.serialize_entry(&format!("{}_p50", name), &stats.p50)?;
        map.serialize_entry(&format!("{}_p90", name), &stats.p90)?;
        map.serialize_entry(&format!("{}_p99", name), &stats.p99)?;
        map.end()
    }
}

/// Gather the requested window from `stream`. Blocks for up to the
/// request's duration.
pub fn analyze(stream: &EventStream, request: &AnalysisRequest) -> AnalysisReport {
    AnalysisReport::new(
        request.dimension,
        stream.gather(request.dimension, request.duration),
    )
}
