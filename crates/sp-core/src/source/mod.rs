//! Event feed ingestion.
//!
//! Reads newline-delimited feed lines, parses each into an [`Event`] and
//! publishes one [`DataPoint`] per reported dimension on that dimension's
//! broker topic. Malformed lines are logged and skipped; only a read error
//! or a line longer than the configured limit ends ingestion early.

pub mod parse;

pub use parse::{parse_line, ParseError, DATA_PREFIX};

use serde::Serialize;
use sp_common::{DataPoint, Dimension, Event};
use std::io::{self, BufRead, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::logging::event_names;
use crate::publish::Broker;

/// Longest accepted feed line in bytes, excluding the line ending.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Broker carrying per-dimension data points.
pub type PointBroker = Broker<Dimension, DataPoint>;

/// Running ingestion counters, shared with readers on other threads.
#[derive(Debug, Default)]
pub struct SourceCounters {
    lines: AtomicU64,
    events: AtomicU64,
    rejected: AtomicU64,
    points: AtomicU64,
}

/// Point-in-time copy of [`SourceCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceSnapshot {
    /// Non-blank lines read.
    pub lines: u64,
    /// Lines parsed into events.
    pub events: u64,
    /// Lines rejected by the parser.
    pub rejected: u64,
    /// Data points published across all dimensions.
    pub points: u64,
}

impl SourceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            points: self.points.load(Ordering::Relaxed),
        }
    }
}

/// Publish every data point of `event`. Returns how many were published.
pub fn dispatch(broker: &PointBroker, event: &Event) -> u64 {
    let mut published = 0;
    for (dimension, point) in event.data_points() {
        broker.publish(&dimension, point);
        published += 1;
    }
    published
}

/// Ingest `reader` until end of input or a read error.
///
/// Lines are split on `\n` with a trailing `\r` removed, so CRLF feeds are
/// accepted. Blank lines are skipped without counting. At most
/// `max_line` bytes plus the line ending are buffered per line; a longer
/// line fails with [`io::ErrorKind::InvalidData`]. Returns the error that
/// ended ingestion, if any.
pub fn run_source<R: BufRead>(
    mut reader: R,
    broker: &PointBroker,
    counters: &SourceCounters,
    max_line: usize,
) -> io::Result<()> {
    let mut buf = Vec::with_capacity(512);
    let mut line_no: u64 = 0;
    // Room for "\r\n" after a line of exactly `max_line` bytes.
    let read_limit = max_line as u64 + 2;

    loop {
        buf.clear();
        if (&mut reader).take(read_limit).read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;

        let line = trim_line_ending(&buf);
        if line.len() > max_line {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line {} too long: exceeds {} bytes", line_no, max_line),
            ));
        }
        if line.is_empty() {
            continue;
        }
        counters.lines.fetch_add(1, Ordering::Relaxed);

        match parse_line(line) {
            Ok(event) => {
                counters.events.fetch_add(1, Ordering::Relaxed);
                let published = dispatch(broker, &event);
                counters.points.fetch_add(published, Ordering::Relaxed);
            }
            Err(e) => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event = event_names::STREAM_LINE_REJECTED,
                    line = line_no,
                    error = %e,
                    "skipping malformed event"
                );
            }
        }
    }

    debug!(lines = line_no, "end of input");
    Ok(())
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
