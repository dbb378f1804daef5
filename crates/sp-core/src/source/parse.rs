//! Parser for one line of the server-sent event feed.
//!
//! A valid line looks like
//! `data: {"pin":{"id":3,"timestamp":2,"likes":4,"comments":5}}`: the
//! `data: ` prefix, then an object with exactly one root key whose value
//! holds the event fields. The root key names the post type and is ignored.

use serde_json::{Map, Value};
use sp_common::{Dimension, Event};
use thiserror::Error;

/// Prefix every event line carries.
pub const DATA_PREFIX: &[u8] = b"data: ";

/// Why a feed line was rejected.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("prefix not found")]
    MissingPrefix,

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected exactly one root key, found {found}")]
    RootKeys { found: usize },

    #[error("event under root key {key:?} is not an object")]
    NotAnObject { key: String },

    #[error("missing {field}")]
    MissingField { field: &'static str },

    #[error("{field} is not an unsigned 32-bit integer: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Parse one feed line into an [`Event`].
///
/// Unknown event fields are ignored. A `null` field is treated as absent.
pub fn parse_line(line: &[u8]) -> Result<Event, ParseError> {
    let payload = line
        .strip_prefix(DATA_PREFIX)
        .ok_or(ParseError::MissingPrefix)?;

    let root: Map<String, Value> = serde_json::from_slice(payload)?;
    if root.len() != 1 {
        return Err(ParseError::RootKeys { found: root.len() });
    }
    let Some((key, body)) = root.into_iter().next() else {
        return Err(ParseError::RootKeys { found: 0 });
    };
    let fields = match body {
        Value::Object(fields) => fields,
        _ => return Err(ParseError::NotAnObject { key }),
    };

    let unix_time = required(&fields, "timestamp")?;
    let id = required(&fields, "id")?;

    let mut event = Event::new(id, unix_time);
    for dimension in Dimension::ALL {
        if let Some(count) = optional(&fields, dimension.name())? {
            event = event.with_count(dimension, count);
        }
    }
    Ok(event)
}

fn required(fields: &Map<String, Value>, field: &'static str) -> Result<u32, ParseError> {
    optional(fields, field)?.ok_or(ParseError::MissingField { field })
}

fn optional(fields: &Map<String, Value>, field: &'static str) -> Result<Option<u32>, ParseError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| ParseError::InvalidNumber {
                field,
                value: n.to_string(),
            }),
        Some(other) => Err(ParseError::InvalidNumber {
            field,
            value: other.to_string(),
        }),
    }
}
