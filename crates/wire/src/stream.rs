// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The event bus stream entry wire format (§6).

use crate::error::WireError;
use bai_core::Event;
use serde::{Deserialize, Serialize};

/// One Redis stream entry: `{name, source, args}` (§6).
///
/// `args` holds the event's own fields, serialized by [`Event`]'s derived
/// `Serialize` impl; `name` and `source` are carried alongside so a
/// consumer can filter/ack by name without fully decoding `args`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    pub name: String,
    pub source: String,
    pub args: Event,
}

/// Encode an event for publication: 4-byte big-endian length prefix +
/// JSON payload.
pub fn encode_stream_entry(event: &Event, source: &str) -> Result<Vec<u8>, WireError> {
    let entry = StreamEntry { name: event.name().to_string(), source: source.to_string(), args: event.clone() };
    let payload = serde_json::to_vec(&entry)?;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a previously-encoded stream entry.
pub fn decode_stream_entry(bytes: &[u8]) -> Result<StreamEntry, WireError> {
    if bytes.len() < 4 {
        return Err(WireError::Truncated { expected: 4, got: bytes.len() });
    }
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if bytes.len() < 4 + len {
        return Err(WireError::Truncated { expected: 4 + len, got: bytes.len() });
    }
    let entry = serde_json::from_slice(&bytes[4..4 + len])?;
    Ok(entry)
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
