//! Wire format for streamed chat turns. Each event is one JSON object
//! per line (NDJSON) so clients can render as soon as a line arrives.

use anyhow::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::retrieval::Document;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Always sent first with the documents the answer is grounded on
    Context {
        session_id: String,
        data_points: Vec<Document>,
    },
    Delta {
        content: String,
    },
    Done {
        session_id: String,
        user_message_id: String,
        assistant_message_id: String,
        persisted: bool,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn to_ndjson_line(&self) -> String {
        // Serializing an enum of strings and documents can't fail
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({"type": "error", "message": e.to_string()}).to_string()
        });
        line.push('\n');
        line
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

fn parse_line(line: &[u8]) -> Result<Option<StreamEvent>, Error> {
    let text = std::str::from_utf8(line)?.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(text)?))
}

/// Incrementally decodes NDJSON from arbitrary byte chunks. Bytes are
/// buffered until a newline so multi-byte characters split across
/// chunks are reassembled before decoding.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, Error> {
        self.buffer.extend_from_slice(chunk);
        let mut events = vec![];
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line[..pos])? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Decode whatever is left after the stream ended without a
    /// trailing newline.
    pub fn finish(&mut self) -> Result<Option<StreamEvent>, Error> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}
