//! Incremental decoder for the translation backend's event stream
//!
//! The backend pushes server-sent-events frames whose `data` payload is one
//! tagged JSON object per event. Network chunks can split frames anywhere,
//! including inside a multi-byte character, so the decoder buffers raw bytes
//! and only converts complete frames to text.

use thiserror::Error;
use tracing::debug;

use crate::domain::events::TranslationStreamEvent;

/// Decoding failures; both end the stream on the consumer side
#[derive(Debug, Error)]
pub enum SseError {
    #[error("stream frame is not valid UTF-8")]
    Encoding,
    #[error("malformed event payload: {0}")]
    Payload(String),
}

/// Stateful frame decoder, one per connection
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk and returns every event completed by it.
    ///
    /// Unrecognized event tags are skipped; frames without a `data` field
    /// (comments, retry hints) are ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<TranslationStreamEvent>, SseError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((frame_len, separator_len)) = frame_split(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..frame_len + separator_len).collect();
            let text =
                std::str::from_utf8(&frame[..frame_len]).map_err(|_| SseError::Encoding)?;

            if let Some(data) = extract_data(text) {
                if let Some(event) = parse_event(&data)? {
                    events.push(event);
                }
            }
        }

        Ok(events)
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// Finds the first frame boundary: `(frame_len, separator_len)`
fn frame_split(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buffer.len() {
        if buffer[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        if buffer[i] == b'\n' && buffer[i + 1] == b'\n' {
            return Some((i, 2));
        }
        i += 1;
    }
    None
}

/// Joins the frame's `data:` lines; other SSE fields carry nothing here.
fn extract_data(frame: &str) -> Option<String> {
    let mut data_lines: Vec<&str> = Vec::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data_lines.is_empty() { None } else { Some(data_lines.join("\n")) }
}

/// Parses one data payload into an event.
///
/// Unknown `type` tags return `None` so newer backends keep working with
/// this client; a missing tag or invalid fields are payload errors.
fn parse_event(data: &str) -> Result<Option<TranslationStreamEvent>, SseError> {
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| SseError::Payload(format!("invalid JSON: {e}")))?;

    match value.get("type").and_then(serde_json::Value::as_str) {
        Some("start" | "progress" | "complete" | "syntax") => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SseError::Payload(e.to_string())),
        Some(other) => {
            debug!("skipping unrecognized stream event type: {other}");
            Ok(None)
        }
        None => Err(SseError::Payload("event payload has no type tag".to_string())),
    }
}
