//! Incremental decoder for the server-sent-event framing used by the
//! Messages API stream.

use serde::Deserialize;

use super::{AnthropicErrorBody, LlmError};

/// Splits a byte stream into SSE events and yields each event's `data`
/// payload. Bytes are buffered until a blank line closes the event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some((end, sep_len)) = find_boundary(&self.buf) {
            let raw: Vec<u8> = self.buf.drain(..end + sep_len).collect();
            let block = String::from_utf8_lossy(&raw[..end]);
            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|d| d.strip_prefix(' ').unwrap_or(d))
                .collect();
            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }
        payloads
    }
}

/// Position and length of the first event separator (`\n\n` or `\r\n\r\n`).
fn find_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: AnthropicErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// What one event payload means for the relay.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamSignal {
    Text(String),
    Stop,
    Ignore,
}

pub fn interpret(payload: &str) -> Result<StreamSignal, LlmError> {
    let event: StreamEvent = serde_json::from_str(payload)?;
    Ok(match event {
        StreamEvent::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        } => StreamSignal::Text(text),
        StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other => StreamSignal::Ignore,
        StreamEvent::MessageStop => StreamSignal::Stop,
        StreamEvent::Error { error } => {
            return Err(LlmError::Api {
                status: 200,
                message: error.message,
            })
        }
    })
}
