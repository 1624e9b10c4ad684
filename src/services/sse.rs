//! Server-Sent Events framing.
//!
//! [`SseParser`] decodes the upstream provider's event stream incrementally;
//! the `format_*` helpers build the frames the gateway sends to its clients.

use serde::Serialize;

/// Payload of the terminator frame.
pub const DONE_MARKER: &str = "[DONE]";

/// SSE event parsed from a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: Option<String>,
}

/// Incremental SSE parser.
///
/// Bytes may arrive split at arbitrary points, including inside a UTF-8
/// sequence; incomplete input stays buffered until the next call.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every event completed by them.
    pub fn parse(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        // A multi-byte character cut at the chunk boundary waits for more bytes.
        let decoded = String::from_utf8_lossy(&self.pending[..valid_up_to]).into_owned();
        self.pending.drain(..valid_up_to);
        self.buffer.push_str(&decoded);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.buffer);
        self.pending.clear();
        parse_block(&block)
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event.event = Some(value.to_string()),
            "data" => match event.data {
                Some(ref mut data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => event.data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    if event.data.is_some() || event.event.is_some() {
        Some(event)
    } else {
        None
    }
}

/// Format a data frame carrying text.
///
/// Multi-line text is split into consecutive `data:` lines, which SSE clients
/// join back with `\n`.
pub fn format_sse_data(data: &str) -> String {
    let mut output = String::with_capacity(data.len() + 8);
    for line in data.split('\n') {
        output.push_str("data: ");
        output.push_str(line);
        output.push('\n');
    }
    output.push('\n');
    output
}

/// Format a data frame carrying a JSON-serialized value.
pub fn format_sse_json<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => format_sse_data(&json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize SSE payload");
            format_sse_error("failed to serialize event")
        }
    }
}

/// Format an in-band error frame: a JSON object with an `error` key.
pub fn format_sse_error(message: &str) -> String {
    format_sse_data(&serde_json::json!({ "error": message }).to_string())
}

/// Format the SSE done marker.
pub fn format_sse_done() -> String {
    format!("data: {}\n\n", DONE_MARKER)
}
