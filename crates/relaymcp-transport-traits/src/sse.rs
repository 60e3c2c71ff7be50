//! Server-Sent Events (SSE) model and incremental parser.
//!
//! ## SSE Format
//!
//! SSE messages consist of fields separated by newlines:
//! ```text
//! id: event-123
//! event: endpoint
//! data: /mcp/messages?session=abc
//!
//! ```
//!
//! Events are terminated by a blank line. An event without an `event:` field is a
//! `message` event.

/// Event name announcing the POST endpoint.
pub(crate) const ENDPOINT_EVENT: &str = "endpoint";

/// Event name carrying an encoded protocol message (also the default name).
pub(crate) const MESSAGE_EVENT: &str = "message";

/// A Server-Sent Event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Event ID for resumption support
    pub id: Option<String>,
    /// Event type (defaults to "message" if not specified)
    pub event: Option<String>,
    /// Event data (can be multiline)
    pub data: String,
    /// Retry interval in milliseconds (optional)
    pub retry: Option<u32>,
}

impl SseEvent {
    /// Create an unnamed (`message`) event.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: None,
            data: data.into(),
            retry: None,
        }
    }

    /// Create an `endpoint` event announcing where to POST.
    pub fn endpoint(uri: impl Into<String>) -> Self {
        Self::named(ENDPOINT_EVENT, uri)
    }

    /// Create an event with an explicit name.
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: Some(event.into()),
            data: data.into(),
            retry: None,
        }
    }

    /// The event name, with the SSE default applied.
    pub fn kind(&self) -> &str {
        self.event.as_deref().unwrap_or(MESSAGE_EVENT)
    }

    /// Returns `true` for the handshake `endpoint` event.
    pub fn is_endpoint(&self) -> bool {
        self.kind() == ENDPOINT_EVENT
    }

    /// Returns `true` for events carrying a protocol message.
    pub fn is_message(&self) -> bool {
        self.kind() == MESSAGE_EVENT
    }
}

/// SSE encoder for converting events to wire format.
#[derive(Debug)]
pub struct SseEncoder;

impl SseEncoder {
    /// Encode an SSE event to its wire form.
    pub fn encode(event: &SseEvent) -> String {
        let mut output = String::new();

        if let Some(ref id) = event.id {
            output.push_str("id: ");
            output.push_str(id);
            output.push('\n');
        }

        if let Some(ref event_type) = event.event {
            output.push_str("event: ");
            output.push_str(event_type);
            output.push('\n');
        }

        if let Some(retry) = event.retry {
            output.push_str("retry: ");
            output.push_str(&retry.to_string());
            output.push('\n');
        }

        for line in event.data.lines() {
            output.push_str("data: ");
            output.push_str(line);
            output.push('\n');
        }

        output.push('\n');
        output
    }

    /// Encode a sequence of events into one body.
    pub fn encode_all<'a>(events: impl IntoIterator<Item = &'a SseEvent>) -> String {
        events.into_iter().map(Self::encode).collect()
    }
}

/// Incremental SSE parser.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8 sequences
/// split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    current_id: Option<String>,
    current_event: Option<String>,
    current_data: Vec<String>,
    current_retry: Option<u32>,
}

impl SseParser {
    /// Create a new SSE parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed data to the parser and extract any complete events.
    pub fn feed(&mut self, data: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(data);

        let mut events = Vec::new();

        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();

            if line.is_empty() {
                if let Some(event) = self.emit_event() {
                    events.push(event);
                }
            } else if line.starts_with(':') {
                // comment / keep-alive
            } else {
                let (field, value) = match line.find(':') {
                    Some(colon_pos) => {
                        let value = &line[colon_pos + 1..];
                        (&line[..colon_pos], value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line.as_str(), ""),
                };

                match field {
                    "id" => self.current_id = Some(value.to_string()),
                    "event" => self.current_event = Some(value.to_string()),
                    "data" => self.current_data.push(value.to_string()),
                    "retry" => {
                        if let Ok(ms) = value.parse() {
                            self.current_retry = Some(ms);
                        }
                    }
                    _ => {}
                }
            }
        }

        events
    }

    fn emit_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            self.current_id = None;
            self.current_event = None;
            self.current_retry = None;
            return None;
        }

        let event = SseEvent {
            id: self.current_id.take(),
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
            retry: self.current_retry.take(),
        };
        self.current_data.clear();

        Some(event)
    }
}
