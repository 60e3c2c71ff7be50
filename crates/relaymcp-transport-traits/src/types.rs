//! Core transport types.

use std::fmt;

use bytes::Bytes;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// How replies reach the client. Fixed for the lifetime of a transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Replies and notifications arrive over a long-lived server-push stream.
    #[default]
    Streaming,
    /// Each request's reply is the body of its POST response.
    Direct,
}

impl TransportMode {
    /// The `Accept` header value advertising this mode's reply format.
    pub const fn accept_header(self) -> &'static str {
        match self {
            Self::Streaming => "text/event-stream",
            Self::Direct => "application/json",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming => write!(f, "streaming"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// Represents the current state of a transport connection.
///
/// `Idle → Connecting → Authenticating → Open → Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Constructed, `start()` not yet called.
    #[default]
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Re-authenticating after an auth challenge.
    Authenticating,
    /// Endpoint known, messages may be sent.
    Open,
    /// Shut down. No further callbacks fire.
    Closed,
}

impl ConnectionState {
    /// Returns `true` once the transport has shut down.
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a response with a status and body and no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
