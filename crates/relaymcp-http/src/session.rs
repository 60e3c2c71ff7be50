//! Server-issued session id tracking.

use http::{HeaderMap, HeaderValue};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Header carrying the session id in both directions.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Holds the most recent session id seen on any response.
///
/// The id is never invented client-side and never compared against earlier values:
/// whatever the server sent last is what goes out next.
#[derive(Debug, Default)]
pub(crate) struct SessionManager {
    current: RwLock<Option<String>>,
}

impl SessionManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn current(&self) -> Option<String> {
        self.current.read().clone()
    }

    /// Record the session header from a response, if present.
    pub(crate) fn observe(&self, headers: &HeaderMap) {
        let Some(value) = headers.get(SESSION_ID_HEADER) else {
            return;
        };
        match value.to_str() {
            Ok("") => debug!("Ignoring empty {} header", SESSION_ID_HEADER),
            Ok(id) => {
                let mut current = self.current.write();
                if current.as_deref() != Some(id) {
                    debug!("Received session ID: {}", id);
                }
                *current = Some(id.to_string());
            }
            Err(_) => warn!("Ignoring non-ASCII {} header", SESSION_ID_HEADER),
        }
    }

    /// Attach the current session id to an outgoing request.
    pub(crate) fn apply(&self, headers: &mut HeaderMap) {
        if let Some(id) = self.current.read().as_deref()
            && let Ok(value) = HeaderValue::from_str(id)
        {
            headers.insert(SESSION_ID_HEADER, value);
        }
    }

    pub(crate) fn clear(&self) {
        *self.current.write() = None;
    }
}
