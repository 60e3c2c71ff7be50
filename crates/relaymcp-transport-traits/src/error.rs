//! Transport error types.

use thiserror::Error;

use crate::config::LimitsConfig;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// HTTP status that signals an authentication challenge.
const UNAUTHORIZED_STATUS: u16 = 401;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// A message was sent before the handshake established a POST endpoint.
    #[error("Not connected: the handshake has not completed")]
    NotConnected,

    /// `start()` was called a second time on a streaming transport.
    #[error(
        "Transport already started. Each transport instance performs its handshake exactly once; \
         construct a new transport to reconnect"
    )]
    AlreadyStarted,

    /// Authentication is required and could not be obtained.
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// The server kept rejecting credentials after one re-authentication attempt.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The endpoint announced by the server lives on a different origin than the target.
    #[error("Endpoint origin does not match connection origin: expected {expected}, got {actual}")]
    EndpointOriginMismatch {
        /// Origin of the configured target URL
        expected: String,
        /// Origin of the announced endpoint
        actual: String,
    },

    /// An inbound payload could not be decoded into a protocol message.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The server answered with an error status, or broke the transport protocol.
    #[error("Protocol error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Protocol {
        /// HTTP status, when the failure came from a response
        status: Option<u16>,
        /// Status text or response body
        message: String,
    },

    /// The transport was closed while the operation was outstanding.
    #[error("Transport closed")]
    Closed,

    /// Failed to reach the remote endpoint.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The event stream ended or broke after the handshake.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Failed to serialize an outgoing message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A reply waiter is already registered for this request id.
    #[error("Request id {0} already has a pending reply")]
    DuplicateRequestId(String),

    /// Request size exceeds the configured maximum limit.
    #[error(
        "Request size ({size} bytes) exceeds maximum allowed ({max} bytes). \
         If this is expected, increase the limit with \
         `LimitsConfig {{ max_request_size: Some({}) }}` or use `LimitsConfig::unlimited()`",
        .size
    )]
    RequestTooLarge {
        /// The actual size of the request in bytes
        size: usize,
        /// The maximum allowed size in bytes
        max: usize,
    },

    /// Response size exceeds the configured maximum limit.
    #[error(
        "Response size ({size} bytes) exceeds maximum allowed ({max} bytes). \
         If this is expected, increase the limit with \
         `LimitsConfig {{ max_response_size: Some({}) }}` or use `LimitsConfig::unlimited()`",
        .size
    )]
    ResponseTooLarge {
        /// The actual size of the response in bytes
        size: usize,
        /// The maximum allowed size in bytes
        max: usize,
    },
}

impl TransportError {
    /// Creates a protocol error from an HTTP status and body text.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::Protocol {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates a protocol error that is not tied to an HTTP status.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            status: None,
            message: message.into(),
        }
    }

    /// Returns `true` if this error is an authentication challenge (HTTP 401).
    pub fn is_auth_challenge(&self) -> bool {
        matches!(
            self,
            Self::Protocol {
                status: Some(UNAUTHORIZED_STATUS),
                ..
            }
        )
    }

    /// Returns `true` if the error must tear the transport down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::EndpointOriginMismatch { .. } | Self::AuthRequired(_) | Self::Unauthorized(_)
        )
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigurationError(format!("Invalid URL: {err}"))
    }
}

/// Validates that a request message size does not exceed the configured limit.
///
/// # Arguments
///
/// * `size` - The size of the request payload in bytes
/// * `limits` - The limits configuration to check against
///
/// # Returns
///
/// `Ok(())` if the size is within limits or no limit is set, otherwise `Err(TransportError::RequestTooLarge)`
pub fn validate_request_size(size: usize, limits: &LimitsConfig) -> TransportResult<()> {
    if let Some(max_size) = limits.max_request_size
        && size > max_size
    {
        return Err(TransportError::RequestTooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}

/// Validates that a response message size does not exceed the configured limit.
///
/// # Arguments
///
/// * `size` - The size of the response payload in bytes
/// * `limits` - The limits configuration to check against
///
/// # Returns
///
/// `Ok(())` if the size is within limits or no limit is set, otherwise `Err(TransportError::ResponseTooLarge)`
pub fn validate_response_size(size: usize, limits: &LimitsConfig) -> TransportResult<()> {
    if let Some(max_size) = limits.max_response_size
        && size > max_size
    {
        return Err(TransportError::ResponseTooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}
