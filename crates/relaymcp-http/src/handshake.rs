//! Connection establishment and the event stream reader.
//!
//! The handshake opens the stream, waits for the `endpoint` event, then hands the
//! rest of the stream to a background reader that routes messages until the stream
//! ends or the transport closes.

use std::sync::Arc;

use futures::StreamExt;
use relaymcp_transport_traits::{
    ConnectionState, EventStream, OpenedStream, SseEvent, TransportError, TransportResult,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::auth::{AuthPhase, with_challenge_retry};
use crate::transport::Inner;

/// Open the stream and wait for the endpoint. On success the reader task owns the stream.
pub(crate) async fn establish(inner: &Arc<Inner>) -> TransportResult<()> {
    let opened = with_challenge_retry(
        inner.config.auth_provider.as_ref(),
        &inner.auth_context,
        AuthPhase::Handshake,
        move || open_stream(inner),
        || inner.set_state(ConnectionState::Authenticating),
    )
    .await
    .map_err(handshake_error)?;

    inner.session.observe(&opened.headers);
    let mut events = opened.events;

    loop {
        let next = tokio::select! {
            _ = inner.cancel.cancelled() => return Err(TransportError::Closed),
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) if event.is_endpoint() => {
                let endpoint = resolve_endpoint(&inner.config.url, &event.data)?;
                info!("Discovered message endpoint: {}", endpoint);
                inner.set_endpoint(endpoint);
                break;
            }
            Some(Ok(event)) => handle_event(inner, event),
            Some(Err(err)) => return Err(handshake_error(err)),
            None => {
                return Err(TransportError::protocol(
                    "event stream ended before the endpoint was announced",
                ));
            }
        }
    }

    if inner.is_closed() {
        return Err(TransportError::Closed);
    }
    inner.set_state(ConnectionState::Open);

    let reader = tokio::spawn(read_events(Arc::clone(inner), events));
    *inner.reader.lock() = Some(reader);
    Ok(())
}

/// Errors leaving the handshake are auth, origin, close or protocol errors. Anything
/// else from the stream is wrapped as a protocol error carrying its message.
fn handshake_error(err: TransportError) -> TransportError {
    match err {
        TransportError::Protocol { .. }
        | TransportError::AuthRequired(_)
        | TransportError::Unauthorized(_)
        | TransportError::EndpointOriginMismatch { .. }
        | TransportError::Closed => err,
        other => {
            warn!("SSE connection failed: {}", other);
            TransportError::protocol(other.to_string())
        }
    }
}

async fn open_stream(inner: &Inner) -> TransportResult<OpenedStream> {
    inner.set_state(ConnectionState::Connecting);
    let headers = inner.stream_headers().await;
    info!("Starting SSE connection to {}", inner.config.url);

    tokio::select! {
        _ = inner.cancel.cancelled() => Err(TransportError::Closed),
        opened = inner.http.open_event_stream(&inner.config.url, headers) => opened,
    }
}

/// Route everything after the endpoint announcement.
async fn read_events(inner: Arc<Inner>, mut events: EventStream) {
    loop {
        let next = tokio::select! {
            _ = inner.cancel.cancelled() => {
                debug!("Event stream reader cancelled");
                return;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) if event.is_endpoint() => {
                match resolve_endpoint(&inner.config.url, &event.data) {
                    Ok(endpoint) => {
                        info!("Message endpoint updated: {}", endpoint);
                        inner.set_endpoint(endpoint);
                    }
                    Err(err) => {
                        error!("Rejected endpoint update: {}", err);
                        inner.fail(err);
                        return;
                    }
                }
            }
            Some(Ok(event)) => handle_event(&inner, event),
            Some(Err(err)) => {
                warn!("Error reading SSE stream: {}", err);
                inner.lose_stream(err);
                return;
            }
            None => {
                warn!("SSE stream ended");
                inner.lose_stream(TransportError::ConnectionLost(
                    "event stream ended".to_string(),
                ));
                return;
            }
        }
    }
}

/// Handle a non-endpoint event. Decode failures are reported and otherwise ignored.
fn handle_event(inner: &Inner, event: SseEvent) {
    if !event.is_message() {
        debug!("Ignoring unknown event type: {}", event.kind());
        return;
    }
    if event.data.trim().is_empty() {
        debug!("Skipping empty SSE event");
        return;
    }

    match inner.codec.decode(event.data.as_bytes()) {
        Ok(message) => {
            debug!("Received SSE message");
            inner.dispatch_inbound(message);
        }
        Err(err) => {
            warn!("Failed to decode SSE message: {}", err);
            inner.emit_error(err);
        }
    }
}

/// Resolve an endpoint announcement against the configured target.
///
/// The payload is either a URL (absolute or relative) or a JSON object `{"uri": ...}`.
/// The result must share the target's origin.
pub(crate) fn resolve_endpoint(target: &Url, data: &str) -> TransportResult<Url> {
    let data = data.trim();
    let uri = if data.starts_with('{') {
        let payload: Value = serde_json::from_str(data)
            .map_err(|e| TransportError::protocol(format!("Invalid endpoint JSON: {e}")))?;
        payload
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::protocol("Endpoint event missing 'uri' field"))?
            .to_string()
    } else {
        data.to_string()
    };

    if uri.is_empty() {
        return Err(TransportError::protocol("Endpoint event carried no URI"));
    }

    let endpoint = target
        .join(&uri)
        .map_err(|e| TransportError::protocol(format!("Invalid endpoint URI '{uri}': {e}")))?;

    let expected = target.origin();
    let actual = endpoint.origin();
    if expected != actual {
        return Err(TransportError::EndpointOriginMismatch {
            expected: expected.ascii_serialization(),
            actual: actual.ascii_serialization(),
        });
    }

    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse("https://a.example/mcp").unwrap()
    }

    #[test]
    fn test_relative_endpoint() {
        let endpoint = resolve_endpoint(&target(), "/messages?session=abc").unwrap();
        assert_eq!(endpoint.as_str(), "https://a.example/messages?session=abc");

        let endpoint = resolve_endpoint(&target(), "messages").unwrap();
        assert_eq!(endpoint.as_str(), "https://a.example/messages");
    }

    #[test]
    fn test_json_endpoint_payload() {
        let endpoint =
            resolve_endpoint(&target(), r#"{"uri":"https://a.example/mcp/post"}"#).unwrap();
        assert_eq!(endpoint.as_str(), "https://a.example/mcp/post");

        assert!(matches!(
            resolve_endpoint(&target(), r#"{"url":"/x"}"#),
            Err(TransportError::Protocol { .. })
        ));
    }

    #[test]
    fn test_cross_origin_endpoint_rejected() {
        let err = resolve_endpoint(&target(), "https://b.example/ep").unwrap_err();
        assert_eq!(
            err,
            TransportError::EndpointOriginMismatch {
                expected: "https://a.example".to_string(),
                actual: "https://b.example".to_string(),
            }
        );
    }

    #[test]
    fn test_port_and_scheme_are_part_of_origin() {
        assert!(resolve_endpoint(&target(), "https://a.example:8443/ep").is_err());
        assert!(resolve_endpoint(&target(), "http://a.example/ep").is_err());
        assert!(resolve_endpoint(&target(), "https://a.example:443/ep").is_ok());
    }

    #[test]
    fn test_handshake_error_wraps_stream_failures() {
        let refused = TransportError::ConnectionFailed("refused".to_string());
        assert_eq!(
            handshake_error(refused.clone()),
            TransportError::protocol(refused.to_string())
        );

        let status = TransportError::http_status(503, "unavailable");
        assert_eq!(handshake_error(status.clone()), status);
        assert_eq!(handshake_error(TransportError::Closed), TransportError::Closed);
        assert!(matches!(
            handshake_error(TransportError::AuthRequired("x".to_string())),
            TransportError::AuthRequired(_)
        ));
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        assert!(resolve_endpoint(&target(), "  ").is_err());
    }
}
