//! Streaming handshake over real HTTP against a mock server.

mod common;

use common::{Callbacks, init_tracing};
use relaymcp_http::{StreamableClientConfig, StreamableClientTransport};
use relaymcp_transport_traits::{
    ConnectionState, JsonRpcMessage, SseEncoder, SseEvent, TransportError,
};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_body(events: &[SseEvent]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .insert_header("mcp-session-id", "stream-session")
        .set_body_string(SseEncoder::encode_all(events))
}

#[tokio::test]
async fn test_handshake_then_post_to_announced_endpoint() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mcp"))
        .and(header("accept", "text/event-stream"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(sse_body(&[SseEvent::endpoint("/mcp/messages?sid=1")]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp/messages"))
        .and(header("mcp-session-id", "stream-session"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let config = StreamableClientConfig::builder(&format!("{}/mcp", server.uri()))
        .bearer_token("tok")
        .build()
        .unwrap();
    let transport = StreamableClientTransport::new(config).unwrap();

    assert_ok!(transport.start().await);
    assert_eq!(
        transport.endpoint().unwrap().as_str(),
        format!("{}/mcp/messages?sid=1", server.uri())
    );
    assert_eq!(
        transport.current_session_id().as_deref(),
        Some("stream-session")
    );

    assert_ok!(
        transport
            .send(JsonRpcMessage::notification("notifications/initialized", None))
            .await
    );
    transport.close().await;
}

#[tokio::test]
async fn test_cross_origin_endpoint_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(sse_body(&[SseEvent::endpoint("https://b.example/ep")]))
        .mount(&server)
        .await;

    let config = StreamableClientConfig::builder(&format!("{}/mcp", server.uri()))
        .build()
        .unwrap();
    let transport = StreamableClientTransport::new(config).unwrap();
    let callbacks = Callbacks::attach(&transport);

    let err = assert_err!(transport.start().await);

    assert!(matches!(err, TransportError::EndpointOriginMismatch { .. }));
    assert_eq!(transport.state(), ConnectionState::Closed);
    assert_eq!(callbacks.closes(), 1);
}

#[tokio::test]
async fn test_stream_rejected_without_provider_requires_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let config = StreamableClientConfig::builder(&format!("{}/mcp", server.uri()))
        .build()
        .unwrap();
    let transport = StreamableClientTransport::new(config).unwrap();

    let err = assert_err!(transport.start().await);
    assert!(matches!(err, TransportError::AuthRequired(_)));
}
