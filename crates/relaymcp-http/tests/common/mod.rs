//! Common test utilities for integration tests
//!
//! A scripted HTTP capability and credential provider for driving the transport state
//! machine without a network, plus small helpers for collecting callbacks.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::HeaderMap;
use parking_lot::Mutex;
use relaymcp_http::{StreamableClientConfig, StreamableClientTransport};
use relaymcp_transport_traits::{
    AuthContext, AuthOutcome, CredentialProvider, HttpCapability, HttpResponse, JsonCodec,
    JsonRpcMessage, OpenedStream, SseEvent, TransportError, TransportMode, TransportResult,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use url::Url;

pub const TARGET: &str = "https://a.example/mcp";

/// Install a test-writer subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One request seen by [`ScriptedHttp`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn message(&self) -> JsonRpcMessage {
        serde_json::from_slice(&self.body).expect("recorded body is a message")
    }
}

/// Sender side of a scripted event stream.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    tx: mpsc::UnboundedSender<TransportResult<SseEvent>>,
}

impl StreamHandle {
    pub fn event(&self, event: SseEvent) {
        let _ = self.tx.send(Ok(event));
    }

    pub fn endpoint(&self, uri: &str) {
        self.event(SseEvent::endpoint(uri));
    }

    pub fn message(&self, message: &JsonRpcMessage) {
        self.event(SseEvent::message(serde_json::to_string(message).unwrap()));
    }

    pub fn fail(&self, err: TransportError) {
        let _ = self.tx.send(Err(err));
    }

    /// Returns `true` once the transport dropped its end of the stream.
    pub fn is_dropped(&self) -> bool {
        self.tx.is_closed()
    }
}

/// HTTP capability that replays queued results and records every request.
///
/// Unscripted POSTs answer `202 Accepted`; unscripted stream opens fail.
#[derive(Debug, Default)]
pub struct ScriptedHttp {
    posts: Mutex<VecDeque<TransportResult<HttpResponse>>>,
    streams: Mutex<VecDeque<TransportResult<OpenedStream>>>,
    recorded: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_post(&self, response: HttpResponse) {
        self.posts.lock().push_back(Ok(response));
    }

    pub fn push_post_error(&self, err: TransportError) {
        self.posts.lock().push_back(Err(err));
    }

    /// Queue a stream whose response carried `headers`.
    pub fn push_stream_with_headers(&self, headers: HeaderMap) -> StreamHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().push_back(Ok(OpenedStream {
            headers,
            events: UnboundedReceiverStream::new(rx).boxed(),
        }));
        StreamHandle { tx }
    }

    pub fn push_stream(&self) -> StreamHandle {
        self.push_stream_with_headers(HeaderMap::new())
    }

    pub fn push_stream_error(&self, err: TransportError) {
        self.streams.lock().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().clone()
    }

    pub fn requests_with(&self, method: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    fn record(&self, method: &'static str, url: &Url, headers: HeaderMap, body: Bytes) {
        self.recorded.lock().push(RecordedRequest {
            method,
            url: url.clone(),
            headers,
            body,
        });
    }
}

#[async_trait]
impl HttpCapability for ScriptedHttp {
    async fn post(
        &self,
        url: &Url,
        headers: HeaderMap,
        body: Bytes,
    ) -> TransportResult<HttpResponse> {
        self.record("POST", url, headers, body);
        self.posts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(202, "")))
    }

    async fn open_event_stream(
        &self,
        url: &Url,
        headers: HeaderMap,
    ) -> TransportResult<OpenedStream> {
        self.record("GET", url, headers, Bytes::new());
        self.streams.lock().pop_front().unwrap_or_else(|| {
            Err(TransportError::ConnectionFailed(
                "no stream scripted".to_string(),
            ))
        })
    }
}

/// Credential provider with a fixed authorize outcome.
///
/// An authorized refresh swaps the current token for `refreshed_token`.
#[derive(Debug)]
pub struct ScriptedCredentials {
    token: Mutex<Option<String>>,
    refreshed_token: String,
    outcome: AuthOutcome,
    authorize_calls: AtomicUsize,
    codes: Mutex<Vec<String>>,
}

impl ScriptedCredentials {
    pub fn new(token: Option<&str>, outcome: AuthOutcome) -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(token.map(str::to_string)),
            refreshed_token: "refreshed-token".to_string(),
            outcome,
            authorize_calls: AtomicUsize::new(0),
            codes: Mutex::new(Vec::new()),
        })
    }

    pub fn authorize_calls(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    pub fn exchanged_codes(&self) -> Vec<String> {
        self.codes.lock().clone()
    }
}

#[async_trait]
impl CredentialProvider for ScriptedCredentials {
    async fn current_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    async fn authorize(&self, _context: &AuthContext) -> TransportResult<AuthOutcome> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        if self.outcome == AuthOutcome::Authorized {
            *self.token.lock() = Some(self.refreshed_token.clone());
        }
        Ok(self.outcome)
    }

    async fn exchange_authorization_code(
        &self,
        _context: &AuthContext,
        code: &str,
    ) -> TransportResult<AuthOutcome> {
        self.codes.lock().push(code.to_string());
        if self.outcome == AuthOutcome::Authorized {
            *self.token.lock() = Some(self.refreshed_token.clone());
        }
        Ok(self.outcome)
    }
}

/// Everything the transport reported through its handlers.
#[derive(Debug, Default)]
pub struct Callbacks {
    pub messages: Mutex<Vec<JsonRpcMessage>>,
    pub errors: Mutex<Vec<TransportError>>,
    pub closes: AtomicUsize,
}

impl Callbacks {
    /// Register handlers on `transport` that record into a fresh collector.
    pub fn attach(transport: &StreamableClientTransport) -> Arc<Self> {
        let callbacks = Arc::new(Self::default());

        let sink = Arc::clone(&callbacks);
        transport.on_message(move |m| sink.messages.lock().push(m));
        let sink = Arc::clone(&callbacks);
        transport.on_error(move |e| sink.errors.lock().push(e));
        let sink = Arc::clone(&callbacks);
        transport.on_close(move || {
            sink.closes.fetch_add(1, Ordering::SeqCst);
        });

        callbacks
    }

    pub fn messages(&self) -> Vec<JsonRpcMessage> {
        self.messages.lock().clone()
    }

    pub fn errors(&self) -> Vec<TransportError> {
        self.errors.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Transport over scripted capabilities.
pub fn scripted_transport(
    mode: TransportMode,
    http: &Arc<ScriptedHttp>,
    provider: Option<Arc<ScriptedCredentials>>,
) -> StreamableClientTransport {
    let mut builder = StreamableClientConfig::builder(TARGET).mode(mode);
    if let Some(provider) = provider {
        builder = builder.auth_provider(provider);
    }
    let config = builder.build().unwrap();
    StreamableClientTransport::with_capabilities(config, http.clone(), Arc::new(JsonCodec))
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Let spawned tasks run without asserting anything.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
