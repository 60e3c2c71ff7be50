//! Streamable client transport controller and the message send path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use parking_lot::{Mutex, RwLock};
use relaymcp_transport_traits::{
    AuthContext, AuthOutcome, ConnectionState, HttpCapability, HttpResponse, JsonCodec,
    JsonRpcMessage, MessageCodec, TransportError, TransportMode, TransportResult,
    validate_request_size, validate_response_size,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::auth::{AuthPhase, with_challenge_retry};
use crate::client::ReqwestHttpClient;
use crate::config::StreamableClientConfig;
use crate::handshake;
use crate::pending::PendingRequests;
use crate::session::SessionManager;

/// Handler for inbound messages that are not claimed by a pending request.
pub type MessageHandler = Arc<dyn Fn(JsonRpcMessage) + Send + Sync>;

/// Handler for errors observed by the transport.
pub type ErrorHandler = Arc<dyn Fn(TransportError) + Send + Sync>;

/// Handler fired once when the transport closes.
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Handlers {
    on_message: Option<MessageHandler>,
    on_error: Option<ErrorHandler>,
    on_close: Option<CloseHandler>,
}

/// State shared between the controller, the handshake and the stream reader task.
pub(crate) struct Inner {
    pub(crate) config: StreamableClientConfig,
    pub(crate) http: Arc<dyn HttpCapability>,
    pub(crate) codec: Arc<dyn MessageCodec>,
    pub(crate) session: SessionManager,
    pub(crate) pending: PendingRequests,
    pub(crate) cancel: CancellationToken,
    pub(crate) auth_context: AuthContext,
    pub(crate) reader: Mutex<Option<JoinHandle<()>>>,
    pub(crate) stream_lost: AtomicBool,
    state: RwLock<ConnectionState>,
    endpoint: RwLock<Option<Url>>,
    handlers: RwLock<Handlers>,
    closed: AtomicBool,
    started: AtomicBool,
}

impl Inner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Move to `next` unless the transport has already closed.
    pub(crate) fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if state.is_closed() || *state == next {
            return;
        }
        debug!("Connection state {} -> {}", *state, next);
        *state = next;
    }

    pub(crate) fn set_endpoint(&self, endpoint: Url) {
        let mut current = self.endpoint.write();
        if !self.is_closed() {
            *current = Some(endpoint);
        }
    }

    pub(crate) fn emit_message(&self, message: JsonRpcMessage) {
        if self.is_closed() {
            debug!("Dropping inbound message received after close");
            return;
        }
        let handler = self.handlers.read().on_message.clone();
        match handler {
            Some(handler) => handler(message),
            None => debug!("No message handler registered, dropping inbound message"),
        }
    }

    pub(crate) fn emit_error(&self, err: TransportError) {
        if self.is_closed() {
            return;
        }
        let handler = self.handlers.read().on_error.clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }

    /// Route an inbound message: a live waiter for its id takes it, otherwise the
    /// message handler does.
    pub(crate) fn dispatch_inbound(&self, message: JsonRpcMessage) {
        if let Some(key) = message.id().map(|id| id.key()) {
            if self.pending.resolve(&key, message.clone()) {
                return;
            }
            debug!("No pending request for id {}, delivering to message handler", key);
        }
        self.emit_message(message);
    }

    /// Report an unrecoverable error and close.
    pub(crate) fn fail(&self, err: TransportError) {
        if self.is_closed() {
            return;
        }
        error!("Transport failed: {}", err);
        self.emit_error(err);
        self.shutdown();
    }

    /// The event stream is gone. Waiters for streamed replies can never complete.
    pub(crate) fn lose_stream(&self, err: TransportError) {
        if self.is_closed() {
            return;
        }
        self.stream_lost.store(true, Ordering::SeqCst);
        self.emit_error(err.clone());
        self.pending.fail_all(&err);
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Disconnecting");
        self.cancel.cancel();
        *self.state.write() = ConnectionState::Closed;
        *self.endpoint.write() = None;
        self.session.clear();
        self.pending.fail_all(&TransportError::Closed);
        // The reader exits on the cancelled token; it may be the caller, so never join it.
        drop(self.reader.lock().take());

        let handler = self.handlers.read().on_close.clone();
        if let Some(handler) = handler {
            handler();
        }
        info!("Disconnected");
    }

    async fn common_headers(
        &self,
        accept: &'static str,
        extra: Option<&HashMap<String, String>>,
    ) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(provider) = &self.config.auth_provider
            && let Some(token) = provider.current_token().await
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}"))
        {
            headers.insert(header::AUTHORIZATION, value);
        }

        self.session.apply(&mut headers);

        // Skip invalid custom headers rather than fail the request
        for (key, value) in extra.into_iter().flatten() {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Skipping invalid custom header '{}'", key),
            }
        }

        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        headers
    }

    pub(crate) async fn stream_headers(&self) -> HeaderMap {
        let extra = self.config.stream_init.as_ref().map(|c| &c.headers);
        self.common_headers(TransportMode::Streaming.accept_header(), extra)
            .await
    }

    async fn request_headers(&self) -> HeaderMap {
        let extra = self.config.request_init.as_ref().map(|c| &c.headers);
        let mut headers = self
            .common_headers(self.config.mode.accept_header(), extra)
            .await;
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers
    }

    async fn post_once(&self, endpoint: &Url, body: Bytes) -> TransportResult<HttpResponse> {
        let headers = self.request_headers().await;
        debug!("Sending message via HTTP POST");

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransportError::Closed),
            response = self.http.post(endpoint, headers, body) => response?,
        };

        // The session id counts even on error responses
        self.session.observe(&response.headers);

        if response.is_success() {
            return Ok(response);
        }

        let text = response.text();
        let message = if text.is_empty() {
            StatusCode::from_u16(response.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("request failed")
                .to_string()
        } else {
            text
        };
        warn!("POST to {} failed with HTTP {}", endpoint, response.status);
        Err(TransportError::http_status(response.status, message))
    }

    async fn deliver(&self, endpoint: &Url, message: &JsonRpcMessage) -> TransportResult<()> {
        let body = self.codec.encode(message)?;
        validate_request_size(body.len(), &self.config.limits)?;

        let result = with_challenge_retry(
            self.config.auth_provider.as_ref(),
            &self.auth_context,
            AuthPhase::Request,
            move || self.post_once(endpoint, body.clone()),
            || self.set_state(ConnectionState::Authenticating),
        )
        .await;

        if *self.state.read() == ConnectionState::Authenticating {
            self.set_state(ConnectionState::Open);
        }
        let response = result?;

        if response.status == StatusCode::ACCEPTED.as_u16() {
            debug!("Received HTTP 202 Accepted (no response body expected)");
        }

        if self.config.mode == TransportMode::Direct && message.expects_reply() {
            if response.body.is_empty() {
                return Err(TransportError::Decode(format!(
                    "empty reply body (HTTP {})",
                    response.status
                )));
            }
            validate_response_size(response.body.len(), &self.config.limits)?;
            let reply = self.codec.decode(&response.body)?;
            debug!("Received JSON response from POST");
            self.dispatch_inbound(reply);
        }

        Ok(())
    }

    async fn send(&self, message: &JsonRpcMessage) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let endpoint = self
            .endpoint
            .read()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        match self.deliver(&endpoint, message).await {
            Ok(()) => {
                debug!("Message sent successfully");
                Ok(())
            }
            Err(TransportError::Closed) => Err(TransportError::Closed),
            Err(err) if err.is_fatal() => {
                self.fail(err.clone());
                Err(err)
            }
            Err(err) => {
                self.emit_error(err.clone());
                Err(err)
            }
        }
    }
}

/// Streamable HTTP client transport.
///
/// Owns the connection state machine
/// (`Idle → Connecting → Authenticating → Open → Closed`), the session id, and the
/// table of requests awaiting a reply. All methods take `&self`; share it with an
/// `Arc` to send from several tasks.
pub struct StreamableClientTransport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StreamableClientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableClientTransport")
            .field("url", &self.inner.config.url.as_str())
            .field("mode", &self.inner.config.mode)
            .field("state", &*self.inner.state.read())
            .finish()
    }
}

impl StreamableClientTransport {
    /// Create a transport backed by `reqwest` and the JSON codec.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if the HTTP client cannot be built.
    pub fn new(config: StreamableClientConfig) -> TransportResult<Self> {
        let http = Arc::new(ReqwestHttpClient::new(&config)?);
        Ok(Self::with_capabilities(config, http, Arc::new(JsonCodec)))
    }

    /// Create a transport over caller-supplied capabilities.
    pub fn with_capabilities(
        config: StreamableClientConfig,
        http: Arc<dyn HttpCapability>,
        codec: Arc<dyn MessageCodec>,
    ) -> Self {
        let auth_context = AuthContext {
            server_url: config.url.clone(),
        };
        Self {
            inner: Arc::new(Inner {
                config,
                http,
                codec,
                session: SessionManager::new(),
                pending: PendingRequests::new(),
                cancel: CancellationToken::new(),
                auth_context,
                reader: Mutex::new(None),
                stream_lost: AtomicBool::new(false),
                state: RwLock::new(ConnectionState::Idle),
                endpoint: RwLock::new(None),
                handlers: RwLock::new(Handlers::default()),
                closed: AtomicBool::new(false),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Set the inbound message handler, replacing any previous one.
    pub fn on_message(&self, handler: impl Fn(JsonRpcMessage) + Send + Sync + 'static) {
        self.inner.handlers.write().on_message = Some(Arc::new(handler));
    }

    /// Set the error handler, replacing any previous one.
    pub fn on_error(&self, handler: impl Fn(TransportError) + Send + Sync + 'static) {
        self.inner.handlers.write().on_error = Some(Arc::new(handler));
    }

    /// Set the close handler, replacing any previous one.
    pub fn on_close(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.inner.handlers.write().on_close = Some(Arc::new(handler));
    }

    /// Establish the message endpoint.
    ///
    /// In direct mode the configured URL is the endpoint and this returns at once. In
    /// streaming mode the event stream is opened and this resolves when the server
    /// announces the endpoint; it may only be called once.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted` on a second streaming start, `AuthRequired` when the stream
    /// is rejected and credentials cannot be refreshed, `EndpointOriginMismatch` when
    /// the endpoint is on another origin, and `Protocol` for other stream failures.
    /// Every error except `AlreadyStarted` closes the transport.
    pub async fn start(&self) -> TransportResult<()> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(TransportError::Closed);
        }

        match inner.config.mode {
            TransportMode::Direct => {
                if *inner.state.read() == ConnectionState::Idle {
                    inner.set_state(ConnectionState::Connecting);
                }
                inner.set_endpoint(inner.config.url.clone());
                inner.set_state(ConnectionState::Open);
                info!("Connected to {} (direct mode)", inner.config.url);
                Ok(())
            }
            TransportMode::Streaming => {
                if inner.started.swap(true, Ordering::SeqCst) {
                    return Err(TransportError::AlreadyStarted);
                }
                info!("Connecting to {}", inner.config.url);
                inner.set_state(ConnectionState::Connecting);

                match handshake::establish(inner).await {
                    Ok(()) => {
                        info!("Connected successfully");
                        Ok(())
                    }
                    Err(TransportError::Closed) => Err(TransportError::Closed),
                    Err(err) => {
                        inner.fail(err.clone());
                        Err(err)
                    }
                }
            }
        }
    }

    /// Send one message to the endpoint.
    ///
    /// In direct mode a message carrying an id gets its reply from the POST body, and
    /// that reply goes to the message handler whatever id it carries. In streaming mode
    /// replies arrive on the event stream.
    ///
    /// Failures are reported to the error handler and returned. A 401 that survives one
    /// re-authorization closes the transport.
    ///
    /// # Errors
    ///
    /// - `Closed` after close, `NotConnected` before the endpoint is known (neither is
    ///   reported to the error handler)
    /// - `RequestTooLarge`, `ResponseTooLarge` and `Decode` for size and codec faults
    /// - `Protocol` with the status and body text for a non-2xx response
    /// - `Unauthorized` when re-authorization fails or the retry is rejected
    /// - `ConnectionFailed` for network faults
    pub async fn send(&self, message: JsonRpcMessage) -> TransportResult<()> {
        self.inner.send(&message).await
    }

    /// Send a request and wait for the reply with the same id.
    ///
    /// A correlated reply is handed to the caller instead of the message handler. In
    /// direct mode a reply carrying another id still goes to the message handler and this
    /// fails with a `Protocol` error.
    ///
    /// # Errors
    ///
    /// Everything [`send`](Self::send) returns, plus `Protocol` for a non-request message
    /// or an unanswered direct request, `DuplicateRequestId` while the id is still
    /// waiting, `ConnectionLost` once the event stream is gone, and `Closed` when the
    /// transport closes before the reply arrives.
    pub async fn request(&self, message: JsonRpcMessage) -> TransportResult<JsonRpcMessage> {
        let JsonRpcMessage::Request(request) = &message else {
            return Err(TransportError::protocol(
                "only requests can wait for a reply",
            ));
        };
        let id = request.id.clone();
        let inner = &self.inner;

        let mut reply = inner.pending.register(&id)?;
        if inner.config.mode == TransportMode::Streaming
            && inner.stream_lost.load(Ordering::SeqCst)
        {
            inner.pending.cancel(reply.key());
            return Err(TransportError::ConnectionLost(
                "event stream is no longer open".to_string(),
            ));
        }

        if let Err(err) = inner.send(&message).await {
            inner.pending.cancel(reply.key());
            return Err(err);
        }

        match inner.config.mode {
            TransportMode::Streaming => reply.wait().await,
            TransportMode::Direct => match reply.try_take() {
                Some(result) => result,
                None => {
                    inner.pending.cancel(reply.key());
                    Err(TransportError::protocol(format!(
                        "reply did not answer request {id}"
                    )))
                }
            },
        }
    }

    /// Close the transport. Idempotent.
    ///
    /// Cancels the stream and every in-flight POST, fails waiting requests with
    /// `Closed`, and fires the close handler once. No other handler fires afterwards.
    pub async fn close(&self) {
        self.inner.shutdown();
    }

    /// Finish an external authorization flow with the code it produced.
    ///
    /// # Errors
    ///
    /// `AuthRequired` without a credential provider, `Unauthorized` when the provider
    /// rejects the code, or whatever error the provider itself returns.
    pub async fn complete_external_auth(&self, code: &str) -> TransportResult<()> {
        let Some(provider) = &self.inner.config.auth_provider else {
            return Err(TransportError::AuthRequired(
                "no credential provider configured".to_string(),
            ));
        };

        match provider
            .exchange_authorization_code(&self.inner.auth_context, code)
            .await?
        {
            AuthOutcome::Authorized => {
                info!("External authorization completed");
                Ok(())
            }
            AuthOutcome::Denied => Err(TransportError::Unauthorized(
                "failed to authorize".to_string(),
            )),
        }
    }

    /// Session id most recently issued by the server.
    pub fn current_session_id(&self) -> Option<String> {
        self.inner.session.current()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Endpoint messages are posted to, once known.
    pub fn endpoint(&self) -> Option<Url> {
        self.inner.endpoint.read().clone()
    }

    /// Reply delivery mode.
    pub fn mode(&self) -> TransportMode {
        self.inner.config.mode
    }

    /// Number of requests waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }
}

impl Drop for StreamableClientTransport {
    fn drop(&mut self) {
        // Stop the reader task; it holds its own reference to the shared state.
        self.inner.cancel.cancel();
    }
}
