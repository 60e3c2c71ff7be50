//! Capability traits consumed by the client transport.
//!
//! The transport owns the protocol state machine; everything that touches the network,
//! credentials, or the message schema sits behind one of these traits.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use http::HeaderMap;
use url::Url;

use crate::error::TransportResult;
use crate::message::JsonRpcMessage;
use crate::sse::SseEvent;
use crate::types::HttpResponse;

/// A server-push event stream. Dropping it cancels the underlying request.
pub type EventStream = BoxStream<'static, TransportResult<SseEvent>>;

/// An opened event stream together with the headers of the response that opened it.
pub struct OpenedStream {
    /// Response headers. The server may assign a session id here.
    pub headers: HeaderMap,
    /// Parsed events
    pub events: EventStream,
}

impl OpenedStream {
    /// Wrap a stream that came without interesting headers.
    pub fn new(events: EventStream) -> Self {
        Self {
            headers: HeaderMap::new(),
            events,
        }
    }
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Issues HTTP requests on behalf of the transport.
///
/// Implementations report non-2xx statuses on `open_event_stream` as
/// `TransportError::Protocol { status: Some(..), .. }` so the transport can recognize
/// auth challenges. `post` returns every status as a response.
#[async_trait]
pub trait HttpCapability: Send + Sync + std::fmt::Debug {
    /// POST `body` to `url` and read the whole response.
    async fn post(&self, url: &Url, headers: HeaderMap, body: Bytes)
    -> TransportResult<HttpResponse>;

    /// Open a long-lived GET stream of server-sent events.
    async fn open_event_stream(&self, url: &Url, headers: HeaderMap)
    -> TransportResult<OpenedStream>;
}

/// Result of an authorization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A usable token is now available.
    Authorized,
    /// No token could be obtained. The provider may have started an external flow.
    Denied,
}

/// What the credential provider is authorizing for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// The configured target URL.
    pub server_url: Url,
}

/// Supplies and refreshes bearer tokens.
///
/// Token storage belongs to the provider; the transport only reads the current token
/// for each outgoing operation.
#[async_trait]
pub trait CredentialProvider: Send + Sync + std::fmt::Debug {
    /// The current bearer token, if any.
    async fn current_token(&self) -> Option<String>;

    /// Refresh or obtain a token. May start an external authorization redirect and
    /// return [`AuthOutcome::Denied`] until it completes.
    async fn authorize(&self, context: &AuthContext) -> TransportResult<AuthOutcome>;

    /// Exchange an authorization code from the external flow for a token.
    async fn exchange_authorization_code(
        &self,
        context: &AuthContext,
        code: &str,
    ) -> TransportResult<AuthOutcome>;
}

/// Encodes and decodes protocol messages.
pub trait MessageCodec: Send + Sync + std::fmt::Debug {
    /// Decode and structurally validate one message.
    fn decode(&self, bytes: &[u8]) -> TransportResult<JsonRpcMessage>;

    /// Encode one message.
    fn encode(&self, message: &JsonRpcMessage) -> TransportResult<Bytes>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Traits must stay object safe
    fn _test_http_object(_h: &dyn HttpCapability) {}
    fn _test_credentials_object(_c: &dyn CredentialProvider) {}
    fn _test_codec_object(_c: &dyn MessageCodec) {}
}
