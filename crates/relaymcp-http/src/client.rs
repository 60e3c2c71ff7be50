//! `reqwest`-backed [`HttpCapability`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use http::{HeaderMap, HeaderValue, header};
use relaymcp_transport_traits::{
    HttpCapability, HttpResponse, OpenedStream, SseParser, TransportError, TransportResult,
};
use reqwest::Client as HttpClient;
use tracing::{debug, error};
use url::Url;

use crate::config::StreamableClientConfig;

/// HTTP capability over a shared `reqwest` client.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: HttpClient,
    request_timeout: Duration,
}

impl std::fmt::Debug for ReqwestHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestHttpClient")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ReqwestHttpClient {
    /// Build a client from the transport configuration.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if the TLS backend or client cannot be initialized.
    pub fn new(config: &StreamableClientConfig) -> TransportResult<Self> {
        // Must explicitly call use_rustls_tls() because cargo features are additive
        // and other dependencies may bring in native-tls.
        let mut builder = HttpClient::builder()
            .use_rustls_tls()
            .connect_timeout(config.connect_timeout);

        if let Some(ref user_agent) = config.user_agent {
            builder = builder.user_agent(user_agent);
        }

        let client = builder.build().map_err(|e| {
            TransportError::ConfigurationError(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self::from_client(client, config.request_timeout))
    }

    /// Wrap an existing client.
    pub fn from_client(client: HttpClient, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }
}

fn send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::ConnectionFailed(format!("request timed out: {err}"))
    } else {
        TransportError::ConnectionFailed(err.to_string())
    }
}

#[async_trait]
impl HttpCapability for ReqwestHttpClient {
    async fn post(
        &self,
        url: &Url,
        headers: HeaderMap,
        body: Bytes,
    ) -> TransportResult<HttpResponse> {
        debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .client
            .post(url.clone())
            .headers(headers)
            .body(body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::ConnectionLost(format!("Failed to read body: {e}")))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn open_event_stream(
        &self,
        url: &Url,
        mut headers: HeaderMap,
    ) -> TransportResult<OpenedStream> {
        headers
            .entry(header::ACCEPT)
            .or_insert(HeaderValue::from_static("text/event-stream"));

        let response = self
            .client
            .get(url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = if text.is_empty() {
                status.canonical_reason().unwrap_or("").to_string()
            } else {
                text
            };
            error!("SSE connection failed: {}", status);
            return Err(TransportError::http_status(status.as_u16(), message));
        }

        let response_headers = response.headers().clone();
        let mut parser = SseParser::new();
        let events = response.bytes_stream().flat_map(move |chunk| {
            let items: Vec<TransportResult<_>> = match chunk {
                Ok(bytes) => parser.feed(&bytes).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(TransportError::ConnectionLost(format!(
                    "Error reading SSE stream: {e}"
                )))],
            };
            stream::iter(items)
        });

        Ok(OpenedStream {
            headers: response_headers,
            events: events.boxed(),
        })
    }
}
