//! Client transport configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use relaymcp_transport_traits::{
    CredentialProvider, LimitsConfig, TransportError, TransportMode, TransportResult,
};
use url::Url;

use crate::auth::StaticTokenProvider;

/// Extra settings for the long-lived event stream request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamConfig {
    /// Headers added to the stream GET, after the session and auth headers.
    pub headers: HashMap<String, String>,
}

/// Extra settings for every message POST.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestConfig {
    /// Headers added to each POST, after the session and auth headers.
    /// `content-type` and `accept` are always set by the transport.
    pub headers: HashMap<String, String>,
}

/// Streamable client configuration, resolved once at construction.
#[derive(Clone)]
pub struct StreamableClientConfig {
    /// Configured target. The stream is opened here and every endpoint must share its origin.
    pub url: Url,

    /// Reply delivery mode
    pub mode: TransportMode,

    /// Bearer-token source and re-authentication hook
    pub auth_provider: Option<Arc<dyn CredentialProvider>>,

    /// Customizes the stream request
    pub stream_init: Option<StreamConfig>,

    /// Customizes message POSTs
    pub request_init: Option<RequestConfig>,

    /// Size limits for requests and replies
    pub limits: LimitsConfig,

    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,

    /// Per-POST timeout. The event stream is never subject to it.
    pub request_timeout: Duration,

    /// User agent string (set to None to disable User-Agent header)
    pub user_agent: Option<String>,
}

impl fmt::Debug for StreamableClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamableClientConfig")
            .field("url", &self.url.as_str())
            .field("mode", &self.mode)
            .field("auth_provider", &self.auth_provider.is_some())
            .field("stream_init", &self.stream_init)
            .field("request_init", &self.request_init)
            .field("limits", &self.limits)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl StreamableClientConfig {
    /// Configuration for `url` with defaults everywhere else.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            mode: TransportMode::default(),
            auth_provider: None,
            stream_init: None,
            request_init: None,
            limits: LimitsConfig::default(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            user_agent: Some(format!("RelayMCP-Client/{}", env!("CARGO_PKG_VERSION"))),
        }
    }

    /// Start a builder from a URL string.
    pub fn builder(url: &str) -> StreamableClientConfigBuilder {
        StreamableClientConfigBuilder {
            url: Url::parse(url).map_err(TransportError::from),
            config: None,
        }
    }

    /// Returns `true` when replies arrive over the event stream.
    pub fn is_streaming(&self) -> bool {
        self.mode == TransportMode::Streaming
    }
}

/// Builder for [`StreamableClientConfig`].
///
/// # Examples
///
/// ```rust
/// use relaymcp_http::StreamableClientConfig;
/// use relaymcp_transport_traits::TransportMode;
///
/// let config = StreamableClientConfig::builder("https://api.example.com/mcp")
///     .mode(TransportMode::Direct)
///     .bearer_token("secret")
///     .request_header("x-tenant", "acme")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.mode, TransportMode::Direct);
/// assert!(config.auth_provider.is_some());
/// ```
#[must_use]
#[derive(Debug)]
pub struct StreamableClientConfigBuilder {
    url: TransportResult<Url>,
    config: Option<StreamableClientConfig>,
}

impl StreamableClientConfigBuilder {
    fn with(mut self, f: impl FnOnce(&mut StreamableClientConfig)) -> Self {
        if let Ok(url) = &self.url {
            let config = self
                .config
                .get_or_insert_with(|| StreamableClientConfig::new(url.clone()));
            f(config);
        }
        self
    }

    /// Set the reply delivery mode.
    pub fn mode(self, mode: TransportMode) -> Self {
        self.with(|c| c.mode = mode)
    }

    /// Use a credential provider.
    pub fn auth_provider(self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.with(|c| c.auth_provider = Some(provider))
    }

    /// Use a fixed bearer token that cannot be refreshed.
    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        let provider = Arc::new(StaticTokenProvider::new(token));
        self.with(|c| c.auth_provider = Some(provider))
    }

    /// Add a header to the stream request.
    pub fn stream_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        self.with(|c| {
            c.stream_init
                .get_or_insert_with(StreamConfig::default)
                .headers
                .insert(name, value);
        })
    }

    /// Add a header to every message POST.
    pub fn request_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        self.with(|c| {
            c.request_init
                .get_or_insert_with(RequestConfig::default)
                .headers
                .insert(name, value);
        })
    }

    /// Set size limits.
    pub fn limits(self, limits: LimitsConfig) -> Self {
        self.with(|c| c.limits = limits)
    }

    /// Set the connect timeout.
    pub fn connect_timeout(self, timeout: Duration) -> Self {
        self.with(|c| c.connect_timeout = timeout)
    }

    /// Set the per-POST timeout.
    pub fn request_timeout(self, timeout: Duration) -> Self {
        self.with(|c| c.request_timeout = timeout)
    }

    /// Set or clear the user agent.
    pub fn user_agent(self, user_agent: Option<String>) -> Self {
        self.with(|c| c.user_agent = user_agent)
    }

    /// Finish the configuration.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` when the URL does not parse or is not `http`/`https`.
    pub fn build(self) -> TransportResult<StreamableClientConfig> {
        let url = self.url?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(TransportError::ConfigurationError(format!(
                    "unsupported URL scheme '{other}', expected http or https"
                )));
            }
        }
        Ok(self
            .config
            .unwrap_or_else(|| StreamableClientConfig::new(url)))
    }
}
