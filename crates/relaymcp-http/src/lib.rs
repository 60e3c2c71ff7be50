//! # RelayMCP HTTP Transport
//!
//! Streamable HTTP client transport for JSON-RPC based protocols.
//!
//! Replies are delivered either over a long-lived server-sent event stream
//! ([`TransportMode::Streaming`], the default) or inline as the body of each POST
//! ([`TransportMode::Direct`]).
//!
//! ## Features
//!
//! - **Endpoint Discovery**: the POST endpoint is announced by an `endpoint` event and
//!   must share the origin of the configured target
//! - **Session Affinity**: the `mcp-session-id` response header is echoed on every
//!   following request, last write wins
//! - **Bearer Re-authentication**: a 401 triggers exactly one credential refresh and one
//!   retry
//! - **Reply Correlation**: [`StreamableClientTransport::request`] waits for the reply
//!   carrying the same id
//! - **Cooperative Cancellation**: `close()` cancels the stream and every in-flight
//!   POST, and fails outstanding waiters
//! - **Size Limits**: configurable request/response size validation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relaymcp_http::{StreamableClientConfig, StreamableClientTransport};
//! use relaymcp_transport_traits::JsonRpcMessage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreamableClientConfig::builder("http://localhost:8080/mcp")
//!         .bearer_token("your-token")
//!         .build()?;
//!
//!     let transport = StreamableClientTransport::new(config)?;
//!     transport.on_message(|message| println!("inbound: {message:?}"));
//!     transport.on_close(|| println!("closed"));
//!
//!     transport.start().await?;
//!     let reply = transport
//!         .request(JsonRpcMessage::request(1, "tools/list", None))
//!         .await?;
//!     println!("reply: {reply:?}");
//!
//!     transport.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol Flow
//!
//! 1. Streaming mode: GET the target with `Accept: text/event-stream`
//! 2. The server sends an `endpoint` event naming the message endpoint
//! 3. The client POSTs each message to that endpoint
//! 4. Replies arrive as `message` events (streaming) or as the POST body (direct)
//!
//! A transport performs its handshake once. There is no reconnection; construct a new
//! transport after `close()`.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod auth;
mod client;
mod config;
mod handshake;
mod pending;
mod session;
mod transport;

pub use auth::StaticTokenProvider;
pub use client::ReqwestHttpClient;
pub use config::{
    RequestConfig, StreamConfig, StreamableClientConfig, StreamableClientConfigBuilder,
};
pub use session::SESSION_ID_HEADER;
pub use transport::{CloseHandler, ErrorHandler, MessageHandler, StreamableClientTransport};

// Re-export common types from traits crate for convenience
pub use relaymcp_transport_traits::{
    AuthContext, AuthOutcome, ConnectionState, CredentialProvider, HttpCapability, JsonCodec,
    JsonRpcMessage, LimitsConfig, MessageCodec, MessageId, TransportError, TransportMode,
    TransportResult,
};
