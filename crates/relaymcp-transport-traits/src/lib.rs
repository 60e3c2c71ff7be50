//! # RelayMCP Transport Traits
//!
//! Core transport traits and types for the RelayMCP streamable client.
//! This crate provides the foundational abstractions the HTTP client transport depends on.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Capabilities**: [`HttpCapability`], [`CredentialProvider`], [`MessageCodec`]
//! - **Messages**: [`JsonRpcMessage`], [`MessageId`], [`JsonCodec`]
//! - **Types**: [`TransportMode`], [`ConnectionState`], [`HttpResponse`], [`OpenedStream`], [`SseEvent`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Config**: [`LimitsConfig`]
//!
//! ## Usage
//!
//! Capability implementations depend on this crate and implement the relevant trait:
//!
//! ```rust,ignore
//! use relaymcp_transport_traits::{HttpCapability, HttpResponse, OpenedStream, TransportResult};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct MyHttp { /* ... */ }
//!
//! #[async_trait]
//! impl HttpCapability for MyHttp {
//!     async fn post(&self, url: &Url, headers: HeaderMap, body: Bytes) -> TransportResult<HttpResponse> { /* ... */ }
//!     async fn open_event_stream(&self, url: &Url, headers: HeaderMap) -> TransportResult<OpenedStream> { /* ... */ }
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod config;
mod error;
mod message;
mod sse;
mod traits;
mod types;

// Re-export all public items
pub use config::LimitsConfig;
pub use error::{TransportError, TransportResult};
pub use message::{
    JSONRPC_VERSION, JsonCodec, JsonRpcError, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, JsonRpcVersion, MessageId,
};
pub use sse::{SseEncoder, SseEvent, SseParser};
pub use traits::{
    AuthContext, AuthOutcome, CredentialProvider, EventStream, HttpCapability, MessageCodec,
    OpenedStream,
};
pub use types::{ConnectionState, HttpResponse, TransportMode};

// Re-export validation functions
pub use error::{validate_request_size, validate_response_size};
