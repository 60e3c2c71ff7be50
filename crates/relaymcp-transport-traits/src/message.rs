//! JSON-RPC message model and the default JSON codec.
//!
//! The transport treats messages as opaque except for one thing: the `id`, which it
//! needs for reply correlation. Everything else is carried through untouched.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{TransportError, TransportResult};
use crate::traits::MessageCodec;

/// The only JSON-RPC version accepted on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

/// Marker for the `"jsonrpc": "2.0"` field. Rejects any other version on decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version '{version}', expected '{JSONRPC_VERSION}'"
            )))
        }
    }
}

/// A JSON-RPC request identifier: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// String identifier
    String(String),
    /// Numeric identifier
    Number(i64),
}

impl MessageId {
    /// The string form used as the correlation key.
    ///
    /// `1` and `"1"` share a key, matching how replies are looked up by their printed id.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self::String(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<i32> for MessageId {
    fn from(id: i32) -> Self {
        Self::Number(i64::from(id))
    }
}

/// JSON-RPC request: a method call that expects a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Request identifier
    pub id: MessageId,
    /// Request method name
    pub method: String,
    /// Request parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC notification: a method call without an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Notification method name
    pub method: String,
    /// Notification parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC response. Exactly one of `result` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Request identifier; `null` only for parse errors
    pub id: Option<MessageId>,
    /// Successful result. `"result": null` is present and decodes as `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Error result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn deserialize_present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Any JSON-RPC message the transport carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Request message
    Request(JsonRpcRequest),
    /// Notification message
    Notification(JsonRpcNotification),
    /// Response message
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Builds a request.
    pub fn request(id: impl Into<MessageId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request(JsonRpcRequest {
            jsonrpc: JsonRpcVersion,
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    /// Builds a notification.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(JsonRpcNotification {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        })
    }

    /// Builds a successful response.
    pub fn response(id: impl Into<MessageId>, result: Value) -> Self {
        Self::Response(JsonRpcResponse {
            jsonrpc: JsonRpcVersion,
            id: Some(id.into()),
            result: Some(result),
            error: None,
        })
    }

    /// The message id, if it carries a non-null one.
    pub fn id(&self) -> Option<&MessageId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Response(resp) => resp.id.as_ref(),
            Self::Notification(_) => None,
        }
    }

    /// Returns `true` if this message expects a reply from the peer, i.e. it carries a
    /// non-null id.
    pub fn expects_reply(&self) -> bool {
        self.id().is_some()
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(notif) => Some(&notif.method),
            Self::Response(_) => None,
        }
    }
}

/// Default codec: UTF-8 JSON with structural validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> TransportResult<JsonRpcMessage> {
        let message: JsonRpcMessage = serde_json::from_slice(bytes)?;
        if let JsonRpcMessage::Response(resp) = &message {
            match (&resp.result, &resp.error) {
                (Some(_), None) | (None, Some(_)) => {}
                (Some(_), Some(_)) => {
                    return Err(TransportError::Decode(
                        "response carries both result and error".to_string(),
                    ));
                }
                (None, None) => {
                    return Err(TransportError::Decode(
                        "response carries neither result nor error".to_string(),
                    ));
                }
            }
        }
        Ok(message)
    }

    fn encode(&self, message: &JsonRpcMessage) -> TransportResult<Bytes> {
        serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))
    }
}
