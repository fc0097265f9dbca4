//! Error types for the MCPE hub and its clients
//!
//! Two error layers live here:
//!
//! - **Error**: the crate-level error enum used internally (thiserror-based)
//! - **RpcErrorObject**: the JSON-RPC 2.0 wire-format error carried inside a
//!   response's `error` field
//!
//! # Error codes
//!
//! The hub uses the standard JSON-RPC 2.0 codes plus three codes from the
//! implementation-defined server range:
//!
//! | Code | Meaning |
//! |---|---|
//! | -32700 | Parse error (malformed JSON) |
//! | -32600 | Invalid request (not a JSON-RPC 2.0 message) |
//! | -32601 | Method not found |
//! | -32602 | Invalid params (bad filter, invalid cron, past `deliver_at`, …) |
//! | -32603 | Internal error |
//! | -32000 | Session not initialized |
//! | -32001 | Subscription not found (or not owned by the caller) |
//! | -32002 | Subscription limit reached |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used throughout the MCPE crates
pub type Result<T> = std::result::Result<T, Error>;

/// Stable numeric error codes used on the wire
pub mod codes {
    /// Malformed JSON was received
    pub const PARSE_ERROR: i32 = -32700;
    /// Structurally valid JSON that is not a valid JSON-RPC 2.0 message
    pub const INVALID_REQUEST: i32 = -32600;
    /// The requested method does not exist
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// The method exists but the parameters are invalid
    pub const INVALID_PARAMS: i32 = -32602;
    /// Unexpected server-side failure
    pub const INTERNAL_ERROR: i32 = -32603;
    /// A non-`initialize` method was called before `initialize` succeeded
    pub const NOT_INITIALIZED: i32 = -32000;
    /// The subscription id is unknown or owned by another client
    pub const SUBSCRIPTION_NOT_FOUND: i32 = -32001;
    /// The per-client active subscription limit would be exceeded
    pub const SUBSCRIPTION_LIMIT: i32 = -32002;
}

/// Crate-level error for hub and client operations
///
/// Variants that correspond to wire errors can be converted into an
/// [`RpcErrorObject`] via [`Error::to_rpc`]; transport-level variants
/// (`WebSocket`, `Io`, `ConnectionClosed`, `Timeout`) never cross the wire
/// and surface only to local callers.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An error already in wire format, typically received from a peer
    #[error("JSON-RPC error: {0}")]
    Rpc(#[from] RpcErrorObject),

    /// Failed to convert between Rust types and JSON
    #[error("serialization error: {0}")]
    Serialization(String),

    /// WebSocket transport failure
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Operating-system level I/O failure
    #[error("io error: {0}")]
    Io(String),

    /// The requested method is not part of the protocol
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The method exists but its parameters were rejected
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The session has not completed the `initialize` handshake
    #[error("session not initialized")]
    NotInitialized,

    /// No subscription with this id is visible to the caller
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Creating another subscription would exceed the per-client limit
    #[error("subscription limit reached (limit: {0})")]
    SubscriptionLimit(usize),

    /// Unexpected failure while processing a request
    #[error("internal error: {0}")]
    Internal(String),

    /// A client-side request did not complete in time
    #[error("request timeout")]
    Timeout,

    /// The connection is gone; no further sends are possible
    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Map this error onto its wire representation
    ///
    /// Transport-local variants map to `-32603` since they should not
    /// normally be observed by a remote peer.
    pub fn to_rpc(&self) -> RpcErrorObject {
        match self {
            Error::Rpc(e) => e.clone(),
            Error::MethodNotFound(m) => RpcErrorObject::method_not_found(m),
            Error::InvalidParams(msg) => RpcErrorObject::invalid_params(msg.clone()),
            Error::NotInitialized => RpcErrorObject::not_initialized(),
            Error::SubscriptionNotFound(id) => RpcErrorObject::subscription_not_found(id),
            Error::SubscriptionLimit(limit) => RpcErrorObject::subscription_limit(*limit),
            Error::Serialization(msg) => RpcErrorObject::invalid_params(msg.clone()),
            other => RpcErrorObject::internal_error(other.to_string()),
        }
    }
}

/// JSON-RPC 2.0 error object as it appears on the wire
///
/// Appears in the `error` field of a response. `code` and `message` are
/// mandatory per the JSON-RPC spec; `data` carries optional structured
/// context (for example the offending cron expression).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric error code (see [`codes`])
    pub code: i32,
    /// Short human-readable description
    pub message: String,
    /// Optional structured context for the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcErrorObject {
    /// Create an error object with an arbitrary code
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured context to the error
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `-32700`: the inbound bytes were not valid JSON
    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error")
    }

    /// `-32600`: valid JSON that is not a valid JSON-RPC 2.0 message
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, msg)
    }

    /// `-32601`: the method is not part of the protocol
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method.into()),
        )
    }

    /// `-32602`: the method exists but the parameters are invalid
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, msg)
    }

    /// `-32603`: unexpected server-side failure
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, msg)
    }

    /// `-32000`: `initialize` has not completed on this session
    pub fn not_initialized() -> Self {
        Self::new(
            codes::NOT_INITIALIZED,
            "Session not initialized: call initialize first",
        )
    }

    /// `-32001`: unknown subscription id, or one owned by another client
    pub fn subscription_not_found(id: impl Into<String>) -> Self {
        Self::new(
            codes::SUBSCRIPTION_NOT_FOUND,
            format!("Subscription not found: {}", id.into()),
        )
    }

    /// `-32002`: the per-client active subscription limit is exhausted
    pub fn subscription_limit(limit: usize) -> Self {
        Self::new(
            codes::SUBSCRIPTION_LIMIT,
            format!("Subscription limit reached (limit: {limit})"),
        )
    }
}

impl std::fmt::Display for RpcErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcErrorObject {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_codes() {
        assert_eq!(RpcErrorObject::parse_error().code, -32700);
        assert_eq!(RpcErrorObject::invalid_request("x").code, -32600);
        assert_eq!(RpcErrorObject::method_not_found("x").code, -32601);
        assert_eq!(RpcErrorObject::invalid_params("x").code, -32602);
        assert_eq!(RpcErrorObject::internal_error("x").code, -32603);
    }

    #[test]
    fn hub_codes() {
        assert_eq!(RpcErrorObject::not_initialized().code, -32000);
        assert_eq!(RpcErrorObject::subscription_not_found("s").code, -32001);
        assert_eq!(RpcErrorObject::subscription_limit(5).code, -32002);
    }

    #[test]
    fn error_to_rpc_mapping() {
        assert_eq!(Error::NotInitialized.to_rpc().code, -32000);
        assert_eq!(
            Error::SubscriptionNotFound("sub-1".into()).to_rpc().code,
            -32001
        );
        assert_eq!(Error::SubscriptionLimit(2).to_rpc().code, -32002);
        assert_eq!(Error::InvalidParams("bad".into()).to_rpc().code, -32602);
        assert_eq!(Error::Timeout.to_rpc().code, -32603);
    }

    #[test]
    fn limit_message_names_the_limit() {
        let err = RpcErrorObject::subscription_limit(10);
        assert!(err.message.contains("10"));
    }

    #[test]
    fn with_data_round_trip() {
        let err = RpcErrorObject::invalid_params("bad cron")
            .with_data(json!({"expression": "* * *"}));
        let encoded = serde_json::to_string(&err).unwrap();
        let decoded: RpcErrorObject = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.code, -32602);
        assert_eq!(decoded.data.unwrap()["expression"], "* * *");
    }

    #[test]
    fn data_omitted_when_absent() {
        let err = RpcErrorObject::not_initialized();
        let encoded = serde_json::to_string(&err).unwrap();
        assert!(!encoded.contains("\"data\""));
    }

    #[test]
    fn display_includes_code() {
        let err = RpcErrorObject::method_not_found("subscriptions/frobnicate");
        let rendered = err.to_string();
        assert!(rendered.contains("-32601"));
        assert!(rendered.contains("subscriptions/frobnicate"));
    }
}
