//! JSON-RPC 2.0 message types
//!
//! The hub speaks plain JSON-RPC 2.0 over a single bidirectional connection:
//! clients send requests (with an `id`) and receive responses; the hub pushes
//! events back as notifications (no `id`). Batch arrays are not part of this
//! protocol.
//!
//! Construction goes through the factory methods (`RpcRequest::new`,
//! `RpcResponse::success`, …) so that the `jsonrpc` version marker is always
//! correct and a response can never carry both `result` and `error`.

use crate::error::RpcErrorObject;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request identifier: a string or an integer
///
/// The JSON-RPC spec also allows `null`, but a null id makes correlation
/// impossible, so the codec treats an explicit `null` id as the marker used
/// only on error responses to unparseable requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier (uuid, correlation token, …)
    String(String),
    /// Integer identifier (sequential counter)
    Number(i64),
    /// Only used in responses to requests whose id could not be recovered
    Null,
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "\"{s}\""),
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n as i64)
    }
}

/// A method call that expects a response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`
    pub jsonrpc: String,
    /// Method name, e.g. `subscriptions/create`
    pub method: String,
    /// Method parameters; omitted on the wire when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Correlation id echoed back in the response
    pub id: RequestId,
}

impl RpcRequest {
    pub fn new(
        method: impl Into<String>,
        params: Option<serde_json::Value>,
        id: impl Into<RequestId>,
    ) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// A one-way message; the receiver must not reply
///
/// The hub uses notifications for every push to the client: `events/event`,
/// `events/batch` and `notifications/subscription_expired`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    /// Always `"2.0"`
    pub jsonrpc: String,
    /// Notification method, e.g. `events/event`
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RpcNotification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// The outcome of a request: exactly one of `result` or `error`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    /// Id of the request this answers; `Null` if it could not be recovered
    pub id: RequestId,
}

impl RpcResponse {
    /// Build a success response; `error` stays unset
    pub fn success(result: serde_json::Value, id: RequestId) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Build an error response; `result` stays unset
    pub fn error(error: RpcErrorObject, id: RequestId) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Any inbound JSON-RPC message, classified
///
/// The codec sorts a decoded object into one of these variants by shape:
/// `method` + `id` is a request, `method` without `id` is a notification,
/// `result`/`error` is a response. Anything else is rejected with `-32600`.
#[derive(Debug, Clone)]
pub enum RpcMessage {
    Request(RpcRequest),
    Notification(RpcNotification),
    Response(RpcResponse),
}

impl RpcMessage {
    pub fn is_request(&self) -> bool {
        matches!(self, RpcMessage::Request(_))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, RpcMessage::Notification(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, RpcMessage::Response(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_display() {
        assert_eq!(RequestId::from("abc").to_string(), "\"abc\"");
        assert_eq!(RequestId::from(7i64).to_string(), "7");
        assert_eq!(RequestId::Null.to_string(), "null");
    }

    #[test]
    fn request_carries_version() {
        let req = RpcRequest::new("initialize", None, 1i64);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"initialize\""));
        assert!(json.contains("\"id\":1"));
    }

    #[test]
    fn notification_has_no_id() {
        let notif = RpcNotification::new("events/event", None);
        let json = serde_json::to_string(&notif).unwrap();
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn response_result_and_error_are_exclusive() {
        let ok = RpcResponse::success(serde_json::json!({"success": true}), 1i64.into());
        assert!(ok.is_success() && !ok.is_error());

        let err = RpcResponse::error(RpcErrorObject::not_initialized(), 2i64.into());
        assert!(err.is_error() && !err.is_success());
    }

    #[test]
    fn params_omitted_when_none() {
        let req = RpcRequest::new("subscriptions/list", None, "r1");
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("\"params\""));
    }
}
