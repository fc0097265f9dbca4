//! JSON-RPC 2.0 encoding and decoding
//!
//! The codec is pure: it maps between strings and typed messages and performs
//! no I/O. Error mapping follows JSON-RPC 2.0 exactly:
//!
//! - bytes that are not valid JSON → `-32700` Parse error
//! - valid JSON that is not a JSON-RPC 2.0 message → `-32600` Invalid request
//!
//! Classification is structural rather than serde-untagged so that the two
//! failure modes stay distinguishable: an object with `method` and `id` is a
//! request, `method` without `id` is a notification, `result` or `error` is a
//! response. Arrays (JSON-RPC batches) are not part of this protocol and are
//! rejected as invalid requests.

use crate::error::{Error, Result, RpcErrorObject};
use crate::types::{RequestId, RpcMessage, RpcNotification, RpcRequest, RpcResponse};
use serde::{Deserialize, Serialize};

/// Encode any serializable message to its wire form
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode one inbound frame into a classified message
///
/// # Errors
///
/// - `Error::Rpc(-32700)` if `data` is not valid JSON
/// - `Error::Rpc(-32600)` if the JSON is not a JSON-RPC 2.0 object
pub fn decode(data: &str) -> Result<RpcMessage> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|_| Error::Rpc(RpcErrorObject::parse_error()))?;

    classify(value)
}

/// Sort a parsed JSON value into request / notification / response
fn classify(value: serde_json::Value) -> Result<RpcMessage> {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None if value.is_array() => {
            return Err(Error::Rpc(RpcErrorObject::invalid_request(
                "Batch requests are not supported",
            )));
        }
        None => {
            return Err(Error::Rpc(RpcErrorObject::invalid_request(
                "Expected a JSON object",
            )));
        }
    };

    match obj.get("jsonrpc").and_then(|v| v.as_str()) {
        Some("2.0") => {}
        _ => {
            return Err(Error::Rpc(RpcErrorObject::invalid_request(
                "Missing or unsupported jsonrpc version",
            )));
        }
    }

    if obj.contains_key("method") {
        if obj.contains_key("id") {
            let request: RpcRequest = serde_json::from_value(value)
                .map_err(|e| Error::Rpc(RpcErrorObject::invalid_request(e.to_string())))?;
            Ok(RpcMessage::Request(request))
        } else {
            let notification: RpcNotification = serde_json::from_value(value)
                .map_err(|e| Error::Rpc(RpcErrorObject::invalid_request(e.to_string())))?;
            Ok(RpcMessage::Notification(notification))
        }
    } else if obj.contains_key("result") || obj.contains_key("error") {
        let response: RpcResponse = serde_json::from_value(value)
            .map_err(|e| Error::Rpc(RpcErrorObject::invalid_request(e.to_string())))?;
        Ok(RpcMessage::Response(response))
    } else {
        Err(Error::Rpc(RpcErrorObject::invalid_request(
            "Message is neither a request, a notification nor a response",
        )))
    }
}

/// Decode directly into a concrete type, bypassing classification
///
/// Used by clients that know what to expect (e.g. a typed result payload).
pub fn decode_as<'de, T: Deserialize<'de>>(data: &'de str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))
}

/// Recover the request id from a possibly broken frame
///
/// When a request fails to decode the hub still has to answer with the
/// original id if one is present; only when the id itself is unreadable does
/// the error response carry `id: null`.
pub fn recover_id(data: &str) -> RequestId {
    serde_json::from_str::<serde_json::Value>(data)
        .ok()
        .and_then(|v| v.get("id").cloned())
        .and_then(|id| serde_json::from_value::<RequestId>(id).ok())
        .unwrap_or(RequestId::Null)
}

pub fn encode_request(req: &RpcRequest) -> Result<String> {
    encode(req)
}

pub fn encode_notification(notif: &RpcNotification) -> Result<String> {
    encode(notif)
}

pub fn encode_response(resp: &RpcResponse) -> Result<String> {
    encode(resp)
}

pub fn decode_response(data: &str) -> Result<RpcResponse> {
    decode_as(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_request() {
        let req = RpcRequest::new(
            "subscriptions/create",
            Some(serde_json::json!({"delivery": {"channels": ["realtime"]}})),
            RequestId::from(3i64),
        );
        let encoded = encode_request(&req).unwrap();
        let decoded = decode(&encoded).unwrap();
        match decoded {
            RpcMessage::Request(r) => {
                assert_eq!(r.method, "subscriptions/create");
                assert_eq!(r.id, RequestId::Number(3));
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn classifies_notification() {
        let msg = decode(r#"{"jsonrpc":"2.0","method":"events/event","params":{}}"#).unwrap();
        assert!(msg.is_notification());
    }

    #[test]
    fn classifies_response() {
        let msg = decode(r#"{"jsonrpc":"2.0","result":{"success":true},"id":9}"#).unwrap();
        assert!(msg.is_response());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = decode("{not json").unwrap_err();
        match err {
            Error::Rpc(e) => assert_eq!(e.code, -32700),
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn missing_version_is_invalid_request() {
        let err = decode(r#"{"method":"initialize","id":1}"#).unwrap_err();
        match err {
            Error::Rpc(e) => assert_eq!(e.code, -32600),
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_version_is_invalid_request() {
        let err = decode(r#"{"jsonrpc":"1.0","method":"initialize","id":1}"#).unwrap_err();
        match err {
            Error::Rpc(e) => assert_eq!(e.code, -32600),
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn batch_arrays_are_rejected() {
        let err = decode(r#"[{"jsonrpc":"2.0","method":"a","id":1}]"#).unwrap_err();
        match err {
            Error::Rpc(e) => assert_eq!(e.code, -32600),
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn non_object_is_invalid_request() {
        let err = decode("42").unwrap_err();
        match err {
            Error::Rpc(e) => assert_eq!(e.code, -32600),
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn recovers_id_from_broken_request() {
        // Valid JSON, invalid message shape: the id is still recoverable
        let id = recover_id(r#"{"jsonrpc":"2.0","id":"req-7"}"#);
        assert_eq!(id, RequestId::String("req-7".to_string()));
    }

    #[test]
    fn unrecoverable_id_is_null() {
        assert_eq!(recover_id("{broken"), RequestId::Null);
        assert_eq!(recover_id(r#"{"jsonrpc":"2.0","method":"x"}"#), RequestId::Null);
    }

    #[test]
    fn error_response_round_trip() {
        let resp = RpcResponse::error(RpcErrorObject::subscription_limit(2), 5i64.into());
        let encoded = encode_response(&resp).unwrap();
        let decoded = decode_response(&encoded).unwrap();
        assert!(decoded.is_error());
        assert_eq!(decoded.error.unwrap().code, -32002);
    }
}
