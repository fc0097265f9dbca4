//! Request/response correlation
//!
//! Requests and responses share one WebSocket, so the client keeps a map
//! from request id to the oneshot channel its caller is waiting on. The
//! receive loop completes entries as responses arrive; disconnecting fails
//! everything still pending.

use mcpe_core::{Error, RequestId, RpcResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Tracks in-flight requests by id
#[derive(Clone)]
pub struct RequestTracker {
    pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<RpcResponse>>>>,
    next_id: Arc<AtomicI64>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Allocate the next request id
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register interest in a response before sending the request
    pub async fn register(&self, id: RequestId) -> oneshot::Receiver<RpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        rx
    }

    /// Hand an incoming response to its waiting caller
    ///
    /// Responses with no pending entry (duplicate, late after timeout) are
    /// dropped.
    pub async fn complete(&self, response: RpcResponse) {
        let waiter = self.pending.lock().await.remove(&response.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => {
                tracing::debug!(id = %response.id, "Response with no pending request");
            }
        }
    }

    /// Abandon a registration (send failed, timeout)
    pub async fn forget(&self, id: &RequestId) {
        self.pending.lock().await.remove(id);
    }

    /// Fail every pending request; called when the connection dies
    pub async fn fail_all(&self) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(RpcResponse::error(
                Error::ConnectionClosed.to_rpc(),
                RequestId::Null,
            ));
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_unique_and_increasing() {
        let tracker = RequestTracker::new();
        let a = tracker.next_id();
        let b = tracker.next_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn complete_routes_to_the_right_waiter() {
        let tracker = RequestTracker::new();
        let id = tracker.next_id();
        let rx = tracker.register(id.clone()).await;

        tracker
            .complete(RpcResponse::success(serde_json::json!(7), id))
            .await;

        let response = rx.await.unwrap();
        assert_eq!(response.result.unwrap(), serde_json::json!(7));
        assert_eq!(tracker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_response_is_dropped() {
        let tracker = RequestTracker::new();
        tracker
            .complete(RpcResponse::success(
                serde_json::json!(null),
                RequestId::Number(99),
            ))
            .await;
        assert_eq!(tracker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn fail_all_wakes_every_waiter() {
        let tracker = RequestTracker::new();
        let rx1 = tracker.register(tracker.next_id()).await;
        let rx2 = tracker.register(tracker.next_id()).await;

        tracker.fail_all().await;

        assert!(rx1.await.unwrap().is_error());
        assert!(rx2.await.unwrap().is_error());
    }
}
