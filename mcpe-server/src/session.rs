//! Sessions and the session registry
//!
//! A [`Session`] is the per-connection state the dispatcher consults: the
//! initialized flag, the client identity bound at `initialize`, and the ids
//! of subscriptions touched on this connection. It is owned by the
//! connection's reader task and never shared, so it needs no lock.
//!
//! A [`SessionHandle`] is the cheap, cloneable sending side of a connection:
//! a bounded mpsc queue drained by the connection's single writer task, which
//! is what gives per-connection FIFO ordering. The queue bound is the
//! backpressure high-water mark, and the two send methods encode the overflow
//! policy:
//!
//! - [`SessionHandle::try_notify`]: realtime events; a full queue drops the
//!   notification and reports it, the caller counts it
//! - [`SessionHandle::send`]: responses, batches and control notifications;
//!   awaits queue space so these are never dropped
//!
//! The [`SessionRegistry`] maps connection ids to handles and client ids to
//! connections, so the router and scheduler can reach the owning session of
//! a subscription without touching connection internals.

use mcpe_core::codec;
use mcpe_core::protocol::ClientInfo;
use mcpe_core::{Error, Result, RpcNotification};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;

/// Per-connection dispatcher state
///
/// Created when a connection is accepted, dropped when it closes. The
/// subscription id set tracks what this session created so `list` and
/// ownership checks stay cheap; the authoritative record is the manager's.
#[derive(Debug)]
pub struct Session {
    pub conn_id: u64,
    pub initialized: bool,
    pub client_id: Option<String>,
    pub client_info: Option<ClientInfo>,
    pub subscription_ids: HashSet<String>,
}

impl Session {
    pub fn new(conn_id: u64) -> Self {
        Self {
            conn_id,
            initialized: false,
            client_id: None,
            client_info: None,
            subscription_ids: HashSet::new(),
        }
    }

    /// The client id, available only after a successful `initialize`
    pub fn client_id(&self) -> Result<&str> {
        self.client_id.as_deref().ok_or(Error::NotInitialized)
    }
}

/// Outcome of a realtime enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// The outbound queue was at its high-water mark
    DroppedFull,
    /// The connection is gone
    DroppedClosed,
}

/// Sending side of one connection's outbound queue
#[derive(Clone)]
pub struct SessionHandle {
    pub conn_id: u64,
    tx: mpsc::Sender<Message>,
}

impl SessionHandle {
    pub fn new(conn_id: u64, tx: mpsc::Sender<Message>) -> Self {
        Self { conn_id, tx }
    }

    /// Enqueue a realtime notification, dropping on overflow
    pub fn try_notify(&self, notification: &RpcNotification) -> EnqueueOutcome {
        let text = match codec::encode_notification(notification) {
            Ok(text) => text,
            Err(_) => return EnqueueOutcome::DroppedClosed,
        };
        match self.tx.try_send(Message::Text(text)) {
            Ok(()) => EnqueueOutcome::Enqueued,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueOutcome::DroppedFull,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::DroppedClosed,
        }
    }

    /// Enqueue a message that must not be dropped, waiting for queue space
    pub async fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Encode and enqueue a preserved notification (batches, expiry notices)
    pub async fn send_notification(&self, notification: &RpcNotification) -> Result<()> {
        let text = codec::encode_notification(notification)?;
        self.send(Message::Text(text)).await
    }
}

#[derive(Default)]
struct RegistryInner {
    by_conn: HashMap<u64, SessionHandle>,
    by_client: HashMap<String, u64>,
}

/// Shared lookup from connections and client identities to send handles
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection
    pub async fn register(&self, handle: SessionHandle) {
        let mut inner = self.inner.lock().await;
        inner.by_conn.insert(handle.conn_id, handle);
    }

    /// Bind a client identity to a connection at `initialize`
    ///
    /// A reconnecting client takes its identity with it: any previous
    /// binding for the same client id is replaced.
    pub async fn bind_client(&self, client_id: &str, conn_id: u64) {
        let mut inner = self.inner.lock().await;
        inner.by_client.insert(client_id.to_string(), conn_id);
    }

    /// Drop a closed connection and any client binding pointing at it
    pub async fn unregister(&self, conn_id: u64) {
        let mut inner = self.inner.lock().await;
        inner.by_conn.remove(&conn_id);
        inner.by_client.retain(|_, bound| *bound != conn_id);
    }

    pub async fn handle_for_conn(&self, conn_id: u64) -> Option<SessionHandle> {
        let inner = self.inner.lock().await;
        inner.by_conn.get(&conn_id).cloned()
    }

    /// The send handle of the connection currently owned by a client, if any
    pub async fn handle_for_client(&self, client_id: &str) -> Option<SessionHandle> {
        let inner = self.inner.lock().await;
        let conn_id = inner.by_client.get(client_id)?;
        inner.by_conn.get(conn_id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.by_conn.len()
    }
}
