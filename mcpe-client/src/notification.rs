//! Notification dispatch
//!
//! The hub pushes `events/event`, `events/batch` and
//! `notifications/subscription_expired` as JSON-RPC notifications. Callers
//! register an async handler per method; the receive loop hands each inbound
//! notification to the matching handler. Unhandled methods are logged and
//! dropped.

use mcpe_core::RpcNotification;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

type BoxedHandler =
    Arc<dyn Fn(RpcNotification) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Registry of per-method notification handlers
#[derive(Clone, Default)]
pub struct NotificationHandlers {
    handlers: Arc<Mutex<HashMap<String, BoxedHandler>>>,
}

impl NotificationHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for a notification method
    pub async fn register<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(RpcNotification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: BoxedHandler = Arc::new(move |notification| Box::pin(handler(notification)));
        self.handlers.lock().await.insert(method.into(), handler);
    }

    /// Run the registered handler for one notification, if any
    pub async fn dispatch(&self, notification: RpcNotification) {
        let handler = self
            .handlers
            .lock()
            .await
            .get(&notification.method)
            .cloned();
        match handler {
            Some(handler) => handler(notification).await,
            None => {
                tracing::debug!(method = %notification.method, "Unhandled notification");
            }
        }
    }
}
