//! The MCPE event subscription hub
//!
//! A hub lets remote clients declare interest in events over a JSON-RPC 2.0
//! WebSocket session and delivers matching events back on the same
//! connection: immediately, on a cron schedule, or once at an absolute
//! time. Producers push events in through [`EventHub::publish`]; everything
//! else is driven by the clients.
//!
//! # Architecture
//!
//! - **connection / session**: one reader and one writer task per
//!   connection, joined by a bounded outbound queue (per-connection FIFO,
//!   class-aware overflow)
//! - **methods**: the dispatcher for `initialize`, `mcpe/*`,
//!   `subscriptions/*` and `events/acknowledge`
//! - **subscription / index / pattern**: the authoritative store with its
//!   lifecycle FSM, per-client limits and the type-pattern match index
//! - **router**: fan-out from published events to realtime queues and
//!   aggregation buffers
//! - **scheduler / buffer / cron**: the unified timer heap behind cron and
//!   scheduled batch delivery
//! - **reaper**: background expiry of subscriptions past `expires_at`
//! - **capabilities**: static capability and operation-schema payloads
//! - **effect**: the seam to external handler executors
//!
//! # Quick start
//!
//! ```rust,no_run
//! use mcpe_server::EventHub;
//! use mcpe_core::Event;
//!
//! #[tokio::main]
//! async fn main() -> mcpe_core::Result<()> {
//!     let addr: std::net::SocketAddr = "127.0.0.1:8080".parse().unwrap();
//!     let hub = EventHub::builder().bind(addr).build().await?;
//!
//!     let publisher = hub.publisher();
//!     tokio::spawn(async move {
//!         publisher
//!             .publish(Event::new("github.push", serde_json::json!({"repo": "a/b"})))
//!             .await;
//!     });
//!
//!     hub.run().await
//! }
//! ```

mod buffer;
mod builder;
mod capabilities;
mod connection;
mod cron;
mod effect;
mod index;
mod methods;
mod metrics;
mod pattern;
mod reaper;
mod router;
mod scheduler;
mod session;
mod subscription;

pub use builder::{HubBuilder, HubConfig};
pub use capabilities::{capabilities as capability_descriptor, schema as schema_descriptor};
pub use cron::{CronError, CronSpec};
pub use effect::{EffectDelivery, EffectSink, LoggingEffectSink};
pub use metrics::HubMetrics;
pub use pattern::{PatternError, TypePattern};
pub use router::{EventRouter, PublishOutcome};
pub use scheduler::{Flush, Scheduler};
pub use session::{EnqueueOutcome, Session, SessionHandle, SessionRegistry};
pub use subscription::{DeliveryTarget, SubscriptionManager};

use mcpe_core::{Event, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Shared state behind every connection, task and the publish path
pub struct HubContext {
    pub config: HubConfig,
    pub manager: SubscriptionManager,
    pub scheduler: Arc<Scheduler>,
    pub registry: SessionRegistry,
    pub effects: Arc<dyn EffectSink>,
    pub metrics: Option<Arc<HubMetrics>>,
}

/// The hub: accept loop plus the event ingress
///
/// Built through [`EventHub::builder`]. Background tasks (scheduler, reaper)
/// are spawned at build time and stopped when the hub is dropped.
pub struct EventHub {
    listener: TcpListener,
    context: Arc<HubContext>,
    router: EventRouter,
    shutdown_tx: watch::Sender<bool>,
}

impl EventHub {
    pub fn builder() -> HubBuilder {
        HubBuilder::new()
    }

    pub(crate) fn new(
        listener: TcpListener,
        context: Arc<HubContext>,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        let router = EventRouter::new(
            context.manager.clone(),
            Arc::clone(&context.scheduler),
            context.registry.clone(),
            Arc::clone(&context.effects),
            context.metrics.clone(),
        );
        Self {
            listener,
            context,
            router,
            shutdown_tx,
        }
    }

    /// Accept connections until the listener fails
    ///
    /// Each connection runs in its own task; one connection's failure never
    /// touches the others.
    #[tracing::instrument(skip(self), name = "hub.run")]
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Hub accepting connections");
        let conn_counter = AtomicU64::new(0);

        loop {
            let (stream, addr) = self
                .listener
                .accept()
                .await
                .map_err(|e| mcpe_core::Error::Io(e.to_string()))?;
            let conn_id = conn_counter.fetch_add(1, Ordering::SeqCst);
            let ctx = Arc::clone(&self.context);

            tracing::info!(conn_id = conn_id, addr = %addr, "Connection accepted");

            tokio::spawn(async move {
                if let Err(e) = connection::handle_connection(stream, conn_id, ctx).await {
                    tracing::error!(conn_id = conn_id, error = %e, "Connection error");
                }
            });
        }
    }

    /// Publish one event into the hub
    ///
    /// Never fails on delivery problems; the outcome reports what was
    /// enqueued, buffered or dropped.
    pub async fn publish(&self, event: Event) -> PublishOutcome {
        self.router.publish(event).await
    }

    /// A cloneable ingress handle for producer tasks
    pub fn publisher(&self) -> EventRouter {
        self.router.clone()
    }

    /// The subscription manager, for operational inspection
    pub fn subscription_manager(&self) -> &SubscriptionManager {
        &self.context.manager
    }

    pub(crate) fn context(&self) -> &Arc<HubContext> {
        &self.context
    }

    /// The bound address; useful with an ephemeral port
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        // Stops the scheduler and reaper; send failures mean they are
        // already gone
        let _ = self.shutdown_tx.send(true);
    }
}
