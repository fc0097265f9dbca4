//! Hub construction
//!
//! [`HubBuilder`] is the fluent entry point for configuring and starting an
//! [`EventHub`](crate::EventHub): bind address, limits, the effect sink and
//! observability. `build()` binds the listener, wires the shared state and
//! spawns the scheduler and reaper background tasks.

use crate::effect::{EffectSink, LoggingEffectSink};
use crate::metrics::HubMetrics;
use crate::reaper;
use crate::scheduler::{self, Scheduler};
use crate::session::SessionRegistry;
use crate::subscription::SubscriptionManager;
use crate::{EventHub, HubContext};
use mcpe_core::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Tunables for one hub instance
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Per-client cap on simultaneously existing (non-expired) subscriptions
    pub max_subscriptions_per_client: usize,
    /// Outbound queue depth per connection; the backpressure high-water mark
    pub outbound_queue_capacity: usize,
    /// How often the expiration reaper sweeps
    pub reaper_interval: Duration,
    /// Name reported in `initialize`'s `server_info`
    pub server_name: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_subscriptions_per_client: 100,
            outbound_queue_capacity: 256,
            reaper_interval: Duration::from_secs(1),
            server_name: "mcpe-hub".to_string(),
        }
    }
}

/// Builder for [`EventHub`](crate::EventHub)
pub struct HubBuilder {
    addr: Option<SocketAddr>,
    config: HubConfig,
    effects: Option<Arc<dyn EffectSink>>,
    observability_config: Option<mcpe_core::ObservabilityConfig>,
}

impl HubBuilder {
    pub fn new() -> Self {
        Self {
            addr: None,
            config: HubConfig::default(),
            effects: None,
            observability_config: None,
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Set the bind address from a string (e.g. "127.0.0.1:8080")
    pub fn bind_str(mut self, addr: &str) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Internal(format!("invalid address: {e}")))?;
        self.addr = Some(addr);
        Ok(self)
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_subscriptions_per_client(mut self, limit: usize) -> Self {
        self.config.max_subscriptions_per_client = limit;
        self
    }

    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_queue_capacity = capacity;
        self
    }

    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.config.reaper_interval = interval;
        self
    }

    /// Install the sink that receives handler invocations
    ///
    /// Defaults to [`LoggingEffectSink`].
    pub fn effect_sink(mut self, sink: Arc<dyn EffectSink>) -> Self {
        self.effects = Some(sink);
        self
    }

    /// Enable OpenTelemetry export with a custom configuration
    pub fn with_observability(mut self, config: mcpe_core::ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry export with defaults
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(mcpe_core::ObservabilityConfig::default());
        self
    }

    /// Bind, wire up shared state and spawn the background tasks
    pub async fn build(self) -> Result<EventHub> {
        let addr = self
            .addr
            .ok_or_else(|| Error::Internal("no bind address specified".to_string()))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        let metrics = if let Some(config) = self.observability_config {
            mcpe_core::init_observability(config.clone())
                .map_err(|e| Error::Internal(format!("failed to initialize telemetry: {e}")))?;
            Some(Arc::new(HubMetrics::new(config.service_name)))
        } else {
            None
        };

        tracing::info!(addr = %addr, "Hub listening");

        let manager = SubscriptionManager::new(self.config.max_subscriptions_per_client);
        let scheduler = Arc::new(Scheduler::new());
        let registry = SessionRegistry::new();
        let effects = self
            .effects
            .unwrap_or_else(|| Arc::new(LoggingEffectSink));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(scheduler::run_scheduler(
            Arc::clone(&scheduler),
            manager.clone(),
            registry.clone(),
            Arc::clone(&effects),
            metrics.clone(),
            shutdown_rx.clone(),
        ));

        tokio::spawn(reaper::run_reaper(
            manager.clone(),
            Arc::clone(&scheduler),
            registry.clone(),
            self.config.reaper_interval,
            shutdown_rx,
        ));

        let context = Arc::new(HubContext {
            config: self.config,
            manager,
            scheduler,
            registry,
            effects,
            metrics,
        });

        Ok(EventHub::new(listener, context, shutdown_tx))
    }
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}
