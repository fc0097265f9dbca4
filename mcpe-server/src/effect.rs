//! The effect-sink seam
//!
//! Subscriptions may carry a [`HandlerSpec`] describing a server-side effect
//! to run on delivery (shell command, webhook, agent call). The hub does not
//! execute any of these itself; it hands the spec plus the delivered events
//! to an [`EffectSink`] exactly once per realtime event or once per flushed
//! batch, fire-and-forget. Sink failures are the sink's problem: they are
//! logged there and never feed back into delivery accounting or `publish`.

use async_trait::async_trait;
use mcpe_core::model::HandlerSpec;
use mcpe_core::Event;

/// One handler invocation: the spec plus the events that triggered it
///
/// `events` holds a single element for realtime deliveries and the whole
/// batch for cron/scheduled flushes.
#[derive(Debug, Clone)]
pub struct EffectDelivery {
    pub subscription_id: String,
    pub client_id: String,
    pub handler: HandlerSpec,
    pub events: Vec<Event>,
}

/// Receiver for handler invocations
///
/// Implementations run outside the hub (process spawners, HTTP callers, LLM
/// drivers). They must not assume they are awaited on any particular task
/// and must swallow their own errors.
#[async_trait]
pub trait EffectSink: Send + Sync {
    async fn invoke(&self, delivery: EffectDelivery);
}

/// Default sink: records the invocation and does nothing else
///
/// Useful for tests and for deployments that only consume notifications.
#[derive(Debug, Default)]
pub struct LoggingEffectSink;

#[async_trait]
impl EffectSink for LoggingEffectSink {
    async fn invoke(&self, delivery: EffectDelivery) {
        let kind = match &delivery.handler {
            HandlerSpec::Bash { command, .. } => format!("bash:{command}"),
            HandlerSpec::Webhook { url, .. } => format!("webhook:{url}"),
            HandlerSpec::Agent { model, .. } => format!("agent:{model}"),
        };
        tracing::debug!(
            subscription_id = %delivery.subscription_id,
            handler = %kind,
            event_count = delivery.events.len(),
            "Handler invocation (logging sink)"
        );
    }
}
