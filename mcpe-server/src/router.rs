//! Event routing
//!
//! [`EventRouter::publish`] is the hub's sole event ingress. The flow is:
//! match under the manager lock, then deliver with no lock held:
//! realtime matches go straight onto the owning session's outbound queue
//! (dropped and counted on overflow or when the owner is offline), and
//! aggregating matches land in the scheduler's buffers for a later flush.
//!
//! `publish` never fails because of delivery: slow clients, absent sessions
//! and handler errors are logged and counted, and the producer only sees an
//! accounting of what happened.

use crate::effect::{EffectDelivery, EffectSink};
use crate::metrics::HubMetrics;
use crate::scheduler::Scheduler;
use crate::session::{EnqueueOutcome, SessionRegistry};
use crate::subscription::SubscriptionManager;
use mcpe_core::model::DeliveryClass;
use mcpe_core::protocol::{notifications, EventDelivery};
use mcpe_core::{Event, RpcNotification};
use std::sync::Arc;

/// Accounting returned to the producer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Subscriptions whose filter matched the event
    pub matched: usize,
    /// Realtime notifications enqueued
    pub delivered_realtime: usize,
    /// Events appended to aggregation buffers
    pub buffered: usize,
    /// Realtime deliveries dropped (queue full or owner offline)
    pub dropped_realtime: usize,
}

/// Fan-out engine from published events to deliveries
#[derive(Clone)]
pub struct EventRouter {
    manager: SubscriptionManager,
    scheduler: Arc<Scheduler>,
    registry: SessionRegistry,
    effects: Arc<dyn EffectSink>,
    metrics: Option<Arc<HubMetrics>>,
}

impl EventRouter {
    pub fn new(
        manager: SubscriptionManager,
        scheduler: Arc<Scheduler>,
        registry: SessionRegistry,
        effects: Arc<dyn EffectSink>,
        metrics: Option<Arc<HubMetrics>>,
    ) -> Self {
        Self {
            manager,
            scheduler,
            registry,
            effects,
            metrics,
        }
    }

    /// Route one event to every matching subscription
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn publish(&self, event: Event) -> PublishOutcome {
        let targets = self.manager.match_event(&event).await;
        let mut outcome = PublishOutcome {
            matched: targets.len(),
            ..Default::default()
        };

        if let Some(m) = &self.metrics {
            m.record_publish(&event.event_type);
        }

        for target in targets {
            match target.class {
                DeliveryClass::Realtime => {
                    let delivered = self
                        .deliver_realtime(&target.subscription_id, &target.client_id, &event)
                        .await;
                    if delivered {
                        outcome.delivered_realtime += 1;
                    } else {
                        outcome.dropped_realtime += 1;
                        if let Some(m) = &self.metrics {
                            m.record_dropped_realtime();
                        }
                    }
                    // One handler invocation per realtime event,
                    // fire-and-forget, independent of the owner's queue
                    if let Some(handler) = target.handler {
                        let effects = Arc::clone(&self.effects);
                        let delivery = EffectDelivery {
                            subscription_id: target.subscription_id,
                            client_id: target.client_id,
                            handler,
                            events: vec![event.clone()],
                        };
                        tokio::spawn(async move {
                            effects.invoke(delivery).await;
                        });
                    }
                }
                DeliveryClass::Cron | DeliveryClass::Scheduled => {
                    self.scheduler
                        .buffer_event(&target.subscription_id, event.clone())
                        .await;
                    outcome.buffered += 1;
                }
            }
        }

        tracing::debug!(
            matched = outcome.matched,
            delivered_realtime = outcome.delivered_realtime,
            buffered = outcome.buffered,
            dropped_realtime = outcome.dropped_realtime,
            "Event routed"
        );
        outcome
    }

    async fn deliver_realtime(
        &self,
        subscription_id: &str,
        client_id: &str,
        event: &Event,
    ) -> bool {
        let Some(handle) = self.registry.handle_for_client(client_id).await else {
            tracing::debug!(
                subscription_id = %subscription_id,
                client_id = %client_id,
                "Owner offline, realtime delivery dropped"
            );
            return false;
        };

        let payload = EventDelivery {
            subscription_id: subscription_id.to_string(),
            event: event.clone(),
        };
        let params = match serde_json::to_value(&payload) {
            Ok(params) => params,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode event payload");
                return false;
            }
        };
        let notification = RpcNotification::new(notifications::EVENT, Some(params));

        match handle.try_notify(&notification) {
            EnqueueOutcome::Enqueued => {
                if let Some(m) = &self.metrics {
                    m.record_delivery("realtime");
                }
                true
            }
            EnqueueOutcome::DroppedFull => {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    conn_id = handle.conn_id,
                    "Outbound queue full, realtime delivery dropped"
                );
                false
            }
            EnqueueOutcome::DroppedClosed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::LoggingEffectSink;
    use crate::session::SessionHandle;
    use mcpe_core::codec;
    use mcpe_core::model::{DeliveryPreferences, EventFilter};
    use mcpe_core::protocol::CreateParams;
    use mcpe_core::Priority;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    struct Fixture {
        router: EventRouter,
        manager: SubscriptionManager,
        scheduler: Arc<Scheduler>,
        registry: SessionRegistry,
    }

    fn fixture() -> Fixture {
        let manager = SubscriptionManager::new(100);
        let scheduler = Arc::new(Scheduler::new());
        let registry = SessionRegistry::new();
        let router = EventRouter::new(
            manager.clone(),
            Arc::clone(&scheduler),
            registry.clone(),
            Arc::new(LoggingEffectSink),
            None,
        );
        Fixture {
            router,
            manager,
            scheduler,
            registry,
        }
    }

    async fn connect(fixture: &Fixture, client_id: &str, conn_id: u64, capacity: usize) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(capacity);
        fixture
            .registry
            .register(SessionHandle::new(conn_id, tx))
            .await;
        fixture.registry.bind_client(client_id, conn_id).await;
        rx
    }

    fn create_params(patterns: &[&str], delivery: DeliveryPreferences) -> CreateParams {
        CreateParams {
            filter: EventFilter {
                event_types: Some(patterns.iter().map(|p| p.to_string()).collect()),
                ..Default::default()
            },
            delivery,
            handler: None,
            expires_at: None,
        }
    }

    fn decode_event_notification(message: Message) -> EventDelivery {
        let Message::Text(text) = message else {
            panic!("expected text frame");
        };
        let notif: mcpe_core::RpcNotification = codec::decode_as(&text).unwrap();
        assert_eq!(notif.method, "events/event");
        serde_json::from_value(notif.params.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn realtime_match_lands_on_owner_queue() {
        let fixture = fixture();
        let mut rx = connect(&fixture, "c1", 1, 8).await;
        let sub = fixture
            .manager
            .create("c1", create_params(&["github.push"], DeliveryPreferences::realtime()))
            .await
            .unwrap();

        let event = Event::new("github.push", serde_json::json!({"repo": "a/b"}));
        let outcome = fixture.router.publish(event.clone()).await;
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.delivered_realtime, 1);
        assert_eq!(outcome.dropped_realtime, 0);

        let delivery = decode_event_notification(rx.recv().await.unwrap());
        assert_eq!(delivery.subscription_id, sub.id);
        assert_eq!(delivery.event.id, event.id);
    }

    #[tokio::test]
    async fn no_match_no_delivery() {
        let fixture = fixture();
        let mut rx = connect(&fixture, "c1", 1, 8).await;
        fixture
            .manager
            .create("c1", create_params(&["github.push"], DeliveryPreferences::realtime()))
            .await
            .unwrap();

        let outcome = fixture
            .router
            .publish(Event::new("gitlab.push", serde_json::json!({})))
            .await;
        assert_eq!(outcome.matched, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_owner_counts_as_dropped() {
        let fixture = fixture();
        fixture
            .manager
            .create("c1", create_params(&["github.push"], DeliveryPreferences::realtime()))
            .await
            .unwrap();

        let outcome = fixture
            .router
            .publish(Event::new("github.push", serde_json::json!({})))
            .await;
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.dropped_realtime, 1);
        assert_eq!(outcome.delivered_realtime, 0);
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let fixture = fixture();
        let _rx = connect(&fixture, "c1", 1, 1).await;
        fixture
            .manager
            .create("c1", create_params(&["t"], DeliveryPreferences::realtime()))
            .await
            .unwrap();

        let first = fixture.router.publish(Event::new("t", serde_json::json!({}))).await;
        assert_eq!(first.delivered_realtime, 1);

        // Queue capacity 1 and nobody draining: the second publish drops
        let second = fixture.router.publish(Event::new("t", serde_json::json!({}))).await;
        assert_eq!(second.dropped_realtime, 1);
    }

    #[tokio::test]
    async fn aggregating_match_is_buffered_not_pushed() {
        let fixture = fixture();
        let mut rx = connect(&fixture, "c1", 1, 8).await;
        let sub = fixture
            .manager
            .create("c1", create_params(&["ci.*"], DeliveryPreferences::cron("@hourly")))
            .await
            .unwrap();
        fixture.scheduler.watch(&sub).await;

        let outcome = fixture
            .router
            .publish(Event::new("ci.finished", serde_json::json!({})))
            .await;
        assert_eq!(outcome.buffered, 1);
        assert_eq!(outcome.delivered_realtime, 0);
        assert_eq!(fixture.scheduler.buffered_len(&sub.id).await, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn wildcard_and_priority_combination() {
        let fixture = fixture();
        let mut rx = connect(&fixture, "c1", 1, 8).await;
        let mut params = create_params(&["github.*"], DeliveryPreferences::realtime());
        params.filter.priority = Some(vec![Priority::High, Priority::Critical]);
        fixture.manager.create("c1", params).await.unwrap();

        // Wrong priority: no delivery
        let outcome = fixture
            .router
            .publish(Event::new("github.push", serde_json::json!({})))
            .await;
        assert_eq!(outcome.matched, 0);

        // Matching type and priority: delivered
        let outcome = fixture
            .router
            .publish(
                Event::new("github.issues.opened", serde_json::json!({}))
                    .with_priority(Priority::High),
            )
            .await;
        assert_eq!(outcome.delivered_realtime, 1);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn pause_blocks_resume_restores() {
        let fixture = fixture();
        let mut rx = connect(&fixture, "c1", 1, 8).await;
        let sub = fixture
            .manager
            .create("c1", create_params(&["t"], DeliveryPreferences::realtime()))
            .await
            .unwrap();

        fixture.manager.pause("c1", &sub.id).await.unwrap();
        let outcome = fixture.router.publish(Event::new("t", serde_json::json!({}))).await;
        assert_eq!(outcome.matched, 0);
        assert!(rx.try_recv().is_err());

        fixture.manager.resume("c1", &sub.id).await.unwrap();
        let outcome = fixture.router.publish(Event::new("t", serde_json::json!({}))).await;
        assert_eq!(outcome.delivered_realtime, 1);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn per_subscription_order_is_publish_order() {
        let fixture = fixture();
        let mut rx = connect(&fixture, "c1", 1, 64).await;
        fixture
            .manager
            .create("c1", create_params(&["t"], DeliveryPreferences::realtime()))
            .await
            .unwrap();

        for n in 0..10 {
            fixture
                .router
                .publish(Event::new("t", serde_json::json!({ "n": n })))
                .await;
        }

        for expected in 0..10 {
            let delivery = decode_event_notification(rx.recv().await.unwrap());
            assert_eq!(delivery.event.data["n"], expected);
        }
    }
}
