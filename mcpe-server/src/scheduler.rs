//! Aggregated delivery scheduling
//!
//! One scheduler serves both aggregating delivery classes with a unified
//! min-heap keyed by next-fire instant: cron watches are re-armed with their
//! next occurrence after every fire, scheduled watches fire exactly once at
//! `deliver_at`. The background task sleeps until the earliest deadline and
//! is re-armed through a [`Notify`] whenever watch membership changes.
//!
//! Firing is split in two so the timing logic stays testable without a
//! clock: [`Scheduler::fire_due`] mutates scheduler state under its lock and
//! returns the resulting [`Flush`] values for an injected `now`;
//! [`run_scheduler`] drives it from real time and performs the deliveries
//! (batch notification, effect-sink invocation, and the auto-expire
//! transition) strictly after the lock is released.
//!
//! Heap entries are invalidated lazily: every watch carries a token, and a
//! popped entry whose token no longer matches the current watch is stale
//! (the subscription was unwatched or re-armed) and is discarded.

use crate::buffer::AggregationBuffer;
use crate::cron::CronSpec;
use crate::effect::{EffectDelivery, EffectSink};
use crate::metrics::HubMetrics;
use crate::session::SessionRegistry;
use crate::subscription::SubscriptionManager;
use chrono::{DateTime, Utc};
use mcpe_core::model::{DeliveryClass, HandlerSpec, Subscription};
use mcpe_core::protocol::{notifications, BatchDelivery};
use mcpe_core::{Event, RpcNotification};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};

#[derive(Debug)]
enum WatchKind {
    Cron {
        spec: CronSpec,
        aggregate_events: bool,
    },
    Scheduled {
        aggregate_events: bool,
        auto_expire: bool,
    },
}

#[derive(Debug)]
struct WatchEntry {
    kind: WatchKind,
    client_id: String,
    handler: Option<HandlerSpec>,
    token: u64,
}

#[derive(Debug, PartialEq, Eq)]
struct FireEntry {
    at: DateTime<Utc>,
    token: u64,
    subscription_id: String,
}

impl Ord for FireEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at
            .cmp(&other.at)
            .then(self.token.cmp(&other.token))
            .then(self.subscription_id.cmp(&other.subscription_id))
    }
}

impl PartialOrd for FireEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// One due delivery produced by [`Scheduler::fire_due`]
#[derive(Debug)]
pub struct Flush {
    pub subscription_id: String,
    pub client_id: String,
    pub class: DeliveryClass,
    /// Drained buffer contents, publish order
    pub events: Vec<Event>,
    pub handler: Option<HandlerSpec>,
    /// False when an empty fire was suppressed by `aggregate_events`
    pub notify: bool,
    /// Scheduled flush with `auto_expire`: expire atomically with delivery
    pub expire: bool,
}

#[derive(Default)]
struct SchedulerInner {
    watches: HashMap<String, WatchEntry>,
    buffers: HashMap<String, AggregationBuffer>,
    heap: BinaryHeap<Reverse<FireEntry>>,
    next_token: u64,
}

/// Timer heap and aggregation buffers for cron/scheduled subscriptions
pub struct Scheduler {
    inner: Mutex<SchedulerInner>,
    rearm: Notify,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SchedulerInner::default()),
            rearm: Notify::new(),
        }
    }

    /// Start tracking an aggregating subscription
    ///
    /// Realtime subscriptions are ignored. A scheduled watch whose
    /// `deliver_at` already passed is armed anyway and fires on the next
    /// pass. Watching an already-watched subscription re-arms it (the update
    /// path), discarding its old heap entries via the token.
    pub async fn watch(&self, subscription: &Subscription) {
        let (kind, first_fire) = match subscription.delivery.class() {
            DeliveryClass::Realtime => return,
            DeliveryClass::Cron => {
                let Some(schedule) = subscription.delivery.cron_schedule.as_ref() else {
                    return;
                };
                let Ok(spec) = CronSpec::parse(&schedule.expression, &schedule.timezone) else {
                    // Schedules are validated at create/update; an
                    // unparseable one here means the watch is unusable
                    tracing::error!(
                        subscription_id = %subscription.id,
                        "Refusing to watch subscription with invalid cron schedule"
                    );
                    return;
                };
                let Some(first) = spec.next_fire_after(Utc::now()) else {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        "Cron schedule has no future occurrence"
                    );
                    return;
                };
                (
                    WatchKind::Cron {
                        spec,
                        aggregate_events: schedule.aggregate_events,
                    },
                    first,
                )
            }
            DeliveryClass::Scheduled => {
                let Some(schedule) = subscription.delivery.scheduled_delivery.as_ref() else {
                    return;
                };
                (
                    WatchKind::Scheduled {
                        aggregate_events: schedule.aggregate_events,
                        auto_expire: schedule.auto_expire,
                    },
                    schedule.deliver_at,
                )
            }
        };

        let buffer = match subscription.delivery.class() {
            DeliveryClass::Cron => AggregationBuffer::bounded(
                subscription
                    .delivery
                    .cron_schedule
                    .as_ref()
                    .map(|s| s.max_events_per_delivery)
                    .unwrap_or(100),
            ),
            _ => AggregationBuffer::unbounded(),
        };

        let mut inner = self.inner.lock().await;
        let token = inner.next_token;
        inner.next_token += 1;
        inner.watches.insert(
            subscription.id.clone(),
            WatchEntry {
                kind,
                client_id: subscription.client_id.clone(),
                handler: subscription.handler.clone(),
                token,
            },
        );
        inner.buffers.insert(subscription.id.clone(), buffer);
        inner.heap.push(Reverse(FireEntry {
            at: first_fire,
            token,
            subscription_id: subscription.id.clone(),
        }));
        drop(inner);

        tracing::debug!(
            subscription_id = %subscription.id,
            fire_at = %first_fire,
            "Subscription scheduled"
        );
        self.rearm.notify_one();
    }

    /// Stop tracking a subscription and discard its buffer
    ///
    /// Heap entries become stale and are dropped on pop.
    pub async fn unwatch(&self, subscription_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.watches.remove(subscription_id);
        inner.buffers.remove(subscription_id);
        drop(inner);
        self.rearm.notify_one();
    }

    /// Append a routed event to a subscription's buffer
    ///
    /// Events for subscriptions no longer watched (raced with remove/pause)
    /// are dropped.
    pub async fn buffer_event(&self, subscription_id: &str, event: Event) {
        let mut inner = self.inner.lock().await;
        if let Some(buffer) = inner.buffers.get_mut(subscription_id) {
            buffer.push(event);
        }
    }

    /// Number of buffered events for a subscription
    pub async fn buffered_len(&self, subscription_id: &str) -> usize {
        let inner = self.inner.lock().await;
        inner
            .buffers
            .get(subscription_id)
            .map(AggregationBuffer::len)
            .unwrap_or(0)
    }

    /// The earliest armed fire instant, stale entries included
    ///
    /// Stale entries only make the loop wake early; `fire_due` discards
    /// them.
    pub async fn next_fire(&self) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().await;
        inner.heap.peek().map(|Reverse(entry)| entry.at)
    }

    /// Fire everything due at `now`, mutating scheduler state only
    ///
    /// Buffer snapshots and watch-table changes happen atomically under the
    /// scheduler lock; actual delivery is the caller's job, performed after
    /// this returns.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> Vec<Flush> {
        enum FireAction {
            Cron {
                next: Option<DateTime<Utc>>,
                aggregate_events: bool,
            },
            Scheduled {
                aggregate_events: bool,
                auto_expire: bool,
            },
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let mut flushes = Vec::new();

        loop {
            match inner.heap.peek() {
                Some(Reverse(top)) if top.at <= now => {}
                _ => break,
            }
            let Some(Reverse(entry)) = inner.heap.pop() else {
                break;
            };

            // Snapshot the watch; a token mismatch marks a stale entry from
            // before a re-arm
            let (client_id, handler, action) = match inner.watches.get(&entry.subscription_id) {
                Some(watch) if watch.token == entry.token => {
                    let action = match &watch.kind {
                        WatchKind::Cron {
                            spec,
                            aggregate_events,
                        } => FireAction::Cron {
                            next: spec.next_fire_after(now),
                            aggregate_events: *aggregate_events,
                        },
                        WatchKind::Scheduled {
                            aggregate_events,
                            auto_expire,
                        } => FireAction::Scheduled {
                            aggregate_events: *aggregate_events,
                            auto_expire: *auto_expire,
                        },
                    };
                    (watch.client_id.clone(), watch.handler.clone(), action)
                }
                _ => continue,
            };

            let events = inner
                .buffers
                .get_mut(&entry.subscription_id)
                .map(AggregationBuffer::drain)
                .unwrap_or_default();

            match action {
                FireAction::Cron {
                    next,
                    aggregate_events,
                } => {
                    let notify = !(events.is_empty() && aggregate_events);
                    if notify {
                        flushes.push(Flush {
                            subscription_id: entry.subscription_id.clone(),
                            client_id,
                            class: DeliveryClass::Cron,
                            events,
                            handler,
                            notify,
                            expire: false,
                        });
                    }
                    match next {
                        Some(at) => inner.heap.push(Reverse(FireEntry {
                            at,
                            token: entry.token,
                            subscription_id: entry.subscription_id,
                        })),
                        None => {
                            inner.watches.remove(&entry.subscription_id);
                            inner.buffers.remove(&entry.subscription_id);
                        }
                    }
                }
                FireAction::Scheduled {
                    aggregate_events,
                    auto_expire,
                } => {
                    let notify = !(events.is_empty() && aggregate_events);
                    // One-shot: the watch is gone whatever happens next
                    inner.watches.remove(&entry.subscription_id);
                    inner.buffers.remove(&entry.subscription_id);
                    if notify || auto_expire {
                        flushes.push(Flush {
                            subscription_id: entry.subscription_id,
                            client_id,
                            class: DeliveryClass::Scheduled,
                            events,
                            handler,
                            notify,
                            expire: auto_expire,
                        });
                    }
                }
            }
        }

        flushes
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Perform the deliveries for a batch of flushes
///
/// Runs with no scheduler lock held: the expiry transition goes through the
/// manager, the batch notification through the owner's outbound queue (an
/// awaited send, aggregated deliveries are never dropped to backpressure),
/// and the handler through the effect sink, spawned fire-and-forget.
pub async fn deliver_flushes(
    flushes: Vec<Flush>,
    manager: &SubscriptionManager,
    registry: &SessionRegistry,
    effects: &Arc<dyn EffectSink>,
    metrics: &Option<Arc<HubMetrics>>,
) {
    for flush in flushes {
        if flush.expire {
            manager.expire(&flush.subscription_id).await;
        }

        if !flush.notify {
            continue;
        }

        let class = match flush.class {
            DeliveryClass::Cron => "cron",
            DeliveryClass::Scheduled => "scheduled",
            DeliveryClass::Realtime => "realtime",
        };
        if let Some(m) = metrics {
            m.record_batch_flush(flush.events.len() as u64, class);
            m.record_delivery(class);
        }

        let payload = BatchDelivery {
            subscription_id: flush.subscription_id.clone(),
            events: flush.events.clone(),
        };
        match serde_json::to_value(&payload) {
            Ok(params) => {
                let notification = RpcNotification::new(notifications::BATCH, Some(params));
                match registry.handle_for_client(&flush.client_id).await {
                    Some(handle) => {
                        if let Err(e) = handle.send_notification(&notification).await {
                            tracing::warn!(
                                subscription_id = %flush.subscription_id,
                                error = %e,
                                "Failed to deliver batch"
                            );
                        }
                    }
                    None => {
                        tracing::debug!(
                            subscription_id = %flush.subscription_id,
                            client_id = %flush.client_id,
                            "Owner offline, batch not delivered"
                        );
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode batch payload");
            }
        }

        if let Some(handler) = flush.handler {
            let effects = Arc::clone(effects);
            let delivery = EffectDelivery {
                subscription_id: flush.subscription_id,
                client_id: flush.client_id,
                handler,
                events: flush.events,
            };
            tokio::spawn(async move {
                effects.invoke(delivery).await;
            });
        }
    }
}

/// Background task driving the scheduler from real time
///
/// Sleeps until the earliest armed deadline, wakes early when membership
/// changes, and exits on the shutdown signal.
pub async fn run_scheduler(
    scheduler: Arc<Scheduler>,
    manager: SubscriptionManager,
    registry: SessionRegistry,
    effects: Arc<dyn EffectSink>,
    metrics: Option<Arc<HubMetrics>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::info!("Scheduler task started");

    loop {
        let sleep_for = match scheduler.next_fire().await {
            Some(at) => (at - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO),
            // Nothing armed; wait for a watch() to re-arm us
            None => std::time::Duration::from_secs(3600),
        };

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {
                let flushes = scheduler.fire_due(Utc::now()).await;
                if !flushes.is_empty() {
                    deliver_flushes(flushes, &manager, &registry, &effects, &metrics).await;
                }
            }
            _ = scheduler.rearm.notified() => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Scheduler task shutting down");
                    break;
                }
            }
        }
    }
}
