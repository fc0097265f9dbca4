//! Subscription management
//!
//! The [`SubscriptionManager`] is the authoritative store of subscriptions.
//! One lock protects the subscription table, the per-client ownership index
//! and the [`MatchIndex`], so every public operation observes and produces a
//! consistent state: after `create` returns the subscription is routable,
//! and after `remove`/`pause`/expiry returns the router can never pick it as
//! a candidate again (deliveries already enqueued may still complete).
//!
//! # Lifecycle
//!
//! `create → active`, `active ↔ paused` via pause/resume, and any state can
//! move to `expired` (via the reaper, a scheduled flush with `auto_expire`,
//! or `expires_at`). `expired` is terminal.
//!
//! # Limits
//!
//! `max_per_client` bounds the number of simultaneously existing
//! subscriptions per client. Paused subscriptions count against the limit;
//! expired ones do not.

use crate::cron::CronSpec;
use crate::index::MatchIndex;
use crate::pattern::TypePattern;
use chrono::{DateTime, Utc};
use mcpe_core::model::{
    DeliveryClass, DeliveryPreferences, EventFilter, HandlerSpec, Subscription,
    SubscriptionStatus,
};
use mcpe_core::protocol::{CreateParams, UpdateParams};
use mcpe_core::{Error, Event, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A matched subscription, as the router needs it
///
/// Snapshot taken under the manager lock so the router can deliver without
/// holding it.
#[derive(Debug, Clone)]
pub struct DeliveryTarget {
    pub subscription_id: String,
    pub client_id: String,
    pub class: DeliveryClass,
    pub handler: Option<HandlerSpec>,
}

#[derive(Default)]
struct ManagerInner {
    subscriptions: HashMap<String, Subscription>,
    by_client: HashMap<String, HashSet<String>>,
    index: MatchIndex,
}

/// Authoritative subscription store with the matching index
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<Mutex<ManagerInner>>,
    max_per_client: usize,
}

impl SubscriptionManager {
    pub fn new(max_per_client: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManagerInner::default())),
            max_per_client,
        }
    }

    /// Validate filter and delivery shape the way `create` does
    ///
    /// Factored out so `update` applies identical rules to replacements.
    fn validate(filter: &EventFilter, delivery: &DeliveryPreferences) -> Result<()> {
        if let Some(patterns) = &filter.event_types {
            for pattern in patterns {
                TypePattern::parse(pattern).map_err(|e| {
                    Error::InvalidParams(format!("invalid event type pattern '{pattern}': {e}"))
                })?;
            }
        }

        if delivery.channels.is_empty() {
            return Err(Error::InvalidParams(
                "delivery.channels must not be empty".to_string(),
            ));
        }

        match delivery.class() {
            DeliveryClass::Cron => {
                let schedule = delivery.cron_schedule.as_ref().ok_or_else(|| {
                    Error::InvalidParams(
                        "cron channel requires a cron_schedule".to_string(),
                    )
                })?;
                CronSpec::parse(&schedule.expression, &schedule.timezone)
                    .map_err(|e| Error::InvalidParams(e.to_string()))?;
            }
            DeliveryClass::Scheduled => {
                let schedule = delivery.scheduled_delivery.as_ref().ok_or_else(|| {
                    Error::InvalidParams(
                        "scheduled channel requires a scheduled_delivery".to_string(),
                    )
                })?;
                if schedule.deliver_at <= Utc::now() {
                    return Err(Error::InvalidParams(
                        "scheduled_delivery.deliver_at is in the past".to_string(),
                    ));
                }
            }
            DeliveryClass::Realtime => {}
        }

        Ok(())
    }

    /// Create a subscription owned by `client_id`
    ///
    /// Errors with `InvalidParams` on any malformed filter/schedule and with
    /// `SubscriptionLimit` when the client already holds `max_per_client`
    /// non-expired subscriptions.
    pub async fn create(&self, client_id: &str, params: CreateParams) -> Result<Subscription> {
        Self::validate(&params.filter, &params.delivery)?;

        let mut inner = self.inner.lock().await;

        let occupied = inner
            .by_client
            .get(client_id)
            .map(|ids| {
                ids.iter()
                    .filter(|id| {
                        inner
                            .subscriptions
                            .get(*id)
                            .map(|s| s.status != SubscriptionStatus::Expired)
                            .unwrap_or(false)
                    })
                    .count()
            })
            .unwrap_or(0);
        if occupied >= self.max_per_client {
            return Err(Error::SubscriptionLimit(self.max_per_client));
        }

        let now = Utc::now();
        let subscription = Subscription {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            filter: params.filter,
            delivery: params.delivery,
            handler: params.handler,
            status: SubscriptionStatus::Active,
            created_at: now,
            updated_at: now,
            expires_at: params.expires_at,
        };

        inner.index.insert(&subscription.id, &subscription.filter);
        inner
            .by_client
            .entry(client_id.to_string())
            .or_default()
            .insert(subscription.id.clone());
        inner
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());

        tracing::info!(
            subscription_id = %subscription.id,
            client_id = %client_id,
            "Subscription created"
        );
        Ok(subscription)
    }

    /// Delete a subscription; further dispatches are impossible once this
    /// returns
    pub async fn remove(&self, client_id: &str, subscription_id: &str) -> Result<Subscription> {
        let mut inner = self.inner.lock().await;
        Self::check_owned(&inner, client_id, subscription_id)?;

        let subscription = inner
            .subscriptions
            .remove(subscription_id)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription_id.to_string()))?;
        if subscription.status == SubscriptionStatus::Active {
            inner.index.remove(subscription_id, &subscription.filter);
        }
        if let Some(ids) = inner.by_client.get_mut(client_id) {
            ids.remove(subscription_id);
            if ids.is_empty() {
                inner.by_client.remove(client_id);
            }
        }

        tracing::info!(subscription_id = %subscription_id, "Subscription removed");
        Ok(subscription)
    }

    /// List a client's subscriptions, optionally filtered by status
    pub async fn list(
        &self,
        client_id: &str,
        status: Option<SubscriptionStatus>,
    ) -> Vec<Subscription> {
        let inner = self.inner.lock().await;
        let mut subscriptions: Vec<Subscription> = inner
            .by_client
            .get(client_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.subscriptions.get(id))
                    .filter(|s| status.map_or(true, |wanted| s.status == wanted))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        subscriptions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        subscriptions
    }

    /// Apply a partial update; replacement filter/delivery revalidate exactly
    /// as on create
    pub async fn update(&self, client_id: &str, params: UpdateParams) -> Result<Subscription> {
        let mut inner = self.inner.lock().await;
        Self::check_owned(&inner, client_id, &params.subscription_id)?;

        let current = inner
            .subscriptions
            .get(&params.subscription_id)
            .cloned()
            .ok_or_else(|| Error::SubscriptionNotFound(params.subscription_id.clone()))?;
        if current.status == SubscriptionStatus::Expired {
            return Err(Error::InvalidParams(
                "cannot update an expired subscription".to_string(),
            ));
        }

        let next_filter = params.filter.unwrap_or_else(|| current.filter.clone());
        let next_delivery = params.delivery.unwrap_or_else(|| current.delivery.clone());
        Self::validate(&next_filter, &next_delivery)?;

        if current.status == SubscriptionStatus::Active {
            inner.index.remove(&current.id, &current.filter);
            inner.index.insert(&current.id, &next_filter);
        }

        let subscription = inner
            .subscriptions
            .get_mut(&params.subscription_id)
            .ok_or_else(|| Error::SubscriptionNotFound(params.subscription_id.clone()))?;
        subscription.filter = next_filter;
        subscription.delivery = next_delivery;
        if let Some(expires_at) = params.expires_at {
            subscription.expires_at = Some(expires_at);
        }
        subscription.updated_at = Utc::now();

        tracing::info!(subscription_id = %subscription.id, "Subscription updated");
        Ok(subscription.clone())
    }

    /// `active → paused`; no-op when already paused
    pub async fn pause(&self, client_id: &str, subscription_id: &str) -> Result<Subscription> {
        let mut inner = self.inner.lock().await;
        Self::check_owned(&inner, client_id, subscription_id)?;

        let current = inner
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| Error::SubscriptionNotFound(subscription_id.to_string()))?;
        match current.status {
            SubscriptionStatus::Expired => Err(Error::InvalidParams(
                "cannot pause an expired subscription".to_string(),
            )),
            SubscriptionStatus::Paused => Ok(current),
            SubscriptionStatus::Active => {
                inner.index.remove(subscription_id, &current.filter);
                let subscription = inner
                    .subscriptions
                    .get_mut(subscription_id)
                    .ok_or_else(|| Error::SubscriptionNotFound(subscription_id.to_string()))?;
                subscription.status = SubscriptionStatus::Paused;
                subscription.updated_at = Utc::now();
                tracing::info!(subscription_id = %subscription_id, "Subscription paused");
                Ok(subscription.clone())
            }
        }
    }

    /// `paused → active`; no-op when already active, rejected when expired
    pub async fn resume(&self, client_id: &str, subscription_id: &str) -> Result<Subscription> {
        let mut inner = self.inner.lock().await;
        Self::check_owned(&inner, client_id, subscription_id)?;

        let current = inner
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| Error::SubscriptionNotFound(subscription_id.to_string()))?;
        match current.status {
            SubscriptionStatus::Expired => Err(Error::InvalidParams(
                "cannot resume an expired subscription".to_string(),
            )),
            SubscriptionStatus::Active => Ok(current),
            SubscriptionStatus::Paused => {
                inner.index.insert(subscription_id, &current.filter);
                let subscription = inner
                    .subscriptions
                    .get_mut(subscription_id)
                    .ok_or_else(|| Error::SubscriptionNotFound(subscription_id.to_string()))?;
                subscription.status = SubscriptionStatus::Active;
                subscription.updated_at = Utc::now();
                tracing::info!(subscription_id = %subscription_id, "Subscription resumed");
                Ok(subscription.clone())
            }
        }
    }

    /// Force the terminal transition; idempotent
    ///
    /// Returns the subscription when this call performed the transition,
    /// `None` when it was already expired or unknown.
    pub async fn expire(&self, subscription_id: &str) -> Option<Subscription> {
        let mut inner = self.inner.lock().await;
        let current = inner.subscriptions.get(subscription_id)?.clone();
        if current.status == SubscriptionStatus::Expired {
            return None;
        }
        if current.status == SubscriptionStatus::Active {
            inner.index.remove(subscription_id, &current.filter);
        }
        let subscription = inner.subscriptions.get_mut(subscription_id)?;
        subscription.status = SubscriptionStatus::Expired;
        subscription.updated_at = Utc::now();
        tracing::info!(subscription_id = %subscription_id, "Subscription expired");
        Some(subscription.clone())
    }

    /// Expire everything whose `expires_at` has passed
    ///
    /// The reaper's sweep. Returns the subscriptions transitioned by this
    /// call so the caller can detach schedules and notify owners.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<Subscription> {
        let due: Vec<String> = {
            let inner = self.inner.lock().await;
            inner
                .subscriptions
                .values()
                .filter(|s| {
                    s.status != SubscriptionStatus::Expired
                        && s.expires_at.map_or(false, |at| at <= now)
                })
                .map(|s| s.id.clone())
                .collect()
        };

        let mut expired = Vec::with_capacity(due.len());
        for id in due {
            if let Some(subscription) = self.expire(&id).await {
                expired.push(subscription);
            }
        }
        expired
    }

    /// Find the active subscriptions an event must be delivered to
    ///
    /// Index lookup by type plus the attribute post-filter, snapshotted under
    /// the lock. The returned targets carry everything delivery needs, so no
    /// lock is held across any outbound write.
    pub async fn match_event(&self, event: &Event) -> Vec<DeliveryTarget> {
        let inner = self.inner.lock().await;
        inner
            .index
            .candidates(&event.event_type)
            .into_iter()
            .filter_map(|id| inner.subscriptions.get(&id))
            .filter(|s| s.filter.matches_attributes(event))
            .map(|s| DeliveryTarget {
                subscription_id: s.id.clone(),
                client_id: s.client_id.clone(),
                class: s.delivery.class(),
                handler: s.handler.clone(),
            })
            .collect()
    }

    /// Fetch one subscription regardless of owner (scheduler, reaper, tests)
    pub async fn get(&self, subscription_id: &str) -> Option<Subscription> {
        let inner = self.inner.lock().await;
        inner.subscriptions.get(subscription_id).cloned()
    }

    /// Subscriptions currently in the active state, for the metrics gauge
    pub async fn active_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .subscriptions
            .values()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .count()
    }

    fn check_owned(inner: &ManagerInner, client_id: &str, subscription_id: &str) -> Result<()> {
        match inner.subscriptions.get(subscription_id) {
            Some(subscription) if subscription.client_id == client_id => Ok(()),
            // Another client's subscription is indistinguishable from a
            // missing one
            _ => Err(Error::SubscriptionNotFound(subscription_id.to_string())),
        }
    }
}
