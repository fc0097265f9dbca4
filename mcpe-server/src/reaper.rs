//! Expiration reaper
//!
//! Background sweep over subscriptions with an `expires_at`. Each tick moves
//! everything past its deadline into the terminal `expired` state, detaches
//! it from the scheduler, and tells the owning session with a
//! `notifications/subscription_expired` push when it is connected.
//!
//! A failed notification never stops the sweep; one subscription's problems
//! must not affect the others.

use crate::scheduler::Scheduler;
use crate::session::SessionRegistry;
use crate::subscription::SubscriptionManager;
use chrono::Utc;
use mcpe_core::protocol::{notifications, ExpiredNotice};
use mcpe_core::RpcNotification;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;

/// Run the reaper until shutdown is signalled
pub async fn run_reaper(
    manager: SubscriptionManager,
    scheduler: Arc<Scheduler>,
    registry: SessionRegistry,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(interval);

    tracing::info!(interval_ms = interval.as_millis() as u64, "Reaper task started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&manager, &scheduler, &registry).await;
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Reaper task shutting down");
                    break;
                }
            }
        }
    }
}

/// One reaper pass; factored out for direct use in tests
pub async fn sweep(
    manager: &SubscriptionManager,
    scheduler: &Scheduler,
    registry: &SessionRegistry,
) {
    let now = Utc::now();
    let expired = manager.sweep_expired(now).await;

    for subscription in expired {
        scheduler.unwatch(&subscription.id).await;

        tracing::info!(
            subscription_id = %subscription.id,
            client_id = %subscription.client_id,
            "Subscription reaped"
        );

        let Some(handle) = registry.handle_for_client(&subscription.client_id).await else {
            continue;
        };
        let notice = ExpiredNotice {
            subscription_id: subscription.id.clone(),
            expired_at: now,
        };
        let params = match serde_json::to_value(&notice) {
            Ok(params) => params,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode expiry notice");
                continue;
            }
        };
        let notification =
            RpcNotification::new(notifications::SUBSCRIPTION_EXPIRED, Some(params));
        if let Err(e) = handle.send_notification(&notification).await {
            tracing::warn!(
                subscription_id = %subscription.id,
                error = %e,
                "Failed to deliver expiry notice"
            );
        }
    }
}
