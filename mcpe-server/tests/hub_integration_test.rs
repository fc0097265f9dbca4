//! End-to-end delivery scenarios over a loopback WebSocket

use mcpe_client::HubClient;
use mcpe_core::model::{DeliveryPreferences, EventFilter, SubscriptionStatus};
use mcpe_core::protocol::{notifications, BatchDelivery, EventDelivery, ExpiredNotice};
use mcpe_core::{Event, Priority};
use mcpe_server::{EventHub, EventRouter};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct TestHub {
    publisher: EventRouter,
    url: String,
    server: JoinHandle<()>,
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn start_hub(max_subscriptions: usize) -> TestHub {
    let addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
    let hub = EventHub::builder()
        .bind(addr)
        .max_subscriptions_per_client(max_subscriptions)
        .reaper_interval(Duration::from_millis(50))
        .build()
        .await
        .unwrap();

    let url = format!("ws://{}", hub.local_addr().unwrap());
    let publisher = hub.publisher();
    let server = tokio::spawn(async move {
        let _ = hub.run().await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestHub {
        publisher,
        url,
        server,
    }
}

async fn connected_client(hub: &TestHub) -> HubClient {
    let client = HubClient::connect(&hub.url).await.unwrap();
    client.initialize().await.unwrap();
    client
}

/// Channel-backed collector for one notification method
async fn collect_notifications<T: serde::de::DeserializeOwned + Send + 'static>(
    client: &HubClient,
    method: &str,
) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(64);
    client
        .on_notification(method, move |notification| {
            let tx = tx.clone();
            async move {
                if let Some(params) = notification.params {
                    if let Ok(payload) = serde_json::from_value::<T>(params) {
                        let _ = tx.send(payload).await;
                    }
                }
            }
        })
        .await;
    rx
}

async fn recv_within<T>(rx: &mut mpsc::Receiver<T>, millis: u64) -> Option<T> {
    tokio::time::timeout(Duration::from_millis(millis), rx.recv())
        .await
        .ok()
        .flatten()
}

fn typed_filter(patterns: &[&str]) -> EventFilter {
    EventFilter {
        event_types: Some(patterns.iter().map(|p| p.to_string()).collect()),
        ..Default::default()
    }
}

#[tokio::test]
async fn realtime_single_delivery() {
    let hub = start_hub(100).await;
    let client = connected_client(&hub).await;
    let mut events = collect_notifications::<EventDelivery>(&client, notifications::EVENT).await;

    let sub = client
        .create_subscription(typed_filter(&["github.push"]), DeliveryPreferences::realtime())
        .await
        .unwrap();

    hub.publisher
        .publish(Event::new("github.push", serde_json::json!({"repo": "a/b"})))
        .await;

    let delivery = recv_within(&mut events, 2000).await.expect("one delivery");
    assert_eq!(delivery.subscription_id, sub.id);
    assert_eq!(delivery.event.event_type, "github.push");
    assert_eq!(delivery.event.data["repo"], "a/b");

    // Exactly one: nothing else arrives
    assert!(recv_within(&mut events, 200).await.is_none());
}

#[tokio::test]
async fn wildcard_and_priority_filter_and_together() {
    let hub = start_hub(100).await;
    let client = connected_client(&hub).await;
    let mut events = collect_notifications::<EventDelivery>(&client, notifications::EVENT).await;

    let mut filter = typed_filter(&["github.*"]);
    filter.priority = Some(vec![Priority::High, Priority::Critical]);
    client
        .create_subscription(filter, DeliveryPreferences::realtime())
        .await
        .unwrap();

    // Type matches, priority does not
    hub.publisher
        .publish(Event::new("github.push", serde_json::json!({})))
        .await;
    assert!(recv_within(&mut events, 300).await.is_none());

    // Both match
    hub.publisher
        .publish(
            Event::new("github.issues.opened", serde_json::json!({}))
                .with_priority(Priority::High),
        )
        .await;
    let delivery = recv_within(&mut events, 2000).await.expect("high priority delivered");
    assert_eq!(delivery.event.event_type, "github.issues.opened");
}

#[tokio::test]
async fn prefix_pattern_excludes_the_bare_prefix() {
    let hub = start_hub(100).await;
    let client = connected_client(&hub).await;
    let mut events = collect_notifications::<EventDelivery>(&client, notifications::EVENT).await;

    client
        .create_subscription(typed_filter(&["github.*"]), DeliveryPreferences::realtime())
        .await
        .unwrap();

    hub.publisher
        .publish(Event::new("github", serde_json::json!({})))
        .await;
    assert!(recv_within(&mut events, 300).await.is_none());

    hub.publisher
        .publish(Event::new("github.push", serde_json::json!({})))
        .await;
    assert!(recv_within(&mut events, 2000).await.is_some());
}

#[tokio::test]
async fn scheduled_delivery_flushes_and_auto_expires() {
    let hub = start_hub(100).await;
    let client = connected_client(&hub).await;
    let mut batches = collect_notifications::<BatchDelivery>(&client, notifications::BATCH).await;

    let deliver_at = chrono::Utc::now() + chrono::Duration::milliseconds(900);
    let sub = client
        .create_subscription(
            typed_filter(&["report.*"]),
            DeliveryPreferences::scheduled_at(deliver_at),
        )
        .await
        .unwrap();

    hub.publisher
        .publish(Event::new("report.cpu", serde_json::json!({"n": 0})))
        .await;
    hub.publisher
        .publish(Event::new("report.mem", serde_json::json!({"n": 1})))
        .await;

    let batch = recv_within(&mut batches, 5000).await.expect("one batch");
    assert_eq!(batch.subscription_id, sub.id);
    assert_eq!(batch.events.len(), 2);
    // Publish order preserved
    assert_eq!(batch.events[0].data["n"], 0);
    assert_eq!(batch.events[1].data["n"], 1);

    // Terminal state is visible to list
    tokio::time::sleep(Duration::from_millis(100)).await;
    let listed = client.list_subscriptions(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, SubscriptionStatus::Expired);

    // And nothing more is ever delivered
    hub.publisher
        .publish(Event::new("report.cpu", serde_json::json!({"n": 2})))
        .await;
    assert!(recv_within(&mut batches, 300).await.is_none());
}

#[tokio::test]
async fn pause_blocks_delivery_resume_restores_it() {
    let hub = start_hub(100).await;
    let client = connected_client(&hub).await;
    let mut events = collect_notifications::<EventDelivery>(&client, notifications::EVENT).await;

    let sub = client
        .create_subscription(typed_filter(&["job.done"]), DeliveryPreferences::realtime())
        .await
        .unwrap();

    let status = client.pause_subscription(&sub.id).await.unwrap();
    assert_eq!(status, SubscriptionStatus::Paused);

    hub.publisher
        .publish(Event::new("job.done", serde_json::json!({"run": 1})))
        .await;
    assert!(recv_within(&mut events, 300).await.is_none());

    let status = client.resume_subscription(&sub.id).await.unwrap();
    assert_eq!(status, SubscriptionStatus::Active);

    hub.publisher
        .publish(Event::new("job.done", serde_json::json!({"run": 2})))
        .await;
    let delivery = recv_within(&mut events, 2000).await.expect("delivered after resume");
    assert_eq!(delivery.event.data["run"], 2);
}

#[tokio::test]
async fn per_client_limit_counts_paused_but_not_removed() {
    let hub = start_hub(2).await;
    let client = connected_client(&hub).await;

    let first = client
        .create_subscription(EventFilter::default(), DeliveryPreferences::realtime())
        .await
        .unwrap();
    client
        .create_subscription(EventFilter::default(), DeliveryPreferences::realtime())
        .await
        .unwrap();

    // Third create: limit reached
    let err = client
        .create_subscription(EventFilter::default(), DeliveryPreferences::realtime())
        .await
        .unwrap_err();
    match err {
        mcpe_core::Error::Rpc(e) => assert_eq!(e.code, -32002),
        other => panic!("expected limit error, got {other:?}"),
    }

    // Pausing does not free the slot
    client.pause_subscription(&first.id).await.unwrap();
    let err = client
        .create_subscription(EventFilter::default(), DeliveryPreferences::realtime())
        .await
        .unwrap_err();
    match err {
        mcpe_core::Error::Rpc(e) => assert_eq!(e.code, -32002),
        other => panic!("expected limit error, got {other:?}"),
    }

    // Removing does
    client.remove_subscription(&first.id).await.unwrap();
    client
        .create_subscription(EventFilter::default(), DeliveryPreferences::realtime())
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_subscription_notifies_owner() {
    let hub = start_hub(100).await;
    let client = connected_client(&hub).await;
    let mut expiries =
        collect_notifications::<ExpiredNotice>(&client, notifications::SUBSCRIPTION_EXPIRED).await;

    let sub = client
        .create_subscription_with(mcpe_core::protocol::CreateParams {
            filter: EventFilter::default(),
            delivery: DeliveryPreferences::realtime(),
            handler: None,
            expires_at: Some(chrono::Utc::now() + chrono::Duration::milliseconds(300)),
        })
        .await
        .unwrap();

    let notice = recv_within(&mut expiries, 5000).await.expect("expiry notice");
    assert_eq!(notice.subscription_id, sub.id);

    let listed = client
        .list_subscriptions(Some(SubscriptionStatus::Expired))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, sub.id);
}

#[tokio::test]
async fn delivery_order_matches_publish_order() {
    let hub = start_hub(100).await;
    let client = connected_client(&hub).await;
    let mut events = collect_notifications::<EventDelivery>(&client, notifications::EVENT).await;

    client
        .create_subscription(typed_filter(&["seq.*"]), DeliveryPreferences::realtime())
        .await
        .unwrap();

    for n in 0..20 {
        hub.publisher
            .publish(Event::new("seq.tick", serde_json::json!({ "n": n })))
            .await;
    }

    for expected in 0..20 {
        let delivery = recv_within(&mut events, 2000).await.expect("in-order delivery");
        assert_eq!(delivery.event.data["n"], expected);
    }
}

#[tokio::test]
async fn reconnect_reattaches_subscriptions_by_client_id() {
    let hub = start_hub(100).await;

    let first = HubClient::connect(&hub.url).await.unwrap();
    let init = first.initialize().await.unwrap();
    let client_id = init.client_id;
    let sub = first
        .create_subscription(typed_filter(&["github.*"]), DeliveryPreferences::realtime())
        .await
        .unwrap();
    first.disconnect().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Published while offline: dropped (best-effort realtime), not an error
    hub.publisher
        .publish(Event::new("github.push", serde_json::json!({"n": 0})))
        .await;

    let second = HubClient::connect(&hub.url).await.unwrap();
    second.initialize_as(&client_id).await.unwrap();
    let mut events = collect_notifications::<EventDelivery>(&second, notifications::EVENT).await;

    // The subscription survived the disconnect
    let listed = second.list_subscriptions(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, sub.id);

    // And deliveries flow to the new connection
    hub.publisher
        .publish(Event::new("github.push", serde_json::json!({"n": 1})))
        .await;
    let delivery = recv_within(&mut events, 2000).await.expect("delivery after reattach");
    assert_eq!(delivery.event.data["n"], 1);
}

#[tokio::test]
async fn two_clients_receive_independently() {
    let hub = start_hub(100).await;
    let alice = connected_client(&hub).await;
    let bob = connected_client(&hub).await;
    let mut alice_events =
        collect_notifications::<EventDelivery>(&alice, notifications::EVENT).await;
    let mut bob_events = collect_notifications::<EventDelivery>(&bob, notifications::EVENT).await;

    alice
        .create_subscription(typed_filter(&["alerts.*"]), DeliveryPreferences::realtime())
        .await
        .unwrap();
    bob.create_subscription(typed_filter(&["metrics.*"]), DeliveryPreferences::realtime())
        .await
        .unwrap();

    hub.publisher
        .publish(Event::new("alerts.cpu", serde_json::json!({})))
        .await;

    assert!(recv_within(&mut alice_events, 2000).await.is_some());
    assert!(recv_within(&mut bob_events, 300).await.is_none());
}
