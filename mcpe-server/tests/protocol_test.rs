//! Wire-protocol behavior: handshake gating, error codes, malformed frames

use futures::{SinkExt, StreamExt};
use mcpe_client::HubClient;
use mcpe_core::model::{DeliveryPreferences, EventFilter};
use mcpe_server::EventHub;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn start_hub() -> (String, JoinHandle<()>) {
    let addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
    let hub = EventHub::builder().bind(addr).build().await.unwrap();
    let url = format!("ws://{}", hub.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let _ = hub.run().await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (url, server)
}

fn rpc_error_code(err: mcpe_core::Error) -> i32 {
    match err {
        mcpe_core::Error::Rpc(e) => e.code,
        other => panic!("expected rpc error, got {other:?}"),
    }
}

#[tokio::test]
async fn methods_before_initialize_are_rejected() {
    let (url, server) = start_hub().await;
    let client = HubClient::connect(&url).await.unwrap();

    let err = client.list_subscriptions(None).await.unwrap_err();
    assert_eq!(rpc_error_code(err), -32000);

    let err = client
        .create_subscription(EventFilter::default(), DeliveryPreferences::realtime())
        .await
        .unwrap_err();
    assert_eq!(rpc_error_code(err), -32000);

    server.abort();
}

#[tokio::test]
async fn incompatible_protocol_version_is_rejected() {
    let (url, server) = start_hub().await;
    let client = HubClient::connect(&url).await.unwrap();

    let err = client
        .initialize_with(mcpe_core::protocol::InitializeParams {
            protocol_version: "2017-06-05".to_string(),
            client_info: None,
            client_id: None,
        })
        .await
        .unwrap_err();
    assert_eq!(rpc_error_code(err), -32602);

    // The session stays uninitialized
    let err = client.list_subscriptions(None).await.unwrap_err();
    assert_eq!(rpc_error_code(err), -32000);

    server.abort();
}

#[tokio::test]
async fn unknown_method_is_32601() {
    let (url, server) = start_hub().await;
    let client = HubClient::connect(&url).await.unwrap();
    client.initialize().await.unwrap();

    let err = client
        .request::<_, serde_json::Value>("subscriptions/replay", serde_json::json!({}))
        .await
        .unwrap_err();
    assert_eq!(rpc_error_code(err), -32601);

    server.abort();
}

#[tokio::test]
async fn capabilities_and_schema_describe_the_hub() {
    let (url, server) = start_hub().await;
    let client = HubClient::connect(&url).await.unwrap();
    let init = client.initialize().await.unwrap();
    assert_eq!(init.protocol_version, "2025-01-01");
    assert!(!init.client_id.is_empty());

    let caps = client.capabilities().await.unwrap();
    assert_eq!(caps["channels"].as_array().unwrap().len(), 3);
    assert!(caps["scheduling"]["cron"].as_bool().unwrap());

    let schema = client.schema().await.unwrap();
    let operations = schema["operations"].as_array().unwrap();
    assert!(operations.iter().any(|op| op["name"] == "subscriptions/create"));

    server.abort();
}

#[tokio::test]
async fn acknowledge_succeeds_as_noop() {
    let (url, server) = start_hub().await;
    let client = HubClient::connect(&url).await.unwrap();
    client.initialize().await.unwrap();

    assert!(client.acknowledge("some-sub", "some-event").await.unwrap());

    server.abort();
}

#[tokio::test]
async fn malformed_json_gets_parse_error_with_null_id() {
    let (url, server) = start_hub().await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text("{this is not json".to_string()))
        .await
        .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Text(text) = response else {
        panic!("expected text frame");
    };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["error"]["code"], -32700);
    assert!(value["id"].is_null());

    server.abort();
}

#[tokio::test]
async fn invalid_request_keeps_recoverable_id() {
    let (url, server) = start_hub().await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut sink, mut stream) = ws.split();

    // Valid JSON, invalid JSON-RPC: no method, but the id is readable
    sink.send(Message::Text(
        r#"{"jsonrpc":"2.0","id":"req-42","bogus":true}"#.to_string(),
    ))
    .await
    .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Text(text) = response else {
        panic!("expected text frame");
    };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["error"]["code"], -32600);
    assert_eq!(value["id"], "req-42");

    server.abort();
}

#[tokio::test]
async fn batch_arrays_are_not_part_of_the_protocol() {
    let (url, server) = start_hub().await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(
        r#"[{"jsonrpc":"2.0","method":"initialize","id":1}]"#.to_string(),
    ))
    .await
    .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Text(text) = response else {
        panic!("expected text frame");
    };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["error"]["code"], -32600);

    server.abort();
}

#[tokio::test]
async fn created_subscription_echoes_request_fields() {
    let (url, server) = start_hub().await;
    let client = HubClient::connect(&url).await.unwrap();
    client.initialize().await.unwrap();

    let filter = EventFilter {
        event_types: Some(vec!["deploy.*".into()]),
        tags: Some(vec!["prod".into()]),
        ..Default::default()
    };
    let created = client
        .create_subscription(filter.clone(), DeliveryPreferences::cron("@daily"))
        .await
        .unwrap();

    assert_eq!(created.filter, filter);
    assert_eq!(
        created.delivery.cron_schedule.as_ref().unwrap().expression,
        "@daily"
    );
    assert_eq!(
        created.delivery.cron_schedule.as_ref().unwrap().max_events_per_delivery,
        100
    );

    // Create-then-list round trip: equal up to server-assigned fields
    let listed = client.list_subscriptions(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);
    assert_eq!(listed[0].filter, created.filter);
    assert_eq!(listed[0].delivery, created.delivery);

    server.abort();
}

#[tokio::test]
async fn invalid_cron_and_unknown_preset_are_32602() {
    let (url, server) = start_hub().await;
    let client = HubClient::connect(&url).await.unwrap();
    client.initialize().await.unwrap();

    let err = client
        .create_subscription(
            EventFilter::default(),
            DeliveryPreferences::cron("99 99 * * *"),
        )
        .await
        .unwrap_err();
    assert_eq!(rpc_error_code(err), -32602);

    let err = client
        .create_subscription(
            EventFilter::default(),
            DeliveryPreferences::cron("@fortnightly"),
        )
        .await
        .unwrap_err();
    assert_eq!(rpc_error_code(err), -32602);

    server.abort();
}
