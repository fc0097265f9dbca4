//! MCPE - an event subscription hub over WebSocket
//!
//! This is the main convenience crate that re-exports all MCPE sub-crates.
//! Use this crate if you want a single dependency that provides both the hub
//! and a client for it.
//!
//! # Architecture
//!
//! MCPE is organized into modular crates:
//!
//! - **mcpe-core**: JSON-RPC 2.0 wire types, the event/subscription model,
//!   error handling, observability
//! - **mcpe-server**: the hub itself: sessions, subscription management,
//!   event routing, cron/scheduled delivery
//! - **mcpe-client**: WebSocket client for driving the hub
//!
//! # Quick Start - Hub
//!
//! ```rust,no_run
//! use mcpe::EventHub;
//! use mcpe::core::Event;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let addr: std::net::SocketAddr = "127.0.0.1:8080".parse()?;
//!     let hub = EventHub::builder()
//!         .bind(addr)
//!         .build()
//!         .await?;
//!
//!     let publisher = hub.publisher();
//!     tokio::spawn(async move {
//!         let event = Event::new("github.push", serde_json::json!({"repo": "a/b"}));
//!         let _ = publisher.publish(event).await;
//!     });
//!
//!     hub.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - Client
//!
//! ```rust,no_run
//! use mcpe::HubClient;
//! use mcpe::core::model::{DeliveryPreferences, EventFilter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HubClient::connect("ws://localhost:8080").await?;
//!     client.initialize().await?;
//!
//!     let filter = EventFilter {
//!         event_types: Some(vec!["github.*".into()]),
//!         ..Default::default()
//!     };
//!     let sub = client.create_subscription(filter, DeliveryPreferences::realtime()).await?;
//!     println!("Subscribed: {}", sub.id);
//!
//!     Ok(())
//! }
//! ```

// Re-export all public APIs from sub-crates
// This allows users to access everything through `mcpe::` prefix
pub use mcpe_client as client;
pub use mcpe_core as core;
pub use mcpe_server as server;

// Convenience re-exports of the most commonly used types
// This avoids needing to write `mcpe::server::EventHub`
pub use mcpe_client::HubClient;
pub use mcpe_server::EventHub;
