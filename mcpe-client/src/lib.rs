//! WebSocket client for the MCPE event hub
//!
//! Connect, initialize, manage subscriptions and receive event
//! notifications:
//!
//! ```rust,no_run
//! use mcpe_client::HubClient;
//! use mcpe_core::model::{DeliveryPreferences, EventFilter};
//! use mcpe_core::protocol::notifications;
//!
//! #[tokio::main]
//! async fn main() -> mcpe_core::Result<()> {
//!     let client = HubClient::connect("ws://localhost:8080").await?;
//!     client.initialize().await?;
//!
//!     client
//!         .on_notification(notifications::EVENT, |notification| async move {
//!             println!("event: {:?}", notification.params);
//!         })
//!         .await;
//!
//!     let filter = EventFilter {
//!         event_types: Some(vec!["github.*".into()]),
//!         ..Default::default()
//!     };
//!     client
//!         .create_subscription(filter, DeliveryPreferences::realtime())
//!         .await?;
//!     Ok(())
//! }
//! ```

mod client;
mod notification;
mod request;

pub use client::HubClient;
pub use notification::NotificationHandlers;
pub use request::RequestTracker;
