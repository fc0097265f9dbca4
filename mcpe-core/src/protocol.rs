//! Protocol constants and operation payloads
//!
//! Everything a client and the hub must agree on by name lives here: the
//! protocol version string, the method and notification names, and the typed
//! request/response payloads for each operation.

use crate::event::Event;
use crate::model::{
    DeliveryPreferences, EventFilter, HandlerSpec, Subscription, SubscriptionStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version string exchanged during `initialize`
pub const PROTOCOL_VERSION: &str = "2025-01-01";

/// Client → hub method names
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const CAPABILITIES: &str = "mcpe/capabilities";
    pub const SCHEMA: &str = "mcpe/schema";
    pub const SUBSCRIPTIONS_CREATE: &str = "subscriptions/create";
    pub const SUBSCRIPTIONS_REMOVE: &str = "subscriptions/remove";
    pub const SUBSCRIPTIONS_LIST: &str = "subscriptions/list";
    pub const SUBSCRIPTIONS_UPDATE: &str = "subscriptions/update";
    pub const SUBSCRIPTIONS_PAUSE: &str = "subscriptions/pause";
    pub const SUBSCRIPTIONS_RESUME: &str = "subscriptions/resume";
    pub const EVENTS_ACKNOWLEDGE: &str = "events/acknowledge";
}

/// Hub → client notification names
pub mod notifications {
    pub const EVENT: &str = "events/event";
    pub const BATCH: &str = "events/batch";
    pub const SUBSCRIPTION_EXPIRED: &str = "notifications/subscription_expired";
}

/// What the client sends with `initialize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
    /// Present when reattaching to subscriptions from a previous connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Client self-description, informational only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Hub self-description returned from `initialize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// What the hub answers to `initialize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: ServerInfo,
    /// The same payload `mcpe/capabilities` serves
    pub capabilities: serde_json::Value,
    /// The identity subscriptions created on this session are owned by
    pub client_id: String,
}

/// `subscriptions/create` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateParams {
    /// Omitted filter means "match every event"
    #[serde(default)]
    pub filter: EventFilter,
    pub delivery: DeliveryPreferences,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<HandlerSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Parameters naming a single subscription (`remove`, `pause`, `resume`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRefParams {
    pub subscription_id: String,
}

/// `subscriptions/list` parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListParams {
    /// When present, only subscriptions in this state are returned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
}

/// `subscriptions/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResult {
    pub subscriptions: Vec<Subscription>,
}

/// `subscriptions/update` parameters; absent fields stay unchanged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateParams {
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<EventFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryPreferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// `subscriptions/remove` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResult {
    pub success: bool,
}

/// `subscriptions/pause` / `subscriptions/resume` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleResult {
    pub success: bool,
    pub status: SubscriptionStatus,
}

/// `events/acknowledge` parameters
///
/// Realtime delivery is best-effort, so acknowledgements gate nothing; the
/// method exists so clients built against the protocol don't fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcknowledgeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// `events/acknowledge` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeResult {
    pub success: bool,
}

/// Payload of an `events/event` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDelivery {
    pub subscription_id: String,
    pub event: Event,
}

/// Payload of an `events/batch` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDelivery {
    pub subscription_id: String,
    pub events: Vec<Event>,
}

/// Payload of a `notifications/subscription_expired` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiredNotice {
    pub subscription_id: String,
    pub expired_at: DateTime<Utc>,
}
