//! The subscription model
//!
//! These are the shared domain types exchanged between clients and the hub:
//! filters, delivery preferences, handler descriptors and the subscription
//! record itself. Validation of semantic constraints (cron grammar, past
//! `deliver_at`, schedule/channel consistency) happens server-side; the types
//! here only enforce shape.

use crate::event::{Event, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A delivery channel a subscription can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    /// Push each matching event immediately
    Realtime,
    /// Aggregate matches and flush on a recurring schedule
    Cron,
    /// Aggregate matches and flush once at an absolute time
    Scheduled,
}

/// The effective delivery class of a subscription
///
/// A subscription names an ordered channel list but always lands in exactly
/// one class: the first aggregating channel wins, otherwise realtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryClass {
    Realtime,
    Cron,
    Scheduled,
}

/// Recurring-delivery schedule, required iff the `cron` channel is chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronSchedule {
    /// Five-field POSIX cron expression, or one of the `@hourly`, `@daily`,
    /// `@weekly`, `@monthly` presets
    pub expression: String,
    /// IANA timezone the expression is evaluated in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Suppress empty flushes when true (the default)
    #[serde(default = "default_true")]
    pub aggregate_events: bool,
    /// Upper bound on a single flushed batch; older events are dropped first
    #[serde(default = "default_max_events")]
    pub max_events_per_delivery: usize,
}

/// One-shot delivery schedule, required iff the `scheduled` channel is chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledDelivery {
    /// Absolute UTC instant of the single flush
    pub deliver_at: DateTime<Utc>,
    /// Informational timezone the client derived `deliver_at` in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Suppress the flush entirely when nothing was buffered
    #[serde(default = "default_true")]
    pub aggregate_events: bool,
    /// Expire the subscription atomically with the flush (the default)
    #[serde(default = "default_true")]
    pub auto_expire: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_events() -> usize {
    100
}

/// How a subscription wants its events delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPreferences {
    /// Ordered, non-empty channel list
    pub channels: Vec<DeliveryChannel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_schedule: Option<CronSchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_delivery: Option<ScheduledDelivery>,
}

impl DeliveryPreferences {
    /// Immediate push delivery
    pub fn realtime() -> Self {
        Self {
            channels: vec![DeliveryChannel::Realtime],
            cron_schedule: None,
            scheduled_delivery: None,
        }
    }

    /// Recurring aggregated delivery in UTC with defaults
    pub fn cron(expression: impl Into<String>) -> Self {
        Self {
            channels: vec![DeliveryChannel::Cron],
            cron_schedule: Some(CronSchedule {
                expression: expression.into(),
                timezone: default_timezone(),
                aggregate_events: true,
                max_events_per_delivery: default_max_events(),
            }),
            scheduled_delivery: None,
        }
    }

    /// Single aggregated delivery at `deliver_at`, auto-expiring
    pub fn scheduled_at(deliver_at: DateTime<Utc>) -> Self {
        Self {
            channels: vec![DeliveryChannel::Scheduled],
            cron_schedule: None,
            scheduled_delivery: Some(ScheduledDelivery {
                deliver_at,
                timezone: None,
                aggregate_events: true,
                auto_expire: true,
            }),
        }
    }

    /// The effective delivery class: first aggregating channel wins,
    /// otherwise realtime
    pub fn class(&self) -> DeliveryClass {
        for channel in &self.channels {
            match channel {
                DeliveryChannel::Cron => return DeliveryClass::Cron,
                DeliveryChannel::Scheduled => return DeliveryClass::Scheduled,
                DeliveryChannel::Realtime => {}
            }
        }
        DeliveryClass::Realtime
    }
}

/// Declarative interest in a slice of the event stream
///
/// Semantics: AND across fields, OR within a field. An omitted field always
/// matches, so the empty filter matches every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Type patterns: a literal type, `prefix.*`, or the universal `*`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<String>>,
    /// Matches when the event's tag set intersects this list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Matches when the event priority is in this list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Vec<Priority>>,
    /// Matches when the event source is in this list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

impl EventFilter {
    /// Evaluate the non-type predicates against an event
    ///
    /// Type-pattern matching is the match index's job; this covers the
    /// post-filter step (tags, priority, source) applied per candidate.
    pub fn matches_attributes(&self, event: &Event) -> bool {
        if let Some(tags) = &self.tags {
            if !tags.iter().any(|t| event.metadata.tags.contains(t)) {
                return false;
            }
        }
        if let Some(priorities) = &self.priority {
            if !priorities.contains(&event.metadata.priority) {
                return false;
            }
        }
        if let Some(sources) = &self.sources {
            match &event.metadata.source {
                Some(source) if sources.contains(source) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Lifecycle state of a subscription
///
/// `Expired` is terminal: no transition ever leaves it and no delivery is
/// made for an expired subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Expired,
}

/// Opaque descriptor of a server-side effect to run on delivery
///
/// The hub stores these verbatim and hands them to an effect sink once per
/// realtime event or once per flushed batch; executing them is an external
/// collaborator's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HandlerSpec {
    /// Run a shell command
    Bash {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
        env: std::collections::BTreeMap<String, String>,
        /// How the delivery payload reaches the process: `stdin` or `env`
        #[serde(default = "default_input_mode")]
        input_mode: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// POST the delivery payload to a URL
    Webhook {
        url: String,
        #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
        headers: std::collections::BTreeMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Hand the delivery payload to an LLM agent
    Agent {
        model: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        system_prompt: Option<String>,
        instructions: String,
        #[serde(default)]
        tools: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    },
}

fn default_input_mode() -> String {
    "stdin".to_string()
}

/// A client-owned subscription record
///
/// `id`, `status` and the timestamps are server-assigned; everything else
/// echoes what the client sent at create/update time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub client_id: String,
    #[serde(default)]
    pub filter: EventFilter,
    pub delivery: DeliveryPreferences,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<HandlerSpec>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}
