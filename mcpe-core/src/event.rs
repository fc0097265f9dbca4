//! The event model
//!
//! An [`Event`] is the immutable unit that producers publish into the hub.
//! Its `type` is a dot-notation hierarchical string (`github.push`,
//! `ci.pipeline.failed`) which the hub's match index uses for routing;
//! everything under `data` is opaque to the hub and forwarded verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Delivery priority attached to an event
///
/// Priorities do not reorder delivery; they exist so that filters can select
/// on them (e.g. "only `high` and `critical`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Metadata carried alongside the event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Identifier of the upstream occurrence this event was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
    /// When the event happened, absolute UTC
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    /// Unordered label set used by tag filters
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Producer identity, e.g. `github-webhook`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            source_event_id: None,
            timestamp: Utc::now(),
            priority: Priority::Normal,
            tags: BTreeSet::new(),
            source: None,
        }
    }
}

/// An immutable published event
///
/// Events are constructed once by a producer and never mutated afterwards;
/// the hub clones them into each matching delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique id, assigned at construction
    pub id: String,
    /// Hierarchical dot-notation type used for matching
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque structured payload, forwarded verbatim
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl Event {
    /// Create an event with a fresh id, the current timestamp and default
    /// metadata
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            data,
            metadata: EventMetadata::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = priority;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.metadata.timestamp = timestamp;
        self
    }
}
