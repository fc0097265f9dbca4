//! Capability and schema service
//!
//! Static read-only payloads for `mcpe/capabilities` and `mcpe/schema`.
//! Capabilities describe what this hub supports (limits, channels,
//! priorities, filter and scheduling features); the schema payload carries a
//! structured descriptor per operation (name, description, input/output
//! shape and an example) so a client-side reasoner can construct valid
//! requests without out-of-band documentation.

use mcpe_core::protocol::{methods, PROTOCOL_VERSION};
use serde_json::json;

/// The `mcpe/capabilities` payload
pub fn capabilities(max_subscriptions_per_client: usize) -> serde_json::Value {
    json!({
        "protocol_version": PROTOCOL_VERSION,
        "max_active_subscriptions_per_client": max_subscriptions_per_client,
        "channels": ["realtime", "cron", "scheduled"],
        "priorities": ["low", "normal", "high", "critical"],
        "filters": {
            "event_type_wildcards": true,
            "tags": true,
            "priority": true,
            "sources": true,
        },
        "scheduling": {
            "cron": true,
            "cron_presets": ["@hourly", "@daily", "@weekly", "@monthly"],
            "scheduled": true,
            "timezones": "iana",
        },
        "handlers": ["bash", "webhook", "agent"],
    })
}

/// The `mcpe/schema` payload: one descriptor per operation
pub fn schema() -> serde_json::Value {
    json!({
        "operations": [
            {
                "name": methods::INITIALIZE,
                "description": "Handshake. Must be the first request on a connection; unlocks every other method.",
                "input": {
                    "protocol_version": "string (must be \"2025-01-01\")",
                    "client_info": { "name": "string", "version": "string?" },
                    "client_id": "string? (reattach to subscriptions from a previous connection)",
                },
                "output": {
                    "protocol_version": "string",
                    "server_info": { "name": "string", "version": "string" },
                    "capabilities": "object",
                    "client_id": "string",
                },
                "example": {
                    "protocol_version": "2025-01-01",
                    "client_info": { "name": "triage-agent", "version": "1.0" },
                },
            },
            {
                "name": methods::CAPABILITIES,
                "description": "Read the hub's capability descriptor.",
                "input": {},
                "output": "capabilities object",
                "example": {},
            },
            {
                "name": methods::SCHEMA,
                "description": "Read these operation descriptors.",
                "input": {},
                "output": { "operations": "array" },
                "example": {},
            },
            {
                "name": methods::SUBSCRIPTIONS_CREATE,
                "description": "Create a subscription. Filter fields AND together; within a field, values OR. Aggregating channels require their schedule object.",
                "input": {
                    "filter": {
                        "event_types": "string[]? (literal, prefix.*, or *)",
                        "tags": "string[]?",
                        "priority": "string[]?",
                        "sources": "string[]?",
                    },
                    "delivery": {
                        "channels": "(realtime|cron|scheduled)[], non-empty",
                        "cron_schedule": {
                            "expression": "5-field cron or @hourly/@daily/@weekly/@monthly",
                            "timezone": "IANA name, default UTC",
                            "aggregate_events": "bool, default true",
                            "max_events_per_delivery": "int, default 100",
                        },
                        "scheduled_delivery": {
                            "deliver_at": "RFC 3339 UTC instant, must be in the future",
                            "aggregate_events": "bool, default true",
                            "auto_expire": "bool, default true",
                        },
                    },
                    "handler": "handler spec? (bash | webhook | agent)",
                    "expires_at": "RFC 3339 instant?",
                },
                "output": "the full subscription record",
                "example": {
                    "filter": { "event_types": ["github.*"], "priority": ["high", "critical"] },
                    "delivery": { "channels": ["realtime"] },
                },
            },
            {
                "name": methods::SUBSCRIPTIONS_REMOVE,
                "description": "Delete a subscription you own.",
                "input": { "subscription_id": "string" },
                "output": { "success": "bool" },
                "example": { "subscription_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7" },
            },
            {
                "name": methods::SUBSCRIPTIONS_LIST,
                "description": "List your subscriptions, optionally by status.",
                "input": { "status": "active|paused|expired (optional)" },
                "output": { "subscriptions": "subscription[]" },
                "example": { "status": "active" },
            },
            {
                "name": methods::SUBSCRIPTIONS_UPDATE,
                "description": "Partial update: absent fields stay unchanged; replacements validate like create.",
                "input": {
                    "subscription_id": "string",
                    "filter": "filter?",
                    "delivery": "delivery preferences?",
                    "expires_at": "RFC 3339 instant?",
                },
                "output": "the updated subscription record",
                "example": {
                    "subscription_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
                    "filter": { "event_types": ["ci.*"] },
                },
            },
            {
                "name": methods::SUBSCRIPTIONS_PAUSE,
                "description": "Stop deliveries without losing the subscription. Idempotent.",
                "input": { "subscription_id": "string" },
                "output": { "success": "bool", "status": "paused" },
                "example": { "subscription_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7" },
            },
            {
                "name": methods::SUBSCRIPTIONS_RESUME,
                "description": "Re-enable a paused subscription. Idempotent; fails for expired ones.",
                "input": { "subscription_id": "string" },
                "output": { "success": "bool", "status": "active" },
                "example": { "subscription_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7" },
            },
            {
                "name": methods::EVENTS_ACKNOWLEDGE,
                "description": "Acknowledge a delivery. Accepted for protocol compatibility; realtime delivery is best-effort and nothing is gated on acks.",
                "input": { "subscription_id": "string?", "event_id": "string?" },
                "output": { "success": "bool" },
                "example": { "subscription_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7", "event_id": "ev-1" },
            },
        ],
        "notifications": [
            { "name": "events/event", "params": { "subscription_id": "string", "event": "event" } },
            { "name": "events/batch", "params": { "subscription_id": "string", "events": "event[]" } },
            { "name": "notifications/subscription_expired", "params": { "subscription_id": "string", "expired_at": "RFC 3339 instant" } },
        ],
    })
}
