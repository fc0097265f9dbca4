//! Hub metrics
//!
//! OpenTelemetry instruments covering the hub's health: connection and
//! subscription gauges, request throughput and latency, publish/delivery
//! counters, and the `dropped_realtime` counter that makes the backpressure
//! drop policy observable. All instruments are prefixed `mcpe.hub.*`.
//!
//! Metrics are recorded only when observability is enabled on the builder;
//! every call site goes through an `Option<Arc<HubMetrics>>`.

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

/// Instrument bundle for one hub instance
pub struct HubMetrics {
    /// Currently open WebSocket connections
    pub connections_active: Gauge<i64>,
    /// Connections accepted since startup
    pub connections_total: Counter<u64>,
    /// JSON-RPC requests processed
    pub requests_total: Counter<u64>,
    /// Request processing latency in seconds
    pub request_duration: Histogram<f64>,
    /// Events accepted through `publish`
    pub publishes_total: Counter<u64>,
    /// Deliveries enqueued, labelled by delivery class
    pub deliveries_total: Counter<u64>,
    /// Realtime notifications dropped to backpressure or absent sessions
    pub dropped_realtime: Counter<u64>,
    /// Flushed batch size distribution
    pub batch_size: Histogram<u64>,
    /// Subscriptions currently in the active state
    pub subscriptions_active: Gauge<i64>,
    /// Errors by kind
    pub errors_total: Counter<u64>,
}

impl HubMetrics {
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connections_active: meter
                .i64_gauge("mcpe.hub.connections.active")
                .with_description("Number of open WebSocket connections")
                .build(),
            connections_total: meter
                .u64_counter("mcpe.hub.connections.total")
                .with_description("Total connections accepted")
                .build(),
            requests_total: meter
                .u64_counter("mcpe.hub.requests.total")
                .with_description("Total JSON-RPC requests processed")
                .build(),
            request_duration: meter
                .f64_histogram("mcpe.hub.request.duration")
                .with_description("Request processing duration in seconds")
                .build(),
            publishes_total: meter
                .u64_counter("mcpe.hub.publishes.total")
                .with_description("Events accepted for routing")
                .build(),
            deliveries_total: meter
                .u64_counter("mcpe.hub.deliveries.total")
                .with_description("Deliveries enqueued, by delivery class")
                .build(),
            dropped_realtime: meter
                .u64_counter("mcpe.hub.dropped_realtime.total")
                .with_description("Realtime deliveries dropped on overflow or absent session")
                .build(),
            batch_size: meter
                .u64_histogram("mcpe.hub.batch.size")
                .with_description("Events per flushed batch")
                .build(),
            subscriptions_active: meter
                .i64_gauge("mcpe.hub.subscriptions.active")
                .with_description("Subscriptions currently active")
                .build(),
            errors_total: meter
                .u64_counter("mcpe.hub.errors.total")
                .with_description("Errors by kind")
                .build(),
        }
    }

    pub fn record_connection(&self, active: i64) {
        self.connections_active.record(active, &[]);
        self.connections_total.add(1, &[]);
    }

    pub fn record_disconnection(&self, active: i64) {
        self.connections_active.record(active, &[]);
    }

    pub fn record_request(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_publish(&self, event_type: &str) {
        self.publishes_total
            .add(1, &[KeyValue::new("event_type", event_type.to_string())]);
    }

    pub fn record_delivery(&self, class: &str) {
        self.deliveries_total
            .add(1, &[KeyValue::new("class", class.to_string())]);
    }

    pub fn record_dropped_realtime(&self) {
        self.dropped_realtime.add(1, &[]);
    }

    pub fn record_batch_flush(&self, size: u64, class: &str) {
        self.batch_size
            .record(size, &[KeyValue::new("class", class.to_string())]);
    }

    pub fn record_active_subscriptions(&self, count: i64) {
        self.subscriptions_active.record(count, &[]);
    }

    pub fn record_error(&self, kind: &str) {
        self.errors_total
            .add(1, &[KeyValue::new("kind", kind.to_string())]);
    }
}
