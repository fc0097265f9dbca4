//! Per-subscription aggregation buffers
//!
//! Cron and scheduled subscriptions do not push each event as it arrives;
//! the router appends matches here and the scheduler drains the buffer on
//! flush. FIFO order is what gives batches their publish-order guarantee.
//!
//! Cron buffers are bounded at the subscription's `max_events_per_delivery`:
//! when full, the oldest event is dropped so a flush always carries the most
//! recent matches. Scheduled buffers are unbounded; they are drained exactly
//! once.

use mcpe_core::Event;
use std::collections::VecDeque;

/// FIFO of pending events for one aggregating subscription
#[derive(Debug)]
pub struct AggregationBuffer {
    events: VecDeque<Event>,
    capacity: Option<usize>,
    dropped: u64,
}

impl AggregationBuffer {
    /// Bounded buffer for cron subscriptions
    pub fn bounded(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(64)),
            capacity: Some(capacity),
            dropped: 0,
        }
    }

    /// Unbounded buffer for scheduled subscriptions
    pub fn unbounded() -> Self {
        Self {
            events: VecDeque::new(),
            capacity: None,
            dropped: 0,
        }
    }

    /// Append an event, dropping the oldest one on overflow
    pub fn push(&mut self, event: Event) {
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                self.dropped += 1;
                return;
            }
            while self.events.len() >= capacity {
                self.events.pop_front();
                self.dropped += 1;
            }
        }
        self.events.push_back(event);
    }

    /// Take everything buffered so far, in publish order
    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events discarded to the overflow policy since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
