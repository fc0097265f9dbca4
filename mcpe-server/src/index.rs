//! Match index over active subscriptions
//!
//! The index bounds matching cost for `publish`: instead of evaluating every
//! subscription's filter against every event, candidates are collected from
//! three buckets keyed by the event type:
//!
//! - `exact`: literal type → subscription ids
//! - `prefix`: prefix of a `prefix.*` pattern → subscription ids
//! - `wildcard`: subscriptions matching every type (`*` patterns and filters
//!   with no type patterns at all)
//!
//! Lookup enumerates every dot-bounded proper prefix of the event type
//! (`a.b.c` → `a`, `a.b`), so insertion stays O(patterns) and lookup is
//! linear in the type's depth. Candidates still go through the per-candidate
//! attribute post-filter; the index only narrows by type.
//!
//! Only `active` subscriptions live in the index. Pausing, expiring or
//! removing a subscription detaches it, which is what makes the manager's
//! "no new dispatches after return" contract hold.

use crate::pattern::TypePattern;
use mcpe_core::model::EventFilter;
use std::collections::{HashMap, HashSet};

/// Type-pattern lookup structure derived from active subscriptions
#[derive(Debug, Default)]
pub struct MatchIndex {
    exact: HashMap<String, HashSet<String>>,
    prefix: HashMap<String, HashSet<String>>,
    wildcard: HashSet<String>,
}

impl MatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a subscription under every pattern of its filter
    ///
    /// Callers pass pre-validated filters; patterns that fail to parse here
    /// are ignored rather than matched loosely.
    pub fn insert(&mut self, subscription_id: &str, filter: &EventFilter) {
        match &filter.event_types {
            None => {
                // No type constraint: every event is a candidate
                self.wildcard.insert(subscription_id.to_string());
            }
            Some(patterns) if patterns.is_empty() => {
                self.wildcard.insert(subscription_id.to_string());
            }
            Some(patterns) => {
                for text in patterns {
                    match TypePattern::parse(text) {
                        Ok(TypePattern::Exact(literal)) => {
                            self.exact
                                .entry(literal)
                                .or_default()
                                .insert(subscription_id.to_string());
                        }
                        Ok(TypePattern::Prefix(prefix)) => {
                            self.prefix
                                .entry(prefix)
                                .or_default()
                                .insert(subscription_id.to_string());
                        }
                        Ok(TypePattern::Wildcard) => {
                            self.wildcard.insert(subscription_id.to_string());
                        }
                        Err(_) => {}
                    }
                }
            }
        }
    }

    /// Remove a subscription from every bucket its filter put it in
    pub fn remove(&mut self, subscription_id: &str, filter: &EventFilter) {
        self.wildcard.remove(subscription_id);

        if let Some(patterns) = &filter.event_types {
            for text in patterns {
                match TypePattern::parse(text) {
                    Ok(TypePattern::Exact(literal)) => {
                        if let Some(bucket) = self.exact.get_mut(&literal) {
                            bucket.remove(subscription_id);
                            if bucket.is_empty() {
                                self.exact.remove(&literal);
                            }
                        }
                    }
                    Ok(TypePattern::Prefix(prefix)) => {
                        if let Some(bucket) = self.prefix.get_mut(&prefix) {
                            bucket.remove(subscription_id);
                            if bucket.is_empty() {
                                self.prefix.remove(&prefix);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Collect candidate subscription ids for an event type
    ///
    /// Union of the exact bucket, the prefix buckets for every proper
    /// dot-bounded prefix, and the wildcard bucket. The full type itself is
    /// deliberately not a prefix key: `a.b.*` must not match the bare `a.b`.
    pub fn candidates(&self, event_type: &str) -> HashSet<String> {
        let mut out: HashSet<String> = self.wildcard.clone();

        if let Some(bucket) = self.exact.get(event_type) {
            out.extend(bucket.iter().cloned());
        }

        for (position, byte) in event_type.bytes().enumerate() {
            if byte == b'.' {
                if let Some(bucket) = self.prefix.get(&event_type[..position]) {
                    out.extend(bucket.iter().cloned());
                }
            }
        }

        out
    }

    /// Number of distinct subscriptions currently indexed
    pub fn len(&self) -> usize {
        let mut ids: HashSet<&String> = self.wildcard.iter().collect();
        for bucket in self.exact.values().chain(self.prefix.values()) {
            ids.extend(bucket.iter());
        }
        ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wildcard.is_empty() && self.exact.is_empty() && self.prefix.is_empty()
    }
}
