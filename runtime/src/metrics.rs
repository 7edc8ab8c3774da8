//! Metrics for observability.
//!
//! The runtime records through the `metrics` facade and never installs an
//! exporter itself. Applications that want the numbers install a recorder
//! and call [`describe_metrics`] once at startup.
//!
//! - Dispatch throughput, failures, and latency
//! - Asynchronous queue failures
//! - Subscription recomputations and cache hits
//! - Persistence save requests and failures

use metrics::{describe_counter, describe_histogram};
use std::time::Duration;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Register all metric descriptions.
pub fn describe_metrics() {
    // Dispatch
    describe_counter!(
        "dispatch_events_total",
        "Total number of events dispatched through a handler chain"
    );
    describe_counter!(
        "dispatch_events_failed_total",
        "Total number of dispatches that aborted without committing"
    );
    describe_histogram!(
        "dispatch_duration_seconds",
        "Time taken to run a handler chain and commit"
    );
    describe_counter!(
        "event_queue_failures_total",
        "Asynchronous dispatches whose error had no caller to return to"
    );

    // Subscriptions
    describe_counter!(
        "subscription_recomputes_total",
        "Total number of subscription node recomputations"
    );
    describe_counter!(
        "subscription_cache_hits_total",
        "Subscription reads served from the node cache"
    );

    // Persistence
    describe_counter!(
        "persistence_save_requests_total",
        "Saves handed to a key-value store, written directly or queued for a background writer"
    );
    describe_counter!(
        "persistence_save_failures_total",
        "Saves that failed, on the dispatch path or in a background writer"
    );
}

/// Dispatch metrics recorder.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a dispatch that committed.
    pub fn record_commit(event: &'static str, duration: Duration) {
        counter!("dispatch_events_total", "event" => event).increment(1);
        histogram!("dispatch_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a dispatch that aborted.
    pub fn record_failure(event: &'static str) {
        counter!("dispatch_events_total", "event" => event).increment(1);
        counter!("dispatch_events_failed_total", "event" => event).increment(1);
    }

    /// Record a queued dispatch that failed after its caller moved on.
    pub fn record_queue_failure() {
        counter!("event_queue_failures_total").increment(1);
    }
}

/// Subscription metrics recorder.
pub struct SubscriptionMetrics;

impl SubscriptionMetrics {
    /// Record a node recomputation.
    pub fn record_recompute() {
        counter!("subscription_recomputes_total").increment(1);
    }

    /// Record a read served from cache.
    pub fn record_cache_hit() {
        counter!("subscription_cache_hits_total").increment(1);
    }
}

/// Persistence metrics recorder.
pub struct PersistenceMetrics;

impl PersistenceMetrics {
    /// Record a save handed to a store.
    ///
    /// Counted once per save whatever its outcome; subtract
    /// `persistence_save_failures_total` for the number written.
    pub fn record_save_request() {
        counter!("persistence_save_requests_total").increment(1);
    }

    /// Record a failed save.
    pub fn record_save_failure() {
        counter!("persistence_save_failures_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_a_noop() {
        // No recorder installed: every call must be safe to make.
        describe_metrics();
        DispatchMetrics::record_commit("initialize", Duration::from_millis(1));
        DispatchMetrics::record_failure("explode");
        DispatchMetrics::record_queue_failure();
        SubscriptionMetrics::record_recompute();
        SubscriptionMetrics::record_cache_hit();
        PersistenceMetrics::record_save_request();
        PersistenceMetrics::record_save_failure();
    }
}
