//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for routing, search strategies, the
//! map-reduce phase, and model calls, with standardized naming.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all TAi metrics
pub const METRICS_PREFIX: &str = "tai";

/// Buckets for search latency (in seconds); searches are dominated by model calls
pub const SEARCH_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_route_total", METRICS_PREFIX),
        Unit::Count,
        "Queries routed, by strategy and query type"
    );

    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of search executions"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Search latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from the last search"
    );

    describe_counter!(
        format!("{}_map_phase_outcomes_total", METRICS_PREFIX),
        Unit::Count,
        "Per-community map phase outcomes"
    );

    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM API requests"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_gauge!(
        format!("{}_context_tokens", METRICS_PREFIX),
        Unit::Count,
        "Tokens used by each context segment of the last assembled context"
    );

    tracing::info!("Metrics registered");
}

/// Helper to time one search execution
pub struct SearchTimer {
    start: Instant,
    strategy: &'static str,
}

impl SearchTimer {
    /// Start tracking a search
    pub fn start(strategy: &'static str) -> Self {
        Self {
            start: Instant::now(),
            strategy,
        }
    }

    /// Record search completion
    pub fn finish(self, result_count: usize) {
        record_search(self.start.elapsed().as_secs_f64(), self.strategy, result_count);
    }
}

/// Helper to record routing decisions
pub fn record_route(strategy: &str, query_type: &str) {
    counter!(
        format!("{}_route_total", METRICS_PREFIX),
        "strategy" => strategy.to_string(),
        "query_type" => query_type.to_string()
    )
    .increment(1);
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, strategy: &str, result_count: usize) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record map phase outcomes
pub fn record_map_phase(relevant: usize, not_relevant: usize, failed: usize) {
    for (outcome, count) in [
        ("relevant", relevant),
        ("not_relevant", not_relevant),
        ("failed", failed),
    ] {
        counter!(
            format!("{}_map_phase_outcomes_total", METRICS_PREFIX),
            "outcome" => outcome
        )
        .increment(count as u64);
    }
}

/// Helper to record LLM calls
pub fn record_llm_request(model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
        tracing::trace!(model, batch_size, "embedding batch completed");
    }
}

/// Helper to record context segment sizes
pub fn record_context_tokens(segment: &'static str, tokens: usize) {
    gauge!(
        format!("{}_context_tokens", METRICS_PREFIX),
        "segment" => segment
    )
    .set(tokens as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in SEARCH_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_helpers_without_recorder() {
        // No recorder installed: calls must be no-ops
        let timer = SearchTimer::start("local");
        timer.finish(3);
        record_route("local", "relationship");
        record_map_phase(1, 1, 0);
        record_context_tokens("history", 42);
    }
}
