//! Metrics and observability utilities
//!
//! Provides metric registration and recording helpers for the
//! question-answer pipeline, with standardized naming conventions.
//! Exporters are wired by the embedding application, not here.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all AlzQA metrics
pub const METRICS_PREFIX: &str = "alzqa";

/// Histogram buckets for stage latency (in seconds)
/// Stages are LLM-bound, so the scale runs from sub-second to minutes
pub const STAGE_LATENCY_BUCKETS: &[f64] = &[
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    20.00, // 20s
    30.00, // 30s
    60.00, // 60s
    120.0, // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Cycle metrics
    describe_counter!(
        format!("{}_cycles_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of question-answer cycles"
    );

    describe_histogram!(
        format!("{}_cycle_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end cycle latency in seconds"
    );

    // Stage metrics
    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-stage latency in seconds"
    );

    // Retrieval metrics
    describe_counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of retrieval queries"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of documents returned by the last retrieval"
    );

    // Completion backend metrics
    describe_counter!(
        format!("{}_backend_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total completion backend requests"
    );

    describe_histogram!(
        format!("{}_backend_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Completion backend latency in seconds"
    );

    describe_counter!(
        format!("{}_backend_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total completion backend errors"
    );

    // Structuring metrics
    describe_counter!(
        format!("{}_structure_repairs_total", METRICS_PREFIX),
        Unit::Count,
        "Structured answers repaired during validation"
    );

    tracing::info!("Metrics registered");
}

/// Helper to time a pipeline stage
pub struct StageTimer {
    start: Instant,
    stage: &'static str,
}

impl StageTimer {
    /// Start timing a stage
    pub fn start(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    /// Record the stage duration
    pub fn finish(self) {
        let duration = self.start.elapsed().as_secs_f64();

        histogram!(
            format!("{}_stage_duration_seconds", METRICS_PREFIX),
            "stage" => self.stage
        )
        .record(duration);
    }
}

/// Helper to record cycle completion
pub fn record_cycle(duration_secs: f64, outcome: &str) {
    counter!(
        format!("{}_cycles_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_cycle_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// Helper to record retrieval metrics
pub fn record_retrieval(duration_secs: f64, result_count: usize) {
    counter!(format!("{}_retrieval_queries_total", METRICS_PREFIX)).increment(1);

    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    gauge!(format!("{}_retrieval_results_count", METRICS_PREFIX)).set(result_count as f64);
}

/// Helper to record completion backend metrics
pub fn record_backend(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_backend_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_backend_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_backend_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record a structure validation repair
pub fn record_structure_repair(kind: &str) {
    counter!(
        format!("{}_structure_repairs_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}
