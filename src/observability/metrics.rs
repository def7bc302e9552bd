use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the idempotency gateway.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_request(&self) {
        counter!("idempotency_requests_total").increment(1);
    }

    pub fn record_missing_key(&self) {
        counter!("idempotency_missing_key_total").increment(1);
    }

    pub fn record_replay(&self) {
        counter!("idempotency_replays_total").increment(1);
    }

    pub fn record_conflict(&self) {
        counter!("idempotency_conflicts_total").increment(1);
    }

    pub fn record_mismatch(&self) {
        counter!("idempotency_mismatches_total").increment(1);
    }

    pub fn record_execution(&self, success: bool) {
        counter!("idempotency_executions_total", "success" => success.to_string()).increment(1);
    }

    pub fn record_execution_latency(&self, duration_ms: f64) {
        histogram!("idempotency_execution_duration_ms").record(duration_ms);
    }

    pub fn record_store_operation(&self, backend: &str, operation: &str, success: bool) {
        counter!("idempotency_store_operations_total", "backend" => backend.to_string(), "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("idempotency_requests_total", Unit::Count, "Total requests seen by the coordinator");
    describe_counter!("idempotency_missing_key_total", Unit::Count, "Requests rejected for a missing or blank idempotency key");
    describe_counter!("idempotency_replays_total", Unit::Count, "Requests answered from the response store");
    describe_counter!("idempotency_conflicts_total", Unit::Count, "Requests rejected because an execution was already in flight");
    describe_counter!("idempotency_mismatches_total", Unit::Count, "Requests rejected for reusing a key with a different payload");
    describe_counter!("idempotency_executions_total", Unit::Count, "Handler executions");
    describe_histogram!("idempotency_execution_duration_ms", Unit::Milliseconds, "Handler execution latency in milliseconds");

    describe_counter!("idempotency_store_operations_total", Unit::Count, "Backing store operations");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
