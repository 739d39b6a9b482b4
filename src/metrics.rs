// Prometheus metrics for the command executor
//
// Rendered as text by `gather()` (printed by `deckguard exec --metrics`):
// - Executions by command outcome (counter)
// - Execution duration (histogram)
// - Validations by field and result (counter)
// - Children currently running (gauge)

use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref EXECUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("deckguard_executions_total", "Command executions by outcome"),
        &["outcome"]
    ).expect("Failed to create executions metric");

    pub static ref EXECUTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "deckguard_execution_duration_seconds",
            "Wall-clock time from request to outcome"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["outcome"]
    ).expect("Failed to create execution duration metric");

    pub static ref VALIDATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("deckguard_validations_total", "Input validations by field and result"),
        &["field", "result"]
    ).expect("Failed to create validations metric");

    pub static ref IN_FLIGHT: IntGauge = IntGauge::new(
        "deckguard_in_flight",
        "Child processes currently running"
    ).expect("Failed to create in-flight metric");
}

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn init() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EXECUTIONS_TOTAL.clone()),
        Box::new(EXECUTION_DURATION_SECONDS.clone()),
        Box::new(VALIDATIONS_TOTAL.clone()),
        Box::new(IN_FLIGHT.clone()),
    ];
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub fn record_execution(outcome: &str, elapsed: Duration) {
    EXECUTIONS_TOTAL.with_label_values(&[outcome]).inc();
    EXECUTION_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

pub fn record_validation(field: &str, accepted: bool) {
    let result = if accepted { "accepted" } else { "rejected" };
    VALIDATIONS_TOTAL.with_label_values(&[field, result]).inc();
}

/// Holds the in-flight gauge up for as long as it lives.
#[derive(Debug)]
pub struct InFlightGuard(());

impl InFlightGuard {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        IN_FLIGHT.inc();
        Self(())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        IN_FLIGHT.dec();
    }
}

/// Gather all metrics in Prometheus text format
pub fn gather() -> anyhow::Result<String> {
    init().map_err(|e| anyhow::anyhow!("Failed to register metrics: {}", e))?;
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
