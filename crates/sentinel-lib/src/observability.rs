//! Observability infrastructure for the sentinel
//!
//! Provides:
//! - Prometheus metrics (update/recompute latency, entity count, sample and alert counters)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::DetectorError;
use crate::models::{AnomalyEvent, LoadForecast};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

struct SentinelMetricsInner {
    update_latency_seconds: Histogram,
    recompute_latency_seconds: Histogram,
    entities_monitored: IntGauge,
    samples_ingested: IntCounter,
    samples_rejected: IntCounterVec,
    anomalies_detected: IntCounter,
    load_alerts: IntCounter,
    recompute_timeouts: IntCounter,
    forecast_errors: IntCounter,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            update_latency_seconds: register_histogram!(
                "load_sentinel_update_latency_seconds",
                "Time spent on one incremental profile update for an entity",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register update_latency_seconds"),

            recompute_latency_seconds: register_histogram!(
                "load_sentinel_recompute_latency_seconds",
                "Time spent building matrix profiles from scratch",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register recompute_latency_seconds"),

            entities_monitored: register_int_gauge!(
                "load_sentinel_entities_monitored",
                "Number of entities with live state"
            )
            .expect("Failed to register entities_monitored"),

            samples_ingested: register_int_counter!(
                "load_sentinel_samples_ingested_total",
                "Rows accepted into channel buffers"
            )
            .expect("Failed to register samples_ingested"),

            samples_rejected: register_int_counter_vec!(
                "load_sentinel_samples_rejected_total",
                "Rows rejected before any state was touched",
                &["reason"]
            )
            .expect("Failed to register samples_rejected"),

            anomalies_detected: register_int_counter!(
                "load_sentinel_anomalies_detected_total",
                "Anomaly alerts emitted"
            )
            .expect("Failed to register anomalies_detected"),

            load_alerts: register_int_counter!(
                "load_sentinel_load_alerts_total",
                "Load increase alerts emitted"
            )
            .expect("Failed to register load_alerts"),

            recompute_timeouts: register_int_counter!(
                "load_sentinel_recompute_timeouts_total",
                "Full recomputations aborted by their budget"
            )
            .expect("Failed to register recompute_timeouts"),

            forecast_errors: register_int_counter!(
                "load_sentinel_forecast_errors_total",
                "Forecaster invocations that failed or returned malformed output"
            )
            .expect("Failed to register forecast_errors"),
        }
    }
}

/// Sentinel metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new)
    }

    pub fn observe_update_latency(&self, duration_secs: f64) {
        self.inner().update_latency_seconds.observe(duration_secs);
    }

    pub fn observe_recompute_latency(&self, duration_secs: f64) {
        self.inner().recompute_latency_seconds.observe(duration_secs);
    }

    pub fn set_entities_monitored(&self, count: i64) {
        self.inner().entities_monitored.set(count);
    }

    pub fn inc_samples_ingested(&self) {
        self.inner().samples_ingested.inc();
    }

    /// Count a rejected row under the error variant that caused it
    pub fn inc_samples_rejected(&self, error: &DetectorError) {
        self.inner()
            .samples_rejected
            .with_label_values(&[rejection_reason(error)])
            .inc();
    }

    pub fn inc_anomalies_detected(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn inc_load_alerts(&self) {
        self.inner().load_alerts.inc();
    }

    pub fn inc_recompute_timeouts(&self) {
        self.inner().recompute_timeouts.inc();
    }

    pub fn inc_forecast_errors(&self) {
        self.inner().forecast_errors.inc();
    }
}

fn rejection_reason(error: &DetectorError) -> &'static str {
    match error {
        DetectorError::MalformedSample { .. } => "malformed",
        DetectorError::DimensionMismatch { .. } => "dimension_mismatch",
        DetectorError::InvalidArgument(_) => "invalid_argument",
        DetectorError::StatePoisoned(_) => "poisoned",
        _ => "other",
    }
}

/// Structured logger for sentinel events
///
/// Keeps the `event` field and node label consistent across alerts,
/// rejections and lifecycle messages.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log_anomaly(&self, event: &AnomalyEvent) {
        warn!(
            event = "anomaly_detected",
            node = %self.node_name,
            entity = %event.entity_id,
            timestamp = event.timestamp,
            channels = %event.triggering_channels.join(","),
            score = event.score,
            threshold = event.threshold,
            "Anomaly detected"
        );
    }

    pub fn log_load_increase(&self, forecast: &LoadForecast) {
        warn!(
            event = "load_increase_expected",
            node = %self.node_name,
            entity = %forecast.entity_id,
            timestamp = forecast.timestamp,
            channel = %forecast.channel,
            peak_value = forecast.peak_value,
            threshold = forecast.threshold,
            horizon = forecast.horizon,
            "A large increase in the load is expected"
        );
    }

    pub fn log_sample_rejected(&self, entity_id: &str, error: &DetectorError) {
        warn!(
            event = "sample_rejected",
            node = %self.node_name,
            entity = %entity_id,
            reason = rejection_reason(error),
            error = %error,
            "Sample rejected"
        );
    }

    /// A full recomputation was skipped; the previous profile stays in place
    pub fn log_recompute_skipped(&self, entity_id: &str, error: &DetectorError) {
        warn!(
            event = "recompute_skipped",
            node = %self.node_name,
            entity = %entity_id,
            error = %error,
            "Profile recomputation skipped this cycle"
        );
    }

    pub fn log_startup(&self, version: &str, forecaster: &str) {
        info!(
            event = "sentinel_started",
            node = %self.node_name,
            version = %version,
            forecaster = %forecaster,
            "Load sentinel started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sentinel_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Load sentinel shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handle() {
        let metrics = SentinelMetrics::new();
        metrics.observe_update_latency(0.0002);
        metrics.observe_recompute_latency(0.3);
        metrics.set_entities_monitored(3);
        metrics.inc_samples_ingested();
        metrics.inc_samples_rejected(&DetectorError::invalid("bad row"));
        metrics.inc_anomalies_detected();
        metrics.inc_load_alerts();
        metrics.inc_recompute_timeouts();
        metrics.inc_forecast_errors();

        // A second handle shares the registered metrics
        let again = SentinelMetrics::default();
        again.inc_samples_ingested();
    }

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(
            rejection_reason(&DetectorError::MalformedSample {
                channel: "io".to_string(),
                timestamp: 0,
                value: f64::NAN
            }),
            "malformed"
        );
        assert_eq!(
            rejection_reason(&DetectorError::DimensionMismatch { lengths: vec![1, 2] }),
            "dimension_mismatch"
        );
        assert_eq!(rejection_reason(&DetectorError::UnknownEntity("x".into())), "other");
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name(), "test-node");
    }
}
