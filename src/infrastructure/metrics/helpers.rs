//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    ADMISSIONS_TOTAL, CONNECTIONS_ACTIVE, CONNECTION_DURATION, DELIVERIES_TOTAL,
    DELIVERY_FAILURES_TOTAL, EVICTIONS_TOTAL, FRAMES_INVALID_TOTAL, FRAMES_RELAYED_TOTAL,
    HEARTBEAT_PROBES_TOTAL, HEARTBEAT_PROBE_FAILURES_TOTAL, HEARTBEAT_TIMEOUTS_TOTAL,
    PERSISTENCE_TOTAL, RECIPIENT_OFFLINE_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording admission and connection lifecycle metrics
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    pub fn record_outcome(outcome: &str) {
        ADMISSIONS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn record_eviction() {
        EVICTIONS_TOTAL.inc();
    }

    pub fn set_active(count: usize) {
        CONNECTIONS_ACTIVE.set(count as i64);
    }

    pub fn record_connection_duration(seconds: f64) {
        CONNECTION_DURATION.observe(seconds);
    }
}

/// Helper struct for recording relay metrics
pub struct RelayMetrics;

impl RelayMetrics {
    pub fn record_relayed() {
        FRAMES_RELAYED_TOTAL.inc();
    }

    pub fn record_invalid_frame() {
        FRAMES_INVALID_TOTAL.inc();
    }

    /// `side` is either "recipient" or "sender"
    pub fn record_delivered(side: &str) {
        DELIVERIES_TOTAL.with_label_values(&[side]).inc();
    }

    pub fn record_delivery_failure() {
        DELIVERY_FAILURES_TOTAL.inc();
    }

    pub fn record_recipient_offline() {
        RECIPIENT_OFFLINE_TOTAL.inc();
    }
}

/// Helper struct for recording persistence outcomes
pub struct PersistenceMetrics;

impl PersistenceMetrics {
    pub fn record_ok() {
        PERSISTENCE_TOTAL.with_label_values(&["ok"]).inc();
    }

    pub fn record_not_found() {
        PERSISTENCE_TOTAL.with_label_values(&["not_found"]).inc();
    }

    pub fn record_error() {
        PERSISTENCE_TOTAL.with_label_values(&["error"]).inc();
    }
}

/// Helper struct for recording heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_probe() {
        HEARTBEAT_PROBES_TOTAL.inc();
    }

    pub fn record_timeout() {
        HEARTBEAT_TIMEOUTS_TOTAL.inc();
    }

    pub fn record_probe_failure() {
        HEARTBEAT_PROBE_FAILURES_TOTAL.inc();
    }
}
