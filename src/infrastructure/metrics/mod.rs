//! Prometheus metrics for the relay.
//!
//! - Connection metrics (live connections, admissions, evictions)
//! - Relay metrics (frames relayed, deliveries, delivery failures)
//! - Persistence metrics (append outcomes)
//! - Heartbeat metrics (probes sent, read-deadline expiries)

mod helpers;

pub use helpers::{
    encode_metrics, AdmissionMetrics, HeartbeatMetrics, PersistenceMetrics, RelayMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "argo";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of connections currently held by the registry
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of registered WebSocket connections"
    ).unwrap();

    /// Admission attempts by outcome
    pub static ref ADMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_admissions_total", METRIC_PREFIX),
        "WebSocket admission attempts by outcome",
        &["outcome"]
    ).unwrap();

    /// Connections closed because a newer one took over the identity
    pub static ref EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_evictions_total", METRIC_PREFIX),
        "Connections evicted by a newer connection for the same user"
    ).unwrap();

    /// Connection lifetime
    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "Lifetime of admitted WebSocket connections",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Relay Metrics
    // ============================================================================

    /// Chat frames accepted by the relay
    pub static ref FRAMES_RELAYED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_relayed_total", METRIC_PREFIX),
        "Chat frames parsed and routed by the relay"
    ).unwrap();

    /// Inbound frames that failed to parse
    pub static ref FRAMES_INVALID_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_invalid_total", METRIC_PREFIX),
        "Inbound chat frames skipped because they could not be parsed"
    ).unwrap();

    /// Successful outbound deliveries by side
    pub static ref DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Outbound chat deliveries by side",
        &["side"]
    ).unwrap();

    /// Failed outbound deliveries (peer presumed gone)
    pub static ref DELIVERY_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_failures_total", METRIC_PREFIX),
        "Outbound chat deliveries that failed or timed out"
    ).unwrap();

    /// Messages whose recipient had no live connection
    pub static ref RECIPIENT_OFFLINE_TOTAL: IntCounter = register_int_counter!(
        format!("{}_recipient_offline_total", METRIC_PREFIX),
        "Chat messages whose recipient was not logged in"
    ).unwrap();

    // ============================================================================
    // Persistence Metrics
    // ============================================================================

    /// Conversation appends by outcome
    pub static ref PERSISTENCE_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_persistence_total", METRIC_PREFIX),
        "Conversation append attempts by outcome",
        &["outcome"]
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    /// Liveness probes sent
    pub static ref HEARTBEAT_PROBES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_probes_total", METRIC_PREFIX),
        "Liveness probes sent to connections"
    ).unwrap();

    /// Connections closed because no pong arrived before the read deadline
    pub static ref HEARTBEAT_TIMEOUTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_timeouts_total", METRIC_PREFIX),
        "Connections closed at the read deadline without a probe acknowledgment"
    ).unwrap();

    /// Connections closed because a probe could not be queued in time
    pub static ref HEARTBEAT_PROBE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_probe_failures_total", METRIC_PREFIX),
        "Connections closed because a liveness probe could not be sent"
    ).unwrap();
}
