//! Prometheus metrics for the console itself.
//!
//! These describe the console's own behaviour (poll health, API latency,
//! mutations), not the gateway traffic it displays.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `console_poll_ticks_total` - Poll ticks (labels: loop, outcome)
//! - `console_stale_responses_total` - Responses discarded as older than the latest applied (label: loop)
//! - `console_route_mutations_total` - Route mutations (labels: operation, outcome)
//! - `console_session_evictions_total` - Sessions evicted after a 401
//!
//! ## Histograms
//! - `console_request_duration_seconds` - API request duration (labels: endpoint, method, status)
//!
//! ## Gauges
//! - `console_routes_tracked` - Routes in the local cache
//! - `console_routes_critical` - Routes classified critical in the latest snapshot

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const POLL_TICKS_TOTAL: &str = "console_poll_ticks_total";
    pub const STALE_RESPONSES_TOTAL: &str = "console_stale_responses_total";
    pub const ROUTE_MUTATIONS_TOTAL: &str = "console_route_mutations_total";
    pub const SESSION_EVICTIONS_TOTAL: &str = "console_session_evictions_total";
    pub const REQUEST_DURATION_SECONDS: &str = "console_request_duration_seconds";
    pub const ROUTES_TRACKED: &str = "console_routes_tracked";
    pub const ROUTES_CRITICAL: &str = "console_routes_critical";
}

/// Initialize the Prometheus metrics exporter on `metrics_addr`.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(names::POLL_TICKS_TOTAL, "Poll ticks by loop and outcome");
    describe_counter!(
        names::STALE_RESPONSES_TOTAL,
        "Poll responses discarded because a newer one was already applied"
    );
    describe_counter!(
        names::ROUTE_MUTATIONS_TOTAL,
        "Route create/update/delete calls by outcome"
    );
    describe_counter!(
        names::SESSION_EVICTIONS_TOTAL,
        "Sessions evicted after an authentication failure"
    );
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "Gateway API request duration in seconds"
    );
    describe_gauge!(names::ROUTES_TRACKED, "Routes held in the local cache");
    describe_gauge!(
        names::ROUTES_CRITICAL,
        "Routes whose rejection rate is above the critical threshold"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Record the outcome of one poll tick ("ok" or "error").
pub fn record_poll_tick(loop_name: &'static str, outcome: &'static str) {
    counter!(names::POLL_TICKS_TOTAL, "loop" => loop_name, "outcome" => outcome).increment(1);
}

/// Record a response dropped by the sequence guard.
pub fn record_stale_response(loop_name: &'static str) {
    counter!(names::STALE_RESPONSES_TOTAL, "loop" => loop_name).increment(1);
}

/// Record a route mutation ("create", "update", "delete").
pub fn record_route_mutation(operation: &'static str, outcome: &'static str) {
    counter!(names::ROUTE_MUTATIONS_TOTAL, "operation" => operation, "outcome" => outcome)
        .increment(1);
}

pub fn record_session_eviction() {
    counter!(names::SESSION_EVICTIONS_TOTAL).increment(1);
}

// =============================================================================
// Histograms
// =============================================================================

/// Record API request duration.
pub fn record_request_duration(endpoint: &'static str, method: &str, status: &str, duration_secs: f64) {
    histogram!(names::REQUEST_DURATION_SECONDS, "endpoint" => endpoint, "method" => method.to_string(), "status" => status.to_string())
        .record(duration_secs);
}

// =============================================================================
// Gauges
// =============================================================================

pub fn set_routes_tracked(count: usize) {
    gauge!(names::ROUTES_TRACKED).set(count as f64);
}

pub fn set_routes_critical(count: usize) {
    gauge!(names::ROUTES_CRITICAL).set(count as f64);
}
