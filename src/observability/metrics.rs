//! Metrics collection and exposition.
//!
//! # Metrics
//! - `chain_retry_attempts_total` (counter): attempts by outcome
//! - `chain_blocks_delivered_total` (counter): block notifications dispatched
//! - `chain_events_delivered_total` (counter): contract events by name
//! - `chain_handler_failures_total` (counter): handler errors/panics by subscription
//! - `chain_connection_ready` (gauge): 1=ready, 0=unready
//! - `chain_reconnects_total` (counter): sessions rebuilt by the supervisor
//!
//! Recording is a no-op until a recorder is installed.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_retry_attempt(outcome: &'static str) {
    counter!("chain_retry_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_block_delivered() {
    counter!("chain_blocks_delivered_total").increment(1);
}

pub fn record_event_delivered(event: &'static str) {
    counter!("chain_events_delivered_total", "event" => event).increment(1);
}

pub fn record_handler_failure(subscription: &'static str) {
    counter!("chain_handler_failures_total", "subscription" => subscription).increment(1);
}

pub fn record_connection_ready(ready: bool) {
    gauge!("chain_connection_ready").set(if ready { 1.0 } else { 0.0 });
}

pub fn record_reconnect() {
    counter!("chain_reconnects_total").increment(1);
}
