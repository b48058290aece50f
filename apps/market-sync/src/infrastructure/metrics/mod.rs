//! Prometheus Metrics Module
//!
//! Exposes sync metrics in Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Fetches**: Outcomes per source (applied, stale, rejected, failed)
//! - **Push**: Messages by type, errors by kind, reconnection attempts
//! - **Connection**: Current push channel state
//!
//! # Integration
//!
//! When a metrics port is configured, the exporter serves `/metrics` on it.
//! Without one no recorder is installed and recording is a no-op.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::view::{ConnectionState, Source};

// =============================================================================
// Exporter
// =============================================================================

static EXPORTER_ADDR: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus recorder and HTTP listener on `port`.
///
/// Returns `Ok(None)` when `port` is 0. Must be called from within a Tokio
/// runtime; later calls return the address of the first listener.
///
/// # Errors
///
/// Returns an error if the listener or the global recorder cannot be
/// installed.
pub fn init_metrics(port: u16) -> Result<Option<SocketAddr>, BuildError> {
    if port == 0 {
        return Ok(None);
    }
    if let Some(addr) = EXPORTER_ADDR.get() {
        return Ok(Some(*addr));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();

    let _ = EXPORTER_ADDR.set(addr);
    Ok(Some(addr))
}

/// Address of the running exporter, if any.
#[must_use]
pub fn exporter_addr() -> Option<SocketAddr> {
    EXPORTER_ADDR.get().copied()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "market_sync_fetches_total",
        "Completed fetches by source and outcome"
    );
    describe_counter!(
        "market_sync_push_messages_total",
        "Push channel messages received by type"
    );
    describe_counter!(
        "market_sync_push_errors_total",
        "Push channel errors by kind"
    );
    describe_counter!(
        "market_sync_push_reconnects_total",
        "Push channel reconnection attempts"
    );
    describe_gauge!(
        "market_sync_push_connection_state",
        "Push channel state (0 idle, 1 connecting, 2 open, 3 reconnecting, 4 closed)"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a finished fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Result written into the view model.
    Applied,
    /// Result discarded because the selection moved on.
    Stale,
    /// Ticker dropped by the merge policy as older than the displayed one.
    Rejected,
    /// Request failed.
    Failed,
}

impl FetchOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Stale => "stale",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

const fn state_code(state: ConnectionState) -> f64 {
    match state {
        ConnectionState::Idle => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Open => 2.0,
        ConnectionState::Reconnecting { .. } => 3.0,
        ConnectionState::ClosedPermanent => 4.0,
    }
}

/// Record a finished fetch.
pub fn record_fetch(source: Source, outcome: FetchOutcome) {
    counter!(
        "market_sync_fetches_total",
        "source" => source.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a decoded push message.
pub fn record_push_message(kind: &str) {
    counter!(
        "market_sync_push_messages_total",
        "message_type" => kind.to_string()
    )
    .increment(1);
}

/// Record a push channel error.
pub fn record_push_error(kind: &'static str) {
    counter!(
        "market_sync_push_errors_total",
        "error_type" => kind
    )
    .increment(1);
}

/// Record a push reconnection attempt.
pub fn record_push_reconnect() {
    counter!("market_sync_push_reconnects_total").increment(1);
}

/// Update the push connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("market_sync_push_connection_state").set(state_code(state));
}

// =============================================================================
// Tests
// =============================================================================
