use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests handled. Labels: method, route, status.
pub const REQUESTS_TOTAL: &str = "innledger_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, route.
pub const REQUEST_DURATION_SECONDS: &str = "innledger_request_duration_seconds";

// ── Ledger metrics ──────────────────────────────────────────────

/// Counter: reservation attempts. Labels: outcome (`reserved` or error kind).
pub const RESERVATIONS_TOTAL: &str = "innledger_reservations_total";

/// Counter: bookings cancelled on request.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "innledger_bookings_cancelled_total";

/// Counter: pending bookings cancelled by the expirer.
pub const PENDING_EXPIRED_TOTAL: &str = "innledger_pending_expired_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms currently in the ledger.
pub const ROOMS_ACTIVE: &str = "innledger_rooms_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innledger_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innledger_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
