use std::net::SocketAddr;

// ── Booking lifecycle ───────────────────────────────────────────

/// Counter: bookings committed.
pub const BOOKINGS_CREATED_TOTAL: &str = "slotline_bookings_created_total";

/// Counter: bookings cancelled (admin or owner).
pub const BOOKINGS_CANCELLED_TOTAL: &str = "slotline_bookings_cancelled_total";

/// Counter: bookings auto-completed by the sweep.
pub const BOOKINGS_COMPLETED_TOTAL: &str = "slotline_bookings_completed_total";

/// Counter: operations rejected. Labels: op, reason.
pub const OPERATIONS_REJECTED_TOTAL: &str = "slotline_operations_rejected_total";

/// Counter: contended attempts that were retried. Labels: op.
pub const TX_RETRIES_TOTAL: &str = "slotline_tx_retries_total";

// ── Schedule ────────────────────────────────────────────────────

/// Counter: slots materialized by lazy generation.
pub const SLOTS_GENERATED_TOTAL: &str = "slotline_slots_generated_total";

/// Counter: slots moved by shifts.
pub const SLOTS_SHIFTED_TOTAL: &str = "slotline_slots_shifted_total";

// ── Notifications & sweep ───────────────────────────────────────

/// Counter: delivery attempts. Labels: intent, outcome.
pub const NOTIFICATIONS_TOTAL: &str = "slotline_notifications_total";

/// Counter: reminders marked as sent.
pub const REMINDERS_SENT_TOTAL: &str = "slotline_reminders_sent_total";

/// Histogram: one sweep pass in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "slotline_sweep_duration_seconds";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotline_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotline_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
