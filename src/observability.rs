use std::net::SocketAddr;

// ── Session metrics ─────────────────────────────────────────────

/// Gauge: availability sessions with a running task.
pub const SESSIONS_ACTIVE: &str = "vastraveda_sessions_active";

/// Histogram: booked-entry fetch latency in seconds.
pub const FETCH_DURATION_SECONDS: &str = "vastraveda_fetch_duration_seconds";

/// Counter: published refreshes. Labels: status.
pub const REFRESHES_TOTAL: &str = "vastraveda_refreshes_total";

/// Counter: change notifications consumed, including coalesced ones.
pub const NOTIFICATIONS_TOTAL: &str = "vastraveda_notifications_total";

// ── Backend metrics ─────────────────────────────────────────────

/// Counter: booking submissions. Labels: status.
pub const BOOKINGS_SUBMITTED_TOTAL: &str = "vastraveda_bookings_submitted_total";

/// Counter: review submissions. Labels: status.
pub const REVIEWS_SUBMITTED_TOTAL: &str = "vastraveda_reviews_submitted_total";

/// Counter: snapshot file reloads that changed content.
pub const SNAPSHOT_RELOADS_TOTAL: &str = "vastraveda_snapshot_reloads_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::warn!("failed to install Prometheus metrics exporter: {e}"),
    }
}

/// Map a booking outcome to a short label for metrics.
pub fn outcome_label<T, E>(result: &Result<T, E>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(_) => "error",
    }
}
