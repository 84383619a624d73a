// src/metrics.rs
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

/// One-time metrics registration (so series show up on /metrics before first use).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poster_polls_total", "Successful feed fetches.");
        describe_counter!("poster_fetch_errors_total", "Feed fetch/parse errors.");
        describe_counter!(
            "poster_items_dropped_total",
            "Feed items dropped during classification (missing id, timestamp or headline)."
        );
        describe_counter!("poster_published_total", "Events published downstream.");
        describe_counter!(
            "poster_skipped_total",
            "Events consumed without publishing because of the rate gate."
        );
        describe_counter!("poster_publish_failures_total", "Publish attempts that failed.");
        describe_counter!(
            "poster_reply_failures_total",
            "Follow-up body replies that failed after a successful publish."
        );
        describe_counter!("poster_state_save_errors_total", "State file writes that failed.");
        describe_histogram!("poster_feed_parse_ms", "Feed page parse time in milliseconds.");
        describe_gauge!("poster_last_poll_ts", "Unix ts of the last successful poll.");
    });
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
/// Must be called from inside a tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("prometheus exporter on {addr}: {e}"))?;
    ensure_described();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}
