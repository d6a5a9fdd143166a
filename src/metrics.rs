use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Only one recorder may exist per process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        describe_once();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn describe_once() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_fetch_total", "Fetches issued per feed.");
        describe_counter!("feed_fetch_errors_total", "Failed fetches per feed.");
        describe_counter!(
            "feed_fetch_discarded_total",
            "Fetch results dropped because a newer fetch already landed."
        );
        describe_gauge!("scheduler_active_feeds", "Feeds with a running timer.");
        describe_counter!("alerts_created_total", "Alerts created for newly seen tickers.");
        describe_counter!(
            "alerts_evicted_total",
            "Alerts dropped from the tail of a full queue."
        );
        describe_counter!("alerts_expired_total", "Alerts removed by their countdown.");
        describe_counter!(
            "alerts_suppressed_snooze_total",
            "Movers ticks skipped while snoozed."
        );
        describe_gauge!("alerts_queue_len", "Alerts currently queued.");
        describe_gauge!("correlation_entries", "Tickers reported by two or more scanners.");
    });
}
