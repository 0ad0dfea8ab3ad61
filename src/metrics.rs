use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

/// One-time metric descriptions (so series show up on /metrics with help text).
pub fn describe() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("bridge_items_delivered_total", "Items delivered to the chat channel.");
        describe_counter!("bridge_fetch_errors_total", "Sub-source fetches that failed.");
        describe_counter!("bridge_delivery_errors_total", "Primary deliveries that failed.");
        describe_counter!("bridge_archive_errors_total", "Best-effort archive writes that failed.");
        describe_counter!("bridge_persist_errors_total", "Cycles aborted by a state write failure.");
        describe_histogram!("bridge_cycle_ms", "Poll cycle duration in milliseconds.");
        describe_histogram!("bridge_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("bridge_last_cycle_ts", "Unix ts when the source's cycle last ran.");
    });
}

impl Metrics {
    /// Install the global Prometheus recorder.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe();
        Ok(Self { handle })
    }

    /// `/metrics` in the Prometheus exposition format, plus `/healthz`.
    pub fn router(&self) -> Router {
        router(self.handle.clone())
    }

    /// Serve the router until the task is dropped.
    pub async fn serve(&self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding metrics listener on {addr}"))?;
        tracing::info!(%addr, "metrics endpoint listening");
        axum::serve(listener, self.router())
            .await
            .context("metrics server")
    }
}

pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
        .route("/healthz", get(|| async { "ok" }))
}
