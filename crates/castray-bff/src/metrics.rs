use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use castray_common::SnapshotSource;

use crate::state::AppState;

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_inflight: AtomicU64,
    pub status_2xx: AtomicU64,
    pub status_4xx: AtomicU64,
    pub status_5xx: AtomicU64,
}

pub async fn metrics_handler(State(st): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render(&st),
    )
}

fn render(st: &AppState) -> String {
    let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
    let feed = st.engine.stats();
    let snap = st.engine.current();
    let agg = &snap.aggregate;

    let mut out = String::new();
    let mut line = |name: &str, value: String| {
        let _ = writeln!(out, "castray_{name} {value}");
    };

    line("bff_requests_total", get(&st.metrics.requests_total).to_string());
    line("bff_requests_inflight", get(&st.metrics.requests_inflight).to_string());
    line("bff_responses_2xx", get(&st.metrics.status_2xx).to_string());
    line("bff_responses_4xx", get(&st.metrics.status_4xx).to_string());
    line("bff_responses_5xx", get(&st.metrics.status_5xx).to_string());

    line("feed_refreshes_total", feed.refreshes_total.to_string());
    line("feed_live_total", feed.live_total.to_string());
    line("feed_simulated_total", feed.simulated_total.to_string());
    line("feed_stale_total", feed.stale_total.to_string());
    line("feed_pushes_applied_total", feed.pushes_applied_total.to_string());
    line("feed_pushes_unmatched_total", feed.pushes_unmatched_total.to_string());
    line("feed_pushes_ignored_total", feed.pushes_ignored_total.to_string());
    line("feed_pushes_malformed_total", feed.pushes_malformed_total.to_string());
    line("feed_pushes_replayed_total", feed.pushes_replayed_total.to_string());

    line("cluster_nodes", agg.total_nodes.to_string());
    line("cluster_nodes_alive", agg.alive_count.to_string());
    line("cluster_nodes_dead", agg.dead_count.to_string());
    line("cluster_avg_cpu_pct", agg.avg_cpu_pct.to_string());
    line("cluster_avg_memory_pct", agg.avg_memory_pct.to_string());
    line("cluster_avg_gpu_pct", agg.avg_gpu_pct.to_string());
    line(
        "cluster_snapshot_live",
        u8::from(snap.source == SnapshotSource::Live).to_string(),
    );

    out
}

impl Metrics {
    fn record(&self, status: StatusCode) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let class = if status.is_server_error() {
            &self.status_5xx
        } else if status.is_client_error() {
            &self.status_4xx
        } else if status.is_success() {
            &self.status_2xx
        } else {
            return;
        };
        class.fetch_add(1, Ordering::Relaxed);
    }
}

/// Counts every request by response class. Feed counters are read from the
/// engine at scrape time instead.
pub async fn track_requests(State(st): State<AppState>, req: Request<Body>, next: Next) -> Response {
    st.metrics.requests_inflight.fetch_add(1, Ordering::Relaxed);
    let resp = next.run(req).await;
    st.metrics.requests_inflight.fetch_sub(1, Ordering::Relaxed);
    st.metrics.record(resp.status());
    resp
}
