mod args;
mod cors;
mod handlers;
mod metrics;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;

use castray_feed::{
    FeedConfig, FeedEngine, HttpTransport, SeededSampler, ThreadRngSampler, UsageSampler,
};

use crate::args::Args;
use crate::handlers::{get_node, healthz, list_nodes, not_found, push, refresh, snapshot, summary};
use crate::metrics::{metrics_handler, track_requests, Metrics};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let tracer_provider = castray_common::telemetry::init_tracing(
        "castray-bff",
        args.otlp_endpoint.as_deref(),
        args.otlp_token.as_deref(),
        &args.log_format,
    );

    let fetch_timeout = Duration::from_secs(args.fetch_timeout_secs);
    let transport = HttpTransport::new(&args.api_base, fetch_timeout)?
        .with_paths(&args.status_path, &args.nodes_path);

    let sampler: Arc<dyn UsageSampler> = match args.seed {
        Some(seed) => Arc::new(SeededSampler::new(seed)),
        None => Arc::new(ThreadRngSampler),
    };

    let config = FeedConfig {
        refresh_interval: Duration::from_secs(args.refresh_interval_secs),
        fetch_timeout,
        stale_after: args.stale_after_secs.map(Duration::from_secs),
    };

    let engine = FeedEngine::connect(Arc::new(transport), config, sampler).await;
    let feed_tasks = engine.spawn(None);

    let st = AppState {
        engine,
        metrics: Arc::new(Metrics::default()),
    };

    let api_routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshot", get(snapshot))
        .route("/nodes", get(list_nodes))
        .route("/nodes/:id", get(get_node))
        .route("/summary", get(summary))
        .route("/refresh", post(refresh))
        .route("/push", post(push));

    let app = Router::new()
        .nest("/api", api_routes)
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(st.clone(), track_requests))
        .layer(middleware::from_fn(cors::allow_any_origin))
        .with_state(st);

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    tracing::info!(
        addr = %args.listen_addr,
        api_base = %args.api_base,
        refresh_interval_secs = args.refresh_interval_secs,
        "castray-bff listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feed_tasks.shutdown().await;
    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush traces: {e}");
        }
    }
    tracing::info!("castray-bff stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("received ctrl-c, shutting down");
}
