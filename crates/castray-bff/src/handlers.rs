use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use castray_common::{Aggregate, ClusterSnapshot, FeedError, SnapshotSource};
use castray_feed::FeedStatsSnapshot;

use crate::state::AppState;

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    request_id: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
            request_id: format!("req_{}", Uuid::new_v4()),
        },
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub aggregate: Aggregate,
    pub source: SnapshotSource,
    pub backend_connected: Option<bool>,
    pub fault: Option<FeedError>,
    pub generated_at_ms: u64,
    pub feed: FeedStatsSnapshot,
}

fn summary_of(snap: &ClusterSnapshot, feed: FeedStatsSnapshot) -> SummaryResponse {
    SummaryResponse {
        aggregate: snap.aggregate.clone(),
        source: snap.source,
        backend_connected: snap.backend_connected,
        fault: snap.fault.clone(),
        generated_at_ms: snap.generated_at_ms,
        feed,
    }
}

pub async fn healthz(State(st): State<AppState>) -> impl IntoResponse {
    let snap = st.engine.current();
    Json(json!({
        "status": "ok",
        "source": snap.source,
        "backend_connected": snap.backend_connected,
    }))
}

pub async fn snapshot(State(st): State<AppState>) -> impl IntoResponse {
    let snap = st.engine.current();
    Json(ClusterSnapshot::clone(&snap))
}

pub async fn list_nodes(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.engine.current().nodes.clone())
}

pub async fn get_node(State(st): State<AppState>, Path(id): Path<String>) -> Response {
    let snap = st.engine.current();
    match snap.node(&id) {
        Some(node) => (StatusCode::OK, Json(node.clone())).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "node_not_found",
            &format!("no node with id {id}"),
        ),
    }
}

pub async fn summary(State(st): State<AppState>) -> impl IntoResponse {
    Json(summary_of(&st.engine.current(), st.engine.stats()))
}

pub async fn refresh(State(st): State<AppState>) -> impl IntoResponse {
    let snap = st.engine.refresh().await;
    tracing::info!(source = ?snap.source, nodes = snap.nodes.len(), "manual refresh");
    Json(summary_of(&snap, st.engine.stats()))
}

#[derive(Debug, Serialize)]
struct PushAccepted {
    applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    generated_at_ms: Option<u64>,
}

pub async fn push(State(st): State<AppState>, body: String) -> Response {
    match st.engine.try_handle_push(&body).await {
        Ok(outcome) => {
            let accepted = PushAccepted {
                applied: outcome.is_some(),
                generated_at_ms: outcome.as_deref().map(|s| s.generated_at_ms),
            };
            (StatusCode::ACCEPTED, Json(accepted)).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.kind(), &e.to_string()),
    }
}

pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found", "no such route")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::to_bytes;
    use serde_json::{json, Value};

    use super::*;
    use crate::metrics::Metrics;
    use castray_feed::{FeedConfig, FeedEngine, FixedSampler, StaticTransport};

    async fn state() -> AppState {
        let transport = Arc::new(StaticTransport::new(
            json!({"ray_status": "connected"}),
            json!({"result": {"result": [{
                "node_id": "abc12345678",
                "node_ip": "10.30.2.11",
                "state": "ALIVE",
                "is_head_node": true,
                "resources_total": {"CPU": 16.0, "memory": 858993459200.0}
            }]}}),
        ));
        let engine =
            FeedEngine::connect(transport, FeedConfig::default(), Arc::new(FixedSampler(50.0)))
                .await;
        AppState {
            engine,
            metrics: Arc::new(Metrics::default()),
        }
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_node() {
        let st = state().await;

        let resp = get_node(State(st.clone()), Path("12345678".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["display_name"], "10.30.2.11");
        assert_eq!(body["lifecycle"], "ALIVE");

        let resp = get_node(State(st), Path("missing".to_string())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["code"], "node_not_found");
        assert!(body["error"]["request_id"]
            .as_str()
            .unwrap()
            .starts_with("req_"));
    }

    #[tokio::test]
    async fn test_push_status_codes() {
        let st = state().await;

        let resp = push(State(st.clone()), "not json".to_string()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["code"], "malformed_push");

        let raw = r#"{"type":"node_update","data":{"node_id":"12345678","cpu_usage":91}}"#;
        let resp = push(State(st.clone()), raw.to_string()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(resp).await["applied"], true);
        assert_eq!(
            st.engine.current().node("12345678").unwrap().utilization.cpu_pct,
            91.0
        );

        let resp = push(State(st), r#"{"type":"file_transfer"}"#.to_string()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(resp).await["applied"], false);
    }

    #[tokio::test]
    async fn test_summary_reports_source() {
        let st = state().await;
        let resp = summary(State(st)).await.into_response();
        let body = body_json(resp).await;
        assert_eq!(body["source"], "LIVE");
        assert_eq!(body["aggregate"]["total_nodes"], 1);
        assert_eq!(body["feed"]["live_total"], 1);
    }
}
