use std::time::Duration;

use serde_json::Value;

use castray_common::{ClusterSnapshot, FeedError, SnapshotSource};

use crate::normalize::Normalizer;
use crate::shapes::{describe_payload, parse_nodes};
use crate::stats::build_snapshot;
use crate::synthetic::synthetic_snapshot;
use crate::transport::ClusterTransport;
use crate::util::now_ms;

/// Connectivity indicator from a status payload (`ray_status == "connected"`).
///
/// Looks inside a `data` envelope too. `None` when the payload carries no
/// indicator at all.
pub fn backend_connected(status: &Value) -> Option<bool> {
    let field = status
        .get("ray_status")
        .or_else(|| status.get("data").and_then(|d| d.get("ray_status")))?;
    Some(field.as_str() == Some("connected"))
}

async fn bounded<F>(what: &str, timeout: Duration, call: F) -> Result<Value, FeedError>
where
    F: std::future::Future<Output = Result<Value, FeedError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(res) => res,
        Err(_) => Err(FeedError::Unreachable(format!(
            "{what} timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

/// One fetch cycle with the failure classified.
pub async fn try_fetch(
    transport: &dyn ClusterTransport,
    normalizer: &Normalizer,
    timeout: Duration,
) -> Result<ClusterSnapshot, FeedError> {
    let (status, nodes) = tokio::join!(
        bounded("status", timeout, transport.get_status()),
        bounded("nodes", timeout, transport.get_nodes()),
    );
    let status = status?;
    let nodes = nodes?;

    let parsed = parse_nodes(&nodes)
        .ok_or_else(|| FeedError::UnrecognizedShape(describe_payload(&nodes)))?;

    let now = now_ms();
    let count = parsed.entries.len();
    let nodes = normalizer.normalize(parsed.entries, now);
    tracing::debug!(
        shape = parsed.shape.as_str(),
        entries = count,
        nodes = nodes.len(),
        "normalized cluster feed"
    );

    Ok(build_snapshot(
        nodes,
        SnapshotSource::Live,
        backend_connected(&status),
        None,
        now,
    ))
}

/// One fetch cycle that always yields a snapshot, falling back to the
/// placeholder cluster on any failure.
pub async fn fetch_and_normalize(
    transport: &dyn ClusterTransport,
    normalizer: &Normalizer,
    timeout: Duration,
) -> ClusterSnapshot {
    match try_fetch(transport, normalizer, timeout).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(
                backend = %transport.describe(),
                kind = e.kind(),
                error = %e,
                "cluster feed unavailable, using simulated data"
            );
            synthetic_snapshot(normalizer, Some(e), now_ms())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::sampler::{FixedSampler, ThreadRngSampler};
    use crate::transport::StaticTransport;

    fn normalizer() -> Normalizer {
        Normalizer::new(Arc::new(FixedSampler(50.0)))
    }

    fn ray_nodes() -> Value {
        json!({"result": {"result": [
            {
                "node_id": "aaaaaaaa11111111",
                "node_ip": "10.0.0.2",
                "state": "ALIVE",
                "is_head_node": false,
                "resources_total": {"CPU": 4.0, "Wired": 1.0, "W1": 1.0}
            },
            {
                "node_id": "abc12345678",
                "node_ip": "10.0.0.1",
                "state": "ALIVE",
                "is_head_node": true,
                "resources_total": {"CPU": 8.0, "memory": 858993459200.0}
            }
        ]}})
    }

    #[test]
    fn test_backend_connected() {
        assert_eq!(backend_connected(&json!({"ray_status": "connected"})), Some(true));
        assert_eq!(backend_connected(&json!({"ray_status": "disconnected"})), Some(false));
        assert_eq!(
            backend_connected(&json!({"data": {"ray_status": "connected"}})),
            Some(true)
        );
        assert_eq!(backend_connected(&json!({"ok": true})), None);
    }

    #[tokio::test]
    async fn test_live_fetch() {
        let t = StaticTransport::new(json!({"ray_status": "connected"}), ray_nodes());
        let snap = fetch_and_normalize(&t, &normalizer(), Duration::from_secs(1)).await;

        assert_eq!(snap.source, SnapshotSource::Live);
        assert_eq!(snap.backend_connected, Some(true));
        assert!(snap.fault.is_none());
        assert_eq!(snap.nodes.len(), 2);
        assert_eq!(snap.nodes[0].id, "12345678");
        assert_eq!(snap.nodes[0].capacity.memory_gib, 800);
        assert_eq!(snap.aggregate.alive_count, 2);
    }

    #[tokio::test]
    async fn test_unreachable_falls_back_to_simulated() {
        let t = StaticTransport::unreachable();
        let snap = fetch_and_normalize(&t, &normalizer(), Duration::from_secs(1)).await;

        assert_eq!(snap.source, SnapshotSource::Simulated);
        assert_eq!(snap.nodes.len(), 5);
        assert!(matches!(snap.fault, Some(FeedError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_status_failure_alone_is_unreachable() {
        let t = StaticTransport::new(Value::Null, ray_nodes());
        t.set_status(Err(FeedError::Unreachable("HTTP 502".to_string())));
        let err = try_fetch(&t, &normalizer(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unreachable");
    }

    #[tokio::test]
    async fn test_unrecognized_shape_falls_back() {
        let t = StaticTransport::new(json!({}), json!({"items": []}));
        let err = try_fetch(&t, &normalizer(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, FeedError::UnrecognizedShape("object with keys [items]".to_string()));

        let snap = fetch_and_normalize(&t, &normalizer(), Duration::from_secs(1)).await;
        assert_eq!(snap.source, SnapshotSource::Simulated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_unreachable() {
        let t = StaticTransport::new(json!({}), ray_nodes());
        t.set_latency(Duration::from_secs(30));
        let err = try_fetch(&t, &normalizer(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Unreachable(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_empty_live_cluster() {
        let t = StaticTransport::new(json!({"ray_status": "connected"}), json!({"result": []}));
        let snap = fetch_and_normalize(&t, &normalizer(), Duration::from_secs(1)).await;
        assert_eq!(snap.source, SnapshotSource::Live);
        assert!(snap.nodes.is_empty());
        assert_eq!(snap.aggregate.avg_cpu_pct, 0.0);
    }

    #[tokio::test]
    async fn test_node_without_id_stays_live() {
        let t = StaticTransport::new(
            json!({"ray_status": "connected"}),
            json!({"result": [{
                "node_ip": "10.0.0.9",
                "state": "ALIVE",
                "is_head_node": true,
                "resources_total": {"CPU": 4}
            }]}),
        );
        let snap = fetch_and_normalize(&t, &normalizer(), Duration::from_secs(1)).await;
        assert_eq!(snap.source, SnapshotSource::Live);
        assert!(snap.fault.is_none());
        assert_eq!(snap.aggregate.total_nodes, 1);
        assert_eq!(snap.nodes[0].id, "node-0");

        t.set_nodes(Ok(json!({"result": [
            {"node_id": "abc12345678", "state": "ALIVE", "resources_total": null},
            {"node_ip": "10.0.0.9", "state": "DEAD"}
        ]})));
        let snap = fetch_and_normalize(&t, &normalizer(), Duration::from_secs(1)).await;
        assert_eq!(snap.source, SnapshotSource::Live);
        assert_eq!(snap.aggregate.total_nodes, 2);
        assert_eq!(snap.aggregate.dead_count, 1);
    }

    #[tokio::test]
    async fn test_every_layout_keeps_count_and_order() {
        let ray = |id: &str, ip: &str, head: bool| {
            json!({
                "node_id": id,
                "node_ip": ip,
                "state": "ALIVE",
                "is_head_node": head,
                "resources_total": {"CPU": 4.0}
            })
        };
        let entries = json!([
            ray("cccc00000003", "10.0.0.3", false),
            ray("aaaa00000001", "10.0.0.1", true),
            ray("bbbb00000002", "10.0.0.2", false)
        ]);
        let cases = [
            (
                "reported",
                json!({"nodes": [
                    {"id": "w2", "name": "W2", "status": "active"},
                    {"id": "h1", "name": "H1", "isHeadNode": true, "status": "active"},
                    {"id": "w1", "name": "W1", "status": "inactive"}
                ]}),
            ),
            ("nested", json!({"result": {"result": entries.clone()}})),
            ("flat", json!({"result": entries.clone()})),
            ("nodes", json!({"nodes": entries.clone()})),
        ];

        let normalizer = Normalizer::new(Arc::new(ThreadRngSampler));
        for (name, payload) in cases {
            let t = StaticTransport::new(json!({"ray_status": "connected"}), payload);
            let first = fetch_and_normalize(&t, &normalizer, Duration::from_secs(1)).await;
            let second = fetch_and_normalize(&t, &normalizer, Duration::from_secs(1)).await;

            assert_eq!(first.source, SnapshotSource::Live, "{name}");
            assert_eq!(first.aggregate.total_nodes, 3, "{name}");
            assert!(first.nodes[0].is_head_node, "{name}");
            let order = |s: &ClusterSnapshot| {
                s.nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>()
            };
            assert_eq!(order(&first), order(&second), "{name}");
        }
    }
}
