//! Applying push-channel messages to a snapshot.

use serde::Deserialize;
use serde_json::Value;

use castray_common::{
    ClusterSnapshot, Connectivity, FeedError, Lifecycle, MetricSource, PushKind, PushMessage,
    Utilization,
};

use crate::fetch::backend_connected;
use crate::normalize::{derive_tags, string_list};
use crate::stats::build_snapshot;

/// Partial node record carried by a `node_update` message. Every field is
/// optional; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeUpdate {
    pub node_id: Option<String>,
    pub id: Option<String>,

    pub cpu_usage: Option<f64>,
    pub cpu: Option<f64>,
    pub memory_usage: Option<f64>,
    pub memory: Option<f64>,
    pub gpu_usage: Option<f64>,
    pub gpu: Option<f64>,

    pub status: Option<String>,
    pub state: Option<String>,
    pub state_message: Option<String>,

    #[serde(alias = "connectionType")]
    pub connection_type: Option<String>,

    pub name: Option<String>,
    #[serde(alias = "ip")]
    pub node_ip: Option<String>,

    pub tasks: Option<Value>,
}

impl NodeUpdate {
    pub fn target(&self) -> Option<&str> {
        self.node_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }

    fn cpu(&self) -> Option<f64> {
        self.cpu_usage.or(self.cpu)
    }

    fn memory(&self) -> Option<f64> {
        self.memory_usage.or(self.memory)
    }

    fn gpu(&self) -> Option<f64> {
        self.gpu_usage.or(self.gpu)
    }

    fn lifecycle(&self) -> Option<Lifecycle> {
        self.status
            .as_deref()
            .or(self.state.as_deref())
            .map(Lifecycle::from_state)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// The message changed the snapshot.
    Updated(ClusterSnapshot),
    /// Well-formed, but addressed to a node that is not in the snapshot.
    Unchanged,
    /// A message type this feed does not act on.
    Ignored,
    Rejected(FeedError),
}

/// Apply one parsed push message to `current`.
pub fn apply_push(current: &ClusterSnapshot, msg: &PushMessage, now_ms: u64) -> PushOutcome {
    match msg.push_kind() {
        PushKind::SystemStatus => match backend_connected(&msg.data) {
            Some(connected) => {
                let mut next = current.clone();
                next.backend_connected = Some(connected);
                PushOutcome::Updated(next)
            }
            None => {
                tracing::debug!("system_status push without ray_status, ignoring");
                PushOutcome::Ignored
            }
        },
        PushKind::NodeUpdate => {
            let update = match NodeUpdate::deserialize(&msg.data) {
                Ok(update) => update,
                Err(e) => {
                    return PushOutcome::Rejected(FeedError::MalformedPush(format!(
                        "node_update data: {e}"
                    )))
                }
            };
            apply_node_update(current, &update, now_ms)
        }
        PushKind::FileTransfer | PushKind::Unknown => {
            tracing::debug!(kind = %msg.kind, "ignoring push message");
            PushOutcome::Ignored
        }
    }
}

pub fn apply_node_update(
    current: &ClusterSnapshot,
    update: &NodeUpdate,
    now_ms: u64,
) -> PushOutcome {
    let Some(target) = update.target() else {
        return PushOutcome::Rejected(FeedError::MalformedPush(
            "node_update without node_id".to_string(),
        ));
    };
    let Some(idx) = current
        .nodes
        .iter()
        .position(|n| n.id == target || n.node_id == target)
    else {
        tracing::debug!(node_id = target, "node_update for unknown node, ignoring");
        return PushOutcome::Unchanged;
    };

    let mut nodes = current.nodes.clone();
    let node = &mut nodes[idx];

    let old = node.utilization;
    let has_gpu = node.capacity.has_gpu();
    let covers_all =
        update.cpu().is_some() && update.memory().is_some() && (update.gpu().is_some() || !has_gpu);
    let source = if old.source == MetricSource::Measured || covers_all {
        MetricSource::Measured
    } else {
        MetricSource::Simulated
    };
    node.utilization = Utilization::new(
        update.cpu().unwrap_or(old.cpu_pct),
        update.memory().unwrap_or(old.memory_pct),
        update.gpu().unwrap_or(old.gpu_pct),
        source,
    );

    if let Some(lifecycle) = update.lifecycle() {
        node.lifecycle = lifecycle;
    }
    if let Some(msg) = &update.state_message {
        node.state_message = Some(msg.clone()).filter(|s| !s.is_empty());
    }
    if let Some(label) = update.connection_type.as_deref() {
        let connectivity = Connectivity::from_label(label);
        if connectivity != Connectivity::Unknown {
            node.connectivity = connectivity;
        }
    }
    if let Some(ip) = update.node_ip.as_deref().filter(|s| !s.is_empty()) {
        node.address = ip.to_string();
    }
    if let Some(name) = update.name.as_deref().filter(|s| !s.is_empty()) {
        node.display_name = name.to_string();
    }
    if update.name.is_some() || update.node_ip.is_some() {
        node.full_name = format!("{} ({})", node.display_name, node.address);
    }

    node.tags = match update.tasks.as_ref().and_then(string_list) {
        Some(tasks) => tasks,
        None => derive_tags(
            node.lifecycle,
            node.is_head_node,
            &node.utilization,
            &node.capacity,
            node.state_message.as_deref(),
        ),
    };
    node.last_updated_ms = now_ms;

    PushOutcome::Updated(build_snapshot(
        nodes,
        current.source,
        current.backend_connected,
        current.fault.clone(),
        now_ms,
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::normalize::Normalizer;
    use crate::sampler::FixedSampler;
    use crate::synthetic::synthetic_snapshot;
    use castray_common::SnapshotSource;

    fn snapshot() -> ClusterSnapshot {
        synthetic_snapshot(&Normalizer::new(Arc::new(FixedSampler(50.0))), None, 1)
    }

    fn push(raw: serde_json::Value) -> PushMessage {
        PushMessage::parse(&raw.to_string()).unwrap()
    }

    #[test]
    fn test_node_update_merges_one_node() {
        let before = snapshot();
        let msg = push(json!({
            "type": "node_update",
            "data": {"node_id": "00000002", "cpu_usage": 95.0, "memory_usage": 20.0}
        }));
        let PushOutcome::Updated(after) = apply_push(&before, &msg, 7) else {
            panic!("expected update");
        };

        let node = after.node("00000002").unwrap();
        assert_eq!(node.utilization.cpu_pct, 95.0);
        assert_eq!(node.utilization.source, MetricSource::Measured);
        assert!(node.tags.contains(&"high compute load".to_string()));
        assert_eq!(node.last_updated_ms, 7);

        for other in before.nodes.iter().filter(|n| n.id != "00000002") {
            assert_eq!(after.node(&other.id), Some(other));
        }
        assert_eq!(after.source, SnapshotSource::Simulated);
        assert!(after.aggregate.avg_cpu_pct > before.aggregate.avg_cpu_pct);
    }

    #[test]
    fn test_node_update_partial_keeps_simulated_source() {
        let before = snapshot();
        let msg = push(json!({"type": "node_update", "data": {"id": "00000003", "cpu": 10}}));
        let PushOutcome::Updated(after) = apply_push(&before, &msg, 2) else {
            panic!("expected update");
        };
        let node = after.node("00000003").unwrap();
        assert_eq!(node.utilization.cpu_pct, 10.0);
        assert_eq!(node.utilization.memory_pct, 50.0);
        assert!(node.utilization.is_simulated());
    }

    #[test]
    fn test_node_update_clamps_and_revives() {
        let before = snapshot();
        let msg = push(json!({
            "type": "node_update",
            "data": {"node_id": "00000005", "status": "ALIVE", "cpu_usage": 250.0}
        }));
        let PushOutcome::Updated(after) = apply_push(&before, &msg, 3) else {
            panic!("expected update");
        };
        let node = after.node("00000005").unwrap();
        assert_eq!(node.utilization.cpu_pct, 100.0);
        assert!(node.is_alive());
        assert_eq!(after.aggregate.alive_count, 5);
        assert_eq!(after.aggregate.dead_count, 0);
        assert!(!node.tags.contains(&"offline".to_string()));
    }

    #[test]
    fn test_node_update_with_tasks_keeps_them() {
        let before = snapshot();
        let msg = push(json!({
            "type": "node_update",
            "data": {"node_id": "00000002", "tasks": ["video decode"], "connectionType": "wireless"}
        }));
        let PushOutcome::Updated(after) = apply_push(&before, &msg, 3) else {
            panic!("expected update");
        };
        let node = after.node("00000002").unwrap();
        assert_eq!(node.tags, ["video decode"]);
        assert_eq!(node.connectivity, Connectivity::Wireless);
        assert_eq!(after.aggregate.wireless_count, 3);
    }

    #[test]
    fn test_unknown_node_is_noop() {
        let before = snapshot();
        let msg = push(json!({"type": "node_update", "data": {"node_id": "retired"}}));
        assert_eq!(apply_push(&before, &msg, 3), PushOutcome::Unchanged);
    }

    #[test]
    fn test_system_status_touches_only_indicator() {
        let before = snapshot();
        let msg = push(json!({"type": "system_status", "data": {"ray_status": "connected"}}));
        let PushOutcome::Updated(after) = apply_push(&before, &msg, 3) else {
            panic!("expected update");
        };
        assert_eq!(after.backend_connected, Some(true));
        assert_eq!(after.nodes, before.nodes);
        assert_eq!(after.aggregate, before.aggregate);
    }

    #[test]
    fn test_ignored_and_rejected() {
        let before = snapshot();
        let transfer = push(json!({"type": "file_transfer", "data": {"file": "a.bin"}}));
        assert_eq!(apply_push(&before, &transfer, 3), PushOutcome::Ignored);

        let bad = push(json!({"type": "node_update", "data": {"node_id": "00000002", "cpu_usage": "hot"}}));
        assert!(matches!(
            apply_push(&before, &bad, 3),
            PushOutcome::Rejected(FeedError::MalformedPush(_))
        ));

        let anonymous = push(json!({"type": "node_update", "data": {"cpu_usage": 1.0}}));
        assert!(matches!(apply_push(&before, &anonymous, 3), PushOutcome::Rejected(_)));
    }
}
