use serde::{Deserialize, Serialize};

use crate::{Capacity, FeedError, Node};

/// Provenance of a published snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotSource {
    Live,
    Simulated,
    Stale,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Aggregate {
    pub total_nodes: usize,
    pub alive_count: usize,
    /// Every node that is not alive, so `alive_count + dead_count == total_nodes`.
    pub dead_count: usize,
    pub head_count: usize,
    pub wired_count: usize,
    pub wireless_count: usize,
    /// Averages over alive nodes only, one decimal.
    pub avg_cpu_pct: f64,
    pub avg_memory_pct: f64,
    pub avg_gpu_pct: f64,
    pub total_tag_count: usize,
    pub capacity: Capacity,
}

/// One immutable, fully computed view of the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSnapshot {
    pub nodes: Vec<Node>,
    pub aggregate: Aggregate,
    pub source: SnapshotSource,

    /// `ray_status == "connected"` from the status feed; `None` when unknown.
    #[serde(default)]
    pub backend_connected: Option<bool>,

    /// Why this snapshot is not live, if it isn't.
    #[serde(default)]
    pub fault: Option<FeedError>,

    pub generated_at_ms: u64,
}

impl ClusterSnapshot {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id || n.node_id == id)
    }

    pub fn is_live(&self) -> bool {
        self.source == SnapshotSource::Live
    }
}
