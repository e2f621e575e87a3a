//! Placeholder cluster used when the live feed is unavailable.
//!
//! The topology is fixed (one head, three workers, one dead worker); only the
//! utilization figures vary, drawn from the normalizer's sampler.

use serde_json::{Map, Value};

use castray_common::{ClusterSnapshot, FeedError, SnapshotSource};

use crate::normalize::Normalizer;
use crate::shapes::{RawEntry, RayNode};
use crate::stats::build_snapshot;

const GIB: f64 = (1u64 << 30) as f64;

struct Template {
    ip: &'static str,
    state: &'static str,
    head: bool,
    message: Option<&'static str>,
    resources: &'static [(&'static str, f64)],
}

const TEMPLATES: &[Template] = &[
    Template {
        ip: "10.30.2.11",
        state: "ALIVE",
        head: true,
        message: None,
        resources: &[
            ("CPU", 16.0),
            ("memory", 32.0 * GIB),
            ("GPU", 2.0),
            ("object_store_memory", 8.0 * GIB),
            ("node:10.30.2.11", 1.0),
            ("node:__internal_head__", 1.0),
            ("Wired", 1.0),
            ("H1", 1.0),
        ],
    },
    Template {
        ip: "10.30.2.12",
        state: "ALIVE",
        head: false,
        message: None,
        resources: &[
            ("CPU", 8.0),
            ("memory", 16.0 * GIB),
            ("object_store_memory", 4.0 * GIB),
            ("node:10.30.2.12", 1.0),
            ("Wired", 1.0),
            ("W1", 1.0),
        ],
    },
    Template {
        ip: "10.30.2.13",
        state: "ALIVE",
        head: false,
        message: None,
        resources: &[
            ("CPU", 12.0),
            ("memory", 24.0 * GIB),
            ("GPU", 1.0),
            ("accelerator_type:G", 1.0),
            ("object_store_memory", 6.0 * GIB),
            ("node:10.30.2.13", 1.0),
            ("Wired", 1.0),
            ("G1", 1.0),
        ],
    },
    Template {
        ip: "10.30.2.14",
        state: "ALIVE",
        head: false,
        message: None,
        resources: &[
            ("CPU", 4.0),
            ("memory", 8.0 * GIB),
            ("object_store_memory", 2.0 * GIB),
            ("node:10.30.2.14", 1.0),
            ("Wireless", 1.0),
            ("M1", 1.0),
        ],
    },
    Template {
        ip: "10.30.2.15",
        state: "DEAD",
        head: false,
        message: Some(
            "Unexpected termination: health check failed due to missing too many heartbeats",
        ),
        resources: &[
            ("CPU", 8.0),
            ("memory", 16.0 * GIB),
            ("object_store_memory", 4.0 * GIB),
            ("node:10.30.2.15", 1.0),
            ("Wireless", 1.0),
            ("M2", 1.0),
        ],
    },
];

/// Raw records for the placeholder cluster, in the Ray dashboard layout.
pub fn synthetic_nodes() -> Vec<RayNode> {
    TEMPLATES
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let mut resources = Map::new();
            for (key, amount) in t.resources {
                resources.insert((*key).to_string(), Value::from(*amount));
            }
            RayNode {
                node_id: format!("5e7a{:052x}", i + 1),
                node_ip: Some(t.ip.to_string()),
                state: Some(t.state.to_string()),
                is_head_node: Some(t.head),
                state_message: t.message.map(str::to_string),
                resources_total: resources,
                cpu_usage: None,
                memory_usage: None,
                gpu_usage: None,
                connection_type: None,
            }
        })
        .collect()
}

/// Build a `SIMULATED` snapshot, recording why the live feed was not used.
pub fn synthetic_snapshot(
    normalizer: &Normalizer,
    fault: Option<FeedError>,
    now_ms: u64,
) -> ClusterSnapshot {
    let entries = synthetic_nodes().into_iter().map(RawEntry::Ray).collect();
    let nodes = normalizer.normalize(entries, now_ms);
    build_snapshot(nodes, SnapshotSource::Simulated, None, fault, now_ms)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sampler::{FixedSampler, SeededSampler};
    use castray_common::{Lifecycle, MetricSource};

    #[test]
    fn test_synthetic_topology() {
        let normalizer = Normalizer::new(Arc::new(FixedSampler(50.0)));
        let snap = synthetic_snapshot(&normalizer, None, 10);

        assert_eq!(snap.source, SnapshotSource::Simulated);
        assert_eq!(snap.aggregate.total_nodes, 5);
        assert_eq!(snap.aggregate.alive_count, 4);
        assert_eq!(snap.aggregate.dead_count, 1);
        assert_eq!(snap.aggregate.head_count, 1);
        assert_eq!(snap.aggregate.wired_count, 3);
        assert_eq!(snap.aggregate.wireless_count, 2);

        let head = &snap.nodes[0];
        assert!(head.is_head_node);
        assert_eq!(head.display_name, "H1");
        assert_eq!(head.capacity.memory_gib, 32);
        assert_eq!(head.id, "00000001");

        let last = snap.nodes.last().unwrap();
        assert_eq!(last.lifecycle, Lifecycle::Dead);
        assert_eq!(last.display_name, "M2");

        assert!(snap
            .nodes
            .iter()
            .all(|n| n.utilization.source == MetricSource::Simulated));
    }

    #[test]
    fn test_synthetic_ids_are_unique() {
        let normalizer = Normalizer::new(Arc::new(SeededSampler::new(1)));
        let snap = synthetic_snapshot(&normalizer, None, 0);
        let mut ids: Vec<&str> = snap.nodes.iter().map(|n| n.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), snap.nodes.len());
    }

    #[test]
    fn test_seeded_synthetic_is_reproducible() {
        let a = synthetic_snapshot(&Normalizer::new(Arc::new(SeededSampler::new(9))), None, 5);
        let b = synthetic_snapshot(&Normalizer::new(Arc::new(SeededSampler::new(9))), None, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fault_is_recorded() {
        let normalizer = Normalizer::new(Arc::new(FixedSampler(30.0)));
        let fault = FeedError::Unreachable("connection refused".to_string());
        let snap = synthetic_snapshot(&normalizer, Some(fault.clone()), 0);
        assert_eq!(snap.fault, Some(fault));
    }
}
