use std::cmp::Ordering;

use castray_common::{Aggregate, ClusterSnapshot, Connectivity, FeedError, Node, SnapshotSource};

use crate::util::round1;

/// Head node first, then alive before everything else, then display name
/// (case-insensitive), then id. Ids are unique so the order is total.
pub fn compare_nodes(a: &Node, b: &Node) -> Ordering {
    b.is_head_node
        .cmp(&a.is_head_node)
        .then_with(|| b.is_alive().cmp(&a.is_alive()))
        .then_with(|| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
        })
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_nodes(nodes: &mut [Node]) {
    nodes.sort_by(compare_nodes);
}

pub fn compute_aggregate(nodes: &[Node]) -> Aggregate {
    let mut agg = Aggregate {
        total_nodes: nodes.len(),
        ..Aggregate::default()
    };

    let mut cpu_sum = 0.0;
    let mut memory_sum = 0.0;
    let mut gpu_sum = 0.0;

    for node in nodes {
        if node.is_alive() {
            agg.alive_count += 1;
            cpu_sum += node.utilization.cpu_pct;
            memory_sum += node.utilization.memory_pct;
            gpu_sum += node.utilization.gpu_pct;
        }
        if node.is_head_node {
            agg.head_count += 1;
        }
        match node.connectivity {
            Connectivity::Wired => agg.wired_count += 1,
            Connectivity::Wireless => agg.wireless_count += 1,
            Connectivity::Unknown => {}
        }
        agg.total_tag_count += node.tags.len();

        agg.capacity.cpu_cores += node.capacity.cpu_cores;
        agg.capacity.memory_gib += node.capacity.memory_gib;
        agg.capacity.gpu_count += node.capacity.gpu_count;
        agg.capacity.object_store_gib += node.capacity.object_store_gib;
    }

    agg.dead_count = agg.total_nodes - agg.alive_count;

    if agg.alive_count > 0 {
        let n = agg.alive_count as f64;
        agg.avg_cpu_pct = round1(cpu_sum / n);
        agg.avg_memory_pct = round1(memory_sum / n);
        agg.avg_gpu_pct = round1(gpu_sum / n);
    }

    agg
}

/// Sort `nodes`, compute the aggregate and wrap everything in a snapshot.
pub fn build_snapshot(
    mut nodes: Vec<Node>,
    source: SnapshotSource,
    backend_connected: Option<bool>,
    fault: Option<FeedError>,
    now_ms: u64,
) -> ClusterSnapshot {
    sort_nodes(&mut nodes);
    let aggregate = compute_aggregate(&nodes);
    ClusterSnapshot {
        nodes,
        aggregate,
        source,
        backend_connected,
        fault,
        generated_at_ms: now_ms,
    }
}
