use chrono::{DateTime, Utc};
use serde::Deserialize;

use castray_common::{
    Aggregate, ClusterSnapshot, Connectivity, FeedError, Lifecycle, Node, SnapshotSource,
};

/// `POST /api/refresh` response; extra fields are ignored.
#[derive(Debug, Deserialize)]
pub struct Summary {
    pub aggregate: Aggregate,
    pub source: SnapshotSource,
    #[serde(default)]
    pub backend_connected: Option<bool>,
    #[serde(default)]
    pub fault: Option<FeedError>,
    pub generated_at_ms: u64,
}

pub fn format_timestamp(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{ms}ms"))
}

fn source_label(source: SnapshotSource) -> &'static str {
    match source {
        SnapshotSource::Live => "LIVE",
        SnapshotSource::Simulated => "SIMULATED",
        SnapshotSource::Stale => "STALE",
    }
}

fn backend_label(connected: Option<bool>) -> &'static str {
    match connected {
        Some(true) => "connected",
        Some(false) => "disconnected",
        None => "unknown",
    }
}

pub fn print_summary(summary: &Summary) {
    print_header(
        summary.source,
        summary.backend_connected,
        summary.fault.as_ref(),
        summary.generated_at_ms,
    );
    print_aggregate(&summary.aggregate);
    println!();
}

pub fn print_snapshot(snap: &ClusterSnapshot) {
    print_header(
        snap.source,
        snap.backend_connected,
        snap.fault.as_ref(),
        snap.generated_at_ms,
    );
    print_aggregate(&snap.aggregate);

    println!("\n[Nodes]");
    if snap.nodes.is_empty() {
        println!("  (No nodes reported)");
    } else {
        println!(
            "  {:<10} {:<12} {:<16} {:<8} {:<9} {:>6} {:>6} {:>6}  {}",
            "ID", "Name", "Address", "State", "Link", "CPU%", "MEM%", "GPU%", "Tags"
        );
        for node in &snap.nodes {
            println!("  {}", node_row(node));
        }
    }
    println!();
}

fn print_header(
    source: SnapshotSource,
    backend_connected: Option<bool>,
    fault: Option<&FeedError>,
    generated_at_ms: u64,
) {
    println!("\n=== CastRay Cluster ===");
    println!(
        "  Source: {}   Backend: {}   Generated: {}",
        source_label(source),
        backend_label(backend_connected),
        format_timestamp(generated_at_ms)
    );
    if let Some(fault) = fault {
        println!("  Fault: {fault}");
    }
}

fn print_aggregate(agg: &Aggregate) {
    println!("\n[Summary]");
    println!(
        "  Nodes: {} total, {} alive, {} down, {} head",
        agg.total_nodes, agg.alive_count, agg.dead_count, agg.head_count
    );
    println!(
        "  Links: {} wired, {} wireless",
        agg.wired_count, agg.wireless_count
    );
    println!(
        "  Avg load: CPU {:.1}%  MEM {:.1}%  GPU {:.1}%",
        agg.avg_cpu_pct, agg.avg_memory_pct, agg.avg_gpu_pct
    );
    println!(
        "  Capacity: {} cores, {} GiB memory, {} GPUs, {} GiB object store",
        agg.capacity.cpu_cores,
        agg.capacity.memory_gib,
        agg.capacity.gpu_count,
        agg.capacity.object_store_gib
    );
}

pub fn node_row(node: &Node) -> String {
    let state = match node.lifecycle {
        Lifecycle::Alive => "ALIVE",
        Lifecycle::Dead => "DEAD",
        Lifecycle::Unknown => "UNKNOWN",
    };
    let link = match node.connectivity {
        Connectivity::Wired => "wired",
        Connectivity::Wireless => "wireless",
        Connectivity::Unknown => "-",
    };
    let name = if node.is_head_node {
        format!("{}*", node.display_name)
    } else {
        node.display_name.clone()
    };
    let sim = if node.utilization.is_simulated() { "~" } else { "" };
    format!(
        "{:<10} {:<12} {:<16} {:<8} {:<9} {:>6} {:>6} {:>6}  {}",
        node.id,
        name,
        node.address,
        state,
        link,
        format!("{sim}{:.0}", node.utilization.cpu_pct),
        format!("{sim}{:.0}", node.utilization.memory_pct),
        format!("{sim}{:.0}", node.utilization.gpu_pct),
        node.tags.join(", ")
    )
}
