use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use castray_common::{Capacity, Connectivity, Lifecycle, MetricSource, Node, Utilization};

use crate::sampler::UsageSampler;
use crate::shapes::{RawEntry, RayNode, ReportedNode};

const GIB: f64 = (1u64 << 30) as f64;

/// Simulated utilization bounds, inclusive.
pub const CPU_RANGE: (u32, u32) = (20, 80);
pub const MEMORY_RANGE: (u32, u32) = (15, 75);
pub const GPU_RANGE: (u32, u32) = (10, 90);

/// Resource keys that describe capacity or connectivity rather than identity.
const STANDARD_RESOURCE_KEYS: &[&str] = &[
    "CPU",
    "memory",
    "GPU",
    "object_store_memory",
    "Wired",
    "Wireless",
];
const INTERNAL_RESOURCE_PREFIXES: &[&str] = &["node:", "accelerator_type:"];
const HEAD_MARKER_RESOURCE: &str = "node:__internal_head__";
const MAX_RESOURCE_TAG_LEN: usize = 3;

const SHORT_ID_LEN: usize = 8;
const MESSAGE_PREVIEW_CHARS: usize = 30;

/// Maps raw feed entries onto canonical [`Node`]s.
///
/// Utilization the feed does not report is drawn from the injected sampler and
/// the node is marked [`MetricSource::Simulated`].
#[derive(Clone)]
pub struct Normalizer {
    sampler: Arc<dyn UsageSampler>,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn new(sampler: Arc<dyn UsageSampler>) -> Self {
        Self { sampler }
    }

    /// Normalize every entry and make ids unique.
    ///
    /// A repeated raw `node_id` is a duplicate listing and is dropped. Distinct
    /// nodes whose short ids collide fall back to their full raw id.
    pub fn normalize(&self, entries: Vec<RawEntry>, now_ms: u64) -> Vec<Node> {
        let mut seen_raw: HashSet<String> = HashSet::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(entries.len());

        for (idx, entry) in entries.into_iter().enumerate() {
            let mut node = match entry {
                RawEntry::Ray(raw) => self.from_ray(idx, raw, Lifecycle::Unknown, now_ms),
                RawEntry::Agent(raw) => self.from_ray(idx, raw, Lifecycle::Alive, now_ms),
                RawEntry::Reported(reported) => self.from_reported(idx, reported, now_ms),
            };

            if !node.node_id.is_empty() && !seen_raw.insert(node.node_id.clone()) {
                tracing::debug!(node_id = %node.node_id, "dropping duplicate node entry");
                continue;
            }

            if seen_ids.contains(&node.id) {
                let mut candidate = node.node_id.clone();
                let mut suffix = idx;
                while candidate.is_empty() || seen_ids.contains(&candidate) {
                    candidate = format!("{}-{}", node.id, suffix);
                    suffix += 1;
                }
                tracing::debug!(short_id = %node.id, id = %candidate, "short node id collision");
                node.id = candidate;
            }
            seen_ids.insert(node.id.clone());
            out.push(node);
        }

        out
    }

    fn from_ray(
        &self,
        idx: usize,
        raw: RayNode,
        missing_state: Lifecycle,
        now_ms: u64,
    ) -> Node {
        let resources = &raw.resources_total;
        let tag = resource_tag(resources);
        let id = short_id(&raw.node_id, idx);
        let ip = raw.node_ip.filter(|s| !s.is_empty());
        let address = ip.clone().unwrap_or_else(|| "unknown".to_string());
        let display_name = tag.clone().or(ip).unwrap_or_else(|| id.clone());
        let full_name = format!("{} ({})", tag.as_deref().unwrap_or("unknown"), address);

        let lifecycle = raw
            .state
            .as_deref()
            .map(Lifecycle::from_state)
            .unwrap_or(missing_state);
        let is_head_node =
            raw.is_head_node.unwrap_or(false) || resources.contains_key(HEAD_MARKER_RESOURCE);

        let capacity = capacity_from_resources(resources);
        let mut connectivity = connectivity_from_resources(resources);
        if connectivity == Connectivity::Unknown {
            if let Some(label) = raw.connection_type.as_deref() {
                connectivity = Connectivity::from_label(label);
            }
        }

        let utilization = self.utilization(
            raw.cpu_usage,
            raw.memory_usage,
            raw.gpu_usage,
            capacity.has_gpu(),
        );
        let state_message = raw.state_message.filter(|s| !s.is_empty());
        let tags = derive_tags(
            lifecycle,
            is_head_node,
            &utilization,
            &capacity,
            state_message.as_deref(),
        );

        Node {
            id,
            node_id: raw.node_id,
            display_name,
            full_name,
            address,
            is_head_node,
            lifecycle,
            state_message,
            connectivity,
            utilization,
            capacity,
            tags,
            last_updated_ms: now_ms,
        }
    }

    fn from_reported(&self, idx: usize, reported: ReportedNode, now_ms: u64) -> Node {
        let id = if reported.id.is_empty() {
            format!("node-{idx}")
        } else {
            reported.id
        };
        let node_id = reported
            .node_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| id.clone());
        let ip = reported.node_ip.filter(|s| !s.is_empty());
        let address = ip.clone().unwrap_or_else(|| "unknown".to_string());
        let display_name = reported
            .name
            .filter(|s| !s.is_empty())
            .or(ip)
            .unwrap_or_else(|| id.clone());
        let full_name = reported
            .full_name
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{display_name} ({address})"));

        let lifecycle = reported
            .state
            .as_deref()
            .or(reported.status.as_deref())
            .map(Lifecycle::from_state)
            .unwrap_or(Lifecycle::Unknown);
        let is_head_node = reported.is_head_node.unwrap_or(false);

        let res = reported.resources.unwrap_or_default();
        let capacity = Capacity {
            cpu_cores: res.total_cpu.max(0.0),
            memory_gib: res.total_memory.max(0.0).round() as u64,
            gpu_count: res.total_gpu.max(0.0),
            object_store_gib: res.object_store.max(0.0).round() as u64,
        };
        let connectivity = reported
            .connection_type
            .as_deref()
            .map(Connectivity::from_label)
            .unwrap_or(Connectivity::Unknown);

        let utilization =
            self.utilization(reported.cpu, reported.memory, reported.gpu, capacity.has_gpu());
        let state_message = reported.state_message.filter(|s| !s.is_empty());
        let tags = match reported.tasks.as_ref().and_then(string_list) {
            Some(tasks) => tasks,
            None => derive_tags(
                lifecycle,
                is_head_node,
                &utilization,
                &capacity,
                state_message.as_deref(),
            ),
        };

        Node {
            id,
            node_id,
            display_name,
            full_name,
            address,
            is_head_node,
            lifecycle,
            state_message,
            connectivity,
            utilization,
            capacity,
            tags,
            last_updated_ms: now_ms,
        }
    }

    /// Use reported figures where present and sample the rest. GPU stays at 0
    /// for nodes without GPU capacity.
    fn utilization(
        &self,
        cpu: Option<f64>,
        memory: Option<f64>,
        gpu: Option<f64>,
        has_gpu: bool,
    ) -> Utilization {
        let mut source = MetricSource::Measured;

        let cpu = cpu.unwrap_or_else(|| {
            source = MetricSource::Simulated;
            self.sampler.sample(CPU_RANGE.0, CPU_RANGE.1)
        });
        let memory = memory.unwrap_or_else(|| {
            source = MetricSource::Simulated;
            self.sampler.sample(MEMORY_RANGE.0, MEMORY_RANGE.1)
        });
        let gpu = match gpu {
            Some(v) => v,
            None if has_gpu => {
                source = MetricSource::Simulated;
                self.sampler.sample(GPU_RANGE.0, GPU_RANGE.1)
            }
            None => 0.0,
        };

        Utilization::new(cpu, memory, gpu, source)
    }
}

/// Trailing characters of the raw id, or `node-<idx>` when there is none.
pub fn short_id(raw: &str, idx: usize) -> String {
    if raw.is_empty() {
        return format!("node-{idx}");
    }
    let len = raw.chars().count();
    raw.chars().skip(len.saturating_sub(SHORT_ID_LEN)).collect()
}

/// First short custom resource key, in feed order.
///
/// Nodes are usually labelled with a tag like `G1` or `M2`. When a node
/// carries several short custom keys the first one wins.
pub fn resource_tag(resources: &Map<String, Value>) -> Option<String> {
    resources
        .keys()
        .find(|key| {
            !STANDARD_RESOURCE_KEYS.contains(&key.as_str())
                && !INTERNAL_RESOURCE_PREFIXES.iter().any(|p| key.starts_with(p))
                && key.chars().count() <= MAX_RESOURCE_TAG_LEN
        })
        .cloned()
}

pub fn connectivity_from_resources(resources: &Map<String, Value>) -> Connectivity {
    if flag_set(resources.get("Wired")) {
        Connectivity::Wired
    } else if flag_set(resources.get("Wireless")) {
        Connectivity::Wireless
    } else {
        Connectivity::Unknown
    }
}

fn flag_set(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

pub fn capacity_from_resources(resources: &Map<String, Value>) -> Capacity {
    let amount = |key: &str| {
        resources
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .max(0.0)
    };
    Capacity {
        cpu_cores: amount("CPU"),
        memory_gib: (amount("memory") / GIB).round() as u64,
        gpu_count: amount("GPU"),
        object_store_gib: (amount("object_store_memory") / GIB).round() as u64,
    }
}

/// Status strings shown on a node card, derived from lifecycle and load.
pub fn derive_tags(
    lifecycle: Lifecycle,
    is_head_node: bool,
    utilization: &Utilization,
    capacity: &Capacity,
    state_message: Option<&str>,
) -> Vec<String> {
    let mut tags = Vec::new();

    if lifecycle != Lifecycle::Alive {
        tags.push("offline".to_string());
        if let Some(msg) = state_message {
            let preview: String = msg.chars().take(MESSAGE_PREVIEW_CHARS).collect();
            tags.push(format!("error: {preview}..."));
        }
        return tags;
    }

    if is_head_node {
        tags.push("head node".to_string());
        tags.push("task scheduling".to_string());
        tags.push("GCS service".to_string());
    } else {
        tags.push("worker node".to_string());
    }

    if utilization.cpu_pct > 70.0 {
        tags.push("high compute load".to_string());
    } else if utilization.cpu_pct > 30.0 {
        tags.push("data processing".to_string());
    } else {
        tags.push("idle".to_string());
    }

    if utilization.memory_pct > 70.0 {
        tags.push("large data cache".to_string());
    }

    if utilization.gpu_pct > 50.0 {
        tags.push("GPU accelerated compute".to_string());
    } else if capacity.has_gpu() && utilization.gpu_pct > 0.0 {
        tags.push("light GPU workload".to_string());
    }

    tags
}

pub(crate) fn string_list(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}
