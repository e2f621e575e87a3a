use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    Alive,
    Dead,
    Unknown,
}

impl Lifecycle {
    /// Map a raw state string (`ALIVE`, `DEAD`, `active`, ...) to a lifecycle.
    pub fn from_state(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "alive" | "active" => Lifecycle::Alive,
            "dead" | "offline" | "inactive" => Lifecycle::Dead,
            _ => Lifecycle::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Connectivity {
    Wired,
    Wireless,
    Unknown,
}

impl Connectivity {
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "wired" => Connectivity::Wired,
            "wireless" => Connectivity::Wireless,
            _ => Connectivity::Unknown,
        }
    }
}

/// Whether utilization numbers came from the feed or were generated locally.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricSource {
    Measured,
    Simulated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Utilization {
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub gpu_pct: f64,
    pub source: MetricSource,
}

impl Utilization {
    pub fn new(cpu_pct: f64, memory_pct: f64, gpu_pct: f64, source: MetricSource) -> Self {
        Self {
            cpu_pct: clamp_pct(cpu_pct),
            memory_pct: clamp_pct(memory_pct),
            gpu_pct: clamp_pct(gpu_pct),
            source,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.source == MetricSource::Simulated
    }
}

/// Clamp a percentage into `[0, 100]`. NaN collapses to 0.
pub fn clamp_pct(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Capacity {
    pub cpu_cores: f64,
    pub memory_gib: u64,
    pub gpu_count: f64,
    pub object_store_gib: u64,
}

impl Capacity {
    pub fn has_gpu(&self) -> bool {
        self.gpu_count > 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Short identifier, unique within a snapshot.
    pub id: String,
    /// Identifier as reported by the cluster.
    pub node_id: String,
    pub display_name: String,
    pub full_name: String,
    pub address: String,
    pub is_head_node: bool,
    pub lifecycle: Lifecycle,

    #[serde(default)]
    pub state_message: Option<String>,

    pub connectivity: Connectivity,
    pub utilization: Utilization,
    pub capacity: Capacity,

    #[serde(default)]
    pub tags: Vec<String>,

    pub last_updated_ms: u64,
}

impl Node {
    pub fn is_alive(&self) -> bool {
        self.lifecycle == Lifecycle::Alive
    }
}
