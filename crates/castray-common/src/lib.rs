pub mod cluster;
pub mod error;
pub mod node;
pub mod push;

pub use cluster::{Aggregate, ClusterSnapshot, SnapshotSource};
pub use error::FeedError;
pub use node::{clamp_pct, Capacity, Connectivity, Lifecycle, MetricSource, Node, Utilization};
pub use push::{PushKind, PushMessage};

pub mod telemetry;
