//! Cluster feed normalization.
//!
//! Pulls node listings from a Ray-style cluster API, maps whatever layout the
//! backend returns onto [`castray_common::Node`], and publishes immutable
//! [`castray_common::ClusterSnapshot`]s. When the backend is unavailable the
//! feed degrades to stale or simulated data instead of failing.

pub mod engine;
pub mod fetch;
pub mod normalize;
pub mod push;
pub mod sampler;
pub mod shapes;
pub mod stats;
pub mod synthetic;
pub mod transport;
pub mod util;

pub use engine::{FeedConfig, FeedEngine, FeedStatsSnapshot, RefreshHandle};
pub use fetch::{backend_connected, fetch_and_normalize, try_fetch};
pub use normalize::Normalizer;
pub use push::{apply_push, NodeUpdate, PushOutcome};
pub use sampler::{FixedSampler, SeededSampler, ThreadRngSampler, UsageSampler};
pub use shapes::{parse_nodes, Shape};
pub use synthetic::synthetic_snapshot;
pub use transport::{ClusterTransport, HttpTransport, PushStream, StaticTransport};
