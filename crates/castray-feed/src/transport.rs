use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use serde_json::Value;

use castray_common::FeedError;

/// Raw push-channel messages, one JSON text per item.
pub type PushStream = Pin<Box<dyn Stream<Item = String> + Send>>;

pub const DEFAULT_STATUS_PATH: &str = "/api/status";
pub const DEFAULT_NODES_PATH: &str = "/api/nodes";

/// The two logical calls the feed needs from a cluster API.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn get_status(&self) -> Result<Value, FeedError>;
    async fn get_nodes(&self) -> Result<Value, FeedError>;

    /// Human-readable target for logging.
    fn describe(&self) -> String {
        "cluster".to_string()
    }
}

/// JSON over HTTP via `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    status_path: String,
    nodes_path: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(3)))
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            status_path: DEFAULT_STATUS_PATH.to_string(),
            nodes_path: DEFAULT_NODES_PATH.to_string(),
        }
    }

    pub fn with_paths(mut self, status_path: impl Into<String>, nodes_path: impl Into<String>) -> Self {
        self.status_path = status_path.into();
        self.nodes_path = nodes_path.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, path: &str) -> Result<Value, FeedError> {
        let url = self.url(path);
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FeedError::Unreachable(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Unreachable(format!("{url}: HTTP {status}")));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| FeedError::Unreachable(format!("{url}: invalid JSON body: {e}")))
    }
}

#[async_trait]
impl ClusterTransport for HttpTransport {
    async fn get_status(&self) -> Result<Value, FeedError> {
        self.get_json(&self.status_path).await
    }

    async fn get_nodes(&self) -> Result<Value, FeedError> {
        self.get_json(&self.nodes_path).await
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// In-memory transport with settable responses.
#[derive(Debug)]
pub struct StaticTransport {
    status: Mutex<Result<Value, FeedError>>,
    nodes: Mutex<Result<Value, FeedError>>,
    latency: Mutex<Duration>,
    calls: AtomicU64,
}

impl StaticTransport {
    pub fn new(status: Value, nodes: Value) -> Self {
        Self {
            status: Mutex::new(Ok(status)),
            nodes: Mutex::new(Ok(nodes)),
            latency: Mutex::new(Duration::ZERO),
            calls: AtomicU64::new(0),
        }
    }

    /// Both calls fail as if the backend were down.
    pub fn unreachable() -> Self {
        let t = Self::new(Value::Null, Value::Null);
        t.set_status(Err(FeedError::Unreachable("connection refused".to_string())));
        t.set_nodes(Err(FeedError::Unreachable("connection refused".to_string())));
        t
    }

    pub fn set_status(&self, status: Result<Value, FeedError>) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn set_nodes(&self, nodes: Result<Value, FeedError>) {
        *self.nodes.lock().unwrap_or_else(|e| e.into_inner()) = nodes;
    }

    /// Delay applied to every call before it answers.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Number of completed calls, status and nodes counted separately.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    async fn answer(&self, slot: &Mutex<Result<Value, FeedError>>) -> Result<Value, FeedError> {
        // Read the response at call time, not after the delay.
        let response = slot.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        response
    }
}

#[async_trait]
impl ClusterTransport for StaticTransport {
    async fn get_status(&self) -> Result<Value, FeedError> {
        self.answer(&self.status).await
    }

    async fn get_nodes(&self) -> Result<Value, FeedError> {
        self.answer(&self.nodes).await
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_join() {
        let t = HttpTransport::with_client(reqwest::Client::new(), "http://localhost:8000/")
            .with_paths("/api/status", "/api/v0/nodes");
        assert_eq!(t.url(&t.nodes_path), "http://localhost:8000/api/v0/nodes");
        assert_eq!(t.describe(), "http://localhost:8000/");
    }

    #[tokio::test]
    async fn test_static_transport_answers() {
        let t = StaticTransport::new(json!({"ray_status": "connected"}), json!({"result": []}));
        assert_eq!(t.get_status().await.unwrap()["ray_status"], "connected");
        t.set_nodes(Err(FeedError::Unreachable("down".to_string())));
        assert!(t.get_nodes().await.is_err());
        assert_eq!(t.calls(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_http_backend() {
        // Port 9 (discard) is closed on test hosts; either way this must not panic.
        let t = HttpTransport::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = t.get_status().await.unwrap_err();
        assert_eq!(err.kind(), "unreachable");
    }
}
