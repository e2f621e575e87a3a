use anyhow::{bail, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Thin JSON client for the castray-bff API.
#[derive(Debug, Clone)]
pub struct BffClient {
    http: Client,
    base_url: String,
}

impl BffClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.http.get(self.url(path)).send().await?;
        Self::decode(resp).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.http.post(self.url(path)).send().await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            bail!("castray-bff returned {status}: {message}");
        }
        Ok(resp.json().await?)
    }
}
