/// Client for the hologram device's HTTP control plane.
use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use crate::config::HologramConfig;

pub struct HologramClient {
    http: Client,
    base_url: String,
}

impl HologramClient {
    pub fn new(config: &HologramConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn play(&self, video: &str) -> Result<Value> {
        let body = json!({ "video": video, "loop": true });
        self.send(self.http.post(self.url("/api/play")).json(&body))
            .await
    }

    pub async fn stop(&self) -> Result<Value> {
        self.send(self.http.post(self.url("/api/stop")).json(&json!({})))
            .await
    }

    pub async fn status(&self) -> Result<Value> {
        self.send(self.http.get(self.url("/api/status"))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Passes the device's JSON through on success. On an error status the
    /// device's own `error` text is surfaced when it sent one.
    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Hologram device unreachable: {e}"))?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        if status.is_success() {
            return Ok(body);
        }
        match body.get("error").and_then(Value::as_str) {
            Some(message) => bail!("{message}"),
            None => bail!("Hologram device returned {status}"),
        }
    }
}
