//! Concrete [`WorkflowTransport`] over `reqwest::blocking`, run through
//! `spawn_blocking` — the Rust analogue of the original's synchronous
//! `httpx.Client(timeout=60.0)`.

use std::time::Duration;

use async_trait::async_trait;
use mindex_contracts::{WorkflowTransport, WorkflowTransportError};
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::Value;

#[derive(Clone)]
pub struct HttpWorkflowTransport {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HttpWorkflowTransport {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, WorkflowTransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| WorkflowTransportError::Transport(e.to_string()))?;
        Ok(Self { base_url: base_url.into().trim_end_matches('/').to_string(), api_key: api_key.into(), client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, WorkflowTransportError> {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header("X-N8N-API-KEY", &self.api_key)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().map_err(|e| WorkflowTransportError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(WorkflowTransportError::Http {
                status: status.as_u16(),
                message: text.chars().take(500).collect(),
            });
        }
        if text.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&text).map_err(|e| WorkflowTransportError::Transport(e.to_string()))
    }
}

#[async_trait]
impl WorkflowTransport for HttpWorkflowTransport {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<Value, WorkflowTransportError> {
        let this = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || this.request(Method::GET, &path, None))
            .await
            .map_err(|e| WorkflowTransportError::Transport(e.to_string()))?
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, WorkflowTransportError> {
        let this = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || this.request(Method::POST, &path, Some(body)))
            .await
            .map_err(|e| WorkflowTransportError::Transport(e.to_string()))?
    }

    async fn put(&self, path: &str, body: Value) -> Result<Value, WorkflowTransportError> {
        let this = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || this.request(Method::PUT, &path, Some(body)))
            .await
            .map_err(|e| WorkflowTransportError::Transport(e.to_string()))?
    }

    async fn delete(&self, path: &str) -> Result<(), WorkflowTransportError> {
        let this = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || this.request(Method::DELETE, &path, None).map(|_| ()))
            .await
            .map_err(|e| WorkflowTransportError::Transport(e.to_string()))?
    }
}
