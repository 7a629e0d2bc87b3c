use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowTransportError {
    #[error("http error ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

/// Blocking-style HTTP surface against one n8n instance, used via
/// `tokio::task::spawn_blocking` to preserve the "synchronous" engine
/// framing from spec.md §4.6 while not blocking the async runtime.
#[async_trait]
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
pub trait WorkflowTransport: Send + Sync {
    fn base_url(&self) -> &str;
    async fn get(&self, path: &str) -> Result<Value, WorkflowTransportError>;
    async fn post(&self, path: &str, body: Value) -> Result<Value, WorkflowTransportError>;
    async fn put(&self, path: &str, body: Value) -> Result<Value, WorkflowTransportError>;
    async fn delete(&self, path: &str) -> Result<(), WorkflowTransportError>;
}
