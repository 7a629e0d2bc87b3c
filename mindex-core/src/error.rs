use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Collector(#[from] mindex_contracts::CollectorError),

    #[error(transparent)]
    PubSub(#[from] mindex_contracts::PubSubError),

    #[error(transparent)]
    Workflow(#[from] mindex_contracts::WorkflowTransportError),

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("workflow engine error: {0}")]
    WorkflowEngine(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
