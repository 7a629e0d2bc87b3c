//! Ingestion orchestrator, concrete collectors, spatial store client,
//! pub/sub hub, and n8n workflow engine/scheduler/auto-monitor.

pub mod collectors;
pub mod error;
pub mod orchestrator;
pub mod pubsub;
pub mod quality;
pub mod store;
pub mod workflow;

pub use error::CoreError;
pub use orchestrator::{AuditLogEntry, AuditLogger, IngestionOrchestrator};
pub use pubsub::{PubSubHub, RedisTransport};
pub use quality::{quality_score, s2_cell};
pub use store::SpatialStore;
pub use workflow::{
    clean_workflow_for_api, HttpWorkflowTransport, WorkflowAutoMonitor, WorkflowDirs, WorkflowEngine,
    WorkflowScheduler,
};
