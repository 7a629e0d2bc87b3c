//! Concrete application state, grounded on the teacher's `infra::app_state`:
//! one `AppState` struct fixing every transport to its real implementation,
//! since this binary only ever serves against live Redis and n8n instances.

use std::fmt;
use std::sync::Arc;

use mindex_config::Config;
use mindex_core::{
    HttpWorkflowTransport, IngestionOrchestrator, PubSubHub, RedisTransport, SpatialStore, WorkflowAutoMonitor,
    WorkflowEngine,
};

use crate::streams::StreamRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SpatialStore>,
    pub pubsub: Arc<PubSubHub<RedisTransport>>,
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub workflows: Arc<WorkflowEngine<HttpWorkflowTransport>>,
    pub workflows_cloud: Arc<WorkflowEngine<HttpWorkflowTransport>>,
    pub workflow_monitor: Arc<WorkflowAutoMonitor<HttpWorkflowTransport>>,
    pub streams: Arc<StreamRegistry>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
