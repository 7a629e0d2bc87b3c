use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed category set assigned by filename/name-prefix rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowCategory {
    Core,
    Native,
    Ops,
    Speech,
    Custom,
    Template,
}

impl WorkflowCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowCategory::Core => "core",
            WorkflowCategory::Native => "native",
            WorkflowCategory::Ops => "ops",
            WorkflowCategory::Speech => "speech",
            WorkflowCategory::Custom => "custom",
            WorkflowCategory::Template => "template",
        }
    }

    pub fn all() -> [WorkflowCategory; 6] {
        [
            WorkflowCategory::Core,
            WorkflowCategory::Native,
            WorkflowCategory::Ops,
            WorkflowCategory::Speech,
            WorkflowCategory::Custom,
            WorkflowCategory::Template,
        ]
    }
}

/// Not named directly by spec.md, supplemented from the original's
/// `WorkflowStatus` enum to give `sync`/`archive` results a closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Active,
    Inactive,
    Archived,
    Draft,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub nodes_count: usize,
    pub tags: Vec<String>,
    pub category: WorkflowCategory,
    /// Monotonically increasing archive version, 0 if never archived.
    pub version: u32,
    pub description: Option<String>,
    pub checksum: String,
    pub local_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub workflow_id: String,
    pub workflow_name: String,
    pub version: u32,
    pub archived_at: DateTime<Utc>,
    pub checksum: String,
    pub file_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub imported: Vec<String>,
    pub updated: Vec<String>,
    pub activated: Vec<String>,
    pub deactivated: Vec<String>,
    pub archived: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<SyncError>,
    pub timestamp: DateTime<Utc>,
}

impl SyncResult {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            ..Default::default()
        }
    }
}

/// Supplemented from `original_source/mycosoft_mas/core/n8n_workflow_engine.py`;
/// the return shape of `get_execution_stats`, dropped by the distillation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub workflow_id: String,
    pub workflow_name: String,
    pub total_executions: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_duration_ms: f64,
    pub last_execution: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
}
