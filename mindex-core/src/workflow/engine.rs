//! Workflow CRUD, archive/restore, and local-file sync against one n8n
//! instance, reached through a [`WorkflowTransport`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use mindex_contracts::WorkflowTransport;
use mindex_model::{
    ExecutionStats, SyncError, SyncResult, WorkflowCategory, WorkflowInfo, WorkflowVersion,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::CoreError;

const ALLOWED_FIELDS: [&str; 5] = ["name", "nodes", "connections", "settings", "staticData"];
const CORE_FILE_PREFIXES: [&str; 3] = ["01_", "02_", "myca-"];

/// Filesystem layout for local workflow definitions, archives, and the
/// version registry. All four directories are created on engine startup.
#[derive(Debug, Clone)]
pub struct WorkflowDirs {
    pub workflows_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub registry_dir: PathBuf,
    pub backup_dir: PathBuf,
}

impl WorkflowDirs {
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            workflows_dir: base.join("workflows"),
            archive_dir: base.join("archive"),
            registry_dir: base.join("registry"),
            backup_dir: base.join("backup"),
        }
    }

    fn ensure_exist(&self) -> std::io::Result<()> {
        for dir in [&self.workflows_dir, &self.archive_dir, &self.registry_dir, &self.backup_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn registry_file(&self) -> PathBuf {
        self.registry_dir.join("versions.json")
    }
}

/// Whitelists the fields n8n's create/update API accepts and injects the
/// defaults it requires, dropping everything else (ids, timestamps,
/// instance-assigned metadata) that a create/update call would reject.
pub fn clean_workflow_for_api(workflow_data: &Value) -> Value {
    let mut cleaned = serde_json::Map::new();
    if let Value::Object(map) = workflow_data {
        for field in ALLOWED_FIELDS {
            if let Some(v) = map.get(field) {
                cleaned.insert(field.to_string(), v.clone());
            }
        }
    }
    let name_missing = cleaned
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::is_empty)
        .unwrap_or(true);
    if name_missing {
        cleaned.insert("name".to_string(), json!("Unnamed Workflow"));
    }
    cleaned.entry("nodes").or_insert_with(|| json!([]));
    cleaned.entry("connections").or_insert_with(|| json!({}));
    cleaned.entry("settings").or_insert_with(|| json!({}));
    Value::Object(cleaned)
}

fn compute_checksum(data: &Value) -> String {
    let mut hasher = Md5::new();
    hasher.update(canonical_json(data).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Renders `value` with object keys sorted, the Rust stand-in for Python's
/// `json.dumps(data, sort_keys=True)` so checksums stay stable regardless of
/// field insertion order.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn safe_filename(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

fn categorize_workflow(name: &str, filename: &str) -> WorkflowCategory {
    let lower = format!("{name}{filename}").to_lowercase();
    let has_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if has_any(&["01_", "02_", "myca-", "command_api"]) {
        WorkflowCategory::Core
    } else if has_any(&["native_", "native-"]) {
        WorkflowCategory::Native
    } else if has_any(&["ops_", "ops-", "proxmox", "unifi", "nas", "gpu", "uart"]) {
        WorkflowCategory::Ops
    } else if has_any(&["speech", "voice", "audio", "tts", "transcribe"]) {
        WorkflowCategory::Speech
    } else if has_any(&["template", "base_"]) {
        WorkflowCategory::Template
    } else {
        WorkflowCategory::Custom
    }
}

fn parse_or_now(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn find_json_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else { return out };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(find_json_files(&path));
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            out.push(path);
        }
    }
    out.sort();
    out
}

/// Manages one n8n instance: workflow CRUD, archive/restore with a
/// filesystem-backed version registry, local-file sync, and execution
/// introspection. Grounded on `N8NWorkflowEngine`.
pub struct WorkflowEngine<T: WorkflowTransport> {
    transport: Arc<T>,
    dirs: WorkflowDirs,
    version_registry: Mutex<HashMap<String, Vec<WorkflowVersion>>>,
}

impl<T: WorkflowTransport> WorkflowEngine<T> {
    pub fn new(transport: Arc<T>, dirs: WorkflowDirs) -> Result<Self, CoreError> {
        dirs.ensure_exist()?;
        let version_registry = Self::load_version_registry(&dirs);
        Ok(Self { transport, dirs, version_registry: Mutex::new(version_registry) })
    }

    fn load_version_registry(dirs: &WorkflowDirs) -> HashMap<String, Vec<WorkflowVersion>> {
        let path = dirs.registry_file();
        let Ok(content) = std::fs::read_to_string(&path) else { return HashMap::new() };
        serde_json::from_str(&content).unwrap_or_else(|err| {
            error!(error = %err, "failed to parse version registry, starting empty");
            HashMap::new()
        })
    }

    fn save_version_registry(&self, registry: &HashMap<String, Vec<WorkflowVersion>>) -> Result<(), CoreError> {
        let content = serde_json::to_string_pretty(registry)?;
        std::fs::write(self.dirs.registry_file(), content)?;
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub fn workflows_dir(&self) -> &Path {
        &self.dirs.workflows_dir
    }

    pub async fn list_workflows(
        &self,
        active_only: bool,
        category: Option<WorkflowCategory>,
    ) -> Result<Vec<WorkflowInfo>, CoreError> {
        let data = self.transport.get("/workflows").await?;
        let mut out = Vec::new();
        for w in data.get("data").and_then(|v| v.as_array()).cloned().unwrap_or_default() {
            let active = w.get("active").and_then(|v| v.as_bool()).unwrap_or(false);
            if active_only && !active {
                continue;
            }
            let name = w.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let wf_category = categorize_workflow(&name, "");
            if let Some(cat) = category {
                if wf_category != cat {
                    continue;
                }
            }
            let tags = w
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|t| t.get("name").and_then(|v| v.as_str()).map(str::to_string)).collect())
                .unwrap_or_default();
            out.push(WorkflowInfo {
                id: w.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                name,
                active,
                created_at: parse_or_now(w.get("createdAt")),
                updated_at: parse_or_now(w.get("updatedAt")),
                nodes_count: w.get("nodes").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0),
                tags,
                category: wf_category,
                version: 1,
                description: None,
                checksum: compute_checksum(&w),
                local_file: None,
            });
        }
        Ok(out)
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Value, CoreError> {
        Ok(self.transport.get(&format!("/workflows/{workflow_id}")).await?)
    }

    pub async fn get_workflow_by_name(&self, name: &str) -> Result<Option<Value>, CoreError> {
        let data = self.transport.get("/workflows").await?;
        for w in data.get("data").and_then(|v| v.as_array()).cloned().unwrap_or_default() {
            if w.get("name").and_then(|v| v.as_str()) == Some(name) {
                let id = w.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                return Ok(Some(self.get_workflow(&id).await?));
            }
        }
        Ok(None)
    }

    pub async fn create_workflow(&self, workflow_data: &Value) -> Result<Value, CoreError> {
        let cleaned = clean_workflow_for_api(workflow_data);
        let name = cleaned.get("name").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        let result = self.transport.post("/workflows", cleaned).await?;
        info!(workflow = %name, "created workflow");
        Ok(result)
    }

    pub async fn update_workflow(&self, workflow_id: &str, workflow_data: &Value) -> Result<Value, CoreError> {
        let cleaned = clean_workflow_for_api(workflow_data);
        let result = self.transport.put(&format!("/workflows/{workflow_id}"), cleaned).await?;
        info!(workflow_id, "updated workflow");
        Ok(result)
    }

    pub async fn delete_workflow(&self, workflow_id: &str, archive_first: bool) -> Result<bool, CoreError> {
        if archive_first {
            match self.get_workflow(workflow_id).await {
                Ok(current) => {
                    if let Err(err) = self.archive_workflow(workflow_id, Some(current), "pre-delete backup").await {
                        warn!(workflow_id, error = %err, "could not archive before delete");
                    }
                }
                Err(err) => warn!(workflow_id, error = %err, "could not archive before delete"),
            }
        }
        self.transport.delete(&format!("/workflows/{workflow_id}")).await?;
        info!(workflow_id, "deleted workflow");
        Ok(true)
    }

    pub async fn activate_workflow(&self, workflow_id: &str) -> Result<Value, CoreError> {
        let result = self.transport.post(&format!("/workflows/{workflow_id}/activate"), json!({})).await?;
        info!(workflow_id, "activated workflow");
        Ok(result)
    }

    pub async fn deactivate_workflow(&self, workflow_id: &str) -> Result<Value, CoreError> {
        let result = self.transport.post(&format!("/workflows/{workflow_id}/deactivate"), json!({})).await?;
        info!(workflow_id, "deactivated workflow");
        Ok(result)
    }

    pub async fn archive_workflow(
        &self,
        workflow_id: &str,
        workflow_data: Option<Value>,
        reason: &str,
    ) -> Result<WorkflowVersion, CoreError> {
        let data = match workflow_data {
            Some(d) => d,
            None => self.get_workflow(workflow_id).await?,
        };
        let name = data.get("name").and_then(|v| v.as_str()).unwrap_or("unnamed").to_string();

        let mut registry = self.version_registry.lock().await;
        let versions = registry.entry(workflow_id.to_string()).or_default();
        let version = versions.len() as u32 + 1;
        let timestamp = Utc::now();
        let filename = format!("{}.json", safe_filename(&format!("{name}__v{version}__{}", timestamp.format("%Y%m%d_%H%M%S"))));
        let archive_path = self.dirs.archive_dir.join(filename);
        std::fs::write(&archive_path, serde_json::to_string_pretty(&data)?)?;

        let record = WorkflowVersion {
            workflow_id: workflow_id.to_string(),
            workflow_name: name.clone(),
            version,
            archived_at: timestamp,
            checksum: compute_checksum(&data),
            file_path: archive_path.to_string_lossy().to_string(),
            reason: reason.to_string(),
        };
        versions.push(record.clone());
        self.save_version_registry(&registry)?;
        info!(workflow = %name, version, "archived workflow");
        Ok(record)
    }

    pub async fn restore_workflow(&self, workflow_id: &str, version: Option<u32>) -> Result<Value, CoreError> {
        let target = {
            let registry = self.version_registry.lock().await;
            let versions = registry
                .get(workflow_id)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CoreError::WorkflowEngine(format!("no archived versions for workflow {workflow_id}")))?;
            match version {
                Some(v) => versions
                    .iter()
                    .find(|r| r.version == v)
                    .cloned()
                    .ok_or_else(|| CoreError::WorkflowEngine(format!("version {v} not found")))?,
                None => versions.last().cloned().expect("non-empty checked above"),
            }
        };
        let content = std::fs::read_to_string(&target.file_path)?;
        let workflow_data: Value = serde_json::from_str(&content)?;
        let result = self.update_workflow(workflow_id, &workflow_data).await?;
        info!(workflow = %target.workflow_name, version = target.version, "restored workflow");
        Ok(result)
    }

    pub async fn list_versions(&self, workflow_id: &str) -> Vec<WorkflowVersion> {
        self.version_registry.lock().await.get(workflow_id).cloned().unwrap_or_default()
    }

    pub async fn export_workflow(&self, workflow_id: &str, filepath: Option<PathBuf>) -> Result<PathBuf, CoreError> {
        let workflow = self.get_workflow(workflow_id).await?;
        let path = filepath.unwrap_or_else(|| {
            let name = workflow.get("name").and_then(|v| v.as_str()).unwrap_or("workflow");
            self.dirs.backup_dir.join(format!("{}.json", safe_filename(name)))
        });
        std::fs::write(&path, serde_json::to_string_pretty(&workflow)?)?;
        info!(path = %path.display(), "exported workflow");
        Ok(path)
    }

    pub async fn export_all_workflows(&self, output_dir: Option<PathBuf>) -> Result<Vec<PathBuf>, CoreError> {
        let output_dir = output_dir.unwrap_or_else(|| self.dirs.backup_dir.clone());
        std::fs::create_dir_all(&output_dir)?;
        let mut exported = Vec::new();
        for wf in self.list_workflows(false, None).await? {
            let path = output_dir.join(format!("{}.json", wf.name));
            match self.export_workflow(&wf.id, Some(path)).await {
                Ok(path) => exported.push(path),
                Err(err) => error!(workflow = %wf.name, error = %err, "failed to export workflow"),
            }
        }
        Ok(exported)
    }

    /// Imports a local workflow file; a workflow already present in n8n by
    /// name is left as-is (the instance, not the file, is authoritative)
    /// and only activated if requested and not already active.
    pub async fn import_workflow_from_file(&self, filepath: &Path, activate: bool) -> Result<Value, CoreError> {
        let content = std::fs::read_to_string(filepath)?;
        let workflow_data: Value = serde_json::from_str(&content)?;
        let name = workflow_data.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
        if name.is_empty() {
            warn!(file = %filepath.display(), "skipping: no workflow name");
            return Ok(json!({"skipped": true, "reason": "no name"}));
        }

        let mut result = match self.get_workflow_by_name(&name).await? {
            Some(mut existing) => {
                debug!(workflow = %name, "workflow exists in n8n, skipping create");
                if let Some(obj) = existing.as_object_mut() {
                    obj.insert("skipped".to_string(), json!(true));
                    obj.insert("reason".to_string(), json!("exists"));
                }
                existing
            }
            None => {
                let created = self.create_workflow(&workflow_data).await?;
                info!(workflow = %name, "created workflow");
                created
            }
        };

        if activate {
            let already_active = result.get("active").and_then(|v| v.as_bool()).unwrap_or(false);
            if !already_active {
                if let Some(id) = result.get("id").and_then(|v| v.as_str()).map(str::to_string) {
                    match self.activate_workflow(&id).await {
                        Ok(_) => result["active"] = json!(true),
                        Err(err) => warn!(workflow = %name, error = %err, "could not activate"),
                    }
                }
            }
        }
        Ok(result)
    }

    /// Walks `workflows_dir` for `*.json` files and imports each one,
    /// activating files whose name carries a core prefix. Never returns an
    /// error: every per-file failure is captured in the result instead.
    pub async fn sync_all_local_workflows(&self, activate_core: bool) -> SyncResult {
        let mut result = SyncResult::new();
        if !self.dirs.workflows_dir.exists() {
            warn!(dir = %self.dirs.workflows_dir.display(), "workflows directory not found");
            return result;
        }

        for filepath in find_json_files(&self.dirs.workflows_dir) {
            let filename = filepath.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let is_core = CORE_FILE_PREFIXES.iter().any(|p| filename.starts_with(p));
            let should_activate = activate_core && is_core;

            match self.import_workflow_from_file(&filepath, should_activate).await {
                Ok(imported) => {
                    if imported.get("skipped").and_then(|v| v.as_bool()).unwrap_or(false) {
                        result.skipped.push(filename);
                    } else if imported.get("id").is_some() {
                        result.imported.push(filename.clone());
                        if should_activate && imported.get("active").and_then(|v| v.as_bool()).unwrap_or(false) {
                            result.activated.push(filename);
                        }
                    }
                }
                Err(err) => {
                    error!(file = %filename, error = %err, "failed to import workflow");
                    result.errors.push(SyncError { file: filename, error: err.to_string() });
                }
            }
        }

        info!(
            imported = result.imported.len(),
            skipped = result.skipped.len(),
            activated = result.activated.len(),
            errors = result.errors.len(),
            "sync complete"
        );
        result
    }

    pub async fn get_executions(
        &self,
        workflow_id: Option<&str>,
        limit: u32,
        status: Option<&str>,
    ) -> Result<Vec<Value>, CoreError> {
        let mut query = format!("/executions?limit={limit}");
        if let Some(id) = workflow_id {
            query.push_str(&format!("&workflowId={id}"));
        }
        if let Some(s) = status {
            query.push_str(&format!("&status={s}"));
        }
        let data = self.transport.get(&query).await?;
        Ok(data.get("data").and_then(|v| v.as_array()).cloned().unwrap_or_default())
    }

    pub async fn get_execution_stats(&self, workflow_id: &str) -> Result<ExecutionStats, CoreError> {
        let executions = self.get_executions(Some(workflow_id), 100, None).await?;
        if executions.is_empty() {
            let wf = self.get_workflow(workflow_id).await?;
            return Ok(ExecutionStats {
                workflow_id: workflow_id.to_string(),
                workflow_name: wf.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                total_executions: 0,
                success_count: 0,
                failure_count: 0,
                avg_duration_ms: 0.0,
                last_execution: None,
                last_status: None,
            });
        }
        let success_count =
            executions.iter().filter(|e| e.get("status").and_then(|v| v.as_str()) == Some("success")).count() as u64;
        let failure_count = executions
            .iter()
            .filter(|e| matches!(e.get("status").and_then(|v| v.as_str()), Some("error") | Some("failed")))
            .count() as u64;
        let latest = &executions[0];
        Ok(ExecutionStats {
            workflow_id: workflow_id.to_string(),
            workflow_name: latest.get("workflowName").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            total_executions: executions.len() as u64,
            success_count,
            failure_count,
            avg_duration_ms: 0.0,
            last_execution: latest.get("startedAt").and_then(|v| v.as_str()).and_then(parse_started_at),
            last_status: latest.get("status").and_then(|v| v.as_str()).map(str::to_string),
        })
    }

    pub async fn get_failed_executions(&self, hours: i64) -> Result<Vec<Value>, CoreError> {
        let all = self.get_executions(None, 200, None).await?;
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        Ok(all
            .into_iter()
            .filter(|e| {
                let failed = matches!(e.get("status").and_then(|v| v.as_str()), Some("error") | Some("failed"));
                failed
                    && e.get("startedAt")
                        .and_then(|v| v.as_str())
                        .and_then(parse_started_at)
                        .map(|dt| dt > cutoff)
                        .unwrap_or(false)
            })
            .collect())
    }

    pub async fn clone_workflow(&self, workflow_id: &str, new_name: &str) -> Result<Value, CoreError> {
        let mut original = self.get_workflow(workflow_id).await?;
        original["name"] = json!(new_name);
        self.create_workflow(&original).await
    }

    pub async fn get_workflow_stats(&self) -> Result<Value, CoreError> {
        let workflows = self.list_workflows(false, None).await?;
        let mut by_category: HashMap<&'static str, (u64, u64)> = HashMap::new();
        for wf in &workflows {
            let entry = by_category.entry(wf.category.as_str()).or_insert((0, 0));
            entry.0 += 1;
            if wf.active {
                entry.1 += 1;
            }
        }
        let by_category_json: serde_json::Map<String, Value> = by_category
            .into_iter()
            .map(|(cat, (total, active))| (cat.to_string(), json!({"total": total, "active": active})))
            .collect();
        Ok(json!({
            "total": workflows.len(),
            "active": workflows.iter().filter(|w| w.active).count(),
            "inactive": workflows.iter().filter(|w| !w.active).count(),
            "by_category": by_category_json,
            "timestamp": Utc::now(),
        }))
    }

    /// Never fails: a failed probe is reported as an `unhealthy` payload
    /// rather than propagated, matching the original monitor's contract.
    pub async fn health_check(&self) -> Value {
        match self.list_workflows(false, None).await {
            Ok(workflows) => {
                let recent_failures = self.get_failed_executions(1).await.unwrap_or_default();
                json!({
                    "status": "healthy",
                    "connected": true,
                    "base_url": self.base_url(),
                    "workflow_count": workflows.len(),
                    "active_count": workflows.iter().filter(|w| w.active).count(),
                    "recent_failures": recent_failures.len(),
                    "timestamp": Utc::now(),
                })
            }
            Err(err) => json!({
                "status": "unhealthy",
                "connected": false,
                "base_url": self.base_url(),
                "error": err.to_string(),
                "timestamp": Utc::now(),
            }),
        }
    }
}

fn parse_started_at(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00")).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindex_contracts::MockWorkflowTransport;
    use tempfile::tempdir;

    fn engine_with(mock: MockWorkflowTransport, dir: &tempfile::TempDir) -> WorkflowEngine<MockWorkflowTransport> {
        WorkflowEngine::new(Arc::new(mock), WorkflowDirs::under(dir.path())).unwrap()
    }

    #[test]
    fn clean_workflow_for_api_injects_defaults() {
        let cleaned = clean_workflow_for_api(&json!({"name": "", "extra": "drop me"}));
        assert_eq!(cleaned["name"], "Unnamed Workflow");
        assert_eq!(cleaned["nodes"], json!([]));
        assert!(cleaned.get("extra").is_none());
    }

    #[test]
    fn categorize_workflow_matches_prefix_rules() {
        assert_eq!(categorize_workflow("01_startup", ""), WorkflowCategory::Core);
        assert_eq!(categorize_workflow("myca-ops", ""), WorkflowCategory::Core);
        assert_eq!(categorize_workflow("speech-to-text", ""), WorkflowCategory::Speech);
        assert_eq!(categorize_workflow("whatever", ""), WorkflowCategory::Custom);
    }

    #[tokio::test]
    async fn import_workflow_from_file_skips_unnamed() {
        let dir = tempdir().unwrap();
        let mock = MockWorkflowTransport::new();
        let engine = engine_with(mock, &dir);
        let path = dir.path().join("no_name.json");
        std::fs::write(&path, r#"{"nodes": []}"#).unwrap();
        let result = engine.import_workflow_from_file(&path, false).await.unwrap();
        assert_eq!(result["skipped"], true);
    }

    #[tokio::test]
    async fn sync_all_local_workflows_activates_core_files() {
        let dir = tempdir().unwrap();
        let mut mock = MockWorkflowTransport::new();
        mock.expect_base_url().return_const("http://n8n.local".to_string());
        mock.expect_get().returning(|_| Box::pin(async { Ok(json!({"data": []})) }));
        mock.expect_post()
            .returning(|_, body| Box::pin(async move { Ok(json!({"id": "wf-1", "name": body["name"], "active": true})) }));

        let engine = engine_with(mock, &dir);
        std::fs::write(engine.dirs.workflows_dir.join("01_core.json"), r#"{"name": "core-flow", "nodes": []}"#).unwrap();
        std::fs::write(engine.dirs.workflows_dir.join("custom.json"), r#"{"name": "custom-flow", "nodes": []}"#).unwrap();

        let result = engine.sync_all_local_workflows(true).await;
        assert_eq!(result.imported.len(), 2);
        assert_eq!(result.activated, vec!["01_core.json".to_string()]);
    }

    #[tokio::test]
    async fn sync_all_local_workflows_reports_existing_workflow_as_skipped() {
        let dir = tempdir().unwrap();
        let mut mock = MockWorkflowTransport::new();
        mock.expect_base_url().return_const("http://n8n.local".to_string());
        mock.expect_get().returning(|path| {
            let path = path.to_string();
            Box::pin(async move {
                if path == "/workflows" {
                    Ok(json!({"data": [{"id": "wf-1", "name": "existing-flow", "active": true}]}))
                } else {
                    Ok(json!({"id": "wf-1", "name": "existing-flow", "active": true, "nodes": []}))
                }
            })
        });

        let engine = engine_with(mock, &dir);
        std::fs::write(engine.dirs.workflows_dir.join("existing.json"), r#"{"name": "existing-flow", "nodes": []}"#).unwrap();

        let result = engine.sync_all_local_workflows(false).await;
        assert_eq!(result.imported.len(), 0);
        assert_eq!(result.skipped, vec!["existing.json".to_string()]);

        // Running sync again against the same, unchanged directory must keep
        // reporting the workflow as skipped rather than freshly imported.
        let second = engine.sync_all_local_workflows(false).await;
        assert_eq!(second.imported.len(), 0);
        assert_eq!(second.skipped, vec!["existing.json".to_string()]);
    }

    #[tokio::test]
    async fn archive_then_restore_round_trips_workflow_data() {
        let dir = tempdir().unwrap();
        let mut mock = MockWorkflowTransport::new();
        mock.expect_put().returning(|_, body| Box::pin(async move { Ok(body) }));
        let engine = engine_with(mock, &dir);

        let data = json!({"name": "restorable", "nodes": [], "connections": {}, "settings": {}});
        let record = engine.archive_workflow("wf-1", Some(data), "manual").await.unwrap();
        assert_eq!(record.version, 1);

        let restored = engine.restore_workflow("wf-1", None).await.unwrap();
        assert_eq!(restored["name"], "restorable");
    }

    #[tokio::test]
    async fn restore_workflow_with_no_versions_errors() {
        let dir = tempdir().unwrap();
        let mock = MockWorkflowTransport::new();
        let engine = engine_with(mock, &dir);
        assert!(engine.restore_workflow("missing", None).await.is_err());
    }
}
