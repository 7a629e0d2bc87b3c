//! 24/7 dual-instance (local/cloud) health and drift monitor, grounded on
//! `WorkflowAutoMonitor`: health probes both n8n instances independently,
//! drift detection compares repo/local/cloud checksums and re-syncs both on
//! a mismatch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use mindex_contracts::WorkflowTransport;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::engine::WorkflowEngine;

const HEALTH_INTERVAL_SECONDS: u64 = 60;
const DRIFT_INTERVAL_SECONDS: u64 = 15 * 60;

fn checksum(data: &Value) -> String {
    let mut hasher = Md5::new();
    hasher.update(canonical_json(data).as_bytes());
    format!("{:x}", hasher.finalize())
}

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
        Value::Array(items) => format!("[{}]", items.iter().map(canonical_json).collect::<Vec<_>>().join(",")),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Walks `workflows_dir` and checksums each file's parsed JSON, keyed by
/// its declared `name` (falling back to the file stem).
fn repo_checksums(workflows_dir: &Path) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if !workflows_dir.exists() {
        return out;
    }
    let mut stack = vec![workflows_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            match std::fs::read_to_string(&path).ok().and_then(|s| serde_json::from_str::<Value>(&s).ok()) {
                Some(data) => {
                    let name = data
                        .get("name")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default());
                    out.insert(name, checksum(&data));
                }
                None => warn!(file = %path.display(), "could not checksum workflow file"),
            }
        }
    }
    out
}

async fn instance_checksums<T: WorkflowTransport>(engine: &WorkflowEngine<T>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let workflows = match engine.list_workflows(false, None).await {
        Ok(w) => w,
        Err(err) => {
            warn!(error = %err, "instance checksums failed");
            return out;
        }
    };
    for w in workflows {
        match engine.get_workflow(&w.id).await {
            Ok(wf) => {
                let name = wf.get("name").and_then(|v| v.as_str()).unwrap_or(&w.name).to_string();
                out.insert(name, checksum(&wf));
            }
            Err(err) => warn!(workflow = %w.name, error = %err, "could not get workflow"),
        }
    }
    out
}

/// True if any repo workflow's checksum disagrees with local or cloud, or
/// if local/cloud carry a non-empty workflow absent from the repo.
fn drift_detected(repo: &HashMap<String, String>, local: &HashMap<String, String>, cloud: &HashMap<String, String>) -> bool {
    for (name, csum) in repo {
        if local.get(name) != Some(csum) || cloud.get(name) != Some(csum) {
            return true;
        }
    }
    local.keys().chain(cloud.keys()).any(|name| !repo.contains_key(name) && (local.contains_key(name) || cloud.contains_key(name)))
}

#[derive(Debug, Clone, Default)]
pub struct AutoMonitorStatus {
    pub running: bool,
    pub last_health: Option<Value>,
    pub last_drift_run: Option<DateTime<Utc>>,
}

type FailureHook = Arc<dyn Fn(String, Value) + Send + Sync>;

/// Drives two [`WorkflowEngine`] instances (local and cloud) through
/// independent health and drift loops. `T` is shared by both instances
/// because they only differ in base URL/API key, not transport type.
pub struct WorkflowAutoMonitor<T: WorkflowTransport + 'static> {
    local: Arc<WorkflowEngine<T>>,
    cloud: Arc<WorkflowEngine<T>>,
    health_interval: Duration,
    drift_interval: Duration,
    on_failure: Option<FailureHook>,
    status: StdMutex<AutoMonitorStatus>,
    tasks: Mutex<Vec<(CancellationToken, JoinHandle<()>)>>,
}

impl<T: WorkflowTransport + 'static> WorkflowAutoMonitor<T> {
    pub fn new(local: Arc<WorkflowEngine<T>>, cloud: Arc<WorkflowEngine<T>>) -> Self {
        Self {
            local,
            cloud,
            health_interval: Duration::from_secs(HEALTH_INTERVAL_SECONDS),
            drift_interval: Duration::from_secs(DRIFT_INTERVAL_SECONDS),
            on_failure: None,
            status: StdMutex::new(AutoMonitorStatus::default()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_intervals(mut self, health: Duration, drift: Duration) -> Self {
        self.health_interval = health;
        self.drift_interval = drift;
        self
    }

    pub fn with_on_failure(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    pub fn status(&self) -> AutoMonitorStatus {
        self.status.lock().unwrap().clone()
    }

    fn emit_failure(&self, message: &str, context: Value) {
        warn!(reason = message, %context, "workflow auto-monitor failure");
        if let Some(hook) = &self.on_failure {
            hook(message.to_string(), context);
        }
    }

    pub async fn start(self: &Arc<Self>) {
        self.status.lock().unwrap().running = true;
        let mut tasks = self.tasks.lock().await;
        tasks.push(self.spawn_health_loop());
        tasks.push(self.spawn_drift_loop());
        info!(health_secs = self.health_interval.as_secs(), drift_secs = self.drift_interval.as_secs(), "workflow auto-monitor started");
    }

    pub async fn stop(&self) {
        self.status.lock().unwrap().running = false;
        let mut tasks = self.tasks.lock().await;
        for (token, _) in tasks.iter() {
            token.cancel();
        }
        for (_, handle) in tasks.drain(..) {
            let _ = handle.await;
        }
        info!("workflow auto-monitor stopped");
    }

    fn spawn_health_loop(self: &Arc<Self>) -> (CancellationToken, JoinHandle<()>) {
        let token = CancellationToken::new();
        let stop = token.clone();
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let local_health = monitor.local.health_check().await;
                if local_health.get("status").and_then(|v| v.as_str()) != Some("healthy") {
                    monitor.emit_failure("local n8n health check failed", local_health.clone());
                }
                let cloud_health = monitor.cloud.health_check().await;
                if cloud_health.get("status").and_then(|v| v.as_str()) != Some("healthy") {
                    monitor.emit_failure("cloud n8n health check failed", cloud_health.clone());
                }
                monitor.status.lock().unwrap().last_health = Some(json!({"local": local_health, "cloud": cloud_health}));

                tokio::select! {
                    _ = tokio::time::sleep(monitor.health_interval) => {}
                    _ = stop.cancelled() => return,
                }
            }
        });
        (token, handle)
    }

    fn spawn_drift_loop(self: &Arc<Self>) -> (CancellationToken, JoinHandle<()>) {
        let token = CancellationToken::new();
        let stop = token.clone();
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let repo = repo_checksums(monitor.local.workflows_dir());
                let local_csums = instance_checksums(&*monitor.local).await;
                let cloud_csums = instance_checksums(&*monitor.cloud).await;

                if drift_detected(&repo, &local_csums, &cloud_csums) {
                    info!("workflow drift detected, running sync on both instances");
                    let r_local = monitor.local.sync_all_local_workflows(true).await;
                    let r_cloud = monitor.cloud.sync_all_local_workflows(true).await;
                    info!(local_imported = r_local.imported.len(), cloud_imported = r_cloud.imported.len(), "auto-sync after drift complete");
                    if !r_local.errors.is_empty() || !r_cloud.errors.is_empty() {
                        monitor.emit_failure(
                            "auto-sync after drift reported errors",
                            json!({"local_errors": r_local.errors, "cloud_errors": r_cloud.errors}),
                        );
                    }
                }
                monitor.status.lock().unwrap().last_drift_run = Some(Utc::now());

                tokio::select! {
                    _ = tokio::time::sleep(monitor.drift_interval) => {}
                    _ = stop.cancelled() => return,
                }
            }
        });
        (token, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::engine::WorkflowDirs;
    use mindex_contracts::MockWorkflowTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[test]
    fn drift_detected_flags_checksum_mismatch() {
        let repo = HashMap::from([("a".to_string(), "x".to_string())]);
        let local = HashMap::from([("a".to_string(), "y".to_string())]);
        let cloud = HashMap::from([("a".to_string(), "x".to_string())]);
        assert!(drift_detected(&repo, &local, &cloud));
    }

    #[test]
    fn drift_not_detected_when_all_match() {
        let repo = HashMap::from([("a".to_string(), "x".to_string())]);
        let local = repo.clone();
        let cloud = repo.clone();
        assert!(!drift_detected(&repo, &local, &cloud));
    }

    #[test]
    fn drift_detected_for_extra_instance_workflow() {
        let repo = HashMap::new();
        let local = HashMap::from([("orphan".to_string(), "z".to_string())]);
        let cloud = HashMap::new();
        assert!(drift_detected(&repo, &local, &cloud));
    }

    #[tokio::test]
    async fn health_loop_reports_failure_for_unreachable_instance() {
        let dir = tempdir().unwrap();
        let mut failing = MockWorkflowTransport::new();
        failing.expect_base_url().return_const("http://local.invalid".to_string());
        failing
            .expect_get()
            .returning(|_| Box::pin(async { Err(mindex_contracts::WorkflowTransportError::Transport("down".into())) }));
        let mut healthy = MockWorkflowTransport::new();
        healthy.expect_base_url().return_const("http://cloud.invalid".to_string());
        healthy.expect_get().returning(|_| Box::pin(async { Ok(json!({"data": []})) }));

        let local = Arc::new(WorkflowEngine::new(Arc::new(failing), WorkflowDirs::under(dir.path())).unwrap());
        let cloud = Arc::new(WorkflowEngine::new(Arc::new(healthy), WorkflowDirs::under(dir.path())).unwrap());

        let failures = Arc::new(AtomicUsize::new(0));
        let counted = failures.clone();
        let monitor = Arc::new(
            WorkflowAutoMonitor::new(local, cloud)
                .with_intervals(Duration::from_millis(20), Duration::from_secs(3600))
                .with_on_failure(Arc::new(move |_msg, _ctx| {
                    counted.fetch_add(1, Ordering::SeqCst);
                })),
        );
        monitor.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop().await;
        assert!(failures.load(Ordering::SeqCst) >= 1);
    }
}
