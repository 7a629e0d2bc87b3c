//! Runs [`WorkflowEngine`] on a cadence: periodic sync, health, and archive
//! loops plus an event-callback registry, grounded on `WorkflowScheduler`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use mindex_contracts::WorkflowTransport;
use mindex_model::SyncResult;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::engine::WorkflowEngine;

const SYNC_INTERVAL_MINUTES: u64 = 15;
const HEALTH_INTERVAL_MINUTES: u64 = 5;
const ARCHIVE_INTERVAL_HOURS: u64 = 24;

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    SyncComplete(SyncResult),
    WorkflowFailed(Value),
    HealthCheck(Value),
}

impl WorkflowEvent {
    fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::SyncComplete(_) => "sync_complete",
            WorkflowEvent::WorkflowFailed(_) => "workflow_failed",
            WorkflowEvent::HealthCheck(_) => "health_check",
        }
    }
}

/// A registered handler. Handlers return `Result` so a failure can be
/// logged without unwinding the loop that invoked it — the Rust stand-in
/// for the original's "never let a callback exception kill the scheduler".
pub type WorkflowCallback = Arc<dyn Fn(WorkflowEvent) -> anyhow::Result<()> + Send + Sync>;

pub struct WorkflowScheduler<T: WorkflowTransport + 'static> {
    engine: Arc<WorkflowEngine<T>>,
    callbacks: StdMutex<HashMap<&'static str, Vec<WorkflowCallback>>>,
    tasks: Mutex<Vec<(CancellationToken, JoinHandle<()>)>>,
}

impl<T: WorkflowTransport + 'static> WorkflowScheduler<T> {
    pub fn new(engine: Arc<WorkflowEngine<T>>) -> Self {
        Self { engine, callbacks: StdMutex::new(HashMap::new()), tasks: Mutex::new(Vec::new()) }
    }

    pub fn on(&self, event_name: &'static str, callback: WorkflowCallback) {
        self.callbacks.lock().unwrap().entry(event_name).or_default().push(callback);
    }

    async fn emit(&self, event: WorkflowEvent) {
        let callbacks = {
            let guard = self.callbacks.lock().unwrap();
            guard.get(event.name()).cloned().unwrap_or_default()
        };
        for callback in callbacks {
            if let Err(err) = callback(event.clone()) {
                error!(event = event.name(), error = %err, "workflow scheduler callback error");
            }
        }
    }

    /// Runs an initial sync, then spawns the sync/health/archive loops.
    /// Takes `Arc<Self>` because each loop holds a clone of it across
    /// `.await` points.
    pub async fn start(
        self: &Arc<Self>,
        sync_interval_minutes: u64,
        health_interval_minutes: u64,
        archive_interval_hours: u64,
    ) {
        info!("starting workflow scheduler");
        let initial = self.engine.sync_all_local_workflows(true).await;
        info!(imported = initial.imported.len(), errors = initial.errors.len(), "initial sync complete");

        let mut tasks = self.tasks.lock().await;
        tasks.push(self.spawn_sync_loop(sync_interval_minutes));
        tasks.push(self.spawn_health_loop(health_interval_minutes));
        tasks.push(self.spawn_archive_loop(archive_interval_hours));
        info!("workflow scheduler started");
    }

    pub async fn start_default(self: &Arc<Self>) {
        self.start(SYNC_INTERVAL_MINUTES, HEALTH_INTERVAL_MINUTES, ARCHIVE_INTERVAL_HOURS).await;
    }

    pub async fn stop(&self) {
        info!("stopping workflow scheduler");
        let mut tasks = self.tasks.lock().await;
        for (token, _) in tasks.iter() {
            token.cancel();
        }
        for (_, handle) in tasks.drain(..) {
            let _ = handle.await;
        }
        info!("workflow scheduler stopped");
    }

    fn spawn_sync_loop(self: &Arc<Self>, interval_minutes: u64) -> (CancellationToken, JoinHandle<()>) {
        let token = CancellationToken::new();
        let stop = token.clone();
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                info!("running scheduled workflow sync");
                let result = scheduler.engine.sync_all_local_workflows(true).await;
                scheduler.emit(WorkflowEvent::SyncComplete(result)).await;
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(interval_minutes * 60)) => {}
                    _ = stop.cancelled() => return,
                }
            }
        });
        (token, handle)
    }

    fn spawn_health_loop(self: &Arc<Self>, interval_minutes: u64) -> (CancellationToken, JoinHandle<()>) {
        let token = CancellationToken::new();
        let stop = token.clone();
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let health = scheduler.engine.health_check().await;
                let recent_failures = health.get("recent_failures").and_then(|v| v.as_u64()).unwrap_or(0);
                scheduler.emit(WorkflowEvent::HealthCheck(health)).await;
                if recent_failures > 0 {
                    match scheduler.engine.get_failed_executions(1).await {
                        Ok(failures) => {
                            for failure in failures {
                                scheduler.emit(WorkflowEvent::WorkflowFailed(failure)).await;
                            }
                        }
                        Err(err) => error!(error = %err, "could not fetch failed executions"),
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(interval_minutes * 60)) => {}
                    _ = stop.cancelled() => return,
                }
            }
        });
        (token, handle)
    }

    fn spawn_archive_loop(self: &Arc<Self>, interval_hours: u64) -> (CancellationToken, JoinHandle<()>) {
        let token = CancellationToken::new();
        let stop = token.clone();
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                info!("running scheduled workflow archive");
                match scheduler.engine.list_workflows(false, None).await {
                    Ok(workflows) => {
                        for wf in workflows {
                            if let Err(err) = scheduler.engine.archive_workflow(&wf.id, None, "scheduled backup").await {
                                error!(workflow = %wf.name, error = %err, "archive failed");
                            }
                        }
                    }
                    Err(err) => error!(error = %err, "archive loop could not list workflows"),
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(interval_hours * 3600)) => {}
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
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[tokio::test]
    async fn start_runs_initial_sync_and_emits_event() {
        let dir = tempdir().unwrap();
        let mut mock = MockWorkflowTransport::new();
        mock.expect_base_url().return_const("http://n8n.local".to_string());
        mock.expect_get().returning(|_| Box::pin(async { Ok(json!({"data": []})) }));
        let engine = Arc::new(WorkflowEngine::new(Arc::new(mock), WorkflowDirs::under(dir.path())).unwrap());
        let scheduler = Arc::new(WorkflowScheduler::new(engine));

        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        scheduler.on(
            "sync_complete",
            Arc::new(move |_event| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        scheduler.start(60, 60, 24).await;
        scheduler.stop().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_error_does_not_panic_emit() {
        let dir = tempdir().unwrap();
        let mock = MockWorkflowTransport::new();
        let engine = Arc::new(WorkflowEngine::new(Arc::new(mock), WorkflowDirs::under(dir.path())).unwrap());
        let scheduler = WorkflowScheduler::new(engine);
        scheduler.on("sync_complete", Arc::new(|_| anyhow::bail!("boom")));
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(scheduler.emit(WorkflowEvent::SyncComplete(SyncResult::new())));
    }
}
