//! `/health`: always 200, with a `status`/`issues` pair describing any
//! degraded component rather than surfacing a 5xx — per spec.md §7.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app_state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let mut issues = Vec::new();

    if !state.pubsub.is_connected() {
        issues.push(json!({"component": "pubsub", "reason": "not connected to redis"}));
    }

    let local_health = state.workflows.health_check().await;
    if local_health.get("status").and_then(Value::as_str) != Some("healthy") {
        issues.push(json!({"component": "workflows_local", "reason": local_health}));
    }

    let cloud_health = state.workflows_cloud.health_check().await;
    if cloud_health.get("status").and_then(Value::as_str) != Some("healthy") {
        issues.push(json!({"component": "workflows_cloud", "reason": cloud_health}));
    }

    let monitor_status = state.workflow_monitor.status();
    if !monitor_status.running {
        issues.push(json!({"component": "workflow_auto_monitor", "reason": "not running"}));
    }

    let status = if issues.is_empty() { "healthy" } else { "degraded" };
    Json(json!({
        "status": status,
        "issues": issues,
        "collectors": state.orchestrator.collector_names(),
        "pubsub_stats": state.pubsub.stats(),
        "workflow_auto_monitor": {
            "running": monitor_status.running,
            "last_health": monitor_status.last_health,
            "last_drift_run": monitor_status.last_drift_run,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
