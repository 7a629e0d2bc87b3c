//! REST handlers wrapping [`mindex_core::WorkflowEngine`]: CRUD, lifecycle,
//! archive/restore, export/import, sync, and execution stats, mounted
//! under `/api/v1/workflows`. Query param `?instance=cloud` selects the
//! cloud n8n engine; everything else talks to the local one.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use mindex_core::{HttpWorkflowTransport, WorkflowEngine};
use mindex_model::WorkflowCategory;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::errors::{AppError, AppResult};

fn engine(state: &AppState, instance: Option<&str>) -> Arc<WorkflowEngine<HttpWorkflowTransport>> {
    match instance {
        Some("cloud") => state.workflows_cloud.clone(),
        _ => state.workflows.clone(),
    }
}

fn parse_category(raw: &str) -> Option<WorkflowCategory> {
    WorkflowCategory::all().into_iter().find(|c| c.as_str() == raw)
}

#[derive(Deserialize)]
pub struct InstanceQuery {
    pub instance: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub instance: Option<String>,
    pub active_only: Option<bool>,
    pub category: Option<String>,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> AppResult<Json<Value>> {
    let category = query.category.as_deref().and_then(parse_category);
    let workflows = engine(&state, query.instance.as_deref())
        .list_workflows(query.active_only.unwrap_or(false), category)
        .await?;
    Ok(Json(json!({"data": workflows})))
}

pub async fn get(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<InstanceQuery>,
) -> AppResult<Json<Value>> {
    let workflow = engine(&state, query.instance.as_deref()).get_workflow(&workflow_id).await?;
    Ok(Json(workflow))
}

pub async fn create(
    State(state): State<AppState>,
    Query(query): Query<InstanceQuery>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let created = engine(&state, query.instance.as_deref()).create_workflow(&body).await?;
    Ok(Json(created))
}

pub async fn update(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<InstanceQuery>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let updated = engine(&state, query.instance.as_deref()).update_workflow(&workflow_id, &body).await?;
    Ok(Json(updated))
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub instance: Option<String>,
    pub archive_first: Option<bool>,
}

pub async fn delete(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> AppResult<Json<Value>> {
    let deleted =
        engine(&state, query.instance.as_deref()).delete_workflow(&workflow_id, query.archive_first.unwrap_or(true)).await?;
    Ok(Json(json!({"deleted": deleted})))
}

pub async fn activate(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<InstanceQuery>,
) -> AppResult<Json<Value>> {
    let workflow = engine(&state, query.instance.as_deref()).activate_workflow(&workflow_id).await?;
    Ok(Json(workflow))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<InstanceQuery>,
) -> AppResult<Json<Value>> {
    let workflow = engine(&state, query.instance.as_deref()).deactivate_workflow(&workflow_id).await?;
    Ok(Json(workflow))
}

#[derive(Deserialize)]
pub struct ArchiveBody {
    pub reason: Option<String>,
}

pub async fn archive(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<InstanceQuery>,
    Json(body): Json<ArchiveBody>,
) -> AppResult<Json<Value>> {
    let version = engine(&state, query.instance.as_deref())
        .archive_workflow(&workflow_id, None, body.reason.as_deref().unwrap_or("manual"))
        .await?;
    Ok(Json(json!(version)))
}

#[derive(Deserialize)]
pub struct RestoreQuery {
    pub instance: Option<String>,
    pub version: Option<u32>,
}

pub async fn restore(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<RestoreQuery>,
) -> AppResult<Json<Value>> {
    let restored = engine(&state, query.instance.as_deref()).restore_workflow(&workflow_id, query.version).await?;
    Ok(Json(restored))
}

pub async fn versions(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<InstanceQuery>,
) -> Json<Value> {
    let versions = engine(&state, query.instance.as_deref()).list_versions(&workflow_id).await;
    Json(json!({"data": versions}))
}

pub async fn export(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<InstanceQuery>,
) -> AppResult<Json<Value>> {
    let path = engine(&state, query.instance.as_deref()).export_workflow(&workflow_id, None).await?;
    Ok(Json(json!({"path": path})))
}

pub async fn export_all(State(state): State<AppState>, Query(query): Query<InstanceQuery>) -> AppResult<Json<Value>> {
    let paths = engine(&state, query.instance.as_deref()).export_all_workflows(None).await?;
    Ok(Json(json!({"exported": paths})))
}

#[derive(Deserialize)]
pub struct ImportBody {
    pub path: PathBuf,
    pub activate: Option<bool>,
}

pub async fn import(
    State(state): State<AppState>,
    Query(query): Query<InstanceQuery>,
    Json(body): Json<ImportBody>,
) -> AppResult<Json<Value>> {
    let imported =
        engine(&state, query.instance.as_deref()).import_workflow_from_file(&body.path, body.activate.unwrap_or(false)).await?;
    Ok(Json(imported))
}

#[derive(Deserialize)]
pub struct SyncQuery {
    pub instance: Option<String>,
    pub activate_core: Option<bool>,
}

pub async fn sync(State(state): State<AppState>, Query(query): Query<SyncQuery>) -> Json<Value> {
    let result = engine(&state, query.instance.as_deref()).sync_all_local_workflows(query.activate_core.unwrap_or(true)).await;
    Json(json!(result))
}

#[derive(Deserialize)]
pub struct ExecutionsQuery {
    pub instance: Option<String>,
    pub workflow_id: Option<String>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

pub async fn executions(State(state): State<AppState>, Query(query): Query<ExecutionsQuery>) -> AppResult<Json<Value>> {
    let executions = engine(&state, query.instance.as_deref())
        .get_executions(query.workflow_id.as_deref(), query.limit.unwrap_or(50), query.status.as_deref())
        .await?;
    Ok(Json(json!({"data": executions})))
}

pub async fn execution_stats(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<InstanceQuery>,
) -> AppResult<Json<Value>> {
    let stats = engine(&state, query.instance.as_deref()).get_execution_stats(&workflow_id).await?;
    Ok(Json(json!(stats)))
}

#[derive(Deserialize)]
pub struct CloneBody {
    pub new_name: String,
}

pub async fn clone_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<InstanceQuery>,
    Json(body): Json<CloneBody>,
) -> AppResult<Json<Value>> {
    if body.new_name.trim().is_empty() {
        return Err(AppError::bad_request("new_name must not be empty"));
    }
    let cloned = engine(&state, query.instance.as_deref()).clone_workflow(&workflow_id, &body.new_name).await?;
    Ok(Json(cloned))
}

pub async fn stats(State(state): State<AppState>, Query(query): Query<InstanceQuery>) -> AppResult<Json<Value>> {
    let stats = engine(&state, query.instance.as_deref()).get_workflow_stats().await?;
    Ok(Json(stats))
}

pub async fn health(State(state): State<AppState>, Query(query): Query<InstanceQuery>) -> Json<Value> {
    let health = engine(&state, query.instance.as_deref()).health_check().await;
    Json(health)
}

pub async fn monitor_status(State(state): State<AppState>) -> Json<Value> {
    let status = state.workflow_monitor.status();
    Json(json!({
        "running": status.running,
        "last_health": status.last_health,
        "last_drift_run": status.last_drift_run,
    }))
}
