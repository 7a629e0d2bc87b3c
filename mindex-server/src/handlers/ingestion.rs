//! REST handlers wrapping [`mindex_core::IngestionOrchestrator`]: manual
//! fetch trigger, audit log query, and circuit breaker state, mounted
//! under `/api/v1/ingestion`.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::errors::{AppError, AppResult};

pub async fn collectors(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"data": state.orchestrator.collector_names()}))
}

pub async fn trigger_fetch(State(state): State<AppState>, Path(name): Path<String>) -> AppResult<Json<Value>> {
    let events = state.orchestrator.trigger_fetch(&name).await.map_err(AppError::bad_request)?;
    Ok(Json(json!({"collector": name, "events": events})))
}

#[derive(Deserialize)]
pub struct AuditQuery {
    pub collector: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

pub async fn audit_log(State(state): State<AppState>, Query(query): Query<AuditQuery>) -> Json<Value> {
    let entries = state.orchestrator.get_audit_log(query.collector.as_deref(), query.since, query.limit.unwrap_or(100));
    Json(json!({"data": entries}))
}

pub async fn circuit_state(State(state): State<AppState>, Path(name): Path<String>) -> AppResult<Json<Value>> {
    let state_value = state.orchestrator.circuit_state(&name).ok_or_else(|| AppError::not_found(format!("unknown collector: {name}")))?;
    Ok(Json(json!({"collector": name, "state": format!("{state_value:?}")})))
}
