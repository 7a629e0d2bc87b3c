//! Route composition: REST under `/api/v1`, the six WebSocket stream
//! routers at their fixed paths, and `/health`, grounded on the teacher's
//! `routes::create_api_router` / `Router::new().nest(...)` shape.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::handlers::{health, ingestion, workflows};
use crate::streams::{crep, devices, entity, scientific, security, topology};

fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(workflows::list).post(workflows::create))
        .route("/stats", get(workflows::stats))
        .route("/health", get(workflows::health))
        .route("/monitor-status", get(workflows::monitor_status))
        .route("/sync", post(workflows::sync))
        .route("/export", post(workflows::export_all))
        .route("/import", post(workflows::import))
        .route("/executions", get(workflows::executions))
        .route("/{workflow_id}", get(workflows::get).put(workflows::update).delete(workflows::delete))
        .route("/{workflow_id}/activate", post(workflows::activate))
        .route("/{workflow_id}/deactivate", post(workflows::deactivate))
        .route("/{workflow_id}/archive", post(workflows::archive))
        .route("/{workflow_id}/restore", post(workflows::restore))
        .route("/{workflow_id}/versions", get(workflows::versions))
        .route("/{workflow_id}/export", post(workflows::export))
        .route("/{workflow_id}/clone", post(workflows::clone_workflow))
        .route("/{workflow_id}/executions/stats", get(workflows::execution_stats))
}

fn ingestion_routes() -> Router<AppState> {
    Router::new()
        .route("/collectors", get(ingestion::collectors))
        .route("/collectors/{name}/trigger", post(ingestion::trigger_fetch))
        .route("/collectors/{name}/circuit", get(ingestion::circuit_state))
        .route("/audit-log", get(ingestion::audit_log))
}

fn api_router() -> Router<AppState> {
    Router::new().nest("/workflows", workflow_routes()).nest("/ingestion", ingestion_routes())
}

fn stream_router() -> Router<AppState> {
    Router::new()
        .route("/ws/topology", get(topology::handler))
        .route("/ws/topology/status", get(topology::status))
        .route("/ws/devices/{device_id}", get(devices::handler))
        .route("/ws/devices/status", get(devices::status))
        .route("/api/crep/stream", get(crep::handler))
        .route("/api/crep/status", get(crep::status))
        .route("/api/stream/scientific/live", get(scientific::handler))
        .route("/api/stream/scientific/status", get(scientific::status))
        .route("/ws/security/stream", get(security::handler))
        .route("/ws/security/status", get(security::status))
        .route("/api/entities/stream", get(entity::handler))
        .route("/api/entities/status", get(entity::status))
}

pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api_router())
        .merge(stream_router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
