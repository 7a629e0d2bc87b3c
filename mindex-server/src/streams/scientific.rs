//! `/api/stream/scientific/live`: unfiltered mirror of `experiments:data`.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use mindex_core::{PubSubHub, RedisTransport};
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::streams::common::{run_socket, status_envelope, text_envelope, StreamManager};

pub type ScientificManager = StreamManager<()>;

pub fn build(hub: Arc<PubSubHub<RedisTransport>>) -> Arc<ScientificManager> {
    StreamManager::new(hub, vec!["experiments:data"], Arc::new(|_msg, _filter| true), Arc::new(text_envelope))
}

pub async fn handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let manager = state.streams.scientific.clone();
    ws.on_upgrade(move |socket| async move {
        run_socket(
            manager,
            socket,
            "/api/stream/scientific/live",
            (),
            json!({}),
            Arc::new(|_, _| ((), json!({"type": "filter_updated"}))),
        )
        .await
    })
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let manager = &state.streams.scientific;
    Json(status_envelope(manager.active_connections(), manager.subscription_active(), manager.channel_names()))
}
