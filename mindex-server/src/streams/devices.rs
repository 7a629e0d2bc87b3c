//! `/ws/devices/{device_id}`: `devices:telemetry` filtered to one device.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use mindex_core::{PubSubHub, RedisTransport};
use mindex_model::PubSubMessage;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::streams::common::{run_socket, status_envelope, text_envelope, StreamManager};

#[derive(Clone)]
pub struct DeviceFilter {
    pub device_id: String,
}

pub type DevicesManager = StreamManager<DeviceFilter>;

fn matches(msg: &PubSubMessage, filter: &DeviceFilter) -> bool {
    msg.data.get("device_id").and_then(Value::as_str) == Some(filter.device_id.as_str())
}

pub fn build(hub: Arc<PubSubHub<RedisTransport>>) -> Arc<DevicesManager> {
    StreamManager::new(hub, vec!["devices:telemetry"], Arc::new(matches), Arc::new(text_envelope))
}

pub async fn handler(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let manager = state.streams.devices.clone();
    ws.on_upgrade(move |socket| async move {
        let initial = DeviceFilter { device_id: device_id.clone() };
        let initial_json = json!({"device_id": device_id});
        run_socket(
            manager,
            socket,
            "/ws/devices/{device_id}",
            initial,
            initial_json,
            Arc::new(|_raw, current: &DeviceFilter| {
                (DeviceFilter { device_id: current.device_id.clone() }, json!({"type": "filter_updated"}))
            }),
        )
        .await
    })
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let manager = &state.streams.devices;
    Json(status_envelope(manager.active_connections(), manager.subscription_active(), manager.channel_names()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(device_id: &str) -> PubSubMessage {
        PubSubMessage {
            channel: "devices:telemetry".to_string(),
            data: json!({"device_id": device_id}),
            timestamp: Utc::now(),
            source: None,
            message_id: "1".to_string(),
        }
    }

    #[test]
    fn matches_only_the_filtered_device() {
        let filter = DeviceFilter { device_id: "buoy-1".to_string() };
        assert!(matches(&message("buoy-1"), &filter));
        assert!(!matches(&message("buoy-2"), &filter));
    }
}
