//! `/api/crep/stream`: `crep:live`, optionally filtered by `category`.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use mindex_core::{PubSubHub, RedisTransport};
use mindex_model::PubSubMessage;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::streams::common::{run_socket, status_envelope, text_envelope, StreamManager};

#[derive(Clone, Default)]
pub struct CrepFilter {
    pub category: Option<String>,
}

pub type CrepManager = StreamManager<CrepFilter>;

fn matches(msg: &PubSubMessage, filter: &CrepFilter) -> bool {
    match &filter.category {
        None => true,
        Some(category) => msg.data.get("category").and_then(Value::as_str) == Some(category.as_str()),
    }
}

pub fn build(hub: Arc<PubSubHub<RedisTransport>>) -> Arc<CrepManager> {
    StreamManager::new(hub, vec!["crep:live"], Arc::new(matches), Arc::new(text_envelope))
}

#[derive(Deserialize)]
pub struct CrepQuery {
    pub category: Option<String>,
}

pub async fn handler(
    State(state): State<AppState>,
    Query(query): Query<CrepQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let manager = state.streams.crep.clone();
    ws.on_upgrade(move |socket| async move {
        let initial = CrepFilter { category: query.category.clone() };
        let initial_json = json!({"category": query.category});
        run_socket(
            manager,
            socket,
            "/api/crep/stream",
            initial,
            initial_json,
            Arc::new(|raw: &Value, current: &CrepFilter| {
                let category = raw.get("category").and_then(Value::as_str).map(str::to_string).or_else(|| current.category.clone());
                (CrepFilter { category: category.clone() }, json!({"type": "filter_updated", "category": category}))
            }),
        )
        .await
    })
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let manager = &state.streams.crep;
    Json(status_envelope(manager.active_connections(), manager.subscription_active(), manager.channel_names()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(category: &str) -> PubSubMessage {
        PubSubMessage {
            channel: "crep:live".to_string(),
            data: json!({"category": category}),
            timestamp: Utc::now(),
            source: None,
            message_id: "1".to_string(),
        }
    }

    #[test]
    fn no_category_filter_allows_all() {
        assert!(matches(&message("spore"), &CrepFilter::default()));
    }

    #[test]
    fn category_filter_excludes_others() {
        let filter = CrepFilter { category: Some("spore".to_string()) };
        assert!(matches(&message("spore"), &filter));
        assert!(!matches(&message("mycelium"), &filter));
    }
}
