//! `/ws/security/stream`: the four security channels, filtered by
//! `severities`/`types`, with the last ~10 events replayed on connect.

use std::collections::HashSet;
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

const CHANNELS: [&str; 4] = ["security:incidents", "security:alerts", "security:ids", "security:threats"];
const HISTORY_CAP: usize = 10;

#[derive(Clone, Default)]
pub struct SecurityFilter {
    /// Empty set means "allow all", matching an unset query param.
    pub severities: HashSet<String>,
    pub types: HashSet<String>,
}

pub type SecurityManager = StreamManager<SecurityFilter>;

fn matches(msg: &PubSubMessage, filter: &SecurityFilter) -> bool {
    let severity_ok = filter.severities.is_empty()
        || msg.data.get("severity").and_then(Value::as_str).map(|s| filter.severities.contains(s)).unwrap_or(false);
    let type_ok = filter.types.is_empty()
        || msg.data.get("type").and_then(Value::as_str).map(|t| filter.types.contains(t)).unwrap_or(false);
    severity_ok && type_ok
}

fn parse_csv(raw: Option<&str>) -> HashSet<String> {
    raw.map(|s| s.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect()).unwrap_or_default()
}

pub fn build(hub: Arc<PubSubHub<RedisTransport>>) -> Arc<SecurityManager> {
    StreamManager::new(hub, CHANNELS.to_vec(), Arc::new(matches), Arc::new(text_envelope)).with_history(HISTORY_CAP)
}

#[derive(Deserialize)]
pub struct SecurityQuery {
    pub severities: Option<String>,
    pub types: Option<String>,
}

pub async fn handler(
    State(state): State<AppState>,
    Query(query): Query<SecurityQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let manager = state.streams.security.clone();
    ws.on_upgrade(move |socket| async move {
        let severities = parse_csv(query.severities.as_deref());
        let types = parse_csv(query.types.as_deref());
        let initial_json = json!({
            "severities": severities.iter().cloned().collect::<Vec<_>>(),
            "types": types.iter().cloned().collect::<Vec<_>>(),
        });
        let initial = SecurityFilter { severities, types };
        run_socket(
            manager,
            socket,
            "/ws/security/stream",
            initial,
            initial_json,
            Arc::new(|raw: &Value, current: &SecurityFilter| {
                let severities = raw
                    .get("severities")
                    .and_then(Value::as_str)
                    .map(|s| parse_csv(Some(s)))
                    .unwrap_or_else(|| current.severities.clone());
                let types =
                    raw.get("types").and_then(Value::as_str).map(|s| parse_csv(Some(s))).unwrap_or_else(|| current.types.clone());
                let ack = json!({
                    "type": "subscribed",
                    "severities": severities.iter().cloned().collect::<Vec<_>>(),
                    "types": types.iter().cloned().collect::<Vec<_>>(),
                });
                (SecurityFilter { severities, types }, ack)
            }),
        )
        .await
    })
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let manager = &state.streams.security;
    Json(status_envelope(manager.active_connections(), manager.subscription_active(), manager.channel_names()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(severity: &str, kind: &str) -> PubSubMessage {
        PubSubMessage {
            channel: "security:incidents".to_string(),
            data: json!({"severity": severity, "type": kind}),
            timestamp: Utc::now(),
            source: None,
            message_id: "1".to_string(),
        }
    }

    #[test]
    fn empty_filter_allows_all() {
        let filter = SecurityFilter::default();
        assert!(matches(&message("critical", "ids"), &filter));
    }

    #[test]
    fn severity_filter_excludes_other_severities() {
        let filter = SecurityFilter { severities: parse_csv(Some("critical,high")), types: HashSet::new() };
        assert!(matches(&message("critical", "ids"), &filter));
        assert!(!matches(&message("low", "ids"), &filter));
    }

    #[test]
    fn type_filter_excludes_other_types() {
        let filter = SecurityFilter { severities: HashSet::new(), types: parse_csv(Some("alert")) };
        assert!(!matches(&message("critical", "ids"), &filter));
    }

    #[test]
    fn parse_csv_trims_and_drops_empty() {
        let parsed = parse_csv(Some(" critical ,,high"));
        assert_eq!(parsed, HashSet::from(["critical".to_string(), "high".to_string()]));
    }
}
