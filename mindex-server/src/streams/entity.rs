//! `/api/entities/stream`: the bridge from `entities:<cell>` (or fallbacks)
//! to a single client, per spec.md §4.8 — binary frames, a bounded cap-512
//! drop-newest queue, and cell/type/time_from filtering.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::stream::{select_all, StreamExt};
use futures_util::SinkExt;
use mindex_core::{PubSubHub, RedisTransport};
use mindex_model::PubSubMessage;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::streams::common::{connected_envelope, parse_client_control, pong, ClientControl};

const QUEUE_CAPACITY: usize = 512;

#[derive(Clone)]
pub struct EntityFilter {
    pub cells: Vec<String>,
    pub types: HashSet<String>,
    pub time_from: Option<DateTime<Utc>>,
}

impl EntityFilter {
    fn channels(&self) -> Vec<String> {
        if self.cells.is_empty() {
            vec!["entities:lifecycle".to_string(), "crep:live".to_string()]
        } else {
            self.cells.iter().map(|cell| format!("entities:{cell}")).collect()
        }
    }

    fn matches(&self, msg: &PubSubMessage) -> bool {
        if !self.types.is_empty() {
            let entity_type = msg.data.get("type").and_then(Value::as_str);
            if !entity_type.map(|t| self.types.contains(t)).unwrap_or(false) {
                return false;
            }
        }
        if let Some(time_from) = self.time_from {
            let observed_at = msg.data.get("time").and_then(|t| t.get("observed_at")).and_then(Value::as_str).and_then(|s| DateTime::parse_from_rfc3339(s).ok());
            if let Some(observed_at) = observed_at {
                if observed_at.with_timezone(&Utc) < time_from {
                    return false;
                }
            }
            // Unparsable observed_at passes through per spec.
        }
        true
    }
}

pub struct EntityRouter {
    hub: Arc<PubSubHub<RedisTransport>>,
    active_connections: AtomicUsize,
}

impl EntityRouter {
    pub fn new(hub: Arc<PubSubHub<RedisTransport>>) -> Arc<Self> {
        Arc::new(Self { hub, active_connections: AtomicUsize::new(0) })
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}

#[derive(Deserialize)]
pub struct EntityQuery {
    pub cells: Option<String>,
    pub types: Option<String>,
    pub time_from: Option<String>,
}

fn parse_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| s.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect()).unwrap_or_default()
}

pub async fn handler(State(state): State<AppState>, Query(query): Query<EntityQuery>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let router = state.streams.entity.clone();
    ws.on_upgrade(move |socket| async move {
        let filter = EntityFilter {
            cells: parse_csv(query.cells.as_deref()),
            types: parse_csv(query.types.as_deref()).into_iter().collect(),
            time_from: query.time_from.as_deref().and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|d| d.with_timezone(&Utc)),
        };
        run(router, socket, filter).await
    })
}

async fn run(router: Arc<EntityRouter>, socket: WebSocket, initial: EntityFilter) {
    router.active_connections.fetch_add(1, Ordering::Relaxed);
    let filter = Arc::new(RwLock::new(initial));
    let (tx, mut rx) = mpsc::channel::<PubSubMessage>(QUEUE_CAPACITY);
    let stop = CancellationToken::new();

    let forward_filter = filter.clone();
    let forward_hub = router.hub.clone();
    let forward_stop = stop.clone();
    let channels = forward_filter.read().await.channels();
    let forward_handle = tokio::spawn(async move {
        let mut receivers = Vec::with_capacity(channels.len());
        for channel in &channels {
            if let Ok(rx) = forward_hub.subscribe(channel).await {
                receivers.push(BroadcastStream::new(rx));
            }
        }
        if receivers.is_empty() {
            return;
        }
        let mut merged = select_all(receivers);
        loop {
            let next = tokio::select! {
                item = merged.next() => item,
                _ = forward_stop.cancelled() => return,
            };
            let Some(Ok(message)) = next else {
                if next.is_none() {
                    return;
                }
                continue;
            };
            let passes = forward_filter.read().await.matches(&message);
            if !passes {
                continue;
            }
            if let Err(TrySendError::Full(_)) = tx.try_send(message) {
                // Drop the newest message rather than block or disconnect.
            }
        }
    });

    let (mut sink, mut stream) = socket.split();
    info!(route = "/api/entities/stream", "entity client connected");
    let initial_json = {
        let current = filter.read().await;
        json!({"cells": current.cells, "types": current.types.iter().collect::<Vec<_>>()})
    };
    if sink.send(Message::Text(connected_envelope(initial_json).to_string().into())).await.is_err() {
        stop.cancel();
        let _ = forward_handle.await;
        router.active_connections.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(message) => {
                        let bytes = serde_json::to_vec(&message).unwrap_or_default();
                        if sink.send(Message::Binary(bytes.into())).await.is_err() {
                            warn!("entity stream send failed, dropping client");
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => match parse_client_control(&text) {
                        ClientControl::Ping => {
                            if sink.send(Message::Text(pong().to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        ClientControl::SetFilter(raw) | ClientControl::Subscribe(raw) => {
                            let types: Option<HashSet<String>> = raw.get("types").and_then(Value::as_str).map(|s| parse_csv(Some(s)).into_iter().collect());
                            let time_from = raw
                                .get("time_from")
                                .and_then(Value::as_str)
                                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                                .map(|d| d.with_timezone(&Utc));
                            {
                                let mut guard = filter.write().await;
                                if let Some(types) = types {
                                    guard.types = types;
                                }
                                if time_from.is_some() {
                                    guard.time_from = time_from;
                                }
                            }
                            if sink.send(Message::Text(json!({"type": "filter_updated"}).to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        ClientControl::Other => {}
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "entity stream receive error");
                        break;
                    }
                }
            }
        }
    }

    stop.cancel();
    let _ = forward_handle.await;
    router.active_connections.fetch_sub(1, Ordering::Relaxed);
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let router = &state.streams.entity;
    Json(json!({
        "active_connections": router.active_connections(),
        "subscription_active": router.active_connections() > 0,
        "channels": "entities:<cell>|entities:lifecycle|crep:live",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(entity_type: &str, observed_at: &str) -> PubSubMessage {
        PubSubMessage {
            channel: "entities:lifecycle".to_string(),
            data: json!({"type": entity_type, "time": {"observed_at": observed_at}}),
            timestamp: Utc::now(),
            source: None,
            message_id: "1".to_string(),
        }
    }

    #[test]
    fn no_cells_falls_back_to_lifecycle_and_crep() {
        let filter = EntityFilter { cells: Vec::new(), types: HashSet::new(), time_from: None };
        assert_eq!(filter.channels(), vec!["entities:lifecycle".to_string(), "crep:live".to_string()]);
    }

    #[test]
    fn cells_become_entities_channels() {
        let filter = EntityFilter { cells: vec!["89c25".to_string()], types: HashSet::new(), time_from: None };
        assert_eq!(filter.channels(), vec!["entities:89c25".to_string()]);
    }

    #[test]
    fn type_filter_excludes_other_types() {
        let filter = EntityFilter { cells: Vec::new(), types: HashSet::from(["vessel".to_string()]), time_from: None };
        assert!(filter.matches(&message("vessel", "2026-01-01T00:00:00Z")));
        assert!(!filter.matches(&message("aircraft", "2026-01-01T00:00:00Z")));
    }

    #[test]
    fn time_from_excludes_earlier_events() {
        let filter = EntityFilter {
            cells: Vec::new(),
            types: HashSet::new(),
            time_from: Some("2026-06-01T00:00:00Z".parse().unwrap()),
        };
        assert!(!filter.matches(&message("vessel", "2026-01-01T00:00:00Z")));
        assert!(filter.matches(&message("vessel", "2026-07-01T00:00:00Z")));
    }

    #[test]
    fn unparsable_observed_at_passes_through() {
        let filter = EntityFilter {
            cells: Vec::new(),
            types: HashSet::new(),
            time_from: Some("2026-06-01T00:00:00Z".parse().unwrap()),
        };
        assert!(filter.matches(&message("vessel", "not-a-timestamp")));
    }
}
