//! Shared skeleton for the WebSocket stream routers whose channel set is
//! fixed regardless of per-client filter state (topology, devices, crep,
//! scientific, security). The entity router subscribes to per-client
//! dynamic channels and is implemented separately in `entity.rs`.
//!
//! Grounded on the teacher's `websocket::connection::Connection` (per-client
//! struct holding a sender half) and `pubsub::PubSubHub` (broadcast-per-
//! subscriber fan-out, snapshot-then-iterate broadcast).

use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::Utc;
use dashmap::DashMap;
use futures_util::stream::{select_all, StreamExt};
use mindex_core::{PubSubHub, RedisTransport};
use mindex_model::PubSubMessage;
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What happens to a client whose outgoing queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the client — matches "a failing send removes the client".
    DropClient,
    /// Drop the newest message, keep the client connected.
    DropNewest,
}

pub type MatchFn<F> = Arc<dyn Fn(&PubSubMessage, &F) -> bool + Send + Sync>;
pub type EncodeFn = Arc<dyn Fn(&PubSubMessage) -> Message + Send + Sync>;

struct ClientHandle<F> {
    filter: RwLock<F>,
    sender: mpsc::Sender<Message>,
}

/// Drives one or more fixed broker channels into a set of WebSocket
/// clients, each carrying its own filter state `F`. A single background
/// subscriber is spawned on first client and torn down on last disconnect.
pub struct StreamManager<F: Clone + Send + Sync + 'static> {
    hub: Arc<PubSubHub<RedisTransport>>,
    channels: Vec<&'static str>,
    matcher: MatchFn<F>,
    encoder: EncodeFn,
    queue_capacity: usize,
    overflow: OverflowPolicy,
    clients: DashMap<Uuid, ClientHandle<F>>,
    subscriber: tokio::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    history_cap: usize,
    history: tokio::sync::Mutex<std::collections::VecDeque<PubSubMessage>>,
}

impl<F: Clone + Send + Sync + 'static> StreamManager<F> {
    pub fn new(
        hub: Arc<PubSubHub<RedisTransport>>,
        channels: Vec<&'static str>,
        matcher: MatchFn<F>,
        encoder: EncodeFn,
    ) -> Arc<Self> {
        Arc::new(Self {
            hub,
            channels,
            matcher,
            encoder,
            queue_capacity: 256,
            overflow: OverflowPolicy::DropClient,
            clients: DashMap::new(),
            subscriber: tokio::sync::Mutex::new(None),
            history_cap: 0,
            history: tokio::sync::Mutex::new(std::collections::VecDeque::new()),
        })
    }

    /// Keeps the last `cap` broadcast messages for replay to newly
    /// connected clients, matching the security router's ring buffer.
    pub fn with_history(mut self: Arc<Self>, cap: usize) -> Arc<Self> {
        Arc::get_mut(&mut self).expect("with_history called before sharing").history_cap = cap;
        self
    }

    pub async fn recent_history(&self) -> Vec<PubSubMessage> {
        self.history.lock().await.iter().cloned().collect()
    }

    async fn replay_matching(&self, filter: &F) -> Vec<Message> {
        self.history
            .lock()
            .await
            .iter()
            .filter(|m| (self.matcher)(m, filter))
            .map(|m| (self.encoder)(m))
            .collect()
    }

    pub fn active_connections(&self) -> usize {
        self.clients.len()
    }

    pub fn channel_names(&self) -> &[&'static str] {
        &self.channels
    }

    pub fn subscription_active(&self) -> bool {
        self.subscriber.try_lock().map(|g| g.is_some()).unwrap_or(true)
    }

    /// Registers a new client, spawning the shared subscriber if this is
    /// the first one, and returns its id plus the receiver half to drain
    /// into the socket.
    pub async fn add_client(self: &Arc<Self>, filter: F) -> (Uuid, mpsc::Receiver<Message>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.clients.insert(id, ClientHandle { filter: RwLock::new(filter), sender: tx });
        self.ensure_subscriber();
        (id, rx)
    }

    pub async fn current_filter(&self, id: Uuid) -> Option<F> {
        match self.clients.get(&id) {
            Some(client) => Some(client.filter.read().await.clone()),
            None => None,
        }
    }

    pub async fn set_filter(&self, id: Uuid, filter: F) {
        if let Some(client) = self.clients.get(&id) {
            *client.filter.write().await = filter;
        }
    }

    /// Removes a client and, if it was the last one, stops the subscriber
    /// and unsubscribes from every channel.
    pub async fn remove_client(&self, id: Uuid) {
        self.clients.remove(&id);
        if self.clients.is_empty() {
            if let Some((token, handle)) = self.subscriber.lock().await.take() {
                token.cancel();
                let _ = handle.await;
            }
            for channel in &self.channels {
                let _ = self.hub.unsubscribe_if_idle(channel).await;
            }
        }
    }

    fn ensure_subscriber(self: &Arc<Self>) {
        let Ok(mut guard) = self.subscriber.try_lock() else { return };
        if guard.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let child = token.clone();
        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.listen(child).await });
        *guard = Some((token, handle));
    }

    async fn listen(self: Arc<Self>, stop: CancellationToken) {
        let mut receivers = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            match self.hub.subscribe(channel).await {
                Ok(rx) => receivers.push(BroadcastStream::new(rx)),
                Err(err) => error!(channel, error = %err, "stream router could not subscribe"),
            }
        }
        if receivers.is_empty() {
            return;
        }
        let mut merged = select_all(receivers);
        loop {
            let next = tokio::select! {
                item = merged.next() => item,
                _ = stop.cancelled() => return,
            };
            let Some(item) = next else { return };
            let Ok(message) = item else { continue };
            self.broadcast(&message).await;
        }
    }

    async fn broadcast(&self, message: &PubSubMessage) {
        if self.history_cap > 0 {
            let mut history = self.history.lock().await;
            history.push_back(message.clone());
            while history.len() > self.history_cap {
                history.pop_front();
            }
        }
        let mut dead = Vec::new();
        for entry in self.clients.iter() {
            let id = *entry.key();
            let filter = entry.value().filter.read().await.clone();
            if !(self.matcher)(message, &filter) {
                continue;
            }
            let encoded = (self.encoder)(message);
            match entry.value().sender.try_send(encoded) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    if self.overflow == OverflowPolicy::DropClient {
                        dead.push(id);
                    }
                }
                Err(TrySendError::Closed(_)) => dead.push(id),
            }
        }
        for id in dead {
            self.clients.remove(&id);
        }
    }
}

pub fn text_envelope(message: &PubSubMessage) -> Message {
    Message::Text(serde_json::to_string(message).unwrap_or_default().into())
}

pub fn pong() -> Value {
    json!({"type": "pong", "timestamp": Utc::now().to_rfc3339()})
}

pub fn connected_envelope(filter: Value) -> Value {
    json!({"type": "connected", "filter": filter, "timestamp": Utc::now().to_rfc3339()})
}

pub fn status_envelope(active_connections: usize, subscription_active: bool, channels: &[&str]) -> Value {
    json!({
        "active_connections": active_connections,
        "subscription_active": subscription_active,
        "channels": channels,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Classifies an inbound client control message; unrecognized payloads are
/// ignored rather than closing the socket, matching the router contract's
/// "or disconnect" being the client's choice, not the server's.
pub enum ClientControl {
    Ping,
    SetFilter(Value),
    Subscribe(Value),
    Other,
}

pub fn parse_client_control(raw: &str) -> ClientControl {
    let Ok(value) = serde_json::from_str::<Value>(raw) else { return ClientControl::Other };
    match value.get("type").and_then(Value::as_str) {
        Some("ping") => ClientControl::Ping,
        Some("set_filter") => ClientControl::SetFilter(value),
        Some("subscribe") => ClientControl::Subscribe(value),
        _ => ClientControl::Other,
    }
}

pub type FilterUpdateFn<F> = Arc<dyn Fn(&Value, &F) -> (F, Value) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_client_control_recognizes_known_types() {
        assert!(matches!(parse_client_control(r#"{"type":"ping"}"#), ClientControl::Ping));
        assert!(matches!(parse_client_control(r#"{"type":"set_filter","category":"x"}"#), ClientControl::SetFilter(_)));
        assert!(matches!(parse_client_control(r#"{"type":"subscribe"}"#), ClientControl::Subscribe(_)));
    }

    #[test]
    fn parse_client_control_ignores_unknown_payloads() {
        assert!(matches!(parse_client_control(r#"{"type":"unknown"}"#), ClientControl::Other));
        assert!(matches!(parse_client_control("not json"), ClientControl::Other));
    }

    #[tokio::test]
    async fn manager_tracks_client_lifecycle() {
        let hub = Arc::new(PubSubHub::new(Arc::new(mindex_core::RedisTransport::new("redis://127.0.0.1:0").unwrap())));
        let manager: Arc<StreamManager<()>> =
            StreamManager::new(hub, vec!["topology:test"], Arc::new(|_msg, _filter| true), Arc::new(text_envelope));
        assert_eq!(manager.active_connections(), 0);
        let (id, _rx) = manager.add_client(()).await;
        assert_eq!(manager.active_connections(), 1);
        assert!(manager.current_filter(id).await.is_some());
        manager.remove_client(id).await;
        assert_eq!(manager.active_connections(), 0);
    }
}

/// Drives one accepted WebSocket connection against a [`StreamManager`]:
/// registers the client, forwards broadcast messages to the socket, and
/// answers `ping`/`set_filter`/`subscribe` control frames until the client
/// disconnects or a send fails.
pub async fn run_socket<F: Clone + Send + Sync + 'static>(
    manager: Arc<StreamManager<F>>,
    socket: axum::extract::ws::WebSocket,
    route: &'static str,
    initial_filter: F,
    initial_filter_json: Value,
    on_control: FilterUpdateFn<F>,
) {
    use axum::extract::ws::Message as WsMessage;
    use futures_util::{SinkExt, StreamExt as _};

    let (mut sink, mut stream) = socket.split();
    let replay = manager.replay_matching(&initial_filter).await;
    let (id, mut rx) = manager.add_client(initial_filter).await;
    info!(route, client = %id, "stream client connected");

    if sink
        .send(WsMessage::Text(connected_envelope(initial_filter_json).to_string().into()))
        .await
        .is_err()
    {
        manager.remove_client(id).await;
        return;
    }
    for msg in replay {
        if sink.send(msg).await.is_err() {
            manager.remove_client(id).await;
            return;
        }
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(msg) => {
                        if sink.send(msg).await.is_err() {
                            warn!(route, client = %id, "stream send failed, dropping client");
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match parse_client_control(&text) {
                            ClientControl::Ping => {
                                if sink.send(WsMessage::Text(pong().to_string().into())).await.is_err() {
                                    break;
                                }
                            }
                            ClientControl::SetFilter(raw) | ClientControl::Subscribe(raw) => {
                                let Some(current) = manager.current_filter(id).await else { continue };
                                let (updated, ack) = on_control(&raw, &current);
                                manager.set_filter(id, updated).await;
                                if sink.send(WsMessage::Text(ack.to_string().into())).await.is_err() {
                                    break;
                                }
                            }
                            ClientControl::Other => {}
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(route, client = %id, error = %err, "stream receive error");
                        break;
                    }
                }
            }
        }
    }
    manager.remove_client(id).await;
}
