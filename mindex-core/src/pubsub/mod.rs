//! Pub/Sub Hub: callback-set semantics and reconnect-with-resubscribe on
//! top of a raw [`PubSubTransport`].

pub mod redis_transport;

pub use redis_transport::RedisTransport;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mindex_contracts::{PubSubError, PubSubTransport};
use mindex_model::{Channel, PubSubMessage};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const BROADCAST_CAPACITY: usize = 256;

/// A channel's receiver set is a broadcast channel: each `subscribe` call
/// hands back its own [`broadcast::Receiver`], which plays the role of one
/// of the original's per-channel callbacks — a lagging or panicking
/// subscriber never affects its siblings.
pub struct PubSubHub<T: PubSubTransport + 'static> {
    transport: Arc<T>,
    channels: DashMap<String, broadcast::Sender<PubSubMessage>>,
    connected: AtomicBool,
    messages_published: AtomicU64,
    messages_received: AtomicU64,
    listener: std::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl<T: PubSubTransport + 'static> PubSubHub<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            channels: DashMap::new(),
            connected: AtomicBool::new(false),
            messages_published: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            listener: std::sync::Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn subscribed_channels(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    pub fn stats(&self) -> Value {
        json!({
            "connected": self.is_connected(),
            "subscribed_channels": self.channels.len(),
            "channels": self.subscribed_channels(),
            "messages_published": self.messages_published.load(Ordering::Relaxed),
            "messages_received": self.messages_received.load(Ordering::Relaxed),
        })
    }

    /// Connects the transport and spawns the single background listener.
    pub async fn connect(&self) -> Result<(), PubSubError> {
        if self.is_connected() {
            warn!("pubsub hub already connected");
            return Ok(());
        }
        self.transport.connect().await?;
        self.connected.store(true, Ordering::Relaxed);
        info!("pubsub hub connected");
        Ok(())
    }

    /// Spawns the listener task; split from `connect` so the hub can be
    /// shared via `Arc` before the loop captures a clone of it.
    pub fn spawn_listener(self: &Arc<Self>) {
        let mut guard = self.listener.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let hub = self.clone();
        let child = token.clone();
        let handle = tokio::spawn(async move { hub.listen_loop(child).await });
        *guard = Some((token, handle));
    }

    async fn listen_loop(self: Arc<Self>, stop: CancellationToken) {
        loop {
            if stop.is_cancelled() {
                return;
            }
            let next = tokio::select! {
                r = self.transport.recv() => r,
                _ = stop.cancelled() => return,
            };

            match next {
                Ok(Some((channel, payload))) => {
                    self.messages_received.fetch_add(1, Ordering::Relaxed);
                    self.dispatch(&channel, &payload);
                }
                Ok(None) => return,
                Err(err) => {
                    error!(error = %err, "pubsub listener error, reconnecting");
                    self.connected.store(false, Ordering::Relaxed);
                    if !self.reconnect(&stop).await {
                        error!("pubsub reconnect attempts exhausted, stopping listener");
                        return;
                    }
                }
            }
        }
    }

    fn dispatch(&self, channel: &str, payload: &str) {
        let message = match PubSubMessage::from_json(payload) {
            Ok(m) => m,
            Err(err) => {
                error!(channel, error = %err, "dropping unparseable pubsub message");
                return;
            }
        };
        if let Some(sender) = self.channels.get(channel) {
            // A `send` error here only means there are currently no live
            // receivers; the message is simply not delivered, which is the
            // documented at-most-once contract.
            let _ = sender.send(message);
        }
    }

    async fn reconnect(&self, stop: &CancellationToken) -> bool {
        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            if stop.is_cancelled() {
                return false;
            }
            warn!(attempt, max = MAX_RECONNECT_ATTEMPTS, "pubsub reconnect attempt");
            let _ = self.transport.disconnect().await;
            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_DELAY * attempt) => {}
                _ = stop.cancelled() => return false,
            }

            if self.transport.connect().await.is_err() {
                continue;
            }
            let mut all_resubscribed = true;
            for channel in self.subscribed_channels() {
                if self.transport.subscribe_channel(&channel).await.is_err() {
                    all_resubscribed = false;
                }
            }
            if all_resubscribed {
                self.connected.store(true, Ordering::Relaxed);
                info!(attempt, "pubsub reconnected and resubscribed");
                return true;
            }
        }
        false
    }

    pub async fn disconnect(&self) -> Result<(), PubSubError> {
        if let Some((token, handle)) = self.listener.lock().unwrap().take() {
            token.cancel();
            let _ = handle.await;
        }
        self.connected.store(false, Ordering::Relaxed);
        self.transport.disconnect().await
    }

    /// Registers interest in `channel`, subscribing the transport on first
    /// interest. The returned receiver is this subscriber's callback slot.
    pub async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<PubSubMessage>, PubSubError> {
        if let Some(sender) = self.channels.get(channel) {
            return Ok(sender.subscribe());
        }
        let (tx, rx) = broadcast::channel(BROADCAST_CAPACITY);
        self.transport.subscribe_channel(channel).await?;
        self.channels.insert(channel.to_string(), tx);
        Ok(rx)
    }

    /// Drops this hub's interest in a channel once no receivers remain.
    pub async fn unsubscribe_if_idle(&self, channel: &str) -> Result<(), PubSubError> {
        let should_remove = self
            .channels
            .get(channel)
            .map(|sender| sender.receiver_count() == 0)
            .unwrap_or(false);
        if should_remove {
            self.channels.remove(channel);
            self.transport.unsubscribe_channel(channel).await?;
        }
        Ok(())
    }

    pub async fn publish(&self, channel: &str, data: Value, source: Option<String>) -> Result<(), PubSubError> {
        let message = PubSubMessage::new(channel, data, source);
        let payload = message.to_json().map_err(|e| PubSubError::Publish(e.to_string()))?;
        self.transport.publish_raw(channel, payload).await?;
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn publish_device_telemetry(&self, device_id: &str, telemetry: Value) -> Result<(), PubSubError> {
        self.publish(
            Channel::DEVICES_TELEMETRY,
            json!({"device_id": device_id, "telemetry": telemetry}),
            Some(format!("device:{device_id}")),
        )
        .await
    }

    pub async fn publish_agent_status(&self, agent_id: &str, status: &str, details: Value) -> Result<(), PubSubError> {
        self.publish(
            Channel::AGENTS_STATUS,
            json!({"agent_id": agent_id, "status": status, "details": details}),
            Some(format!("agent:{agent_id}")),
        )
        .await
    }

    pub async fn publish_experiment_data(&self, experiment_id: &str, data: Value) -> Result<(), PubSubError> {
        self.publish(
            Channel::EXPERIMENTS_DATA,
            json!({"experiment_id": experiment_id, "data": data}),
            Some(format!("experiment:{experiment_id}")),
        )
        .await
    }

    pub async fn publish_crep_update(&self, category: &str, data: Value) -> Result<(), PubSubError> {
        self.publish(
            Channel::CREP_LIVE,
            json!({"category": category, "data": data}),
            Some(format!("crep:{category}")),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindex_contracts::MockPubSubTransport;

    fn connected_mock() -> MockPubSubTransport {
        let mut m = MockPubSubTransport::new();
        m.expect_connect().returning(|| Box::pin(async { Ok(()) }));
        m.expect_disconnect().returning(|| Box::pin(async { Ok(()) }));
        m
    }

    #[tokio::test]
    async fn subscribe_only_calls_transport_once_per_channel() {
        let mut mock = connected_mock();
        mock.expect_subscribe_channel().times(1).returning(|_| Box::pin(async { Ok(()) }));
        mock.expect_recv().returning(|| Box::pin(async { Ok(None) }));
        let hub = PubSubHub::new(Arc::new(mock));
        hub.connect().await.unwrap();
        let _a = hub.subscribe("crep:live").await.unwrap();
        let _b = hub.subscribe("crep:live").await.unwrap();
        assert_eq!(hub.subscribed_channels(), vec!["crep:live".to_string()]);
    }

    #[tokio::test]
    async fn publish_increments_counter() {
        let mut mock = connected_mock();
        mock.expect_publish_raw().returning(|_, _| Box::pin(async { Ok(()) }));
        mock.expect_recv().returning(|| Box::pin(async { Ok(None) }));
        let hub = PubSubHub::new(Arc::new(mock));
        hub.connect().await.unwrap();
        hub.publish_crep_update("aircraft", json!({"lat": 1.0})).await.unwrap();
        assert_eq!(hub.stats()["messages_published"], 1);
    }

    #[tokio::test]
    async fn unsubscribe_if_idle_removes_empty_channel() {
        let mut mock = connected_mock();
        mock.expect_subscribe_channel().returning(|_| Box::pin(async { Ok(()) }));
        mock.expect_unsubscribe_channel().times(1).returning(|_| Box::pin(async { Ok(()) }));
        mock.expect_recv().returning(|| Box::pin(async { Ok(None) }));
        let hub = PubSubHub::new(Arc::new(mock));
        hub.connect().await.unwrap();
        let rx = hub.subscribe("devices:telemetry").await.unwrap();
        drop(rx);
        hub.unsubscribe_if_idle("devices:telemetry").await.unwrap();
        assert!(hub.subscribed_channels().is_empty());
    }
}
