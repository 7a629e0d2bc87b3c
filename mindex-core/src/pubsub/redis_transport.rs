//! Concrete [`PubSubTransport`] backed by `redis::aio`, the Rust analogue
//! of `redis.asyncio` used by the original client.

use std::time::Duration;

use async_trait::async_trait;
use mindex_contracts::{PubSubError, PubSubTransport};
use redis::aio::{MultiplexedConnection, PubSub};
use redis::Client;
use tokio::sync::Mutex;

pub struct RedisTransport {
    client: Client,
    publish_conn: Mutex<Option<MultiplexedConnection>>,
    pubsub: Mutex<Option<PubSub>>,
}

impl RedisTransport {
    pub fn new(redis_url: &str) -> Result<Self, PubSubError> {
        let client = Client::open(redis_url).map_err(|e| PubSubError::Connect(e.to_string()))?;
        Ok(Self { client, publish_conn: Mutex::new(None), pubsub: Mutex::new(None) })
    }
}

#[async_trait]
impl PubSubTransport for RedisTransport {
    async fn connect(&self) -> Result<(), PubSubError> {
        let conn = tokio::time::timeout(Duration::from_secs(5), self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| PubSubError::Connect("connect timed out after 5s".to_string()))?
            .map_err(|e| PubSubError::Connect(e.to_string()))?;
        *self.publish_conn.lock().await = Some(conn);

        let pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| PubSubError::Connect(e.to_string()))?;
        *self.pubsub.lock().await = Some(pubsub);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PubSubError> {
        *self.publish_conn.lock().await = None;
        *self.pubsub.lock().await = None;
        Ok(())
    }

    async fn subscribe_channel(&self, channel: &str) -> Result<(), PubSubError> {
        let mut guard = self.pubsub.lock().await;
        let pubsub = guard.as_mut().ok_or_else(|| PubSubError::Subscribe("not connected".to_string()))?;
        pubsub.subscribe(channel).await.map_err(|e| PubSubError::Subscribe(e.to_string()))
    }

    async fn unsubscribe_channel(&self, channel: &str) -> Result<(), PubSubError> {
        let mut guard = self.pubsub.lock().await;
        let Some(pubsub) = guard.as_mut() else { return Ok(()) };
        pubsub.unsubscribe(channel).await.map_err(|e| PubSubError::Subscribe(e.to_string()))
    }

    async fn publish_raw(&self, channel: &str, payload: String) -> Result<(), PubSubError> {
        let mut guard = self.publish_conn.lock().await;
        let conn = guard.as_mut().ok_or_else(|| PubSubError::Publish("not connected".to_string()))?;
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async::<()>(conn)
            .await
            .map_err(|e| PubSubError::Publish(e.to_string()))
    }

    async fn recv(&self) -> Result<Option<(String, String)>, PubSubError> {
        use futures_util::StreamExt;
        let mut guard = self.pubsub.lock().await;
        let Some(pubsub) = guard.as_mut() else {
            return Err(PubSubError::Connect("not connected".to_string()));
        };
        match pubsub.on_message().next().await {
            Some(msg) => {
                let channel = msg.get_channel_name().to_string();
                let payload: String = msg.get_payload().map_err(|e| PubSubError::Subscribe(e.to_string()))?;
                Ok(Some((channel, payload)))
            }
            None => Ok(None),
        }
    }
}
