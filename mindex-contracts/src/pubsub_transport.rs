use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("reconnect attempts exhausted")]
    ReconnectExhausted,
}

/// The broker-facing half of the pub/sub hub: a raw client capable of
/// publishing and subscribing to channel names. `PubSubHub` (mindex-core)
/// owns the callback-set/reconnect semantics on top of this.
#[async_trait]
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
pub trait PubSubTransport: Send + Sync {
    async fn connect(&self) -> Result<(), PubSubError>;
    async fn disconnect(&self) -> Result<(), PubSubError>;
    /// Subscribes the underlying client to a broker channel; returns a
    /// receiver of raw JSON payloads published to it.
    async fn subscribe_channel(&self, channel: &str) -> Result<(), PubSubError>;
    async fn unsubscribe_channel(&self, channel: &str) -> Result<(), PubSubError>;
    async fn publish_raw(&self, channel: &str, payload: String) -> Result<(), PubSubError>;
    /// Polls the next message delivered on any subscribed channel, or
    /// `Ok(None)` if the connection closed cleanly.
    async fn recv(&self) -> Result<Option<(String, String)>, PubSubError>;
}
