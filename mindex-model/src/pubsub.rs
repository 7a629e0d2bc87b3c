use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ModelError;

/// Envelope published on every broker channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubMessage {
    pub channel: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,
    pub message_id: String,
}

impl PubSubMessage {
    pub fn new(channel: impl Into<String>, data: Value, source: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            data,
            timestamp: Utc::now(),
            source,
            message_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trips() {
        let msg = PubSubMessage::new("crep:live", json!({"category": "aircraft"}), Some("opensky".into()));
        let encoded = msg.to_json().unwrap();
        let decoded = PubSubMessage::from_json(&encoded).unwrap();
        assert_eq!(decoded.channel, msg.channel);
        assert_eq!(decoded.message_id, msg.message_id);
        assert_eq!(decoded.data, msg.data);
    }
}
