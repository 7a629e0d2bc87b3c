use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::timeline_event::TimelineEvent;

/// GeoJSON-flavored geometry: `[lng, lat]` or `[lng, lat, altitude]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Vec<f64> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub altitude: Option<f64>,
    pub classification: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTime {
    pub observed_at: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
}

/// Wire envelope emitted to pub/sub and streamed to WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub geometry: Geometry,
    pub state: EntityState,
    pub time: EntityTime,
    pub confidence: f64,
    pub source: String,
    pub properties: Value,
    pub s2_cell: String,
}

impl UnifiedEntity {
    /// Builds the wire envelope from a normalized [`TimelineEvent`] and its
    /// precomputed s2 cell key (see `mindex_core::quality::s2_cell`).
    pub fn from_timeline_event(event: &TimelineEvent, s2_cell: String) -> Self {
        let coordinates = match event.altitude {
            Some(alt) => vec![event.lng, event.lat, alt],
            None => vec![event.lng, event.lat],
        };
        let classification = event
            .properties
            .get("classification")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            id: event.id.to_string(),
            entity_type: event.entity_type.clone(),
            geometry: Geometry::Point { coordinates },
            state: EntityState {
                altitude: event.altitude,
                classification,
            },
            time: EntityTime {
                observed_at: event.timestamp,
                valid_from: event.timestamp,
            },
            confidence: event.quality_score,
            source: event.source.clone(),
            properties: event.properties.clone(),
            s2_cell,
        }
    }
}
