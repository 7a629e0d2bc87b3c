use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Post-transform normalized record, the unit the spatial store persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Deterministic `uuidv5(DNS, "<source>:<entity_id>")`; stable across polls.
    pub id: Uuid,
    pub entity_type: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lng: f64,
    /// Meters; negative values denote depth (earthquakes, submerged vessels).
    pub altitude: Option<f64>,
    pub properties: Value,
    pub source: String,
    pub quality_score: f64,
}

impl TimelineEvent {
    /// Deterministic id for an upstream entity, stable across repeated polls.
    pub fn deterministic_id(source: &str, entity_id: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_DNS, format!("{source}:{entity_id}").as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_id_is_stable() {
        let a = TimelineEvent::deterministic_id("usgs", "nc12345");
        let b = TimelineEvent::deterministic_id("usgs", "nc12345");
        assert_eq!(a, b);
    }

    #[test]
    fn deterministic_id_depends_on_source_and_entity() {
        let a = TimelineEvent::deterministic_id("usgs", "nc12345");
        let b = TimelineEvent::deterministic_id("opensky", "nc12345");
        assert_ne!(a, b);
    }
}
