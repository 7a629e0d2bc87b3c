use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output of a collector's fetch step, before transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub source: String,
    pub entity_id: String,
    pub entity_type: String,
    pub timestamp: DateTime<Utc>,
    /// Open mapping of source-specific fields, narrowed by `transform`.
    pub data: Value,
    /// Original upstream payload, kept for debugging/audit when cheap to retain.
    pub raw: Option<Value>,
}

impl RawEvent {
    pub fn new(
        source: impl Into<String>,
        entity_id: impl Into<String>,
        entity_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        data: Value,
    ) -> Self {
        Self {
            source: source.into(),
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            timestamp,
            data,
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// Per-collector counters, updated after each `run_once` cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorStats {
    pub total_fetches: u64,
    pub successful_fetches: u64,
    pub failed_fetches: u64,
    pub total_events: u64,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub avg_fetch_duration_ms: f64,
}

impl CollectorStats {
    /// Folds one fetch cycle's duration into the running average.
    ///
    /// Uses the same exponential running average as the original collector:
    /// `avg = avg + (sample - avg) / total_fetches` once `total_fetches > 0`.
    pub fn record_duration(&mut self, duration_ms: f64) {
        self.total_fetches += 1;
        if self.total_fetches == 1 {
            self.avg_fetch_duration_ms = duration_ms;
        } else {
            self.avg_fetch_duration_ms +=
                (duration_ms - self.avg_fetch_duration_ms) / self.total_fetches as f64;
        }
        self.last_fetch_time = Some(Utc::now());
    }

    pub fn record_success(&mut self, events: u64) {
        self.successful_fetches += 1;
        self.total_events += events;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.failed_fetches += 1;
        self.last_error = Some(error.into());
        self.last_error_time = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_converges_to_constant_durations() {
        let mut stats = CollectorStats::default();
        for _ in 0..5 {
            stats.record_duration(100.0);
        }
        assert!((stats.avg_fetch_duration_ms - 100.0).abs() < 1e-9);
        assert_eq!(stats.total_fetches, 5);
    }

    #[test]
    fn running_average_tracks_mean_of_varied_samples() {
        let mut stats = CollectorStats::default();
        for sample in [10.0, 20.0, 30.0] {
            stats.record_duration(sample);
        }
        assert!((stats.avg_fetch_duration_ms - 20.0).abs() < 1e-9);
    }
}
