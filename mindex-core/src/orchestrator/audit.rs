use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub collector: String,
    pub action: String,
    pub details: Value,
    pub success: bool,
}

/// Fixed-capacity ring buffer; the orchestrator is the sole writer
/// (spec.md §5), readers snapshot before filtering.
pub struct AuditLogger {
    max_entries: usize,
    entries: Mutex<VecDeque<AuditLogEntry>>,
}

impl AuditLogger {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
        }
    }

    pub fn record(&self, entry: AuditLogEntry) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Filtered read: by collector name, by a `since` lower bound, capped at `limit`.
    pub fn query(
        &self,
        collector: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<AuditLogEntry> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .rev()
            .filter(|e| collector.is_none_or(|c| e.collector == c))
            .filter(|e| since.is_none_or(|s| e.timestamp >= s))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(collector: &str, success: bool) -> AuditLogEntry {
        AuditLogEntry {
            timestamp: Utc::now(),
            collector: collector.to_string(),
            action: "manual_fetch".to_string(),
            details: json!({}),
            success,
        }
    }

    #[test]
    fn trims_to_max_entries() {
        let log = AuditLogger::new(3);
        for i in 0..5 {
            log.record(entry(&format!("c{i}"), true));
        }
        assert_eq!(log.len(), 3);
        let all = log.query(None, None, 10);
        assert_eq!(all[0].collector, "c4");
    }

    #[test]
    fn filters_by_collector() {
        let log = AuditLogger::new(10);
        log.record(entry("usgs", true));
        log.record(entry("opensky", false));
        let filtered = log.query(Some("opensky"), None, 10);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].collector, "opensky");
        assert!(!filtered[0].success);
    }
}
