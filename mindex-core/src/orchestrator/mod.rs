pub mod audit;
pub mod circuit_breaker;

pub use audit::{AuditLogEntry, AuditLogger};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, CircuitState};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mindex_contracts::Collector;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Registers collectors, runs each under its own circuit breaker on a
/// dedicated task, and records every outcome in a shared audit log.
pub struct IngestionOrchestrator {
    collectors: DashMap<String, Arc<dyn Collector>>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    audit_log: Arc<AuditLogger>,
    tasks: tokio::sync::Mutex<HashMap<String, (CancellationToken, JoinHandle<()>)>>,
}

impl Default for IngestionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionOrchestrator {
    pub fn new() -> Self {
        Self {
            collectors: DashMap::new(),
            breakers: DashMap::new(),
            audit_log: Arc::new(AuditLogger::new(10_000)),
            tasks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn audit_log(&self) -> Arc<AuditLogger> {
        self.audit_log.clone()
    }

    pub fn register(&self, collector: Arc<dyn Collector>) {
        let name = collector.name().to_string();
        self.breakers
            .insert(name.clone(), Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())));
        self.collectors.insert(name.clone(), collector);
        info!(collector = %name, "registered collector");
    }

    /// Initializes every collector then spawns one task per collector.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        for entry in self.collectors.iter() {
            let name = entry.key().clone();
            let collector = entry.value().clone();
            if let Err(err) = collector.initialize().await {
                warn!(collector = %name, error = %err, "collector initialize failed");
            }

            let breaker = self.breakers.get(&name).unwrap().clone();
            let audit_log = self.audit_log.clone();
            let token = CancellationToken::new();
            let child_token = token.clone();

            let handle = tokio::spawn(run_collector_loop(collector, breaker, audit_log, child_token));
            tasks.insert(name, (token, handle));
        }
        self.audit_log.record(AuditLogEntry {
            timestamp: Utc::now(),
            collector: "orchestrator".to_string(),
            action: "start".to_string(),
            details: json!({ "collectors": self.collectors.iter().map(|e| e.key().clone()).collect::<Vec<_>>() }),
            success: true,
        });
    }

    /// Signals every collector task to stop, awaits them with failure
    /// isolation, then runs `cleanup()` on each collector.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, (token, _)) in tasks.iter() {
            token.cancel();
        }
        for (name, (_, handle)) in tasks.drain() {
            if let Err(err) = handle.await {
                warn!(collector = %name, error = %err, "collector task join failed");
            }
        }
        for entry in self.collectors.iter() {
            if let Err(err) = entry.value().cleanup().await {
                warn!(collector = %entry.key(), error = %err, "collector cleanup failed");
            }
        }
        self.audit_log.record(AuditLogEntry {
            timestamp: Utc::now(),
            collector: "orchestrator".to_string(),
            action: "stop".to_string(),
            details: json!({}),
            success: true,
        });
    }

    /// Runs one cycle for a single collector immediately, bypassing the
    /// scheduled loop, and logs the outcome as `manual_fetch`.
    pub async fn trigger_fetch(&self, name: &str) -> Result<usize, String> {
        let Some(collector) = self.collectors.get(name).map(|c| c.clone()) else {
            return Err(format!("unknown collector: {name}"));
        };
        let Some(breaker) = self.breakers.get(name).map(|b| b.clone()) else {
            return Err(format!("unknown collector: {name}"));
        };
        match breaker.call_filtered(|| run_once(&*collector), mindex_contracts::CollectorError::counts_as_breaker_failure).await {
            Err(CircuitOpenError) => {
                self.audit_log.record(AuditLogEntry {
                    timestamp: Utc::now(),
                    collector: name.to_string(),
                    action: "manual_fetch".to_string(),
                    details: json!({ "skipped": "circuit_open" }),
                    success: false,
                });
                Err("circuit open".to_string())
            }
            Ok(Ok(count)) => {
                self.audit_log.record(AuditLogEntry {
                    timestamp: Utc::now(),
                    collector: name.to_string(),
                    action: "manual_fetch".to_string(),
                    details: json!({ "events": count }),
                    success: true,
                });
                Ok(count)
            }
            Ok(Err(err)) => {
                self.audit_log.record(AuditLogEntry {
                    timestamp: Utc::now(),
                    collector: name.to_string(),
                    action: "manual_fetch".to_string(),
                    details: json!({ "error": err.to_string() }),
                    success: false,
                });
                Err(err.to_string())
            }
        }
    }

    pub fn get_audit_log(
        &self,
        collector: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<AuditLogEntry> {
        self.audit_log.query(collector, since, limit)
    }

    pub fn circuit_state(&self, name: &str) -> Option<CircuitState> {
        self.breakers.get(name).map(|b| b.state())
    }

    pub fn collector_names(&self) -> Vec<String> {
        self.collectors.iter().map(|e| e.key().clone()).collect()
    }
}

async fn run_once(collector: &dyn Collector) -> Result<usize, mindex_contracts::CollectorError> {
    let raw_events = collector.fetch().await?;
    let mut transformed = Vec::with_capacity(raw_events.len());
    for raw in &raw_events {
        match collector.transform(raw) {
            Ok(event) => transformed.push(event),
            Err(err) => warn!(collector = collector.name(), error = %err, "dropping record: transform failed"),
        }
    }
    Ok(collector.ingest(transformed).await)
}

async fn run_collector_loop(
    collector: Arc<dyn Collector>,
    breaker: Arc<CircuitBreaker>,
    audit_log: Arc<AuditLogger>,
    stop: CancellationToken,
) {
    let name = collector.name().to_string();
    while !stop.is_cancelled() {
        let outcome = breaker.call_filtered(|| run_once(&*collector), mindex_contracts::CollectorError::counts_as_breaker_failure).await;
        match outcome {
            Err(CircuitOpenError) => {
                audit_log.record(AuditLogEntry {
                    timestamp: Utc::now(),
                    collector: name.clone(),
                    action: "fetch".to_string(),
                    details: json!({ "skipped": "circuit_open" }),
                    success: false,
                });
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(10)) => {}
                    _ = stop.cancelled() => break,
                }
                continue;
            }
            Ok(Ok(count)) => {
                audit_log.record(AuditLogEntry {
                    timestamp: Utc::now(),
                    collector: name.clone(),
                    action: "fetch".to_string(),
                    details: json!({ "events": count }),
                    success: true,
                });
            }
            Ok(Err(err)) => {
                audit_log.record(AuditLogEntry {
                    timestamp: Utc::now(),
                    collector: name.clone(),
                    action: "fetch".to_string(),
                    details: json!({ "error": err.to_string() }),
                    success: false,
                });
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(collector.poll_interval_seconds())) => {}
            _ = stop.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindex_contracts::MockCollector;
    use mindex_model::{CollectorStats, RawEvent, TimelineEvent};
    use serde_json::json as jsn;

    fn mock_with_events(name: &'static str, count: usize) -> MockCollector {
        let mut m = MockCollector::new();
        m.expect_name().return_const(name.to_string());
        m.expect_entity_type().return_const("aircraft".to_string());
        m.expect_poll_interval_seconds().return_const(3600u64);
        m.expect_initialize().returning(|| Box::pin(async { Ok(()) }));
        m.expect_cleanup().returning(|| Box::pin(async { Ok(()) }));
        m.expect_fetch().returning(move || {
            Box::pin(async move {
                Ok((0..count)
                    .map(|i| RawEvent::new("test", i.to_string(), "aircraft", Utc::now(), jsn!({})))
                    .collect())
            })
        });
        m.expect_transform().returning(|raw| {
            Ok(TimelineEvent {
                id: TimelineEvent::deterministic_id(&raw.source, &raw.entity_id),
                entity_type: raw.entity_type.clone(),
                timestamp: raw.timestamp,
                lat: 0.0,
                lng: 0.0,
                altitude: None,
                properties: jsn!({}),
                source: raw.source.clone(),
                quality_score: 0.5,
            })
        });
        m.expect_ingest().returning(|events| Box::pin(async move { events.len() }));
        m.expect_stats().returning(CollectorStats::default);
        m
    }

    #[tokio::test]
    async fn trigger_fetch_records_audit_entry_on_success() {
        let orchestrator = IngestionOrchestrator::new();
        orchestrator.register(Arc::new(mock_with_events("usgs", 2)));
        let count = orchestrator.trigger_fetch("usgs").await.unwrap();
        assert_eq!(count, 2);
        let log = orchestrator.get_audit_log(Some("usgs"), None, 10);
        assert_eq!(log.len(), 1);
        assert!(log[0].success);
    }

    #[tokio::test]
    async fn trigger_fetch_unknown_collector_errors() {
        let orchestrator = IngestionOrchestrator::new();
        let result = orchestrator.trigger_fetch("nope").await;
        assert!(result.is_err());
    }

    fn mock_always_failing(name: &'static str) -> MockCollector {
        let mut m = MockCollector::new();
        m.expect_name().return_const(name.to_string());
        m.expect_entity_type().return_const("aircraft".to_string());
        m.expect_poll_interval_seconds().return_const(3600u64);
        m.expect_initialize().returning(|| Box::pin(async { Ok(()) }));
        m.expect_cleanup().returning(|| Box::pin(async { Ok(()) }));
        m.expect_fetch().returning(|| {
            Box::pin(async {
                Err(mindex_contracts::CollectorError::Transient { source_name: "test".to_string(), message: "boom".to_string() })
            })
        });
        m.expect_transform().returning(|raw: &RawEvent| {
            Ok(TimelineEvent {
                id: TimelineEvent::deterministic_id(&raw.source, &raw.entity_id),
                entity_type: raw.entity_type.clone(),
                timestamp: raw.timestamp,
                lat: 0.0,
                lng: 0.0,
                altitude: None,
                properties: jsn!({}),
                source: raw.source.clone(),
                quality_score: 0.5,
            })
        });
        m.expect_ingest().returning(|events| Box::pin(async move { events.len() }));
        m.expect_stats().returning(CollectorStats::default);
        m
    }

    #[tokio::test]
    async fn trigger_fetch_logs_manual_fetch_failure_once_circuit_is_open() {
        let orchestrator = IngestionOrchestrator::new();
        orchestrator.register(Arc::new(mock_always_failing("norad")));

        // CircuitBreakerConfig::default's failure_threshold is 5.
        for _ in 0..5 {
            assert!(orchestrator.trigger_fetch("norad").await.is_err());
        }
        assert_eq!(orchestrator.circuit_state("norad"), Some(CircuitState::Open));

        let result = orchestrator.trigger_fetch("norad").await;
        assert!(result.is_err());

        let log = orchestrator.get_audit_log(Some("norad"), None, 10);
        let last = log.last().unwrap();
        assert_eq!(last.action, "manual_fetch");
        assert!(!last.success);
        assert_eq!(last.details.get("skipped").and_then(|v| v.as_str()), Some("circuit_open"));
    }

    #[tokio::test]
    async fn start_then_stop_is_clean() {
        let orchestrator = IngestionOrchestrator::new();
        orchestrator.register(Arc::new(mock_with_events("usgs", 0)));
        orchestrator.start().await;
        orchestrator.stop().await;
        let log = orchestrator.get_audit_log(Some("orchestrator"), None, 10);
        assert_eq!(log.len(), 2);
    }
}
