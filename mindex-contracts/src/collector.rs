use std::time::Duration;

use async_trait::async_trait;
use mindex_model::{CollectorStats, RawEvent, TimelineEvent};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Error kinds a collector can raise; the orchestrator's retry/circuit logic
/// matches on kind rather than string content (spec.md §7's error taxonomy).
#[derive(Debug, Error)]
pub enum CollectorError {
    /// HTTP timeout, 5xx, broker disconnect — retryable.
    #[error("transient error from {source_name}: {message}")]
    Transient { source_name: String, message: String },

    /// 401/403 — non-retryable for this source.
    #[error("auth error from {source_name}: {message}")]
    Auth { source_name: String, message: String },

    /// 429 — caller already slept ≥60s and should return an empty batch
    /// rather than raising; this variant exists for the cases that must
    /// still surface (e.g. a rate limit encountered mid-pagination).
    #[error("rate limited by {source_name}: {message}")]
    RateLimited { source_name: String, message: String },

    /// Malformed payload for a single record; the caller drops the record
    /// and continues rather than failing the whole cycle.
    #[error("parse error from {source_name}: {message}")]
    Parse { source_name: String, message: String },

    #[error("store error: {0}")]
    Store(String),
}

impl CollectorError {
    /// Whether the orchestrator should count this as a circuit-breaker failure.
    /// Rate limits and per-record parse errors do not count (spec.md §7).
    pub fn counts_as_breaker_failure(&self) -> bool {
        !matches!(self, CollectorError::RateLimited { .. } | CollectorError::Parse { .. })
    }
}

/// Bounds the standalone retry loop in [`Collector::run_loop`]: exponential
/// backoff from `initial_delay`, capped at `max_delay`, reset on any
/// successful cycle.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
        }
    }
}

/// Uniform polling contract implemented by every concrete collector.
#[async_trait]
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;
    fn entity_type(&self) -> &str;
    fn poll_interval_seconds(&self) -> u64;

    /// Lifecycle hook for connection objects; called once before the first poll.
    async fn initialize(&self) -> Result<(), CollectorError> {
        Ok(())
    }

    /// Lifecycle hook for connection objects; called once after the loop stops.
    async fn cleanup(&self) -> Result<(), CollectorError> {
        Ok(())
    }

    /// IO against the external endpoint. Must return `Ok(vec![])` on a 429
    /// after backing off internally for at least 60s, and skip records
    /// lacking required coordinates.
    async fn fetch(&self) -> Result<Vec<RawEvent>, CollectorError>;

    /// Produces a deterministic `TimelineEvent`; a per-record failure here
    /// is caught by the caller and the record is dropped, not propagated.
    fn transform(&self, raw: &RawEvent) -> Result<TimelineEvent, CollectorError>;

    /// Upserts into the spatial store; failures are logged by the
    /// implementation and this returns 0 rather than propagating (spec.md
    /// §9's documented, not "fixed", ambiguity).
    async fn ingest(&self, events: Vec<TimelineEvent>) -> usize;

    /// Snapshot of the collector's running counters.
    fn stats(&self) -> CollectorStats;

    /// One fetch→transform→ingest cycle. Per-record transform failures are
    /// logged and dropped rather than failing the whole cycle.
    async fn run_once(&self) -> Result<usize, CollectorError> {
        let raw_events = self.fetch().await?;
        let mut transformed = Vec::with_capacity(raw_events.len());
        for raw in &raw_events {
            match self.transform(raw) {
                Ok(event) => transformed.push(event),
                Err(err) => warn!(collector = self.name(), error = %err, "dropping record: transform failed"),
            }
        }
        Ok(self.ingest(transformed).await)
    }

    /// Standalone run loop for a collector operating outside the
    /// orchestrator's own breaker-guarded scheduling: retries a failing
    /// cycle with exponential backoff up to `RetryConfig::max_retries`
    /// before giving up on that cycle and waiting for the next poll tick.
    async fn run_loop(&self, stop: CancellationToken) {
        let retry = RetryConfig::default();
        while !stop.is_cancelled() {
            let mut attempt = 0u32;
            let mut delay = retry.initial_delay;
            loop {
                match self.run_once().await {
                    Ok(count) => {
                        info!(collector = self.name(), events = count, "fetch cycle complete");
                        break;
                    }
                    Err(err) => {
                        attempt += 1;
                        warn!(collector = self.name(), error = %err, attempt, "fetch cycle failed");
                        if attempt > retry.max_retries {
                            break;
                        }
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = stop.cancelled() => return,
                        }
                        delay = Duration::from_secs_f64(
                            (delay.as_secs_f64() * retry.exponential_base).min(retry.max_delay.as_secs_f64()),
                        );
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.poll_interval_seconds())) => {}
                _ = stop.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_and_parse_do_not_count_as_breaker_failures() {
        let rl = CollectorError::RateLimited { source_name: "x".into(), message: "m".into() };
        let parse = CollectorError::Parse { source_name: "x".into(), message: "m".into() };
        let transient = CollectorError::Transient { source_name: "x".into(), message: "m".into() };
        assert!(!rl.counts_as_breaker_failure());
        assert!(!parse.counts_as_breaker_failure());
        assert!(transient.counts_as_breaker_failure());
    }
}
