//! Concrete collectors: each wraps an HTTP source and implements
//! [`mindex_contracts::Collector`] in terms of a shared client and stats holder.

pub mod ais;
pub mod noaa;
pub mod norad;
pub mod opensky;
pub mod usgs;

pub use ais::AisCollector;
pub use noaa::NoaaCollector;
pub use norad::NoradCollector;
pub use opensky::OpenSkyCollector;
pub use usgs::UsgsCollector;

use std::sync::Mutex;
use std::time::{Duration, Instant};

use mindex_model::CollectorStats;

/// Builds the shared `reqwest::Client` every collector polls through, with
/// the generous per-request timeout spec.md's concurrency section calls for.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("mindex-collector/0.1")
        .build()
        .expect("static client config is always valid")
}

/// Interior-mutable stats holder shared by every concrete collector, since
/// `Collector::stats()` is a pure getter but fetch cycles run `&self`.
#[derive(Default)]
pub struct StatsCell(Mutex<CollectorStats>);

impl StatsCell {
    pub fn new() -> Self {
        Self(Mutex::new(CollectorStats::default()))
    }

    pub fn snapshot(&self) -> CollectorStats {
        self.0.lock().unwrap().clone()
    }

    pub fn record_success(&self, events: u64) {
        self.0.lock().unwrap().record_success(events);
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        self.0.lock().unwrap().record_failure(error);
    }

    /// Times a fetch cycle; call only after a successful fetch, matching
    /// the upstream counters (`total_fetches` only advances on success).
    pub fn record_duration_since(&self, start: Instant) {
        self.0.lock().unwrap().record_duration(start.elapsed().as_secs_f64() * 1000.0);
    }
}
