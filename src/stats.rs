//! Request/response counters and the shared latency tracker.
//!
//! Counting requests on the way in and responses on the way out gives both
//! the request rate and, as their difference, the number of requests in
//! flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::latency::{LatencyTracker, QuantileSnapshot};

/// Process-wide HTTP statistics, shared by the [`Metrics`](crate::middleware::Metrics)
/// layer that writes them and the debug endpoints that read them.
pub struct Stats {
    requests: AtomicU64,
    responses: AtomicU64,
    latency: Arc<LatencyTracker>,
}

/// Point-in-time view of [`Stats`].
///
/// ```json
/// {"Requests": 2, "Responses": 1, "Latency": {"P50": 1.0, "P75": 1.0, "P90": 1.0, "P95": 1.0, "P99": 1.0, "P999": 1.0}}
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatsSnapshot {
    pub requests: u64,
    pub responses: u64,
    pub latency: QuantileSnapshot,
}

impl Stats {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        Ok(Self {
            requests: AtomicU64::new(0),
            responses: AtomicU64::new(0),
            latency: Arc::new(LatencyTracker::new(config)?),
        })
    }

    pub fn request_started(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one response and records how long it took.
    pub fn request_finished(&self, elapsed: Duration) {
        self.latency.record(elapsed);
        self.responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn responses(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }

    pub fn latency(&self) -> &Arc<LatencyTracker> {
        &self.latency
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests(),
            responses: self.responses(),
            latency: self.latency.query(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_has_the_documented_shape() {
        let stats = Stats::new(TrackerConfig::default()).unwrap();
        stats.request_started();
        stats.request_started();
        stats.request_finished(Duration::from_millis(1));

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Requests": 2,
                "Responses": 1,
                "Latency": {"P50": 1.0, "P75": 1.0, "P90": 1.0, "P95": 1.0, "P99": 1.0, "P999": 1.0}
            })
        );
    }

    #[test]
    fn fresh_stats_are_zero() {
        let stats = Stats::new(TrackerConfig::default()).unwrap();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
