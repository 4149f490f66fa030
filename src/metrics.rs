//! Per-tool request metrics
//!
//! Counters and a latency histogram per tool name. Monotonic for the life of
//! the process; shared between concurrent calls behind a mutex.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Upper bounds (ms) of the latency histogram buckets; the last bucket is open-ended
pub const LATENCY_BUCKETS_MS: &[u64] = &[50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

/// Counters for one tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolMetrics {
    pub requests: u64,
    pub errors: u64,
    pub total_latency_ms: u64,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: u64,

    /// Counts per `LATENCY_BUCKETS_MS` bucket plus one overflow bucket
    pub latency_buckets: Vec<u64>,
}

impl ToolMetrics {
    pub fn average_latency_ms(&self) -> u64 {
        if self.requests == 0 {
            0
        } else {
            self.total_latency_ms / self.requests
        }
    }
}

/// Process-wide metrics registry
#[derive(Debug, Default)]
pub struct Metrics {
    tools: Mutex<BTreeMap<String, ToolMetrics>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished call
    pub fn record(&self, tool: &str, latency: Duration, failed: bool) {
        let latency_ms = latency.as_millis() as u64;
        let mut tools = self.tools.lock().unwrap_or_else(|p| p.into_inner());
        let entry = tools.entry(tool.to_string()).or_insert_with(|| ToolMetrics {
            latency_buckets: vec![0; LATENCY_BUCKETS_MS.len() + 1],
            ..Default::default()
        });

        entry.requests += 1;
        if failed {
            entry.errors += 1;
        }
        entry.total_latency_ms += latency_ms;
        entry.max_latency_ms = entry.max_latency_ms.max(latency_ms);
        entry.min_latency_ms = Some(entry.min_latency_ms.map_or(latency_ms, |m| m.min(latency_ms)));

        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| latency_ms <= *bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        entry.latency_buckets[bucket] += 1;
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> BTreeMap<String, ToolMetrics> {
        self.tools.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn total_requests(&self) -> u64 {
        self.snapshot().values().map(|m| m.requests).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_requests_and_errors() {
        let metrics = Metrics::new();
        metrics.record("grok_ask", Duration::from_millis(40), false);
        metrics.record("grok_ask", Duration::from_millis(700), true);
        metrics.record("grok_models", Duration::from_millis(5), false);

        let snapshot = metrics.snapshot();
        let ask = &snapshot["grok_ask"];
        assert_eq!(ask.requests, 2);
        assert_eq!(ask.errors, 1);
        assert_eq!(ask.min_latency_ms, Some(40));
        assert_eq!(ask.max_latency_ms, 700);
        assert_eq!(ask.average_latency_ms(), 370);
        assert_eq!(ask.latency_buckets[0], 1);
        assert_eq!(ask.latency_buckets[4], 1);
        assert_eq!(metrics.total_requests(), 3);
    }

    #[test]
    fn test_slow_calls_land_in_overflow_bucket() {
        let metrics = Metrics::new();
        metrics.record("grok_search", Duration::from_secs(45), false);
        let buckets = &metrics.snapshot()["grok_search"].latency_buckets;
        assert_eq!(buckets.len(), LATENCY_BUCKETS_MS.len() + 1);
        assert_eq!(buckets[LATENCY_BUCKETS_MS.len()], 1);
    }
}
