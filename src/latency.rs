//! Request latency histogram. Every page/API fetch records into it; the run
//! summary logs the percentiles.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;

/// Milliseconds, 1ms to 10min, 3 significant figures.
pub struct LatencyStats {
    inner: Mutex<Histogram<u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

impl LatencyStats {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, 600_000, 3).expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().clamp(1, 600_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(ms);
        }
    }

    /// None until at least one request has been recorded.
    pub fn summary(&self) -> Option<LatencySummary> {
        let h = self.inner.lock().ok()?;
        if h.len() == 0 {
            return None;
        }
        Some(LatencySummary {
            count: h.len(),
            p50_ms: h.value_at_quantile(0.5),
            p95_ms: h.value_at_quantile(0.95),
            p99_ms: h.value_at_quantile(0.99),
            max_ms: h.max(),
        })
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}
