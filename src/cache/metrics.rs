use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const LATENCY_RESERVOIR_CAP: usize = 1000;

/// Per-tenant (and aggregate) cache metrics (§3). Counters are updated
/// atomically by the single owner of each metric record; derived fields are
/// computed on read, always clamped to `[0, 100]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub avg_response_time_ms: f64,
    pub memory_used_mb: f64,
    #[serde(skip)]
    latency_reservoir_ms: VecDeque<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            cache_hits: 0,
            cache_misses: 0,
            avg_response_time_ms: 0.0,
            memory_used_mb: 0.0,
            latency_reservoir_ms: VecDeque::with_capacity(LATENCY_RESERVOIR_CAP),
            timestamp: Utc::now(),
        }
    }
}

impl CacheMetrics {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        ((self.cache_hits as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        ((self.failed_requests as f64 / self.total_requests as f64) * 100.0).clamp(0.0, 100.0)
    }

    /// Records one completed operation (§4.1 metric update rule).
    pub fn record(&mut self, elapsed_ms: f64, success: bool, now: DateTime<Utc>) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        if elapsed_ms > 0.0 {
            self.avg_response_time_ms +=
                (elapsed_ms - self.avg_response_time_ms) / self.total_requests as f64;
            if self.latency_reservoir_ms.len() == LATENCY_RESERVOIR_CAP {
                self.latency_reservoir_ms.pop_front();
            }
            self.latency_reservoir_ms.push_back(elapsed_ms);
        }
        self.timestamp = now;
    }

    pub fn record_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.cache_misses += 1;
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.latency_reservoir_ms.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.latency_reservoir_ms.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn p50(&self) -> f64 {
        self.percentile(0.50)
    }

    pub fn p95(&self) -> f64 {
        self.percentile(0.95)
    }

    pub fn p99(&self) -> f64 {
        self.percentile(0.99)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_ratio_is_clamped_and_derived() {
        let mut m = CacheMetrics::default();
        m.record_hit();
        m.record_hit();
        m.record_miss();
        assert!((m.hit_ratio() - 66.666_666_666_666_67).abs() < 1e-6);
    }

    #[test]
    fn empty_metrics_have_zero_error_rate() {
        let m = CacheMetrics::default();
        assert_eq!(m.error_rate(), 0.0);
    }

    #[test]
    fn reservoir_is_bounded() {
        let mut m = CacheMetrics::default();
        for i in 0..(LATENCY_RESERVOIR_CAP + 10) {
            m.record(i as f64, true, Utc::now());
        }
        assert_eq!(m.latency_reservoir_ms.len(), LATENCY_RESERVOIR_CAP);
    }
}
