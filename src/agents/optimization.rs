//! Optimization agent (§4.6): every 300s, analyzes each tenant's hit ratio
//! and recommends cache-setting changes, applying only those whose
//! expected improvement clears a minimum bar.
//!
//! Per-key access-pattern fingerprints (top keys, TTL/size/hour-of-day
//! histograms) require operation-level telemetry that this crate
//! deliberately does not retain (§9: `CacheOp` is a rate-limiter key, not
//! an audit record) — recommendations here are driven by the aggregate
//! hit ratio, error rate and memory usage the Cache Manager already
//! tracks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::cache::CacheManager;

use super::common::AgentMetrics;

pub const INTERVAL: Duration = Duration::from_secs(300);
const MIN_EXPECTED_IMPROVEMENT: f64 = 0.05;
const LOW_HIT_RATIO_THRESHOLD: f64 = 50.0;
const HIGH_ERROR_RATE_THRESHOLD: f64 = 5.0;
const HIGH_MEMORY_USAGE_RATIO: f64 = 0.85;
const HOT_HIT_RATIO_THRESHOLD: f64 = 90.0;
const EVICTION_POLICY_IMPROVEMENT: f64 = 0.06;

#[derive(Debug, Clone, PartialEq)]
pub enum Recommendation {
    DefaultTtl(u64),
    MemoryLimitMb(u64),
    EvictionPolicy(String),
}

pub struct OptimizationAgent {
    cache: Arc<CacheManager>,
    metrics: Mutex<AgentMetrics>,
}

impl OptimizationAgent {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache, metrics: Mutex::new(AgentMetrics::default()) }
    }

    pub fn metrics_snapshot(&self) -> AgentMetrics {
        self.metrics.lock().clone()
    }

    /// Returns `(recommendation, expected_improvement)` for a tenant's
    /// current metrics, or `None` if nothing clears the application bar.
    ///
    /// `memory_usage_ratio` stands in for the per-key hot/cold fingerprint
    /// this crate doesn't retain: a tenant under memory pressure with a
    /// concentrated hit ratio looks like a small hot working set (LRU
    /// fits), while pressure with a middling hit ratio looks closer to a
    /// uniform access pattern (random eviction fits as well and is cheaper).
    fn recommend(hit_ratio: f64, error_rate: f64, memory_usage_ratio: f64) -> Option<(Recommendation, f64)> {
        if hit_ratio < LOW_HIT_RATIO_THRESHOLD {
            let improvement = (LOW_HIT_RATIO_THRESHOLD - hit_ratio) / 100.0;
            if improvement >= MIN_EXPECTED_IMPROVEMENT {
                return Some((Recommendation::DefaultTtl(7200), improvement));
            }
        }
        if error_rate > HIGH_ERROR_RATE_THRESHOLD {
            let improvement = (error_rate - HIGH_ERROR_RATE_THRESHOLD) / 100.0;
            if improvement >= MIN_EXPECTED_IMPROVEMENT {
                return Some((Recommendation::MemoryLimitMb(0), improvement));
            }
        }
        if memory_usage_ratio > HIGH_MEMORY_USAGE_RATIO && EVICTION_POLICY_IMPROVEMENT >= MIN_EXPECTED_IMPROVEMENT {
            let policy = if hit_ratio >= HOT_HIT_RATIO_THRESHOLD { "allkeys-lru" } else { "allkeys-random" };
            return Some((Recommendation::EvictionPolicy(policy.to_string()), EVICTION_POLICY_IMPROVEMENT));
        }
        None
    }

    /// Runs one optimization pass across every tenant.
    pub fn run_cycle(&self) {
        let mut m = self.metrics.lock();
        for tenant in self.cache.list_tenants() {
            let Some(cache_metrics) = self.cache.get_tenant_metrics(&tenant.id) else { continue };
            let memory_usage_ratio = if tenant.quotas.memory_limit_mb == 0 {
                0.0
            } else {
                cache_metrics.memory_used_mb / tenant.quotas.memory_limit_mb as f64
            };
            let Some((rec, improvement)) =
                Self::recommend(cache_metrics.hit_ratio(), cache_metrics.error_rate(), memory_usage_ratio)
            else {
                m.record_idle();
                continue;
            };

            let applied = match &rec {
                Recommendation::DefaultTtl(secs) => {
                    self.cache.set_tenant_setting(&tenant.id, "default_ttl", secs.to_string())
                }
                Recommendation::MemoryLimitMb(_) => {
                    let target = (tenant.quotas.memory_limit_mb as f64 * 1.25).round() as u64;
                    self.cache.modify_tenant_quotas(&tenant.id, Some(target), None).map(|_| ())
                }
                Recommendation::EvictionPolicy(policy) => {
                    self.cache.set_tenant_setting(&tenant.id, "eviction_policy", policy.clone())
                }
            };

            match applied {
                Ok(()) => {
                    info!(tenant_id = %tenant.id, improvement, "applied optimization recommendation");
                    m.record_success();
                }
                Err(e) => m.record_failure(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_hit_ratio_recommends_ttl_increase() {
        let rec = OptimizationAgent::recommend(10.0, 0.0, 0.0);
        assert_eq!(rec, Some((Recommendation::DefaultTtl(7200), 0.4)));
    }

    #[test]
    fn healthy_tenant_has_no_recommendation() {
        assert_eq!(OptimizationAgent::recommend(95.0, 0.1, 0.0), None);
    }

    #[test]
    fn memory_pressure_with_hot_ratio_recommends_lru() {
        let rec = OptimizationAgent::recommend(95.0, 0.1, 0.9);
        assert_eq!(rec, Some((Recommendation::EvictionPolicy("allkeys-lru".to_string()), 0.06)));
    }

    #[test]
    fn memory_pressure_with_uniform_ratio_recommends_random() {
        let rec = OptimizationAgent::recommend(60.0, 0.1, 0.9);
        assert_eq!(rec, Some((Recommendation::EvictionPolicy("allkeys-random".to_string()), 0.06)));
    }
}
