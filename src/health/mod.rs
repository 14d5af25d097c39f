//! Health Monitor (C5): periodic system/backend sampling, threshold-driven
//! alerting with dedup, and alert lifecycle management.

pub mod alert;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{info, warn};

pub use alert::{Alert, AlertSeverity, AlertSink, TracingAlertSink};

use crate::clock::Clock;
use crate::config::AlertThresholds;
use crate::redis_pool::RedisBackend;

const MAX_ALERTS: usize = 1000;
const DEDUP_WINDOW: Duration = Duration::from_secs(60);
const INFO_AUTO_RESOLVE_AFTER: chrono::Duration = chrono::Duration::hours(1);
const ALERT_RETENTION: chrono::Duration = chrono::Duration::hours(24);
/// Hardcoded ceiling above which a cpu/memory alert escalates to critical,
/// mirroring the original's behavior of treating 95% as always-critical
/// regardless of the configured warning threshold.
const CRITICAL_CEILING_PERCENT: f64 = 95.0;
const DISK_ALERT_THRESHOLD_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub component: String,
    pub status: ComponentStatus,
    pub message: String,
    pub latency_ms: f64,
    pub checked_at: DateTime<Utc>,
}

/// Samples system and backend health, raises alerts against configured
/// thresholds, and tracks their acknowledge/resolve lifecycle.
pub struct HealthMonitor {
    redis: Arc<dyn RedisBackend>,
    clock: Arc<dyn Clock>,
    thresholds: AlertThresholds,
    sink: Arc<dyn AlertSink>,
    system: Mutex<System>,
    checks: DashMap<String, HealthCheck>,
    alerts: RwLock<VecDeque<Alert>>,
    last_alert_at: DashMap<(String, String), std::time::Instant>,
    next_alert_seq: AtomicU64,
    last_cpu_percent: RwLock<f64>,
    last_memory_percent: RwLock<f64>,
}

impl HealthMonitor {
    pub fn new(
        redis: Arc<dyn RedisBackend>,
        clock: Arc<dyn Clock>,
        thresholds: AlertThresholds,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            redis,
            clock,
            thresholds,
            sink,
            system: Mutex::new(System::new_all()),
            checks: DashMap::new(),
            alerts: RwLock::new(VecDeque::new()),
            last_alert_at: DashMap::new(),
            next_alert_seq: AtomicU64::new(0),
            last_cpu_percent: RwLock::new(0.0),
            last_memory_percent: RwLock::new(0.0),
        }
    }

    /// Most recently sampled CPU usage (§4.5), updated by [`Self::check_system`].
    pub fn cpu_percent(&self) -> f64 {
        *self.last_cpu_percent.read()
    }

    /// Most recently sampled memory usage (§4.5), updated by [`Self::check_system`].
    pub fn memory_percent(&self) -> f64 {
        *self.last_memory_percent.read()
    }

    /// Samples CPU and memory usage and raises alerts for threshold breaches.
    pub async fn check_system(&self) {
        let (cpu_percent, memory_percent) = {
            let mut sys = self.system.lock();
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            let cpu = sys.global_cpu_usage() as f64;
            let memory = if sys.total_memory() == 0 {
                0.0
            } else {
                100.0 * sys.used_memory() as f64 / sys.total_memory() as f64
            };
            (cpu, memory)
        };
        *self.last_cpu_percent.write() = cpu_percent;
        *self.last_memory_percent.write() = memory_percent;

        let healthy = cpu_percent < self.thresholds.cpu_usage && memory_percent < self.thresholds.memory_usage;
        self.checks.insert(
            "system".to_string(),
            HealthCheck {
                component: "system".to_string(),
                status: if healthy { ComponentStatus::Healthy } else { ComponentStatus::Degraded },
                message: format!("cpu={cpu_percent:.1}% memory={memory_percent:.1}%"),
                latency_ms: 0.0,
                checked_at: Utc::now(),
            },
        );

        if cpu_percent > self.thresholds.cpu_usage {
            let severity = if cpu_percent < CRITICAL_CEILING_PERCENT { AlertSeverity::Warning } else { AlertSeverity::Critical };
            self.raise_alert(
                "High CPU usage",
                format!("CPU usage at {cpu_percent:.1}%, threshold {}%", self.thresholds.cpu_usage),
                severity,
                "system",
                "resource",
                None,
                None,
            )
            .await;
        }
        if memory_percent > self.thresholds.memory_usage {
            let severity = if memory_percent < CRITICAL_CEILING_PERCENT { AlertSeverity::Warning } else { AlertSeverity::Critical };
            self.raise_alert(
                "High memory usage",
                format!("Memory usage at {memory_percent:.1}%, threshold {}%", self.thresholds.memory_usage),
                severity,
                "system",
                "resource",
                None,
                None,
            )
            .await;
        }
    }

    /// Pings the shared Redis backend and records latency-based health.
    pub async fn check_redis(&self) {
        let result = self.redis.ping().await;
        let (healthy, latency_ms, message) = match result {
            Ok(latency) => {
                let ms = latency.as_secs_f64() * 1000.0;
                (ms < self.thresholds.response_time.max(1000.0), ms, format!("ping {ms:.1}ms"))
            }
            Err(e) => (false, f64::MAX, format!("ping failed: {e}")),
        };

        self.checks.insert(
            "redis".to_string(),
            HealthCheck {
                component: "redis".to_string(),
                status: if healthy { ComponentStatus::Healthy } else { ComponentStatus::Unhealthy },
                message: message.clone(),
                latency_ms,
                checked_at: Utc::now(),
            },
        );

        if !healthy {
            self.raise_alert(
                "Redis backend unhealthy",
                message,
                AlertSeverity::Error,
                "redis",
                "backend",
                None,
                None,
            )
            .await;
        }
    }

    /// Cache manager health is a liveness check only: it is always healthy
    /// once constructed, matching the original's simplified status check.
    pub fn check_cache_manager(&self) {
        self.checks.insert(
            "cache_manager".to_string(),
            HealthCheck {
                component: "cache_manager".to_string(),
                status: ComponentStatus::Healthy,
                message: "cache manager is running".to_string(),
                latency_ms: 0.0,
                checked_at: Utc::now(),
            },
        );
    }

    pub async fn run_health_check(&self, component: Option<&str>) {
        match component {
            Some("system") => self.check_system().await,
            Some("redis") => self.check_redis().await,
            Some("cache_manager") => self.check_cache_manager(),
            Some(_) => {}
            None => {
                self.check_system().await;
                self.check_redis().await;
                self.check_cache_manager();
            }
        }
    }

    pub fn get_checks(&self) -> Vec<HealthCheck> {
        self.checks.iter().map(|e| e.value().clone()).collect()
    }

    pub fn all_healthy(&self) -> bool {
        self.checks.iter().all(|e| matches!(e.status, ComponentStatus::Healthy))
    }

    /// Records a disk-usage sample from the caller. No dependency in the
    /// stack exposes a portable disk-usage reading, so callers feed a
    /// sampled percentage instead of this module sampling it directly.
    pub async fn observe_disk_usage(&self, percent_used: f64) {
        if percent_used > DISK_ALERT_THRESHOLD_PERCENT {
            self.raise_alert(
                "High disk usage",
                format!("Disk usage at {percent_used:.1}%"),
                AlertSeverity::Warning,
                "system",
                "storage",
                None,
                None,
            )
            .await;
        }
    }

    /// Samples aggregate cache hit-ratio and error-rate (both 0-100 scale,
    /// caller-fed since the health monitor has no direct cache-manager
    /// dependency) and raises alerts for threshold breaches.
    pub async fn check_cache_metrics(&self, avg_hit_ratio: f64, avg_error_rate: f64) {
        let healthy = avg_hit_ratio >= self.thresholds.hit_ratio_warning
            && avg_error_rate <= self.thresholds.error_rate_warning;
        self.checks.insert(
            "cache_metrics".to_string(),
            HealthCheck {
                component: "cache_metrics".to_string(),
                status: if healthy { ComponentStatus::Healthy } else { ComponentStatus::Degraded },
                message: format!("hit_ratio={avg_hit_ratio:.1}% error_rate={avg_error_rate:.1}%"),
                latency_ms: 0.0,
                checked_at: Utc::now(),
            },
        );

        if avg_hit_ratio < self.thresholds.hit_ratio_warning {
            let severity = if avg_hit_ratio > self.thresholds.hit_ratio_critical {
                AlertSeverity::Warning
            } else {
                AlertSeverity::Critical
            };
            self.raise_alert(
                "Low cache hit ratio",
                format!("hit ratio at {avg_hit_ratio:.1}%, warning threshold {}%", self.thresholds.hit_ratio_warning),
                severity,
                "cache",
                "hit_ratio",
                None,
                None,
            )
            .await;
        }
        if avg_error_rate > self.thresholds.error_rate_warning {
            let severity = if avg_error_rate < self.thresholds.error_rate_critical {
                AlertSeverity::Warning
            } else {
                AlertSeverity::Critical
            };
            self.raise_alert(
                "High cache error rate",
                format!("error rate at {avg_error_rate:.1}%, warning threshold {}%", self.thresholds.error_rate_warning),
                severity,
                "cache",
                "error_rate",
                None,
                None,
            )
            .await;
        }
    }

    async fn raise_alert(
        &self,
        title: &str,
        message: impl Into<String>,
        severity: AlertSeverity,
        source: &str,
        category: &str,
        tenant_id: Option<String>,
        node_id: Option<String>,
    ) {
        let dedup_key = (source.to_string(), category.to_string());
        let now = self.clock.now();
        if let Some(last) = self.last_alert_at.get(&dedup_key) {
            let within_window = now.saturating_duration_since(*last) < DEDUP_WINDOW;
            let active_match = self
                .alerts
                .read()
                .iter()
                .rev()
                .find(|a| a.is_equivalent(source, category))
                .map_or(false, |a| !a.resolved);
            if within_window && active_match {
                return;
            }
        }
        self.last_alert_at.insert(dedup_key, now);

        let seq = self.next_alert_seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("alert_{seq}");
        let mut alert = Alert::new(id, title, message, severity, source, category);
        alert.tenant_id = tenant_id;
        alert.node_id = node_id;

        if severity == AlertSeverity::Critical {
            self.sink.notify(&alert).await;
        }
        warn!(source, category, severity = ?severity, "alert raised");

        let mut alerts = self.alerts.write();
        alerts.push_back(alert);
        while alerts.len() > MAX_ALERTS {
            alerts.pop_front();
        }
    }

    pub fn acknowledge_alert(&self, id: &str) -> bool {
        let mut alerts = self.alerts.write();
        if let Some(a) = alerts.iter_mut().find(|a| a.id == id) {
            a.acknowledged = true;
            a.acknowledged_at = Some(Utc::now());
            true
        } else {
            false
        }
    }

    pub fn resolve_alert(&self, id: &str) -> bool {
        let mut alerts = self.alerts.write();
        if let Some(a) = alerts.iter_mut().find(|a| a.id == id) {
            a.resolved = true;
            a.resolved_at = Some(Utc::now());
            true
        } else {
            false
        }
    }

    pub fn get_alerts(&self, severity: Option<AlertSeverity>, acknowledged: Option<bool>, limit: usize) -> Vec<Alert> {
        let alerts = self.alerts.read();
        let mut filtered: Vec<Alert> = alerts
            .iter()
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .filter(|a| acknowledged.map_or(true, |ack| a.acknowledged == ack))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        filtered.truncate(limit);
        filtered
    }

    /// Resolves stale `info` alerts and purges alerts older than 24h (§4.5).
    pub fn run_alert_housekeeping(&self) {
        let now = Utc::now();
        let mut alerts = self.alerts.write();
        for a in alerts.iter_mut() {
            if !a.resolved && a.severity == AlertSeverity::Info && now - a.created_at > INFO_AUTO_RESOLVE_AFTER {
                a.resolved = true;
                a.resolved_at = Some(now);
            }
        }
        let before = alerts.len();
        alerts.retain(|a| now - a.created_at <= ALERT_RETENTION);
        let purged = before - alerts.len();
        if purged > 0 {
            info!(purged, "purged alerts older than retention window");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::redis_pool::FakeRedis;

    fn monitor() -> HealthMonitor {
        let clock = Arc::new(TestClock::new());
        let redis = Arc::new(FakeRedis::new(clock.clone()));
        HealthMonitor::new(redis, clock, AlertThresholds::default(), Arc::new(TracingAlertSink))
    }

    #[tokio::test]
    async fn redis_check_marks_healthy_when_ping_succeeds() {
        let m = monitor();
        m.check_redis().await;
        let checks = m.get_checks();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn duplicate_alerts_within_window_are_suppressed() {
        let m = monitor();
        m.observe_disk_usage(95.0).await;
        m.observe_disk_usage(96.0).await;
        assert_eq!(m.get_alerts(None, None, 100).len(), 1);
    }

    #[test]
    fn acknowledge_and_resolve_round_trip() {
        let m = monitor();
        {
            let mut alerts = m.alerts.write();
            alerts.push_back(Alert::new("a1".to_string(), "t", "m", AlertSeverity::Warning, "src", "cat"));
        }
        assert!(m.acknowledge_alert("a1"));
        assert!(m.resolve_alert("a1"));
        assert!(!m.acknowledge_alert("does-not-exist"));
    }
}
