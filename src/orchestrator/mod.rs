//! Orchestrator (C8): boots C2-C7 in dependency order, owns the
//! command-dispatch surface, and aggregates a `SystemStatus`.
//!
//! Cross-component cyclic references (orchestrator <-> cache manager <->
//! agents) are broken by unidirectional ownership: the orchestrator holds
//! every collaborator behind an `Arc`; agents only see the narrow
//! capability (`AutoScaler`, `CacheManager`, `LoadBalancer`) they need.

pub mod command;
pub mod status;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use command::{Command, CommandResponse, ScaleAction};
pub use status::{AgentHealth, SystemStatus};

use crate::agents::{healing::HealthSignals, HealingAgent, OptimizationAgent, PredictionAgent, ScalingAgent};
use crate::autoscaler::{AggregateMetrics, AutoScaler};
use crate::cache::{BackupSnapshot, CacheManager, NewTenant};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::health::{AlertSeverity, AlertSink, HealthMonitor};
use crate::loadbalancer::LoadBalancer;
use crate::redis_pool::RedisBackend;

const STATUS_INTERVAL: Duration = Duration::from_secs(10);
const ALERT_MANAGER_INTERVAL: Duration = Duration::from_secs(60);
const SYSTEM_HEALTH_INTERVAL: Duration = Duration::from_secs(30);
const REDIS_HEALTH_INTERVAL: Duration = Duration::from_secs(10);

pub struct Orchestrator {
    config: Config,
    clock: Arc<dyn Clock>,
    cache: Arc<CacheManager>,
    lb: Arc<LoadBalancer>,
    health: Arc<HealthMonitor>,
    autoscaler: Arc<AutoScaler>,
    scaling_agent: Arc<ScalingAgent>,
    optimization_agent: Arc<OptimizationAgent>,
    healing_agent: Arc<HealingAgent>,
    prediction_agent: Arc<PredictionAgent>,
    started_at: std::time::Instant,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    last_status: Arc<parking_lot::RwLock<Option<SystemStatus>>>,
}

impl Orchestrator {
    /// Boots C2 (implicitly, via the injected backend) through C7 in
    /// dependency order: Redis backend -> Cache Manager / Load Balancer ->
    /// Health Monitor / Auto-Scaler -> Agents.
    pub fn new(config: Config, redis: Arc<dyn RedisBackend>, clock: Arc<dyn Clock>, alert_sink: Arc<dyn AlertSink>) -> Self {
        let cache = Arc::new(CacheManager::new(redis.clone(), clock.clone(), config.tenants.clone()));
        let lb = Arc::new(LoadBalancer::new(redis.clone(), clock.clone()));
        let health = Arc::new(HealthMonitor::new(redis, clock.clone(), config.monitoring.alert_thresholds.clone(), alert_sink.clone()));
        let autoscaler = Arc::new(AutoScaler::new(config.scaling.clone(), clock.clone(), lb.clone()));

        let scaling_agent = Arc::new(ScalingAgent::new(autoscaler.clone()));
        let optimization_agent = Arc::new(OptimizationAgent::new(cache.clone()));
        let healing_agent = Arc::new(HealingAgent::new(autoscaler.clone(), lb.clone(), cache.clone(), alert_sink));
        let prediction_agent = Arc::new(PredictionAgent::new());

        Self {
            config,
            clock: clock.clone(),
            cache,
            lb,
            health,
            autoscaler,
            scaling_agent,
            optimization_agent,
            healing_agent,
            prediction_agent,
            started_at: clock.now(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            tasks: std::sync::Mutex::new(Vec::new()),
            last_status: Arc::new(parking_lot::RwLock::new(None)),
        }
    }

    /// Spawns the ten named background loops (§5: 4 agents + status +
    /// performance collector + alert manager + LB health + 2 health-monitor
    /// loops), each with its own cycle interval and cooperative
    /// cancellation via the shared `running` flag / `shutdown` notifier.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("orchestrator starting background loops");
        let mut tasks = self.tasks.lock().unwrap();

        tasks.push(self.spawn_loop("scaling_agent", crate::agents::scaling::INTERVAL, {
            let scaling_agent = self.scaling_agent.clone();
            let cache = self.cache.clone();
            let autoscaler = self.autoscaler.clone();
            let health = self.health.clone();
            let lb = self.lb.clone();
            move || {
                let scaling_agent = scaling_agent.clone();
                let cache = cache.clone();
                let autoscaler = autoscaler.clone();
                let health = health.clone();
                let lb = lb.clone();
                async move {
                    let metrics = Self::aggregate_cache_metrics(&cache);
                    let obs = crate::agents::scaling::ScalingObservation {
                        metrics: AggregateMetrics {
                            cpu: health.cpu_percent(),
                            memory: health.memory_percent(),
                            request_rate: metrics.total_requests_per_sec,
                        },
                        hit_ratio: metrics.avg_hit_ratio,
                        active_connections: lb.total_active_connections(),
                        current_nodes: autoscaler.current_nodes(),
                    };
                    scaling_agent.run_cycle(obs).await;
                }
            }
        }));

        tasks.push(self.spawn_loop("optimization_agent", crate::agents::optimization::INTERVAL, {
            let optimization_agent = self.optimization_agent.clone();
            move || {
                let optimization_agent = optimization_agent.clone();
                async move { optimization_agent.run_cycle() }
            }
        }));

        tasks.push(self.spawn_loop("healing_agent", crate::agents::healing::INTERVAL, {
            let healing_agent = self.healing_agent.clone();
            let health = self.health.clone();
            let cache = self.cache.clone();
            let lb = self.lb.clone();
            move || {
                let healing_agent = healing_agent.clone();
                let health = health.clone();
                let cache = cache.clone();
                let lb = lb.clone();
                async move {
                    let signals = HealthSignals {
                        cpu_percent: health.cpu_percent(),
                        memory_percent: health.memory_percent(),
                        redis_healthy: health.all_healthy(),
                        avg_response_ms: lb.average_response_time_ms(),
                        worst_tenant_hit_ratio: Self::worst_tenant_hit_ratio(&cache),
                        failed_node_id: lb.list_nodes().into_iter().find(|n| !n.is_healthy()).map(|n| n.id),
                        over_quota_tenant: Self::over_quota_tenant(&cache),
                    };
                    healing_agent.run_cycle(signals).await;
                }
            }
        }));

        tasks.push(self.spawn_loop("prediction_agent", crate::agents::prediction::INTERVAL, {
            let prediction_agent = self.prediction_agent.clone();
            let cache = self.cache.clone();
            move || {
                let prediction_agent = prediction_agent.clone();
                let cache = cache.clone();
                async move {
                    let metrics = Self::aggregate_cache_metrics(&cache);
                    prediction_agent.observe("system", "request_rate", metrics.total_requests_per_sec);
                    for tenant in cache.list_tenants() {
                        if let Some(m) = cache.get_tenant_metrics(&tenant.id) {
                            prediction_agent.observe(&tenant.id, "hit_ratio", m.hit_ratio());
                            prediction_agent.observe(&tenant.id, "request_rate", tenant.usage.current_requests_per_second);
                        }
                    }
                }
            }
        }));

        tasks.push(self.spawn_loop("system_health", SYSTEM_HEALTH_INTERVAL, {
            let health = self.health.clone();
            let cache = self.cache.clone();
            move || {
                let health = health.clone();
                let cache = cache.clone();
                async move {
                    health.check_system().await;
                    let metrics = Self::aggregate_cache_metrics(&cache);
                    health.check_cache_metrics(metrics.avg_hit_ratio, metrics.avg_error_rate).await;
                }
            }
        }));

        tasks.push(self.spawn_loop("redis_health", REDIS_HEALTH_INTERVAL, {
            let health = self.health.clone();
            move || {
                let health = health.clone();
                async move { health.check_redis().await }
            }
        }));

        tasks.push(self.spawn_loop("lb_health", Duration::from_secs(self.config.monitoring.health_check_interval), {
            let lb = self.lb.clone();
            move || {
                let lb = lb.clone();
                async move { lb.run_health_check_once().await }
            }
        }));

        tasks.push(self.spawn_loop("alert_manager", ALERT_MANAGER_INTERVAL, {
            let health = self.health.clone();
            move || {
                let health = health.clone();
                async move { health.run_alert_housekeeping() }
            }
        }));

        let metrics_interval = self.config.monitoring.metrics_interval;
        tasks.push(self.spawn_loop("performance_collector", Duration::from_secs(metrics_interval), {
            let lb = self.lb.clone();
            let cache = self.cache.clone();
            let health = self.health.clone();
            move || {
                let lb = lb.clone();
                let cache = cache.clone();
                let health = health.clone();
                async move {
                    lb.tune_connection_limits();
                    let metrics = Self::aggregate_cache_metrics(&cache);
                    let snapshot = json!({
                        "total_requests_per_sec": metrics.total_requests_per_sec,
                        "avg_hit_ratio": metrics.avg_hit_ratio,
                        "avg_error_rate": metrics.avg_error_rate,
                        "cpu_percent": health.cpu_percent(),
                        "memory_percent": health.memory_percent(),
                        "sampled_at": chrono::Utc::now(),
                    });
                    if let Err(e) = cache.write_system_metrics_snapshot(&snapshot, metrics_interval * 2).await {
                        warn!(error = %e, "failed to persist system metrics snapshot");
                    }
                }
            }
        }));

        tasks.push(self.spawn_loop("system_status", STATUS_INTERVAL, {
            let cache = self.cache.clone();
            let lb = self.lb.clone();
            let health = self.health.clone();
            let scaling_agent = self.scaling_agent.clone();
            let optimization_agent = self.optimization_agent.clone();
            let healing_agent = self.healing_agent.clone();
            let prediction_agent = self.prediction_agent.clone();
            let config = self.config.clone();
            let clock = self.clock.clone();
            let started_at = self.started_at;
            let last_status = self.last_status.clone();
            move || {
                let cache = cache.clone();
                let lb = lb.clone();
                let health = health.clone();
                let scaling_agent = scaling_agent.clone();
                let optimization_agent = optimization_agent.clone();
                let healing_agent = healing_agent.clone();
                let prediction_agent = prediction_agent.clone();
                let config = config.clone();
                let clock = clock.clone();
                let last_status = last_status.clone();
                async move {
                    let status = Self::compute_system_status(
                        &cache,
                        &lb,
                        &health,
                        &scaling_agent,
                        &optimization_agent,
                        &healing_agent,
                        &prediction_agent,
                        &config,
                        clock.now().saturating_duration_since(started_at).as_secs(),
                    );
                    info!(
                        tenants = status.total_tenants,
                        online_nodes = status.online_nodes,
                        "system status tick"
                    );
                    *last_status.write() = Some(status);
                }
            }
        }));
    }

    /// Most recently computed [`SystemStatus`] snapshot, refreshed by the
    /// `system_status` background loop every [`STATUS_INTERVAL`].
    pub fn cached_status(&self) -> Option<SystemStatus> {
        self.last_status.read().clone()
    }

    fn spawn_loop<F, Fut>(&self, name: &'static str, interval: Duration, mut make_future: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let running = self.running.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => {
                        make_future().await;
                    }
                    _ = shutdown.notified() => break,
                }
            }
            info!(loop_name = name, "background loop stopped");
        })
    }

    /// `(tenant_id, hit_ratio)` for the tenant with the lowest observed hit
    /// ratio, used as the Healing agent's `low_hit_ratio` signal.
    fn worst_tenant_hit_ratio(cache: &CacheManager) -> Option<(String, f64)> {
        cache
            .list_tenants()
            .iter()
            .filter_map(|t| cache.get_tenant_metrics(&t.id).map(|m| (t.id.clone(), m.hit_ratio())))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// First tenant whose running memory usage has crept past its quota.
    fn over_quota_tenant(cache: &CacheManager) -> Option<String> {
        cache
            .list_tenants()
            .into_iter()
            .find(|t| t.usage.current_memory_mb > t.quotas.memory_limit_mb as f64)
            .map(|t| t.id)
    }

    fn aggregate_cache_metrics(cache: &CacheManager) -> AggregateCacheMetrics {
        let tenants = cache.list_tenants();
        let mut total_requests_per_sec = 0.0;
        let mut hit_ratio_sum = 0.0;
        let mut error_rate_sum = 0.0;
        let mut count = 0usize;
        for t in &tenants {
            if let Some(m) = cache.get_tenant_metrics(&t.id) {
                total_requests_per_sec += t.usage.current_requests_per_second;
                hit_ratio_sum += m.hit_ratio();
                error_rate_sum += m.error_rate();
                count += 1;
            }
        }
        AggregateCacheMetrics {
            total_requests_per_sec,
            avg_hit_ratio: if count > 0 { hit_ratio_sum / count as f64 } else { 0.0 },
            avg_error_rate: if count > 0 { error_rate_sum / count as f64 } else { 0.0 },
        }
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_waiters();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
        info!("orchestrator stopped");
    }

    pub async fn shutdown(&self) {
        self.stop().await;
    }

    pub fn system_status(&self) -> SystemStatus {
        Self::compute_system_status(
            &self.cache,
            &self.lb,
            &self.health,
            &self.scaling_agent,
            &self.optimization_agent,
            &self.healing_agent,
            &self.prediction_agent,
            &self.config,
            self.clock.now().saturating_duration_since(self.started_at).as_secs(),
        )
    }

    /// Pure aggregation, callable from both [`Self::system_status`] and the
    /// `system_status` background loop's closure (which only holds cloned
    /// `Arc`s, not `&self`).
    #[allow(clippy::too_many_arguments)]
    fn compute_system_status(
        cache: &CacheManager,
        lb: &LoadBalancer,
        health: &HealthMonitor,
        scaling_agent: &ScalingAgent,
        optimization_agent: &OptimizationAgent,
        healing_agent: &HealingAgent,
        prediction_agent: &PredictionAgent,
        config: &Config,
        uptime_secs: u64,
    ) -> SystemStatus {
        let tenants = cache.list_tenants();
        let nodes = lb.list_nodes();
        let alerts = health.get_alerts(None, None, 1000);
        SystemStatus {
            platform_version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            environment: format!("{:?}", config.environment),
            component_checks: health.get_checks(),
            agent_checks: vec![
                Self::agent_health("scaling", &scaling_agent.metrics_snapshot()),
                Self::agent_health("optimization", &optimization_agent.metrics_snapshot()),
                Self::agent_health("healing", &healing_agent.metrics_snapshot()),
                Self::agent_health("prediction", &prediction_agent.metrics_snapshot()),
            ],
            total_tenants: tenants.len(),
            active_tenants: tenants.iter().filter(|t| t.is_active()).count(),
            total_nodes: nodes.len(),
            online_nodes: lb.online_node_count(),
            aggregate_cpu_percent: health.cpu_percent(),
            aggregate_memory_percent: health.memory_percent(),
            total_requests_per_sec: Self::aggregate_cache_metrics(cache).total_requests_per_sec,
            avg_response_time_ms: lb.average_response_time_ms(),
            active_alerts: alerts.iter().filter(|a| !a.resolved).count(),
            critical_alerts: alerts.iter().filter(|a| a.severity == AlertSeverity::Critical && !a.resolved).count(),
            generated_at: chrono::Utc::now(),
        }
    }

    fn agent_health(name: &str, m: &crate::agents::AgentMetrics) -> AgentHealth {
        AgentHealth {
            name: name.to_string(),
            total_decisions: m.total_decisions,
            successful_decisions: m.successful_decisions,
            failed_decisions: m.failed_decisions,
            error_count: m.error_count,
        }
    }

    /// Dispatches one command. Unknown variants cannot reach here: parsing
    /// rejects them in [`command::from_name_params`].
    pub async fn execute(&self, cmd: Command) -> CommandResponse {
        match self.dispatch(cmd).await {
            Ok(payload) => CommandResponse::ok(payload),
            Err(e) => {
                warn!(error = %e, "command failed");
                CommandResponse::err(&e)
            }
        }
    }

    async fn dispatch(&self, cmd: Command) -> Result<Value> {
        match cmd {
            Command::CreateTenant { name, quota_memory_mb, quota_requests_per_second, quota_connections } => {
                let tenant = self.cache.create_tenant(NewTenant {
                    id: name.clone(),
                    name,
                    memory_limit_mb: quota_memory_mb,
                    requests_per_second: quota_requests_per_second,
                    max_connections: quota_connections,
                }).await?;
                Ok(serde_json::to_value(tenant).map_err(PlatformError::from)?)
            }
            Command::DeleteTenant { name } => {
                self.cache.delete_tenant(&name).await?;
                Ok(json!({}))
            }
            Command::ListTenants => Ok(serde_json::to_value(self.cache.list_tenants()).map_err(PlatformError::from)?),
            Command::GetTenantDetails { name } => {
                let tenant = self.cache.get_tenant(&name).ok_or_else(|| PlatformError::NotFound(name))?;
                Ok(serde_json::to_value(tenant).map_err(PlatformError::from)?)
            }
            Command::ModifyTenantQuotas { name, quota_memory_mb, quota_requests_per_second } => {
                let tenant = self.cache.modify_tenant_quotas(&name, quota_memory_mb, quota_requests_per_second)?;
                Ok(serde_json::to_value(tenant).map_err(PlatformError::from)?)
            }
            Command::CacheGet { tenant, key } => Ok(self.cache.get(&tenant, &key).await?.unwrap_or(Value::Null)),
            Command::CacheSet { tenant, key, value, ttl } => {
                self.cache.set(&tenant, &key, value, ttl).await?;
                Ok(json!({}))
            }
            Command::CacheDelete { tenant, key } => {
                self.cache.delete(&tenant, &key).await?;
                Ok(json!({}))
            }
            Command::GetMetrics { tenant, limit: _ } => {
                if tenant == "all" {
                    let all: Vec<_> = self
                        .cache
                        .list_tenants()
                        .iter()
                        .filter_map(|t| self.cache.get_tenant_metrics(&t.id).map(|m| (t.id.clone(), m)))
                        .collect();
                    Ok(serde_json::to_value(all).map_err(PlatformError::from)?)
                } else {
                    let metrics = self.cache.get_tenant_metrics(&tenant).ok_or_else(|| PlatformError::NotFound(tenant))?;
                    Ok(serde_json::to_value(metrics).map_err(PlatformError::from)?)
                }
            }
            Command::GetClusterStatus => Ok(serde_json::to_value(self.lb.list_nodes()).map_err(PlatformError::from)?),
            Command::ScaleCluster { action, nodes } => {
                let current = self.autoscaler.current_nodes();
                let target = match action {
                    ScaleAction::Up => current + nodes,
                    ScaleAction::Down => current.saturating_sub(nodes),
                };
                let decision = self.autoscaler.force_scale(target)?;
                let executed = self.autoscaler.execute(decision).await?;
                Ok(json!({ "current_nodes": executed.target_nodes }))
            }
            Command::GetScalingStatus => Ok(json!({
                "current_nodes": self.autoscaler.current_nodes(),
                "history": self.autoscaler.history(),
                "prediction": self.autoscaler.scaling_prediction(),
            })),
            Command::ConfigureScaling {
                min_nodes,
                max_nodes,
                scale_up_threshold,
                scale_down_threshold,
                scale_up_cooldown,
                scale_down_cooldown,
            } => {
                let cfg = self.autoscaler.configure(|c| {
                    if let Some(v) = min_nodes {
                        c.min_nodes = v;
                    }
                    if let Some(v) = max_nodes {
                        c.max_nodes = v;
                    }
                    if let Some(v) = scale_up_threshold {
                        c.scale_up_threshold = v;
                    }
                    if let Some(v) = scale_down_threshold {
                        c.scale_down_threshold = v;
                    }
                    if let Some(v) = scale_up_cooldown {
                        c.scale_up_cooldown = v;
                    }
                    if let Some(v) = scale_down_cooldown {
                        c.scale_down_cooldown = v;
                    }
                });
                Ok(json!({
                    "min_nodes": cfg.min_nodes,
                    "max_nodes": cfg.max_nodes,
                    "scale_up_threshold": cfg.scale_up_threshold,
                    "scale_down_threshold": cfg.scale_down_threshold,
                    "scale_up_cooldown": cfg.scale_up_cooldown,
                    "scale_down_cooldown": cfg.scale_down_cooldown,
                }))
            }
            Command::AcknowledgeAlert { alert_id } => {
                if self.health.acknowledge_alert(&alert_id) {
                    Ok(json!({}))
                } else {
                    Err(PlatformError::NotFound(format!("alert {alert_id} not found")))
                }
            }
            Command::ResolveAlert { alert_id } => {
                if self.health.resolve_alert(&alert_id) {
                    Ok(json!({}))
                } else {
                    Err(PlatformError::NotFound(format!("alert {alert_id} not found")))
                }
            }
            Command::CreateBackup { tenant } => {
                let snapshot = self.cache.backup_tenant(&tenant).await?;
                Ok(serde_json::to_value(snapshot).map_err(PlatformError::from)?)
            }
            Command::RestoreBackup { tenant, snapshot } => {
                let snapshot: BackupSnapshot = serde_json::from_value(snapshot).map_err(PlatformError::from)?;
                self.cache.restore_tenant(&tenant, &snapshot).await?;
                Ok(json!({}))
            }
            Command::HealthCheck => {
                self.health.run_health_check(None).await;
                Ok(serde_json::to_value(self.health.get_checks()).map_err(PlatformError::from)?)
            }
            Command::LoadTest { duration_secs, concurrency } => {
                let summary = self.run_load_test(duration_secs, concurrency).await;
                Ok(summary)
            }
        }
    }

    /// Synthetic load generator (§6 `load_test`): issues `concurrency`
    /// parallel get/set loops against a scratch tenant for `duration_secs`
    /// and reports throughput and latency.
    async fn run_load_test(&self, duration_secs: u64, concurrency: u32) -> Value {
        let tenant_id = "__load_test__";
        if self.cache.get_tenant(tenant_id).is_none() {
            let _ = self.cache.create_tenant(NewTenant {
                id: tenant_id.to_string(),
                name: "load test".to_string(),
                memory_limit_mb: 64,
                requests_per_second: 1_000_000,
                max_connections: 1000,
            }).await;
        }

        let deadline = self.clock.now() + Duration::from_secs(duration_secs);
        let started = self.clock.now();
        let mut handles = Vec::with_capacity(concurrency as usize);
        for worker in 0..concurrency {
            let cache = self.cache.clone();
            let clock = self.clock.clone();
            handles.push(tokio::spawn(async move {
                let mut sent = 0u64;
                let mut total_latency_ms = 0.0;
                let mut i = 0u64;
                while clock.now() < deadline {
                    let key = format!("w{worker}-{i}");
                    let start = clock.now();
                    let _ = cache.set(tenant_id, &key, json!(i), Some(60)).await;
                    total_latency_ms += clock.now().saturating_duration_since(start).as_secs_f64() * 1000.0;
                    sent += 1;
                    i += 1;
                }
                (sent, total_latency_ms)
            }));
        }

        let mut total_sent = 0u64;
        let mut total_latency_ms = 0.0;
        for handle in handles {
            if let Ok((sent, latency)) = handle.await {
                total_sent += sent;
                total_latency_ms += latency;
            }
        }
        let elapsed = self.clock.now().saturating_duration_since(started).as_secs_f64().max(1e-6);
        json!({
            "requests_sent": total_sent,
            "duration_secs": elapsed,
            "throughput_rps": total_sent as f64 / elapsed,
            "avg_latency_ms": if total_sent > 0 { total_latency_ms / total_sent as f64 } else { 0.0 },
        })
    }
}

struct AggregateCacheMetrics {
    total_requests_per_sec: f64,
    avg_hit_ratio: f64,
    avg_error_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::health::TracingAlertSink;
    use crate::redis_pool::FakeRedis;

    fn orchestrator() -> Orchestrator {
        let clock = Arc::new(TestClock::new());
        let redis: Arc<dyn RedisBackend> = Arc::new(FakeRedis::new(clock.clone()));
        Orchestrator::new(Config::default(), redis, clock, Arc::new(TracingAlertSink))
    }

    #[tokio::test]
    async fn unknown_command_is_rejected_in_one_place() {
        let err = command::from_name_params("not_a_command", json!({})).unwrap_err();
        assert_eq!(err.code(), "unknown_command");
    }

    #[tokio::test]
    async fn create_then_get_tenant_round_trips() {
        let orch = orchestrator();
        let cmd = command::from_name_params(
            "create_tenant",
            json!({"name": "acme", "quota_memory_mb": 512, "quota_requests_per_second": 100, "quota_connections": 10}),
        )
        .unwrap();
        let resp = orch.execute(cmd).await;
        assert!(resp.ok);

        let cmd = command::from_name_params("get_tenant_details", json!({"name": "acme"})).unwrap();
        let resp = orch.execute(cmd).await;
        assert!(resp.ok);
    }

    #[tokio::test]
    async fn start_and_stop_is_idempotent() {
        let orch = orchestrator();
        orch.start();
        orch.start();
        orch.stop().await;
        orch.stop().await;
    }
}
