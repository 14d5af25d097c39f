//! Healing agent (§4.6): every 30s, classifies active problems into a
//! closed set and executes a static resolution plan when the estimated
//! success probability clears a bar.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::autoscaler::AutoScaler;
use crate::cache::CacheManager;
use crate::health::{Alert, AlertSeverity, AlertSink};
use crate::loadbalancer::LoadBalancer;

use super::common::AgentMetrics;

pub const INTERVAL: Duration = Duration::from_secs(30);
const MIN_SUCCESS_PROBABILITY: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::enum_variant_names)]
pub enum Problem {
    HighCpu,
    HighMemory,
    RedisConnection,
    SlowResponse,
    LowHitRatio,
    NodeFailure,
    NetworkIssue,
    QuotaExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RestartService,
    ScaleUp,
    ScaleDown,
    ClearCache,
    AdjustQuota,
    SwitchNode,
    OptimizeConfig,
    SendAlert,
}

struct ResolutionPlan {
    /// Lower runs first when several problems are classified in one cycle.
    priority: u8,
    /// When `false`, the plan is only escalated via [`Action::SendAlert`];
    /// its remediation actions never run automatically.
    auto_resolvable: bool,
    /// Consecutive failures tolerated before the problem is escalated
    /// instead of retried.
    max_attempts: u8,
    estimated_success_probability: f64,
    actions: &'static [Action],
}

fn strategy_for(problem: Problem) -> ResolutionPlan {
    match problem {
        Problem::HighCpu => ResolutionPlan {
            priority: 1,
            auto_resolvable: true,
            max_attempts: 3,
            estimated_success_probability: 0.85,
            actions: &[Action::ScaleUp, Action::SendAlert],
        },
        Problem::HighMemory => ResolutionPlan {
            priority: 1,
            auto_resolvable: true,
            max_attempts: 3,
            estimated_success_probability: 0.8,
            actions: &[Action::ClearCache, Action::ScaleUp],
        },
        Problem::RedisConnection => ResolutionPlan {
            priority: 0,
            auto_resolvable: true,
            max_attempts: 5,
            estimated_success_probability: 0.6,
            actions: &[Action::RestartService, Action::SendAlert],
        },
        Problem::SlowResponse => ResolutionPlan {
            priority: 2,
            auto_resolvable: true,
            max_attempts: 3,
            estimated_success_probability: 0.75,
            actions: &[Action::OptimizeConfig, Action::ScaleUp],
        },
        Problem::LowHitRatio => ResolutionPlan {
            priority: 3,
            auto_resolvable: true,
            max_attempts: 2,
            estimated_success_probability: 0.72,
            actions: &[Action::OptimizeConfig],
        },
        Problem::NodeFailure => ResolutionPlan {
            priority: 0,
            auto_resolvable: true,
            max_attempts: 3,
            estimated_success_probability: 0.9,
            actions: &[Action::SwitchNode, Action::SendAlert],
        },
        Problem::NetworkIssue => ResolutionPlan {
            priority: 1,
            auto_resolvable: false,
            max_attempts: 1,
            estimated_success_probability: 0.4,
            actions: &[Action::SendAlert],
        },
        Problem::QuotaExceeded => ResolutionPlan {
            priority: 2,
            auto_resolvable: true,
            max_attempts: 2,
            estimated_success_probability: 0.78,
            actions: &[Action::AdjustQuota, Action::SendAlert],
        },
    }
}

/// Signals the healing agent classifies problems from. Gathering these
/// (from the Health Monitor, Load Balancer and Cache Manager) is the
/// orchestrator's job; the agent only reasons over the snapshot.
pub struct HealthSignals {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub redis_healthy: bool,
    pub avg_response_ms: f64,
    pub worst_tenant_hit_ratio: Option<(String, f64)>,
    pub failed_node_id: Option<String>,
    pub over_quota_tenant: Option<String>,
}

const HIGH_CPU_THRESHOLD: f64 = 85.0;
const HIGH_MEMORY_THRESHOLD: f64 = 90.0;
const SLOW_RESPONSE_MS: f64 = 500.0;
const LOW_HIT_RATIO_THRESHOLD: f64 = 40.0;

fn classify(signals: &HealthSignals) -> Vec<Problem> {
    let mut problems = Vec::new();
    if signals.cpu_percent >= HIGH_CPU_THRESHOLD {
        problems.push(Problem::HighCpu);
    }
    if signals.memory_percent >= HIGH_MEMORY_THRESHOLD {
        problems.push(Problem::HighMemory);
    }
    if !signals.redis_healthy {
        problems.push(Problem::RedisConnection);
    }
    if signals.avg_response_ms >= SLOW_RESPONSE_MS {
        problems.push(Problem::SlowResponse);
    }
    if matches!(&signals.worst_tenant_hit_ratio, Some((_, ratio)) if *ratio < LOW_HIT_RATIO_THRESHOLD) {
        problems.push(Problem::LowHitRatio);
    }
    if signals.failed_node_id.is_some() {
        problems.push(Problem::NodeFailure);
    }
    if signals.over_quota_tenant.is_some() {
        problems.push(Problem::QuotaExceeded);
    }
    problems
}

pub struct HealingAgent {
    autoscaler: Arc<AutoScaler>,
    lb: Arc<LoadBalancer>,
    cache: Arc<CacheManager>,
    alert_sink: Arc<dyn AlertSink>,
    metrics: Mutex<AgentMetrics>,
    attempt_counts: Mutex<HashMap<Problem, u8>>,
}

impl HealingAgent {
    pub fn new(autoscaler: Arc<AutoScaler>, lb: Arc<LoadBalancer>, cache: Arc<CacheManager>, alert_sink: Arc<dyn AlertSink>) -> Self {
        Self {
            autoscaler,
            lb,
            cache,
            alert_sink,
            metrics: Mutex::new(AgentMetrics::default()),
            attempt_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn metrics_snapshot(&self) -> AgentMetrics {
        self.metrics.lock().clone()
    }

    /// Classifies problems, then resolves them highest-priority (lowest
    /// `priority` number) first. A problem whose plan isn't
    /// `auto_resolvable` only ever raises its alert action; one that has
    /// already failed `max_attempts` times in a row is escalated instead of
    /// retried again.
    pub async fn run_cycle(&self, signals: HealthSignals) {
        let mut problems = classify(&signals);
        if problems.is_empty() {
            self.metrics.lock().record_idle();
            return;
        }
        problems.sort_by_key(|p| strategy_for(*p).priority);

        for problem in problems {
            let plan = strategy_for(problem);
            if plan.estimated_success_probability < MIN_SUCCESS_PROBABILITY {
                warn!(?problem, probability = plan.estimated_success_probability, "skipping low-confidence plan");
                continue;
            }

            let attempts = *self.attempt_counts.lock().get(&problem).unwrap_or(&0);
            if attempts >= plan.max_attempts {
                warn!(?problem, attempts, max_attempts = plan.max_attempts, "max resolution attempts exceeded, escalating");
                let _ = self.execute_action(Action::SendAlert, problem, &signals).await;
                continue;
            }

            let actions: &[Action] = if plan.auto_resolvable {
                plan.actions
            } else {
                &[Action::SendAlert]
            };
            let outcome = self.execute_plan(problem, actions, &signals).await;
            let mut m = self.metrics.lock();
            let mut counts = self.attempt_counts.lock();
            match outcome {
                Ok(()) => {
                    counts.remove(&problem);
                    m.record_success();
                }
                Err(e) => {
                    *counts.entry(problem).or_insert(0) += 1;
                    m.record_failure(e);
                }
            }
        }
    }

    async fn execute_plan(&self, problem: Problem, actions: &[Action], signals: &HealthSignals) -> Result<(), String> {
        for action in actions {
            self.execute_action(*action, problem, signals).await.map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    async fn execute_action(&self, action: Action, problem: Problem, signals: &HealthSignals) -> crate::error::Result<()> {
        match action {
            Action::RestartService => {
                info!(?problem, "restart_service action (no-op: no service registry in scope)");
                Ok(())
            }
            Action::ScaleUp => {
                let target = self.autoscaler.current_nodes() + 1;
                let decision = self.autoscaler.force_scale(target)?;
                self.autoscaler.execute(decision).await?;
                Ok(())
            }
            Action::ScaleDown => {
                let target = self.autoscaler.current_nodes().saturating_sub(1);
                let decision = self.autoscaler.force_scale(target)?;
                self.autoscaler.execute(decision).await?;
                Ok(())
            }
            Action::ClearCache => {
                if let Some((tenant_id, _)) = &signals.worst_tenant_hit_ratio {
                    self.cache.clear_tenant(tenant_id).await?;
                }
                Ok(())
            }
            Action::AdjustQuota => {
                if let Some(tenant_id) = &signals.over_quota_tenant {
                    if let Some(tenant) = self.cache.get_tenant(tenant_id) {
                        let bumped = (tenant.quotas.memory_limit_mb as f64 * 1.2).round() as u64;
                        self.cache.modify_tenant_quotas(tenant_id, Some(bumped), None)?;
                    }
                }
                Ok(())
            }
            Action::SwitchNode => {
                if let Some(node_id) = &signals.failed_node_id {
                    self.lb.mark_offline(node_id);
                }
                Ok(())
            }
            Action::OptimizeConfig => {
                info!(?problem, "optimize_config action (delegated to optimization agent's next pass)");
                Ok(())
            }
            Action::SendAlert => {
                let alert = Alert::new(
                    format!("healing-{problem:?}"),
                    format!("{problem:?}"),
                    "raised by healing agent",
                    AlertSeverity::Warning,
                    "healing_agent",
                    "auto_remediation",
                );
                self.alert_sink.notify(&alert).await;
                Ok(())
            }
        }
    }
}
