//! Auto-Scaler (C6): threshold + cooldown scaling decisions over the node
//! set, with bounded decision history.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::config::ScalingConfig;
use crate::error::{PlatformError, Result};
use crate::loadbalancer::{LoadBalancer, Node};

const MAX_HISTORY: usize = 100;
const BASE_RATE_PER_NODE: f64 = 1000.0;
const PREDICTION_WINDOW: usize = 120;
const PREDICTION_MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    ScaleUp,
    ScaleDown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub id: u64,
    pub agent_id: String,
    pub decision_type: DecisionType,
    pub current_nodes: u32,
    pub target_nodes: u32,
    pub reason: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub request_rate: f64,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub executed: bool,
    pub successful: Option<bool>,
}

/// Aggregate metrics an auto-scaling decision is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct AggregateMetrics {
    pub cpu: f64,
    pub memory: f64,
    pub request_rate: f64,
}

/// Naive trend direction derived from recent performance history, as
/// distinct from the scaling agent's regressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictedScaling {
    None,
    ScaleUp,
    ScaleDown,
}

/// Running-average signal over the last [`PREDICTION_WINDOW`] observed
/// metrics, independent of any node-count decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScalingPrediction {
    pub predicted_scaling: PredictedScaling,
    pub confidence: f64,
    pub avg_cpu: f64,
    pub avg_memory: f64,
    pub avg_request_rate: f64,
}

pub struct AutoScaler {
    config: RwLock<ScalingConfig>,
    clock: Arc<dyn Clock>,
    lb: Arc<LoadBalancer>,
    current_nodes: AtomicU64,
    last_scale_up: Mutex<Option<std::time::Instant>>,
    last_scale_down: Mutex<Option<std::time::Instant>>,
    history: RwLock<VecDeque<ScalingDecision>>,
    next_id: AtomicU64,
    performance_history: RwLock<VecDeque<AggregateMetrics>>,
}

impl AutoScaler {
    pub fn new(config: ScalingConfig, clock: Arc<dyn Clock>, lb: Arc<LoadBalancer>) -> Self {
        let initial = config.min_nodes as u64;
        Self {
            config: RwLock::new(config),
            clock,
            lb,
            current_nodes: AtomicU64::new(initial),
            last_scale_up: Mutex::new(None),
            last_scale_down: Mutex::new(None),
            history: RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            performance_history: RwLock::new(VecDeque::new()),
        }
    }

    pub fn current_nodes(&self) -> u32 {
        self.current_nodes.load(Ordering::Relaxed) as u32
    }

    pub fn configure(&self, f: impl FnOnce(&mut ScalingConfig)) -> ScalingConfig {
        let mut cfg = self.config.write();
        f(&mut cfg);
        cfg.clone()
    }

    pub fn config_snapshot(&self) -> ScalingConfig {
        self.config.read().clone()
    }

    /// Evaluates the decision rule against `m`. Returns `None` when a
    /// cooldown is active or no threshold is crossed.
    pub fn decide(&self, m: AggregateMetrics) -> Option<ScalingDecision> {
        {
            let mut history = self.performance_history.write();
            history.push_back(m);
            while history.len() > PREDICTION_WINDOW {
                history.pop_front();
            }
        }

        let cfg = self.config.read();
        if !cfg.enabled {
            return None;
        }
        let now = self.clock.now();
        let current = self.current_nodes();

        let up_cooldown_active = self
            .last_scale_up
            .lock()
            .map(|t| now.saturating_duration_since(t) < Duration::from_secs(cfg.scale_up_cooldown))
            .unwrap_or(false);
        let down_cooldown_active = self
            .last_scale_down
            .lock()
            .map(|t| now.saturating_duration_since(t) < Duration::from_secs(cfg.scale_down_cooldown))
            .unwrap_or(false);
        if up_cooldown_active || down_cooldown_active {
            return None;
        }

        let base_load = BASE_RATE_PER_NODE * current as f64;
        let should_scale_up = current < cfg.max_nodes
            && (m.cpu >= cfg.scale_up_threshold || m.memory >= cfg.scale_up_threshold || m.request_rate >= base_load);
        if should_scale_up {
            let target = (current + 1).min(cfg.max_nodes);
            return Some(self.new_decision(DecisionType::ScaleUp, current, target, m, "threshold breach"));
        }

        let should_scale_down = current > cfg.min_nodes
            && m.cpu < cfg.scale_down_threshold
            && m.memory < cfg.scale_down_threshold
            && m.request_rate < 0.5 * base_load;
        if should_scale_down {
            let target = (current - 1).max(cfg.min_nodes);
            return Some(self.new_decision(DecisionType::ScaleDown, current, target, m, "sustained low load"));
        }

        None
    }

    fn new_decision(
        &self,
        decision_type: DecisionType,
        current: u32,
        target: u32,
        m: AggregateMetrics,
        reason: &str,
    ) -> ScalingDecision {
        ScalingDecision {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            agent_id: "autoscaler".to_string(),
            decision_type,
            current_nodes: current,
            target_nodes: target,
            reason: reason.to_string(),
            cpu_usage: m.cpu,
            memory_usage: m.memory,
            request_rate: m.request_rate,
            created_at: Utc::now(),
            executed_at: None,
            executed: false,
            successful: None,
        }
    }

    /// Runs the decision's node-count change through the load balancer.
    /// Scale-up provisions a new node and adds it; scale-down drains and
    /// removes the highest-numbered node. Aborts without rollback on the
    /// first failed step (add/remove is idempotent).
    pub async fn execute(&self, mut decision: ScalingDecision) -> Result<ScalingDecision> {
        let result = match decision.decision_type {
            DecisionType::ScaleUp => self.execute_scale_up(&decision).await,
            DecisionType::ScaleDown => self.execute_scale_down(&decision).await,
        };

        decision.executed = true;
        decision.executed_at = Some(Utc::now());
        decision.successful = Some(result.is_ok());

        if result.is_ok() {
            self.current_nodes.store(decision.target_nodes as u64, Ordering::Relaxed);
            let now = self.clock.now();
            match decision.decision_type {
                DecisionType::ScaleUp => *self.last_scale_up.lock() = Some(now),
                DecisionType::ScaleDown => *self.last_scale_down.lock() = Some(now),
            }
        }
        info!(id = decision.id, ?decision.decision_type, success = result.is_ok(), "scaling decision executed");

        let mut history = self.history.write();
        history.push_back(decision.clone());
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }

        result?;
        Ok(decision)
    }

    async fn execute_scale_up(&self, decision: &ScalingDecision) -> Result<()> {
        let id = format!("node-{}", decision.target_nodes);
        let node = Node::new(id, "127.0.0.1", 6379);
        self.lb.add_node(node)?;
        self.lb.rebalance_connections()?;
        self.verify_cluster_health().await
    }

    /// Scales down by first marking the victim offline, which removes it
    /// from `select()`'s healthy set immediately, then draining and
    /// removing it. All tenant data lives in the one shared Redis backend
    /// rather than being partitioned per node, so there is no keyspace to
    /// physically copy; taking the node out of routing before the drain is
    /// this architecture's equivalent of migrating its workload off.
    async fn execute_scale_down(&self, decision: &ScalingDecision) -> Result<()> {
        let id = format!("node-{}", decision.current_nodes);
        self.lb.mark_offline(&id);
        self.lb.remove_node(&id).await?;
        self.lb.rebalance_connections()?;
        self.verify_cluster_health().await
    }

    /// Re-probes every remaining node and fails the decision if none come
    /// back healthy, mirroring the post-scale health check the load
    /// balancer already performs on its own interval.
    async fn verify_cluster_health(&self) -> Result<()> {
        self.lb.run_health_check_once().await;
        if self.lb.online_node_count() == 0 {
            return Err(PlatformError::Unavailable(
                "cluster health check failed after scaling".to_string(),
            ));
        }
        Ok(())
    }

    pub fn force_scale(&self, target: u32) -> Result<ScalingDecision> {
        let cfg = self.config.read();
        if target < cfg.min_nodes || target > cfg.max_nodes {
            return Err(PlatformError::InvalidArgument(format!(
                "target {target} outside [{}, {}]",
                cfg.min_nodes, cfg.max_nodes
            )));
        }
        let current = self.current_nodes();
        drop(cfg);
        let decision_type = if target >= current { DecisionType::ScaleUp } else { DecisionType::ScaleDown };
        Ok(self.new_decision(
            decision_type,
            current,
            target,
            AggregateMetrics { cpu: 0.0, memory: 0.0, request_rate: 0.0 },
            "manual",
        ))
    }

    pub fn history(&self) -> Vec<ScalingDecision> {
        self.history.read().iter().cloned().collect()
    }

    /// Cheap running-average trend over recent `decide()` observations,
    /// kept separate from the scaling agent's regressor. Returns `None`
    /// until at least [`PREDICTION_MIN_SAMPLES`] observations have been
    /// recorded.
    pub fn scaling_prediction(&self) -> Option<ScalingPrediction> {
        let history = self.performance_history.read();
        if history.len() < PREDICTION_MIN_SAMPLES {
            return None;
        }

        let n = history.len() as f64;
        let avg_cpu = history.iter().map(|m| m.cpu).sum::<f64>() / n;
        let avg_memory = history.iter().map(|m| m.memory).sum::<f64>() / n;
        let avg_request_rate = history.iter().map(|m| m.request_rate).sum::<f64>() / n;

        let (predicted_scaling, confidence) = if avg_cpu > 80.0 || avg_memory > 80.0 {
            (PredictedScaling::ScaleUp, 0.8)
        } else if avg_cpu < 30.0 && avg_memory < 30.0 {
            (PredictedScaling::ScaleDown, 0.7)
        } else {
            (PredictedScaling::None, 0.5)
        };

        Some(ScalingPrediction { predicted_scaling, confidence, avg_cpu, avg_memory, avg_request_rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::redis_pool::FakeRedis;

    fn scaler(cfg: ScalingConfig) -> (AutoScaler, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let redis = Arc::new(FakeRedis::new(clock.clone()));
        let lb = Arc::new(LoadBalancer::new(redis, clock.clone()));
        (AutoScaler::new(cfg, clock.clone(), lb), clock)
    }

    #[test]
    fn scale_up_decision_under_load() {
        let cfg = ScalingConfig { min_nodes: 2, max_nodes: 5, scale_up_threshold: 80.0, scale_up_cooldown: 60, ..ScalingConfig::default() };
        let (scaler, _clock) = scaler(cfg);
        let d = scaler.decide(AggregateMetrics { cpu: 85.0, memory: 10.0, request_rate: 10.0 });
        assert!(matches!(d, Some(ScalingDecision { decision_type: DecisionType::ScaleUp, target_nodes: 3, .. })));
    }

    #[test]
    fn cooldown_suppresses_repeat_scale_up() {
        let cfg = ScalingConfig { min_nodes: 2, max_nodes: 5, scale_up_threshold: 80.0, scale_up_cooldown: 60, ..ScalingConfig::default() };
        let (scaler, clock) = scaler(cfg);
        *scaler.last_scale_up.lock() = Some(clock.now());
        let d = scaler.decide(AggregateMetrics { cpu: 85.0, memory: 10.0, request_rate: 10.0 });
        assert!(d.is_none());
        clock.advance(Duration::from_secs(61));
        let d = scaler.decide(AggregateMetrics { cpu: 85.0, memory: 10.0, request_rate: 10.0 });
        assert!(d.is_some());
    }

    #[test]
    fn force_scale_rejects_out_of_bounds_target() {
        let (scaler, _clock) = scaler(ScalingConfig::default());
        assert!(scaler.force_scale(1000).is_err());
    }

    #[test]
    fn scaling_prediction_requires_minimum_samples() {
        let (scaler, _clock) = scaler(ScalingConfig::default());
        for _ in 0..9 {
            scaler.decide(AggregateMetrics { cpu: 90.0, memory: 90.0, request_rate: 10.0 });
        }
        assert!(scaler.scaling_prediction().is_none());

        scaler.decide(AggregateMetrics { cpu: 90.0, memory: 90.0, request_rate: 10.0 });
        let prediction = scaler.scaling_prediction().unwrap();
        assert_eq!(prediction.predicted_scaling, PredictedScaling::ScaleUp);
        assert!((prediction.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn scaling_prediction_trends_down_under_sustained_low_load() {
        let (scaler, _clock) = scaler(ScalingConfig::default());
        for _ in 0..10 {
            scaler.decide(AggregateMetrics { cpu: 5.0, memory: 5.0, request_rate: 1.0 });
        }
        let prediction = scaler.scaling_prediction().unwrap();
        assert_eq!(prediction.predicted_scaling, PredictedScaling::ScaleDown);
    }
}
