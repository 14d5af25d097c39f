//! Scaling agent (§4.6): reads aggregate metrics on a 60s cadence, invokes
//! the auto-scaler's deterministic decision rule, and augments it with a
//! per-feature regressor that predicts near-term load.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use parking_lot::Mutex;

use crate::autoscaler::{AggregateMetrics, AutoScaler, ScalingDecision};

use super::common::AgentMetrics;
use super::regression::LinearRegressor;

pub const INTERVAL: Duration = Duration::from_secs(60);
const SAMPLE_WINDOW: usize = 500;
const RETRAIN_EVERY: usize = 50;
/// Guard band on MAE (as a fraction of one node's reference throughput)
/// below which the regressor's prediction is trusted over raw metrics.
const GUARD_BAND_FRACTION_OF_BASE_RATE: f64 = 0.1;
const BASE_RATE_PER_NODE: f64 = 1000.0;

pub struct ScalingObservation {
    pub metrics: AggregateMetrics,
    pub hit_ratio: f64,
    pub active_connections: u32,
    pub current_nodes: u32,
}

pub struct ScalingAgent {
    autoscaler: Arc<AutoScaler>,
    samples: Mutex<VecDeque<(Vec<f64>, f64)>>,
    regressor: Mutex<LinearRegressor>,
    metrics: Mutex<AgentMetrics>,
}

impl ScalingAgent {
    pub fn new(autoscaler: Arc<AutoScaler>) -> Self {
        Self {
            autoscaler,
            samples: Mutex::new(VecDeque::new()),
            regressor: Mutex::new(LinearRegressor::default()),
            metrics: Mutex::new(AgentMetrics::default()),
        }
    }

    pub fn metrics_snapshot(&self) -> AgentMetrics {
        self.metrics.lock().clone()
    }

    fn features(obs: &ScalingObservation) -> Vec<f64> {
        let now = Utc::now();
        vec![
            obs.metrics.cpu,
            obs.metrics.memory,
            obs.metrics.request_rate,
            obs.hit_ratio,
            obs.active_connections as f64,
            obs.current_nodes as f64,
            now.hour() as f64,
            now.weekday().num_days_from_monday() as f64,
        ]
    }

    fn record_sample(&self, obs: &ScalingObservation) {
        let mut samples = self.samples.lock();
        samples.push_back((Self::features(obs), obs.metrics.request_rate));
        while samples.len() > SAMPLE_WINDOW {
            samples.pop_front();
        }
        if samples.len() % RETRAIN_EVERY == 0 {
            self.regressor.lock().fit(samples.make_contiguous());
        }
    }

    /// Runs one decision cycle, returning the executed decision if any.
    pub async fn run_cycle(&self, obs: ScalingObservation) -> Option<ScalingDecision> {
        self.record_sample(&obs);

        let effective = {
            let samples = self.samples.lock();
            let regressor = self.regressor.lock();
            let guard_band = GUARD_BAND_FRACTION_OF_BASE_RATE * BASE_RATE_PER_NODE;
            let mae = regressor.mae(samples.make_contiguous());
            match (regressor.is_trained(), mae) {
                (true, Some(mae)) if mae < guard_band => {
                    let features = Self::features(&obs);
                    match regressor.predict(&features) {
                        Some(predicted_rate) => AggregateMetrics { request_rate: predicted_rate, ..obs.metrics },
                        None => obs.metrics,
                    }
                }
                _ => obs.metrics,
            }
        };

        let decision = self.autoscaler.decide(effective)?;
        let mut m = self.metrics.lock();
        match self.autoscaler.execute(decision).await {
            Ok(executed) => {
                m.record_success();
                Some(executed)
            }
            Err(e) => {
                m.record_failure(e.to_string());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::config::ScalingConfig;
    use crate::loadbalancer::LoadBalancer;
    use crate::redis_pool::FakeRedis;

    #[tokio::test]
    async fn falls_back_to_raw_metrics_before_training() {
        let clock = Arc::new(TestClock::new());
        let redis = Arc::new(FakeRedis::new(clock.clone()));
        let lb = Arc::new(LoadBalancer::new(redis, clock.clone()));
        let cfg = ScalingConfig { min_nodes: 2, max_nodes: 5, scale_up_threshold: 80.0, ..ScalingConfig::default() };
        let autoscaler = Arc::new(AutoScaler::new(cfg, clock, lb));
        let agent = ScalingAgent::new(autoscaler);

        let obs = ScalingObservation {
            metrics: AggregateMetrics { cpu: 90.0, memory: 20.0, request_rate: 10.0 },
            hit_ratio: 90.0,
            active_connections: 5,
            current_nodes: 2,
        };
        let decision = agent.run_cycle(obs).await;
        assert!(decision.is_some());
        assert_eq!(agent.metrics_snapshot().successful_decisions, 1);
    }
}
