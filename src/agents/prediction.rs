//! Prediction agent (§4.6): every 300s, trains one regressor per
//! `(series, metric)` pair over an appended history and produces 24-hour
//! hourly usage forecasts plus anomaly detections against the series'
//! own recent window.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;

use super::common::AgentMetrics;
use super::regression::LinearRegressor;

pub const INTERVAL: Duration = Duration::from_secs(300);
const HISTORY_CAP: usize = 2000;
const RETRAIN_EVERY: usize = 100;
const FORECAST_HORIZON_HOURS: u32 = 24;
const ANOMALY_MEDIUM_Z: f64 = 2.0;
const ANOMALY_HIGH_Z: f64 = 3.0;
const ANOMALY_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalySeverity {
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct AnomalyDetection {
    pub series: String,
    pub metric: String,
    pub value: f64,
    pub z_score: f64,
    pub severity: AnomalySeverity,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ForecastPoint {
    pub hour_offset: u32,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone)]
pub struct UsageForecast {
    pub series: String,
    pub metric: String,
    pub generated_at: DateTime<Utc>,
    pub points: Vec<ForecastPoint>,
}

#[derive(Default)]
struct SeriesState {
    history: VecDeque<(DateTime<Utc>, f64)>,
    regressor: LinearRegressor,
}

/// Key identifying a tracked series: a system series name (e.g. "system")
/// or a tenant id, paired with a metric name (e.g. "cpu", "request_rate").
type SeriesKey = (String, String);

pub struct PredictionAgent {
    series: Mutex<HashMap<SeriesKey, SeriesState>>,
    metrics: Mutex<AgentMetrics>,
}

impl PredictionAgent {
    pub fn new() -> Self {
        Self { series: Mutex::new(HashMap::new()), metrics: Mutex::new(AgentMetrics::default()) }
    }

    pub fn metrics_snapshot(&self) -> AgentMetrics {
        self.metrics.lock().clone()
    }

    /// Appends an observation and retrains its regressor every 100 points.
    /// The single feature used is hour-of-day, matching the 24h hourly
    /// forecast horizon.
    pub fn observe(&self, series: &str, metric: &str, value: f64) -> Option<AnomalyDetection> {
        let key = (series.to_string(), metric.to_string());
        let mut guard = self.series.lock();
        let state = guard.entry(key).or_default();

        let anomaly = Self::detect_anomaly(series, metric, &state.history, value);

        let now = Utc::now();
        state.history.push_back((now, value));
        while state.history.len() > HISTORY_CAP {
            state.history.pop_front();
        }
        if state.history.len() % RETRAIN_EVERY == 0 {
            let samples: Vec<(Vec<f64>, f64)> =
                state.history.iter().map(|(ts, v)| (vec![ts.hour() as f64], *v)).collect();
            state.regressor.fit(&samples);
        }
        drop(guard);
        self.metrics.lock().record_success();
        anomaly
    }

    fn detect_anomaly(
        series: &str,
        metric: &str,
        history: &VecDeque<(DateTime<Utc>, f64)>,
        value: f64,
    ) -> Option<AnomalyDetection> {
        if history.len() < ANOMALY_WINDOW {
            return None;
        }
        let recent: Vec<f64> = history.iter().rev().take(ANOMALY_WINDOW).map(|(_, v)| *v).collect();
        let mean = recent.iter().sum::<f64>() / recent.len() as f64;
        let variance = recent.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / recent.len() as f64;
        let std_dev = variance.sqrt();
        let z = if std_dev < 1e-9 {
            if (value - mean).abs() < 1e-9 {
                return None;
            }
            f64::MAX
        } else {
            (value - mean).abs() / std_dev
        };
        let severity = if z >= ANOMALY_HIGH_Z {
            AnomalySeverity::High
        } else if z >= ANOMALY_MEDIUM_Z {
            AnomalySeverity::Medium
        } else {
            return None;
        };
        Some(AnomalyDetection {
            series: series.to_string(),
            metric: metric.to_string(),
            value,
            z_score: z,
            severity,
            detected_at: Utc::now(),
        })
    }

    /// Produces a 24h hourly forecast for a series/metric pair, or `None`
    /// if its regressor has not trained yet.
    pub fn forecast(&self, series: &str, metric: &str) -> Option<UsageForecast> {
        let key = (series.to_string(), metric.to_string());
        let guard = self.series.lock();
        let state = guard.get(&key)?;
        if !state.regressor.is_trained() {
            return None;
        }
        let samples: Vec<(Vec<f64>, f64)> =
            state.history.iter().map(|(ts, v)| (vec![ts.hour() as f64], *v)).collect();
        let rmse = state.regressor.rmse(&samples).unwrap_or(0.0);
        let interval = 2.0 * rmse;

        let mut points = Vec::with_capacity(FORECAST_HORIZON_HOURS as usize);
        let start_hour = Utc::now().hour();
        for offset in 0..FORECAST_HORIZON_HOURS {
            let hour = (start_hour + offset) % 24;
            let point = state.regressor.predict(&[hour as f64]).unwrap_or(0.0);
            points.push(ForecastPoint { hour_offset: offset, point, lower: point - interval, upper: point + interval });
        }
        Some(UsageForecast { series: series.to_string(), metric: metric.to_string(), generated_at: Utc::now(), points })
    }
}

impl Default for PredictionAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_series_has_no_anomaly() {
        let agent = PredictionAgent::new();
        for _ in 0..60 {
            let a = agent.observe("system", "cpu", 50.0);
            assert!(a.is_none());
        }
    }

    #[test]
    fn large_spike_is_flagged_as_anomaly() {
        let agent = PredictionAgent::new();
        for _ in 0..60 {
            agent.observe("system", "cpu", 50.0);
        }
        let a = agent.observe("system", "cpu", 500.0);
        assert!(a.is_some());
        assert_eq!(a.unwrap().severity, AnomalySeverity::High);
    }
}
