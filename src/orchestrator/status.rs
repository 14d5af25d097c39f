//! Aggregate `SystemStatus` snapshot (§4.2), recomputed every 10s by the
//! orchestrator's status loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::HealthCheck;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub platform_version: String,
    pub uptime_secs: u64,
    pub environment: String,
    pub component_checks: Vec<HealthCheck>,
    pub agent_checks: Vec<AgentHealth>,
    pub total_tenants: usize,
    pub active_tenants: usize,
    pub total_nodes: usize,
    pub online_nodes: usize,
    pub aggregate_cpu_percent: f64,
    pub aggregate_memory_percent: f64,
    pub total_requests_per_sec: f64,
    pub avg_response_time_ms: f64,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub name: String,
    pub total_decisions: u64,
    pub successful_decisions: u64,
    pub failed_decisions: u64,
    pub error_count: u64,
}
