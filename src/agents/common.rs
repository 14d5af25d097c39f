use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-agent activity counters, shared by all four control loops.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub total_decisions: u64,
    pub successful_decisions: u64,
    pub failed_decisions: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl AgentMetrics {
    pub fn record_success(&mut self) {
        self.total_decisions += 1;
        self.successful_decisions += 1;
        self.last_activity = Some(Utc::now());
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.total_decisions += 1;
        self.failed_decisions += 1;
        self.error_count += 1;
        self.last_error = Some(error.into());
        self.last_activity = Some(Utc::now());
    }

    pub fn record_idle(&mut self) {
        self.last_activity = Some(Utc::now());
    }
}
