use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Master,
    Slave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
    Failing,
    Maintenance,
}

/// A Redis node in the load balancer's registry (§3). Invariant:
/// `0 <= current_connections <= max_connections`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub weight: f64,
    pub max_connections: u32,
    pub current_connections: u32,
    pub last_ping_ts: Option<chrono::DateTime<chrono::Utc>>,
    pub ping_latency_ms: f64,
}

impl Node {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            role: NodeRole::Master,
            status: NodeStatus::Online,
            weight: 1.0,
            max_connections: 100,
            current_connections: 0,
            last_ping_ts: None,
            ping_latency_ms: 0.0,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, NodeStatus::Online)
    }
}
