//! Load Balancer (C4): node pool, algorithm-driven selection, per-node
//! health and connection-count bookkeeping.

pub mod node;

pub use node::{Node, NodeRole, NodeStatus};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{PlatformError, Result};
use crate::redis_pool::RedisBackend;

const RESPONSE_TIME_RESERVOIR_CAP: usize = 1000;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const VIRTUAL_NODES_PER_PHYSICAL: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    RoundRobin,
    LeastConnections,
    ConsistentHash,
}

pub struct LoadBalancer {
    nodes: RwLock<HashMap<String, Node>>,
    algorithm: RwLock<Algorithm>,
    round_robin_counter: AtomicUsize,
    response_times: DashMap<String, VecDeque<f64>>,
    request_counters: DashMap<String, u64>,
    redis: Arc<dyn RedisBackend>,
    clock: Arc<dyn Clock>,
    max_connections_per_node: u32,
    min_connections_per_node: u32,
}

impl LoadBalancer {
    pub fn new(redis: Arc<dyn RedisBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            algorithm: RwLock::new(Algorithm::ConsistentHash),
            round_robin_counter: AtomicUsize::new(0),
            response_times: DashMap::new(),
            request_counters: DashMap::new(),
            redis,
            clock,
            max_connections_per_node: 100,
            min_connections_per_node: 10,
        }
    }

    pub fn set_algorithm(&self, algorithm: Algorithm) {
        *self.algorithm.write() = algorithm;
    }

    pub fn add_node(&self, node: Node) -> Result<()> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.id) {
            return Err(PlatformError::AlreadyExists(format!(
                "node {} already exists",
                node.id
            )));
        }
        self.request_counters.insert(node.id.clone(), 0);
        self.response_times.insert(node.id.clone(), VecDeque::new());
        info!(node_id = %node.id, "added node");
        nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Drains connections (bounded by 30s) then removes the node record.
    pub async fn remove_node(&self, node_id: &str) -> Result<()> {
        if !self.nodes.read().contains_key(node_id) {
            return Err(PlatformError::NotFound(format!("node {node_id} not found")));
        }
        let deadline = self.clock.now() + DRAIN_TIMEOUT;
        loop {
            let connections = self
                .nodes
                .read()
                .get(node_id)
                .map(|n| n.current_connections)
                .unwrap_or(0);
            if connections == 0 || self.clock.now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.nodes.write().remove(node_id);
        self.request_counters.remove(node_id);
        self.response_times.remove(node_id);
        info!(node_id, "removed node");
        Ok(())
    }

    pub fn get_node_snapshot(&self, node_id: &str) -> Option<Node> {
        self.nodes.read().get(node_id).cloned()
    }

    pub fn list_nodes(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn online_node_count(&self) -> usize {
        self.nodes.read().values().filter(|n| n.is_healthy()).count()
    }

    fn healthy_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes
            .read()
            .iter()
            .filter(|(_, n)| n.is_healthy())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Select a node for a request (§4.4). `key` is the cache key within
    /// the tenant's namespace, absent for tenant-scoped (non-key) requests.
    pub fn select(&self, tenant_id: &str, key: Option<&str>) -> Result<String> {
        let healthy = self.healthy_ids();
        if healthy.is_empty() {
            return Err(PlatformError::Unavailable(
                "no healthy nodes available".to_string(),
            ));
        }
        let algorithm = *self.algorithm.read();
        Ok(match algorithm {
            Algorithm::RoundRobin => self.round_robin_select(&healthy),
            Algorithm::LeastConnections => self.least_connections_select(&healthy),
            Algorithm::ConsistentHash => self.consistent_hash_select(&healthy, tenant_id, key),
        })
    }

    fn round_robin_select(&self, healthy: &[String]) -> String {
        let idx = self.round_robin_counter.fetch_add(1, Ordering::Relaxed) % healthy.len();
        healthy[idx].clone()
    }

    fn least_connections_select(&self, healthy: &[String]) -> String {
        let nodes = self.nodes.read();
        healthy
            .iter()
            .min_by_key(|id| (nodes[*id].current_connections, (*id).clone()))
            .cloned()
            .expect("healthy is non-empty")
    }

    /// MD5-based consistent hash with 150 virtual nodes per physical node
    /// (§4.4); a fixed healthy set always maps `(tenant, key)` to the same
    /// physical node.
    fn consistent_hash_select(&self, healthy: &[String], tenant_id: &str, key: Option<&str>) -> String {
        let hash_key = match key {
            Some(k) => format!("{tenant_id}:{k}"),
            None => tenant_id.to_string(),
        };
        let request_hash = hash128(&hash_key);

        let mut ring: Vec<(u128, &String)> = Vec::with_capacity(healthy.len() * VIRTUAL_NODES_PER_PHYSICAL);
        for id in healthy {
            for v in 0..VIRTUAL_NODES_PER_PHYSICAL {
                ring.push((hash128(&format!("{id}#{v}")), id));
            }
        }
        ring.sort_by_key(|(h, _)| *h);

        match ring.iter().find(|(h, _)| *h >= request_hash) {
            Some((_, id)) => (*id).clone(),
            None => ring[0].1.clone(),
        }
    }

    pub fn acquire(&self, node_id: &str) -> Result<()> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(node_id)
            .ok_or_else(|| PlatformError::NotFound(format!("node {node_id} not found")))?;
        if node.current_connections >= node.max_connections {
            return Err(PlatformError::Unavailable(format!(
                "node {node_id} at max connections"
            )));
        }
        node.current_connections += 1;
        Ok(())
    }

    pub fn release(&self, node_id: &str) {
        if let Some(node) = self.nodes.write().get_mut(node_id) {
            node.current_connections = node.current_connections.saturating_sub(1);
        }
    }

    pub fn record_request(&self, node_id: &str, elapsed: Duration, _success: bool) {
        if let Some(mut samples) = self.response_times.get_mut(node_id) {
            if samples.len() == RESPONSE_TIME_RESERVOIR_CAP {
                samples.pop_front();
            }
            samples.push_back(elapsed.as_secs_f64() * 1000.0);
        }
        if let Some(mut count) = self.request_counters.get_mut(node_id) {
            *count += 1;
        }
    }

    pub fn avg_response_time_ms(&self, node_id: &str) -> f64 {
        match self.response_times.get(node_id) {
            Some(samples) if !samples.is_empty() => {
                samples.iter().sum::<f64>() / samples.len() as f64
            }
            _ => 0.0,
        }
    }

    /// Mean of each node's average response time, across all registered
    /// nodes with at least one sample.
    pub fn average_response_time_ms(&self) -> f64 {
        let ids: Vec<String> = self.nodes.read().keys().cloned().collect();
        let samples: Vec<f64> = ids
            .iter()
            .map(|id| self.avg_response_time_ms(id))
            .filter(|ms| *ms > 0.0)
            .collect();
        if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        }
    }

    /// Sum of `current_connections` across all registered nodes.
    pub fn total_active_connections(&self) -> u32 {
        self.nodes.read().values().map(|n| n.current_connections).sum()
    }

    /// One health-probe cycle (§4.5): pings the shared Redis backend as a
    /// reachability proxy for every registered node, since the backend is
    /// treated as a black-box Redis-compatible interface; per-node
    /// dedicated connections are a hook implementations may add.
    pub async fn run_health_check_once(&self) {
        let ping = self.redis.ping().await;
        let ids: Vec<String> = self.nodes.read().keys().cloned().collect();
        for id in ids {
            let mut nodes = self.nodes.write();
            if let Some(node) = nodes.get_mut(&id) {
                match &ping {
                    Ok(latency) => {
                        node.status = NodeStatus::Online;
                        node.ping_latency_ms = latency.as_secs_f64() * 1000.0;
                    }
                    Err(_) => {
                        warn!(node_id = %id, "node health probe failed");
                        node.status = NodeStatus::Offline;
                    }
                }
                node.last_ping_ts = Some(chrono::Utc::now());
            }
        }
    }

    pub fn mark_offline(&self, node_id: &str) {
        if let Some(node) = self.nodes.write().get_mut(node_id) {
            node.status = NodeStatus::Offline;
        }
    }

    /// Grows/shrinks a node's `max_connections` based on observed load
    /// (original's `_manage_node_connections`): above 80% high-water mark
    /// doubles toward a ceiling, below the low-water mark shrinks toward a
    /// floor.
    pub fn tune_connection_limits(&self) {
        let mut nodes = self.nodes.write();
        for node in nodes.values_mut() {
            if node.current_connections as f64 > self.max_connections_per_node as f64 * 0.8 {
                node.max_connections = (node.max_connections + 10).min(self.max_connections_per_node * 2);
            } else if node.current_connections < self.min_connections_per_node {
                node.max_connections = node.max_connections.saturating_sub(5).max(self.min_connections_per_node);
            }
        }
    }

    /// Redistributes the `current_connections` counters evenly across
    /// healthy nodes (bookkeeping only, does not migrate live connections).
    pub fn rebalance_connections(&self) -> Result<()> {
        let healthy = self.healthy_ids();
        if healthy.is_empty() {
            return Err(PlatformError::Unavailable(
                "no healthy nodes for rebalancing".to_string(),
            ));
        }
        let mut nodes = self.nodes.write();
        let total: u32 = healthy
            .iter()
            .filter_map(|id| nodes.get(id).map(|n| n.current_connections))
            .sum();
        let target = total / healthy.len() as u32;
        for id in &healthy {
            if let Some(node) = nodes.get_mut(id) {
                node.current_connections = target;
            }
        }
        Ok(())
    }
}

fn hash128(input: &str) -> u128 {
    let digest = md5::compute(input.as_bytes());
    u128::from_be_bytes(digest.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::redis_pool::FakeRedis;

    fn lb() -> LoadBalancer {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let redis: Arc<dyn RedisBackend> = Arc::new(FakeRedis::new(clock.clone()));
        LoadBalancer::new(redis, clock)
    }

    #[test]
    fn consistent_hash_is_stable_across_calls() {
        let lb = lb();
        lb.add_node(Node::new("a", "h", 1)).unwrap();
        lb.add_node(Node::new("b", "h", 1)).unwrap();
        lb.add_node(Node::new("c", "h", 1)).unwrap();
        let first = lb.select("acme", Some("session:42")).unwrap();
        for _ in 0..10 {
            assert_eq!(lb.select("acme", Some("session:42")).unwrap(), first);
        }
    }

    #[test]
    fn consistent_hash_reroutes_around_offline_node() {
        let lb = lb();
        lb.add_node(Node::new("a", "h", 1)).unwrap();
        lb.add_node(Node::new("b", "h", 1)).unwrap();
        lb.add_node(Node::new("c", "h", 1)).unwrap();
        let chosen = lb.select("acme", Some("session:42")).unwrap();
        lb.mark_offline(&chosen);
        let rerouted = lb.select("acme", Some("session:42")).unwrap();
        assert_ne!(rerouted, chosen);
    }

    #[test]
    fn acquire_rejects_at_capacity() {
        let lb = lb();
        let mut node = Node::new("a", "h", 1);
        node.max_connections = 1;
        lb.add_node(node).unwrap();
        lb.acquire("a").unwrap();
        let err = lb.acquire("a").unwrap_err();
        assert_eq!(err.code(), "unavailable");
    }

    #[test]
    fn round_robin_cycles_through_nodes() {
        let lb = lb();
        lb.set_algorithm(Algorithm::RoundRobin);
        lb.add_node(Node::new("a", "h", 1)).unwrap();
        lb.add_node(Node::new("b", "h", 1)).unwrap();
        let first = lb.select("t", None).unwrap();
        let second = lb.select("t", None).unwrap();
        assert_ne!(first, second);
    }
}
