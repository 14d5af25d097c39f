use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::TenantDefaults;
use crate::error::{PlatformError, Result};
use crate::redis_pool::RedisBackend;

use super::metrics::CacheMetrics;
use super::tenant::{NewTenant, Tenant};

/// Closed set of data-plane operation kinds, used as the rate-limiter bucket
/// key. Distinct from an audit-log record (spec §9 Open Question: the
/// original conflates the two; this crate keeps only the enum since no
/// audit log is in scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    Get,
    Set,
    Delete,
    Exists,
    Expire,
    Ttl,
    Incr,
    Decr,
    Mget,
    Mset,
}

impl CacheOp {
    fn as_str(&self) -> &'static str {
        match self {
            CacheOp::Get => "get",
            CacheOp::Set => "set",
            CacheOp::Delete => "delete",
            CacheOp::Exists => "exists",
            CacheOp::Expire => "expire",
            CacheOp::Ttl => "ttl",
            CacheOp::Incr => "incr",
            CacheOp::Decr => "decr",
            CacheOp::Mget => "mget",
            CacheOp::Mset => "mset",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupEntry {
    value: Vec<u8>,
    ttl_remaining: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub tenant_id: String,
    pub keys_count: usize,
    entries: std::collections::HashMap<String, BackupEntry>,
}

pub struct CacheManager {
    redis: Arc<dyn RedisBackend>,
    clock: Arc<dyn Clock>,
    tenants: DashMap<String, Tenant>,
    metrics: DashMap<String, CacheMetrics>,
    rate_limiters: DashMap<(String, &'static str), std::time::Instant>,
    defaults: TenantDefaults,
}

impl CacheManager {
    pub fn new(redis: Arc<dyn RedisBackend>, clock: Arc<dyn Clock>, defaults: TenantDefaults) -> Self {
        Self {
            redis,
            clock,
            tenants: DashMap::new(),
            metrics: DashMap::new(),
            rate_limiters: DashMap::new(),
            defaults,
        }
    }

    fn now(&self) -> std::time::Instant {
        self.clock.now()
    }

    /// Admission check (§4.1): tenant exists and is active, the memory
    /// quota invariant currently holds, and the per-(tenant, op) rate
    /// limiter admits this call.
    fn admit(&self, tenant_id: &str, op: CacheOp) -> Result<Tenant> {
        let tenant = self
            .tenants
            .get(tenant_id)
            .ok_or_else(|| PlatformError::NotFound(format!("tenant {tenant_id} not found")))?
            .clone();

        if !tenant.is_active() {
            return Err(PlatformError::Conflict(format!(
                "tenant {tenant_id} is not active"
            )));
        }
        if tenant.usage.current_memory_mb > tenant.quotas.memory_limit_mb as f64 {
            return Err(PlatformError::QuotaExceeded(format!(
                "tenant {tenant_id} over memory quota"
            )));
        }

        let rate_key = (tenant_id.to_string(), op.as_str());
        let now = self.clock.now();
        let min_interval = Duration::from_secs_f64(1.0 / tenant.quotas.requests_per_second as f64);
        if let Some(last) = self.rate_limiters.get(&rate_key) {
            if now.duration_since(*last) < min_interval {
                return Err(PlatformError::RateLimited(format!(
                    "tenant {tenant_id} rate limited on {}",
                    op.as_str()
                )));
            }
        }
        self.rate_limiters.insert(rate_key, now);
        Ok(tenant)
    }

    fn record(&self, tenant_id: &str, elapsed: Duration, success: bool) {
        if let Some(mut m) = self.metrics.get_mut(tenant_id) {
            m.record(elapsed.as_secs_f64() * 1000.0, success, Utc::now());
        }
    }

    pub fn get_tenant(&self, tenant_id: &str) -> Option<Tenant> {
        self.tenants.get(tenant_id).map(|t| t.clone())
    }

    pub fn list_tenants(&self) -> Vec<Tenant> {
        self.tenants.iter().map(|t| t.clone()).collect()
    }

    pub fn get_tenant_metrics(&self, tenant_id: &str) -> Option<CacheMetrics> {
        self.metrics.get(tenant_id).map(|m| m.clone())
    }

    // -- admin ops ------------------------------------------------------

    pub async fn create_tenant(&self, mut spec: NewTenant) -> Result<Tenant> {
        if spec.memory_limit_mb == 0 {
            spec.memory_limit_mb = self.defaults.default_memory_mb;
        }
        if spec.requests_per_second == 0 {
            spec.requests_per_second = self.defaults.default_requests_per_second;
        }
        if spec.max_connections == 0 {
            spec.max_connections = self.defaults.default_connections;
        }
        let tenant = Tenant::new(spec, Utc::now())?;
        if self.tenants.contains_key(&tenant.id) {
            return Err(PlatformError::AlreadyExists(format!(
                "tenant {} already exists",
                tenant.id
            )));
        }
        let encoded = serde_json::to_vec(&tenant)?;
        self.redis.set(&format!("tenant:{}", tenant.id), encoded).await?;
        self.metrics.insert(tenant.id.clone(), CacheMetrics::default());
        self.tenants.insert(tenant.id.clone(), tenant.clone());
        info!(tenant_id = %tenant.id, "created tenant");
        Ok(tenant)
    }

    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<()> {
        if !self.tenants.contains_key(tenant_id) {
            return Err(PlatformError::NotFound(format!(
                "tenant {tenant_id} not found"
            )));
        }
        self.purge_keyspace(tenant_id).await?;
        self.redis.del(&[format!("tenant:{tenant_id}")]).await?;
        self.tenants.remove(tenant_id);
        self.metrics.remove(tenant_id);
        info!(tenant_id, "deleted tenant");
        Ok(())
    }

    pub fn modify_tenant_quotas(
        &self,
        tenant_id: &str,
        memory_limit_mb: Option<u64>,
        requests_per_second: Option<u32>,
    ) -> Result<Tenant> {
        let mut entry = self
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| PlatformError::NotFound(format!("tenant {tenant_id} not found")))?;
        if let Some(mem) = memory_limit_mb {
            entry.quotas.memory_limit_mb = mem;
        }
        if let Some(rps) = requests_per_second {
            entry.quotas.requests_per_second = rps;
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Applies an optimization-agent recommendation to a tenant setting
    /// (e.g. `default_ttl`, `eviction_policy`) outside the typed quota path.
    pub fn set_tenant_setting(&self, tenant_id: &str, key: &str, value: String) -> Result<()> {
        let mut entry = self
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| PlatformError::NotFound(format!("tenant {tenant_id} not found")))?;
        entry.settings.insert(key.to_string(), value);
        entry.updated_at = Utc::now();
        Ok(())
    }

    /// Persists the aggregate system metrics snapshot at `metrics:system`
    /// with a TTL of 2x the sampling interval that produced it.
    pub async fn write_system_metrics_snapshot(&self, snapshot: &Value, ttl_secs: u64) -> Result<()> {
        let encoded = serde_json::to_vec(snapshot)?;
        self.redis.setex("metrics:system", ttl_secs, encoded).await
    }

    async fn purge_keyspace(&self, tenant_id: &str) -> Result<()> {
        let pattern = format!("cache:{tenant_id}:*");
        let keys = self.redis.keys(&pattern).await?;
        for chunk in keys.chunks(500) {
            self.redis.del(chunk).await?;
        }
        Ok(())
    }

    /// Wipes the tenant's key-space and resets its metrics but keeps the
    /// tenant record alive (distinct from `delete_tenant`).
    pub async fn clear_tenant(&self, tenant_id: &str) -> Result<()> {
        if !self.tenants.contains_key(tenant_id) {
            return Err(PlatformError::NotFound(format!(
                "tenant {tenant_id} not found"
            )));
        }
        self.purge_keyspace(tenant_id).await?;
        self.metrics.insert(tenant_id.to_string(), CacheMetrics::default());
        if let Some(mut t) = self.tenants.get_mut(tenant_id) {
            t.usage.current_memory_mb = 0.0;
        }
        info!(tenant_id, "cleared tenant cache");
        Ok(())
    }

    // -- data-plane ops ---------------------------------------------------

    pub async fn get(&self, tenant_id: &str, key: &str) -> Result<Option<Value>> {
        let started = self.now();
        let admitted = self.admit(tenant_id, CacheOp::Get);
        let tenant = match admitted {
            Ok(t) => t,
            Err(e) => return Err(e),
        };
        let cache_key = tenant.cache_key(key);
        let result = self.redis.get(&cache_key).await;
        let elapsed = self.now().saturating_duration_since(started);
        match result {
            Ok(Some(bytes)) => {
                if let Some(mut m) = self.metrics.get_mut(tenant_id) {
                    m.record_hit();
                }
                self.record(tenant_id, elapsed, true);
                let value: Value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Ok(None) => {
                if let Some(mut m) = self.metrics.get_mut(tenant_id) {
                    m.record_miss();
                }
                self.record(tenant_id, elapsed, true);
                Ok(None)
            }
            Err(e) => {
                self.record(tenant_id, elapsed, false);
                Err(e)
            }
        }
    }

    pub async fn set(&self, tenant_id: &str, key: &str, value: Value, ttl: Option<u64>) -> Result<()> {
        let started = self.now();
        let tenant = self.admit(tenant_id, CacheOp::Set)?;
        let encoded = serde_json::to_vec(&value)?;
        let size_mb = encoded.len() as f64 / (1024.0 * 1024.0);
        if tenant.usage.current_memory_mb + size_mb > tenant.quotas.memory_limit_mb as f64 {
            warn!(tenant_id, "set would exceed memory quota");
            return Err(PlatformError::QuotaExceeded(format!(
                "tenant {tenant_id} would exceed memory quota"
            )));
        }
        let cache_key = tenant.cache_key(key);
        let result = match ttl {
            Some(secs) => self.redis.setex(&cache_key, secs, encoded).await,
            None => self.redis.set(&cache_key, encoded).await,
        };
        let elapsed = self.now().saturating_duration_since(started);
        match result {
            Ok(()) => {
                if let Some(mut t) = self.tenants.get_mut(tenant_id) {
                    t.usage.current_memory_mb += size_mb;
                }
                self.record(tenant_id, elapsed, true);
                Ok(())
            }
            Err(e) => {
                self.record(tenant_id, elapsed, false);
                Err(e)
            }
        }
    }

    pub async fn delete(&self, tenant_id: &str, key: &str) -> Result<()> {
        let started = self.now();
        let tenant = self.admit(tenant_id, CacheOp::Delete)?;
        let cache_key = tenant.cache_key(key);
        let existing = self.redis.get(&cache_key).await.ok().flatten();
        let result = self.redis.del(&[cache_key]).await;
        let elapsed = self.now().saturating_duration_since(started);
        match result {
            Ok(_) => {
                if let Some(bytes) = existing {
                    let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
                    if let Some(mut t) = self.tenants.get_mut(tenant_id) {
                        t.usage.current_memory_mb = (t.usage.current_memory_mb - size_mb).max(0.0);
                    }
                }
                self.record(tenant_id, elapsed, true);
                Ok(())
            }
            Err(e) => {
                self.record(tenant_id, elapsed, false);
                Err(e)
            }
        }
    }

    pub async fn exists(&self, tenant_id: &str, key: &str) -> Result<bool> {
        let started = self.now();
        let tenant = self.admit(tenant_id, CacheOp::Exists)?;
        let result = self.redis.exists(&tenant.cache_key(key)).await;
        let elapsed = self.now().saturating_duration_since(started);
        self.record(tenant_id, elapsed, result.is_ok());
        result
    }

    pub async fn expire(&self, tenant_id: &str, key: &str, ttl_secs: i64) -> Result<bool> {
        let started = self.now();
        let tenant = self.admit(tenant_id, CacheOp::Expire)?;
        let result = self.redis.expire(&tenant.cache_key(key), ttl_secs).await;
        let elapsed = self.now().saturating_duration_since(started);
        self.record(tenant_id, elapsed, result.is_ok());
        result
    }

    pub async fn ttl(&self, tenant_id: &str, key: &str) -> Result<i64> {
        let started = self.now();
        let tenant = self.admit(tenant_id, CacheOp::Ttl)?;
        let result = self.redis.ttl(&tenant.cache_key(key)).await;
        let elapsed = self.now().saturating_duration_since(started);
        self.record(tenant_id, elapsed, result.is_ok());
        result
    }

    pub async fn incr(&self, tenant_id: &str, key: &str, amount: i64) -> Result<i64> {
        let started = self.now();
        let tenant = self.admit(tenant_id, CacheOp::Incr)?;
        let result = self.redis.incr_by(&tenant.cache_key(key), amount).await;
        let elapsed = self.now().saturating_duration_since(started);
        self.record(tenant_id, elapsed, result.is_ok());
        result
    }

    pub async fn decr(&self, tenant_id: &str, key: &str, amount: i64) -> Result<i64> {
        let started = self.now();
        let tenant = self.admit(tenant_id, CacheOp::Decr)?;
        let result = self.redis.decr_by(&tenant.cache_key(key), amount).await;
        let elapsed = self.now().saturating_duration_since(started);
        self.record(tenant_id, elapsed, result.is_ok());
        result
    }

    pub async fn mget(&self, tenant_id: &str, keys: &[String]) -> Result<Vec<Option<Value>>> {
        let started = self.now();
        let tenant = self.admit(tenant_id, CacheOp::Mget)?;
        let cache_keys: Vec<String> = keys.iter().map(|k| tenant.cache_key(k)).collect();
        let result = self.redis.mget(&cache_keys).await;
        let elapsed = self.now().saturating_duration_since(started);
        match result {
            Ok(values) => {
                let mut out = Vec::with_capacity(values.len());
                for v in values {
                    match v {
                        Some(bytes) => {
                            if let Some(mut m) = self.metrics.get_mut(tenant_id) {
                                m.record_hit();
                            }
                            out.push(Some(serde_json::from_slice(&bytes)?));
                        }
                        None => {
                            if let Some(mut m) = self.metrics.get_mut(tenant_id) {
                                m.record_miss();
                            }
                            out.push(None);
                        }
                    }
                }
                self.record(tenant_id, elapsed, true);
                Ok(out)
            }
            Err(e) => {
                self.record(tenant_id, elapsed, false);
                Err(e)
            }
        }
    }

    pub async fn mset(&self, tenant_id: &str, entries: &[(String, Value)]) -> Result<()> {
        let started = self.now();
        let tenant = self.admit(tenant_id, CacheOp::Mset)?;
        let mut encoded = Vec::with_capacity(entries.len());
        let mut total_size_mb = 0.0;
        for (k, v) in entries {
            let bytes = serde_json::to_vec(v)?;
            total_size_mb += bytes.len() as f64 / (1024.0 * 1024.0);
            encoded.push((tenant.cache_key(k), bytes));
        }
        if tenant.usage.current_memory_mb + total_size_mb > tenant.quotas.memory_limit_mb as f64 {
            return Err(PlatformError::QuotaExceeded(format!(
                "tenant {tenant_id} would exceed memory quota"
            )));
        }
        let result = self.redis.mset(&encoded).await;
        let elapsed = self.now().saturating_duration_since(started);
        match result {
            Ok(()) => {
                if let Some(mut t) = self.tenants.get_mut(tenant_id) {
                    t.usage.current_memory_mb += total_size_mb;
                }
                self.record(tenant_id, elapsed, true);
                Ok(())
            }
            Err(e) => {
                self.record(tenant_id, elapsed, false);
                Err(e)
            }
        }
    }

    // -- backup / restore -------------------------------------------------

    pub async fn backup_tenant(&self, tenant_id: &str) -> Result<BackupSnapshot> {
        if !self.tenants.contains_key(tenant_id) {
            return Err(PlatformError::NotFound(format!(
                "tenant {tenant_id} not found"
            )));
        }
        let pattern = format!("cache:{tenant_id}:*");
        let keys = self.redis.keys(&pattern).await?;
        let mut entries = std::collections::HashMap::with_capacity(keys.len());
        for key in &keys {
            if let Some(value) = self.redis.get(key).await? {
                let ttl = self.redis.ttl(key).await?;
                entries.insert(
                    key.clone(),
                    BackupEntry {
                        value,
                        ttl_remaining: if ttl > 0 { Some(ttl) } else { None },
                    },
                );
            }
        }
        Ok(BackupSnapshot {
            tenant_id: tenant_id.to_string(),
            keys_count: entries.len(),
            entries,
        })
    }

    pub async fn restore_tenant(&self, tenant_id: &str, snapshot: &BackupSnapshot) -> Result<()> {
        if !self.tenants.contains_key(tenant_id) {
            return Err(PlatformError::NotFound(format!(
                "tenant {tenant_id} not found"
            )));
        }
        self.purge_keyspace(tenant_id).await?;
        let mut restored_mb = 0.0;
        for (key, entry) in &snapshot.entries {
            restored_mb += entry.value.len() as f64 / (1024.0 * 1024.0);
            match entry.ttl_remaining {
                Some(ttl) if ttl > 0 => {
                    self.redis.setex(key, ttl as u64, entry.value.clone()).await?
                }
                _ => self.redis.set(key, entry.value.clone()).await?,
            }
        }
        if let Some(mut t) = self.tenants.get_mut(tenant_id) {
            t.usage.current_memory_mb = restored_mb;
        }
        info!(tenant_id, keys = snapshot.keys_count, "restored tenant");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::redis_pool::FakeRedis;

    fn manager() -> (CacheManager, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let redis: Arc<dyn RedisBackend> = Arc::new(FakeRedis::new(clock.clone() as Arc<dyn Clock>));
        let manager = CacheManager::new(redis, clock.clone() as Arc<dyn Clock>, TenantDefaults::default());
        (manager, clock)
    }

    fn new_tenant(id: &str) -> NewTenant {
        NewTenant {
            id: id.to_string(),
            name: "Acme".to_string(),
            memory_limit_mb: 512,
            requests_per_second: 1000,
            max_connections: 50,
        }
    }

    #[tokio::test]
    async fn basic_round_trip() {
        let (mgr, _clock) = manager();
        mgr.create_tenant(new_tenant("acme")).await.unwrap();
        mgr.set("acme", "k", Value::String("v".into()), Some(3600))
            .await
            .unwrap();
        assert_eq!(
            mgr.get("acme", "k").await.unwrap(),
            Some(Value::String("v".into()))
        );
        mgr.delete("acme", "k").await.unwrap();
        assert_eq!(mgr.get("acme", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let (mgr, _clock) = manager();
        mgr.create_tenant(new_tenant("t1")).await.unwrap();
        mgr.create_tenant(new_tenant("t2")).await.unwrap();
        mgr.set("t1", "k", Value::String("v1".into()), None)
            .await
            .unwrap();
        mgr.set("t2", "k", Value::String("v2".into()), None)
            .await
            .unwrap();
        assert_eq!(
            mgr.get("t1", "k").await.unwrap(),
            Some(Value::String("v1".into()))
        );
        assert_eq!(
            mgr.get("t2", "k").await.unwrap(),
            Some(Value::String("v2".into()))
        );
    }

    #[tokio::test]
    async fn create_tenant_twice_fails() {
        let (mgr, _clock) = manager();
        mgr.create_tenant(new_tenant("acme")).await.unwrap();
        let err = mgr.create_tenant(new_tenant("acme")).await.unwrap_err();
        assert_eq!(err.code(), "already_exists");
    }

    #[tokio::test]
    async fn quota_boundary_rejects_over_limit_set() {
        let (mgr, _clock) = manager();
        mgr.create_tenant(NewTenant {
            id: "tiny".to_string(),
            name: "Tiny".to_string(),
            memory_limit_mb: 64,
            requests_per_second: 10_000,
            max_connections: 50,
        })
        .await
        .unwrap();
        // ~256 KiB payloads against a 64 MB quota: plenty of headroom until
        // the cumulative usage crosses the limit.
        let payload = Value::String("x".repeat(256 * 1024));
        let mut last_err = None;
        for i in 0..300 {
            let res = mgr.set("tiny", &format!("k{i}"), payload.clone(), None).await;
            if res.is_err() {
                last_err = Some(res.unwrap_err());
                break;
            }
        }
        let err = last_err.expect("quota should eventually be exceeded");
        assert_eq!(err.code(), "quota_exceeded");
        let tenant = mgr.get_tenant("tiny").unwrap();
        assert!(tenant.usage.current_memory_mb <= 64.0);
    }

    #[tokio::test]
    async fn rate_limit_rejects_rapid_repeat_calls() {
        let (mgr, _clock) = manager();
        mgr.create_tenant(NewTenant {
            id: "slow".to_string(),
            name: "Slow".to_string(),
            memory_limit_mb: 512,
            requests_per_second: 1,
            max_connections: 50,
        })
        .await
        .unwrap();
        mgr.set("slow", "k", Value::String("v".into()), None)
            .await
            .unwrap();
        let err = mgr
            .set("slow", "k", Value::String("v2".into()), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "rate_limited");
    }
}
