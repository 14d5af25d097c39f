//! Redis client pool (C2): connection pool with retries over a small
//! command vocabulary. Everything above this module talks to `dyn
//! RedisBackend`, never to the `redis` crate directly.

pub mod fake;

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time::timeout;

use crate::config::RedisConfig;
use crate::error::{PlatformError, Result};

pub use fake::FakeRedis;

/// The command vocabulary the rest of the platform is allowed to issue.
#[async_trait]
pub trait RedisBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn setex(&self, key: &str, ttl_secs: u64, value: Vec<u8>) -> Result<()>;
    async fn del(&self, keys: &[String]) -> Result<u64>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<bool>;
    async fn ttl(&self, key: &str) -> Result<i64>;
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;
    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;
    async fn mset(&self, pairs: &[(String, Vec<u8>)]) -> Result<()>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
    /// Round-trip latency of a `PING`.
    async fn ping(&self) -> Result<Duration>;
}

/// Real Redis-backed pool. Wraps a `redis::aio::ConnectionManager`, which
/// already reconnects transparently; every call is additionally bounded by
/// the configured read/write timeout so a wedged connection cannot hang a
/// calling loop forever.
pub struct RedisPool {
    manager: ConnectionManager,
    read_timeout: Duration,
    write_timeout: Duration,
    retry_on_timeout: bool,
}

impl RedisPool {
    pub async fn connect(cfg: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(cfg.connection_url())
            .map_err(|e| PlatformError::BackendUnavailable(e.to_string()))?;
        let manager = timeout(
            Duration::from_secs_f64(cfg.connection_timeout),
            client.get_connection_manager(),
        )
        .await??;
        Ok(Self {
            manager,
            read_timeout: Duration::from_secs_f64(cfg.read_timeout),
            write_timeout: Duration::from_secs_f64(cfg.write_timeout),
            retry_on_timeout: cfg.retry_on_timeout,
        })
    }

    /// Runs `make()` under `self.read_timeout`. On timeout, retries once
    /// (`make` is a factory rather than a bare future since a timed-out
    /// future cannot be polled again) when `retry_on_timeout` is set.
    async fn with_read_timeout<F, Fut, T>(&self, mut make: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.read_timeout, make()).await {
            Ok(res) => Ok(res?),
            Err(elapsed) => {
                if self.retry_on_timeout {
                    Ok(timeout(self.read_timeout, make()).await??)
                } else {
                    Err(elapsed.into())
                }
            }
        }
    }

    async fn with_write_timeout<F, Fut, T>(&self, mut make: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.write_timeout, make()).await {
            Ok(res) => Ok(res?),
            Err(elapsed) => {
                if self.retry_on_timeout {
                    Ok(timeout(self.write_timeout, make()).await??)
                } else {
                    Err(elapsed.into())
                }
            }
        }
    }
}

#[async_trait]
impl RedisBackend for RedisPool {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_read_timeout(|| {
            let mut conn = self.manager.clone();
            async move { conn.get(key).await }
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.with_write_timeout(|| {
            let mut conn = self.manager.clone();
            let value = value.clone();
            async move { conn.set(key, value).await }
        })
        .await
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: Vec<u8>) -> Result<()> {
        self.with_write_timeout(|| {
            let mut conn = self.manager.clone();
            let value = value.clone();
            async move { conn.set_ex(key, value, ttl_secs).await }
        })
        .await
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.with_write_timeout(|| {
            let mut conn = self.manager.clone();
            async move { conn.del(keys).await }
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.with_read_timeout(|| {
            let mut conn = self.manager.clone();
            async move { conn.exists(key).await }
        })
        .await
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<bool> {
        self.with_write_timeout(|| {
            let mut conn = self.manager.clone();
            async move { conn.expire(key, ttl_secs).await }
        })
        .await
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        self.with_read_timeout(|| {
            let mut conn = self.manager.clone();
            async move { conn.ttl(key).await }
        })
        .await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.with_write_timeout(|| {
            let mut conn = self.manager.clone();
            async move { conn.incr(key, delta).await }
        })
        .await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.with_write_timeout(|| {
            let mut conn = self.manager.clone();
            async move { conn.decr(key, delta).await }
        })
        .await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.with_read_timeout(|| {
            let mut conn = self.manager.clone();
            async move { conn.mget(keys).await }
        })
        .await
    }

    async fn mset(&self, pairs: &[(String, Vec<u8>)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.with_write_timeout(|| {
            let mut conn = self.manager.clone();
            async move { conn.mset(pairs).await }
        })
        .await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.with_read_timeout(|| {
            let mut conn = self.manager.clone();
            async move { conn.keys(pattern).await }
        })
        .await
    }

    async fn ping(&self) -> Result<Duration> {
        let start = std::time::Instant::now();
        let _: String = self
            .with_read_timeout(|| {
                let mut conn = self.manager.clone();
                async move { redis::cmd("PING").query_async(&mut conn).await }
            })
            .await?;
        Ok(start.elapsed())
    }
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool")
            .field("retry_on_timeout", &self.retry_on_timeout)
            .finish()
    }
}
