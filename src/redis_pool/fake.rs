//! In-memory double for [`super::RedisBackend`] used by tests so cache
//! manager, autoscaler and agent logic can be exercised deterministically
//! without a live Redis.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::clock::Clock;
use crate::error::Result;
use std::sync::Arc;
use std::time::Instant;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

pub struct FakeRedis {
    data: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl FakeRedis {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: DashMap::new(),
            clock,
        }
    }

    fn is_live(&self, entry: &Entry) -> bool {
        match entry.expires_at {
            Some(exp) => self.clock.now() < exp,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

#[async_trait]
impl super::RedisBackend for FakeRedis {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.data.get(key) {
            Some(e) if self.is_live(&e) => Ok(Some(e.value.clone())),
            Some(_) => {
                self.data.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: Vec<u8>) -> Result<()> {
        self.data.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(self.clock.now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let mut n = 0;
        for k in keys {
            if self.data.remove(k).is_some() {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<bool> {
        if let Some(mut e) = self.data.get_mut(key) {
            e.expires_at = Some(self.clock.now() + Duration::from_secs(ttl_secs.max(0) as u64));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        match self.data.get(key) {
            Some(e) => match e.expires_at {
                Some(exp) => Ok((exp - self.clock.now()).as_secs() as i64),
                None => Ok(-1),
            },
            None => Ok(-2),
        }
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut entry = self.data.entry(key.to_string()).or_insert_with(|| Entry {
            value: b"0".to_vec(),
            expires_at: None,
        });
        let current: i64 = String::from_utf8_lossy(&entry.value).parse().unwrap_or(0);
        let updated = current + delta;
        entry.value = updated.to_string().into_bytes();
        Ok(updated)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.incr_by(key, -delta).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut out = Vec::with_capacity(keys.len());
        for k in keys {
            out.push(self.get(k).await?);
        }
        Ok(out)
    }

    async fn mset(&self, pairs: &[(String, Vec<u8>)]) -> Result<()> {
        for (k, v) in pairs {
            self.set(k, v.clone()).await?;
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .data
            .iter()
            .filter(|kv| kv.key().starts_with(prefix))
            .map(|kv| kv.key().clone())
            .collect())
    }

    async fn ping(&self) -> Result<Duration> {
        Ok(Duration::from_millis(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::redis_pool::RedisBackend;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let redis = FakeRedis::new(Arc::new(SystemClock));
        redis.set("k", b"v".to_vec()).await.unwrap();
        assert_eq!(redis.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expired_key_reads_as_missing() {
        let clock = Arc::new(crate::clock::TestClock::new());
        let redis = FakeRedis::new(clock.clone());
        redis.setex("k", 1, b"v".to_vec()).await.unwrap();
        clock.advance(Duration::from_secs(2));
        assert_eq!(redis.get("k").await.unwrap(), None);
    }
}
