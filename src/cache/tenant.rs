use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{PlatformError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Pending,
    Deleted,
}

/// A tenant's resource quotas, fixed at creation and mutated only through
/// `modify_tenant_quotas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantQuotas {
    pub memory_limit_mb: u64,
    pub requests_per_second: u32,
    pub max_connections: u32,
}

/// Running usage counters the Cache Manager maintains per tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantUsage {
    pub current_memory_mb: f64,
    pub current_requests_per_second: f64,
    pub current_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub status: TenantStatus,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub quotas: TenantQuotas,
    pub usage: TenantUsage,
    pub settings: HashMap<String, String>,
}

/// Validated inputs for `create_tenant` (spec §3: id lowercased, ≥3 chars;
/// name ≥2 chars; memory_limit_mb ∈ [64, 8192]; requests_per_second ∈
/// [1, 10000]).
pub struct NewTenant {
    pub id: String,
    pub name: String,
    pub memory_limit_mb: u64,
    pub requests_per_second: u32,
    pub max_connections: u32,
}

impl Tenant {
    pub fn new(spec: NewTenant, now: DateTime<Utc>) -> Result<Self> {
        let id = spec.id.to_lowercase();
        if id.len() < 3 {
            return Err(PlatformError::InvalidArgument(
                "tenant id must be at least 3 characters".to_string(),
            ));
        }
        if spec.name.len() < 2 {
            return Err(PlatformError::InvalidArgument(
                "tenant name must be at least 2 characters".to_string(),
            ));
        }
        if !(64..=8192).contains(&spec.memory_limit_mb) {
            return Err(PlatformError::InvalidArgument(
                "memory limit must be between 64 and 8192 MB".to_string(),
            ));
        }
        if !(1..=10_000).contains(&spec.requests_per_second) {
            return Err(PlatformError::InvalidArgument(
                "requests per second must be between 1 and 10000".to_string(),
            ));
        }
        Ok(Self {
            namespace: format!("cache:{id}"),
            id,
            name: spec.name,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
            quotas: TenantQuotas {
                memory_limit_mb: spec.memory_limit_mb,
                requests_per_second: spec.requests_per_second,
                max_connections: spec.max_connections,
            },
            usage: TenantUsage::default(),
            settings: HashMap::new(),
        })
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TenantStatus::Active)
    }

    /// Storage key for this user key within the tenant's namespace (§4.1).
    pub fn cache_key(&self, user_key: &str) -> String {
        format!("cache:{}:{}", self.id, user_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, mem: u64, rps: u32) -> NewTenant {
        NewTenant {
            id: id.to_string(),
            name: "Acme Corp".to_string(),
            memory_limit_mb: mem,
            requests_per_second: rps,
            max_connections: 50,
        }
    }

    #[test]
    fn id_is_lowercased() {
        let t = Tenant::new(spec("ACME", 512, 100), Utc::now()).unwrap();
        assert_eq!(t.id, "acme");
    }

    #[test]
    fn id_too_short_is_rejected() {
        assert!(Tenant::new(spec("ab", 512, 100), Utc::now()).is_err());
    }

    #[test]
    fn memory_limit_out_of_range_is_rejected() {
        assert!(Tenant::new(spec("acme", 32, 100), Utc::now()).is_err());
        assert!(Tenant::new(spec("acme", 9000, 100), Utc::now()).is_err());
    }
}
