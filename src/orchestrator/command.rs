//! Command dispatch surface (§4.2, §6): a closed tagged union in place of
//! the original's dynamic string dispatch, so the handler table is
//! exhaustively checkable and unknown variants are rejected in one place.

use serde_json::Value;

use crate::error::PlatformError;

#[derive(Debug, Clone)]
pub enum Command {
    CreateTenant { name: String, quota_memory_mb: u64, quota_requests_per_second: u32, quota_connections: u32 },
    DeleteTenant { name: String },
    ListTenants,
    GetTenantDetails { name: String },
    ModifyTenantQuotas { name: String, quota_memory_mb: Option<u64>, quota_requests_per_second: Option<u32> },
    CacheGet { tenant: String, key: String },
    CacheSet { tenant: String, key: String, value: Value, ttl: Option<u64> },
    CacheDelete { tenant: String, key: String },
    GetMetrics { tenant: String, limit: Option<usize> },
    GetClusterStatus,
    ScaleCluster { action: ScaleAction, nodes: u32 },
    GetScalingStatus,
    ConfigureScaling {
        min_nodes: Option<u32>,
        max_nodes: Option<u32>,
        scale_up_threshold: Option<f64>,
        scale_down_threshold: Option<f64>,
        scale_up_cooldown: Option<u64>,
        scale_down_cooldown: Option<u64>,
    },
    AcknowledgeAlert { alert_id: String },
    ResolveAlert { alert_id: String },
    CreateBackup { tenant: String },
    RestoreBackup { tenant: String, snapshot: Value },
    HealthCheck,
    LoadTest { duration_secs: u64, concurrency: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAction {
    Up,
    Down,
}

/// Parses the original's `(name, params)` shape into a closed [`Command`].
/// Unknown names are rejected here, in one place, per the redesign note.
pub fn from_name_params(name: &str, params: Value) -> Result<Command, PlatformError> {
    let get_str = |key: &str| -> Result<String, PlatformError> {
        params
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PlatformError::InvalidArgument(format!("missing field: {key}")))
    };
    let get_u64 = |key: &str, default: u64| -> u64 { params.get(key).and_then(Value::as_u64).unwrap_or(default) };
    let get_opt_u64 = |key: &str| -> Option<u64> { params.get(key).and_then(Value::as_u64) };
    let get_opt_f64 = |key: &str| -> Option<f64> { params.get(key).and_then(Value::as_f64) };

    Ok(match name {
        "create_tenant" => Command::CreateTenant {
            name: get_str("name")?,
            quota_memory_mb: get_u64("quota_memory_mb", 0),
            quota_requests_per_second: get_u64("quota_requests_per_second", 0) as u32,
            quota_connections: get_u64("quota_connections", 0) as u32,
        },
        "delete_tenant" => Command::DeleteTenant { name: get_str("name")? },
        "list_tenants" => Command::ListTenants,
        "get_tenant_details" => Command::GetTenantDetails { name: get_str("name")? },
        "modify_tenant_quotas" => Command::ModifyTenantQuotas {
            name: get_str("name")?,
            quota_memory_mb: get_opt_u64("quota_memory_mb"),
            quota_requests_per_second: get_opt_u64("quota_requests_per_second").map(|v| v as u32),
        },
        "cache_get" => Command::CacheGet { tenant: get_str("tenant")?, key: get_str("key")? },
        "cache_set" => Command::CacheSet {
            tenant: get_str("tenant")?,
            key: get_str("key")?,
            value: params.get("value").cloned().unwrap_or(Value::Null),
            ttl: get_opt_u64("ttl"),
        },
        "cache_delete" => Command::CacheDelete { tenant: get_str("tenant")?, key: get_str("key")? },
        "get_metrics" => Command::GetMetrics {
            tenant: get_str("tenant").unwrap_or_else(|_| "all".to_string()),
            limit: get_opt_u64("limit").map(|v| v as usize),
        },
        "get_cluster_status" => Command::GetClusterStatus,
        "scale_cluster" => {
            let action = match get_str("action")?.as_str() {
                "up" => ScaleAction::Up,
                "down" => ScaleAction::Down,
                other => return Err(PlatformError::InvalidArgument(format!("unknown scale action: {other}"))),
            };
            Command::ScaleCluster { action, nodes: get_u64("nodes", 1) as u32 }
        }
        "get_scaling_status" => Command::GetScalingStatus,
        "configure_scaling" => Command::ConfigureScaling {
            min_nodes: get_opt_u64("min_nodes").map(|v| v as u32),
            max_nodes: get_opt_u64("max_nodes").map(|v| v as u32),
            scale_up_threshold: get_opt_f64("scale_up_threshold"),
            scale_down_threshold: get_opt_f64("scale_down_threshold"),
            scale_up_cooldown: get_opt_u64("scale_up_cooldown"),
            scale_down_cooldown: get_opt_u64("scale_down_cooldown"),
        },
        "acknowledge_alert" => Command::AcknowledgeAlert { alert_id: get_str("alert_id")? },
        "resolve_alert" => Command::ResolveAlert { alert_id: get_str("alert_id")? },
        "create_backup" => Command::CreateBackup { tenant: get_str("tenant")? },
        "restore_backup" => Command::RestoreBackup {
            tenant: get_str("tenant")?,
            snapshot: params.get("snapshot").cloned().unwrap_or(Value::Null),
        },
        "health_check" => Command::HealthCheck,
        "load_test" => {
            Command::LoadTest { duration_secs: get_u64("duration", 10), concurrency: get_u64("concurrency", 1) as u32 }
        }
        other => return Err(PlatformError::UnknownCommand(other.to_string())),
    })
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub ok: bool,
    pub payload: Value,
    pub error: Option<String>,
    pub detail: Option<String>,
}

impl CommandResponse {
    pub fn ok(payload: Value) -> Self {
        Self { ok: true, payload, error: None, detail: None }
    }

    pub fn err(e: &PlatformError) -> Self {
        Self { ok: false, payload: Value::Null, error: Some(e.code().to_string()), detail: Some(e.to_string()) }
    }
}
