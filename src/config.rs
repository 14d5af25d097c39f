use std::collections::HashMap;

/// Redis client-pool configuration (§6). Field names and defaults mirror
/// the original platform's `RedisConfig` dataclass.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    pub max_connections: u32,
    pub connection_timeout: f64,
    pub read_timeout: f64,
    pub write_timeout: f64,
    pub retry_on_timeout: bool,
    pub health_check_interval: u64,
    pub cluster_mode: bool,
    pub cluster_nodes: Vec<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            max_connections: 100,
            connection_timeout: 5.0,
            read_timeout: 30.0,
            write_timeout: 30.0,
            retry_on_timeout: true,
            health_check_interval: 30,
            cluster_mode: false,
            cluster_nodes: Vec::new(),
        }
    }
}

impl RedisConfig {
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(pw) => format!(
                "redis://:{pw}@{host}:{port}/{db}",
                pw = pw,
                host = self.host,
                port = self.port,
                db = self.db
            ),
            None => format!("redis://{host}:{port}/{db}", host = self.host, port = self.port, db = self.db),
        }
    }
}

/// Auto-scaler configuration (§4.3).
#[derive(Debug, Clone)]
pub struct ScalingConfig {
    pub enabled: bool,
    pub min_nodes: u32,
    pub max_nodes: u32,
    pub target_cpu_percent: f64,
    pub target_memory_percent: f64,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub scale_up_cooldown: u64,
    pub scale_down_cooldown: u64,
    pub prediction_window: u64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_nodes: 3,
            max_nodes: 20,
            target_cpu_percent: 70.0,
            target_memory_percent: 80.0,
            scale_up_threshold: 85.0,
            scale_down_threshold: 30.0,
            scale_up_cooldown: 300,
            scale_down_cooldown: 600,
            prediction_window: 3600,
        }
    }
}

/// Alert thresholds consumed by the Health Monitor (§4.5).
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub response_time: f64,
    /// Both on the same 0-100 scale as `CacheMetrics::hit_ratio()`.
    pub hit_ratio_warning: f64,
    pub hit_ratio_critical: f64,
    pub error_rate_warning: f64,
    pub error_rate_critical: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu_usage: 85.0,
            memory_usage: 90.0,
            response_time: 100.0,
            hit_ratio_warning: 70.0,
            hit_ratio_critical: 50.0,
            error_rate_warning: 5.0,
            error_rate_critical: 10.0,
        }
    }
}

/// Monitoring configuration (§4.5).
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub metrics_interval: u64,
    pub health_check_interval: u64,
    pub alert_thresholds: AlertThresholds,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_interval: 30,
            health_check_interval: 10,
            alert_thresholds: AlertThresholds::default(),
        }
    }
}

/// Security configuration; the core only consults `rate_limiting_enabled`
/// and `max_requests_per_minute` (§6) — the rest is read by out-of-core
/// auth/encryption adapters.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub authentication_enabled: bool,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub encryption_enabled: bool,
    pub encryption_key: String,
    pub audit_logging: bool,
    pub rate_limiting_enabled: bool,
    pub max_requests_per_minute: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            authentication_enabled: true,
            jwt_secret: "your-secret-key-change-in-production".to_string(),
            jwt_expiry_hours: 24,
            encryption_enabled: true,
            encryption_key: "your-encryption-key-change-in-production".to_string(),
            audit_logging: true,
            rate_limiting_enabled: true,
            max_requests_per_minute: 1000,
        }
    }
}

/// Defaults applied when `create_tenant` omits fields (§6).
#[derive(Debug, Clone)]
pub struct TenantDefaults {
    pub default_memory_mb: u64,
    pub default_requests_per_second: u32,
    pub default_connections: u32,
    pub isolation_level: String,
    pub quota_enforcement: bool,
    pub billing_enabled: bool,
}

impl Default for TenantDefaults {
    fn default() -> Self {
        Self {
            default_memory_mb: 512,
            default_requests_per_second: 100,
            default_connections: 50,
            isolation_level: "strict".to_string(),
            quota_enforcement: true,
            billing_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_tracing_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "error",
        }
    }
}

/// Top-level platform configuration (§6). Loading from file or environment
/// is out of scope; callers build this programmatically.
#[derive(Debug, Clone)]
pub struct Config {
    pub platform_name: String,
    pub environment: Environment,
    pub log_level: LogLevel,
    pub redis: RedisConfig,
    pub scaling: ScalingConfig,
    pub monitoring: MonitoringConfig,
    pub security: SecurityConfig,
    pub tenants: TenantDefaults,
    pub extra: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform_name: "Caching Platform".to_string(),
            environment: Environment::Development,
            log_level: LogLevel::Info,
            redis: RedisConfig::default(),
            scaling: ScalingConfig::default(),
            monitoring: MonitoringConfig::default(),
            security: SecurityConfig::default(),
            tenants: TenantDefaults::default(),
            extra: HashMap::new(),
        }
    }
}
