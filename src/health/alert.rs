use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A monitoring alert (§3). Lifecycle: created -> acknowledged? -> resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub source: String,
    pub category: String,
    pub tenant_id: Option<String>,
    pub node_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    pub resolved: bool,
    pub metadata: HashMap<String, String>,
}

impl Alert {
    pub fn new(
        id: String,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: AlertSeverity,
        source: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            message: message.into(),
            severity,
            source: source.into(),
            category: category.into(),
            tenant_id: None,
            node_id: None,
            created_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
            acknowledged: false,
            resolved: false,
            metadata: HashMap::new(),
        }
    }

    /// Two alerts are equivalent for dedup purposes when they share a
    /// source and category (§4.5: "an alert equivalent to an active alert
    /// from the same source within 60s is dropped").
    pub fn is_equivalent(&self, source: &str, category: &str) -> bool {
        self.source == source && self.category == category
    }
}

/// Out-of-band escalation hook for `critical` alerts (§4.5). The original
/// only logs; this crate pins the seam to a trait so a real notifier can be
/// injected without touching the Health Monitor.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, alert: &Alert);
}

pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn notify(&self, alert: &Alert) {
        error!(alert_id = %alert.id, title = %alert.title, "critical alert escalated");
    }
}
