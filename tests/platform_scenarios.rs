//! End-to-end scenarios over `FakeRedis` and a `TestClock`, covering the
//! seed scenarios: basic round-trip, isolation, quota boundary, scale-up
//! under load with cooldown, consistent routing with failover, and alert
//! lifecycle/dedup.

use std::sync::Arc;

use caching_platform::autoscaler::{AggregateMetrics, AutoScaler, DecisionType};
use caching_platform::cache::{CacheManager, NewTenant};
use caching_platform::clock::{Clock, TestClock};
use caching_platform::config::{AlertThresholds, ScalingConfig, TenantDefaults};
use caching_platform::health::{AlertSeverity, HealthMonitor, TracingAlertSink};
use caching_platform::loadbalancer::{LoadBalancer, Node};
use caching_platform::redis_pool::FakeRedis;

fn new_tenant(id: &str, memory_mb: u64, rps: u32) -> NewTenant {
    NewTenant {
        id: id.to_string(),
        name: format!("{id} corp"),
        memory_limit_mb: memory_mb,
        requests_per_second: rps,
        max_connections: 50,
    }
}

fn cache_manager() -> (CacheManager, Arc<TestClock>) {
    let clock = Arc::new(TestClock::new());
    let redis = Arc::new(FakeRedis::new(clock.clone() as Arc<dyn Clock>));
    let manager = CacheManager::new(redis, clock.clone(), TenantDefaults::default());
    (manager, clock)
}

#[tokio::test]
async fn basic_round_trip() {
    let (cache, _clock) = cache_manager();
    cache.create_tenant(new_tenant("acme", 512, 1000)).await.unwrap();

    cache
        .set("acme", "k", serde_json::json!("v"), Some(3600))
        .await
        .unwrap();
    assert_eq!(cache.get("acme", "k").await.unwrap(), Some(serde_json::json!("v")));

    cache.delete("acme", "k").await.unwrap();
    assert_eq!(cache.get("acme", "k").await.unwrap(), None);
}

#[tokio::test]
async fn tenant_keyspaces_are_isolated() {
    let (cache, _clock) = cache_manager();
    cache.create_tenant(new_tenant("t1", 512, 1000)).await.unwrap();
    cache.create_tenant(new_tenant("t2", 512, 1000)).await.unwrap();

    cache.set("t1", "k", serde_json::json!("v1"), None).await.unwrap();
    cache.set("t2", "k", serde_json::json!("v2"), None).await.unwrap();

    assert_eq!(cache.get("t1", "k").await.unwrap(), Some(serde_json::json!("v1")));
    assert_eq!(cache.get("t2", "k").await.unwrap(), Some(serde_json::json!("v2")));
}

#[tokio::test]
async fn fifth_set_past_quota_is_rejected() {
    let (cache, _clock) = cache_manager();
    cache.create_tenant(new_tenant("acme", 64, 1000)).await.unwrap();
    // modify_tenant_quotas performs no range re-validation, matching the
    // admin path's ability to retune quotas below the creation-time bounds.
    cache.modify_tenant_quotas("acme", Some(1), None).unwrap();

    // ~256 KiB of JSON-encoded payload per set (quota is 1 MiB): four
    // distinct sets fit, a fifth pushes the running total over the limit.
    let raw = "x".repeat(262_132);
    let value = serde_json::json!(raw);
    for i in 0..4 {
        cache
            .set("acme", &format!("k{i}"), value.clone(), None)
            .await
            .unwrap();
    }

    let tenant = cache.get_tenant("acme").unwrap();
    assert!(tenant.usage.current_memory_mb <= 1.0 + 1e-6);

    let result = cache.set("acme", "k4", value, None).await;
    assert!(matches!(result, Err(caching_platform::PlatformError::QuotaExceeded(_))));
}

#[tokio::test]
async fn scale_up_under_load_respects_cooldown() {
    let clock = Arc::new(TestClock::new());
    let redis = Arc::new(FakeRedis::new(clock.clone() as Arc<dyn Clock>));
    let lb = Arc::new(LoadBalancer::new(redis, clock.clone() as Arc<dyn Clock>));
    for id in ["node-a", "node-b"] {
        lb.add_node(Node::new(id, "127.0.0.1", 6379)).unwrap();
    }

    let config = ScalingConfig {
        min_nodes: 2,
        max_nodes: 5,
        scale_up_threshold: 80.0,
        scale_up_cooldown: 60,
        ..ScalingConfig::default()
    };
    let scaler = AutoScaler::new(config, clock.clone() as Arc<dyn Clock>, lb.clone());

    let load = AggregateMetrics { cpu: 85.0, memory: 40.0, request_rate: 500.0 };

    let decision = scaler.decide(load).expect("expected a scale-up decision");
    assert_eq!(decision.decision_type, DecisionType::ScaleUp);
    assert_eq!(decision.target_nodes, 3);
    scaler.execute(decision).await.unwrap();
    assert_eq!(scaler.current_nodes(), 3);

    // Within the 60s cooldown, no further decision is produced.
    assert!(scaler.decide(load).is_none());

    // At 61s with metrics still above threshold, a new scale-up fires.
    clock.advance(std::time::Duration::from_secs(61));
    let decision = scaler.decide(load).expect("cooldown should have elapsed");
    assert_eq!(decision.decision_type, DecisionType::ScaleUp);
    assert_eq!(decision.target_nodes, 4);
}

#[tokio::test]
async fn routing_is_consistent_until_the_chosen_node_fails() {
    let clock = Arc::new(TestClock::new());
    let redis = Arc::new(FakeRedis::new(clock.clone() as Arc<dyn Clock>));
    let lb = LoadBalancer::new(redis, clock as Arc<dyn Clock>);
    for id in ["a", "b", "c"] {
        lb.add_node(Node::new(id, "127.0.0.1", 6379)).unwrap();
    }

    let first = lb.select("acme", Some("session:42")).unwrap();
    for _ in 0..10 {
        assert_eq!(lb.select("acme", Some("session:42")).unwrap(), first);
    }

    lb.mark_offline(&first);
    let after_failover = lb.select("acme", Some("session:42")).unwrap();
    assert_ne!(after_failover, first);
    assert!(lb.list_nodes().iter().any(|n| n.id == after_failover && n.is_healthy()));
}

#[tokio::test]
async fn critical_alert_lifecycle_and_dedup() {
    let clock = Arc::new(TestClock::new());
    let redis = Arc::new(FakeRedis::new(clock.clone() as Arc<dyn Clock>));
    let monitor = HealthMonitor::new(
        redis,
        clock.clone() as Arc<dyn Clock>,
        AlertThresholds::default(),
        Arc::new(TracingAlertSink),
    );

    monitor.observe_disk_usage(96.0).await;
    let alerts = monitor.get_alerts(None, None, 10);
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.severity, AlertSeverity::Warning);

    assert!(monitor.acknowledge_alert(&alert.id));
    assert!(monitor.resolve_alert(&alert.id));
    let updated = monitor.get_alerts(None, None, 10);
    assert!(updated[0].acknowledged);
    assert!(updated[0].resolved);

    // The prior alert is already resolved, so a fresh sample raises a new
    // one immediately even within the 60s dedup window.
    monitor.observe_disk_usage(97.0).await;
    assert_eq!(monitor.get_alerts(None, None, 10).len(), 2);

    // A second duplicate sample while that new alert is still unresolved
    // and within the window is suppressed.
    monitor.observe_disk_usage(97.0).await;
    assert_eq!(monitor.get_alerts(None, None, 10).len(), 2);

    // Once the window elapses, a new alert fires even though the previous
    // one is still unresolved.
    clock.advance(std::time::Duration::from_secs(61));
    monitor.observe_disk_usage(97.0).await;
    assert_eq!(monitor.get_alerts(None, None, 10).len(), 3);
}
