// Caching platform control-plane entry point.
//
// Boots the Redis-backed pool, wires the Cache Manager, Load Balancer,
// Health Monitor, Auto-Scaler and the four agents through the
// Orchestrator, then serves until a shutdown signal arrives.

use std::sync::Arc;

use caching_platform::clock::SystemClock;
use caching_platform::health::TracingAlertSink;
use caching_platform::orchestrator::Orchestrator;
use caching_platform::redis_pool::RedisPool;
use caching_platform::{Config, Result};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::default();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(config.log_level.as_tracing_filter())
        .init();

    print_banner(&config);

    let redis = RedisPool::connect(&config.redis).await?;
    let clock = Arc::new(SystemClock);
    let alert_sink = Arc::new(TracingAlertSink);

    let orchestrator = Orchestrator::new(config, Arc::new(redis), clock, alert_sink);

    orchestrator.start();
    info!("orchestrator started, background loops running");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    orchestrator.shutdown().await;
    info!("shutdown complete");

    Ok(())
}

fn print_banner(config: &Config) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║  {:<52}  ║", config.platform_name);
    println!("║  multi-tenant caching control plane                   ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!("environment: {:?}", config.environment);
    println!("redis:       {}:{}", config.redis.host, config.redis.port);
    println!(
        "scaling:     {}..{} nodes (enabled={})",
        config.scaling.min_nodes, config.scaling.max_nodes, config.scaling.enabled
    );
    println!();
}
