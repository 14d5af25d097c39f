// Multi-tenant caching control plane - core library module

pub mod agents;
pub mod autoscaler;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod loadbalancer;
pub mod orchestrator;
pub mod redis_pool;

pub use config::Config;
pub use error::{PlatformError, Result};
