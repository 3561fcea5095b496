//! Health check module
//! Provides health status for the service and the stores it depends on

use serde::Serialize;
use std::collections::HashMap;
#[cfg(feature = "cache")]
use std::time::{Duration, Instant};
#[cfg(feature = "cache")]
use tokio::time::timeout;
#[cfg(feature = "cache")]
use tracing::{error, info};

#[cfg(feature = "cache")]
use crate::cache::RedisPool;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

/// Health checker for the service
#[derive(Clone, Default)]
pub struct HealthChecker {
    #[cfg(feature = "cache")]
    cache: Option<RedisPool>,
}

impl HealthChecker {
    #[cfg(feature = "cache")]
    pub fn new(cache: Option<RedisPool>) -> Self {
        Self { cache }
    }

    #[cfg(not(feature = "cache"))]
    pub fn new() -> Self {
        Self {}
    }

    /// Check every configured store; in-memory stores are always up
    pub async fn check_health(&self) -> HealthStatus {
        #[allow(unused_mut)]
        let mut health_status = HealthStatus::new();

        #[cfg(feature = "cache")]
        if let Some(pool) = &self.cache {
            let component = match timeout(Duration::from_secs(5), check_cache_health(pool)).await {
                Ok(Ok(response_time)) => {
                    info!("Cache health check: OK ({}ms)", response_time);
                    ComponentHealth::up(Some(response_time))
                }
                Ok(Err(e)) => {
                    error!("Cache health check failed: {}", e);
                    ComponentHealth::down(Some(e.to_string()))
                }
                Err(_) => {
                    error!("Cache health check timed out");
                    ComponentHealth::down(Some("Timeout".to_string()))
                }
            };
            if component.status == ComponentState::Down {
                health_status.status = HealthState::Unhealthy;
            }
            health_status.checks.insert("cache".to_string(), component);
        }

        health_status
    }
}

#[cfg(feature = "cache")]
pub async fn check_cache_health(pool: &RedisPool) -> Result<u128, crate::cache::error::CacheError> {
    let start = Instant::now();
    crate::cache::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}
