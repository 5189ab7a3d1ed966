use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::cache::RecommendationCache;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub cache_status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

/// Pin the uptime origin. Later calls are no-ops.
pub fn mark_start() {
    std::sync::LazyLock::force(&START_TIME);
}

#[derive(Clone)]
pub struct HealthChecker {
    cache: RecommendationCache,
}

impl HealthChecker {
    pub fn new(cache: RecommendationCache) -> Self {
        mark_start();
        Self { cache }
    }

    /// Probe dependencies. Always produces a status; a failed probe only
    /// downgrades it to "degraded".
    pub async fn check_health(&self) -> HealthStatus {
        let uptime = SystemTime::now()
            .duration_since(*START_TIME)
            .unwrap_or_default()
            .as_secs();

        let (status, cache_status) = match self.cache.ping().await {
            Ok(()) => ("ok", "ok".to_string()),
            Err(e) => {
                tracing::warn!(target: "recommender::health", error = %e, "Cache probe failed");
                ("degraded", format!("error: {}", e))
            }
        };

        HealthStatus {
            status: status.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            cache_status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::redis::RedisCache;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_healthy_cache() {
        let checker = HealthChecker::new(RecommendationCache::new(Arc::new(MemoryCache::new())));
        let health = checker.check_health().await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.cache_status, "ok");
    }

    #[tokio::test]
    async fn test_uptime_counts_from_construction() {
        let checker = HealthChecker::new(RecommendationCache::new(Arc::new(MemoryCache::new())));
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let health = checker.check_health().await;
        assert!(health.uptime_seconds >= 1, "uptime was {}", health.uptime_seconds);
    }

    #[tokio::test]
    async fn test_unreachable_cache_is_degraded() {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp("127.0.0.1".to_string(), 1),
            redis: redis::RedisConnectionInfo {
                db: 0,
                username: None,
                password: None,
            },
        };
        let backend = RedisCache::new(info, Duration::from_millis(200)).unwrap();
        let checker = HealthChecker::new(RecommendationCache::new(Arc::new(backend)));

        let health = checker.check_health().await;
        assert_eq!(health.status, "degraded");
        assert!(health.cache_status.starts_with("error: "));
    }

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "ok".to_string(),
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            cache_status: "ok".to_string(),
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"cache_status\":\"ok\""));
        assert!(json.contains("3600"));
    }
}
