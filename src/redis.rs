use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionInfo, RedisResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;

use crate::cache::CacheBackend;
use crate::error::ServiceError;

/// Redis-backed cache. The connection is opened lazily, shared by all
/// requests, and dropped after any failure so the next call reconnects.
pub struct RedisCache {
    client: Client,
    connection: Arc<Mutex<Option<MultiplexedConnection>>>,
    timeout: Duration,
}

impl RedisCache {
    pub fn new(info: ConnectionInfo, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::open(info).map_err(|e| {
            ServiceError::ConfigurationInvalid(format!("Failed to create Redis client: {}", e))
        })?;

        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(None)),
            timeout,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, ServiceError> {
        if let Some(conn) = self.connection.lock().await.as_ref() {
            return Ok(conn.clone());
        }

        // Connect with the lock released so concurrent callers each wait at
        // most one timeout instead of queueing behind each other.
        let conn = self
            .bounded("connect", self.client.get_multiplexed_tokio_connection())
            .await?;

        let mut guard = self.connection.lock().await;
        match guard.as_ref() {
            // Another caller won the race; keep a single shared connection.
            Some(existing) => Ok(existing.clone()),
            None => {
                tracing::info!(target: "recommender::redis", "Connected to Redis");
                *guard = Some(conn.clone());
                Ok(conn)
            }
        }
    }

    async fn invalidate(&self) {
        *self.connection.lock().await = None;
    }

    async fn bounded<T>(
        &self,
        op: &str,
        fut: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, ServiceError> {
        match time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ServiceError::DependencyDegraded(format!(
                "{} failed: {}",
                op, e
            ))),
            Err(_) => Err(ServiceError::DependencyDegraded(format!(
                "{} timed out after {:?}",
                op, self.timeout
            ))),
        }
    }

    async fn query<T: redis::FromRedisValue>(
        &self,
        op: &str,
        cmd: &redis::Cmd,
    ) -> Result<T, ServiceError> {
        let mut conn = self.connection().await?;
        let result = self.bounded(op, cmd.query_async(&mut conn)).await;
        if result.is_err() {
            self.invalidate().await;
        }
        result
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        self.query("GET", redis::cmd("GET").arg(key)).await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), ServiceError> {
        // SETEX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        self.query::<()>("SETEX", redis::cmd("SETEX").arg(key).arg(seconds).arg(value))
            .await
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        let _: String = self.query("PING", &redis::cmd("PING")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_info() -> ConnectionInfo {
        // Port 1 on loopback refuses connections.
        ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp("127.0.0.1".to_string(), 1),
            redis: redis::RedisConnectionInfo {
                db: 0,
                username: None,
                password: None,
            },
        }
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_degraded() {
        let cache = RedisCache::new(unreachable_info(), Duration::from_millis(200)).unwrap();

        assert!(matches!(
            cache.ping().await,
            Err(ServiceError::DependencyDegraded(_))
        ));
        assert!(matches!(
            cache.get("any").await,
            Err(ServiceError::DependencyDegraded(_))
        ));
        assert!(cache
            .set_with_expiry("any", "[]", Duration::from_secs(1))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_timeout_budget() {
        // Non-routable address: connects hang until the timeout fires.
        let info = ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp("10.255.255.1".to_string(), 6379),
            redis: redis::RedisConnectionInfo {
                db: 0,
                username: None,
                password: None,
            },
        };
        let timeout = Duration::from_millis(200);
        let cache = Arc::new(RedisCache::new(info, timeout).unwrap());

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..10 {
            let cache = cache.clone();
            tasks.spawn(async move {
                let started = std::time::Instant::now();
                let result = cache.get(&format!("key-{}", i)).await;
                (result.is_err(), started.elapsed())
            });
        }

        let mut worst = Duration::ZERO;
        while let Some(joined) = tasks.join_next().await {
            let (failed, elapsed) = joined.unwrap();
            assert!(failed);
            worst = worst.max(elapsed);
        }
        assert!(worst < timeout * 3, "slowest call took {:?}", worst);
    }
}
