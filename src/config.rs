use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ServiceError;
use crate::experiment::ExperimentConfig;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "0.0.0.0:8001")]
    pub bind_addr: SocketAddr,

    /// Redis host backing the recommendation cache
    #[envconfig(from = "REDIS_HOST", default = "localhost")]
    pub redis_host: String,

    #[envconfig(from = "REDIS_PORT", default = "6379")]
    pub redis_port: u16,

    #[envconfig(from = "REDIS_PASSWORD")]
    pub redis_password: Option<String>,

    /// HS256 secret shared with the token-issuing service
    #[envconfig(from = "JWT_SIGNING_KEY")]
    pub jwt_signing_key: String,

    /// Base URL of the event collector; empty disables event logging
    #[envconfig(from = "EVENT_COLLECTOR_URL", default = "http://localhost:8000")]
    pub event_collector_url: String,

    /// JSON object mapping variant name to weight, e.g. `{"control": 0.5, "variant_a": 0.5}`
    #[envconfig(from = "AB_TEST_STRATEGY_VARIANTS", default = "{}")]
    pub experiment_variants: String,

    /// Expiry of the fallback recommendation set written on a cache miss
    #[envconfig(from = "CACHE_TTL_SECS", default = "3600")]
    pub cache_ttl_secs: u64,

    #[envconfig(from = "CACHE_TIMEOUT_MS", default = "500")]
    pub cache_timeout_ms: u64,

    #[envconfig(from = "COLLECTOR_TIMEOUT_MS", default = "1000")]
    pub collector_timeout_ms: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load and validate configuration from environment variables
    pub fn from_env() -> Result<Self, ServiceError> {
        let config = Config::init_from_env()
            .map_err(|e| ServiceError::ConfigurationInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.jwt_signing_key.is_empty() {
            return Err(ServiceError::ConfigurationInvalid(
                "JWT_SIGNING_KEY cannot be empty".to_string(),
            ));
        }
        if self.redis_host.is_empty() {
            return Err(ServiceError::ConfigurationInvalid(
                "REDIS_HOST cannot be empty".to_string(),
            ));
        }
        if self.cache_timeout_ms == 0 || self.collector_timeout_ms == 0 {
            return Err(ServiceError::ConfigurationInvalid(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if let Some(url) = self.collector_url() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ServiceError::ConfigurationInvalid(format!(
                    "EVENT_COLLECTOR_URL must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }
        self.experiment()?;
        Ok(())
    }

    /// Parse the experiment weight table
    pub fn experiment(&self) -> Result<ExperimentConfig, ServiceError> {
        self.experiment_variants.parse()
    }

    /// Collector base URL, `None` when event logging is disabled
    pub fn collector_url(&self) -> Option<&str> {
        let url = self.event_collector_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_millis(self.collector_timeout_ms)
    }

    /// Redis connection target assembled from host, port and password
    pub fn redis_connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.redis_host.clone(), self.redis_port),
            redis: redis::RedisConnectionInfo {
                db: 0,
                username: None,
                // `REDIS_PASSWORD=` means no password, not an empty one.
                password: self
                    .redis_password
                    .as_deref()
                    .filter(|password| !password.is_empty())
                    .map(str::to_string),
            },
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        redis_host: "localhost".to_string(),
        redis_port: 6379,
        redis_password: None,
        jwt_signing_key: "test-secret".to_string(),
        event_collector_url: String::new(),
        experiment_variants: "{}".to_string(),
        cache_ttl_secs: 3600,
        cache_timeout_ms: 500,
        collector_timeout_ms: 1000,
        log_level: "info".to_string(),
    }
}
