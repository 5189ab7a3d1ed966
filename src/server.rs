use crate::cache::RecommendationCache;
use crate::config::Config;
use crate::error::ServiceError;
use crate::events::EventLogger;
use crate::handlers::{get_recommendations, health_check, AppState, SharedState};
use crate::health;
use crate::middleware::logging_middleware;
use crate::redis::RedisCache;
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the router around prepared state.
pub fn create_app(state: SharedState) -> Router {
    Router::new()
        .route("/health/", get(health_check))
        .route("/get-recommendations/", get(get_recommendations))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, ServiceError> {
        health::mark_start();

        let backend = RedisCache::new(config.redis_connection_info(), config.cache_timeout())?;
        let cache = RecommendationCache::new(Arc::new(backend));

        match cache.ping().await {
            Ok(()) => tracing::info!("Connected to Redis at {}:{}", config.redis_host, config.redis_port),
            Err(e) => tracing::warn!(
                error = %e,
                "Could not connect to Redis, serving default recommendations until it recovers"
            ),
        }

        let events = EventLogger::new(config.collector_url(), config.collector_timeout())?;
        if !events.is_enabled() {
            tracing::warn!("EVENT_COLLECTOR_URL not set, recommendation logging disabled");
        }

        let state = Arc::new(AppState::new(&config, cache, events)?);
        let variants: Vec<_> = state.assigner.config().variants().collect();
        tracing::info!(variants = ?variants, "Experiment configuration loaded");

        Ok(Self {
            app: create_app(state),
            bind_addr: config.bind_addr,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Recommender server starting on {}", self.bind_addr);
        tracing::info!("Health check available at /health/");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
