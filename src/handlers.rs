use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::cache::RecommendationCache;
use crate::config::Config;
use crate::error::ServiceError;
use crate::events::{EventLogger, RecommendationEvent};
use crate::experiment::VariantAssigner;
use crate::health::HealthChecker;
use crate::recommendation::{merchant_ids, RecommendationPayload, RecommendationProvider};

/// Shared application state. Read-only after startup.
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub verifier: TokenVerifier,
    pub assigner: VariantAssigner,
    pub provider: RecommendationProvider,
    pub health: HealthChecker,
    pub events: EventLogger,
}

impl AppState {
    /// Wire the pipeline around an already constructed cache.
    pub fn new(
        config: &Config,
        cache: RecommendationCache,
        events: EventLogger,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            verifier: TokenVerifier::new(&config.jwt_signing_key),
            assigner: VariantAssigner::new(config.experiment()?),
            provider: RecommendationProvider::new(cache.clone(), config.cache_ttl()),
            health: HealthChecker::new(cache),
            events,
        })
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.health.check_health().await)
}

/// Recommended merchants for the authenticated caller
pub async fn get_recommendations(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RecommendationPayload>>, ServiceError> {
    let claims = state.verifier.verify_headers(&headers).map_err(|e| {
        tracing::info!(target: "recommender::handlers", error = %e, "Rejected credential");
        e
    })?;

    let variant = state.assigner.assign(claims.user_id);
    tracing::info!(
        target: "recommender::handlers",
        user_id = claims.user_id,
        username = claims.username.as_deref().unwrap_or("-"),
        variant = %variant,
        "Assigned A/B test variant"
    );

    let items = state
        .provider
        .get_recommendations(claims.user_id, claims.user_type.as_deref())
        .await;

    // Merchant admins are never served, so there is nothing to report.
    if !claims.is_merchant_admin() {
        // Handle dropped: the response never waits on the collector.
        let _ = state.events.log(RecommendationEvent::new(
            claims.user_id,
            merchant_ids(&items),
            variant,
        ));
    }

    Ok(Json(items))
}
