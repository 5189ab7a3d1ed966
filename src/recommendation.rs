use serde::{Deserialize, Serialize};
use serde_json::value::{to_raw_value, RawValue};
use std::time::Duration;

use crate::auth::MERCHANT_ADMIN_ROLE;
use crate::cache::RecommendationCache;

/// Key of the shared, non-personalized recommendation set.
pub const RECOMMENDATIONS_CACHE_KEY: &str = "dummy_recommended_merchants";

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// One served item, kept verbatim as it was cached. Only `id` is ever read.
pub type RecommendationPayload = Box<RawValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub description: String,
    pub image: String,
}

impl RecommendationItem {
    fn new(id: i64, name: &str, address: &str, description: &str, image: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            address: address.to_string(),
            description: description.to_string(),
            image: image.to_string(),
        }
    }
}

/// Static catalog served whenever the cache has nothing to offer.
pub fn default_catalog() -> Vec<RecommendationItem> {
    vec![
        RecommendationItem::new(
            1,
            "Cozy Coffee Shop",
            "123 Main St",
            "Great coffee and ambiance.",
            "http://example.com/coffee.jpg",
        ),
        RecommendationItem::new(
            2,
            "Zen Spa",
            "456 Oak Ave",
            "Relaxing massage and wellness services.",
            "http://example.com/spa.jpg",
        ),
        RecommendationItem::new(
            3,
            "Quick Bites Diner",
            "789 Pine Ln",
            "Classic American comfort food.",
            "http://example.com/diner.jpg",
        ),
    ]
}

fn fallback_payload() -> Vec<RecommendationPayload> {
    default_catalog()
        .iter()
        .filter_map(|item| to_raw_value(item).ok())
        .collect()
}

#[derive(Deserialize)]
struct ItemId {
    id: i64,
}

/// Integer `id` of each served item, in order. Items without one are skipped.
pub fn merchant_ids(items: &[RecommendationPayload]) -> Vec<i64> {
    items
        .iter()
        .filter_map(|raw| serde_json::from_str::<ItemId>(raw.get()).ok())
        .map(|item| item.id)
        .collect()
}

/// Cache-first recommendation lookup with a static fallback.
///
/// Never fails: an unreachable cache degrades to the default catalog.
#[derive(Clone)]
pub struct RecommendationProvider {
    cache: RecommendationCache,
    ttl: Duration,
}

impl RecommendationProvider {
    pub fn new(cache: RecommendationCache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn cache(&self) -> &RecommendationCache {
        &self.cache
    }

    pub async fn get_recommendations(
        &self,
        user_id: i64,
        user_role: Option<&str>,
    ) -> Vec<RecommendationPayload> {
        if user_role == Some(MERCHANT_ADMIN_ROLE) {
            tracing::debug!(
                target: "recommender::provider",
                user_id,
                "Merchant admin account, no recommendations served"
            );
            return Vec::new();
        }

        match self.cache.get(RECOMMENDATIONS_CACHE_KEY).await {
            Ok(Some(items)) => {
                tracing::debug!(target: "recommender::provider", user_id, "Cache hit");
                items
            }
            Ok(None) => {
                tracing::info!(
                    target: "recommender::provider",
                    user_id,
                    "Recommendations not cached, generating defaults"
                );
                let items = fallback_payload();
                if let Err(e) = self
                    .cache
                    .set(RECOMMENDATIONS_CACHE_KEY, &items, self.ttl)
                    .await
                {
                    tracing::warn!(
                        target: "recommender::provider",
                        error = %e,
                        "Failed to populate recommendation cache"
                    );
                }
                items
            }
            Err(e) => {
                tracing::warn!(
                    target: "recommender::provider",
                    user_id,
                    error = %e,
                    "Cache unavailable, returning default recommendations"
                );
                fallback_payload()
            }
        }
    }
}
