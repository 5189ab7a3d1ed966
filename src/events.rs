//! Fire-and-forget reporting of served recommendations to the event collector.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::ServiceError;

const LOG_ENDPOINT: &str = "/api/recommendation-logs/";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationEvent {
    pub user_id: i64,
    pub recommended_merchant_ids: Vec<i64>,
    pub algorithm: String,
    pub timestamp: DateTime<Utc>,
}

impl RecommendationEvent {
    pub fn new(user_id: i64, recommended_merchant_ids: Vec<i64>, algorithm: &str) -> Self {
        Self {
            user_id,
            recommended_merchant_ids,
            algorithm: algorithm.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct EventLogger {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl EventLogger {
    /// `base_url` of `None` yields a logger whose calls are no-ops.
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::ConfigurationInvalid(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: base_url.map(|base| format!("{}{}", base.trim_end_matches('/'), LOG_ENDPOINT)),
        })
    }

    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Dispatch `event` on a background task and return immediately.
    ///
    /// The handle is only useful to tests; callers normally drop it.
    pub fn log(&self, event: RecommendationEvent) -> Option<JoinHandle<()>> {
        let Some(endpoint) = self.endpoint.clone() else {
            tracing::debug!(
                target: "recommender::events",
                "Event collector not configured, skipping recommendation logging"
            );
            return None;
        };

        let client = self.client.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = send(&client, &endpoint, &event).await {
                tracing::warn!(
                    target: "recommender::events",
                    user_id = event.user_id,
                    error = %e,
                    "Failed to log recommendation event"
                );
            }
        }))
    }
}

async fn send(
    client: &reqwest::Client,
    endpoint: &str,
    event: &RecommendationEvent,
) -> Result<(), ServiceError> {
    client
        .post(endpoint)
        .json(event)
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(|e| ServiceError::DependencyDegraded(format!("event collector: {}", e)))?;

    tracing::info!(
        target: "recommender::events",
        user_id = event.user_id,
        algorithm = %event.algorithm,
        "Logged recommendation event"
    );
    Ok(())
}
