//! Deterministic A/B variant assignment.
//!
//! A user's bucket is derived from a SHA-256 digest of their id projected onto
//! the cumulative weight range, so assignment is a pure function of
//! `(user_id, configuration)` and survives restarts.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ServiceError;

/// Variant served when no experiment is configured.
pub const DEFAULT_VARIANT: &str = "default";

/// Variant name to relative weight. Immutable after startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentConfig {
    variants: BTreeMap<String, f64>,
}

impl ExperimentConfig {
    pub fn new(variants: BTreeMap<String, f64>) -> Result<Self, ServiceError> {
        if variants.is_empty() {
            return Ok(Self::default());
        }

        for (name, weight) in &variants {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ServiceError::ConfigurationInvalid(format!(
                    "variant '{}' has invalid weight {}",
                    name, weight
                )));
            }
        }
        if variants.values().all(|w| *w == 0.0) {
            return Err(ServiceError::ConfigurationInvalid(
                "at least one variant weight must be greater than zero".to_string(),
            ));
        }

        Ok(Self { variants })
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn variants(&self) -> impl Iterator<Item = (&str, f64)> {
        self.variants.iter().map(|(name, w)| (name.as_str(), *w))
    }

    fn total_weight(&self) -> f64 {
        self.variants.values().sum()
    }
}

impl FromStr for ExperimentConfig {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let variants: BTreeMap<String, f64> = serde_json::from_str(raw).map_err(|e| {
            ServiceError::ConfigurationInvalid(format!("experiment variants: {}", e))
        })?;
        Self::new(variants)
    }
}

pub struct VariantAssigner {
    config: ExperimentConfig,
}

impl VariantAssigner {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn assign(&self, user_id: i64) -> &str {
        if self.config.is_empty() {
            return DEFAULT_VARIANT;
        }

        let point = bucket_point(user_id) * self.config.total_weight();
        let mut cumulative = 0.0;
        let mut last_eligible = DEFAULT_VARIANT;
        for (name, weight) in self.config.variants() {
            if weight == 0.0 {
                continue;
            }
            cumulative += weight;
            last_eligible = name;
            if point < cumulative {
                return name;
            }
        }
        // Float rounding can leave `point` a hair past the final boundary.
        last_eligible
    }
}

/// Uniform position in `[0, 1)` for a user id.
fn bucket_point(user_id: i64) -> f64 {
    let digest = Sha256::digest(user_id.to_be_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    // Top 53 bits fit an f64 mantissa exactly.
    (u64::from_be_bytes(prefix) >> 11) as f64 / (1u64 << 53) as f64
}
