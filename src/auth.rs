//! Bearer token verification.
//!
//! Tokens are HS256 JWTs minted by the identity service with a secret shared
//! out-of-band. Any verification failure, including a token that decodes but
//! carries no `user_id`, maps to [`ServiceError::Unauthorized`].

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ServiceError;

/// Role that must never be served consumer recommendations.
pub const MERCHANT_ADMIN_ROLE: &str = "merchant_admin";

/// Raw claims as issued. Everything is optional here so that a missing
/// `user_id` is reported as `Unauthorized` rather than a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, deserialize_with = "lenient_user_id")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    pub exp: u64,
}

/// Accept `user_id` as a JSON integer or a numeric string (`"42"`).
fn lenient_user_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawUserId {
        Int(i64),
        Str(String),
    }

    match Option::<RawUserId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawUserId::Int(id)) => Ok(Some(id)),
        Some(RawUserId::Str(raw)) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("user_id '{}' is not an integer", raw))),
    }
}

/// Verified identity of the caller, scoped to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub user_id: i64,
    pub username: Option<String>,
    pub email: Option<String>,
    pub user_type: Option<String>,
}

impl IdentityClaims {
    pub fn is_merchant_admin(&self) -> bool {
        self.user_type.as_deref() == Some(MERCHANT_ADMIN_ROLE)
    }
}

pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<IdentityClaims, ServiceError> {
        if token.is_empty() {
            return Err(ServiceError::Unauthorized("empty credential".to_string()));
        }

        let data = decode::<TokenClaims>(token, &self.key, &self.validation)
            .map_err(|e| ServiceError::Unauthorized(e.to_string()))?;
        let claims = data.claims;

        let user_id = claims
            .user_id
            .ok_or_else(|| ServiceError::Unauthorized("missing user_id claim".to_string()))?;

        Ok(IdentityClaims {
            user_id,
            username: claims.username,
            email: claims.email,
            user_type: claims.user_type,
        })
    }

    /// Pull the bearer credential out of the `Authorization` header and verify it.
    pub fn verify_headers(&self, headers: &HeaderMap) -> Result<IdentityClaims, ServiceError> {
        let token = bearer_token(headers)?;
        self.verify(token)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ServiceError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ServiceError::Unauthorized("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| ServiceError::Unauthorized("non-ASCII Authorization header".to_string()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| ServiceError::Unauthorized("malformed Authorization header".to_string()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ServiceError::Unauthorized(format!(
            "unsupported auth scheme '{}'",
            scheme
        )));
    }
    Ok(token.trim())
}


#[cfg(test)]
mod tests {
    use super::test_tokens::*;
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "shared-secret";

    #[test]
    fn test_valid_token() {
        let verifier = TokenVerifier::new(SECRET);
        let token = sign(&claims(Some(42), Some("customer")), SECRET);

        let identity = verifier.verify(&token).unwrap();
        assert_eq!(identity.user_id, 42);
        assert_eq!(identity.username.as_deref(), Some("alice"));
        assert_eq!(identity.user_type.as_deref(), Some("customer"));
        assert!(!identity.is_merchant_admin());
    }

    #[test]
    fn test_wrong_secret() {
        let verifier = TokenVerifier::new(SECRET);
        let token = sign(&claims(Some(42), None), "other-secret");
        assert!(matches!(
            verifier.verify(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_wrong_algorithm() {
        let verifier = TokenVerifier::new(SECRET);
        let token = sign_with(&claims(Some(42), None), SECRET, Algorithm::HS512);
        assert!(matches!(
            verifier.verify(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token() {
        let verifier = TokenVerifier::new(SECRET);
        let mut expired = claims(Some(42), None);
        expired.exp = now() - 3600;
        let token = sign(&expired, SECRET);
        assert!(matches!(
            verifier.verify(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_missing_user_id() {
        let verifier = TokenVerifier::new(SECRET);
        let token = sign(&claims(None, None), SECRET);
        assert!(matches!(
            verifier.verify(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_string_user_id_accepted() {
        let verifier = TokenVerifier::new(SECRET);
        let exp = now() + 3600;
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &serde_json::json!({ "user_id": "42", "exp": exp }),
            &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(verifier.verify(&token).unwrap().user_id, 42);

        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &serde_json::json!({ "user_id": "alice", "exp": exp }),
            &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_malformed_token() {
        let verifier = TokenVerifier::new(SECRET);
        assert!(verifier.verify("not.a.jwt").is_err());
        assert!(verifier.verify("").is_err());
    }

    #[test]
    fn test_merchant_admin_role() {
        let verifier = TokenVerifier::new(SECRET);
        let token = sign(&claims(Some(7), Some(MERCHANT_ADMIN_ROLE)), SECRET);
        assert!(verifier.verify(&token).unwrap().is_merchant_admin());
    }

    #[test]
    fn test_bearer_header_parsing() {
        let verifier = TokenVerifier::new(SECRET);
        let token = sign(&claims(Some(5), None), SECRET);

        let mut headers = HeaderMap::new();
        assert!(verifier.verify_headers(&headers).is_err());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", token)).unwrap(),
        );
        assert!(verifier.verify_headers(&headers).is_err());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert_eq!(verifier.verify_headers(&headers).unwrap().user_id, 5);
    }
}
