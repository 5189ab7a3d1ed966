use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    /// Missing, malformed, wrongly signed or expired credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A secondary dependency (cache, event collector) could not be reached.
    /// Absorbed at the component boundary, never returned to a caller.
    #[error("Dependency degraded: {0}")]
    DependencyDegraded(String),

    /// Startup configuration could not be parsed or validated.
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_service_error(err: &ServiceError) -> Self {
        match err {
            // Verification detail stays in the server log.
            ServiceError::Unauthorized(_) => {
                Self::new("unauthorized", "Could not validate credentials", 401)
            }
            ServiceError::DependencyDegraded(msg) => Self::new("service_unavailable", msg, 503),
            ServiceError::ConfigurationInvalid(msg) => Self::new("configuration_error", msg, 500),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_service_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (status, Json(body)).into_response();
        if let ServiceError::Unauthorized(_) = self {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
