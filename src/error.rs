use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failures of the shared record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("a request with this idempotency key is already in progress")]
    Conflict,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("rate limit exceeded")]
    Throttled,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("handler failed: {0}")]
    HandlerFailure(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => ServiceError::StorageUnavailable(msg),
            corrupt @ StoreError::Corrupt { .. } => ServiceError::Internal(corrupt.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("serialization failed: {}", err))
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Conflict => StatusCode::CONFLICT,
            ServiceError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Throttled => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::AlreadyExists(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::HandlerFailure(_)
            | ServiceError::Configuration(_)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Conflict => "conflict",
            ServiceError::StorageUnavailable(_) => "storage_unavailable",
            ServiceError::Throttled => "rate_limit_exceeded",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::AlreadyExists(_) => "already_exists",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::InvalidRequest(_) => "bad_request",
            ServiceError::PayloadTooLarge { .. } => "payload_too_large",
            ServiceError::HandlerFailure(_) => "handler_failure",
            ServiceError::Configuration(_) => "configuration_error",
            ServiceError::Internal(_) => "internal_error",
        }
    }
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
        Self::new(
            err.error_code(),
            &err.to_string(),
            err.status_code().as_u16(),
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let mut response = (status, Json(ErrorResponse::from_service_error(&self))).into_response();
        if matches!(self, ServiceError::Throttled) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_distinct_service_errors() {
        let unavailable: ServiceError = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let corrupt: ServiceError = StoreError::Corrupt {
            key: "idempotency/abc".into(),
            reason: "bad json".into(),
        }
        .into();
        assert_eq!(corrupt.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_conflict_is_not_storage_unavailable() {
        assert_eq!(ServiceError::Conflict.status_code(), StatusCode::CONFLICT);
        assert_ne!(
            ServiceError::Conflict.status_code(),
            ServiceError::StorageUnavailable("down".into()).status_code()
        );
    }

    #[test]
    fn test_throttled_response_carries_retry_after() {
        let response = ServiceError::Throttled.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }

    #[test]
    fn test_error_response_body() {
        let body = ErrorResponse::from_service_error(&ServiceError::NotFound("config app/v1".into()));
        assert_eq!(body.error, "not_found");
        assert_eq!(body.code, 404);
        assert_eq!(body.message, "config app/v1 not found");
    }
}
