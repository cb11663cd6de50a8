use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{response::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::idempotency::{Execution, IdempotencyCoordinator, Outcome, IDEMPOTENCY_KEY_HEADER};
use crate::key_generator::{socket_identity, UNKNOWN_IDENTITY};
use crate::rate_limiter::AdmissionGate;
use crate::response::replay_response;

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client = request_identity(&request);

    info!(
        target: "config_service::middleware",
        method = %method,
        uri = %uri,
        client = %client,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "config_service::middleware",
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}

/// Throttle requests per client identity before anything else runs.
pub async fn rate_limit_middleware(
    State(gate): State<AdmissionGate>,
    request: Request,
    next: Next,
) -> Response {
    let client = request_identity(&request);

    if !gate.admit(&client) {
        warn!(
            target: "config_service::middleware",
            client = %client,
            uri = %request.uri(),
            "Rate limit exceeded"
        );
        return ServiceError::Throttled.into_response();
    }

    next.run(request).await
}

/// Deduplicate requests carrying an `Idempotency-Key` header.
pub async fn idempotency_middleware(
    State(coordinator): State<Arc<IdempotencyCoordinator>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(key) = idempotency_key(request.headers()) else {
        return next.run(request).await;
    };

    let limit = coordinator.body_limit();
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, limit).await {
        Ok(body) => body,
        Err(err) => {
            warn!(
                target: "config_service::middleware",
                key = %key,
                error = %err,
                "Failed to buffer request body"
            );
            return ServiceError::PayloadTooLarge { limit }.into_response();
        }
    };
    let request = Request::from_parts(parts, Body::from(body));

    let downstream = async move {
        let response = next.run(request).await;
        let (parts, body) = response.into_parts();
        let body = to_bytes(body, limit).await.map_err(|err| {
            ServiceError::HandlerFailure(format!(
                "response body could not be buffered within {} bytes: {}",
                limit, err
            ))
        })?;
        Ok::<_, ServiceError>(BufferedResponse { parts, body })
    };

    match coordinator.execute(Some(key.as_str()), downstream).await {
        Ok(Execution::Executed(buffered)) => buffered.into_response(),
        Ok(Execution::Replayed(stored)) => {
            info!(
                target: "config_service::middleware",
                key = %key,
                status = stored.status_code,
                "Replaying stored response"
            );
            replay_response(stored)
        }
        Err(err) => {
            if matches!(err, ServiceError::Conflict) {
                warn!(
                    target: "config_service::middleware",
                    key = %key,
                    "Rejected concurrent request for idempotency key"
                );
            }
            err.into_response()
        }
    }
}

/// A handler response held in memory so it can be stored and replayed.
struct BufferedResponse {
    parts: Parts,
    body: Bytes,
}

impl Outcome for BufferedResponse {
    fn status_code(&self) -> u16 {
        self.parts.status.as_u16()
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}

impl IntoResponse for BufferedResponse {
    fn into_response(self) -> Response {
        Response::from_parts(self.parts, Body::from(self.body))
    }
}

/// Non-blank `Idempotency-Key` header value, if any.
///
/// The key is opaque. UTF-8 values are kept as sent; any other bytes are
/// base64-encoded so distinct keys never collapse into one.
pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(IDEMPOTENCY_KEY_HEADER)?.as_bytes().trim_ascii();
    if raw.is_empty() {
        return None;
    }

    Some(match std::str::from_utf8(raw) {
        Ok(key) => key.to_string(),
        Err(_) => format!("b64:{}", URL_SAFE_NO_PAD.encode(raw)),
    })
}

fn request_identity(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| socket_identity(addr))
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_idempotency_key_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers), None);

        headers.insert("Idempotency-Key", HeaderValue::from_static("   "));
        assert_eq!(idempotency_key(&headers), None);

        headers.insert("Idempotency-Key", HeaderValue::from_static(" abc123 "));
        assert_eq!(idempotency_key(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn test_non_ascii_idempotency_key_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Idempotency-Key",
            HeaderValue::from_bytes("café-42".as_bytes()).unwrap(),
        );
        assert_eq!(idempotency_key(&headers), Some("café-42".to_string()));

        headers.insert("Idempotency-Key", HeaderValue::from_bytes(b"key-\xff").unwrap());
        let encoded = idempotency_key(&headers).unwrap();
        assert_eq!(encoded, "b64:a2V5Lf8");

        headers.insert("Idempotency-Key", HeaderValue::from_bytes(b"key-\xfe").unwrap());
        assert_ne!(idempotency_key(&headers).unwrap(), encoded);
    }

    #[test]
    fn test_request_identity_from_connect_info() {
        let mut request = Request::new(Body::empty());
        let addr: SocketAddr = "192.168.1.1:40000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));

        assert_eq!(request_identity(&request), "192.168.1.1");
    }

    #[test]
    fn test_request_identity_fallback() {
        let request = Request::new(Body::empty());
        assert_eq!(request_identity(&request), "unknown");
    }
}
