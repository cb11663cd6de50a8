#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use config_service::{create_app, AdmissionGate, AppState, IdempotencyCoordinator, MemoryStore};
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

pub const CLIENT: &str = "10.0.0.1:52000";

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub gate: AdmissionGate,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub fn test_app() -> TestApp {
    test_app_with_limits(1000.0, 1000)
}

pub fn test_app_with_limits(rate: f64, burst: u32) -> TestApp {
    let store = MemoryStore::new();
    let gate = AdmissionGate::new(rate, burst);
    let coordinator = Arc::new(IdempotencyCoordinator::new(
        Arc::new(store.clone()),
        "idempotency",
    ));
    let router = create_app(AppState::new(Arc::new(store.clone())), gate.clone(), coordinator);

    TestApp { router, store, gate }
}

/// Build a request as if it arrived on a connection from `CLIENT`.
pub fn request(
    method: Method,
    uri: &str,
    idempotency_key: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }

    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };

    let mut request = builder.body(body).unwrap();
    let addr: SocketAddr = CLIENT.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();

    TestResponse { status, headers, body }
}

/// Poll until the store holds exactly `expected` records.
pub async fn wait_for_records(store: &MemoryStore, expected: usize) {
    for _ in 0..1000 {
        if store.len() == expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("store never reached {} records (has {})", expected, store.len());
}
