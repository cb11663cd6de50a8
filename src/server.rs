use crate::config::Config;
use crate::error::ServiceError;
use crate::handlers::{
    add_config_to_group, create_config, create_group, delete_config, delete_configs_by_labels,
    delete_group, get_config, get_configs_by_labels, get_group, health_check,
    remove_config_from_group, AppState,
};
use crate::idempotency::IdempotencyCoordinator;
use crate::middleware::{idempotency_middleware, logging_middleware, rate_limit_middleware};
use crate::rate_limiter::AdmissionGate;
use crate::redis::RedisStore;
use crate::store::{KvStore, MemoryStore};
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the router.
///
/// Mutating routes run `admission gate -> dedup coordinator -> handler`;
/// reads only pass through the router-wide logging and tracing layers.
pub fn create_app(
    state: AppState,
    gate: AdmissionGate,
    coordinator: Arc<IdempotencyCoordinator>,
) -> Router {
    let mutating = Router::new()
        .route("/configs", post(create_config))
        .route("/configs/:name/versions/:version", delete(delete_config))
        .route("/groups", post(create_group))
        .route("/groups/:name/versions/:version", delete(delete_group))
        .route(
            "/groups/:name/versions/:version/add-config",
            post(add_config_to_group),
        )
        .route(
            "/groups/:name/versions/:version/remove-config",
            post(remove_config_from_group),
        )
        .route(
            "/groups/:name/versions/:version/configs",
            delete(delete_configs_by_labels),
        )
        .route_layer(middleware::from_fn_with_state(coordinator, idempotency_middleware))
        .route_layer(middleware::from_fn_with_state(gate, rate_limit_middleware));

    let reads = Router::new()
        .route("/configs/:name/versions/:version", get(get_config))
        .route("/groups/:name/versions/:version", get(get_group))
        .route(
            "/groups/:name/versions/:version/configs",
            get(get_configs_by_labels),
        )
        .route("/health", get(health_check));

    Router::new()
        .merge(mutating)
        .merge(reads)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CatchPanicLayer::new())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    config: Config,
    app: Router,
    gate: AdmissionGate,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, ServiceError> {
        let store = connect_store(&config).await?;

        let state = AppState::new(Arc::clone(&store));
        let gate = AdmissionGate::new(config.rate_limit_per_second, config.rate_limit_burst);
        let coordinator = Arc::new(
            IdempotencyCoordinator::new(store, config.idempotency_key_prefix.clone())
                .with_body_limit(config.max_body_bytes),
        );
        let app = create_app(state, gate.clone(), coordinator);

        Ok(Self { config, app, gate })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("Config service starting on {}", self.config.bind_addr);
        tracing::info!("Health check available at /health");

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let eviction = self.gate.start_eviction(self.config.idle_ttl());

        let result = axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        eviction.stop().await;
        tracing::info!("Config service stopped");

        result?;
        Ok(())
    }
}

async fn connect_store(config: &Config) -> Result<Arc<dyn KvStore>, ServiceError> {
    if config.uses_redis() {
        let store = RedisStore::connect(config.redis_url.trim()).await?;
        tracing::info!("Using redis record store");
        Ok(Arc::new(store))
    } else {
        tracing::warn!(
            "REDIS_URL is empty; idempotency records are kept in process memory and are not shared between instances"
        );
        Ok(Arc::new(MemoryStore::new()))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
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
