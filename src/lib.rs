pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod health;
pub mod idempotency;
pub mod key_generator;
pub mod middleware;
pub mod model;
pub mod rate_limiter;
pub mod redis;
pub mod repository;
pub mod response;
pub mod server;
pub mod store;
pub mod token_bucket;
pub mod validation;

pub use config::Config;
pub use error::{Result, ServiceError, StoreError};
pub use handlers::AppState;
pub use idempotency::IdempotencyCoordinator;
pub use rate_limiter::AdmissionGate;
pub use server::{create_app, Server};
pub use store::{KvStore, MemoryStore};
