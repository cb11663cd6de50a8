use super::record::IdempotencyRecord;
use crate::error::{ServiceError, StoreError};
use crate::store::KvStore;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Status codes stored for replay. Anything else releases the key.
pub fn is_success(status_code: u16) -> bool {
    (200..400).contains(&status_code)
}

/// What a downstream handler produced, as far as replay is concerned.
pub trait Outcome {
    fn status_code(&self) -> u16;
    fn body(&self) -> &[u8];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub status_code: u16,
    pub body: Vec<u8>,
}

impl HandlerOutcome {
    pub fn new(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }
}

impl Outcome for HandlerOutcome {
    fn status_code(&self) -> u16 {
        self.status_code
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}

/// A previously completed response, returned verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

#[derive(Debug)]
pub enum Interception {
    /// No key supplied; the handler runs without any guarantee.
    PassThrough,
    Replay(StoredResponse),
    Conflict,
    /// This request owns the key and must run the handler.
    Proceed(Ownership),
}

#[derive(Debug)]
pub enum Execution<T> {
    Executed(T),
    Replayed(StoredResponse),
}

pub struct IdempotencyCoordinator {
    store: Arc<dyn KvStore>,
    prefix: String,
    body_limit: usize,
}

impl IdempotencyCoordinator {
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_end_matches('/').to_string(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    /// Largest request body buffered before ownership is attempted.
    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub fn store_key(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }

    /// Decide what to do with a request before its handler runs.
    ///
    /// The initial `get` only short-circuits replays and obvious conflicts.
    /// Ownership is decided solely by the conditional create.
    pub async fn intercept(&self, key: Option<&str>) -> Result<Interception, StoreError> {
        let Some(key) = key.filter(|key| !key.is_empty()) else {
            return Ok(Interception::PassThrough);
        };
        let store_key = self.store_key(key);

        match self.store.get(&store_key).await {
            Ok(Some(bytes)) => match IdempotencyRecord::decode(&store_key, &bytes)? {
                IdempotencyRecord::Completed { status_code, body } => {
                    debug!(key = %store_key, status_code, "Replaying completed request");
                    return Ok(Interception::Replay(StoredResponse { status_code, body }));
                }
                IdempotencyRecord::InProgress => {
                    debug!(key = %store_key, "Request already in progress");
                    return Ok(Interception::Conflict);
                }
            },
            Ok(None) => {}
            Err(err) => {
                warn!(key = %store_key, error = %err, "Idempotency lookup failed, attempting conditional create");
            }
        }

        let placeholder = IdempotencyRecord::InProgress.encode(&store_key)?;
        if self.store.create_if_absent(&store_key, placeholder).await? {
            debug!(key = %store_key, "Acquired idempotency key");
            Ok(Interception::Proceed(Ownership {
                store: Arc::clone(&self.store),
                store_key,
                settled: false,
            }))
        } else {
            debug!(key = %store_key, "Lost idempotency key race");
            Ok(Interception::Conflict)
        }
    }

    /// Intercept, run `handler` if this request owns the key, then finalize.
    pub async fn execute<Fut, T>(&self, key: Option<&str>, handler: Fut) -> Result<Execution<T>, ServiceError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
        T: Outcome,
    {
        match self.intercept(key).await? {
            Interception::PassThrough => handler.await.map(Execution::Executed),
            Interception::Replay(stored) => Ok(Execution::Replayed(stored)),
            Interception::Conflict => Err(ServiceError::Conflict),
            Interception::Proceed(ownership) => ownership.run(handler).await.map(Execution::Executed),
        }
    }
}

/// Exclusive ownership of an in-progress record.
///
/// Every exit path settles the record: [`Ownership::finalize`] promotes or
/// deletes it, and dropping an unsettled guard (cancellation, unwinding)
/// deletes it from a spawned task.
pub struct Ownership {
    store: Arc<dyn KvStore>,
    store_key: String,
    settled: bool,
}

impl std::fmt::Debug for Ownership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ownership")
            .field("store", &self.store.backend_name())
            .field("store_key", &self.store_key)
            .field("settled", &self.settled)
            .finish()
    }
}

impl Ownership {
    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    /// Run the handler under this ownership.
    ///
    /// Handler errors and panics release the key and then propagate
    /// unchanged. Finalization runs on its own task so a cancelled request
    /// cannot interrupt it halfway.
    pub async fn run<Fut, T>(self, handler: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
        T: Outcome,
    {
        let result = match AssertUnwindSafe(handler).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let key = self.store_key.clone();
                if let Err(err) = self.release().await {
                    error!(key = %key, error = %err, "Failed to release idempotency key after handler panic");
                }
                std::panic::resume_unwind(panic);
            }
        };

        match result {
            Ok(outcome) => {
                self.finalize(&outcome).await?;
                Ok(outcome)
            }
            Err(handler_error) => {
                let key = self.store_key.clone();
                if let Err(err) = self.release().await {
                    error!(key = %key, error = %err, "Failed to release idempotency key after handler error");
                }
                Err(handler_error)
            }
        }
    }

    /// Store a successful outcome for replay, or delete the record otherwise.
    pub async fn finalize<O>(self, outcome: &O) -> Result<(), StoreError>
    where
        O: Outcome + ?Sized,
    {
        let status_code = outcome.status_code();
        let completion = is_success(status_code)
            .then(|| IdempotencyRecord::completed(status_code, outcome.body().to_vec()));

        let settle = tokio::spawn(async move {
            match completion {
                Some(record) => self.commit(record).await,
                None => self.release().await,
            }
        });

        settle
            .await
            .map_err(|err| StoreError::Unavailable(format!("finalization task failed: {}", err)))?
    }

    /// Delete the in-progress record so the key can be retried.
    pub async fn release(mut self) -> Result<(), StoreError> {
        self.store.delete(&self.store_key).await?;
        self.settled = true;
        debug!(key = %self.store_key, "Released idempotency key");
        Ok(())
    }

    // On failure `settled` stays false and `Drop` deletes the placeholder.
    async fn commit(mut self, record: IdempotencyRecord) -> Result<(), StoreError> {
        let bytes = record.encode(&self.store_key)?;
        if let Err(err) = self.store.put(&self.store_key, bytes).await {
            error!(key = %self.store_key, error = %err, "Failed to save final response");
            return Err(err);
        }
        self.settled = true;
        debug!(key = %self.store_key, "Saved final response");
        Ok(())
    }
}

impl Drop for Ownership {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.store_key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(key = %key, "Idempotency key abandoned, deleting in-progress record");
                handle.spawn(async move {
                    if let Err(err) = store.delete(&key).await {
                        error!(key = %key, error = %err, "Failed to delete abandoned idempotency record");
                    }
                });
            }
            Err(_) => {
                error!(key = %key, "No runtime available to delete abandoned idempotency record");
            }
        }
    }
}
