//! At-most-once execution for client-retried requests.
//!
//! A request carrying an idempotency key either replays a stored outcome,
//! is rejected because another execution owns the key, or wins ownership
//! through the store's conditional create and runs the handler exactly once.

mod coordinator;
mod record;

pub use coordinator::{
    is_success, Execution, HandlerOutcome, IdempotencyCoordinator, Interception, Outcome,
    Ownership, StoredResponse, IDEMPOTENCY_KEY_HEADER,
};
pub use record::{IdempotencyRecord, RecordStatus};
