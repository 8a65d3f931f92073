use thiserror::Error;

use crate::persistence::PersistenceError;
use crate::state::ValidationError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("corrupt persisted usage data: {0}")]
    Corrupt(#[source] serde_json::Error),
}
