use std::io;

use model_quota_ledger::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("stored value for {key} is not valid JSON: {source}")]
    InvalidValue {
        key: String,
        source: serde_json::Error,
    },
    #[error("connection poisoned")]
    Poisoned,
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}

impl From<StorageError> for PersistenceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::IoError(err) => PersistenceError::Io(err),
            StorageError::InvalidValue { source, .. } => PersistenceError::Serialization(source),
            other => PersistenceError::Backend(other.to_string()),
        }
    }
}
