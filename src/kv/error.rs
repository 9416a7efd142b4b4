//! Error types for the storage engine.

use thiserror::Error;

use super::key::Key;

/// Errors raised by the engine underneath the adapter.
///
/// The adapter wraps these in the public [`Error`](crate::Error) taxonomy
/// (schema, write, read) according to the operation that hit them.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store not found: {0}")]
    StoreNotFound(String),

    #[error("Index not found: {store}.{index}")]
    IndexNotFound { store: String, index: String },

    #[error("Key not found in store '{store}': {key}")]
    KeyNotFound { store: String, key: Key },

    #[error("Constraint violation in store '{store}': {index} = {key} already exists")]
    ConstraintViolation {
        store: String,
        index: String,
        key: Key,
    },

    #[error("Invalid record for store '{store}': {reason}")]
    InvalidRecord { store: String, reason: String },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Requested version {requested} is lower than stored version {stored}")]
    VersionDowngrade { stored: u32, requested: u32 },

    #[error("Database failed to open earlier: {0}")]
    OpenFailed(String),

    #[error("Blocking task failed: {0}")]
    Task(String),

    #[error("Engine lock poisoned")]
    Poisoned,
}

impl KvError {
    pub(crate) fn invalid_record(store: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            store: store.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if a primary or unique key already existed.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}
