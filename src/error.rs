//! Unified error type for obj-kv.
//!
//! Every adapter operation fails with exactly one of four kinds: the database
//! could not be opened or upgraded ([`Error::Schema`]), a write transaction
//! failed ([`Error::Write`]), a read failed ([`Error::Read`]), or a lookup
//! that had to find a record found none ([`Error::NotFound`]). The engine
//! error that caused it is kept as the source.

use thiserror::Error;

use crate::config::ConfigError;
use crate::kv::{Key, KvError};

/// Error type for all obj-kv operations.
///
/// # Example
///
/// ```ignore
/// use obj_kv::{Error, StoreAdapter};
///
/// match adapter.insert("goods", &item).await {
///     Ok(()) => {}
///     Err(Error::Write(e)) if e.is_constraint_violation() => println!("duplicate: {}", e),
///     Err(e) => return Err(e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Opening or upgrading the database failed.
    #[error("Schema error: {0}")]
    Schema(#[source] KvError),

    /// A write transaction failed or was rejected (constraint violation,
    /// invalid record, missing key on delete).
    #[error("Write error: {0}")]
    Write(#[source] KvError),

    /// A read or cursor step failed.
    #[error("Read error: {0}")]
    Read(#[source] KvError),

    /// An update found no record to modify.
    #[error("No record in store '{store}' where {index} = {value}")]
    NotFound {
        store: String,
        index: String,
        value: Key,
    },

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write(_))
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The engine error behind a schema, write or read failure.
    pub fn kv_error(&self) -> Option<&KvError> {
        match self {
            Self::Schema(e) | Self::Write(e) | Self::Read(e) => Some(e),
            Self::NotFound { .. } | Self::Config(_) => None,
        }
    }
}
