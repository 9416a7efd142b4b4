//! Convenient re-exports for common usage patterns.
//!
//! ```ignore
//! use obj_kv::prelude::*;
//!
//! let adapter = StoreAdapter::connect(
//!     AdapterConfig::new("shop", 1).store(StoreSchema::new("goods", "id")),
//! )
//! .await?;
//! ```

// Unified error handling
pub use crate::error::{Error, Result};

// Configuration
pub use crate::config::{AdapterConfig, Durability};

// Store types
pub use crate::kv::{
    AdapterRegistry, ConnectionState, Cursor, Direction, IndexSchema, Key, KeyRange, Record,
    StoreAdapter, StoreSchema,
};
