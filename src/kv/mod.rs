//! Object store module.
//!
//! The [`Engine`] keeps stores and secondary indexes in fjall keyspaces and
//! runs write transactions; the [`StoreAdapter`] puts an async, typed API on
//! top of it; the [`AdapterRegistry`] shares adapters by database name.

mod adapter;
mod cursor;
mod engine;
mod error;
mod key;
mod registry;
mod types;

pub use adapter::{ConnectionState, StoreAdapter};
pub use cursor::Cursor;
pub use engine::{Engine, WriteTxn};
pub use error::KvError;
pub use key::{Direction, Key, KeyRange};
pub use registry::AdapterRegistry;
pub use types::{IndexSchema, MAX_NAME_LEN, Record, StoreMetadata, StoreSchema, is_valid_name};
