//! An async object store with primary keys, secondary indexes and cursors.
//!
//! obj-kv gives an application a handful of named stores inside a local
//! database. Each store has a primary key field and optional secondary
//! indexes, and is worked with through async CRUD calls and key-ordered
//! cursors. Persistence, atomic batches and ordered iteration come from
//! [fjall](https://docs.rs/fjall).
//!
//! # Quick Start
//!
//! ```ignore
//! use obj_kv::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct Goods { id: i64, goods_id: String, name: String }
//!
//! impl Record for Goods {
//!     fn primary_key(&self) -> Key { Key::from(self.id) }
//! }
//!
//! let config = AdapterConfig::new("shop", 1).store(
//!     StoreSchema::new("goods", "id")
//!         .index("goodsId", true)
//!         .index("name", false),
//! );
//! let adapter = StoreAdapter::connect(config).await?;
//!
//! adapter.insert_many("goods", &items).await?;
//! let one: Option<Goods> = adapter.get_by_index("goods", "goodsId", "2001857").await?;
//! let first_twenty: Vec<Goods> = adapter
//!     .scan("goods", Some(KeyRange::bound(0, 20, false, false)), None)
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`kv`] - Engine, adapter, cursors and registry
//! - [`config`] - Database configuration, loadable from TOML
//! - [`error`] - Unified error taxonomy
//! - [`prelude`] - Convenient re-exports
//!
//! # Feature Flags
//!
//! - `logging` - Enable library-level tracing (consumers provide their own subscriber)
//! - `full` - Enable all features

mod logging;

pub mod config;
pub mod error;
pub mod kv;
pub mod prelude;

// Re-export the unified error type
pub use error::{Error, Result};

pub use config::{AdapterConfig, ConfigError, Durability};

// Re-export store types at crate root for convenience
pub use kv::{
    AdapterRegistry, ConnectionState, Cursor, Direction, IndexSchema, Key, KeyRange, KvError,
    Record, StoreAdapter, StoreMetadata, StoreSchema,
};
