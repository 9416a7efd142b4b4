//! Adapter configuration.
//!
//! A configuration names the database, its schema version, where it lives on
//! disk and which stores it declares. It can be built in code or loaded from
//! TOML:
//!
//! ```toml
//! name = "shop"
//! version = 2
//! data_dir = "/var/lib/shop"
//!
//! [[stores]]
//! name = "goods"
//! key_path = "id"
//! indexes = [
//!     { name = "goodsId", unique = true },
//!     { name = "name" },
//! ]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::kv::{StoreSchema, is_valid_name};

/// Default database name.
pub const DEFAULT_NAME: &str = "obj-kv";

/// Default directory holding database directories.
pub const DEFAULT_DATA_DIR: &str = ".obj-kv";

/// Default number of records fetched per cursor step.
pub const DEFAULT_CURSOR_PAGE_SIZE: usize = 256;

/// How hard a committed write transaction is pushed to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Flush to OS buffers.
    Buffer,
    /// fdatasync the journal.
    SyncData,
    /// fsync the journal.
    #[default]
    SyncAll,
}

impl Durability {
    pub(crate) fn persist_mode(self) -> fjall::PersistMode {
        match self {
            Durability::Buffer => fjall::PersistMode::Buffer,
            Durability::SyncData => fjall::PersistMode::SyncData,
            Durability::SyncAll => fjall::PersistMode::SyncAll,
        }
    }
}

/// Configuration of one database.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Database name; also the directory name under `data_dir`.
    pub name: String,

    /// Schema version. Raising it creates newly declared stores.
    pub version: u32,

    /// Parent directory of the database directory.
    pub data_dir: PathBuf,

    /// Persistence level after each write transaction.
    pub durability: Durability,

    /// Records fetched per cursor step.
    pub cursor_page_size: usize,

    /// Declared stores.
    pub stores: Vec<StoreSchema>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            version: 1,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            durability: Durability::default(),
            cursor_page_size: DEFAULT_CURSOR_PAGE_SIZE,
            stores: Vec::new(),
        }
    }
}

impl AdapterConfig {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            ..Self::default()
        }
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn cursor_page_size(mut self, size: usize) -> Self {
        self.cursor_page_size = size;
        self
    }

    pub fn store(mut self, schema: StoreSchema) -> Self {
        self.stores.push(schema);
        self
    }

    /// Directory of the database itself.
    pub fn path(&self) -> PathBuf {
        self.data_dir.join(&self.name)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check names, versions and sizes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_name(&self.name) {
            return Err(ConfigError::invalid(format!(
                "database name '{}' must be 1-64 characters of [A-Za-z0-9_-]",
                self.name
            )));
        }
        if self.version == 0 {
            return Err(ConfigError::invalid("version must be at least 1"));
        }
        if self.cursor_page_size == 0 {
            return Err(ConfigError::invalid("cursor_page_size must be at least 1"));
        }

        let mut store_names = HashSet::new();
        for store in &self.stores {
            if !is_valid_name(&store.name) {
                return Err(ConfigError::invalid(format!(
                    "store name '{}' must be 1-64 characters of [A-Za-z0-9_-]",
                    store.name
                )));
            }
            if !store_names.insert(store.name.as_str()) {
                return Err(ConfigError::invalid(format!("duplicate store '{}'", store.name)));
            }
            if store.key_path.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "store '{}' has an empty key_path",
                    store.name
                )));
            }

            let mut index_names = HashSet::new();
            for index in &store.indexes {
                if !is_valid_name(&index.name) {
                    return Err(ConfigError::invalid(format!(
                        "index name '{}' in store '{}' must be 1-64 characters of [A-Za-z0-9_-]",
                        index.name, store.name
                    )));
                }
                if !index_names.insert(index.name.as_str()) {
                    return Err(ConfigError::invalid(format!(
                        "duplicate index '{}' in store '{}'",
                        index.name, store.name
                    )));
                }
                if index.path().is_empty() {
                    return Err(ConfigError::invalid(format!(
                        "index '{}' in store '{}' has an empty key_path",
                        index.name, store.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
