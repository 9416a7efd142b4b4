//! Schema and record types for the object store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::key::Key;

/// Maximum length of store and index names.
pub const MAX_NAME_LEN: usize = 64;

/// A value that can live in a store.
///
/// Records are serialized with serde into JSON objects. The field named by the
/// store's `key_path` must be present in that object and must equal
/// [`primary_key`](Record::primary_key).
///
/// # Example
///
/// ```ignore
/// use obj_kv::{Key, Record};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct Goods {
///     id: i64,
///     goods_id: String,
///     name: String,
/// }
///
/// impl Record for Goods {
///     fn primary_key(&self) -> Key {
///         Key::from(self.id)
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn primary_key(&self) -> Key;
}

/// Declaration of one store: its name, primary key field and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    /// Store name, unique within a database.
    pub name: String,

    /// Field holding the primary key (dotted paths reach nested objects).
    pub key_path: String,

    /// Secondary indexes.
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
}

impl StoreSchema {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            indexes: Vec::new(),
        }
    }

    /// Add an index over the field of the same name.
    pub fn index(mut self, name: impl Into<String>, unique: bool) -> Self {
        self.indexes.push(IndexSchema {
            name: name.into(),
            key_path: None,
            unique,
        });
        self
    }

    /// Add an index whose name differs from the indexed field.
    pub fn index_on(
        mut self,
        name: impl Into<String>,
        key_path: impl Into<String>,
        unique: bool,
    ) -> Self {
        self.indexes.push(IndexSchema {
            name: name.into(),
            key_path: Some(key_path.into()),
            unique,
        });
        self
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// CRC32 of the JSON form of this declaration.
    pub fn definition_hash(&self) -> u32 {
        // Serializing plain strings and bools into a Vec cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        crc32fast::hash(&bytes)
    }
}

/// Declaration of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Index name used in lookups.
    pub name: String,

    /// Indexed field; defaults to the index name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,

    /// At most one record per value.
    #[serde(default)]
    pub unique: bool,
}

impl IndexSchema {
    /// The indexed field.
    pub fn path(&self) -> &str {
        self.key_path.as_deref().unwrap_or(&self.name)
    }
}

/// Persisted description of a created store.
///
/// Written once during the upgrade that creates the store and authoritative
/// on every later open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub schema: StoreSchema,

    /// CRC32 hash of the declaration at creation time
    pub schema_hash: u32,

    /// Database version whose upgrade created the store
    pub created_version: u32,

    /// Unix timestamp of creation
    pub created_at: u64,
}

impl StoreMetadata {
    pub fn new(schema: StoreSchema, created_version: u32) -> Self {
        let schema_hash = schema.definition_hash();
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            schema,
            schema_hash,
            created_version,
            created_at,
        }
    }
}

/// Store and index names double as engine keyspace name parts.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Follow a dotted path into a JSON object.
pub(crate) fn lookup<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |current, segment| current.get(segment))
}
