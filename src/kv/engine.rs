//! Object store engine on fjall.
//!
//! Every store gets a data keyspace (encoded primary key -> JSON record) and
//! one keyspace per secondary index. Index entries are keys of the form
//! `len(u16 BE) || encoded value || encoded primary key` with an empty value,
//! so an exact-match lookup is a prefix scan and duplicates of a non-unique
//! index sort by primary key.
//!
//! Reads go straight to the keyspaces. Writes go through a [`WriteTxn`]:
//! one writer at a time, changes buffered in an overlay the transaction itself
//! reads through, and applied with a single fjall write batch on commit.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use fjall::{Keyspace, KeyspaceCreateOptions, PersistMode};
use serde_json::Value;

use crate::logging::{debug, error, info, trace, warn};

use super::error::KvError;
use super::key::{Direction, Key, KeyRange};
use super::types::{IndexSchema, StoreMetadata, StoreSchema, lookup};

/// Metadata keyspace and its keys.
const META_KEYSPACE: &str = "_meta";
const META_FORMAT_KEY: &str = "format";
const META_VERSION_KEY: &str = "version";
const META_STORES_PREFIX: &str = "stores/";

/// Keyspace name prefixes.
const DATA_PREFIX: &str = "data_";
const INDEX_PREFIX: &str = "idx_";

/// On-disk layout version (1).
/// The engine refuses to open a database written with a different layout.
const FORMAT_VERSION: u32 = 1;

/// A keyspace together with the name the transaction overlay tracks it by.
struct Space {
    name: String,
    keyspace: Keyspace,
}

struct IndexHandle {
    schema: IndexSchema,
    space: Space,
}

struct StoreHandle {
    metadata: StoreMetadata,
    data: Space,
    indexes: Vec<IndexHandle>,
}

impl StoreHandle {
    fn schema(&self) -> &StoreSchema {
        &self.metadata.schema
    }

    fn index(&self, name: &str) -> Result<&IndexHandle, KvError> {
        self.indexes
            .iter()
            .find(|i| i.schema.name == name)
            .ok_or_else(|| KvError::IndexNotFound {
                store: self.schema().name.clone(),
                index: name.to_string(),
            })
    }

    /// Check that `record` is an object whose key field holds `key`.
    fn validate(&self, key: &Key, record: &Value) -> Result<(), KvError> {
        let schema = self.schema();
        if !record.is_object() {
            return Err(KvError::invalid_record(&schema.name, "record is not a JSON object"));
        }
        let field = lookup(record, &schema.key_path).ok_or_else(|| {
            KvError::invalid_record(
                &schema.name,
                format!("missing key field '{}'", schema.key_path),
            )
        })?;
        match Key::from_json(field) {
            Some(ref found) if found == key => Ok(()),
            Some(found) => Err(KvError::invalid_record(
                &schema.name,
                format!(
                    "key field '{}' holds {} but the primary key is {}",
                    schema.key_path, found, key
                ),
            )),
            None => Err(KvError::invalid_record(
                &schema.name,
                format!("key field '{}' is not an integer or string", schema.key_path),
            )),
        }
    }
}

/// The opened database: stores, indexes and the single-writer lock.
pub struct Engine {
    db: fjall::Database,
    stores: HashMap<String, StoreHandle>,
    version: u32,
    persist_mode: PersistMode,
    writer: Mutex<()>,
}

impl Engine {
    /// Open the database at `path`, upgrading it to `version` if needed.
    ///
    /// When the stored version is lower than `version`, every store in
    /// `declared` that does not exist yet is created with its indexes and the
    /// new version is recorded, all in one batch. Existing stores are never
    /// altered. Opening with a lower version than stored fails.
    pub fn open(
        path: impl AsRef<Path>,
        version: u32,
        declared: &[StoreSchema],
        persist_mode: PersistMode,
    ) -> Result<Self, KvError> {
        let path = path.as_ref();
        debug!(path = %path.display(), version, "opening database");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let db = fjall::Database::builder(path).open()?;
        let meta = db.keyspace(META_KEYSPACE, KeyspaceCreateOptions::default)?;

        match read_u32(&meta, META_FORMAT_KEY)? {
            Some(format) if format != FORMAT_VERSION => {
                error!(
                    stored_format = format,
                    expected_format = FORMAT_VERSION,
                    "database layout mismatch"
                );
                return Err(KvError::InvalidFormat(format!(
                    "Layout version mismatch: expected {}, got {}",
                    FORMAT_VERSION, format
                )));
            }
            Some(_) => {
                trace!(format = FORMAT_VERSION, "layout version verified");
            }
            None => {
                meta.insert(META_FORMAT_KEY, FORMAT_VERSION.to_le_bytes().to_vec())?;
            }
        }

        let stored = read_u32(&meta, META_VERSION_KEY)?.unwrap_or(0);
        if version < stored {
            error!(stored, requested = version, "refusing to downgrade database");
            return Err(KvError::VersionDowngrade {
                stored,
                requested: version,
            });
        }
        if version > stored {
            info!(old_version = stored, new_version = version, "upgrading database schema");
            Self::upgrade(&db, &meta, version, declared)?;
        }

        let stores = Self::load_stores(&db, &meta)?;
        for schema in declared {
            if !stores.contains_key(&schema.name) {
                warn!(
                    store = %schema.name,
                    version,
                    "declared store does not exist; raise the version to create it"
                );
            }
        }

        db.persist(persist_mode)?;

        info!(path = %path.display(), version, stores = stores.len(), "database opened");
        Ok(Self {
            db,
            stores,
            version,
            persist_mode,
            writer: Mutex::new(()),
        })
    }

    fn upgrade(
        db: &fjall::Database,
        meta: &Keyspace,
        new_version: u32,
        declared: &[StoreSchema],
    ) -> Result<(), KvError> {
        let mut batch = db.batch();
        for schema in declared {
            let key = format!("{}{}", META_STORES_PREFIX, schema.name);
            if meta.contains_key(&key)? {
                debug!(store = %schema.name, "store already exists; left untouched");
                continue;
            }

            let _ = db.keyspace(&data_keyspace_name(&schema.name), KeyspaceCreateOptions::default)?;
            for index in &schema.indexes {
                let _ = db.keyspace(
                    &index_keyspace_name(&schema.name, &index.name),
                    KeyspaceCreateOptions::default,
                )?;
            }

            let metadata = StoreMetadata::new(schema.clone(), new_version);
            batch.insert(meta, key, serde_json::to_vec(&metadata)?);
            info!(
                store = %schema.name,
                key_path = %schema.key_path,
                indexes = schema.indexes.len(),
                "store created"
            );
        }
        batch.insert(meta, META_VERSION_KEY, new_version.to_le_bytes().to_vec());
        batch.commit()?;

        Ok(())
    }

    fn load_stores(
        db: &fjall::Database,
        meta: &Keyspace,
    ) -> Result<HashMap<String, StoreHandle>, KvError> {
        let mut stores = HashMap::new();

        for kv in meta.prefix(META_STORES_PREFIX) {
            let (_, value) = kv.into_inner()?;
            let metadata: StoreMetadata = serde_json::from_slice(&value)?;
            let name = metadata.schema.name.clone();

            let data_name = data_keyspace_name(&name);
            let data = Space {
                keyspace: db.keyspace(&data_name, KeyspaceCreateOptions::default)?,
                name: data_name,
            };

            let mut indexes = Vec::with_capacity(metadata.schema.indexes.len());
            for index in &metadata.schema.indexes {
                let index_name = index_keyspace_name(&name, &index.name);
                indexes.push(IndexHandle {
                    schema: index.clone(),
                    space: Space {
                        keyspace: db.keyspace(&index_name, KeyspaceCreateOptions::default)?,
                        name: index_name,
                    },
                });
            }

            trace!(store = %name, schema_hash = metadata.schema_hash, "store loaded");
            stores.insert(
                name,
                StoreHandle {
                    metadata,
                    data,
                    indexes,
                },
            );
        }

        Ok(stores)
    }

    /// Schema version the database is open at.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Names of all existing stores, sorted.
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.keys().cloned().collect();
        names.sort();
        names
    }

    /// Persisted metadata of a store.
    pub fn metadata(&self, store: &str) -> Result<&StoreMetadata, KvError> {
        Ok(&self.store(store)?.metadata)
    }

    fn store(&self, name: &str) -> Result<&StoreHandle, KvError> {
        self.stores
            .get(name)
            .ok_or_else(|| KvError::StoreNotFound(name.to_string()))
    }

    /// Start a read-write transaction, waiting for the current writer.
    pub fn begin_write(&self) -> Result<WriteTxn<'_>, KvError> {
        let guard = self.writer.lock().map_err(|_| KvError::Poisoned)?;
        Ok(WriteTxn {
            engine: self,
            _guard: guard,
            pending: BTreeMap::new(),
        })
    }

    /// Get a record by primary key.
    pub fn get(&self, store: &str, key: &Key) -> Result<Option<Value>, KvError> {
        let handle = self.store(store)?;
        handle
            .data
            .keyspace
            .get(key.encode())?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(KvError::from)
    }

    /// Get the record with the lowest primary key whose index field equals `value`.
    pub fn get_by_index(
        &self,
        store: &str,
        index: &str,
        value: &Key,
    ) -> Result<Option<(Key, Value)>, KvError> {
        let handle = self.store(store)?;
        let index = handle.index(index)?;
        let prefix = index_prefix(value)?;

        let Some(kv) = index.space.keyspace.prefix(&prefix).next() else {
            return Ok(None);
        };
        let entry = kv.key()?;
        let primary = primary_from_entry(&entry, prefix.len())?;

        Ok(self.get(store, &primary)?.map(|record| (primary, record)))
    }

    /// All records in key order.
    pub fn get_all(&self, store: &str) -> Result<Vec<Value>, KvError> {
        let handle = self.store(store)?;
        let mut records = Vec::new();
        for kv in handle.data.keyspace.iter() {
            let (_, value) = kv.into_inner()?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Number of records in a store.
    pub fn count(&self, store: &str) -> Result<usize, KvError> {
        let handle = self.store(store)?;
        let mut count = 0;
        for kv in handle.data.keyspace.iter() {
            let _ = kv.key()?;
            count += 1;
        }
        Ok(count)
    }

    /// Up to `limit` records of `range` in `direction` order.
    pub fn page(
        &self,
        store: &str,
        range: &KeyRange,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Key, Value)>, KvError> {
        let handle = self.store(store)?;
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let iter = handle.data.keyspace.range(range.encoded());
        let iter: Box<dyn Iterator<Item = _> + '_> = if direction.is_reverse() {
            Box::new(iter.rev())
        } else {
            Box::new(iter)
        };

        let mut page = Vec::new();
        for kv in iter.take(limit) {
            let (key, value) = kv.into_inner()?;
            page.push((Key::decode(&key)?, serde_json::from_slice(&value)?));
        }
        trace!(store = store, count = page.len(), "read cursor page");
        Ok(page)
    }

    /// Up to `limit` primary keys of `range` in `direction` order.
    pub fn page_keys(
        &self,
        store: &str,
        range: &KeyRange,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<Key>, KvError> {
        let handle = self.store(store)?;
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let iter = handle.data.keyspace.range(range.encoded());
        let iter: Box<dyn Iterator<Item = _> + '_> = if direction.is_reverse() {
            Box::new(iter.rev())
        } else {
            Box::new(iter)
        };

        let mut keys = Vec::new();
        for kv in iter.take(limit) {
            keys.push(Key::decode(&kv.key()?)?);
        }
        Ok(keys)
    }
}

/// Pending writes of one keyspace; `None` marks a removal.
type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// A read-write transaction.
///
/// Holds the engine's writer lock for its whole life. Reads inside the
/// transaction see its own pending writes. Nothing reaches the database until
/// [`commit`](Self::commit); dropping the transaction discards everything.
pub struct WriteTxn<'e> {
    engine: &'e Engine,
    _guard: MutexGuard<'e, ()>,
    pending: BTreeMap<String, (Keyspace, Overlay)>,
}

impl<'e> WriteTxn<'e> {
    /// Insert a new record; fails if the primary key already exists.
    pub fn add(&mut self, store: &str, key: &Key, record: &Value) -> Result<(), KvError> {
        let handle = self.engine.store(store)?;
        handle.validate(key, record)?;

        if self.read(&handle.data, &key.encode())?.is_some() {
            warn!(store = store, key = %key, "primary key already exists");
            return Err(KvError::ConstraintViolation {
                store: store.to_string(),
                index: handle.schema().key_path.clone(),
                key: key.clone(),
            });
        }

        self.write_record(handle, key, record)
    }

    /// Insert or replace a record.
    pub fn put(&mut self, store: &str, key: &Key, record: &Value) -> Result<(), KvError> {
        let handle = self.engine.store(store)?;
        handle.validate(key, record)?;

        if let Some(old) = self.read_record(handle, key)? {
            trace!(store = store, key = %key, "replacing existing record");
            self.remove_index_entries(handle, key, &old)?;
        }

        self.write_record(handle, key, record)
    }

    /// Get a record by primary key, seeing this transaction's writes.
    pub fn get(&self, store: &str, key: &Key) -> Result<Option<Value>, KvError> {
        let handle = self.engine.store(store)?;
        self.read_record(handle, key)
    }

    /// Index lookup seeing this transaction's writes.
    pub fn get_by_index(
        &self,
        store: &str,
        index: &str,
        value: &Key,
    ) -> Result<Option<(Key, Value)>, KvError> {
        let handle = self.engine.store(store)?;
        let index = handle.index(index)?;
        let prefix = index_prefix(value)?;

        let Some(entry) = self.first_with_prefix(&index.space, &prefix, |_| false)? else {
            return Ok(None);
        };
        let primary = primary_from_entry(&entry, prefix.len())?;

        Ok(self
            .read_record(handle, &primary)?
            .map(|record| (primary, record)))
    }

    /// Remove a record; fails if the key does not exist.
    pub fn delete(&mut self, store: &str, key: &Key) -> Result<(), KvError> {
        let handle = self.engine.store(store)?;
        let Some(old) = self.read_record(handle, key)? else {
            return Err(KvError::KeyNotFound {
                store: store.to_string(),
                key: key.clone(),
            });
        };

        self.remove_index_entries(handle, key, &old)?;
        self.remove(&handle.data, key.encode());
        Ok(())
    }

    /// Remove every record and index entry of a store.
    pub fn clear(&mut self, store: &str) -> Result<(), KvError> {
        let handle = self.engine.store(store)?;
        self.clear_space(&handle.data)?;
        for index in &handle.indexes {
            self.clear_space(&index.space)?;
        }
        Ok(())
    }

    /// Apply all pending writes atomically and persist them.
    pub fn commit(self) -> Result<(), KvError> {
        let changes: usize = self.pending.values().map(|(_, o)| o.len()).sum();
        if changes == 0 {
            trace!("empty transaction");
            return Ok(());
        }

        let mut batch = self.engine.db.batch();
        for (keyspace, overlay) in self.pending.values() {
            for (key, value) in overlay {
                match value {
                    Some(value) => batch.insert(keyspace, key.clone(), value.clone()),
                    None => batch.remove(keyspace, key.clone()),
                }
            }
        }
        batch.commit()?;
        self.engine.db.persist(self.engine.persist_mode)?;

        debug!(changes, "transaction committed");
        Ok(())
    }

    fn write_record(&mut self, handle: &StoreHandle, key: &Key, record: &Value) -> Result<(), KvError> {
        let mut entries = Vec::with_capacity(handle.indexes.len());
        for index in &handle.indexes {
            let Some(value) = lookup(record, index.schema.path()).and_then(Key::from_json) else {
                continue;
            };
            let entry = index_entry(&value, key)?;

            if index.schema.unique {
                let prefix = index_prefix(&value)?;
                let taken = self.first_with_prefix(&index.space, &prefix, |e| e == entry.as_slice())?;
                if taken.is_some() {
                    warn!(
                        store = %handle.schema().name,
                        index = %index.schema.name,
                        value = %value,
                        "unique index violation"
                    );
                    return Err(KvError::ConstraintViolation {
                        store: handle.schema().name.clone(),
                        index: index.schema.name.clone(),
                        key: value,
                    });
                }
            }

            entries.push((&index.space, entry));
        }

        // Nothing is buffered until every unique index has been checked.
        for (space, entry) in entries {
            self.write(space, entry, Vec::new());
        }
        self.write(&handle.data, key.encode(), serde_json::to_vec(record)?);
        Ok(())
    }

    fn remove_index_entries(&mut self, handle: &StoreHandle, key: &Key, old: &Value) -> Result<(), KvError> {
        for index in &handle.indexes {
            if let Some(value) = lookup(old, index.schema.path()).and_then(Key::from_json) {
                self.remove(&index.space, index_entry(&value, key)?);
            }
        }
        Ok(())
    }

    fn read_record(&self, handle: &StoreHandle, key: &Key) -> Result<Option<Value>, KvError> {
        self.read(&handle.data, &key.encode())?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(KvError::from)
    }

    fn overlay(&self, space: &Space) -> Option<&Overlay> {
        self.pending.get(&space.name).map(|(_, overlay)| overlay)
    }

    fn overlay_mut(&mut self, space: &Space) -> &mut Overlay {
        &mut self
            .pending
            .entry(space.name.clone())
            .or_insert_with(|| (space.keyspace.clone(), Overlay::new()))
            .1
    }

    fn read(&self, space: &Space, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        if let Some(pending) = self.overlay(space).and_then(|o| o.get(key)) {
            return Ok(pending.clone());
        }
        Ok(space.keyspace.get(key)?.map(|v| v.to_vec()))
    }

    fn write(&mut self, space: &Space, key: Vec<u8>, value: Vec<u8>) {
        self.overlay_mut(space).insert(key, Some(value));
    }

    fn remove(&mut self, space: &Space, key: Vec<u8>) {
        self.overlay_mut(space).insert(key, None);
    }

    /// Smallest live key starting with `prefix` for which `skip` is false.
    fn first_with_prefix(
        &self,
        space: &Space,
        prefix: &[u8],
        skip: impl Fn(&[u8]) -> bool,
    ) -> Result<Option<Vec<u8>>, KvError> {
        let overlay = self.overlay(space);

        let pending = overlay.and_then(|o| {
            o.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(prefix))
                .find(|(k, v)| v.is_some() && !skip(k))
                .map(|(k, _)| k.clone())
        });

        let mut stored = None;
        for kv in space.keyspace.prefix(prefix) {
            let key = kv.key()?;
            let key: &[u8] = &key;
            // The overlay decides for every key it mentions.
            if overlay.is_some_and(|o| o.contains_key(key)) || skip(key) {
                continue;
            }
            stored = Some(key.to_vec());
            break;
        }

        Ok(match (pending, stored) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        })
    }

    fn clear_space(&mut self, space: &Space) -> Result<(), KvError> {
        let mut keys = Vec::new();
        for kv in space.keyspace.iter() {
            keys.push(kv.key()?.to_vec());
        }
        trace!(keyspace = %space.name, key_count = keys.len(), "clearing keyspace");

        let overlay = self.overlay_mut(space);
        for value in overlay.values_mut() {
            *value = None;
        }
        for key in keys {
            overlay.insert(key, None);
        }
        Ok(())
    }
}

fn data_keyspace_name(store: &str) -> String {
    format!("{}{}", DATA_PREFIX, store)
}

/// The store name length keeps `(a_b, c)` and `(a, b_c)` apart.
fn index_keyspace_name(store: &str, index: &str) -> String {
    format!("{}{}_{}_{}", INDEX_PREFIX, store.len(), store, index)
}

fn index_prefix(value: &Key) -> Result<Vec<u8>, KvError> {
    let encoded = value.encode();
    let len = u16::try_from(encoded.len())
        .map_err(|_| KvError::InvalidFormat(format!("index value of {} bytes is too long", encoded.len())))?;

    let mut out = Vec::with_capacity(2 + encoded.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&encoded);
    Ok(out)
}

fn index_entry(value: &Key, primary: &Key) -> Result<Vec<u8>, KvError> {
    let mut out = index_prefix(value)?;
    out.extend_from_slice(&primary.encode());
    Ok(out)
}

fn primary_from_entry(entry: &[u8], prefix_len: usize) -> Result<Key, KvError> {
    let tail = entry
        .get(prefix_len..)
        .ok_or_else(|| KvError::InvalidFormat("truncated index entry".to_string()))?;
    Key::decode(tail)
}

fn read_u32(meta: &Keyspace, key: &str) -> Result<Option<u32>, KvError> {
    let Some(bytes) = meta.get(key)? else {
        return Ok(None);
    };
    let raw: [u8; 4] = bytes
        .as_ref()
        .try_into()
        .map_err(|_| KvError::InvalidFormat(format!("Invalid {} format", key)))?;
    Ok(Some(u32::from_le_bytes(raw)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn goods_schema() -> StoreSchema {
        StoreSchema::new("goods", "id")
            .index("goodsId", true)
            .index("name", false)
    }

    fn open(dir: &TempDir, version: u32, stores: &[StoreSchema]) -> Result<Engine, KvError> {
        Engine::open(dir.path().join("db"), version, stores, PersistMode::Buffer)
    }

    fn goods(id: i64, goods_id: &str, name: &str) -> (Key, Value) {
        (Key::from(id), json!({"id": id, "goodsId": goods_id, "name": name}))
    }

    #[test]
    fn test_index_entry_layout() {
        let entry = index_entry(&Key::from("ab"), &Key::from(7)).unwrap();
        let prefix = index_prefix(&Key::from("ab")).unwrap();
        assert!(entry.starts_with(&prefix));
        assert_eq!(primary_from_entry(&entry, prefix.len()).unwrap(), Key::from(7));

        // A shorter value must not prefix-match a longer one.
        let short = index_prefix(&Key::from("a")).unwrap();
        assert!(!entry.starts_with(&short));
    }

    #[test]
    fn test_index_keyspace_names_do_not_collide() {
        assert_ne!(
            index_keyspace_name("a_b", "c"),
            index_keyspace_name("a", "b_c")
        );
    }

    #[test]
    fn test_open_creates_declared_stores() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir, 1, &[goods_schema()]).unwrap();
        assert_eq!(engine.version(), 1);
        assert_eq!(engine.store_names(), vec!["goods".to_string()]);

        let metadata = engine.metadata("goods").unwrap();
        assert_eq!(metadata.created_version, 1);
        assert_eq!(metadata.schema_hash, goods_schema().definition_hash());
    }

    #[test]
    fn test_add_rejects_duplicate_primary_key() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir, 1, &[goods_schema()]).unwrap();

        let (key, record) = goods(1, "g1", "oil");
        let mut txn = engine.begin_write().unwrap();
        txn.add("goods", &key, &record).unwrap();
        let err = txn.add("goods", &key, &record).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_transaction_sees_own_writes_and_discards_on_drop() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir, 1, &[goods_schema()]).unwrap();

        let (key, record) = goods(1, "g1", "oil");
        {
            let mut txn = engine.begin_write().unwrap();
            txn.put("goods", &key, &record).unwrap();
            assert_eq!(txn.get("goods", &key).unwrap(), Some(record.clone()));
            assert!(txn.get_by_index("goods", "goodsId", &Key::from("g1")).unwrap().is_some());
        }
        assert_eq!(engine.get("goods", &key).unwrap(), None);

        let mut txn = engine.begin_write().unwrap();
        txn.put("goods", &key, &record).unwrap();
        txn.commit().unwrap();
        assert_eq!(engine.get("goods", &key).unwrap(), Some(record));
    }

    #[test]
    fn test_unique_index_across_records() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir, 1, &[goods_schema()]).unwrap();

        let mut txn = engine.begin_write().unwrap();
        let (k1, r1) = goods(1, "same", "a");
        let (k2, r2) = goods(2, "same", "b");
        txn.put("goods", &k1, &r1).unwrap();
        txn.commit().unwrap();

        let mut txn = engine.begin_write().unwrap();
        let err = txn.put("goods", &k2, &r2).unwrap_err();
        assert!(err.is_constraint_violation());

        // Re-putting the owner of the value is fine.
        txn.put("goods", &k1, &r1).unwrap();
    }

    #[test]
    fn test_put_moves_index_entries() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir, 1, &[goods_schema()]).unwrap();

        let mut txn = engine.begin_write().unwrap();
        let (key, before) = goods(1, "old", "a");
        txn.put("goods", &key, &before).unwrap();
        txn.commit().unwrap();

        let mut txn = engine.begin_write().unwrap();
        let (_, after) = goods(1, "new", "a");
        txn.put("goods", &key, &after).unwrap();
        txn.commit().unwrap();

        assert!(engine.get_by_index("goods", "goodsId", &Key::from("old")).unwrap().is_none());
        let (found, _) = engine
            .get_by_index("goods", "goodsId", &Key::from("new"))
            .unwrap()
            .unwrap();
        assert_eq!(found, key);
    }

    #[test]
    fn test_non_unique_index_returns_lowest_key() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir, 1, &[goods_schema()]).unwrap();

        let mut txn = engine.begin_write().unwrap();
        for id in [5, 3, 9] {
            let (key, record) = goods(id, &format!("g{}", id), "oil");
            txn.put("goods", &key, &record).unwrap();
        }
        txn.commit().unwrap();

        let (found, _) = engine
            .get_by_index("goods", "name", &Key::from("oil"))
            .unwrap()
            .unwrap();
        assert_eq!(found, Key::from(3));
    }

    #[test]
    fn test_validate_rejects_mismatched_key() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir, 1, &[goods_schema()]).unwrap();

        let mut txn = engine.begin_write().unwrap();
        let err = txn
            .put("goods", &Key::from(1), &json!({"id": 2}))
            .unwrap_err();
        assert!(matches!(err, KvError::InvalidRecord { .. }));

        let err = txn
            .put("goods", &Key::from(1), &json!({"name": "no id"}))
            .unwrap_err();
        assert!(matches!(err, KvError::InvalidRecord { .. }));

        let err = txn.put("goods", &Key::from(1), &json!([1])).unwrap_err();
        assert!(matches!(err, KvError::InvalidRecord { .. }));
    }

    #[test]
    fn test_clear_inside_transaction_hides_pending_writes() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir, 1, &[goods_schema()]).unwrap();

        let mut txn = engine.begin_write().unwrap();
        let (k1, r1) = goods(1, "g1", "a");
        txn.put("goods", &k1, &r1).unwrap();
        txn.commit().unwrap();

        let mut txn = engine.begin_write().unwrap();
        let (k2, r2) = goods(2, "g2", "b");
        txn.put("goods", &k2, &r2).unwrap();
        txn.clear("goods").unwrap();
        assert!(txn.get("goods", &k1).unwrap().is_none());
        assert!(txn.get("goods", &k2).unwrap().is_none());
        txn.commit().unwrap();

        assert_eq!(engine.count("goods").unwrap(), 0);
        assert!(engine.get_by_index("goods", "goodsId", &Key::from("g1")).unwrap().is_none());
    }

    #[test]
    fn test_page_directions() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir, 1, &[goods_schema()]).unwrap();

        let mut txn = engine.begin_write().unwrap();
        for id in 0..10 {
            let (key, record) = goods(id, &format!("g{}", id), "x");
            txn.put("goods", &key, &record).unwrap();
        }
        txn.commit().unwrap();

        let range = KeyRange::bound(2, 6, false, true);
        let forward = engine.page_keys("goods", &range, Direction::Next, 100).unwrap();
        assert_eq!(forward, (2..6).map(Key::from).collect::<Vec<_>>());

        let backward = engine.page_keys("goods", &range, Direction::Prev, 2).unwrap();
        assert_eq!(backward, vec![Key::from(5), Key::from(4)]);

        let empty = KeyRange::bound(6, 2, false, false);
        assert!(engine.page("goods", &empty, Direction::Next, 10).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_store_and_index() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir, 1, &[goods_schema()]).unwrap();

        assert!(matches!(
            engine.get("nope", &Key::from(1)),
            Err(KvError::StoreNotFound(_))
        ));
        assert!(matches!(
            engine.get_by_index("goods", "nope", &Key::from(1)),
            Err(KvError::IndexNotFound { .. })
        ));
    }
}
