//! The async store adapter.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use serde_json::Value;

use crate::config::AdapterConfig;
use crate::error::{Error, Result};
use crate::logging::{debug, error, info, trace, warn};

use super::cursor::Cursor;
use super::engine::Engine;
use super::error::KvError;
use super::key::{Direction, Key, KeyRange};
use super::types::{Record, StoreMetadata};

/// Observable state of an adapter's connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not opened yet, or released with [`StoreAdapter::close`].
    Closed,
    /// An open is in progress.
    Opening,
    /// Open at the given schema version.
    Open { version: u32 },
    /// Opening failed; the adapter stays unusable.
    Failed { reason: String },
}

enum Connection {
    /// Holds the released engine until its last cursor or call lets go.
    Closed(Weak<Engine>),
    Opening,
    Open(Arc<Engine>),
    Failed(String),
}

/// Async object store over one database.
///
/// The database is opened on first use (or explicitly with
/// [`open`](Self::open)); every engine call then runs on tokio's blocking
/// pool, so the async caller only waits at well-defined suspension points.
///
/// # Example
///
/// ```ignore
/// use obj_kv::prelude::*;
///
/// let config = AdapterConfig::new("shop", 1)
///     .store(StoreSchema::new("goods", "id").index("goodsId", true));
/// let adapter = StoreAdapter::new(config)?;
///
/// adapter.insert("goods", &goods).await?;
/// let found: Option<Goods> = adapter.get_by_index("goods", "goodsId", "2001857").await?;
/// let renamed: Goods = adapter
///     .update("goods", "goodsId", "2001857", &serde_json::json!({"name": "Oyster sauce"}))
///     .await?;
/// ```
///
/// # Connection lifecycle
///
/// `Closed -> Opening -> Open`, or `Closed -> Opening -> Failed`. A failed
/// open is terminal: later calls report the same [`Error::Schema`]. An open
/// adapter can be released with [`close`](Self::close), after which the next
/// operation opens it again. Cursors keep the database alive until dropped;
/// an adapter reopened while they are still alive picks their engine back up.
pub struct StoreAdapter {
    config: AdapterConfig,
    connection: Mutex<Connection>,
    opening: tokio::sync::Mutex<()>,
}

impl StoreAdapter {
    /// Create an adapter without opening the database.
    pub fn new(config: AdapterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connection: Mutex::new(Connection::Closed(Weak::new())),
            opening: tokio::sync::Mutex::new(()),
        })
    }

    /// Create an adapter and open its database.
    pub async fn connect(config: AdapterConfig) -> Result<Self> {
        let adapter = Self::new(config)?;
        adapter.open().await?;
        Ok(adapter)
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Open the database, creating declared stores if the version was raised.
    pub async fn open(&self) -> Result<()> {
        self.engine().await.map(|_| ())
    }

    /// Release the database handle. The next operation reopens it.
    pub async fn close(&self) -> Result<()> {
        let _opening = self.opening.lock().await;
        let mut connection = self.lock()?;
        if let Connection::Open(engine) = &*connection {
            *connection = Connection::Closed(Arc::downgrade(engine));
            info!(database = %self.config.name, "database closed");
        }
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        let Ok(connection) = self.connection.lock() else {
            return ConnectionState::Failed {
                reason: KvError::Poisoned.to_string(),
            };
        };
        match &*connection {
            Connection::Closed(_) => ConnectionState::Closed,
            Connection::Opening => ConnectionState::Opening,
            Connection::Open(engine) => ConnectionState::Open {
                version: engine.version(),
            },
            Connection::Failed(reason) => ConnectionState::Failed {
                reason: reason.clone(),
            },
        }
    }

    /// Names of the stores that exist in the database.
    pub async fn store_names(&self) -> Result<Vec<String>> {
        Ok(self.engine().await?.store_names())
    }

    /// Persisted metadata of a store.
    pub async fn metadata(&self, store: &str) -> Result<StoreMetadata> {
        let engine = self.engine().await?;
        engine.metadata(store).cloned().map_err(Error::Read)
    }

    /// Insert one record. Fails if its primary key or a unique index value
    /// is already taken.
    pub async fn insert<T: Record>(&self, store: &str, record: &T) -> Result<()> {
        let key = record.primary_key();
        let value = serde_json::to_value(record).map_err(|e| Error::Write(e.into()))?;
        debug!(store = store, key = %key, "inserting record");

        let store_name = store.to_string();
        self.write(store, move |engine| {
            let mut txn = engine.begin_write()?;
            txn.add(&store_name, &key, &value)?;
            txn.commit()
        })
        .await
    }

    /// Insert or replace many records in one transaction.
    ///
    /// Existing primary keys are overwritten. If any record is invalid or
    /// takes a unique index value owned by another record, nothing is written.
    pub async fn insert_many<T: Record>(&self, store: &str, records: &[T]) -> Result<()> {
        let entries = records
            .iter()
            .map(|r| serde_json::to_value(r).map(|v| (r.primary_key(), v)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Write(e.into()))?;
        debug!(store = store, count = entries.len(), "inserting batch");

        let store_name = store.to_string();
        self.write(store, move |engine| {
            let mut txn = engine.begin_write()?;
            for (key, value) in &entries {
                txn.put(&store_name, key, value)?;
            }
            txn.commit()
        })
        .await
    }

    /// Insert or replace one record.
    pub async fn put<T: Record>(&self, store: &str, record: &T) -> Result<()> {
        let key = record.primary_key();
        let value = serde_json::to_value(record).map_err(|e| Error::Write(e.into()))?;
        debug!(store = store, key = %key, "putting record");

        let store_name = store.to_string();
        self.write(store, move |engine| {
            let mut txn = engine.begin_write()?;
            txn.put(&store_name, &key, &value)?;
            txn.commit()
        })
        .await
    }

    /// Get a record by primary key.
    pub async fn get<T: Record>(&self, store: &str, key: impl Into<Key>) -> Result<Option<T>> {
        let key = key.into();
        trace!(store = store, key = %key, "getting record");

        let store_name = store.to_string();
        let value = self
            .read(store, move |engine| engine.get(&store_name, &key))
            .await?;
        value.map(from_value).transpose()
    }

    /// Get the record with the lowest primary key whose `index` field equals `value`.
    pub async fn get_by_index<T: Record>(
        &self,
        store: &str,
        index: &str,
        value: impl Into<Key>,
    ) -> Result<Option<T>> {
        let value = value.into();
        trace!(store = store, index = index, value = %value, "index lookup");

        let store_name = store.to_string();
        let index_name = index.to_string();
        let found = self
            .read(store, move |engine| {
                engine.get_by_index(&store_name, &index_name, &value)
            })
            .await?;
        found.map(|(_, record)| from_value(record)).transpose()
    }

    /// All records of a store in primary key order.
    pub async fn get_all<T: Record>(&self, store: &str) -> Result<Vec<T>> {
        let store_name = store.to_string();
        let values = self
            .read(store, move |engine| engine.get_all(&store_name))
            .await?;
        debug!(store = store, count = values.len(), "read all records");
        values.into_iter().map(from_value).collect()
    }

    /// Number of records in a store.
    pub async fn count(&self, store: &str) -> Result<usize> {
        let store_name = store.to_string();
        self.read(store, move |engine| engine.count(&store_name))
            .await
    }

    /// Shallow-merge `patch` into the record found through `index` and save it.
    ///
    /// Lookup, merge and write happen in one write transaction, so concurrent
    /// updates of the same record are applied one after the other. Top-level
    /// fields of `patch` replace the record's fields; everything else is kept.
    /// Fails with [`Error::NotFound`] when no record matches, leaving the
    /// store unchanged.
    pub async fn update<T: Record, P: Serialize + ?Sized>(
        &self,
        store: &str,
        index: &str,
        value: impl Into<Key>,
        patch: &P,
    ) -> Result<T> {
        let value = value.into();
        let Value::Object(patch) = serde_json::to_value(patch).map_err(|e| Error::Write(e.into()))? else {
            return Err(Error::Write(KvError::invalid_record(
                store,
                "update patch is not a JSON object",
            )));
        };
        debug!(store = store, index = index, value = %value, fields = patch.len(), "updating record");

        let store_name = store.to_string();
        let index_name = index.to_string();
        let lookup = value.clone();
        let updated = self
            .write(store, move |engine| {
                let mut txn = engine.begin_write()?;
                let Some((key, current)) = txn.get_by_index(&store_name, &index_name, &lookup)? else {
                    return Ok(None);
                };

                let mut merged = current;
                if let Value::Object(fields) = &mut merged {
                    fields.extend(patch);
                }

                let record: T = serde_json::from_value(merged.clone())?;
                if record.primary_key() != key {
                    return Err(KvError::invalid_record(
                        &store_name,
                        format!(
                            "update would change the primary key from {} to {}",
                            key,
                            record.primary_key()
                        ),
                    ));
                }

                txn.put(&store_name, &key, &merged)?;
                txn.commit()?;
                Ok(Some(record))
            })
            .await?;

        updated.ok_or_else(|| {
            warn!(store = store, index = index, value = %value, "no record to update");
            Error::NotFound {
                store: store.to_string(),
                index: index.to_string(),
                value,
            }
        })
    }

    /// Delete a record by primary key. Fails if the key does not exist.
    pub async fn delete(&self, store: &str, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        debug!(store = store, key = %key, "deleting record");

        let store_name = store.to_string();
        self.write(store, move |engine| {
            let mut txn = engine.begin_write()?;
            txn.delete(&store_name, &key)?;
            txn.commit()
        })
        .await
    }

    /// Remove every record of a store.
    pub async fn clear(&self, store: &str) -> Result<()> {
        debug!(store = store, "clearing store");

        let store_name = store.to_string();
        self.write(store, move |engine| {
            let mut txn = engine.begin_write()?;
            txn.clear(&store_name)?;
            txn.commit()
        })
        .await
    }

    /// Lazy cursor over the records of `range` (all keys if `None`).
    pub async fn cursor<T: Record>(
        &self,
        store: &str,
        range: Option<KeyRange>,
        direction: Option<Direction>,
    ) -> Result<Cursor<T>> {
        let engine = self.engine().await?;
        engine.metadata(store).map_err(Error::Read)?;

        Ok(Cursor::new(
            engine,
            store.to_string(),
            range.unwrap_or_default(),
            direction.unwrap_or_default(),
            self.config.cursor_page_size,
        ))
    }

    /// Walk a cursor to the end and return every record it visited.
    pub async fn scan<T: Record>(
        &self,
        store: &str,
        range: Option<KeyRange>,
        direction: Option<Direction>,
    ) -> Result<Vec<T>> {
        let records = self.cursor(store, range, direction).await?.collect().await?;
        debug!(store = store, count = records.len(), "scan finished");
        Ok(records)
    }

    /// Primary keys of `range` in cursor order, without reading records.
    pub async fn scan_keys(
        &self,
        store: &str,
        range: Option<KeyRange>,
        direction: Option<Direction>,
    ) -> Result<Vec<Key>> {
        let engine = self.engine().await?;
        let direction = direction.unwrap_or_default();
        let page_size = self.config.cursor_page_size;

        let mut range = range.unwrap_or_default();
        let mut keys = Vec::new();
        loop {
            let store_name = store.to_string();
            let page_range = range.clone();
            let page = blocking(Arc::clone(&engine), move |engine| {
                engine.page_keys(&store_name, &page_range, direction, page_size)
            })
            .await
            .map_err(Error::Read)?;

            let done = page.len() < page_size;
            if let Some(last) = page.last() {
                range = range.resume_after(last, direction);
            }
            keys.extend(page);
            if done {
                break;
            }
        }

        debug!(store = store, count = keys.len(), "key scan finished");
        Ok(keys)
    }

    #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
    async fn read<R, F>(&self, store: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Engine) -> std::result::Result<R, KvError> + Send + 'static,
        R: Send + 'static,
    {
        let engine = self.engine().await?;
        blocking(engine, f).await.map_err(|e| {
            error!(store = store, error = %e, "read failed");
            Error::Read(e)
        })
    }

    #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
    async fn write<R, F>(&self, store: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Engine) -> std::result::Result<R, KvError> + Send + 'static,
        R: Send + 'static,
    {
        let engine = self.engine().await?;
        blocking(engine, f).await.map_err(|e| {
            error!(store = store, error = %e, "write failed");
            Error::Write(e)
        })
    }

    /// The open engine, opening it first if the adapter is closed.
    async fn engine(&self) -> Result<Arc<Engine>> {
        if let Some(engine) = self.current()? {
            return Ok(engine);
        }

        let _opening = self.opening.lock().await;
        // Another task may have finished opening while we waited.
        if let Some(engine) = self.current()? {
            return Ok(engine);
        }
        {
            let mut connection = self.lock()?;
            // fjall holds the directory lock while any handle is alive.
            if let Connection::Closed(released) = &*connection
                && let Some(engine) = released.upgrade()
            {
                debug!(database = %self.config.name, "reusing engine still held after close");
                *connection = Connection::Open(Arc::clone(&engine));
                return Ok(engine);
            }
            *connection = Connection::Opening;
        }

        let path = self.config.path();
        let version = self.config.version;
        let stores = self.config.stores.clone();
        let persist_mode = self.config.durability.persist_mode();
        info!(database = %self.config.name, path = %path.display(), version, "opening database");

        let opened = tokio::task::spawn_blocking(move || {
            Engine::open(&path, version, &stores, persist_mode)
        })
        .await
        .map_err(|e| KvError::Task(e.to_string()))
        .and_then(|r| r);

        let mut connection = self.lock()?;
        match opened {
            Ok(engine) => {
                let engine = Arc::new(engine);
                *connection = Connection::Open(Arc::clone(&engine));
                Ok(engine)
            }
            Err(e) => {
                error!(database = %self.config.name, error = %e, "failed to open database");
                *connection = Connection::Failed(e.to_string());
                Err(Error::Schema(e))
            }
        }
    }

    fn current(&self) -> Result<Option<Arc<Engine>>> {
        match &*self.lock()? {
            Connection::Open(engine) => Ok(Some(Arc::clone(engine))),
            Connection::Failed(reason) => Err(Error::Schema(KvError::OpenFailed(reason.clone()))),
            Connection::Closed(_) | Connection::Opening => Ok(None),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| Error::Schema(KvError::Poisoned))
    }
}

/// Run an engine call on the blocking pool.
pub(crate) async fn blocking<R, F>(engine: Arc<Engine>, f: F) -> std::result::Result<R, KvError>
where
    F: FnOnce(&Engine) -> std::result::Result<R, KvError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| KvError::Task(e.to_string()))?
}

pub(crate) fn from_value<T: Record>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Read(e.into()))
}
