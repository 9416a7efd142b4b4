//! Shared adapters keyed by database name.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::AdapterConfig;
use crate::error::Result;
use crate::logging::{debug, info, warn};

use super::adapter::StoreAdapter;

/// Registry handing out one shared [`StoreAdapter`] per database name.
///
/// Adapters are constructed on first request and opened lazily on first use.
/// The host application decides when they go away with
/// [`release`](Self::release) or [`close_all`](Self::close_all).
///
/// # Example
///
/// ```ignore
/// use obj_kv::{AdapterConfig, AdapterRegistry};
///
/// let registry = AdapterRegistry::new();
/// let a = registry.get_or_create(AdapterConfig::new("shop", 1)).await?;
/// let b = registry.get_or_create(AdapterConfig::new("shop", 1)).await?;
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
///
/// registry.release("shop").await?;
/// ```
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Mutex<HashMap<String, Arc<StoreAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The adapter registered under `config.name`, constructing it if needed.
    ///
    /// An existing adapter is returned as-is; `config` is only used the first
    /// time a name is requested.
    pub async fn get_or_create(&self, config: AdapterConfig) -> Result<Arc<StoreAdapter>> {
        let mut adapters = self.adapters.lock().await;

        if let Some(existing) = adapters.get(&config.name) {
            if existing.config().version != config.version {
                warn!(
                    database = %config.name,
                    registered_version = existing.config().version,
                    requested_version = config.version,
                    "database already registered with another version"
                );
            }
            return Ok(Arc::clone(existing));
        }

        let name = config.name.clone();
        let adapter = Arc::new(StoreAdapter::new(config)?);
        adapters.insert(name.clone(), Arc::clone(&adapter));
        debug!(database = %name, "adapter registered");
        Ok(adapter)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<StoreAdapter>> {
        self.adapters.lock().await.get(name).cloned()
    }

    /// Registered database names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove an adapter and close its database.
    ///
    /// Returns `false` if nothing was registered under `name`. Other holders
    /// of the adapter can keep using it; it reopens on their next call.
    pub async fn release(&self, name: &str) -> Result<bool> {
        let removed = self.adapters.lock().await.remove(name);
        let Some(adapter) = removed else {
            return Ok(false);
        };
        adapter.close().await?;
        info!(database = %name, "adapter released");
        Ok(true)
    }

    /// Release every registered adapter.
    pub async fn close_all(&self) -> Result<()> {
        let drained: Vec<Arc<StoreAdapter>> = self
            .adapters
            .lock()
            .await
            .drain()
            .map(|(_, adapter)| adapter)
            .collect();

        for adapter in drained {
            adapter.close().await?;
        }
        Ok(())
    }
}
