//! Keyed document store
//!
//! [`KeyedStore`] hands out one [`StoreHandle`] per namespace and keeps it
//! for the life of the store, so every caller asking for the same namespace
//! shares the same document, debouncer and backend resources.
//!
//! ```rust,no_run
//! # use keyed_store::{KeyedStore, StoreConfig};
//! # use serde_json::json;
//! # async fn example() -> Result<(), keyed_store::StoreError> {
//! let store = KeyedStore::new(StoreConfig::default())?;
//! let prefs = store.open("footersSeen")?;
//! prefs.ready().await;
//!
//! let (seen, set_seen) = prefs.use_item("home", Some(json!(false)));
//! if seen == Some(json!(false)) {
//!     set_seen.set(json!(true));
//! }
//! store.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod handle;
mod update;

pub use handle::{LoadState, Snapshot, StoreHandle};
pub use update::{Setter, Update};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::{BackendKind, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::host::HostCapability;
use crate::storage::StorageBackend;
use crate::storage::memory::MemoryBackend;

static GLOBAL: OnceCell<KeyedStore> = OnceCell::new();

/// Registry of namespace handles over one backend
pub struct KeyedStore {
    backend: Arc<dyn StorageBackend>,
    config: StoreConfig,
    runtime: Handle,
    handles: Mutex<HashMap<String, StoreHandle>>,
}

impl KeyedStore {
    /// Build a store with the backend chosen by `config` and the host capability
    ///
    /// Must be called from within a tokio runtime; loads and flushes are
    /// spawned onto it.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let backend = select_backend(&config, HostCapability::current())?;
        Self::with_backend(backend, config)
    }

    /// Build a store over an explicit backend
    pub fn with_backend(
        backend: Arc<dyn StorageBackend>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| StoreError::NoRuntime(e.to_string()))?;
        info!(backend = backend.name(), save_delay_ms = config.save_delay_ms, "keyed store ready");
        Ok(Self {
            backend,
            config,
            runtime,
            handles: Mutex::new(HashMap::new()),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Handle for `namespace`, starting its load on first use
    ///
    /// Handles are keyed by the backend's canonical spelling of the
    /// namespace, so every spelling of one file shares one handle.
    pub fn open(&self, namespace: &str) -> StoreResult<StoreHandle> {
        if namespace.is_empty() {
            return Err(StoreError::InvalidNamespace {
                namespace: namespace.to_string(),
                reason: "namespace cannot be empty".to_string(),
            });
        }

        let key = self
            .backend
            .check_namespace(namespace)
            .map_err(|e| StoreError::InvalidNamespace {
                namespace: namespace.to_string(),
                reason: e.to_string(),
            })?;

        let mut handles = self.lock();
        if let Some(handle) = handles.get(&key) {
            return Ok(handle.clone());
        }

        let handle = StoreHandle::new(
            &key,
            Arc::clone(&self.backend),
            &self.config,
            self.runtime.clone(),
        );
        handle.spawn_load(&self.runtime);
        debug!(namespace = %key, backend = self.backend.name(), "namespace opened");
        handles.insert(key, handle.clone());
        Ok(handle)
    }

    /// Namespaces opened so far, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Write every dirty namespace now
    ///
    /// Attempts all namespaces and returns the first failure.
    pub async fn flush_all(&self) -> StoreResult<()> {
        let handles: Vec<StoreHandle> = self.lock().values().cloned().collect();
        let mut first_error = None;
        for handle in handles {
            if let Err(e) = handle.flush_now().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Graceful exit: flush pending writes
    pub async fn shutdown(&self) -> StoreResult<()> {
        info!(namespaces = self.lock().len(), "keyed store shutting down");
        self.flush_all().await
    }

    /// Forget every cached handle
    ///
    /// Pending flushes of forgotten handles still run. Meant for test
    /// harnesses that need a fresh registry.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoreHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Initialize the process-wide store; later calls return the existing one
pub fn init_global(config: StoreConfig) -> StoreResult<&'static KeyedStore> {
    GLOBAL.get_or_try_init(|| KeyedStore::new(config))
}

/// The process-wide store, if initialized
pub fn global() -> Option<&'static KeyedStore> {
    GLOBAL.get()
}

/// Pick the backend for this process
pub fn select_backend(
    config: &StoreConfig,
    capability: HostCapability,
) -> StoreResult<Arc<dyn StorageBackend>> {
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::NativeFile => native_file_backend(config),
        BackendKind::LocalCache => local_cache_backend(config),
        BackendKind::Auto if capability.is_native() => native_file_backend(config),
        BackendKind::Auto => local_cache_backend(config),
    }
}

#[cfg(feature = "native-fs")]
fn native_file_backend(config: &StoreConfig) -> StoreResult<Arc<dyn StorageBackend>> {
    let app_dir = config
        .app_dir
        .clone()
        .unwrap_or_else(|| crate::host::HostDirs::detect(&config.app_name).app_dir());
    Ok(Arc::new(crate::storage::native_file::NativeFileStore::new(
        app_dir,
    )))
}

#[cfg(not(feature = "native-fs"))]
fn native_file_backend(_config: &StoreConfig) -> StoreResult<Arc<dyn StorageBackend>> {
    Err(StoreError::Config(
        "native file store requires the native-fs feature".to_string(),
    ))
}

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
fn local_cache_backend(config: &StoreConfig) -> StoreResult<Arc<dyn StorageBackend>> {
    Ok(Arc::new(crate::storage::browser::BrowserStorageBackend::new(
        format!("{}:", config.app_name),
    )))
}

#[cfg(all(not(all(target_arch = "wasm32", feature = "wasm")), feature = "native-fs"))]
fn local_cache_backend(config: &StoreConfig) -> StoreResult<Arc<dyn StorageBackend>> {
    let cache_dir = config
        .cache_dir
        .clone()
        .unwrap_or_else(|| crate::host::HostDirs::default_cache_dir(&config.app_name));
    Ok(Arc::new(crate::storage::local_cache::LocalCacheBackend::new(
        cache_dir,
    )))
}

#[cfg(not(any(all(target_arch = "wasm32", feature = "wasm"), feature = "native-fs")))]
fn local_cache_backend(_config: &StoreConfig) -> StoreResult<Arc<dyn StorageBackend>> {
    Err(StoreError::Config(
        "no local cache backend compiled in (enable native-fs or wasm)".to_string(),
    ))
}
