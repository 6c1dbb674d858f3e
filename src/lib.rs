//! Keyed Store - persistent key-value documents for desktop shells
//!
//! Provides:
//! - One JSON document per namespace, loaded once and shared by every caller
//! - Interchangeable backends (local persistent cache, native file store, memory)
//! - Debounced write-behind with retry and flush-on-shutdown
//! - A hook-shaped `get` / `set` / `use_item` / `subscribe` surface

pub mod config;
pub mod debounce;
pub mod error;
pub mod host;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use config::{BackendKind, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use host::HostCapability;
#[cfg(feature = "native-fs")]
pub use host::{AppFile, HostDirs};
pub use storage::memory::MemoryBackend;
pub use storage::{Document, StorageBackend, StorageError};
#[cfg(feature = "native-fs")]
pub use storage::local_cache::LocalCacheBackend;
#[cfg(feature = "native-fs")]
pub use storage::native_file::{FileStoreRef, NativeFileStore};
#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
pub use storage::browser::BrowserStorageBackend;

pub use store::{
    KeyedStore, LoadState, Setter, Snapshot, StoreHandle, Update, global, init_global,
    select_backend,
};
