//! Storage backend abstraction
//!
//! Defines the StorageBackend trait and implementations for different storage systems:
//! - LocalCacheBackend: item store kept in a cache directory (local persistent cache)
//! - NativeFileStore: one `{ "data": ... }` JSON file per namespace path (native apps)
//! - BrowserStorageBackend: `window.localStorage` (for WASM apps)
//! - MemoryBackend: non-durable, used for ephemeral sessions and tests

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Whole JSON object persisted under one namespace.
pub type Document = Map<String, Value>;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Trait for storage backends
///
/// A backend persists one JSON document per namespace. Reads hand back the
/// raw stored value so the store can decide what to do with documents that
/// are not objects; `None` means nothing has been stored yet.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Validate a namespace and return the key it is stored under
    ///
    /// Spellings that address the same storage must map to the same key.
    fn check_namespace(&self, namespace: &str) -> Result<String, StorageError> {
        if namespace.is_empty() {
            return Err(StorageError::BackendError(
                "Namespace cannot be empty".to_string(),
            ));
        }
        Ok(namespace.to_string())
    }

    /// Read the stored value for a namespace
    async fn read_document(&self, namespace: &str) -> Result<Option<Value>, StorageError>;

    /// Replace the stored document for a namespace
    async fn write_document(&self, namespace: &str, document: &Document)
    -> Result<(), StorageError>;
}

pub mod memory;

// Storage backend implementations
#[cfg(feature = "native-fs")]
pub mod local_cache;

#[cfg(feature = "native-fs")]
pub mod native_file;

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
pub mod browser;
