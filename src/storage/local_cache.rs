//! Local persistent cache backend
//!
//! Item store with `get_item` / `set_item` semantics, one JSON value per
//! namespace. Items live as individual files inside a cache directory; the
//! namespace is percent-encoded into the file name so any string can be used
//! as a key without touching the directory layout.
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! crash mid-write leaves the previous item intact.

use super::{Document, StorageBackend, StorageError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const ITEM_EXTENSION: &str = "json";

/// Item store kept in a directory of JSON files
pub struct LocalCacheBackend {
    cache_dir: PathBuf,
}

impl LocalCacheBackend {
    /// Create a new local cache backend
    ///
    /// # Arguments
    ///
    /// * `cache_dir` - Directory holding one file per item; created on first write
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyed_store::storage::local_cache::LocalCacheBackend;
    ///
    /// let backend = LocalCacheBackend::new("/tmp/my-app/cache");
    /// ```
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", urlencoding::encode(key), ITEM_EXTENSION))
    }

    /// Read an item; `None` when the item was never set or holds `null`
    pub async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.item_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::IoError(format!(
                    "Failed to read item {}: {}",
                    key, e
                )));
            }
        };

        let value: Value = serde_json::from_slice(&raw).map_err(|e| {
            StorageError::SerializationError(format!("Failed to parse item {}: {}", key, e))
        })?;

        Ok(if value.is_null() { None } else { Some(value) })
    }

    /// Store an item, replacing any previous value
    pub async fn set_item(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
            StorageError::IoError(format!(
                "Failed to create cache directory {}: {}",
                self.cache_dir.display(),
                e
            ))
        })?;

        let content = serde_json::to_vec(value).map_err(|e| {
            StorageError::SerializationError(format!("Failed to serialize item {}: {}", key, e))
        })?;

        let path = self.item_path(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, &content)
            .await
            .map_err(|e| StorageError::IoError(format!("Failed to write item {}: {}", key, e)))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| StorageError::IoError(format!("Failed to commit item {}: {}", key, e)))?;

        debug!(key, bytes = content.len(), "local cache item stored");
        Ok(())
    }

    /// Remove an item; removing a missing item is not an error
    pub async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.item_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::IoError(format!(
                "Failed to remove item {}: {}",
                key, e
            ))),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalCacheBackend {
    fn name(&self) -> &'static str {
        "local-cache"
    }

    async fn read_document(&self, namespace: &str) -> Result<Option<Value>, StorageError> {
        self.get_item(namespace).await
    }

    async fn write_document(
        &self,
        namespace: &str,
        document: &Document,
    ) -> Result<(), StorageError> {
        self.set_item(namespace, &Value::Object(document.clone()))
            .await
    }
}
