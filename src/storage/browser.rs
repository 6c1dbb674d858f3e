//! Browser storage backend
//!
//! Implements StorageBackend for `window.localStorage`.
//! Used by WASM builds running outside the native runtime.

use super::{Document, StorageBackend, StorageError};
use async_trait::async_trait;
use serde_json::Value;
use web_sys::Storage;

/// Browser storage backend using localStorage, one item per namespace
pub struct BrowserStorageBackend {
    prefix: String,
}

impl BrowserStorageBackend {
    /// Create a new browser storage backend
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prepended to every item key to keep apps on one origin apart
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn item_key(&self, namespace: &str) -> String {
        format!("{}{}", self.prefix, namespace)
    }

    /// Get localStorage instance
    fn get_local_storage(&self) -> Result<Storage, StorageError> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::BackendError("Window not available".to_string()))?;

        window
            .local_storage()
            .map_err(|e| {
                StorageError::BackendError(format!("localStorage not available: {:?}", e))
            })?
            .ok_or_else(|| StorageError::BackendError("localStorage is None".to_string()))
    }
}

#[async_trait]
impl StorageBackend for BrowserStorageBackend {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn read_document(&self, namespace: &str) -> Result<Option<Value>, StorageError> {
        let storage = self.get_local_storage()?;
        let raw = storage
            .get_item(&self.item_key(namespace))
            .map_err(|e| {
                StorageError::BackendError(format!("Failed to read from localStorage: {:?}", e))
            })?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            StorageError::SerializationError(format!("Failed to parse item {}: {}", namespace, e))
        })?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn write_document(
        &self,
        namespace: &str,
        document: &Document,
    ) -> Result<(), StorageError> {
        let value = serde_json::to_string(document).map_err(|e| {
            StorageError::SerializationError(format!(
                "Failed to serialize item {}: {}",
                namespace, e
            ))
        })?;

        self.get_local_storage()?
            .set_item(&self.item_key(namespace), &value)
            .map_err(|e| {
                StorageError::BackendError(format!("Failed to write to localStorage: {:?}", e))
            })
    }
}
