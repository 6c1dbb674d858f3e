//! Native file store backend
//!
//! Implements StorageBackend on top of per-path JSON store files, the way
//! the native runtime's store plugin lays them out: each namespace is a file
//! path holding a single object, and the document lives under the `"data"`
//! key of that object.
//!
//! ```json
//! { "data": { "exampleData": "hello" } }
//! ```
//!
//! Store files are opened once per path and memoized for the life of the
//! backend, so every handle on the same file shares one [`FileStoreRef`].
//!
//! ## Security
//!
//! Namespaces are resolved against the application directory. Paths
//! containing ".." are rejected, and all resolved paths are verified to
//! remain within that directory.

use super::{Document, StorageBackend, StorageError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tracing::{debug, info};

/// Key under which the document is stored inside a store file
pub const DATA_KEY: &str = "data";

/// One store file: an in-memory object with explicit save to disk
pub struct FileStoreRef {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl FileStoreRef {
    async fn open(path: PathBuf) -> Result<Self, StorageError> {
        let entries = match fs::read(&path).await {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => Map::new(),
            Ok(raw) => match serde_json::from_slice::<Value>(&raw) {
                Ok(Value::Object(entries)) => entries,
                Ok(_) => {
                    return Err(StorageError::SerializationError(format!(
                        "Store file {} does not hold an object",
                        path.display()
                    )));
                }
                Err(e) => {
                    return Err(StorageError::SerializationError(format!(
                        "Failed to parse store file {}: {}",
                        path.display(),
                        e
                    )));
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                return Err(StorageError::IoError(format!(
                    "Failed to read store file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value under `key`; `None` when absent
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Update `key` in memory; call [`FileStoreRef::save`] to persist
    pub fn set(&self, key: &str, value: Value) {
        self.lock().insert(key.to_string(), value);
    }

    /// Write the whole store file to disk, creating parent directories
    pub async fn save(&self) -> Result<(), StorageError> {
        let content = {
            let entries = self.lock();
            serde_json::to_vec_pretty(&*entries).map_err(|e| {
                StorageError::SerializationError(format!(
                    "Failed to serialize store file {}: {}",
                    self.path.display(),
                    e
                ))
            })?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::IoError(format!(
                    "Failed to create directory for {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        }

        fs::write(&self.path, content).await.map_err(|e| {
            StorageError::IoError(format!(
                "Failed to write store file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// File-backed store rooted at an application-owned directory
pub struct NativeFileStore {
    base_path: PathBuf,
    stores: tokio::sync::Mutex<HashMap<PathBuf, Arc<FileStoreRef>>>,
}

impl NativeFileStore {
    /// Create a new native file store
    ///
    /// # Arguments
    ///
    /// * `base_path` - Application directory every namespace must resolve into
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyed_store::storage::native_file::NativeFileStore;
    ///
    /// let store = NativeFileStore::new("/home/me/Documents/MyApp");
    /// ```
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            stores: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a namespace to a store file path with security checks.
    ///
    /// Absolute namespaces must already point inside the base path; relative
    /// ones are joined onto it.
    fn resolve_path(&self, namespace: &str) -> Result<PathBuf, StorageError> {
        if namespace.is_empty() {
            return Err(StorageError::PermissionDenied(
                "Empty store path not allowed".to_string(),
            ));
        }

        let requested = Path::new(namespace);
        if requested
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StorageError::PermissionDenied(
                "Path traversal (..) not allowed".to_string(),
            ));
        }

        let full = if requested.is_absolute() {
            if !requested.starts_with(&self.base_path) {
                return Err(StorageError::PermissionDenied(format!(
                    "Store path {} is outside the application directory",
                    namespace
                )));
            }
            requested.to_path_buf()
        } else {
            self.base_path.join(requested)
        };
        // Drops `.` segments and doubled separators
        let full: PathBuf = full.components().collect();

        if full == self.base_path {
            return Err(StorageError::PermissionDenied(
                "Store path must name a file inside the application directory".to_string(),
            ));
        }

        // Symlinks may still point out of the base directory
        if full.exists() {
            let canonical = full
                .canonicalize()
                .map_err(|e| StorageError::IoError(format!("Failed to resolve path: {}", e)))?;

            let base_canonical = self
                .base_path
                .canonicalize()
                .unwrap_or_else(|_| self.base_path.clone());

            if !canonical.starts_with(&base_canonical) {
                return Err(StorageError::PermissionDenied(
                    "Path escapes application directory".to_string(),
                ));
            }
        }

        Ok(full)
    }

    /// Open the store file for a namespace, reusing an already open one
    pub async fn load(&self, namespace: &str) -> Result<Arc<FileStoreRef>, StorageError> {
        let path = self.resolve_path(namespace)?;

        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(&path) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(FileStoreRef::open(path.clone()).await?);
        info!(path = %path.display(), "opened store file");
        stores.insert(path, Arc::clone(&store));
        Ok(store)
    }

    /// List store files under the base path with one of the given extensions
    ///
    /// Returns paths relative to the base path, sorted.
    pub async fn list_namespaces(&self, extensions: &[&str]) -> Result<Vec<String>, StorageError> {
        let mut found = Vec::new();
        let mut pending = vec![self.base_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StorageError::IoError(format!(
                        "Failed to read directory {}: {}",
                        dir.display(),
                        e
                    )));
                }
            };

            while let Some(entry) = read_dir.next_entry().await.map_err(|e| {
                StorageError::IoError(format!("Failed to read directory entry: {}", e))
            })? {
                let path = entry.path();
                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() && has_extension(&path, extensions) {
                    if let Ok(relative) = path.strip_prefix(&self.base_path) {
                        found.push(relative.to_string_lossy().into_owned());
                    }
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}

#[async_trait]
impl StorageBackend for NativeFileStore {
    fn name(&self) -> &'static str {
        "native-file"
    }

    fn check_namespace(&self, namespace: &str) -> Result<String, StorageError> {
        let path = self.resolve_path(namespace)?;
        path.to_str().map(str::to_string).ok_or_else(|| {
            StorageError::PermissionDenied(format!(
                "Store path {} is not valid UTF-8",
                path.display()
            ))
        })
    }

    async fn read_document(&self, namespace: &str) -> Result<Option<Value>, StorageError> {
        let store = self.load(namespace).await?;
        Ok(store.get(DATA_KEY).filter(|value| !value.is_null()))
    }

    async fn write_document(
        &self,
        namespace: &str,
        document: &Document,
    ) -> Result<(), StorageError> {
        let store = self.load(namespace).await?;
        store.set(DATA_KEY, Value::Object(document.clone()));
        store.save().await?;
        debug!(path = %store.path().display(), keys = document.len(), "store file saved");
        Ok(())
    }
}
