//! Host runtime collaborator
//!
//! The store does not talk to windows or processes, but it needs two things
//! from the host: whether a native runtime is present (decides the backend)
//! and where application files live (decides native namespaces).

use once_cell::sync::OnceCell;

static CAPABILITY: OnceCell<HostCapability> = OnceCell::new();

/// Process-wide runtime capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCapability {
    /// Running inside the native desktop runtime; file stores are available
    NativeRuntime,
    /// Plain web context; only the local cache is available
    WebOnly,
}

impl HostCapability {
    fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            HostCapability::WebOnly
        } else {
            HostCapability::NativeRuntime
        }
    }

    /// Capability for this process, detected on first use
    pub fn current() -> Self {
        *CAPABILITY.get_or_init(Self::detect)
    }

    /// Install the capability before anything asked for it
    ///
    /// Returns the already decided capability if it was resolved earlier.
    pub fn install(capability: HostCapability) -> Result<(), HostCapability> {
        CAPABILITY.set(capability).map_err(|_| Self::current())
    }

    pub fn is_native(self) -> bool {
        self == HostCapability::NativeRuntime
    }
}

#[cfg(feature = "native-fs")]
pub use dirs_impl::{AppFile, HostDirs, STORE_EXTENSIONS};

#[cfg(feature = "native-fs")]
mod dirs_impl {
    use crate::storage::StorageError;
    use std::path::{Path, PathBuf};
    use tracing::debug;

    /// Extensions the store can parse when listing application files
    pub const STORE_EXTENSIONS: &[&str] = &["json", "dat"];

    /// A store file found in the application directory
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct AppFile {
        pub path: PathBuf,
        /// Path relative to the application directory
        pub name: String,
    }

    /// Platform directories for one application
    #[derive(Debug, Clone)]
    pub struct HostDirs {
        documents: PathBuf,
        app_name: String,
    }

    impl HostDirs {
        pub fn new(documents: impl Into<PathBuf>, app_name: impl Into<String>) -> Self {
            Self {
                documents: documents.into(),
                app_name: app_name.into(),
            }
        }

        /// Use the platform documents directory (`~/Documents` fallback)
        pub fn detect(app_name: impl Into<String>) -> Self {
            let documents = dirs::document_dir().unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("Documents")
            });
            Self::new(documents, app_name)
        }

        /// Default cache directory for the local cache backend
        pub fn default_cache_dir(app_name: &str) -> PathBuf {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(app_name)
                .join("local-cache")
        }

        pub fn documents_dir(&self) -> &Path {
            &self.documents
        }

        /// `<documents>/<app name>`
        pub fn app_dir(&self) -> PathBuf {
            self.documents.join(&self.app_name)
        }

        /// Namespace string for a store file inside the application directory
        pub fn namespace_for(&self, file_name: &str) -> String {
            self.app_dir().join(file_name).to_string_lossy().into_owned()
        }

        /// Create the application directory if needed
        pub async fn ensure_app_dir(&self) -> Result<PathBuf, StorageError> {
            let dir = self.app_dir();
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                StorageError::IoError(format!(
                    "Failed to create application directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            Ok(dir)
        }

        /// Store files under the application directory, recursively
        ///
        /// Creates the directory first; returns an empty list when the
        /// application path exists but is a file.
        pub async fn list_app_files(&self) -> Result<Vec<AppFile>, StorageError> {
            let dir = self.app_dir();
            if tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_file()) {
                debug!(path = %dir.display(), "application path is a file");
                return Ok(Vec::new());
            }
            self.ensure_app_dir().await?;

            let store = crate::storage::native_file::NativeFileStore::new(&dir);
            let names = store.list_namespaces(STORE_EXTENSIONS).await?;
            Ok(names
                .into_iter()
                .map(|name| AppFile {
                    path: dir.join(&name),
                    name,
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_stable() {
        let first = HostCapability::current();
        assert!(HostCapability::install(HostCapability::WebOnly).is_err());
        assert_eq!(HostCapability::current(), first);
    }

    #[cfg(feature = "native-fs")]
    #[tokio::test]
    async fn test_list_app_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let dirs = HostDirs::new(temp.path(), "MyApp");

        let app = dirs.ensure_app_dir().await.unwrap();
        std::fs::write(app.join("example_view.dat"), b"{}").unwrap();
        std::fs::write(app.join("readme.md"), b"").unwrap();

        let files = dirs.list_app_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "example_view.dat");
        assert_eq!(files[0].path, app.join("example_view.dat"));
    }

    #[cfg(feature = "native-fs")]
    #[test]
    fn test_namespace_for() {
        let dirs = HostDirs::new("/home/me/Documents", "MyApp");
        let ns = dirs.namespace_for("example_view.dat");
        assert_eq!(
            std::path::PathBuf::from(ns),
            std::path::PathBuf::from("/home/me/Documents/MyApp/example_view.dat")
        );
    }
}
