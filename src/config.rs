//! Store configuration types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Which backend a store persists to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Native file store inside the native runtime, local cache otherwise
    #[default]
    Auto,
    LocalCache,
    NativeFile,
    Memory,
}

/// Main store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Quiet period before a burst of writes is flushed, in milliseconds
    pub save_delay_ms: u64,
    /// Extra attempts after a failed flush
    pub flush_retries: u32,
    /// Backoff before the first retry; doubles on each further attempt
    pub retry_backoff_ms: u64,
    /// Backend selection
    pub backend: BackendKind,
    /// Directory for the local cache backend (platform cache dir when unset)
    pub cache_dir: Option<PathBuf>,
    /// Application directory for the native file store (documents/<app> when unset)
    pub app_dir: Option<PathBuf>,
    /// Application name used to derive default directories
    pub app_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            save_delay_ms: 400,
            flush_retries: 3,
            retry_backoff_ms: 250,
            backend: BackendKind::Auto,
            cache_dir: None,
            app_dir: None,
            app_name: "keyed-store".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create a new store config
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML; missing fields keep their defaults
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StoreError::Config(format!("Invalid store config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Set the debounce quiet period
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay_ms = millis(delay);
        self
    }

    /// Set flush retry policy
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.flush_retries = retries;
        self.retry_backoff_ms = millis(backoff);
        self
    }

    /// Force a backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the local cache directory
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Set the native application directory
    pub fn with_app_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.app_dir = Some(path.into());
        self
    }

    /// Set the application name
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> StoreResult<()> {
        if self.save_delay_ms == 0 {
            return Err(StoreError::Config(
                "save_delay_ms must be greater than zero".to_string(),
            ));
        }

        if self.app_name.trim().is_empty() {
            return Err(StoreError::Config("app_name cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.save_delay(), Duration::from_millis(400));
        assert_eq!(config.flush_retries, 3);
        assert_eq!(config.backend, BackendKind::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_keeps_defaults_for_missing_fields() {
        let config = StoreConfig::from_toml_str(
            r#"
            save_delay_ms = 300
            backend = "native-file"
            app_dir = "/tmp/app"
            "#,
        )
        .unwrap();

        assert_eq!(config.save_delay_ms, 300);
        assert_eq!(config.backend, BackendKind::NativeFile);
        assert_eq!(config.app_dir, Some(PathBuf::from("/tmp/app")));
        assert_eq!(config.retry_backoff_ms, 250);
    }

    #[test]
    fn test_zero_delay_rejected() {
        let result = StoreConfig::from_toml_str("save_delay_ms = 0");
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = StoreConfig::from_toml_str("backend = \"cloud\"");
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_huge_durations_saturate() {
        let config = StoreConfig::default()
            .with_save_delay(Duration::MAX)
            .with_retries(1, Duration::MAX);
        assert_eq!(config.save_delay_ms, u64::MAX);
        assert_eq!(config.retry_backoff_ms, u64::MAX);

        let config = StoreConfig::default().with_save_delay(Duration::from_millis(1500));
        assert_eq!(config.save_delay_ms, 1500);
    }
}
