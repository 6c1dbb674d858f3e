//! Store-level error types
//!
//! Backend failures are reported as [`StorageError`]; everything the store
//! itself can refuse lives in [`StoreError`]. Neither ever crosses `get` or
//! `set`: load and flush failures are logged and reflected in handle state.

use crate::storage::StorageError;
use thiserror::Error;

/// Errors returned by store construction, configuration and `open`
#[derive(Error, Debug)]
pub enum StoreError {
    /// Namespace rejected before any I/O
    #[error("Invalid namespace '{namespace}': {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    /// Store built outside a tokio runtime
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend failure surfaced to a caller that asked for it explicitly
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
