//! In-memory storage backend
//!
//! Keeps documents in a process-local map. Nothing survives the process, so
//! this backend serves ephemeral sessions and stands in for real I/O in tests:
//! it counts writes per namespace, can delay reads and can fail a number of
//! upcoming writes.

use super::{Document, StorageBackend, StorageError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Inner {
    items: HashMap<String, Value>,
    writes: HashMap<String, Vec<Document>>,
}

/// Non-durable backend keeping one JSON value per namespace
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    read_delay: Option<Duration>,
    failing_reads: AtomicUsize,
    failing_writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every read by `delay` (simulates a slow engine)
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Pre-populate a namespace with a raw value
    pub fn with_value(self, namespace: impl Into<String>, value: Value) -> Self {
        self.lock().items.insert(namespace.into(), value);
        self
    }

    /// Make the next `count` reads fail
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Currently stored value for a namespace
    pub fn stored(&self, namespace: &str) -> Option<Value> {
        self.lock().items.get(namespace).cloned()
    }

    /// Number of successful writes for a namespace
    pub fn write_count(&self, namespace: &str) -> usize {
        self.lock().writes.get(namespace).map_or(0, Vec::len)
    }

    /// Every document successfully written for a namespace, oldest first
    pub fn writes(&self, namespace: &str) -> Vec<Document> {
        self.lock().writes.get(namespace).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read_document(&self, namespace: &str) -> Result<Option<Value>, StorageError> {
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.failing_reads) {
            return Err(StorageError::BackendError(format!(
                "Injected read failure for {}",
                namespace
            )));
        }
        Ok(self
            .lock()
            .items
            .get(namespace)
            .filter(|value| !value.is_null())
            .cloned())
    }

    async fn write_document(
        &self,
        namespace: &str,
        document: &Document,
    ) -> Result<(), StorageError> {
        if Self::take_failure(&self.failing_writes) {
            return Err(StorageError::IoError(format!(
                "Injected write failure for {}",
                namespace
            )));
        }
        let mut inner = self.lock();
        inner
            .items
            .insert(namespace.to_string(), Value::Object(document.clone()));
        inner
            .writes
            .entry(namespace.to_string())
            .or_default()
            .push(document.clone());
        Ok(())
    }
}
