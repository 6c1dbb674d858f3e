//! Per-namespace store handle
//!
//! A handle owns the in-memory document of one namespace. The document is
//! published through a watch channel as immutable snapshots: every mutation
//! builds a new `Arc<Document>`, so snapshots handed out earlier never change
//! and subscribers can detect changes by pointer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use super::update::{Setter, Update};
use crate::config::StoreConfig;
use crate::debounce::Debouncer;
use crate::error::StoreResult;
use crate::storage::{Document, StorageBackend, StorageError};

/// Immutable view of a namespace's document
pub type Snapshot = Arc<Document>;

/// Load progress of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
}

struct HandleInner {
    namespace: String,
    backend: Arc<dyn StorageBackend>,
    state: watch::Sender<Option<Snapshot>>,
    debouncer: Debouncer,
    write_gate: Mutex<()>,
    dirty: AtomicBool,
    degraded: AtomicBool,
    flush_retries: u32,
    retry_backoff: Duration,
}

/// Handle on one namespace; cheap to clone, all clones share state
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<HandleInner>,
}

impl StoreHandle {
    pub(crate) fn new(
        namespace: &str,
        backend: Arc<dyn StorageBackend>,
        config: &StoreConfig,
        runtime: Handle,
    ) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(HandleInner {
                namespace: namespace.to_string(),
                backend,
                state,
                debouncer: Debouncer::new(config.save_delay(), runtime),
                write_gate: Mutex::new(()),
                dirty: AtomicBool::new(false),
                degraded: AtomicBool::new(false),
                flush_retries: config.flush_retries,
                retry_backoff: config.retry_backoff(),
            }),
        }
    }

    pub(crate) fn spawn_load(&self, runtime: &Handle) {
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move { inner.load().await });
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn load_state(&self) -> LoadState {
        if self.inner.state.borrow().is_some() {
            LoadState::Ready
        } else {
            LoadState::Loading
        }
    }

    pub fn is_ready(&self) -> bool {
        self.load_state() == LoadState::Ready
    }

    /// Load failed; the handle will keep serving defaults
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::SeqCst)
    }

    /// In-memory changes not yet written to the backend
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// A flush is waiting for the quiet period to end
    pub fn flush_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Current document, `None` while loading
    pub fn document(&self) -> Option<Snapshot> {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified whenever a new document snapshot is published
    pub fn subscribe(&self) -> watch::Receiver<Option<Snapshot>> {
        self.inner.state.subscribe()
    }

    /// Wait until the document is loaded
    ///
    /// Never resolves for a degraded handle.
    pub async fn ready(&self) -> Snapshot {
        let mut rx = self.inner.state.subscribe();
        loop {
            if let Some(document) = rx.borrow_and_update().clone() {
                return document;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Read `key`, seeding `default` into the document when the key is absent
    ///
    /// Before the document is loaded this returns `default` untouched. Seeded
    /// defaults are not flushed on their own; they ride along with the next
    /// write of the namespace.
    pub fn get(&self, key: &str, default: Option<Value>) -> Option<Value> {
        let mut result = None;

        self.inner.state.send_if_modified(|state| {
            let Some(document) = state else {
                result = default.clone();
                return false;
            };
            if let Some(value) = document.get(key) {
                result = Some(value.clone());
                return false;
            }
            let Some(default) = default.as_ref() else {
                return false;
            };

            let mut next = Document::clone(document);
            next.insert(key.to_string(), default.clone());
            *document = Arc::new(next);
            result = Some(default.clone());
            true
        });

        result
    }

    /// [`StoreHandle::get`] with a mandatory default
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key, Some(default.clone())).unwrap_or(default)
    }

    /// Read and deserialize `key` without seeding anything
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let document = self.document()?;
        let value = document.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!(namespace = %self.inner.namespace, key, error = %e, "stored value has unexpected shape");
                None
            }
        }
    }

    /// Replace `key` with a literal or the result of an updater
    ///
    /// Dropped when the document is not loaded yet. The backend write is
    /// debounced and only scheduled when the value actually changed.
    ///
    /// The updater sees the current snapshot and runs without any lock held,
    /// so it may read this handle or set other keys. Its result is merged
    /// into whatever document is current once it returns.
    pub fn set(&self, key: &str, update: impl Into<Update>) {
        let Some(current) = self.document() else {
            debug!(namespace = %self.inner.namespace, key, "write before load dropped");
            return;
        };
        let value = update.into().apply(current.get(key));
        drop(current);

        let mut changed = false;
        self.inner.state.send_if_modified(|state| {
            let Some(document) = state else {
                return false;
            };
            changed = document.get(key) != Some(&value);

            let mut next = Document::clone(document);
            next.insert(key.to_string(), value);
            *document = Arc::new(next);
            true
        });

        if changed {
            self.inner.dirty.store(true, Ordering::SeqCst);
            let inner = Arc::clone(&self.inner);
            self.inner.debouncer.schedule(async move {
                // Errors are logged inside; the document stays dirty
                let _ = inner.flush().await;
            });
        }
    }

    /// Value of `key` (seeding `default`) and a setter bound to it
    pub fn use_item(&self, key: &str, default: Option<Value>) -> (Option<Value>, Setter) {
        (self.get(key, default), Setter::new(self.clone(), key))
    }

    /// Write pending changes now instead of waiting for the quiet period
    pub async fn flush_now(&self) -> StoreResult<()> {
        self.inner.debouncer.cancel();
        self.inner.flush().await?;
        Ok(())
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("namespace", &self.inner.namespace)
            .field("backend", &self.inner.backend.name())
            .field("load_state", &self.load_state())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl HandleInner {
    async fn load(&self) {
        let namespace = self.namespace.as_str();
        let backend = self.backend.name();

        let raw = match self.backend.read_document(namespace).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(namespace, backend, error = %e, "failed to load document; store stays unavailable");
                self.degraded.store(true, Ordering::SeqCst);
                return;
            }
        };

        let (document, write_through) = match raw {
            None => (Document::new(), true),
            Some(Value::Object(document)) => (document, false),
            Some(other) => {
                warn!(namespace, backend, found = json_kind(&other), "stored document is not an object; resetting");
                (Document::new(), true)
            }
        };

        if write_through {
            let _gate = self.write_gate.lock().await;
            if let Err(e) = self.backend.write_document(namespace, &document).await {
                error!(namespace, backend, error = %e, "cannot store data, application will not work as intended");
                self.degraded.store(true, Ordering::SeqCst);
                return;
            }
        }

        info!(namespace, backend, keys = document.len(), created = write_through, "document loaded");
        self.state.send_replace(Some(Arc::new(document)));
    }

    async fn flush(&self) -> Result<(), StorageError> {
        let _gate = self.write_gate.lock().await;
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let mut attempt = 0;
        loop {
            let current = self.state.borrow().clone();
            let Some(document) = current else {
                return Ok(());
            };

            match self.backend.write_document(&self.namespace, &document).await {
                Ok(()) => {
                    debug!(namespace = %self.namespace, keys = document.len(), "document flushed");
                    return Ok(());
                }
                Err(e) if attempt < self.flush_retries => {
                    let backoff = self.retry_backoff.saturating_mul(1 << attempt.min(16));
                    warn!(namespace = %self.namespace, attempt = attempt + 1, error = %e, "flush failed; retrying in {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(namespace = %self.namespace, error = %e, "flush failed; keeping changes in memory");
                    self.dirty.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
