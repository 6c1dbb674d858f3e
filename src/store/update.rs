//! Write payloads and bound setters

use serde_json::Value;

use super::handle::StoreHandle;

type Updater = Box<dyn FnOnce(Option<&Value>) -> Value + Send>;

/// New value for a key: either a literal or a function of the previous value
pub enum Update {
    Literal(Value),
    Fn(Updater),
}

impl Update {
    /// Wrap an updater receiving the previous value (`None` when absent)
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(Option<&Value>) -> Value + Send + 'static,
    {
        Update::Fn(Box::new(f))
    }

    pub(crate) fn apply(self, previous: Option<&Value>) -> Value {
        match self {
            Update::Literal(value) => value,
            Update::Fn(f) => f(previous),
        }
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Update::Literal(value)
    }
}

impl std::fmt::Debug for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Update::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Update::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

/// Setter bound to one key of one namespace, as returned by `use_item`
#[derive(Clone)]
pub struct Setter {
    handle: StoreHandle,
    key: String,
}

impl Setter {
    pub(crate) fn new(handle: StoreHandle, key: impl Into<String>) -> Self {
        Self {
            handle,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&self, update: impl Into<Update>) {
        self.handle.set(&self.key, update);
    }
}

impl std::fmt::Debug for Setter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setter")
            .field("namespace", &self.handle.namespace())
            .field("key", &self.key)
            .finish()
    }
}
