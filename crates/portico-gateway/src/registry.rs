use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use portico_protocol::{OBJECT_ID_PREFIX, STATIC_PREFIX};

use crate::value::HostValue;

/// Maps ids to live host values.
///
/// The registry owns a strong reference to every bound value for the
/// duration of the binding; the peer controls lifetimes by releasing ids.
/// Ids are issued from a process-wide monotonic counter and never reused.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    bindings: RwLock<HashMap<String, HostValue>>,
    counter: AtomicU64,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next instance id and binds `value` under it.
    pub fn put_new(&self, value: HostValue) -> String {
        let id = format!(
            "{OBJECT_ID_PREFIX}{}",
            self.counter.fetch_add(1, Ordering::Relaxed)
        );
        self.bindings.write().insert(id.clone(), value);
        id
    }

    /// Binds (or rebinds) `value` under a caller-chosen id, returning the
    /// previous binding if any.
    pub fn put(&self, id: impl Into<String>, value: HostValue) -> Option<HostValue> {
        self.bindings.write().insert(id.into(), value)
    }

    /// Looks up a binding. Static ids are never bound, so they resolve to
    /// `None` here; callers strip the marker and go through reflection.
    pub fn get(&self, id: &str) -> Option<HostValue> {
        if id.starts_with(STATIC_PREFIX) {
            return None;
        }
        self.bindings.read().get(id).cloned()
    }

    /// Removes a binding. Unknown ids are a silent no-op.
    pub fn delete(&self, id: &str) {
        self.bindings.write().remove(id);
    }

    /// Drops every binding. Ids keep increasing monotonically afterwards.
    pub fn clear(&self) {
        self.bindings.write().clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bindings.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Finds an id already bound to this exact container or object, if any.
    /// Primitives never match.
    pub fn id_of(&self, value: &HostValue) -> Option<String> {
        self.bindings
            .read()
            .iter()
            .find(|(_, bound)| bound.is_same_object(value))
            .map(|(id, _)| id.clone())
    }
}
