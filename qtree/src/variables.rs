//! Reference-counted variable bindings shared by the nodes of a query tree.
//!
//! Argument values are sent once, as bindings keyed by a [`VariableId`], and
//! then referenced by any number of nodes. Each node holds a
//! [`VariableReference`] per bound argument; the store counts the outstanding
//! references and [`VariableStore::garbage_collect`] drops the bindings nobody
//! refers to anymore.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::core::VariableId;

/// An opaque variable value.
pub type VariableValue = serde_json::Value;

#[derive(Debug)]
struct Binding {
    value: Arc<VariableValue>,
    refs: usize,
}

/// A store of variable bindings with reference counting.
///
/// Every operation takes the internal lock for its own duration only, so the
/// store can be shared between threads behind an [`Arc`].
#[derive(Debug, Default)]
pub struct VariableStore {
    bindings: Mutex<BTreeMap<VariableId, Binding>>,
}

impl VariableStore {
    /// Creates an empty, shareable store.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn bindings(&self) -> MutexGuard<'_, BTreeMap<VariableId, Binding>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a binding.
    ///
    /// Rebinding an existing id replaces its value and keeps its reference
    /// count. References handed out before keep the value they resolved.
    pub fn put(&self, id: VariableId, value: VariableValue) {
        let value = Arc::new(value);
        self.bindings()
            .entry(id)
            .and_modify(|b| b.value = value.clone())
            .or_insert(Binding { value, refs: 0 });
    }

    /// Resolves a binding, taking a reference to it.
    ///
    /// Returns `None` if no binding with that id exists.
    pub fn get(self: &Arc<Self>, id: VariableId) -> Option<VariableReference> {
        let mut bindings = self.bindings();
        let binding = bindings.get_mut(&id)?;
        binding.refs += 1;
        Some(VariableReference {
            id,
            value: binding.value.clone(),
            store: Arc::downgrade(self),
        })
    }

    fn release(&self, id: VariableId) {
        if let Some(binding) = self.bindings().get_mut(&id) {
            binding.refs = binding.refs.saturating_sub(1);
        }
    }

    /// Removes every binding with no outstanding references.
    ///
    /// Returns the ids of the removed bindings.
    pub fn garbage_collect(&self) -> Vec<VariableId> {
        let mut collected = Vec::new();
        self.bindings().retain(|id, binding| {
            let keep = binding.refs > 0;
            if !keep {
                collected.push(*id);
            }
            keep
        });
        if !collected.is_empty() {
            tracing::trace!(?collected, "collected unreferenced variables");
        }
        collected
    }

    /// Returns `true` if a binding with the given id exists.
    #[must_use]
    pub fn contains(&self, id: VariableId) -> bool {
        self.bindings().contains_key(&id)
    }

    /// The number of outstanding references to a binding, or `None` if it
    /// does not exist.
    #[must_use]
    pub fn ref_count(&self, id: VariableId) -> Option<usize> {
        self.bindings().get(&id).map(|b| b.refs)
    }

    /// The total number of outstanding references over all bindings.
    #[must_use]
    pub fn total_refs(&self) -> usize {
        self.bindings().values().map(|b| b.refs).sum()
    }

    /// The number of bindings in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings().len()
    }

    /// Returns `true` if the store holds no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings().is_empty()
    }
}

/// A counted reference to a variable binding.
///
/// The reference is released when dropped, or explicitly with
/// [`VariableReference::release`].
pub struct VariableReference {
    id: VariableId,
    value: Arc<VariableValue>,
    store: Weak<VariableStore>,
}

impl VariableReference {
    /// The id of the referenced binding.
    #[must_use]
    pub fn id(&self) -> VariableId {
        self.id
    }

    /// The value the binding held when this reference was taken.
    #[must_use]
    pub fn value(&self) -> &VariableValue {
        &self.value
    }

    /// Releases the reference back to the store.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for VariableReference {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.release(self.id);
        }
    }
}

impl fmt::Debug for VariableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableReference")
            .field("id", &self.id)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
