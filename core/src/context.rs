//! Hierarchical data bus.
//!
//! One `ExecuteContext` exists per active graph invocation. Contexts form a tree that mirrors
//! nested sub-graph calls: a child holds a strong link to its parent, a parent holds weak links
//! to its children (the strong owner of a child is the sub-graph vertex that created it).
//!
//! Lookup protocol for `get`: local reserved slots, then the parent (which searches upward and
//! then into its other children), then the own children downward only. Contexts already visited
//! during one search are excluded. `publish` writes the local reserved slot or delegates upward.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::data::{DataId, DataValue};
use crate::error::ContextError;
use crate::span::SpanRef;

#[derive(Clone, Default)]
pub struct ExecuteContext {
    inner: Arc<ContextInner>,
}

#[derive(Default)]
struct ContextInner {
    slots: RwLock<HashMap<DataId, Option<DataValue>>>,
    parent: RwLock<Option<ExecuteContext>>,
    children: RwLock<Vec<Option<Weak<ContextInner>>>>,
    span: RwLock<Option<SpanRef>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl ExecuteContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value into a local slot, reserving it if needed.
    ///
    /// This is how callers hand extern inputs to a graph. Shared mutable values go in as
    /// `Arc<Mutex<T>>` so every reader aliases the same object.
    pub fn insert<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.insert_arc(name, Arc::new(value));
    }

    pub fn insert_arc<T: Any + Send + Sync>(&self, name: impl Into<String>, value: Arc<T>) {
        let id = DataId::of::<T>(name);
        write(&self.inner.slots).insert(id, Some(value as DataValue));
    }

    /// Typed lookup following the bus protocol.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get_raw(&DataId::of::<T>(name))
            .and_then(|v| v.downcast::<T>().ok())
    }

    pub fn get_raw(&self, id: &DataId) -> Option<DataValue> {
        self.resolve(id).and_then(|owner| owner.local_value(id))
    }

    /// True when some reachable context has reserved `id`, filled or not.
    pub fn contains(&self, id: &DataId) -> bool {
        self.resolve(id).is_some()
    }

    /// Remove and return the value of `id` from the context that holds it, leaving the slot
    /// reserved but empty.
    pub fn take(&self, id: &DataId) -> Option<DataValue> {
        let owner = self.resolve(id)?;
        let mut slots = write(&owner.inner.slots);
        slots.get_mut(id).and_then(Option::take)
    }

    /// Write `value` into the nearest context (self or an ancestor) that reserved `id`.
    pub fn publish(&self, id: &DataId, value: Option<DataValue>) -> Result<(), ContextError> {
        let mut visited = HashSet::new();
        let mut current = Some(self.clone());
        while let Some(ctx) = current {
            if !visited.insert(ctx.ptr()) {
                break;
            }
            {
                let mut slots = write(&ctx.inner.slots);
                if let Some(slot) = slots.get_mut(id) {
                    *slot = value;
                    return Ok(());
                }
            }
            current = ctx.parent();
        }
        Err(ContextError::DataNotFound(id.to_string()))
    }

    /// Reserve (or clear) the local slot for `id`.
    pub fn fill_entry(&self, id: &DataId) {
        write(&self.inner.slots).insert(id.clone(), None);
    }

    pub fn reserve_children(&self, count: usize) {
        let mut children = write(&self.inner.children);
        children.clear();
        children.resize(count, None);
    }

    pub fn attach_child(&self, idx: usize, child: &ExecuteContext) {
        let mut children = write(&self.inner.children);
        if idx >= children.len() {
            children.resize(idx + 1, None);
        }
        children[idx] = Some(Arc::downgrade(&child.inner));
    }

    pub fn set_parent(&self, parent: &ExecuteContext) -> Result<(), ContextError> {
        let mut slot = write(&self.inner.parent);
        if slot.is_some() || Arc::ptr_eq(&self.inner, &parent.inner) {
            return Err(ContextError::ParentExists);
        }
        *slot = Some(parent.clone());
        Ok(())
    }

    pub fn parent(&self) -> Option<ExecuteContext> {
        read(&self.inner.parent).clone()
    }

    pub fn span(&self) -> Option<SpanRef> {
        read(&self.inner.span).clone()
    }

    pub fn set_span(&self, span: Option<SpanRef>) {
        *write(&self.inner.span) = span;
    }

    /// Clear slots and unlink from parent and children.
    pub fn reset(&self) {
        *write(&self.inner.parent) = None;
        write(&self.inner.children).clear();
        write(&self.inner.slots).clear();
        *write(&self.inner.span) = None;
    }

    pub fn ptr_eq(&self, other: &ExecuteContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Context holding the reserved slot for `id`, if any is reachable.
    pub(crate) fn resolve(&self, id: &DataId) -> Option<ExecuteContext> {
        let mut excludes = HashSet::new();
        self.find_owner(id, &mut excludes, true)
    }

    fn find_owner(
        &self,
        id: &DataId,
        excludes: &mut HashSet<usize>,
        with_parent: bool,
    ) -> Option<ExecuteContext> {
        if read(&self.inner.slots).contains_key(id) {
            return Some(self.clone());
        }
        excludes.insert(self.ptr());

        if with_parent {
            if let Some(parent) = self.parent() {
                if !excludes.contains(&parent.ptr()) {
                    if let Some(found) = parent.find_owner(id, excludes, true) {
                        return Some(found);
                    }
                }
            }
        }

        let children: Vec<ExecuteContext> = read(&self.inner.children)
            .iter()
            .flatten()
            .filter_map(Weak::upgrade)
            .map(|inner| ExecuteContext { inner })
            .collect();
        for child in children {
            if excludes.contains(&child.ptr()) {
                continue;
            }
            if let Some(found) = child.find_owner(id, excludes, false) {
                return Some(found);
            }
        }
        None
    }

    fn local_value(&self, id: &DataId) -> Option<DataValue> {
        read(&self.inner.slots).get(id).cloned().flatten()
    }

    fn ptr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl fmt::Debug for ExecuteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<String> = read(&self.inner.slots)
            .iter()
            .map(|(id, v)| format!("{id}{}", if v.is_some() { "" } else { "(empty)" }))
            .collect();
        f.debug_struct("ExecuteContext")
            .field("slots", &slots)
            .field("has_parent", &read(&self.inner.parent).is_some())
            .field("children", &read(&self.inner.children).len())
            .finish()
    }
}
