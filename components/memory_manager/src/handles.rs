//! Scoped GC roots.
//!
//! A [`Handle`] names a slot in the handle table. The collector rewrites the
//! slots, so a handle stays valid across allocations while a raw reference
//! does not. Handles are released in bulk by closing the scope they were
//! created in.

use core_types::RawObject;

/// Index of a root slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(usize);

/// Marker returned by [`Handles::handle_scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a scope that is never closed leaks its handles"]
pub struct HandleScope(usize);

/// Stack of root slots.
#[derive(Debug, Default)]
pub struct Handles {
    slots: Vec<RawObject>,
}

impl Handles {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope; handles created until it is closed belong to it.
    pub fn handle_scope(&self) -> HandleScope {
        HandleScope(self.slots.len())
    }

    /// Root `object` in a new slot.
    pub fn new_handle(&mut self, object: RawObject) -> Handle {
        self.slots.push(object);
        Handle(self.slots.len() - 1)
    }

    /// Current value of `handle`.
    pub fn handle(&self, handle: Handle) -> RawObject {
        self.slots.get(handle.0).copied().unwrap_or_default()
    }

    /// Point `handle` at another object.
    pub fn set_handle(&mut self, handle: Handle, object: RawObject) {
        if let Some(slot) = self.slots.get_mut(handle.0) {
            *slot = object;
        }
    }

    /// Release every handle created since `scope` was opened.
    pub fn close_scope(&mut self, scope: HandleScope) {
        self.slots.truncate(scope.0);
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no handles are live.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Apply `visitor` to every slot.
    pub fn visit(&mut self, visitor: &mut dyn FnMut(&mut RawObject)) {
        self.slots.iter_mut().for_each(|slot| visitor(slot));
    }
}
