//! Instance layouts.
//!
//! A layout describes where the attributes of an instance live. Instances of
//! program-defined types start with the layout of their type and move to a
//! child layout whenever they gain an attribute; children are shared through
//! the parent's transition table, so instances that gained the same
//! attributes in the same order share a layout id. That id is the key of the
//! attribute inline caches.
//!
//! Instance fields are arranged as
//! `[builtin fields][overflow tuple or None][in-object slots]`.

use core_types::{LayoutId, RawObject};
use memory_manager::Heap;

/// Where an instance attribute is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeLocation {
    /// Field index within the instance
    InObject(usize),
    /// Index within the overflow tuple
    Overflow(usize),
}

impl AttributeLocation {
    /// Encode as an inline cache value: in-object offsets are non-negative,
    /// overflow indices are stored as `-index - 1`.
    pub fn to_cache_value(self) -> RawObject {
        match self {
            AttributeLocation::InObject(index) => RawObject::small_int(index as i64),
            AttributeLocation::Overflow(index) => RawObject::small_int(-(index as i64) - 1),
        }
    }

    /// Decode an inline cache value written by [`to_cache_value`](Self::to_cache_value).
    pub fn from_cache_value(value: RawObject) -> Option<Self> {
        let encoded = value.as_small_int()?;
        Some(if encoded >= 0 {
            AttributeLocation::InObject(encoded as usize)
        } else {
            AttributeLocation::Overflow((-encoded - 1) as usize)
        })
    }
}

/// Shape of the objects carrying one layout id.
#[derive(Debug, Clone)]
pub struct LayoutInfo {
    /// This layout's id
    pub id: LayoutId,
    /// The type whose instances have this layout
    pub described_type: RawObject,
    /// Fields that precede the overflow slot
    pub builtin_fields: usize,
    /// Attributes stored in the instance, with their field index
    pub in_object: Vec<(RawObject, usize)>,
    /// Attributes stored in the overflow tuple, in tuple order
    pub overflow: Vec<RawObject>,
    /// In-object attribute slots
    pub capacity: usize,
    /// Child layouts reached by adding an attribute
    pub transitions: Vec<(RawObject, LayoutId)>,
    /// Whether programs may add attributes to these objects
    pub allows_attributes: bool,
}

impl LayoutInfo {
    /// Layout of an object without attribute storage.
    pub fn sealed(id: LayoutId, described_type: RawObject) -> Self {
        LayoutInfo {
            id,
            described_type,
            builtin_fields: 0,
            in_object: Vec::new(),
            overflow: Vec::new(),
            capacity: 0,
            transitions: Vec::new(),
            allows_attributes: false,
        }
    }

    /// Root layout of an attribute-carrying type.
    pub fn instance(id: LayoutId, described_type: RawObject, builtin_fields: usize, capacity: usize) -> Self {
        LayoutInfo {
            id,
            described_type,
            builtin_fields,
            in_object: Vec::new(),
            overflow: Vec::new(),
            capacity,
            transitions: Vec::new(),
            allows_attributes: true,
        }
    }

    /// Field count of an instance.
    pub fn num_fields(&self) -> usize {
        if self.allows_attributes {
            self.builtin_fields + 1 + self.capacity
        } else {
            self.builtin_fields
        }
    }

    /// Field holding the overflow tuple.
    pub fn overflow_field(&self) -> usize {
        self.builtin_fields
    }

    /// Location of attribute `name`.
    pub fn find(&self, heap: &Heap, name: RawObject) -> Option<AttributeLocation> {
        if let Some((_, index)) = self
            .in_object
            .iter()
            .find(|(candidate, _)| heap.str_equals(*candidate, name))
        {
            return Some(AttributeLocation::InObject(*index));
        }
        self.overflow
            .iter()
            .position(|candidate| heap.str_equals(*candidate, name))
            .map(AttributeLocation::Overflow)
    }

    /// Child layout for adding `name`, if one was made before.
    pub fn transition(&self, heap: &Heap, name: RawObject) -> Option<LayoutId> {
        self.transitions
            .iter()
            .find(|(candidate, _)| heap.str_equals(*candidate, name))
            .map(|(_, id)| *id)
    }

    /// The layout this one becomes after adding `name`, under `id`.
    pub fn with_attribute(&self, id: LayoutId, name: RawObject) -> LayoutInfo {
        let mut child = LayoutInfo {
            id,
            transitions: Vec::new(),
            ..self.clone()
        };
        let used = self
            .in_object
            .iter()
            .filter(|(_, index)| *index > self.overflow_field())
            .count();
        if used < self.capacity {
            child
                .in_object
                .push((name, self.overflow_field() + 1 + used));
        } else {
            child.overflow.push(name);
        }
        child
    }

    /// Apply `visitor` to every object this layout refers to.
    pub fn visit(&mut self, visitor: &mut dyn FnMut(&mut RawObject)) {
        visitor(&mut self.described_type);
        for (name, _) in self.in_object.iter_mut() {
            visitor(name);
        }
        self.overflow.iter_mut().for_each(|name| visitor(name));
        for (name, _) in self.transitions.iter_mut() {
            visitor(name);
        }
    }
}
