//! Attribute resolution.
//!
//! Instance attributes live in the slots described by the instance's layout.
//! Type attributes live in value cells of the type dict and are found along
//! the MRO; functions found there bind to the receiver. Instance attributes
//! shadow type attributes, and since the layout alone tells which instance
//! attributes exist, a resolution is a pure function of the receiver's
//! layout and the type dicts. That is what the attribute caches memoize.

use core_types::{ErrorKind, LayoutId, RawObject, VmError, VmResult};
use log::trace;
use memory_manager::{BoundMethod, Function, Tuple, Type, ValueCell};

use crate::ic;
use crate::layout::AttributeLocation;
use crate::runtime::Runtime;

/// Result of a LOAD_METHOD resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// A function found on the type; call it with the receiver prepended
    Unbound(RawObject),
    /// Any other attribute value, called as is
    Value(RawObject),
}

fn attribute_error(rt: &Runtime, object: RawObject, name: RawObject) -> VmError {
    let name = rt.str_value(name).unwrap_or_default();
    if rt.is_type(object) {
        VmError::new(
            ErrorKind::AttributeError,
            format!("type object '{}' has no attribute '{}'", rt.type_name(object), name),
        )
    } else {
        VmError::new(
            ErrorKind::AttributeError,
            format!("'{}' object has no attribute '{}'", rt.type_name_of(object), name),
        )
    }
}

impl Runtime {
    fn attribute_location(&self, object: RawObject, name: RawObject) -> Option<(LayoutId, AttributeLocation)> {
        if !object.is_heap_object() {
            return None;
        }
        let layout_id = self.heap.layout_id_of(object);
        let location = self.layout(layout_id)?.find(&self.heap, name)?;
        Some((layout_id, location))
    }

    /// Value at `location` of `object`; Unbound when the slot was deleted.
    pub fn read_location(&self, object: RawObject, location: AttributeLocation) -> RawObject {
        match location {
            AttributeLocation::InObject(index) => self.heap.field(object, index),
            AttributeLocation::Overflow(index) => {
                let overflow_field = self
                    .layout(self.heap.layout_id_of(object))
                    .map_or(0, |info| info.overflow_field());
                let overflow = self.heap.field(object, overflow_field);
                match Tuple::cast(&self.heap, overflow) {
                    Some(tuple) if index < tuple.length(&self.heap) => tuple.at(&self.heap, index),
                    _ => RawObject::unbound(),
                }
            }
        }
    }

    /// Store into an existing slot of `object`.
    pub fn write_location(&mut self, object: RawObject, location: AttributeLocation, value: RawObject) {
        match location {
            AttributeLocation::InObject(index) => self.heap.set_field(object, index, value),
            AttributeLocation::Overflow(index) => {
                let overflow_field = self
                    .layout(self.heap.layout_id_of(object))
                    .map_or(0, |info| info.overflow_field());
                let overflow = self.heap.field(object, overflow_field);
                if let Some(tuple) = Tuple::cast(&self.heap, overflow) {
                    if index < tuple.length(&self.heap) {
                        tuple.at_put(&mut self.heap, index, value);
                    }
                }
            }
        }
    }

    /// Attributes of a type object itself, outside its dict.
    fn type_special_attribute(&mut self, ty: RawObject, name: RawObject) -> VmResult<Option<RawObject>> {
        let view = Type::from_raw(ty);
        if self.str_equals_static(name, "__name__") {
            return Ok(Some(view.name(&self.heap)));
        }
        if self.str_equals_static(name, "__mro__") {
            return Ok(Some(view.mro(&self.heap)));
        }
        if self.str_equals_static(name, "__bases__") {
            return Ok(Some(view.bases(&self.heap)));
        }
        Ok(None)
    }

    /// `object.name`.
    pub fn get_attribute(&mut self, object: RawObject, name: RawObject) -> VmResult<RawObject> {
        match self.lookup_method(object, name)? {
            Method::Value(value) => Ok(value),
            Method::Unbound(function) => self.new_bound_method(function, object),
        }
    }

    /// `object.name` given as text.
    pub fn get_attribute_str(&mut self, object: RawObject, name: &str) -> VmResult<RawObject> {
        let mut live = [object];
        let name = self.allocate_with(&mut live, |heap, _| heap.create_str(name))?;
        let name = self.intern_object(name);
        self.get_attribute(live[0], name)
    }

    /// Resolve `object.name` without binding: functions found on the type of
    /// a non-type receiver come back unbound. Never allocates.
    pub fn lookup_method(&mut self, object: RawObject, name: RawObject) -> VmResult<Method> {
        if self.is_type(object) {
            if let Some(value) = self.type_lookup(object, name)? {
                return Ok(Method::Value(value));
            }
            if let Some(value) = self.type_special_attribute(object, name)? {
                return Ok(Method::Value(value));
            }
            return Err(attribute_error(self, object, name));
        }
        if let Some((_, location)) = self.attribute_location(object, name) {
            let value = self.read_location(object, location);
            if !value.is_unbound() {
                return Ok(Method::Value(value));
            }
        }
        let ty = self.type_of(object);
        match self.type_lookup(ty, name)? {
            Some(value) if self.is_function(value) => Ok(Method::Unbound(value)),
            Some(value) => Ok(Method::Value(value)),
            None => Err(attribute_error(self, object, name)),
        }
    }

    /// The inline cache value for reading `name` from `object`: the slot
    /// location of an instance attribute, or a function found on the type.
    /// None when the resolution cannot be cached. Never allocates.
    pub fn attribute_cache_value(&mut self, object: RawObject, name: RawObject) -> VmResult<Option<RawObject>> {
        if self.is_type(object) {
            return Ok(None);
        }
        if let Some((_, location)) = self.attribute_location(object, name) {
            let present = !self.read_location(object, location).is_unbound();
            return Ok(present.then(|| location.to_cache_value()));
        }
        let ty = self.type_of(object);
        Ok(self.type_lookup(ty, name)?.filter(|value| self.is_function(*value)))
    }

    /// `object.name = value`. Returns the slot written when the store could
    /// be repeated through a cache: an existing instance slot whose layout
    /// did not change.
    pub fn set_attribute(
        &mut self,
        object: RawObject,
        name: RawObject,
        value: RawObject,
    ) -> VmResult<Option<AttributeLocation>> {
        if self.is_type(object) {
            self.set_type_attribute(object, name, value)?;
            return Ok(None);
        }
        if let Some((_, location)) = self.attribute_location(object, name) {
            self.write_location(object, location, value);
            return Ok(Some(location));
        }
        let layout_id = self.heap.layout_id_of(object);
        let allows_attributes = object.is_heap_object() && self.layout(layout_id).is_some_and(|info| info.allows_attributes);
        if !allows_attributes {
            return Err(attribute_error(self, object, name));
        }
        self.add_instance_attribute(object, name, value)?;
        Ok(None)
    }

    /// `object.name = value` given as text.
    pub fn set_attribute_str(&mut self, object: RawObject, name: &str, value: RawObject) -> VmResult<()> {
        let mut live = [object, value];
        let key = self.allocate_with(&mut live, |heap, _| heap.create_str(name))?;
        let key = self.intern_object(key);
        self.set_attribute(live[0], key, live[1])?;
        Ok(())
    }

    fn add_instance_attribute(&mut self, object: RawObject, name: RawObject, value: RawObject) -> VmResult<()> {
        let name = self.intern_object(name);
        let from = self.heap.layout_id_of(object);
        let to = self.layout_add_attribute(from, name)?;
        let location = self
            .layout(to)
            .and_then(|info| info.find(&self.heap, name))
            .ok_or_else(|| VmError::fatal("attribute missing from its transition layout"))?;
        let overflow_field = self.layout(to).map_or(0, |info| info.overflow_field());
        let (object, value) = match location {
            AttributeLocation::Overflow(index) => {
                let old = self.heap.field(object, overflow_field);
                let mut items = Tuple::cast(&self.heap, old).map_or_else(Vec::new, |tuple| tuple.to_vec(&self.heap));
                items.resize(index + 1, RawObject::unbound());
                let count = items.len();
                items.extend([object, value]);
                let grown = self.allocate_with(&mut items, |heap, items| heap.create_tuple_from(&items[..count]))?;
                self.heap.set_field(items[count], overflow_field, grown);
                (items[count], items[count + 1])
            }
            AttributeLocation::InObject(_) => (object, value),
        };
        if let Some(header) = self.heap.header(object) {
            self.heap.set_header(object, header.with_layout_id(to));
        }
        self.write_location(object, location, value);
        Ok(())
    }

    fn set_type_attribute(&mut self, ty: RawObject, name: RawObject, value: RawObject) -> VmResult<()> {
        if Type::from_raw(ty).is_sealed(&self.heap) {
            return Err(VmError::type_error(format!(
                "cannot set '{}' attribute of immutable type '{}'",
                self.str_value(name).unwrap_or_default(),
                self.type_name(ty)
            )));
        }
        let name = self.intern_object(name);
        self.with_handles(|rt| {
            let ty = rt.new_handle(ty);
            let name = rt.new_handle(name);
            rt.type_at_put(rt.handle(ty), rt.handle(name), value)?;
            let (ty, name) = (rt.handle(ty), rt.handle(name));
            trace!("stored attribute on type {}", rt.type_name(ty));
            ic::ic_invalidate_caches_for_type_attr(rt, ty, name, false)
        })
    }

    /// `del object.name`.
    pub fn delete_attribute(&mut self, object: RawObject, name: RawObject) -> VmResult<()> {
        if self.is_type(object) {
            if Type::from_raw(object).is_sealed(&self.heap) {
                return Err(VmError::type_error(format!(
                    "cannot delete '{}' attribute of immutable type '{}'",
                    self.str_value(name).unwrap_or_default(),
                    self.type_name(object)
                )));
            }
            let cell = self
                .type_own_cell(object, name)?
                .filter(|cell| !ValueCell::from_raw(*cell).is_placeholder(&self.heap))
                .ok_or_else(|| attribute_error(self, object, name))?;
            // The cell stays as a placeholder so its dependents are kept
            ValueCell::from_raw(cell).make_placeholder(&mut self.heap);
            return ic::ic_invalidate_caches_for_type_attr(self, object, name, false);
        }
        match self.attribute_location(object, name) {
            Some((_, location)) if !self.read_location(object, location).is_unbound() => {
                self.write_location(object, location, RawObject::unbound());
                Ok(())
            }
            _ => Err(attribute_error(self, object, name)),
        }
    }

    /// Whether `object` has attribute `name`.
    pub fn has_attribute(&mut self, object: RawObject, name: RawObject) -> VmResult<bool> {
        match self.lookup_method(object, name) {
            Ok(_) => Ok(true),
            Err(error) if error.kind == ErrorKind::AttributeError => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Function a bound method or plain function stands for, with the
    /// receiver a bound method carries.
    pub fn unwrap_callable(&self, callable: RawObject) -> Option<(RawObject, Option<RawObject>)> {
        if let Some(method) = BoundMethod::cast(&self.heap, callable) {
            return Some((method.function(&self.heap), Some(method.receiver(&self.heap))));
        }
        Function::cast(&self.heap, callable).map(|_| (callable, None))
    }
}
