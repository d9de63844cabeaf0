//! Types, layouts and method resolution.
//!
//! Every builtin layout id maps to a [`LayoutInfo`] whose described type is
//! the class of the objects carrying that id. Program-defined types get a
//! fresh layout id when they are created and further ids as their instances
//! gain attributes.

use core_types::{ErrorKind, LayoutId, RawObject, VmError, VmResult};
use log::trace;
use memory_manager::{type_flags, Dict, Tuple, Type, ValueCell};

use crate::layout::LayoutInfo;
use crate::runtime::Runtime;

struct BuiltinType {
    name: &'static str,
    layout: LayoutId,
    base: Option<LayoutId>,
    aliases: &'static [LayoutId],
}

const fn builtin(
    name: &'static str,
    layout: LayoutId,
    base: Option<LayoutId>,
    aliases: &'static [LayoutId],
) -> BuiltinType {
    BuiltinType {
        name,
        layout,
        base,
        aliases,
    }
}

const OBJECT: Option<LayoutId> = Some(LayoutId::OBJECT);
const EXCEPTION: Option<LayoutId> = Some(LayoutId::EXCEPTION);

/// Bases precede their subclasses.
const BUILTIN_TYPES: &[BuiltinType] = &[
    builtin("object", LayoutId::OBJECT, None, &[]),
    builtin("type", LayoutId::TYPE, OBJECT, &[]),
    builtin("int", LayoutId::INT, OBJECT, &[LayoutId::SMALL_INT, LayoutId::LARGE_INT]),
    builtin("bool", LayoutId::BOOL, Some(LayoutId::INT), &[]),
    builtin("float", LayoutId::FLOAT, OBJECT, &[]),
    builtin("str", LayoutId::STR, OBJECT, &[LayoutId::SMALL_STR, LayoutId::LARGE_STR]),
    builtin("bytes", LayoutId::LARGE_BYTES, OBJECT, &[]),
    builtin("bytearray", LayoutId::MUTABLE_BYTES, OBJECT, &[]),
    builtin("tuple", LayoutId::TUPLE, OBJECT, &[]),
    builtin("dict", LayoutId::DICT, OBJECT, &[]),
    builtin("NoneType", LayoutId::NONE_TYPE, OBJECT, &[]),
    builtin("NotImplementedType", LayoutId::NOT_IMPLEMENTED_TYPE, OBJECT, &[]),
    builtin("function", LayoutId::FUNCTION, OBJECT, &[]),
    builtin("code", LayoutId::CODE, OBJECT, &[]),
    builtin("method", LayoutId::BOUND_METHOD, OBJECT, &[]),
    builtin("cell", LayoutId::VALUE_CELL, OBJECT, &[]),
    builtin("weaklink", LayoutId::WEAK_LINK, OBJECT, &[]),
    builtin("BaseException", LayoutId::BASE_EXCEPTION, OBJECT, &[]),
    builtin("Exception", LayoutId::EXCEPTION, Some(LayoutId::BASE_EXCEPTION), &[]),
    builtin("AttributeError", LayoutId::ATTRIBUTE_ERROR, EXCEPTION, &[]),
    builtin("EOFError", LayoutId::EOF_ERROR, EXCEPTION, &[]),
    builtin("ImportError", LayoutId::IMPORT_ERROR, EXCEPTION, &[]),
    builtin("IndexError", LayoutId::INDEX_ERROR, EXCEPTION, &[]),
    builtin("KeyError", LayoutId::KEY_ERROR, EXCEPTION, &[]),
    builtin("MemoryError", LayoutId::MEMORY_ERROR, EXCEPTION, &[]),
    builtin("NameError", LayoutId::NAME_ERROR, EXCEPTION, &[]),
    builtin("OverflowError", LayoutId::OVERFLOW_ERROR, EXCEPTION, &[]),
    builtin("RuntimeError", LayoutId::RUNTIME_ERROR, EXCEPTION, &[]),
    builtin("SystemError", LayoutId::SYSTEM_ERROR, EXCEPTION, &[]),
    builtin("TypeError", LayoutId::TYPE_ERROR, EXCEPTION, &[]),
    builtin("ValueError", LayoutId::VALUE_ERROR, EXCEPTION, &[]),
    builtin("ZeroDivisionError", LayoutId::ZERO_DIVISION_ERROR, EXCEPTION, &[]),
    builtin("RecursionError", LayoutId::RECURSION_ERROR, Some(LayoutId::RUNTIME_ERROR), &[]),
    builtin(
        "NotImplementedError",
        LayoutId::NOT_IMPLEMENTED_ERROR,
        Some(LayoutId::RUNTIME_ERROR),
        &[],
    ),
];

/// Whether instances with layout `id` are exception objects.
pub fn is_exception_layout(id: LayoutId) -> bool {
    matches!(
        id,
        LayoutId::BASE_EXCEPTION
            | LayoutId::EXCEPTION
            | LayoutId::ATTRIBUTE_ERROR
            | LayoutId::EOF_ERROR
            | LayoutId::IMPORT_ERROR
            | LayoutId::INDEX_ERROR
            | LayoutId::KEY_ERROR
            | LayoutId::MEMORY_ERROR
            | LayoutId::NAME_ERROR
            | LayoutId::NOT_IMPLEMENTED_ERROR
            | LayoutId::OVERFLOW_ERROR
            | LayoutId::RECURSION_ERROR
            | LayoutId::RUNTIME_ERROR
            | LayoutId::SYSTEM_ERROR
            | LayoutId::TYPE_ERROR
            | LayoutId::VALUE_ERROR
            | LayoutId::ZERO_DIVISION_ERROR
    )
}

const FUNCTION_FIELDS: &[&str] = &[
    "__code__",
    "__globals__",
    "__name__",
    "__qualname__",
    "__defaults__",
    "__kwdefaults__",
];
const BOUND_METHOD_FIELDS: &[&str] = &["__func__", "__self__"];
const EXCEPTION_FIELDS: &[&str] = &["args", "__cause__", "__context__"];

/// C3 linearisation of `head` followed by the merge of `sequences`.
fn c3_merge(head: RawObject, mut sequences: Vec<Vec<RawObject>>) -> Option<Vec<RawObject>> {
    let mut result = vec![head];
    loop {
        sequences.retain(|sequence| !sequence.is_empty());
        if sequences.is_empty() {
            return Some(result);
        }
        let candidate = sequences.iter().map(|sequence| sequence[0]).find(|candidate| {
            !sequences
                .iter()
                .any(|sequence| sequence[1..].contains(candidate))
        })?;
        result.push(candidate);
        for sequence in sequences.iter_mut() {
            if sequence[0] == candidate {
                sequence.remove(0);
            }
        }
    }
}

impl Runtime {
    pub(crate) fn initialize_types(&mut self) -> VmResult<()> {
        let last = LayoutId::LAST_BUILTIN.raw() as usize;
        self.layouts = vec![None; last + 1];
        for entry in BUILTIN_TYPES {
            let name = self.intern(entry.name)?;
            let base = match entry.base {
                Some(id) => Some(self.type_at(id)?),
                None => None,
            };
            let ty = self.create_type_object(name, base, entry.layout, type_flags::SEALED | type_flags::BUILTIN)?;
            for id in std::iter::once(entry.layout).chain(entry.aliases.iter().copied()) {
                // Registered first so the type stays rooted while names are interned
                let ty = self.type_at(entry.layout).unwrap_or(ty);
                let (info, fields) = if is_exception_layout(id) {
                    (LayoutInfo::instance(id, ty, EXCEPTION_FIELDS.len(), 0), EXCEPTION_FIELDS)
                } else {
                    let fields = match id {
                        LayoutId::FUNCTION => FUNCTION_FIELDS,
                        LayoutId::BOUND_METHOD => BOUND_METHOD_FIELDS,
                        _ => &[],
                    };
                    (LayoutInfo::sealed(id, ty), fields)
                };
                self.layouts[id.raw() as usize] = Some(info);
                self.add_builtin_fields(id, fields)?;
            }
        }
        Ok(())
    }

    fn add_builtin_fields(&mut self, id: LayoutId, names: &[&str]) -> VmResult<()> {
        for (index, name) in names.iter().enumerate() {
            let name = self.intern(name)?;
            if let Some(info) = self.layout_mut(id) {
                info.in_object.push((name, index));
            }
        }
        Ok(())
    }

    /// Allocate a type whose MRO is itself followed by the MRO of `base`.
    fn create_type_object(
        &mut self,
        name: RawObject,
        base: Option<RawObject>,
        layout: LayoutId,
        flags: i64,
    ) -> VmResult<RawObject> {
        self.with_handles(|rt| {
            let name = rt.new_handle(name);
            let bases = match base {
                Some(base) => rt.new_tuple_from(&[base])?,
                None => rt.new_tuple(0)?,
            };
            let bases = rt.new_handle(bases);
            let dict = rt.new_dict()?;
            let dict = rt.new_handle(dict);
            let mut live = [rt.handle(name), rt.handle(bases), rt.handle(dict)];
            let ty = rt.allocate_with(&mut live, |heap, live| {
                heap.create_type(live[0], live[1], RawObject::none(), live[2], layout, flags)
            })?;
            let ty = rt.new_handle(ty);
            let mut mro = vec![rt.handle(ty)];
            if let Some(base) = Tuple::from_raw(rt.handle(bases)).to_vec(&rt.heap).first() {
                mro.extend(rt.type_mro(*base));
            }
            let mro = rt.new_tuple_from(&mro)?;
            Type::from_raw(rt.handle(ty)).set_mro(&mut rt.heap, mro);
            Ok(rt.handle(ty))
        })
    }

    /// Layout information of `id`.
    pub fn layout(&self, id: LayoutId) -> Option<&LayoutInfo> {
        self.layouts.get(id.raw() as usize).and_then(Option::as_ref)
    }

    pub(crate) fn layout_mut(&mut self, id: LayoutId) -> Option<&mut LayoutInfo> {
        self.layouts.get_mut(id.raw() as usize).and_then(Option::as_mut)
    }

    /// The type described by layout `id`.
    pub fn type_at(&self, id: LayoutId) -> VmResult<RawObject> {
        self.layout(id)
            .map(|info| info.described_type)
            .ok_or_else(|| VmError::fatal(format!("layout {} is not registered", id.raw())))
    }

    /// The class of `object`.
    pub fn type_of(&self, object: RawObject) -> RawObject {
        let id = self.heap.layout_id_of(object);
        self.layout(id)
            .map(|info| info.described_type)
            .unwrap_or_else(|| self.layout(LayoutId::OBJECT).map_or(RawObject::none(), |info| info.described_type))
    }

    /// Whether `object` is a type.
    pub fn is_type(&self, object: RawObject) -> bool {
        Type::cast(&self.heap, object).is_some()
    }

    /// Name of a type.
    pub fn type_name(&self, ty: RawObject) -> String {
        self.str_value(Type::from_raw(ty).name(&self.heap)).unwrap_or_default()
    }

    /// Name of the class of `object`.
    pub fn type_name_of(&self, object: RawObject) -> String {
        self.type_name(self.type_of(object))
    }

    /// Method resolution order of `ty`, starting with `ty`.
    pub fn type_mro(&self, ty: RawObject) -> Vec<RawObject> {
        let mro = Type::from_raw(ty).mro(&self.heap);
        Tuple::cast(&self.heap, mro).map_or_else(|| vec![ty], |mro| mro.to_vec(&self.heap))
    }

    /// Every registered type that is `base` or derives from it.
    pub fn subtypes(&self, base: RawObject) -> Vec<RawObject> {
        let mut found: Vec<RawObject> = Vec::new();
        for info in self.layouts.iter().flatten() {
            let ty = info.described_type;
            if self.is_type(ty) && !found.contains(&ty) && self.is_subtype(ty, base) {
                found.push(ty);
            }
        }
        found
    }

    /// Whether `ty` is `base` or derives from it.
    pub fn is_subtype(&self, ty: RawObject, base: RawObject) -> bool {
        ty == base || self.type_mro(ty).contains(&base)
    }

    /// Whether `object` is an instance of `ty` or of a subclass.
    pub fn is_instance(&self, object: RawObject, ty: RawObject) -> bool {
        self.is_subtype(self.type_of(object), ty)
    }

    /// Whether `ty` was created by the runtime.
    pub fn is_builtin_type(&self, ty: RawObject) -> bool {
        Type::from_raw(ty).flags(&self.heap) & type_flags::BUILTIN != 0
    }

    /// Cell holding `name` in the own dict of `ty`, placeholder or not.
    pub fn type_own_cell(&mut self, ty: RawObject, name: RawObject) -> VmResult<Option<RawObject>> {
        let dict = Type::from_raw(ty).dict(&self.heap);
        self.dict_at(dict, name)
    }

    /// Resolve `name` along the MRO of `ty`. Placeholders do not define
    /// anything and are skipped.
    pub fn type_lookup(&mut self, ty: RawObject, name: RawObject) -> VmResult<Option<RawObject>> {
        for candidate in self.type_mro(ty) {
            if let Some(cell) = self.type_own_cell(candidate, name)? {
                let cell = ValueCell::from_raw(cell);
                if !cell.is_placeholder(&self.heap) {
                    return Ok(Some(cell.value(&self.heap)));
                }
            }
        }
        Ok(None)
    }

    /// Resolve `name` given as text along the MRO of `ty`.
    pub fn type_lookup_str(&mut self, ty: RawObject, name: &str) -> VmResult<Option<RawObject>> {
        let name = self.intern(name)?;
        self.type_lookup(ty, name)
    }

    /// Store `value` as `name` in the own dict of `ty`, reusing an existing
    /// cell so dependency lists survive. Returns the cell.
    pub fn type_at_put(&mut self, ty: RawObject, name: RawObject, value: RawObject) -> VmResult<RawObject> {
        if let Some(cell) = self.type_own_cell(ty, name)? {
            ValueCell::from_raw(cell).set_value(&mut self.heap, value);
            return Ok(cell);
        }
        self.with_handles(|rt| {
            let ty = rt.new_handle(ty);
            let name = rt.new_handle(name);
            let cell = rt.new_value_cell(value)?;
            let cell = rt.new_handle(cell);
            let dict = Type::from_raw(rt.handle(ty)).dict(&rt.heap);
            rt.dict_at_put(dict, rt.handle(name), rt.handle(cell))?;
            Ok(rt.handle(cell))
        })
    }

    /// Store a builtin attribute given as text. Used while populating
    /// builtin types, which are otherwise immutable.
    pub(crate) fn type_at_put_str(&mut self, ty: RawObject, name: &str, value: RawObject) -> VmResult<()> {
        let mut live = [ty, value];
        let key = self.allocate_with(&mut live, |heap, _| heap.create_str(name))?;
        let key = self.intern_object(key);
        self.type_at_put(live[0], key, live[1])?;
        Ok(())
    }

    /// Create a program-defined type.
    ///
    /// `bases` is a tuple of types, empty meaning `(object,)`; `namespace`
    /// is a dict of plain attribute values, which end up in value cells.
    ///
    /// # Example
    ///
    /// ```
    /// use interpreter::{Runtime, RuntimeConfig};
    ///
    /// let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    /// let bases = rt.new_tuple(0).unwrap();
    /// let namespace = rt.new_dict().unwrap();
    /// let name = rt.new_str("Point").unwrap();
    /// let point = rt.new_type(name, bases, namespace).unwrap();
    /// assert_eq!(rt.type_name(point), "Point");
    /// assert_eq!(rt.type_mro(point).len(), 2);
    /// ```
    pub fn new_type(&mut self, name: RawObject, bases: RawObject, namespace: RawObject) -> VmResult<RawObject> {
        let type_name = self
            .str_value(name)
            .ok_or_else(|| VmError::type_error("type name must be a str"))?;
        let mut base_types = self
            .tuple_items(bases)
            .ok_or_else(|| VmError::type_error("bases must be a tuple"))?;
        if base_types.is_empty() {
            base_types.push(self.type_at(LayoutId::OBJECT)?);
        }
        let mut builtin_fields = 0;
        for base in &base_types {
            if !self.is_type(*base) {
                return Err(VmError::type_error(format!(
                    "bases must be types, not '{}'",
                    self.type_name_of(*base)
                )));
            }
            let layout = Type::from_raw(*base).instance_layout(&self.heap);
            let subclassable = layout == LayoutId::OBJECT
                || is_exception_layout(layout)
                || !self.is_builtin_type(*base);
            if !subclassable {
                return Err(VmError::new(
                    ErrorKind::NotImplementedError,
                    format!("subclassing '{}' is not supported", self.type_name(*base)),
                ));
            }
            builtin_fields = builtin_fields.max(self.layout(layout).map_or(0, |info| info.builtin_fields));
        }

        let id = LayoutId::from_raw(self.layouts.len() as u32);
        if id.raw() > LayoutId::MAX.raw() {
            return Err(VmError::new(ErrorKind::SystemError, "out of layout ids"));
        }

        self.with_handles(|rt| {
            let namespace = rt.new_handle(namespace);
            let name = rt.intern(&type_name)?;
            let name = rt.new_handle(name);
            let bases = rt.new_tuple_from(&base_types)?;
            let bases = rt.new_handle(bases);
            let dict = rt.new_dict()?;
            let dict = rt.new_handle(dict);
            let mut live = [rt.handle(name), rt.handle(bases), rt.handle(dict)];
            let ty = rt.allocate_with(&mut live, |heap, live| {
                heap.create_type(live[0], live[1], RawObject::none(), live[2], id, 0)
            })?;
            let ty = rt.new_handle(ty);

            // Bases may have moved while allocating
            let base_types = Tuple::from_raw(rt.handle(bases)).to_vec(&rt.heap);
            let mut sequences: Vec<Vec<RawObject>> =
                base_types.iter().map(|base| rt.type_mro(*base)).collect();
            sequences.push(base_types);
            let mro = c3_merge(rt.handle(ty), sequences).ok_or_else(|| {
                VmError::type_error("Cannot create a consistent method resolution order (MRO)")
            })?;
            let mro = rt.new_tuple_from(&mro)?;
            Type::from_raw(rt.handle(ty)).set_mro(&mut rt.heap, mro);

            let capacity = rt.config.instance_capacity;
            rt.layouts
                .push(Some(LayoutInfo::instance(id, rt.handle(ty), builtin_fields, capacity)));
            if builtin_fields > 0 {
                rt.add_builtin_fields(id, EXCEPTION_FIELDS)?;
            }

            let items = Dict::from_raw(rt.handle(namespace)).items(&rt.heap);
            let items: Vec<_> = items
                .into_iter()
                .map(|(key, value)| (rt.new_handle(key), rt.new_handle(value)))
                .collect();
            for (key, value) in items {
                let key = rt.intern_object(rt.handle(key));
                rt.type_at_put(rt.handle(ty), key, rt.handle(value))?;
            }
            trace!("created type {} with layout {}", type_name, id.raw());
            Ok(rt.handle(ty))
        })
    }

    /// The layout an instance moves to when it gains attribute `name`.
    pub(crate) fn layout_add_attribute(&mut self, from: LayoutId, name: RawObject) -> VmResult<LayoutId> {
        let info = self
            .layout(from)
            .ok_or_else(|| VmError::fatal(format!("layout {} is not registered", from.raw())))?;
        if let Some(id) = info.transition(&self.heap, name) {
            return Ok(id);
        }
        let id = LayoutId::from_raw(self.layouts.len() as u32);
        let child = info.with_attribute(id, name);
        self.layouts.push(Some(child));
        if let Some(parent) = self.layout_mut(from) {
            parent.transitions.push((name, id));
        }
        trace!("layout {} gained an attribute as layout {}", from.raw(), id.raw());
        Ok(id)
    }
}
