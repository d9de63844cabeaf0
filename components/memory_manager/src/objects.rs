//! Concrete heap object layouts.
//!
//! Each view wraps a [`RawObject`] known to have a particular layout and
//! exposes its fields by name. Views are checked on construction through
//! `cast`, which inspects the header; `from_raw` skips the check for callers
//! that have already classified the object. A view is only valid until the
//! next collection, like the reference it wraps.

use core_types::{LayoutId, ObjectFormat, RawObject, VmResult};

use crate::heap::Heap;

macro_rules! heap_view {
    ($(#[$doc:meta])* $name:ident, $layout:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(RawObject);

        impl $name {
            /// View `object` if it is a heap object with this layout.
            pub fn cast(heap: &Heap, object: RawObject) -> Option<Self> {
                (object.is_heap_object() && heap.layout_id_of(object) == LayoutId::$layout)
                    .then_some($name(object))
            }

            /// View `object` without checking its layout.
            pub fn from_raw(object: RawObject) -> Self {
                $name(object)
            }

            /// The viewed reference.
            pub fn raw(self) -> RawObject {
                self.0
            }
        }
    };
}

macro_rules! object_field {
    ($(#[$doc:meta])* $getter:ident, $setter:ident, $index:expr) => {
        $(#[$doc])*
        pub fn $getter(self, heap: &Heap) -> RawObject {
            heap.field(self.0, $index)
        }

        #[allow(missing_docs)]
        pub fn $setter(self, heap: &mut Heap, value: RawObject) {
            heap.set_field(self.0, $index, value)
        }
    };
}

fn small_int_field(heap: &Heap, object: RawObject, index: usize) -> i64 {
    heap.field(object, index).as_small_int().unwrap_or(0)
}

heap_view!(
    /// Fixed-length sequence of objects.
    Tuple,
    TUPLE
);

impl Tuple {
    /// Number of elements.
    pub fn length(self, heap: &Heap) -> usize {
        heap.count(self.0)
    }

    /// Element `index`.
    pub fn at(self, heap: &Heap, index: usize) -> RawObject {
        heap.field(self.0, index)
    }

    /// Store element `index`. Only builders of a fresh tuple may do this.
    pub fn at_put(self, heap: &mut Heap, index: usize, value: RawObject) {
        heap.set_field(self.0, index, value)
    }

    /// Copy of the elements.
    pub fn to_vec(self, heap: &Heap) -> Vec<RawObject> {
        (0..self.length(heap)).map(|index| self.at(heap, index)).collect()
    }
}

heap_view!(
    /// Mutable byte buffer.
    MutableBytes,
    MUTABLE_BYTES
);

impl MutableBytes {
    /// Number of bytes.
    pub fn length(self, heap: &Heap) -> usize {
        heap.count(self.0)
    }

    /// Byte `index`.
    pub fn byte_at(self, heap: &Heap, index: usize) -> u8 {
        heap.byte_at(self.0, index)
    }

    /// Store byte `index`.
    pub fn byte_at_put(self, heap: &mut Heap, index: usize, value: u8) {
        heap.set_byte_at(self.0, index, value)
    }

    /// Copy of the contents.
    pub fn bytes(self, heap: &Heap) -> Vec<u8> {
        heap.bytes_of(self.0)
    }
}

heap_view!(
    /// Arbitrary precision integer stored as two's complement digits.
    LargeInt,
    LARGE_INT
);

impl LargeInt {
    /// Digits, least significant first.
    pub fn digits(self, heap: &Heap) -> Vec<u64> {
        (0..heap.count(self.0))
            .map(|index| heap.word_at(self.0, index))
            .collect()
    }
}

heap_view!(
    /// Boxed double.
    Float,
    FLOAT
);

impl Float {
    /// The value.
    pub fn value(self, heap: &Heap) -> f64 {
        f64::from_bits(heap.word_at(self.0, 0))
    }
}

/// Code flag bits.
pub mod code_flags {
    /// Locals are addressed by index
    pub const OPTIMIZED: i64 = 0x0001;
    /// A new locals namespace is created on call
    pub const NEWLOCALS: i64 = 0x0002;
    /// Extra positional arguments are collected into a tuple
    pub const VARARGS: i64 = 0x0004;
    /// Extra keyword arguments are collected into a dict
    pub const VARKEYWORDS: i64 = 0x0008;
    /// No free or cell variables
    pub const NOFREE: i64 = 0x0040;
    /// The code field holds a builtin function index instead of bytecode
    pub const BUILTIN: i64 = 1 << 29;
}

/// Field values of a new code object.
#[derive(Debug, Clone, Copy)]
pub struct CodeFields {
    /// Positional parameters, including positional-only ones
    pub argcount: i64,
    /// Positional-only parameters
    pub posonlyargcount: i64,
    /// Keyword-only parameters
    pub kwonlyargcount: i64,
    /// Local variable slots
    pub nlocals: i64,
    /// Value stack size hint
    pub stacksize: i64,
    /// [`code_flags`] bits
    pub flags: i64,
    /// Bytecode bytes, or a SmallInt builtin index for builtin code
    pub code: RawObject,
    /// Constants tuple
    pub consts: RawObject,
    /// Attribute and global names tuple
    pub names: RawObject,
    /// Local variable names tuple
    pub varnames: RawObject,
    /// Free variable names tuple
    pub freevars: RawObject,
    /// Cell variable names tuple
    pub cellvars: RawObject,
    /// Source file name
    pub filename: RawObject,
    /// Qualified name
    pub name: RawObject,
    /// First source line
    pub firstlineno: i64,
    /// Line number table bytes
    pub lnotab: RawObject,
}

heap_view!(
    /// Compiled code.
    Code,
    CODE
);

impl Code {
    const ARGCOUNT: usize = 0;
    const POSONLYARGCOUNT: usize = 1;
    const KWONLYARGCOUNT: usize = 2;
    const NLOCALS: usize = 3;
    const STACKSIZE: usize = 4;
    const FLAGS: usize = 5;
    const CODE: usize = 6;
    const CONSTS: usize = 7;
    const NAMES: usize = 8;
    const VARNAMES: usize = 9;
    const FREEVARS: usize = 10;
    const CELLVARS: usize = 11;
    const FILENAME: usize = 12;
    const NAME: usize = 13;
    const FIRSTLINENO: usize = 14;
    const LNOTAB: usize = 15;
    const SIZE: usize = 16;

    /// Positional parameter count.
    pub fn argcount(self, heap: &Heap) -> usize {
        small_int_field(heap, self.0, Self::ARGCOUNT) as usize
    }

    /// Positional-only parameter count.
    pub fn posonlyargcount(self, heap: &Heap) -> usize {
        small_int_field(heap, self.0, Self::POSONLYARGCOUNT) as usize
    }

    /// Keyword-only parameter count.
    pub fn kwonlyargcount(self, heap: &Heap) -> usize {
        small_int_field(heap, self.0, Self::KWONLYARGCOUNT) as usize
    }

    /// Local slot count.
    pub fn nlocals(self, heap: &Heap) -> usize {
        small_int_field(heap, self.0, Self::NLOCALS) as usize
    }

    /// Stack size hint.
    pub fn stacksize(self, heap: &Heap) -> usize {
        small_int_field(heap, self.0, Self::STACKSIZE) as usize
    }

    /// Flag bits.
    pub fn flags(self, heap: &Heap) -> i64 {
        small_int_field(heap, self.0, Self::FLAGS)
    }

    /// Whether this is the code of a builtin function.
    pub fn is_builtin(self, heap: &Heap) -> bool {
        self.flags(heap) & code_flags::BUILTIN != 0
    }

    /// Index into the builtin function table, for builtin code.
    pub fn builtin_index(self, heap: &Heap) -> Option<usize> {
        if !self.is_builtin(heap) {
            return None;
        }
        self.code(heap).as_small_int().map(|index| index as usize)
    }

    object_field!(
        /// Bytecode bytes
        code, set_code, Self::CODE
    );
    object_field!(
        /// Constants tuple
        consts, set_consts, Self::CONSTS
    );
    object_field!(
        /// Names tuple
        names, set_names, Self::NAMES
    );
    object_field!(
        /// Local variable names
        varnames, set_varnames, Self::VARNAMES
    );
    object_field!(
        /// Free variable names
        freevars, set_freevars, Self::FREEVARS
    );
    object_field!(
        /// Cell variable names
        cellvars, set_cellvars, Self::CELLVARS
    );
    object_field!(
        /// Source file name
        filename, set_filename, Self::FILENAME
    );
    object_field!(
        /// Qualified name
        name, set_name, Self::NAME
    );
    object_field!(
        /// Line number table
        lnotab, set_lnotab, Self::LNOTAB
    );

    /// First source line.
    pub fn firstlineno(self, heap: &Heap) -> i64 {
        small_int_field(heap, self.0, Self::FIRSTLINENO)
    }

    /// Slots a frame needs: locals, then free variables, then cell variables.
    pub fn total_locals(self, heap: &Heap) -> usize {
        let freevars = Tuple::from_raw(self.freevars(heap)).length(heap);
        let cellvars = Tuple::from_raw(self.cellvars(heap)).length(heap);
        self.nlocals(heap) + freevars + cellvars
    }
}

/// Field values of a new function.
#[derive(Debug, Clone, Copy)]
pub struct FunctionFields {
    /// The code object
    pub code: RawObject,
    /// Module globals dict
    pub globals: RawObject,
    /// Short name
    pub name: RawObject,
    /// Qualified name
    pub qualname: RawObject,
    /// Defaults tuple or None
    pub defaults: RawObject,
    /// Keyword-only defaults dict or None
    pub kwdefaults: RawObject,
    /// Rewritten bytecode buffer, or None for builtins
    pub rewritten_bytecode: RawObject,
    /// Inline cache tuple
    pub caches: RawObject,
    /// Original arguments of rewritten sites, a tuple of SmallInts
    pub original_arguments: RawObject,
}

heap_view!(
    /// A callable function.
    Function,
    FUNCTION
);

impl Function {
    const CODE: usize = 0;
    const GLOBALS: usize = 1;
    const NAME: usize = 2;
    const QUALNAME: usize = 3;
    const DEFAULTS: usize = 4;
    const KWDEFAULTS: usize = 5;
    const REWRITTEN_BYTECODE: usize = 6;
    const CACHES: usize = 7;
    const ORIGINAL_ARGUMENTS: usize = 8;
    const SIZE: usize = 9;

    object_field!(
        /// The code object
        code, set_code, Self::CODE
    );
    object_field!(
        /// Module globals dict
        globals, set_globals, Self::GLOBALS
    );
    object_field!(
        /// Short name
        name, set_name, Self::NAME
    );
    object_field!(
        /// Qualified name
        qualname, set_qualname, Self::QUALNAME
    );
    object_field!(
        /// Positional defaults
        defaults, set_defaults, Self::DEFAULTS
    );
    object_field!(
        /// Keyword-only defaults
        kwdefaults, set_kwdefaults, Self::KWDEFAULTS
    );
    object_field!(
        /// Rewritten bytecode
        rewritten_bytecode, set_rewritten_bytecode, Self::REWRITTEN_BYTECODE
    );
    object_field!(
        /// Inline caches
        caches, set_caches, Self::CACHES
    );
    object_field!(
        /// Original arguments of rewritten sites
        original_arguments, set_original_arguments, Self::ORIGINAL_ARGUMENTS
    );
}

/// Type flag bits.
pub mod type_flags {
    /// Instances never change layout and the type never registers cache
    /// dependencies
    pub const SEALED: i64 = 1 << 0;
    /// Created by the runtime rather than by a program
    pub const BUILTIN: i64 = 1 << 1;
}

heap_view!(
    /// A class.
    Type,
    TYPE
);

impl Type {
    const NAME: usize = 0;
    const BASES: usize = 1;
    const MRO: usize = 2;
    const DICT: usize = 3;
    const INSTANCE_LAYOUT: usize = 4;
    const FLAGS: usize = 5;
    const SIZE: usize = 6;

    object_field!(
        /// Class name
        name, set_name, Self::NAME
    );
    object_field!(
        /// Direct bases
        bases, set_bases, Self::BASES
    );
    object_field!(
        /// Method resolution order, starting with the type itself
        mro, set_mro, Self::MRO
    );
    object_field!(
        /// Attribute dict of name to ValueCell
        dict, set_dict, Self::DICT
    );

    /// Layout of new instances.
    pub fn instance_layout(self, heap: &Heap) -> LayoutId {
        LayoutId::from_raw(small_int_field(heap, self.0, Self::INSTANCE_LAYOUT) as u32)
    }

    /// Change the layout of new instances.
    pub fn set_instance_layout(self, heap: &mut Heap, layout_id: LayoutId) {
        heap.set_field(
            self.0,
            Self::INSTANCE_LAYOUT,
            RawObject::small_int(layout_id.raw() as i64),
        );
    }

    /// Flag bits.
    pub fn flags(self, heap: &Heap) -> i64 {
        small_int_field(heap, self.0, Self::FLAGS)
    }

    /// Whether the type is sealed.
    pub fn is_sealed(self, heap: &Heap) -> bool {
        self.flags(heap) & type_flags::SEALED != 0
    }
}

heap_view!(
    /// Mutable box for a global or class attribute.
    ValueCell,
    VALUE_CELL
);

impl ValueCell {
    const VALUE: usize = 0;
    const DEPENDENCY_LINK: usize = 1;
    const SIZE: usize = 2;

    object_field!(
        /// Stored value; Unbound for placeholders
        value, set_value, Self::VALUE
    );
    object_field!(
        /// Head WeakLink of the dependent functions, or None
        dependency_link, set_dependency_link, Self::DEPENDENCY_LINK
    );

    /// Whether the cell anchors dependencies without holding a value.
    pub fn is_placeholder(self, heap: &Heap) -> bool {
        self.value(heap).is_unbound()
    }

    /// Turn the cell into a placeholder.
    pub fn make_placeholder(self, heap: &mut Heap) {
        self.set_value(heap, RawObject::unbound());
    }
}

heap_view!(
    /// Node of a doubly linked list whose referent the collector may clear.
    WeakLink,
    WEAK_LINK
);

impl WeakLink {
    /// Field index of the referent, which the collector does not trace.
    pub const REFERENT: usize = 0;
    const PREV: usize = 1;
    const NEXT: usize = 2;
    const SIZE: usize = 3;

    object_field!(
        /// Referenced object, or None once collected
        referent, set_referent, Self::REFERENT
    );
    object_field!(
        /// Previous node or None
        prev, set_prev, Self::PREV
    );
    object_field!(
        /// Next node or None
        next, set_next, Self::NEXT
    );
}

heap_view!(
    /// Function bound to a receiver.
    BoundMethod,
    BOUND_METHOD
);

impl BoundMethod {
    const FUNCTION: usize = 0;
    const SELF: usize = 1;
    const SIZE: usize = 2;

    object_field!(
        /// The function
        function, set_function, Self::FUNCTION
    );
    object_field!(
        /// The receiver passed as first argument
        receiver, set_receiver, Self::SELF
    );
}

/// Field indices shared by every exception layout.
pub mod exception_fields {
    /// Arguments tuple
    pub const ARGS: usize = 0;
    /// Explicit cause or None
    pub const CAUSE: usize = 1;
    /// Exception being handled when this one was raised, or None
    pub const CONTEXT: usize = 2;
    /// Number of builtin exception fields
    pub const SIZE: usize = 3;
}

impl Heap {
    fn create_instance_with(&mut self, layout_id: LayoutId, values: &[RawObject]) -> VmResult<RawObject> {
        let object = self.allocate_object(layout_id, ObjectFormat::ObjectInstance, values.len())?;
        for (index, value) in values.iter().enumerate() {
            self.set_field(object, index, *value);
        }
        Ok(object)
    }

    /// New tuple of `length` Nones.
    pub fn create_tuple(&mut self, length: usize) -> VmResult<RawObject> {
        self.allocate_object(LayoutId::TUPLE, ObjectFormat::ObjectArray, length)
    }

    /// New tuple holding `values`.
    pub fn create_tuple_from(&mut self, values: &[RawObject]) -> VmResult<RawObject> {
        let tuple = self.create_tuple(values.len())?;
        for (index, value) in values.iter().enumerate() {
            self.set_field(tuple, index, *value);
        }
        Ok(tuple)
    }

    fn create_byte_array(&mut self, layout_id: LayoutId, bytes: &[u8]) -> VmResult<RawObject> {
        let object = self.allocate_object(layout_id, ObjectFormat::DataArray8, bytes.len())?;
        for (index, byte) in bytes.iter().enumerate() {
            self.set_byte_at(object, index, *byte);
        }
        Ok(object)
    }

    /// New string; short strings are immediates and do not allocate.
    pub fn create_str(&mut self, value: &str) -> VmResult<RawObject> {
        match RawObject::small_str(value) {
            Some(small) => Ok(small),
            None => self.create_byte_array(LayoutId::LARGE_STR, value.as_bytes()),
        }
    }

    /// New immutable bytes object.
    pub fn create_bytes(&mut self, bytes: &[u8]) -> VmResult<RawObject> {
        self.create_byte_array(LayoutId::LARGE_BYTES, bytes)
    }

    /// New mutable byte buffer initialized from `bytes`.
    pub fn create_mutable_bytes(&mut self, bytes: &[u8]) -> VmResult<RawObject> {
        self.create_byte_array(LayoutId::MUTABLE_BYTES, bytes)
    }

    /// New large integer from canonical digits.
    pub fn create_large_int(&mut self, digits: &[u64]) -> VmResult<RawObject> {
        let object = self.allocate_object(LayoutId::LARGE_INT, ObjectFormat::DataArray64, digits.len())?;
        for (index, digit) in digits.iter().enumerate() {
            self.set_word_at(object, index, *digit);
        }
        Ok(object)
    }

    /// New boxed float.
    pub fn create_float(&mut self, value: f64) -> VmResult<RawObject> {
        let object = self.allocate_object(LayoutId::FLOAT, ObjectFormat::DataArray64, 1)?;
        self.set_word_at(object, 0, value.to_bits());
        Ok(object)
    }

    /// New code object.
    pub fn create_code(&mut self, fields: &CodeFields) -> VmResult<RawObject> {
        let mut values = [RawObject::none(); Code::SIZE];
        values[Code::ARGCOUNT] = RawObject::small_int(fields.argcount);
        values[Code::POSONLYARGCOUNT] = RawObject::small_int(fields.posonlyargcount);
        values[Code::KWONLYARGCOUNT] = RawObject::small_int(fields.kwonlyargcount);
        values[Code::NLOCALS] = RawObject::small_int(fields.nlocals);
        values[Code::STACKSIZE] = RawObject::small_int(fields.stacksize);
        values[Code::FLAGS] = RawObject::small_int(fields.flags);
        values[Code::CODE] = fields.code;
        values[Code::CONSTS] = fields.consts;
        values[Code::NAMES] = fields.names;
        values[Code::VARNAMES] = fields.varnames;
        values[Code::FREEVARS] = fields.freevars;
        values[Code::CELLVARS] = fields.cellvars;
        values[Code::FILENAME] = fields.filename;
        values[Code::NAME] = fields.name;
        values[Code::FIRSTLINENO] = RawObject::small_int(fields.firstlineno);
        values[Code::LNOTAB] = fields.lnotab;
        self.create_instance_with(LayoutId::CODE, &values)
    }

    /// New function object.
    pub fn create_function(&mut self, fields: &FunctionFields) -> VmResult<RawObject> {
        let mut values = [RawObject::none(); Function::SIZE];
        values[Function::CODE] = fields.code;
        values[Function::GLOBALS] = fields.globals;
        values[Function::NAME] = fields.name;
        values[Function::QUALNAME] = fields.qualname;
        values[Function::DEFAULTS] = fields.defaults;
        values[Function::KWDEFAULTS] = fields.kwdefaults;
        values[Function::REWRITTEN_BYTECODE] = fields.rewritten_bytecode;
        values[Function::CACHES] = fields.caches;
        values[Function::ORIGINAL_ARGUMENTS] = fields.original_arguments;
        self.create_instance_with(LayoutId::FUNCTION, &values)
    }

    /// New type object.
    pub fn create_type(
        &mut self,
        name: RawObject,
        bases: RawObject,
        mro: RawObject,
        dict: RawObject,
        instance_layout: LayoutId,
        flags: i64,
    ) -> VmResult<RawObject> {
        let mut values = [RawObject::none(); Type::SIZE];
        values[Type::NAME] = name;
        values[Type::BASES] = bases;
        values[Type::MRO] = mro;
        values[Type::DICT] = dict;
        values[Type::INSTANCE_LAYOUT] = RawObject::small_int(instance_layout.raw() as i64);
        values[Type::FLAGS] = RawObject::small_int(flags);
        self.create_instance_with(LayoutId::TYPE, &values)
    }

    /// New value cell without dependents.
    pub fn create_value_cell(&mut self, value: RawObject) -> VmResult<RawObject> {
        let mut values = [RawObject::none(); ValueCell::SIZE];
        values[ValueCell::VALUE] = value;
        self.create_instance_with(LayoutId::VALUE_CELL, &values)
    }

    /// New weak link node.
    pub fn create_weak_link(
        &mut self,
        referent: RawObject,
        prev: RawObject,
        next: RawObject,
    ) -> VmResult<RawObject> {
        let mut values = [RawObject::none(); WeakLink::SIZE];
        values[WeakLink::REFERENT] = referent;
        values[WeakLink::PREV] = prev;
        values[WeakLink::NEXT] = next;
        self.create_instance_with(LayoutId::WEAK_LINK, &values)
    }

    /// New bound method.
    pub fn create_bound_method(&mut self, function: RawObject, receiver: RawObject) -> VmResult<RawObject> {
        let mut values = [RawObject::none(); BoundMethod::SIZE];
        values[BoundMethod::FUNCTION] = function;
        values[BoundMethod::SELF] = receiver;
        self.create_instance_with(LayoutId::BOUND_METHOD, &values)
    }

    /// New instance of `layout_id` with `num_fields` None fields.
    pub fn create_instance(&mut self, layout_id: LayoutId, num_fields: usize) -> VmResult<RawObject> {
        self.allocate_object(layout_id, ObjectFormat::ObjectInstance, num_fields)
    }

    /// Whether `object` is a str, inline or on the heap.
    pub fn is_str(&self, object: RawObject) -> bool {
        object.is_small_str()
            || (object.is_heap_object() && self.layout_id_of(object) == LayoutId::LARGE_STR)
    }

    /// Contents of a str or bytes-like object.
    pub fn str_bytes(&self, object: RawObject) -> Option<Vec<u8>> {
        if let Some(bytes) = object.small_str_bytes() {
            return Some(bytes);
        }
        match self.header(object)?.layout_id() {
            LayoutId::LARGE_STR | LayoutId::LARGE_BYTES | LayoutId::MUTABLE_BYTES => {
                Some(self.bytes_of(object))
            }
            _ => None,
        }
    }

    /// Contents of a str as a Rust string.
    pub fn str_to_string(&self, object: RawObject) -> Option<String> {
        if !self.is_str(object) {
            return None;
        }
        self.str_bytes(object)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Whether two strs have equal contents.
    pub fn str_equals(&self, left: RawObject, right: RawObject) -> bool {
        if left == right {
            return true;
        }
        if left.is_small_str() || right.is_small_str() {
            // Inline and heap representations never hold the same contents
            return false;
        }
        if !self.is_str(left) || !self.is_str(right) {
            return false;
        }
        self.count(left) == self.count(right) && self.bytes_of(left) == self.bytes_of(right)
    }
}
