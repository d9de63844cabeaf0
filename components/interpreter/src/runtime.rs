//! The runtime: heap, tables and thread of one interpreter instance.
//!
//! Everything a running program can reach hangs off a [`Runtime`]: the
//! managed heap, the layout table, interned names, the builtin function
//! table and the [`Thread`]. Independent runtimes share nothing.
//!
//! Any method that allocates may run a collection, which moves every heap
//! object. Callers holding raw references across such a call must keep them
//! in handles ([`Runtime::with_handles`]) or re-read them from a root.

use std::collections::HashMap;
use std::io::Write;

use core_types::{
    bigint_from_digits, digits_from_bigint, hash_bytes, hash_float, hash_int, hash_small_int,
    ErrorKind, Header, HashSecret, LayoutId, RawObject, VmError, VmResult,
};
use log::debug;
use memory_manager::{
    code_flags, CodeFields, CollectionStats, Dict, Float, Function, FunctionFields, Handle, Heap,
    LargeInt, Tuple, ValueCell,
};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::config::RuntimeConfig;
use crate::ic::{self, IC_POINTERS_PER_CACHE};
use crate::layout::LayoutInfo;
use crate::mutex::MutexTable;
use crate::rewrite;
use crate::thread::Thread;

/// Signature of a natively implemented function.
pub type BuiltinFunction = fn(&mut Runtime, &[RawObject]) -> VmResult<RawObject>;

/// An entry of the builtin function table.
#[derive(Clone, Copy)]
pub struct BuiltinEntry {
    /// Name used in error messages
    pub name: &'static str,
    /// The implementation
    pub function: BuiltinFunction,
}

impl std::fmt::Debug for BuiltinEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinEntry").field("name", &self.name).finish()
    }
}

/// One interpreter instance.
pub struct Runtime {
    pub(crate) heap: Heap,
    pub(crate) handles: memory_manager::Handles,
    pub(crate) config: RuntimeConfig,
    hash_secret: HashSecret,
    pub(crate) layouts: Vec<Option<LayoutInfo>>,
    interned: HashMap<Vec<u8>, RawObject>,
    pub(crate) builtins: Vec<BuiltinEntry>,
    pub(crate) builtins_dict: RawObject,
    pub(crate) empty_tuple: RawObject,
    pub(crate) not_implemented: RawObject,
    pub(crate) thread: Thread,
    mutexes: MutexTable,
    next_identity_hash: u64,
    collection_threshold: usize,
    stdout: Box<dyn Write>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("layouts", &self.layouts.len())
            .field("builtins", &self.builtins.len())
            .field("frames", &self.thread.depth())
            .finish()
    }
}

impl Runtime {
    /// Create a runtime with its builtin types and functions installed.
    ///
    /// # Example
    ///
    /// ```
    /// use interpreter::{Runtime, RuntimeConfig};
    ///
    /// let mut runtime = Runtime::new(RuntimeConfig::default()).unwrap();
    /// let name = runtime.intern("attribute_name").unwrap();
    /// assert_eq!(runtime.intern("attribute_name").unwrap(), name);
    /// ```
    pub fn new(config: RuntimeConfig) -> VmResult<Self> {
        let heap = Heap::new(config.heap_size);
        let collection_threshold = heap.space().size() / 4 * 3;
        let mut runtime = Runtime {
            heap,
            handles: memory_manager::Handles::new(),
            hash_secret: HashSecret::from_seed(config.hash_seed),
            config,
            layouts: Vec::new(),
            interned: HashMap::new(),
            builtins: Vec::new(),
            builtins_dict: RawObject::none(),
            empty_tuple: RawObject::none(),
            not_implemented: RawObject::none(),
            thread: Thread::new(),
            mutexes: MutexTable::new(),
            next_identity_hash: 1,
            collection_threshold,
            stdout: Box::new(std::io::stdout()),
        };
        runtime.empty_tuple = runtime.new_tuple(0)?;
        runtime.builtins_dict = runtime.new_dict()?;
        runtime.initialize_types()?;
        runtime.not_implemented =
            runtime.allocate_with(&mut [], |heap, _| heap.create_instance(LayoutId::NOT_IMPLEMENTED_TYPE, 0))?;
        crate::builtins::install(&mut runtime)?;
        debug!(
            "runtime ready: {} layouts, {} builtins, {} bytes in use",
            runtime.layouts.len(),
            runtime.builtins.len(),
            runtime.heap.space().used()
        );
        Ok(runtime)
    }

    /// The managed heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable access to the managed heap.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The interpreter thread.
    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    /// Locks handed out to embedding code.
    pub fn mutexes(&self) -> &MutexTable {
        &self.mutexes
    }

    /// Redirect the output of `print`.
    pub fn set_stdout(&mut self, stdout: Box<dyn Write>) {
        self.stdout = stdout;
    }

    pub(crate) fn write_stdout(&mut self, text: &str) -> VmResult<()> {
        self.stdout
            .write_all(text.as_bytes())
            .and_then(|_| self.stdout.flush())
            .map_err(|e| VmError::new(ErrorKind::SystemError, format!("cannot write output: {}", e)))
    }

    // ------------------------------------------------------------------
    // Roots and collection
    // ------------------------------------------------------------------

    /// Root `object` in the handle table.
    pub fn new_handle(&mut self, object: RawObject) -> Handle {
        self.handles.new_handle(object)
    }

    /// Current value of `handle`.
    pub fn handle(&self, handle: Handle) -> RawObject {
        self.handles.handle(handle)
    }

    /// Run `f`, releasing the handles it creates when it returns.
    pub fn with_handles<T>(&mut self, f: impl FnOnce(&mut Runtime) -> VmResult<T>) -> VmResult<T> {
        let scope = self.handles.handle_scope();
        let result = f(self);
        self.handles.close_scope(scope);
        result
    }

    /// Run a full collection.
    pub fn collect(&mut self) -> CollectionStats {
        self.collect_with(&mut [])
    }

    /// Run a full collection treating `live` as extra roots.
    pub fn collect_with(&mut self, live: &mut [RawObject]) -> CollectionStats {
        let Runtime {
            heap,
            handles,
            layouts,
            interned,
            builtins_dict,
            empty_tuple,
            not_implemented,
            thread,
            ..
        } = self;
        let stats = heap.collect(|visit| {
            handles.visit(visit);
            for layout in layouts.iter_mut().flatten() {
                layout.visit(visit);
            }
            interned.values_mut().for_each(|value| visit(value));
            visit(builtins_dict);
            visit(empty_tuple);
            visit(not_implemented);
            thread.visit(visit);
            live.iter_mut().for_each(|value| visit(value));
        });
        let size = self.heap.space().size();
        self.collection_threshold = stats.bytes_after + (size - stats.bytes_after.min(size)) / 2;
        stats
    }

    /// Collect if the heap has filled past the threshold. Only called
    /// between instructions, when every live reference is in a root.
    pub(crate) fn collect_if_needed(&mut self) {
        if self.heap.space().used() > self.collection_threshold {
            self.collect();
        }
    }

    /// Run `create`, collecting and retrying once when the heap is full.
    /// Requests larger than a whole space fail without collecting.
    ///
    /// `live` holds the raw references `create` reads; they are updated in
    /// place if a collection moves them.
    pub fn allocate_with<T, F>(&mut self, live: &mut [RawObject], mut create: F) -> VmResult<T>
    where
        F: FnMut(&mut Heap, &[RawObject]) -> VmResult<T>,
    {
        match create(&mut self.heap, live) {
            Err(error) if error.kind == ErrorKind::OutOfMemory && self.heap.last_failure_is_oversized() => {
                debug!("allocation larger than the heap: {}", error.message);
                Err(error)
            }
            Err(error) if error.kind == ErrorKind::OutOfMemory => {
                debug!("allocation failed, collecting before retry: {}", error.message);
                self.collect_with(live);
                create(&mut self.heap, live)
            }
            result => result,
        }
    }

    // ------------------------------------------------------------------
    // Object creation
    // ------------------------------------------------------------------

    /// New tuple of `length` Nones.
    pub fn new_tuple(&mut self, length: usize) -> VmResult<RawObject> {
        if length == 0 && !self.empty_tuple.is_none() {
            return Ok(self.empty_tuple);
        }
        self.allocate_with(&mut [], |heap, _| heap.create_tuple(length))
    }

    /// New tuple holding `values`.
    pub fn new_tuple_from(&mut self, values: &[RawObject]) -> VmResult<RawObject> {
        if values.is_empty() {
            return self.new_tuple(0);
        }
        let mut live = values.to_vec();
        self.allocate_with(&mut live, |heap, live| heap.create_tuple_from(live))
    }

    /// New str.
    pub fn new_str(&mut self, value: &str) -> VmResult<RawObject> {
        self.allocate_with(&mut [], |heap, _| heap.create_str(value))
    }

    /// New immutable bytes.
    pub fn new_bytes(&mut self, value: &[u8]) -> VmResult<RawObject> {
        self.allocate_with(&mut [], |heap, _| heap.create_bytes(value))
    }

    /// New mutable byte buffer.
    pub fn new_mutable_bytes(&mut self, value: &[u8]) -> VmResult<RawObject> {
        self.allocate_with(&mut [], |heap, _| heap.create_mutable_bytes(value))
    }

    /// New float.
    pub fn new_float(&mut self, value: f64) -> VmResult<RawObject> {
        self.allocate_with(&mut [], |heap, _| heap.create_float(value))
    }

    /// New int: a SmallInt when it fits, a LargeInt otherwise.
    pub fn new_int(&mut self, value: &BigInt) -> VmResult<RawObject> {
        if let Some(small) = value.to_i64().and_then(RawObject::try_small_int) {
            return Ok(small);
        }
        let digits = digits_from_bigint(value);
        self.allocate_with(&mut [], |heap, _| heap.create_large_int(&digits))
    }

    /// New empty dict.
    pub fn new_dict(&mut self) -> VmResult<RawObject> {
        self.allocate_with(&mut [], |heap, _| heap.create_dict())
    }

    /// New value cell holding `value`.
    pub fn new_value_cell(&mut self, value: RawObject) -> VmResult<RawObject> {
        let mut live = [value];
        self.allocate_with(&mut live, |heap, live| heap.create_value_cell(live[0]))
    }

    /// New placeholder value cell.
    pub fn new_placeholder_cell(&mut self) -> VmResult<RawObject> {
        self.new_value_cell(RawObject::unbound())
    }

    /// New weak link node.
    pub fn new_weak_link(&mut self, referent: RawObject, prev: RawObject, next: RawObject) -> VmResult<RawObject> {
        let mut live = [referent, prev, next];
        self.allocate_with(&mut live, |heap, live| heap.create_weak_link(live[0], live[1], live[2]))
    }

    /// New bound method.
    pub fn new_bound_method(&mut self, function: RawObject, receiver: RawObject) -> VmResult<RawObject> {
        let mut live = [function, receiver];
        self.allocate_with(&mut live, |heap, live| heap.create_bound_method(live[0], live[1]))
    }

    /// New instance of layout `layout_id` with every field None.
    pub fn new_instance(&mut self, layout_id: LayoutId) -> VmResult<RawObject> {
        let num_fields = self.layout(layout_id).map(LayoutInfo::num_fields).unwrap_or(0);
        self.allocate_with(&mut [], |heap, _| heap.create_instance(layout_id, num_fields))
    }

    /// The NotImplemented singleton.
    pub fn not_implemented(&self) -> RawObject {
        self.not_implemented
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Whether `object` is a str.
    pub fn is_str(&self, object: RawObject) -> bool {
        self.heap.is_str(object)
    }

    /// Contents of a str.
    pub fn str_value(&self, object: RawObject) -> Option<String> {
        self.heap.str_to_string(object)
    }

    /// Whether `object` is a str equal to `value`.
    pub fn str_equals_static(&self, object: RawObject, value: &str) -> bool {
        self.heap.is_str(object) && self.heap.str_bytes(object).is_some_and(|bytes| bytes == value.as_bytes())
    }

    /// Value of an int or bool.
    pub fn int_value(&self, object: RawObject) -> Option<BigInt> {
        if let Some(value) = object.as_small_int() {
            return Some(BigInt::from(value));
        }
        if let Some(value) = object.as_bool() {
            return Some(BigInt::from(value as i64));
        }
        LargeInt::cast(&self.heap, object).map(|large| bigint_from_digits(&large.digits(&self.heap)))
    }

    /// Value of a float.
    pub fn float_value(&self, object: RawObject) -> Option<f64> {
        Float::cast(&self.heap, object).map(|float| float.value(&self.heap))
    }

    /// Elements of a tuple.
    pub fn tuple_items(&self, object: RawObject) -> Option<Vec<RawObject>> {
        Tuple::cast(&self.heap, object).map(|tuple| tuple.to_vec(&self.heap))
    }

    /// Whether `object` is a function.
    pub fn is_function(&self, object: RawObject) -> bool {
        Function::cast(&self.heap, object).is_some()
    }

    // ------------------------------------------------------------------
    // Interning and hashing
    // ------------------------------------------------------------------

    /// The canonical str with contents `value`.
    pub fn intern(&mut self, value: &str) -> VmResult<RawObject> {
        if let Some(small) = RawObject::small_str(value) {
            return Ok(small);
        }
        if let Some(object) = self.interned.get(value.as_bytes()) {
            return Ok(*object);
        }
        let object = self.new_str(value)?;
        self.interned.insert(value.as_bytes().to_vec(), object);
        Ok(object)
    }

    /// The canonical str equal to `object`; `object` itself becomes
    /// canonical when no equal str was interned before. Non-strs are
    /// returned unchanged. Never allocates.
    pub fn intern_object(&mut self, object: RawObject) -> RawObject {
        if object.is_small_str() || !self.heap.is_str(object) {
            return object;
        }
        let bytes = self.heap.bytes_of(object);
        *self.interned.entry(bytes).or_insert(object)
    }

    /// Hash of a dict key.
    pub fn hash_key(&mut self, key: RawObject) -> VmResult<i64> {
        if let Some(value) = key.as_small_int() {
            return Ok(hash_small_int(value));
        }
        if let Some(value) = key.as_bool() {
            return Ok(value as i64);
        }
        if self.heap.is_str(key) {
            let bytes = self.heap.str_bytes(key).unwrap_or_default();
            return Ok(hash_bytes(&self.hash_secret, &bytes));
        }
        if let Some(value) = self.float_value(key) {
            return Ok(hash_float(value));
        }
        if let Some(large) = LargeInt::cast(&self.heap, key) {
            return Ok(hash_int(&bigint_from_digits(&large.digits(&self.heap))));
        }
        if let Some(items) = self.tuple_items(key) {
            // xxHash-style lane combination
            let mut acc: u64 = 0x27D4EB2F165667C5;
            for item in items {
                let lane = self.hash_key(item)? as u64;
                acc = acc.wrapping_add(lane.wrapping_mul(0xC2B2AE3D27D4EB4F));
                acc = acc.rotate_left(31).wrapping_mul(0x9E3779B185EBCA87);
            }
            return Ok(acc as i64);
        }
        Ok(self.identity_hash(key))
    }

    /// Identity hash of any object, stable across collections.
    pub fn identity_hash(&mut self, object: RawObject) -> i64 {
        let Some(header) = self.heap.header(object) else {
            return hash_small_int((object.raw() >> 3) as i64);
        };
        if header.hash_code() != 0 {
            return header.hash_code() as i64;
        }
        let hash = self.next_identity_hash & Header::HASH_CODE_MASK;
        self.next_identity_hash = (self.next_identity_hash + 1) & Header::HASH_CODE_MASK;
        if self.next_identity_hash == 0 {
            self.next_identity_hash = 1;
        }
        self.heap.set_header(object, header.with_hash_code(hash));
        hash as i64
    }

    // ------------------------------------------------------------------
    // Dicts
    // ------------------------------------------------------------------

    /// Value stored under `key`.
    pub fn dict_at(&mut self, dict: RawObject, key: RawObject) -> VmResult<Option<RawObject>> {
        let hash = self.hash_key(key)?;
        Ok(Dict::from_raw(dict).at(&self.heap, key, hash))
    }

    /// Store `value` under `key`.
    pub fn dict_at_put(&mut self, dict: RawObject, key: RawObject, value: RawObject) -> VmResult<()> {
        let hash = self.hash_key(key)?;
        let mut live = [dict, key, value];
        self.allocate_with(&mut live, |heap, live| {
            Dict::from_raw(live[0]).at_put(heap, live[1], hash, live[2])
        })
    }

    /// Remove `key`, returning its value.
    pub fn dict_remove(&mut self, dict: RawObject, key: RawObject) -> VmResult<Option<RawObject>> {
        let hash = self.hash_key(key)?;
        Ok(Dict::from_raw(dict).remove(&mut self.heap, key, hash))
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    /// Cell of global `name`, placeholder or not.
    pub fn global_cell(&mut self, globals: RawObject, name: RawObject) -> VmResult<Option<RawObject>> {
        self.dict_at(globals, name)
    }

    /// Value of global `name`, if bound.
    pub fn global_at(&mut self, globals: RawObject, name: RawObject) -> VmResult<Option<RawObject>> {
        Ok(self.global_cell(globals, name)?.and_then(|cell| {
            let cell = ValueCell::from_raw(cell);
            (!cell.is_placeholder(&self.heap)).then(|| cell.value(&self.heap))
        }))
    }

    /// Bind global `name`, returning its cell.
    pub fn global_at_put(&mut self, globals: RawObject, name: RawObject, value: RawObject) -> VmResult<RawObject> {
        if let Some(cell) = self.global_cell(globals, name)? {
            ValueCell::from_raw(cell).set_value(&mut self.heap, value);
            return Ok(cell);
        }
        self.with_handles(|rt| {
            let globals = rt.new_handle(globals);
            let name = rt.new_handle(name);
            let cell = rt.new_value_cell(value)?;
            let cell = rt.new_handle(cell);
            rt.dict_at_put(rt.handle(globals), rt.handle(name), rt.handle(cell))?;
            Ok(rt.handle(cell))
        })
    }

    /// Unbind global `name`, invalidating every cache that memoized it.
    /// Returns whether the name was bound.
    pub fn global_remove(&mut self, globals: RawObject, name: RawObject) -> VmResult<bool> {
        let Some(cell) = self.global_cell(globals, name)? else {
            return Ok(false);
        };
        if ValueCell::from_raw(cell).is_placeholder(&self.heap) {
            return Ok(false);
        }
        ValueCell::from_raw(cell).make_placeholder(&mut self.heap);
        ic::ic_invalidate_global_var(self, cell);
        Ok(true)
    }

    /// Value of builtin `name`.
    pub fn builtin_at(&mut self, name: RawObject) -> VmResult<Option<RawObject>> {
        let builtins = self.builtins_dict;
        self.global_at(builtins, name)
    }

    /// Bind global `name` given as text.
    pub fn set_global(&mut self, globals: RawObject, name: &str, value: RawObject) -> VmResult<()> {
        let mut live = [globals, value];
        let key = self.allocate_with(&mut live, |heap, _| heap.create_str(name))?;
        let key = self.intern_object(key);
        self.global_at_put(live[0], key, live[1])?;
        Ok(())
    }

    /// Value of global `name` given as text.
    pub fn get_global(&mut self, globals: RawObject, name: &str) -> VmResult<Option<RawObject>> {
        let mut live = [globals];
        let key = self.allocate_with(&mut live, |heap, _| heap.create_str(name))?;
        self.global_at(live[0], key)
    }

    // ------------------------------------------------------------------
    // Code and functions
    // ------------------------------------------------------------------

    /// Create a code object after checking its invariants.
    ///
    /// Builtin code must carry a SmallInt table index and no constants,
    /// names, free or cell variables; anything else is a fatal error. Names
    /// are interned.
    pub fn new_code(&mut self, fields: &CodeFields) -> VmResult<RawObject> {
        let tuple_len = |heap: &Heap, object: RawObject| Tuple::cast(heap, object).map(|t| t.length(heap));
        for (what, object) in [
            ("consts", fields.consts),
            ("names", fields.names),
            ("varnames", fields.varnames),
            ("freevars", fields.freevars),
            ("cellvars", fields.cellvars),
        ] {
            if tuple_len(&self.heap, object).is_none() {
                return Err(VmError::type_error(format!("code {} must be a tuple", what)));
            }
        }
        if fields.flags & code_flags::BUILTIN != 0 {
            let index = fields.code.as_small_int();
            let empty = [fields.consts, fields.names, fields.freevars, fields.cellvars]
                .iter()
                .all(|object| tuple_len(&self.heap, *object) == Some(0));
            let in_table = index.is_some_and(|index| index >= 0 && (index as usize) < self.builtins.len());
            if !empty || !in_table {
                return Err(VmError::fatal("malformed builtin code object"));
            }
        } else if self.heap.str_bytes(fields.code).is_none() || self.heap.is_str(fields.code) {
            return Err(VmError::type_error("code must hold a bytes object"));
        }
        for tuple in [fields.names, fields.varnames, fields.freevars, fields.cellvars] {
            let tuple = Tuple::from_raw(tuple);
            for index in 0..tuple.length(&self.heap) {
                let interned = self.intern_object(tuple.at(&self.heap, index));
                tuple.at_put(&mut self.heap, index, interned);
            }
        }
        let mut live = [
            fields.code,
            fields.consts,
            fields.names,
            fields.varnames,
            fields.freevars,
            fields.cellvars,
            fields.filename,
            fields.name,
            fields.lnotab,
        ];
        self.allocate_with(&mut live, |heap, live| {
            heap.create_code(&CodeFields {
                code: live[0],
                consts: live[1],
                names: live[2],
                varnames: live[3],
                freevars: live[4],
                cellvars: live[5],
                filename: live[6],
                name: live[7],
                lnotab: live[8],
                ..*fields
            })
        })
    }

    /// Create a function running `code` with `globals`.
    ///
    /// The bytecode is rewritten to use inline caches unless caching is
    /// disabled.
    pub fn new_function(&mut self, code: RawObject, qualname: RawObject, globals: RawObject) -> VmResult<RawObject> {
        let is_builtin = memory_manager::Code::from_raw(code).is_builtin(&self.heap);
        let rewritten = (!is_builtin).then(|| rewrite::rewrite_bytecode(&self.heap, code, self.config.cache_enabled));
        let qualname_text = self.str_value(qualname).unwrap_or_default();
        let short_name = qualname_text.rsplit('.').next().unwrap_or_default().to_string();
        self.with_handles(|rt| {
            let code = rt.new_handle(code);
            let qualname = rt.new_handle(qualname);
            let globals = rt.new_handle(globals);
            let name = rt.intern(&short_name)?;
            let name = rt.new_handle(name);
            let (bytecode, caches, originals) = match &rewritten {
                Some(result) => {
                    let bytecode = rt.new_mutable_bytes(&result.bytecode)?;
                    let bytecode = rt.new_handle(bytecode);
                    let caches = rt.new_tuple(result.num_caches * IC_POINTERS_PER_CACHE)?;
                    let caches = rt.new_handle(caches);
                    let values: Vec<RawObject> = result
                        .original_arguments
                        .iter()
                        .map(|arg| arg.map_or(RawObject::none(), |arg| RawObject::small_int(arg as i64)))
                        .collect();
                    let originals = rt.new_tuple_from(&values)?;
                    (rt.handle(bytecode), rt.handle(caches), originals)
                }
                None => (RawObject::none(), rt.empty_tuple, rt.empty_tuple),
            };
            let mut live = [
                rt.handle(code),
                rt.handle(globals),
                rt.handle(name),
                rt.handle(qualname),
                bytecode,
                caches,
                originals,
            ];
            let function = rt.allocate_with(&mut live, |heap, live| {
                heap.create_function(&FunctionFields {
                    code: live[0],
                    globals: live[1],
                    name: live[2],
                    qualname: live[3],
                    defaults: RawObject::none(),
                    kwdefaults: RawObject::none(),
                    rewritten_bytecode: live[4],
                    caches: live[5],
                    original_arguments: live[6],
                })
            })?;
            if let Some(result) = &rewritten {
                debug!(
                    "rewrote {}: {} caches, {} bytes",
                    qualname_text,
                    result.num_caches,
                    result.bytecode.len()
                );
            }
            Ok(function)
        })
    }

    /// Register `function` in the builtin table and wrap it in a function
    /// object named `qualname`.
    ///
    /// The function accepts exactly `argcount` positional arguments, or at
    /// least that many when `varargs` is set.
    pub fn new_builtin_function(
        &mut self,
        name: &'static str,
        qualname: &str,
        argcount: usize,
        varargs: bool,
        function: BuiltinFunction,
    ) -> VmResult<RawObject> {
        let index = self.builtins.len();
        self.builtins.push(BuiltinEntry { name, function });
        let flags = code_flags::BUILTIN | if varargs { code_flags::VARARGS } else { 0 };
        self.with_handles(|rt| {
            let code_name = rt.intern(qualname)?;
            let code_name = rt.new_handle(code_name);
            let empty = rt.empty_tuple;
            let code = rt.new_code(&CodeFields {
                argcount: argcount as i64,
                posonlyargcount: argcount as i64,
                kwonlyargcount: 0,
                nlocals: argcount as i64 + varargs as i64,
                stacksize: 0,
                flags,
                code: RawObject::small_int(index as i64),
                consts: empty,
                names: empty,
                varnames: empty,
                freevars: empty,
                cellvars: empty,
                filename: RawObject::none(),
                name: rt.handle(code_name),
                firstlineno: 0,
                lnotab: RawObject::none(),
            })?;
            rt.new_function(code, rt.handle(code_name), RawObject::none())
        })
    }

    /// Builtin table entry `index`.
    pub(crate) fn builtin_entry(&self, index: usize) -> VmResult<BuiltinEntry> {
        self.builtins
            .get(index)
            .copied()
            .ok_or_else(|| VmError::fatal(format!("builtin function {} does not exist", index)))
    }
}
