//! The bytecode dispatch loop.
//!
//! Calls between bytecode functions push a frame and keep running in the
//! same loop. Rust code that calls back into bytecode (builtins, operator
//! dispatch, class bodies) goes through [`execute`], which pushes an entry
//! frame and runs until that frame returns. Collections only happen between
//! instructions, so every raw reference a handler holds stays valid until
//! it allocates.

use bytecode_system::{BinaryOp, Bytecode, CompareOp, CODE_UNIT_SIZE};
use core_types::{object_from_oparg, ErrorKind, RawObject, VmError, VmResult};
use log::{debug, trace};
use memory_manager::{exception_fields, Code, Dict, Function, MutableBytes, Tuple, ValueCell};

use crate::attributes::Method;
use crate::frame::{BlockKind, Frame, TryBlock};
use crate::ic;
use crate::layout::AttributeLocation;
use crate::runtime::Runtime;

const MAKE_FUNCTION_DEFAULTS: i32 = 0x01;
const MAKE_FUNCTION_KWDEFAULTS: i32 = 0x02;
const MAKE_FUNCTION_ANNOTATIONS: i32 = 0x04;
const MAKE_FUNCTION_CLOSURE: i32 = 0x08;

/// Entry point for running code objects.
///
/// `Interpreter` carries no state of its own; everything lives in the
/// [`Runtime`] passed to each call.
#[derive(Debug, Default, Clone, Copy)]
pub struct Interpreter;

impl Interpreter {
    /// Run a module-level code object.
    ///
    /// # Arguments
    /// * `rt` - The runtime to execute in
    /// * `code` - A code object
    /// * `globals` - The module dict; `STORE_NAME` and `LOAD_NAME` resolve
    ///   through it as globals
    ///
    /// # Returns
    /// The value the code returned, or the error that escaped it.
    ///
    /// # Example
    /// ```
    /// use bytecode_system::{Bytecode, BytecodeWriter};
    /// use core_types::RawObject;
    /// use interpreter::{Interpreter, Runtime, RuntimeConfig};
    /// use memory_manager::CodeFields;
    ///
    /// let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    /// let mut writer = BytecodeWriter::new();
    /// writer.emit(Bytecode::LoadConst, 0).emit(Bytecode::ReturnValue, 0);
    /// let bytecode = rt.new_bytes(&writer.finish()).unwrap();
    /// let consts = rt.new_tuple_from(&[RawObject::small_int(42)]).unwrap();
    /// let empty = rt.new_tuple(0).unwrap();
    /// let name = rt.intern("<module>").unwrap();
    /// let code = rt
    ///     .new_code(&CodeFields {
    ///         argcount: 0,
    ///         posonlyargcount: 0,
    ///         kwonlyargcount: 0,
    ///         nlocals: 0,
    ///         stacksize: 1,
    ///         flags: 0,
    ///         code: bytecode,
    ///         consts,
    ///         names: empty,
    ///         varnames: empty,
    ///         freevars: empty,
    ///         cellvars: empty,
    ///         filename: RawObject::none(),
    ///         name,
    ///         firstlineno: 1,
    ///         lnotab: RawObject::none(),
    ///     })
    ///     .unwrap();
    /// let globals = rt.new_dict().unwrap();
    /// let result = Interpreter.run_code(&mut rt, code, globals).unwrap();
    /// assert_eq!(result, RawObject::small_int(42));
    /// ```
    pub fn run_code(&self, rt: &mut Runtime, code: RawObject, globals: RawObject) -> VmResult<RawObject> {
        let Some(code_view) = Code::cast(&rt.heap, code) else {
            return Err(VmError::type_error(format!(
                "expected a code object, not '{}'",
                rt.type_name_of(code)
            )));
        };
        if Dict::cast(&rt.heap, globals).is_none() {
            return Err(VmError::type_error(format!(
                "globals must be a dict, not '{}'",
                rt.type_name_of(globals)
            )));
        }
        let name = code_view.name(&rt.heap);
        let function = rt.new_function(code, name, globals)?;
        let function_view = Function::from_raw(function);
        let globals = function_view.globals(&rt.heap);
        let total_locals = Code::from_raw(function_view.code(&rt.heap)).total_locals(&rt.heap);
        execute(rt, function, vec![RawObject::unbound(); total_locals], Some(globals))
    }

    /// Call `callable` with positional `args`.
    pub fn call(&self, rt: &mut Runtime, callable: RawObject, args: &[RawObject]) -> VmResult<RawObject> {
        rt.call(callable, args)
    }
}

/// Run `function` with bound `locals` until it returns.
///
/// `names` is the namespace of `STORE_NAME` and friends; it defaults to the
/// function's globals.
pub(crate) fn execute(
    rt: &mut Runtime,
    function: RawObject,
    locals: Vec<RawObject>,
    names: Option<RawObject>,
) -> VmResult<RawObject> {
    let outer_depth = rt.thread.depth();
    push_frame(rt, function, locals, names, true)?;
    let result = run(rt);
    rt.thread.frames.truncate(outer_depth);
    if rt.thread.frames.is_empty() {
        rt.thread.handled_exception = RawObject::none();
        rt.clear_pending_exception();
    }
    result
}

fn push_frame(
    rt: &mut Runtime,
    function: RawObject,
    locals: Vec<RawObject>,
    names: Option<RawObject>,
    is_entry: bool,
) -> VmResult<()> {
    if rt.thread.depth() >= rt.config.max_frame_depth {
        return Err(VmError::new(ErrorKind::RecursionError, "maximum recursion depth exceeded"));
    }
    let function_view = Function::from_raw(function);
    let globals = function_view.globals(&rt.heap);
    let stacksize = Code::from_raw(function_view.code(&rt.heap)).stacksize(&rt.heap);
    let mut frame = Frame::new(function, locals, globals, stacksize);
    frame.names = names.unwrap_or(globals);
    frame.is_entry = is_entry;
    rt.thread.frames.push(frame);
    trace!("entered frame {} at depth {}", rt.function_name(function), rt.thread.depth());
    Ok(())
}

/// Pop the innermost frame, giving back the exception its open handlers
/// had saved. Returns whether it was an entry frame.
fn pop_frame(rt: &mut Runtime) -> VmResult<bool> {
    let frame = rt.thread.frames.pop().ok_or_else(no_frame)?;
    if let Some(block) = frame.blocks.iter().find(|block| block.kind == BlockKind::ExceptHandler) {
        rt.thread.handled_exception = block.saved_exception;
    }
    Ok(frame.is_entry)
}

fn run(rt: &mut Runtime) -> VmResult<RawObject> {
    loop {
        rt.collect_if_needed();
        match step(rt) {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(error) => unwind(rt, error)?,
        }
    }
}

/// Find a handler for `error`. Returns Ok once a handler is running and the
/// error if it escapes the entry frame.
fn unwind(rt: &mut Runtime, mut error: VmError) -> VmResult<()> {
    let catchable = error.kind.is_catchable();
    if catchable {
        if let Err(failure) = rt.materialize(&error) {
            return unwind(rt, failure);
        }
    }
    loop {
        let (function, pc) = {
            let frame = frame_ref(rt)?;
            (frame.function, frame.pc)
        };
        error.push_frame(rt.function_name(function), pc.saturating_sub(CODE_UNIT_SIZE));
        if catchable && enter_handler(rt)? {
            debug!("{} caught in {}", error.kind.name(), rt.function_name(function));
            return Ok(());
        }
        if pop_frame(rt)? {
            return Err(error);
        }
    }
}

/// Pop blocks of the innermost frame until a SETUP_FINALLY block is found,
/// then start its handler with the pending exception.
fn enter_handler(rt: &mut Runtime) -> VmResult<bool> {
    loop {
        let Some(block) = frame(rt)?.blocks.pop() else {
            return Ok(false);
        };
        if block.kind == BlockKind::ExceptHandler {
            rt.thread.handled_exception = block.saved_exception;
            continue;
        }
        let exception = rt.thread.pending_exception;
        let saved = rt.thread.handled_exception;
        let exception_type = rt.type_of(exception);
        let frame = frame(rt)?;
        frame.stack.truncate(block.level);
        frame.push_block(TryBlock {
            kind: BlockKind::ExceptHandler,
            handler: block.handler,
            level: block.level,
            saved_exception: saved,
        })?;
        frame.push(RawObject::none());
        frame.push(exception);
        frame.push(exception_type);
        frame.pc = block.handler;
        rt.thread.handled_exception = exception;
        rt.thread.pending_exception = RawObject::none();
        return Ok(true);
    }
}

/// Decode the next instruction, folding EXTENDED_ARG prefixes into its
/// argument.
fn fetch(rt: &mut Runtime) -> VmResult<(Bytecode, i32)> {
    let frame = rt.thread.frames.last_mut().ok_or_else(no_frame)?;
    let rewritten = Function::from_raw(frame.function).rewritten_bytecode(&rt.heap);
    let bytecode = MutableBytes::cast(&rt.heap, rewritten)
        .ok_or_else(|| VmError::fatal("function has no bytecode to run"))?;
    let length = bytecode.length(&rt.heap);
    let mut pc = frame.pc;
    let mut arg: i32 = 0;
    loop {
        if pc + 1 >= length {
            return Err(VmError::new(
                ErrorKind::SystemError,
                "execution ran past the end of the bytecode",
            ));
        }
        let opcode = bytecode.byte_at(&rt.heap, pc);
        arg = arg << 8 | i32::from(bytecode.byte_at(&rt.heap, pc + 1));
        pc += CODE_UNIT_SIZE;
        if opcode == Bytecode::ExtendedArg.byte() {
            continue;
        }
        let bc = Bytecode::from_byte(opcode)
            .ok_or_else(|| VmError::new(ErrorKind::SystemError, format!("unknown opcode {}", opcode)))?;
        frame.pc = pc;
        return Ok((bc, arg));
    }
}

/// Execute one instruction. Returns the result when an entry frame returns.
fn step(rt: &mut Runtime) -> VmResult<Option<RawObject>> {
    let (bc, arg) = fetch(rt)?;
    if let Some(op) = bc.binary_op() {
        binary_operation(rt, op, false)?;
        return Ok(None);
    }
    if let Some(op) = bc.inplace_op() {
        binary_operation(rt, op, true)?;
        return Ok(None);
    }
    match bc {
        Bytecode::Nop | Bytecode::ExtendedArg => {}
        Bytecode::PopTop => {
            frame(rt)?.pop()?;
        }
        Bytecode::RotTwo => {
            let frame = frame(rt)?;
            let top = frame.pop()?;
            let second = frame.pop()?;
            frame.push(top);
            frame.push(second);
        }
        Bytecode::RotThree => {
            let frame = frame(rt)?;
            let top = frame.pop()?;
            let second = frame.pop()?;
            let third = frame.pop()?;
            frame.push(top);
            frame.push(third);
            frame.push(second);
        }
        Bytecode::DupTop => {
            let frame = frame(rt)?;
            let top = frame.peek(0)?;
            frame.push(top);
        }
        Bytecode::DupTopTwo => {
            let frame = frame(rt)?;
            let second = frame.peek(1)?;
            let top = frame.peek(0)?;
            frame.push(second);
            frame.push(top);
        }
        Bytecode::UnaryPositive => unary_operation(rt, "__pos__")?,
        Bytecode::UnaryNegative => unary_operation(rt, "__neg__")?,
        Bytecode::UnaryInvert => unary_operation(rt, "__invert__")?,
        Bytecode::UnaryNot => {
            let value = frame_ref(rt)?.peek(0)?;
            let truth = rt.is_true(value)?;
            frame(rt)?.set_peek(0, RawObject::bool(!truth))?;
        }
        Bytecode::BinarySubscr => {
            let (container, key) = top_two(rt)?;
            let result = rt.subscript(container, key)?;
            replace_top_two(rt, result)?;
        }
        Bytecode::Reraise => {
            let frame = frame(rt)?;
            frame.pop()?;
            let exception = frame.pop()?;
            frame.pop()?;
            return Err(rt.raise_object(exception));
        }
        Bytecode::LoadBuildClass => {
            let name = rt.intern("__build_class__")?;
            let builder = rt
                .builtin_at(name)?
                .ok_or_else(|| VmError::new(ErrorKind::NameError, "__build_class__ not found"))?;
            frame(rt)?.push(builder);
        }
        Bytecode::ReturnValue => {
            let value = frame(rt)?.pop()?;
            if pop_frame(rt)? {
                return Ok(Some(value));
            }
            frame(rt)?.push(value);
        }
        Bytecode::PopBlock => {
            frame(rt)?
                .blocks
                .pop()
                .ok_or_else(|| VmError::new(ErrorKind::SystemError, "block stack underflow"))?;
        }
        Bytecode::PopExcept => {
            let frame = frame(rt)?;
            let block = frame
                .blocks
                .pop()
                .ok_or_else(|| VmError::new(ErrorKind::SystemError, "block stack underflow"))?;
            if block.kind != BlockKind::ExceptHandler {
                return Err(VmError::new(ErrorKind::SystemError, "popped block is not an except handler"));
            }
            frame.stack.truncate(block.level);
            rt.thread.handled_exception = block.saved_exception;
        }
        Bytecode::StoreName => store_name(rt, arg)?,
        Bytecode::DeleteName => delete_name(rt, arg)?,
        Bytecode::LoadName => load_name(rt, arg)?,
        Bytecode::StoreAttr => {
            let name = name_at(rt, arg)?;
            let (object, value) = top_two_reversed(rt)?;
            rt.set_attribute(object, name, value)?;
            frame(rt)?.drop_values(2)?;
        }
        Bytecode::StoreAttrCached => store_attr_cached(rt, arg)?,
        Bytecode::DeleteAttr => {
            let name = name_at(rt, arg)?;
            let object = frame_ref(rt)?.peek(0)?;
            rt.delete_attribute(object, name)?;
            frame(rt)?.pop()?;
        }
        Bytecode::StoreGlobal => store_global(rt, arg)?,
        Bytecode::StoreGlobalCached => {
            let index = operand_count(arg)?;
            let (caches, value) = {
                let frame = frame_ref(rt)?;
                (Function::from_raw(frame.function).caches(&rt.heap), frame.peek(0)?)
            };
            let cell = Tuple::cast(&rt.heap, caches)
                .filter(|caches| index < caches.length(&rt.heap))
                .and_then(|caches| ValueCell::cast(&rt.heap, caches.at(&rt.heap, index)))
                .filter(|cell| !cell.is_placeholder(&rt.heap));
            match cell {
                Some(cell) => {
                    cell.set_value(&mut rt.heap, value);
                    frame(rt)?.pop()?;
                }
                None => store_global(rt, arg)?,
            }
        }
        Bytecode::DeleteGlobal => {
            let name = name_at(rt, arg)?;
            let globals = frame_ref(rt)?.globals;
            if !rt.global_remove(globals, name)? {
                return Err(name_error(rt, name));
            }
        }
        Bytecode::LoadConst => {
            let consts = Code::from_raw(function_code(rt)?).consts(&rt.heap);
            let value = tuple_entry(rt, consts, arg, "constant")?;
            frame(rt)?.push(value);
        }
        Bytecode::LoadImmediate => {
            frame(rt)?.push(object_from_oparg(arg as u8 as i8));
        }
        Bytecode::BuildTuple => {
            let count = operand_count(arg)?;
            let values = frame_ref(rt)?.top_values(count)?;
            let tuple = rt.new_tuple_from(&values)?;
            let frame = frame(rt)?;
            frame.drop_values(count)?;
            frame.push(tuple);
        }
        Bytecode::LoadAttr => {
            let name = name_at(rt, arg)?;
            let object = frame_ref(rt)?.peek(0)?;
            let value = rt.get_attribute(object, name)?;
            frame(rt)?.set_peek(0, value)?;
        }
        Bytecode::LoadAttrCached => load_attr_cached(rt, arg, false)?,
        Bytecode::LoadMethod => {
            let name = name_at(rt, arg)?;
            let object = frame_ref(rt)?.peek(0)?;
            let method = rt.lookup_method(object, name)?;
            push_method(rt, method)?;
        }
        Bytecode::LoadMethodCached => load_attr_cached(rt, arg, true)?,
        Bytecode::CallMethod => {
            let count = operand_count(arg)?;
            let frame = frame_ref(rt)?;
            let marker = frame.peek(count + 1)?;
            let (callable, args) = if marker.is_unbound() {
                (frame.peek(count)?, frame.top_values(count)?)
            } else {
                (marker, frame.top_values(count + 1)?)
            };
            call_value(rt, callable, &args, &[], count + 2)?;
        }
        Bytecode::CompareOp => {
            let op = compare_op(arg)?;
            let (left, right) = top_two(rt)?;
            let result = rt.compare_operation(op, left, right)?;
            replace_top_two(rt, result)?;
        }
        Bytecode::CompareIs => {
            let (left, right) = top_two(rt)?;
            replace_top_two(rt, RawObject::bool(left == right))?;
        }
        Bytecode::CompareIsNot => {
            let (left, right) = top_two(rt)?;
            replace_top_two(rt, RawObject::bool(left != right))?;
        }
        Bytecode::BinaryOpCached => {
            let op = binary_op(original_arg(rt, arg)?)?;
            cached_operation(rt, arg, CachedOperator::Binary(op))?;
        }
        Bytecode::InplaceOpCached => {
            let op = binary_op(original_arg(rt, arg)?)?;
            cached_operation(rt, arg, CachedOperator::Inplace(op))?;
        }
        Bytecode::CompareOpCached => {
            let op = compare_op(original_arg(rt, arg)?)?;
            cached_operation(rt, arg, CachedOperator::Compare(op))?;
        }
        Bytecode::JumpForward => {
            frame(rt)?.pc += operand_count(arg)?;
        }
        Bytecode::JumpAbsolute => {
            frame(rt)?.pc = operand_count(arg)?;
        }
        Bytecode::PopJumpIfFalse | Bytecode::PopJumpIfTrue => {
            let value = frame_ref(rt)?.peek(0)?;
            let truth = rt.is_true(value)?;
            let frame = frame(rt)?;
            frame.pop()?;
            if truth == (bc == Bytecode::PopJumpIfTrue) {
                frame.pc = operand_count(arg)?;
            }
        }
        Bytecode::JumpIfFalseOrPop | Bytecode::JumpIfTrueOrPop => {
            let value = frame_ref(rt)?.peek(0)?;
            let truth = rt.is_true(value)?;
            let frame = frame(rt)?;
            if truth == (bc == Bytecode::JumpIfTrueOrPop) {
                frame.pc = operand_count(arg)?;
            } else {
                frame.pop()?;
            }
        }
        Bytecode::LoadGlobal => load_global(rt, arg)?,
        Bytecode::LoadGlobalCached => {
            let caches = Function::from_raw(frame_ref(rt)?.function).caches(&rt.heap);
            match ic::ic_lookup_global_var(&rt.heap, caches, operand_count(arg)?) {
                Some(value) => frame(rt)?.push(value),
                None => load_global(rt, arg)?,
            }
        }
        Bytecode::SetupFinally => {
            let frame = frame(rt)?;
            let handler = frame.pc + operand_count(arg)?;
            let level = frame.stack.len();
            frame.push_block(TryBlock {
                kind: BlockKind::SetupFinally,
                handler,
                level,
                saved_exception: RawObject::none(),
            })?;
        }
        Bytecode::LoadFast | Bytecode::LoadFastReverse => {
            let index = local_index(rt, arg, bc == Bytecode::LoadFastReverse)?;
            let value = frame_ref(rt)?.locals[index];
            if value.is_unbound() {
                return Err(unbound_local(rt, index));
            }
            frame(rt)?.push(value);
        }
        Bytecode::StoreFast | Bytecode::StoreFastReverse => {
            let index = local_index(rt, arg, bc == Bytecode::StoreFastReverse)?;
            let frame = frame(rt)?;
            let value = frame.pop()?;
            frame.locals[index] = value;
        }
        Bytecode::DeleteFast => {
            let index = local_index(rt, arg, false)?;
            if frame_ref(rt)?.locals[index].is_unbound() {
                return Err(unbound_local(rt, index));
            }
            frame(rt)?.locals[index] = RawObject::unbound();
        }
        Bytecode::RaiseVarargs => return Err(raise(rt, arg)?),
        Bytecode::CallFunction => {
            let count = operand_count(arg)?;
            let frame = frame_ref(rt)?;
            let callable = frame.peek(count)?;
            let args = frame.top_values(count)?;
            call_value(rt, callable, &args, &[], count + 1)?;
        }
        Bytecode::CallFunctionKw => {
            let count = operand_count(arg)?;
            let frame = frame_ref(rt)?;
            let names = frame.peek(0)?;
            let callable = frame.peek(count + 1)?;
            let mut args = frame.top_values(count + 1)?;
            args.pop();
            let kwnames = rt.tuple_items(names).ok_or_else(|| {
                VmError::new(ErrorKind::SystemError, "CALL_FUNCTION_KW expects a tuple of names")
            })?;
            call_value(rt, callable, &args, &kwnames, count + 2)?;
        }
        Bytecode::MakeFunction => make_function(rt, arg)?,
        _ => {
            return Err(VmError::new(
                ErrorKind::SystemError,
                format!("unhandled opcode {}", bc.name()),
            ))
        }
    }
    Ok(None)
}

fn no_frame() -> VmError {
    VmError::fatal("no frame is executing")
}

fn frame(rt: &mut Runtime) -> VmResult<&mut Frame> {
    rt.thread.frames.last_mut().ok_or_else(no_frame)
}

fn frame_ref(rt: &Runtime) -> VmResult<&Frame> {
    rt.thread.frames.last().ok_or_else(no_frame)
}

fn function_code(rt: &Runtime) -> VmResult<RawObject> {
    Ok(Function::from_raw(frame_ref(rt)?.function).code(&rt.heap))
}

fn operand_count(arg: i32) -> VmResult<usize> {
    usize::try_from(arg).map_err(|_| VmError::new(ErrorKind::SystemError, format!("bad operand {}", arg)))
}

fn tuple_entry(rt: &Runtime, tuple: RawObject, arg: i32, what: &str) -> VmResult<RawObject> {
    let index = operand_count(arg)?;
    Tuple::cast(&rt.heap, tuple)
        .filter(|tuple| index < tuple.length(&rt.heap))
        .map(|tuple| tuple.at(&rt.heap, index))
        .ok_or_else(|| VmError::new(ErrorKind::SystemError, format!("{} index {} out of range", what, index)))
}

fn name_at(rt: &Runtime, arg: i32) -> VmResult<RawObject> {
    let names = Code::from_raw(function_code(rt)?).names(&rt.heap);
    tuple_entry(rt, names, arg, "name")
}

fn original_arg(rt: &Runtime, cache: i32) -> VmResult<i32> {
    let function = frame_ref(rt)?.function;
    ic::ic_original_arg(&rt.heap, function, operand_count(cache)?).ok_or_else(|| {
        VmError::new(ErrorKind::SystemError, format!("cache {} has no original argument", cache))
    })
}

fn binary_op(arg: i32) -> VmResult<BinaryOp> {
    BinaryOp::from_arg(arg).ok_or_else(|| VmError::new(ErrorKind::SystemError, format!("bad binary operator {}", arg)))
}

fn compare_op(arg: i32) -> VmResult<CompareOp> {
    CompareOp::from_arg(arg).ok_or_else(|| VmError::new(ErrorKind::SystemError, format!("bad comparison {}", arg)))
}

fn name_error(rt: &Runtime, name: RawObject) -> VmError {
    VmError::new(
        ErrorKind::NameError,
        format!("name '{}' is not defined", rt.str_value(name).unwrap_or_default()),
    )
}

fn unbound_local(rt: &Runtime, index: usize) -> VmError {
    let name = function_code(rt)
        .ok()
        .map(|code| Code::from_raw(code).varnames(&rt.heap))
        .and_then(|varnames| Tuple::cast(&rt.heap, varnames).filter(|t| index < t.length(&rt.heap)))
        .and_then(|varnames| rt.str_value(varnames.at(&rt.heap, index)))
        .unwrap_or_default();
    VmError::new(
        ErrorKind::NameError,
        format!("local variable '{}' referenced before assignment", name),
    )
}

/// Slot of local `arg`. Reversed opcodes count from the last slot.
fn local_index(rt: &Runtime, arg: i32, reversed: bool) -> VmResult<usize> {
    let total = frame_ref(rt)?.locals.len();
    let arg = operand_count(arg)?;
    let index = if reversed { total.checked_sub(arg + 1) } else { Some(arg) };
    index
        .filter(|index| *index < total)
        .ok_or_else(|| VmError::new(ErrorKind::SystemError, format!("local index {} out of range", arg)))
}

/// TOS1 and TOS.
fn top_two(rt: &Runtime) -> VmResult<(RawObject, RawObject)> {
    let frame = frame_ref(rt)?;
    Ok((frame.peek(1)?, frame.peek(0)?))
}

/// TOS and TOS1.
fn top_two_reversed(rt: &Runtime) -> VmResult<(RawObject, RawObject)> {
    let frame = frame_ref(rt)?;
    Ok((frame.peek(0)?, frame.peek(1)?))
}

fn replace_top_two(rt: &mut Runtime, value: RawObject) -> VmResult<()> {
    let frame = frame(rt)?;
    frame.drop_values(2)?;
    frame.push(value);
    Ok(())
}

fn unary_operation(rt: &mut Runtime, selector: &str) -> VmResult<()> {
    let operand = frame_ref(rt)?.peek(0)?;
    let result = rt.unary_operation(selector, operand)?;
    frame(rt)?.set_peek(0, result)
}

fn binary_operation(rt: &mut Runtime, op: BinaryOp, inplace: bool) -> VmResult<()> {
    let (left, right) = top_two(rt)?;
    let result = if inplace {
        rt.inplace_operation(op, left, right)?
    } else {
        rt.binary_operation(op, left, right)?
    };
    replace_top_two(rt, result)
}

#[derive(Debug, Clone, Copy)]
enum CachedOperator {
    Binary(BinaryOp),
    Inplace(BinaryOp),
    Compare(CompareOp),
}

/// An operator site with an inline cache keyed by both operand layouts.
fn cached_operation(rt: &mut Runtime, cache: i32, operator: CachedOperator) -> VmResult<()> {
    let index = operand_count(cache)?;
    let function = frame_ref(rt)?.function;
    let (left, right) = top_two(rt)?;
    let caches = Function::from_raw(function).caches(&rt.heap);
    let left_layout = rt.heap.layout_id_of(left);
    let right_layout = rt.heap.layout_id_of(right);
    if let Some((method, flags)) = ic::ic_lookup_binop(&rt.heap, caches, index, left_layout, right_layout) {
        let result = rt.call_cached_operator(method, flags, left, right)?;
        if result != rt.not_implemented() {
            return replace_top_two(rt, result);
        }
    }
    let (left, right) = top_two(rt)?;
    let (result, resolved) = match operator {
        CachedOperator::Binary(op) => rt.binary_operation_resolved(op, left, right)?,
        CachedOperator::Inplace(op) => rt.inplace_operation_resolved(op, left, right)?,
        CachedOperator::Compare(op) => rt.compare_operation_resolved(op, left, right)?,
    };
    replace_top_two(rt, result)?;
    let Some((method, flags)) = resolved else {
        return Ok(());
    };
    let function = frame_ref(rt)?.function;
    let caches = Function::from_raw(function).caches(&rt.heap);
    ic::ic_update_binop(&mut rt.heap, caches, index, left_layout, right_layout, method, flags);
    match operator {
        CachedOperator::Binary(op) => {
            ic::ic_insert_binary_op_dependencies(rt, function, left_layout, right_layout, op)
        }
        CachedOperator::Inplace(op) => {
            ic::ic_insert_inplace_op_dependencies(rt, function, left_layout, right_layout, op)
        }
        CachedOperator::Compare(op) => {
            ic::ic_insert_compare_op_dependencies(rt, function, left_layout, right_layout, op)
        }
    }
}

/// Replace the receiver on top of the stack with the pair CALL_METHOD
/// expects: the function and its receiver, or Unbound and a plain value.
fn push_method(rt: &mut Runtime, method: Method) -> VmResult<()> {
    let frame = frame(rt)?;
    let receiver = frame.peek(0)?;
    match method {
        Method::Unbound(function) => {
            frame.set_peek(0, function)?;
            frame.push(receiver);
        }
        Method::Value(value) => {
            frame.set_peek(0, RawObject::unbound())?;
            frame.push(value);
        }
    }
    Ok(())
}

fn load_attr_cached(rt: &mut Runtime, cache: i32, as_method: bool) -> VmResult<()> {
    let index = operand_count(cache)?;
    let (function, object) = {
        let frame = frame_ref(rt)?;
        (frame.function, frame.peek(0)?)
    };
    let caches = Function::from_raw(function).caches(&rt.heap);
    let layout = rt.heap.layout_id_of(object);
    let cached = ic::ic_lookup_attr(&rt.heap, caches, index, layout);
    if let Some(location) = AttributeLocation::from_cache_value(cached) {
        let value = rt.read_location(object, location);
        if !value.is_unbound() {
            return if as_method {
                push_method(rt, Method::Value(value))
            } else {
                frame(rt)?.set_peek(0, value)
            };
        }
    } else if rt.is_function(cached) {
        if as_method {
            return push_method(rt, Method::Unbound(cached));
        }
        let bound = rt.new_bound_method(cached, object)?;
        return frame(rt)?.set_peek(0, bound);
    }

    let name = name_at(rt, original_arg(rt, cache)?)?;
    if let Some(value) = rt.attribute_cache_value(object, name)? {
        ic::ic_update_attr(rt, caches, index, layout, value, name, function)?;
    }
    let name = name_at(rt, original_arg(rt, cache)?)?;
    let object = frame_ref(rt)?.peek(0)?;
    if as_method {
        let method = rt.lookup_method(object, name)?;
        push_method(rt, method)
    } else {
        let value = rt.get_attribute(object, name)?;
        frame(rt)?.set_peek(0, value)
    }
}

fn store_attr_cached(rt: &mut Runtime, cache: i32) -> VmResult<()> {
    let index = operand_count(cache)?;
    let function = frame_ref(rt)?.function;
    let (object, value) = top_two_reversed(rt)?;
    let caches = Function::from_raw(function).caches(&rt.heap);
    let layout = rt.heap.layout_id_of(object);
    let cached = ic::ic_lookup_attr(&rt.heap, caches, index, layout);
    if let Some(location) = AttributeLocation::from_cache_value(cached) {
        rt.write_location(object, location, value);
        return frame(rt)?.drop_values(2);
    }
    let name = name_at(rt, original_arg(rt, cache)?)?;
    if let Some(location) = rt.set_attribute(object, name, value)? {
        let function = frame_ref(rt)?.function;
        let caches = Function::from_raw(function).caches(&rt.heap);
        let name = name_at(rt, original_arg(rt, cache)?)?;
        ic::ic_update_attr(rt, caches, index, layout, location.to_cache_value(), name, function)?;
    }
    frame(rt)?.drop_values(2)
}

/// Whether the frame's name namespace is its globals dict.
fn names_are_globals(rt: &Runtime) -> VmResult<(RawObject, bool)> {
    let frame = frame_ref(rt)?;
    Ok((frame.names, frame.names == frame.globals))
}

fn store_name(rt: &mut Runtime, arg: i32) -> VmResult<()> {
    let name = name_at(rt, arg)?;
    let value = frame_ref(rt)?.peek(0)?;
    let (names, global) = names_are_globals(rt)?;
    if global {
        let cell = rt.global_at_put(names, name, value)?;
        trace!("module name bound in cell {:?}", cell);
    } else {
        rt.dict_at_put(names, name, value)?;
    }
    frame(rt)?.pop()?;
    Ok(())
}

fn delete_name(rt: &mut Runtime, arg: i32) -> VmResult<()> {
    let name = name_at(rt, arg)?;
    let (names, global) = names_are_globals(rt)?;
    let removed = if global {
        rt.global_remove(names, name)?
    } else {
        rt.dict_remove(names, name)?.is_some()
    };
    if !removed {
        return Err(name_error(rt, name));
    }
    Ok(())
}

fn load_name(rt: &mut Runtime, arg: i32) -> VmResult<()> {
    let name = name_at(rt, arg)?;
    let (names, global) = names_are_globals(rt)?;
    if !global {
        if let Some(value) = rt.dict_at(names, name)? {
            frame(rt)?.push(value);
            return Ok(());
        }
    }
    let globals = frame_ref(rt)?.globals;
    let value = match rt.global_at(globals, name)? {
        Some(value) => Some(value),
        None => rt.builtin_at(name)?,
    };
    let value = value.ok_or_else(|| name_error(rt, name))?;
    frame(rt)?.push(value);
    Ok(())
}

fn load_global(rt: &mut Runtime, arg: i32) -> VmResult<()> {
    let name = name_at(rt, arg)?;
    let (function, globals) = {
        let frame = frame_ref(rt)?;
        (frame.function, frame.globals)
    };
    if let Some(cell) = rt.global_cell(globals, name)? {
        let cell_view = ValueCell::from_raw(cell);
        if !cell_view.is_placeholder(&rt.heap) {
            let value = cell_view.value(&rt.heap);
            frame(rt)?.push(value);
            return ic::ic_update_global_var(rt, function, operand_count(arg)?, cell);
        }
    }
    match rt.builtin_at(name)? {
        Some(value) => {
            frame(rt)?.push(value);
            Ok(())
        }
        None => Err(name_error(rt, name)),
    }
}

fn store_global(rt: &mut Runtime, arg: i32) -> VmResult<()> {
    let name = name_at(rt, arg)?;
    let (globals, value) = {
        let frame = frame_ref(rt)?;
        (frame.globals, frame.peek(0)?)
    };
    let cell = rt.global_at_put(globals, name, value)?;
    let frame = frame(rt)?;
    frame.pop()?;
    let function = frame.function;
    ic::ic_update_global_var(rt, function, operand_count(arg)?, cell)
}

/// Call the callable `consumed` entries deep with `args`. Bytecode
/// functions get a new frame in this loop; anything else runs to
/// completion and its result replaces the call values.
fn call_value(
    rt: &mut Runtime,
    callable: RawObject,
    args: &[RawObject],
    kwnames: &[RawObject],
    consumed: usize,
) -> VmResult<()> {
    if let Some((function, receiver)) = rt.unwrap_callable(callable) {
        let code = Code::from_raw(Function::from_raw(function).code(&rt.heap));
        if !code.is_builtin(&rt.heap) {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.extend(receiver);
            full.extend_from_slice(args);
            let (function, locals) = rt.with_handles(|rt| {
                let function = rt.new_handle(function);
                let locals = rt.bind_arguments(rt.handle(function), &full, kwnames)?;
                Ok((rt.handle(function), locals))
            })?;
            frame(rt)?.drop_values(consumed)?;
            return push_frame(rt, function, locals, None, false);
        }
    }
    let result = rt.call_kw(callable, args, kwnames)?;
    let frame = frame(rt)?;
    frame.drop_values(consumed)?;
    frame.push(result);
    Ok(())
}

/// MAKE_FUNCTION: the stack holds the optional defaults tuple, keyword
/// defaults dict and annotations below the code object and qualified name.
fn make_function(rt: &mut Runtime, flags: i32) -> VmResult<()> {
    if flags & MAKE_FUNCTION_CLOSURE != 0 {
        return Err(VmError::unimplemented("closures"));
    }
    let mut depth = 2;
    if flags & MAKE_FUNCTION_ANNOTATIONS != 0 {
        depth += 1;
    }
    let kwdefaults_depth = (flags & MAKE_FUNCTION_KWDEFAULTS != 0).then(|| {
        depth += 1;
        depth - 1
    });
    let defaults_depth = (flags & MAKE_FUNCTION_DEFAULTS != 0).then(|| {
        depth += 1;
        depth - 1
    });
    let (qualname, code, globals) = {
        let frame = frame_ref(rt)?;
        (frame.peek(0)?, frame.peek(1)?, frame.globals)
    };
    if Code::cast(&rt.heap, code).is_none() {
        return Err(VmError::type_error("MAKE_FUNCTION expects a code object"));
    }
    if !rt.is_str(qualname) {
        return Err(VmError::type_error("function name must be a string"));
    }
    let function = rt.new_function(code, qualname, globals)?;
    let frame = frame(rt)?;
    let defaults = defaults_depth.map(|depth| frame.peek(depth)).transpose()?;
    let kwdefaults = kwdefaults_depth.map(|depth| frame.peek(depth)).transpose()?;
    frame.drop_values(depth)?;
    frame.push(function);
    let function = Function::from_raw(function);
    if let Some(defaults) = defaults {
        function.set_defaults(&mut rt.heap, defaults);
    }
    if let Some(kwdefaults) = kwdefaults {
        function.set_kwdefaults(&mut rt.heap, kwdefaults);
    }
    Ok(())
}

/// The exception RAISE_VARARGS raises; the error is returned to be raised.
fn raise(rt: &mut Runtime, arg: i32) -> VmResult<VmError> {
    match arg {
        0 => {
            let handled = rt.thread.handled_exception;
            if handled.is_none() {
                return Ok(VmError::new(ErrorKind::RuntimeError, "No active exception to reraise"));
            }
            Ok(rt.raise_object(handled))
        }
        1 => {
            let value = frame_ref(rt)?.peek(0)?;
            let exception = make_exception(rt, value)?;
            frame(rt)?.pop()?;
            Ok(rt.raise_object(exception))
        }
        2 => {
            let (value, cause) = top_two(rt)?;
            let exception = rt.with_handles(|rt| {
                let cause = rt.new_handle(cause);
                let exception = make_exception(rt, value)?;
                let exception = rt.new_handle(exception);
                let cause = match rt.handle(cause) {
                    cause if cause.is_none() => cause,
                    cause => make_exception(rt, cause)?,
                };
                let exception = rt.handle(exception);
                rt.heap.set_field(exception, exception_fields::CAUSE, cause);
                Ok(exception)
            })?;
            frame(rt)?.drop_values(2)?;
            Ok(rt.raise_object(exception))
        }
        _ => Err(VmError::new(ErrorKind::SystemError, "bad RAISE_VARARGS oparg")),
    }
}

/// An exception instance from a raised value, instantiating exception
/// types with no arguments.
fn make_exception(rt: &mut Runtime, value: RawObject) -> VmResult<RawObject> {
    if rt.is_exception_type(value) {
        let exception = rt.call(value, &[])?;
        if !rt.is_exception(exception) {
            return Err(VmError::type_error(format!(
                "calling {} should have returned an instance of BaseException, not {}",
                rt.type_name(value),
                rt.type_name_of(exception)
            )));
        }
        return Ok(exception);
    }
    if rt.is_exception(value) {
        return Ok(value);
    }
    Err(VmError::type_error("exceptions must derive from BaseException"))
}
