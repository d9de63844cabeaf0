//! Bytecode rewriting for inline caches.
//!
//! When a function is created its bytecode is copied and specialized:
//! attribute and operator sites get a cache index as their argument and the
//! original argument moves to a side table, constants that are immediates
//! load without touching the constants tuple, and local accesses address
//! the frame from the end. The first `ceil(names / 8)` cache lines are
//! reserved for global variables, so global name `i` owns word `i` of the
//! caches tuple and LOAD_GLOBAL sites keep their name index.

use bytecode_system::{Bytecode, BytecodeOp, BytecodeOps, CompareOp, CODE_UNIT_SIZE};
use core_types::{object_from_oparg, oparg_from_object, RawObject};
use log::debug;
use memory_manager::{Code, Heap, Tuple};

use crate::ic::IC_POINTERS_PER_CACHE;

/// Caches a function may have; cache indices must fit a one-byte argument.
pub const MAX_CACHES: usize = 256;

/// Output of [`rewrite_bytecode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteResult {
    /// The specialized bytecode
    pub bytecode: Vec<u8>,
    /// Cache lines to allocate, global lines included
    pub num_caches: usize,
    /// Original argument of each cache line; None for global lines
    pub original_arguments: Vec<Option<i32>>,
}

#[derive(Debug, Clone, Copy)]
struct Rewritten {
    bytecode: Bytecode,
    arg: i32,
    needs_cache: bool,
}

impl Rewritten {
    fn cached(bytecode: Bytecode, arg: i32) -> Self {
        Rewritten {
            bytecode,
            arg,
            needs_cache: true,
        }
    }

    fn plain(bytecode: Bytecode, arg: i32) -> Self {
        Rewritten {
            bytecode,
            arg,
            needs_cache: false,
        }
    }
}

/// Cache lines reserved for global variables of a code with `num_names` names.
pub fn global_cache_lines(num_names: usize) -> usize {
    num_names.div_ceil(IC_POINTERS_PER_CACHE)
}

fn rewrite_operation(heap: &Heap, code: Code, op: BytecodeOp) -> Option<Rewritten> {
    let bytecode = op.bytecode()?;
    if let Some(binop) = bytecode.binary_op() {
        return Some(Rewritten::cached(Bytecode::BinaryOpCached, binop as i32));
    }
    if let Some(binop) = bytecode.inplace_op() {
        return Some(Rewritten::cached(Bytecode::InplaceOpCached, binop as i32));
    }
    match bytecode {
        Bytecode::LoadAttr => Some(Rewritten::cached(Bytecode::LoadAttrCached, op.arg)),
        Bytecode::LoadMethod => Some(Rewritten::cached(Bytecode::LoadMethodCached, op.arg)),
        Bytecode::StoreAttr => Some(Rewritten::cached(Bytecode::StoreAttrCached, op.arg)),
        Bytecode::CompareOp => match CompareOp::from_arg(op.arg)? {
            CompareOp::Is => Some(Rewritten::plain(Bytecode::CompareIs, 0)),
            CompareOp::IsNot => Some(Rewritten::plain(Bytecode::CompareIsNot, 0)),
            compare if compare.is_rich() => Some(Rewritten::cached(Bytecode::CompareOpCached, op.arg)),
            _ => None,
        },
        Bytecode::LoadFast | Bytecode::StoreFast => {
            let index = usize::try_from(op.arg).ok()?;
            let total = code.total_locals(heap);
            if index >= code.nlocals(heap) || index >= total {
                return None;
            }
            let reversed = (total - index - 1) as i32;
            let bytecode = if bytecode == Bytecode::LoadFast {
                Bytecode::LoadFastReverse
            } else {
                Bytecode::StoreFastReverse
            };
            Some(Rewritten::plain(bytecode, reversed))
        }
        Bytecode::LoadConst => {
            let consts = Tuple::from_raw(code.consts(heap));
            let index = usize::try_from(op.arg).ok().filter(|i| *i < consts.length(heap))?;
            let constant = consts.at(heap, index);
            // Only immediates whose bits survive truncation to one byte qualify
            if constant.is_heap_object() || object_from_oparg(oparg_from_object(constant)) != constant {
                return None;
            }
            Some(Rewritten::plain(
                Bytecode::LoadImmediate,
                oparg_from_object(constant) as u8 as i32,
            ))
        }
        _ => None,
    }
}

/// Write `bytecode arg` over the instruction occupying `begin..end`,
/// clearing its EXTENDED_ARG prefixes. Returns false when `arg` does not
/// fit the prefixes available.
fn patch(buffer: &mut [u8], begin: usize, end: usize, bytecode: Bytecode, arg: i32) -> bool {
    let units = (end - begin) / CODE_UNIT_SIZE;
    if units == 0 || arg < 0 || (units < 4 && arg >> (8 * units) != 0) {
        return false;
    }
    let extended_arg = Bytecode::ExtendedArg.byte();
    for unit in 0..units - 1 {
        let shift = 8 * (units - 1 - unit);
        let offset = begin + unit * CODE_UNIT_SIZE;
        buffer[offset] = extended_arg;
        buffer[offset + 1] = if shift < 32 { (arg >> shift) as u8 } else { 0 };
    }
    buffer[end - CODE_UNIT_SIZE] = bytecode.byte();
    buffer[end - CODE_UNIT_SIZE + 1] = arg as u8;
    true
}

/// Specialize the bytecode of `code`.
///
/// With caching disabled the bytecode is copied unchanged and no caches
/// are requested. When the sites would need [`MAX_CACHES`] or more cache
/// lines the bytecode also stays generic and only the global lines are
/// allocated.
pub fn rewrite_bytecode(heap: &Heap, code_object: RawObject, cache_enabled: bool) -> RewriteResult {
    let code = Code::from_raw(code_object);
    let mut bytecode = heap.bytes_of(code.code(heap));
    if !cache_enabled {
        return RewriteResult {
            bytecode,
            num_caches: 0,
            original_arguments: Vec::new(),
        };
    }
    let num_names = Tuple::from_raw(code.names(heap)).length(heap);
    let global_lines = global_cache_lines(num_names);

    let ops: Vec<(usize, usize, BytecodeOp)> = BytecodeOps::new(&bytecode).collect();
    let sites = ops
        .iter()
        .filter(|(_, _, op)| rewrite_operation(heap, code, *op).is_some_and(|r| r.needs_cache))
        .count();
    if global_lines + sites >= MAX_CACHES {
        debug!(
            "not rewriting bytecode: {} cache lines would be needed",
            global_lines + sites
        );
        return RewriteResult {
            bytecode,
            num_caches: global_lines,
            original_arguments: Vec::new(),
        };
    }

    let mut original_arguments = vec![None; global_lines];
    for (position, (begin, end, op)) in ops.iter().enumerate() {
        let Some(rewritten) = rewrite_operation(heap, code, *op) else {
            continue;
        };
        if rewritten.needs_cache {
            let cache = original_arguments.len();
            let mut target = rewritten.bytecode;
            let mut call_method_at = None;
            if op.is(Bytecode::LoadAttr) {
                // `x.attr()` becomes a method call that skips the bound method
                if let Some((_, next_end, next)) = ops.get(position + 1) {
                    if next.is(Bytecode::CallFunction) && next.arg == 0 {
                        target = Bytecode::LoadMethodCached;
                        call_method_at = Some(next_end - CODE_UNIT_SIZE);
                    }
                }
            }
            if !patch(&mut bytecode, *begin, *end, target, cache as i32) {
                debug!("cache index {} does not fit the site at {}", cache, begin);
                continue;
            }
            if let Some(offset) = call_method_at {
                bytecode[offset] = Bytecode::CallMethod.byte();
            }
            original_arguments.push(Some(rewritten.arg));
        } else if (rewritten.bytecode.byte() != op.opcode || rewritten.arg != op.arg)
            && !patch(&mut bytecode, *begin, *end, rewritten.bytecode, rewritten.arg)
        {
            debug!("argument {} does not fit the site at {}", rewritten.arg, begin);
        }
    }
    RewriteResult {
        bytecode,
        num_caches: original_arguments.len(),
        original_arguments,
    }
}
