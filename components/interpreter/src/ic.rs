//! Inline caches and their invalidation.
//!
//! A function's caches tuple starts with one word per global name, each
//! holding the ValueCell of that global once a LOAD_GLOBAL or STORE_GLOBAL
//! site resolved it. The remaining words form cache lines of
//! [`IC_ENTRIES_PER_CACHE`] (key, value) entries, one line per rewritten
//! attribute or operator site.
//!
//! Attribute keys are the receiver's layout id. Operator keys pack the left
//! and right layout ids with [`BinaryOpFlags`]. A key of None marks an empty
//! entry.
//!
//! Cached values stay correct through dependency links: every function that
//! cached something derived from a type attribute or a global is recorded in
//! a weak list on the ValueCell it depends on, and mutating that cell evicts
//! the affected entries.

use bytecode_system::{BinaryOp, Bytecode, BytecodeOps, CompareOp, CODE_UNIT_SIZE};
use core_types::{LayoutId, RawObject, VmResult, BITS_PER_BYTE};
use log::{trace, warn};
use memory_manager::{Code, Function, Heap, MutableBytes, Tuple, Type, ValueCell, WeakLink};

use crate::runtime::Runtime;

/// Words per cache entry: key and value.
pub const IC_POINTERS_PER_ENTRY: usize = 2;
/// Entries per cache line.
pub const IC_ENTRIES_PER_CACHE: usize = 4;
/// Words per cache line.
pub const IC_POINTERS_PER_CACHE: usize = IC_POINTERS_PER_ENTRY * IC_ENTRIES_PER_CACHE;

const IC_ENTRY_KEY_OFFSET: usize = 0;
const IC_ENTRY_VALUE_OFFSET: usize = 1;

/// How a cached operator method is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpFlags {
    /// `left.__op__(right)`
    None = 0,
    /// `right.__rop__(left)`
    Reflected = 1,
}

impl BinaryOpFlags {
    fn from_bits(bits: i64) -> Self {
        if bits & 1 != 0 {
            BinaryOpFlags::Reflected
        } else {
            BinaryOpFlags::None
        }
    }
}

fn layout_key(layout_id: LayoutId) -> RawObject {
    RawObject::small_int(layout_id.raw() as i64)
}

fn binop_key_high_bits(left: LayoutId, right: LayoutId) -> i64 {
    (left.raw() as i64) << LayoutId::BITS | right.raw() as i64
}

fn binop_key_layouts(key: RawObject) -> Option<(LayoutId, LayoutId)> {
    let high = key.as_small_int()? >> BITS_PER_BYTE;
    let mask = (1i64 << LayoutId::BITS) - 1;
    Some((
        LayoutId::from_raw((high >> LayoutId::BITS) as u32),
        LayoutId::from_raw((high & mask) as u32),
    ))
}

fn entries(index: usize) -> impl Iterator<Item = usize> {
    let start = index * IC_POINTERS_PER_CACHE;
    (start..start + IC_POINTERS_PER_CACHE).step_by(IC_POINTERS_PER_ENTRY)
}

fn line_fits(heap: &Heap, caches: RawObject, index: usize) -> bool {
    Tuple::cast(heap, caches).is_some_and(|caches| (index + 1) * IC_POINTERS_PER_CACHE <= caches.length(heap))
}

// ----------------------------------------------------------------------
// Lookup and update
// ----------------------------------------------------------------------

/// Value cached for `layout_id` in line `index`, or NotFound.
pub fn ic_lookup_attr(heap: &Heap, caches: RawObject, index: usize, layout_id: LayoutId) -> RawObject {
    if !line_fits(heap, caches, index) {
        return RawObject::error_not_found();
    }
    let caches = Tuple::from_raw(caches);
    let key = layout_key(layout_id);
    entries(index)
        .find(|i| caches.at(heap, i + IC_ENTRY_KEY_OFFSET) == key)
        .map_or_else(RawObject::error_not_found, |i| caches.at(heap, i + IC_ENTRY_VALUE_OFFSET))
}

/// Method cached for the operand layouts in line `index`.
pub fn ic_lookup_binop(
    heap: &Heap,
    caches: RawObject,
    index: usize,
    left: LayoutId,
    right: LayoutId,
) -> Option<(RawObject, BinaryOpFlags)> {
    if !line_fits(heap, caches, index) {
        return None;
    }
    let caches = Tuple::from_raw(caches);
    let high = binop_key_high_bits(left, right);
    entries(index).find_map(|i| {
        let key = caches.at(heap, i + IC_ENTRY_KEY_OFFSET).as_small_int()?;
        (key >> BITS_PER_BYTE == high).then(|| {
            (
                caches.at(heap, i + IC_ENTRY_VALUE_OFFSET),
                BinaryOpFlags::from_bits(key),
            )
        })
    })
}

/// Value of the global cached at word `index`, if resolved.
pub fn ic_lookup_global_var(heap: &Heap, caches: RawObject, index: usize) -> Option<RawObject> {
    let caches = Tuple::cast(heap, caches)?;
    if index >= caches.length(heap) {
        return None;
    }
    let cell = ValueCell::cast(heap, caches.at(heap, index))?;
    (!cell.is_placeholder(heap)).then(|| cell.value(heap))
}

/// Whether no entry of line `index` is in use.
pub fn ic_is_cache_empty(heap: &Heap, caches: RawObject, index: usize) -> bool {
    let caches = Tuple::from_raw(caches);
    entries(index).all(|i| caches.at(heap, i + IC_ENTRY_KEY_OFFSET).is_none())
}

/// The argument a rewritten site had before it was given cache `index`.
pub fn ic_original_arg(heap: &Heap, function: RawObject, index: usize) -> Option<i32> {
    let originals = Tuple::cast(heap, Function::from_raw(function).original_arguments(heap))?;
    if index >= originals.length(heap) {
        return None;
    }
    originals.at(heap, index).as_small_int().map(|arg| arg as i32)
}

/// Entry of line `index` to write for `matches`: the matching or first
/// empty entry, or the last one when the line is full.
fn entry_to_write(heap: &Heap, caches: Tuple, index: usize, matches: impl Fn(RawObject) -> bool) -> usize {
    entries(index)
        .find(|i| {
            let key = caches.at(heap, i + IC_ENTRY_KEY_OFFSET);
            key.is_none() || matches(key)
        })
        .unwrap_or_else(|| {
            warn!("inline cache line {} is full, overwriting its last entry", index);
            index * IC_POINTERS_PER_CACHE + IC_POINTERS_PER_CACHE - IC_POINTERS_PER_ENTRY
        })
}

/// Cache `value` for receivers with `layout_id` at line `index` and record
/// `dependent` on the type attribute `name` the value was resolved from.
pub fn ic_update_attr(
    rt: &mut Runtime,
    caches: RawObject,
    index: usize,
    layout_id: LayoutId,
    value: RawObject,
    name: RawObject,
    dependent: RawObject,
) -> VmResult<()> {
    if !line_fits(&rt.heap, caches, index) {
        return Ok(());
    }
    let key = layout_key(layout_id);
    let tuple = Tuple::from_raw(caches);
    let entry = entry_to_write(&rt.heap, tuple, index, |existing| existing == key);
    tuple.at_put(&mut rt.heap, entry + IC_ENTRY_KEY_OFFSET, key);
    tuple.at_put(&mut rt.heap, entry + IC_ENTRY_VALUE_OFFSET, value);
    trace!("cached attribute for layout {} in line {}", layout_id.raw(), index);

    let ty = rt.type_at(layout_id)?;
    if !Type::from_raw(ty).is_sealed(&rt.heap) {
        ic_insert_dependency_for_type_lookup_in_mro(rt, ty, name, dependent)?;
    }
    Ok(())
}

/// Cache the operator method `value` for the operand layouts at line `index`.
pub fn ic_update_binop(
    heap: &mut Heap,
    caches: RawObject,
    index: usize,
    left: LayoutId,
    right: LayoutId,
    value: RawObject,
    flags: BinaryOpFlags,
) {
    if !line_fits(heap, caches, index) {
        return;
    }
    let high = binop_key_high_bits(left, right);
    let tuple = Tuple::from_raw(caches);
    let entry = entry_to_write(heap, tuple, index, |existing| {
        existing.as_small_int().is_some_and(|key| key >> BITS_PER_BYTE == high)
    });
    let key = RawObject::small_int(high << BITS_PER_BYTE | flags as i64);
    tuple.at_put(heap, entry + IC_ENTRY_KEY_OFFSET, key);
    tuple.at_put(heap, entry + IC_ENTRY_VALUE_OFFSET, value);
    trace!(
        "cached operator for layouts ({}, {}) in line {}",
        left.raw(),
        right.raw(),
        index
    );
}

/// Cache the cell of global name `index` in `function` and switch every
/// LOAD_GLOBAL and STORE_GLOBAL site naming it to the cached opcode.
///
/// Does nothing when the word is already populated.
pub fn ic_update_global_var(rt: &mut Runtime, function: RawObject, index: usize, cell: RawObject) -> VmResult<()> {
    let caches = Function::from_raw(function).caches(&rt.heap);
    let populated = Tuple::cast(&rt.heap, caches)
        .map_or(true, |caches| index >= caches.length(&rt.heap) || !caches.at(&rt.heap, index).is_none());
    if populated {
        return Ok(());
    }
    rt.with_handles(|rt| {
        let function_handle = rt.new_handle(function);
        let cell_handle = rt.new_handle(cell);
        ic_insert_dependent_to_value_cell_dependency_link(rt, function, cell)?;
        let function = Function::from_raw(rt.handle(function_handle));
        let cell = rt.handle(cell_handle);
        Tuple::from_raw(function.caches(&rt.heap)).at_put(&mut rt.heap, index, cell);

        let bytecode = MutableBytes::from_raw(function.rewritten_bytecode(&rt.heap));
        let bytes = bytecode.bytes(&rt.heap);
        for (_, end, op) in BytecodeOps::new(&bytes) {
            if op.arg != index as i32 {
                continue;
            }
            let cached = match op.bytecode() {
                Some(Bytecode::LoadGlobal) => Bytecode::LoadGlobalCached,
                Some(Bytecode::StoreGlobal) => Bytecode::StoreGlobalCached,
                _ => continue,
            };
            bytecode.byte_at_put(&mut rt.heap, end - CODE_UNIT_SIZE, cached.byte());
        }
        trace!("cached global {} of function {:#x}", index, function.raw().raw());
        Ok(())
    })
}

/// Forget every cached reference to the global `cell`: clear the cache
/// words holding it, revert the sites using them to the generic opcodes
/// and empty the dependency list. Collected dependents are skipped.
pub fn ic_invalidate_global_var(rt: &mut Runtime, cell: RawObject) {
    let heap = &mut rt.heap;
    let mut link = ValueCell::from_raw(cell).dependency_link(heap);
    while !link.is_none() {
        let weak_link = WeakLink::from_raw(link);
        link = weak_link.next(heap);
        let referent = weak_link.referent(heap);
        let Some(function) = Function::cast(heap, referent) else {
            continue;
        };
        let names = Tuple::from_raw(Code::from_raw(function.code(heap)).names(heap)).length(heap);
        let caches = Tuple::from_raw(function.caches(heap));
        let words = names.min(caches.length(heap));
        let Some(found) = (0..words).find(|i| caches.at(heap, *i) == cell) else {
            continue;
        };
        caches.at_put(heap, found, RawObject::none());

        let bytecode = MutableBytes::from_raw(function.rewritten_bytecode(heap));
        let bytes = bytecode.bytes(heap);
        for (_, end, op) in BytecodeOps::new(&bytes) {
            if op.arg != found as i32 {
                continue;
            }
            let generic = match op.bytecode() {
                Some(Bytecode::LoadGlobalCached) => Bytecode::LoadGlobal,
                Some(Bytecode::StoreGlobalCached) => Bytecode::StoreGlobal,
                _ => continue,
            };
            bytecode.byte_at_put(heap, end - CODE_UNIT_SIZE, generic.byte());
        }
        trace!("invalidated global {} of function {:#x}", found, referent.raw());
    }
    ValueCell::from_raw(cell).set_dependency_link(heap, RawObject::none());
}

// ----------------------------------------------------------------------
// Dependency links
// ----------------------------------------------------------------------

fn unlink(heap: &mut Heap, cell: ValueCell, link: WeakLink) {
    let prev = link.prev(heap);
    let next = link.next(heap);
    if prev.is_none() {
        cell.set_dependency_link(heap, next);
    } else {
        WeakLink::from_raw(prev).set_next(heap, next);
    }
    if !next.is_none() {
        WeakLink::from_raw(next).set_prev(heap, prev);
    }
}

/// Unlink every node whose referent was collected.
fn remove_dead_weak_links(heap: &mut Heap, cell: ValueCell) {
    let mut current = cell.dependency_link(heap);
    while !current.is_none() {
        let link = WeakLink::from_raw(current);
        current = link.next(heap);
        if link.referent(heap).is_none() {
            unlink(heap, cell, link);
        }
    }
}

/// Record `dependent` on `cell`. Returns false when it already was.
///
/// A node whose referent was collected is reused before a new head node is
/// allocated, and the other dead nodes are unlinked.
pub fn ic_insert_dependent_to_value_cell_dependency_link(
    rt: &mut Runtime,
    dependent: RawObject,
    cell: RawObject,
) -> VmResult<bool> {
    let heap = &mut rt.heap;
    let value_cell = ValueCell::from_raw(cell);
    let mut empty_link = None;
    let mut has_dead_links = false;
    let mut current = value_cell.dependency_link(heap);
    while !current.is_none() {
        let link = WeakLink::from_raw(current);
        let referent = link.referent(heap);
        if referent == dependent {
            if has_dead_links {
                remove_dead_weak_links(heap, value_cell);
            }
            return Ok(false);
        }
        if referent.is_none() {
            if empty_link.is_none() {
                empty_link = Some(link);
            } else {
                has_dead_links = true;
            }
        }
        current = link.next(heap);
    }
    if let Some(link) = empty_link {
        link.set_referent(heap, dependent);
        if has_dead_links {
            remove_dead_weak_links(heap, value_cell);
        }
        return Ok(true);
    }

    let old_head = value_cell.dependency_link(heap);
    let mut live = [cell, dependent, old_head];
    let new_head = rt.allocate_with(&mut live, |heap, live| {
        heap.create_weak_link(live[1], RawObject::none(), live[2])
    })?;
    let [cell, _, old_head] = live;
    if !old_head.is_none() {
        WeakLink::from_raw(old_head).set_prev(&mut rt.heap, new_head);
    }
    ValueCell::from_raw(cell).set_dependency_link(&mut rt.heap, new_head);
    Ok(true)
}

/// Remove the node of `dependent` from `cell`'s dependency list.
pub fn ic_delete_dependent_in_value_cell(heap: &mut Heap, cell: RawObject, dependent: RawObject) {
    let value_cell = ValueCell::from_raw(cell);
    let mut current = value_cell.dependency_link(heap);
    while !current.is_none() {
        let link = WeakLink::from_raw(current);
        if link.referent(heap) == dependent {
            unlink(heap, value_cell, link);
            return;
        }
        current = link.next(heap);
    }
}

/// The functions recorded on `cell` that are still alive, head first.
pub fn ic_dependents(heap: &Heap, cell: RawObject) -> Vec<RawObject> {
    let mut dependents = Vec::new();
    let mut current = ValueCell::from_raw(cell).dependency_link(heap);
    while !current.is_none() {
        let link = WeakLink::from_raw(current);
        let referent = link.referent(heap);
        if !referent.is_none() {
            dependents.push(referent);
        }
        current = link.next(heap);
    }
    dependents
}

/// Record `dependent` on the cells a lookup of `name` through the MRO of
/// `ty` depends on: the cell of `ty` itself, which is created as a
/// placeholder when `ty` does not define `name`, and the first ancestor
/// cell that holds a value. Ancestors without a cell are left alone.
pub fn ic_insert_dependency_for_type_lookup_in_mro(
    rt: &mut Runtime,
    ty: RawObject,
    name: RawObject,
    dependent: RawObject,
) -> VmResult<()> {
    rt.with_handles(|rt| {
        let name = rt.new_handle(name);
        let dependent = rt.new_handle(dependent);
        let mro: Vec<_> = rt
            .type_mro(ty)
            .into_iter()
            .map(|mro_type| rt.new_handle(mro_type))
            .collect();
        for (depth, mro_type) in mro.into_iter().enumerate() {
            let mro_type = rt.handle(mro_type);
            if Type::from_raw(mro_type).is_sealed(&rt.heap) {
                break;
            }
            let name_raw = rt.handle(name);
            let cell = match rt.type_own_cell(mro_type, name_raw)? {
                Some(cell) => cell,
                None if depth == 0 => rt.type_at_put(mro_type, name_raw, RawObject::unbound())?,
                None => continue,
            };
            let is_placeholder = ValueCell::from_raw(cell).is_placeholder(&rt.heap);
            if depth > 0 && is_placeholder {
                continue;
            }
            let dependent_raw = rt.handle(dependent);
            ic_insert_dependent_to_value_cell_dependency_link(rt, dependent_raw, cell)?;
            if !is_placeholder {
                return Ok(());
            }
        }
        Ok(())
    })
}

/// Remove `dependent` from the cells of `name` along `mro`. Types that do
/// not have the attribute are skipped.
pub fn ic_delete_dependent_in_mro(
    rt: &mut Runtime,
    name: RawObject,
    mro: &[RawObject],
    dependent: RawObject,
) -> VmResult<()> {
    for mro_type in mro {
        if let Some(cell) = rt.type_own_cell(*mro_type, name)? {
            ic_delete_dependent_in_value_cell(&mut rt.heap, cell, dependent);
        }
    }
    Ok(())
}

fn insert_binary_op_dependencies(
    rt: &mut Runtime,
    dependent: RawObject,
    lookups: &[(LayoutId, &str)],
) -> VmResult<()> {
    rt.with_handles(|rt| {
        let dependent = rt.new_handle(dependent);
        for (layout_id, selector) in lookups {
            let ty = rt.type_at(*layout_id)?;
            let ty = rt.new_handle(ty);
            let name = rt.intern(selector)?;
            let (ty, dependent) = (rt.handle(ty), rt.handle(dependent));
            ic_insert_dependency_for_type_lookup_in_mro(rt, ty, name, dependent)?;
        }
        Ok(())
    })
}

/// Record `dependent` on the methods a cached binary operation resolved.
pub fn ic_insert_binary_op_dependencies(
    rt: &mut Runtime,
    dependent: RawObject,
    left: LayoutId,
    right: LayoutId,
    op: BinaryOp,
) -> VmResult<()> {
    insert_binary_op_dependencies(rt, dependent, &[(left, op.selector()), (right, op.swapped_selector())])
}

/// Record `dependent` on the methods a cached comparison resolved.
pub fn ic_insert_compare_op_dependencies(
    rt: &mut Runtime,
    dependent: RawObject,
    left: LayoutId,
    right: LayoutId,
    op: CompareOp,
) -> VmResult<()> {
    let (Some(selector), Some(swapped)) = (op.selector(), op.swapped().selector()) else {
        return Ok(());
    };
    insert_binary_op_dependencies(rt, dependent, &[(left, selector), (right, swapped)])
}

/// Record `dependent` on the methods a cached in-place operation resolved.
pub fn ic_insert_inplace_op_dependencies(
    rt: &mut Runtime,
    dependent: RawObject,
    left: LayoutId,
    right: LayoutId,
    op: BinaryOp,
) -> VmResult<()> {
    insert_binary_op_dependencies(
        rt,
        dependent,
        &[
            (left, op.inplace_selector()),
            (left, op.selector()),
            (right, op.swapped_selector()),
        ],
    )
}

// ----------------------------------------------------------------------
// Eviction
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteKind {
    Attribute,
    BinaryOp,
    InplaceOp,
    CompareOp,
}

/// A rewritten site of a function and the line it owns.
#[derive(Debug, Clone, Copy)]
struct CacheSite {
    kind: SiteKind,
    line: usize,
    original: i32,
}

fn cache_sites(heap: &Heap, function: Function) -> Vec<CacheSite> {
    let Some(bytecode) = MutableBytes::cast(heap, function.rewritten_bytecode(heap)) else {
        return Vec::new();
    };
    let bytes = bytecode.bytes(heap);
    BytecodeOps::new(&bytes)
        .filter_map(|(_, _, op)| {
            let kind = match op.bytecode()? {
                Bytecode::LoadAttrCached | Bytecode::LoadMethodCached | Bytecode::StoreAttrCached => {
                    SiteKind::Attribute
                }
                Bytecode::BinaryOpCached => SiteKind::BinaryOp,
                Bytecode::InplaceOpCached => SiteKind::InplaceOp,
                Bytecode::CompareOpCached => SiteKind::CompareOp,
                _ => return None,
            };
            let line = op.arg as usize;
            let original = ic_original_arg(heap, function.raw(), line)?;
            Some(CacheSite { kind, line, original })
        })
        .collect()
}

impl CacheSite {
    fn attribute_name_is(&self, heap: &Heap, function: Function, name: RawObject) -> bool {
        let names = Tuple::from_raw(Code::from_raw(function.code(heap)).names(heap));
        let index = self.original as usize;
        index < names.length(heap) && heap.str_equals(names.at(heap, index), name)
    }

    fn left_selector(&self) -> Option<&'static str> {
        match self.kind {
            SiteKind::BinaryOp | SiteKind::InplaceOp => BinaryOp::from_arg(self.original).map(BinaryOp::selector),
            SiteKind::CompareOp => CompareOp::from_arg(self.original).and_then(CompareOp::selector),
            SiteKind::Attribute => None,
        }
    }

    fn right_selector(&self) -> Option<&'static str> {
        match self.kind {
            SiteKind::BinaryOp | SiteKind::InplaceOp => {
                BinaryOp::from_arg(self.original).map(BinaryOp::swapped_selector)
            }
            SiteKind::CompareOp => CompareOp::from_arg(self.original).and_then(|op| op.swapped().selector()),
            SiteKind::Attribute => None,
        }
    }

    fn inplace_selector(&self) -> Option<&'static str> {
        match self.kind {
            SiteKind::InplaceOp => BinaryOp::from_arg(self.original).map(BinaryOp::inplace_selector),
            _ => None,
        }
    }
}

fn selector_is(rt: &Runtime, selector: Option<&str>, name: RawObject) -> bool {
    selector.is_some_and(|selector| rt.str_equals_static(name, selector))
}

/// Whether a lookup of `name` on instances of `cached_layout` resolves
/// through `updated_type`, so that changing the attribute there changes
/// the result.
fn is_cached_attribute_affected(
    rt: &mut Runtime,
    cached_layout: LayoutId,
    name: RawObject,
    updated_type: RawObject,
) -> VmResult<bool> {
    let cached_type = rt.type_at(cached_layout)?;
    if !rt.is_subtype(cached_type, updated_type) {
        return Ok(false);
    }
    for mro_type in rt.type_mro(cached_type) {
        if Type::from_raw(mro_type).is_sealed(&rt.heap) {
            break;
        }
        if mro_type == updated_type {
            return Ok(true);
        }
        if let Some(cell) = rt.type_own_cell(mro_type, name)? {
            if !ValueCell::from_raw(cell).is_placeholder(&rt.heap) {
                return Ok(false);
            }
        }
    }
    Ok(false)
}

/// Remove `dependent` from the cells of `name` from the cached type up to
/// `defining_type`.
fn delete_dependent_from_inheriting_types(
    rt: &mut Runtime,
    cached_layout: LayoutId,
    name: RawObject,
    defining_type: RawObject,
    dependent: RawObject,
) -> VmResult<()> {
    let cached_type = rt.type_at(cached_layout)?;
    for mro_type in rt.type_mro(cached_type) {
        if Type::from_raw(mro_type).is_sealed(&rt.heap) {
            break;
        }
        if let Some(cell) = rt.type_own_cell(mro_type, name)? {
            ic_delete_dependent_in_value_cell(&mut rt.heap, cell, dependent);
        }
        if mro_type == defining_type {
            break;
        }
    }
    Ok(())
}

/// Whether another entry of `dependent` still resolves `name` through `ty`.
fn is_attr_cached_in_dependent(
    rt: &mut Runtime,
    ty: RawObject,
    name: RawObject,
    dependent: Function,
) -> VmResult<bool> {
    let caches = Tuple::from_raw(dependent.caches(&rt.heap));
    for site in cache_sites(&rt.heap, dependent) {
        for entry in entries(site.line) {
            let key = caches.at(&rt.heap, entry + IC_ENTRY_KEY_OFFSET);
            if key.is_none() {
                continue;
            }
            let affected = if site.kind == SiteKind::Attribute {
                let Some(layout) = key.as_small_int() else { continue };
                site.attribute_name_is(&rt.heap, dependent, name)
                    && is_cached_attribute_affected(rt, LayoutId::from_raw(layout as u32), name, ty)?
            } else {
                let Some((left, right)) = binop_key_layouts(key) else { continue };
                (selector_is(rt, site.left_selector(), name) && is_cached_attribute_affected(rt, left, name, ty)?)
                    || (selector_is(rt, site.right_selector(), name)
                        && is_cached_attribute_affected(rt, right, name, ty)?)
                    || (selector_is(rt, site.inplace_selector(), name)
                        && is_cached_attribute_affected(rt, left, name, ty)?)
            };
            if affected {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// After evicting an operator entry, drop the dependency the other operand
/// contributed, up to the highest supertype no remaining entry resolves
/// `name` through.
fn delete_dependent_to_defining_type(
    rt: &mut Runtime,
    dependent: Function,
    cached_layout: LayoutId,
    selector: Option<&'static str>,
) -> VmResult<()> {
    let Some(selector) = selector else {
        return Ok(());
    };
    let name = rt.intern(selector)?;
    let cached_type = rt.type_at(cached_layout)?;
    let mut supertype = None;
    for mro_type in rt.type_mro(cached_type) {
        if Type::from_raw(mro_type).is_sealed(&rt.heap) || is_attr_cached_in_dependent(rt, mro_type, name, dependent)? {
            break;
        }
        supertype = Some(mro_type);
        let defines = rt
            .type_own_cell(mro_type, name)?
            .is_some_and(|cell| !ValueCell::from_raw(cell).is_placeholder(&rt.heap));
        if defines {
            break;
        }
    }
    match supertype {
        Some(supertype) => delete_dependent_from_inheriting_types(rt, cached_layout, name, supertype, dependent.raw()),
        None => Ok(()),
    }
}

fn evict(heap: &mut Heap, caches: Tuple, entry: usize) {
    caches.at_put(heap, entry + IC_ENTRY_KEY_OFFSET, RawObject::none());
    caches.at_put(heap, entry + IC_ENTRY_VALUE_OFFSET, RawObject::none());
}

fn evict_attribute_entry(
    rt: &mut Runtime,
    dependent: Function,
    site: CacheSite,
    entry: usize,
    ty: RawObject,
    name: RawObject,
    is_data_descriptor: bool,
) -> VmResult<()> {
    let caches = Tuple::from_raw(dependent.caches(&rt.heap));
    let Some(layout) = caches.at(&rt.heap, entry + IC_ENTRY_KEY_OFFSET).as_small_int() else {
        return Ok(());
    };
    if !site.attribute_name_is(&rt.heap, dependent, name) {
        return Ok(());
    }
    // Instance attributes shadow non-data descriptors, so offsets stay valid
    let is_instance_offset = caches.at(&rt.heap, entry + IC_ENTRY_VALUE_OFFSET).is_small_int();
    if is_instance_offset && !is_data_descriptor {
        return Ok(());
    }
    let layout = LayoutId::from_raw(layout as u32);
    if !is_cached_attribute_affected(rt, layout, name, ty)? {
        return Ok(());
    }
    evict(&mut rt.heap, caches, entry);
    trace!("evicted attribute cache for layout {} in line {}", layout.raw(), site.line);
    delete_dependent_from_inheriting_types(rt, layout, name, ty, dependent.raw())
}

fn evict_operator_entry(
    rt: &mut Runtime,
    dependent: Function,
    site: CacheSite,
    entry: usize,
    ty: RawObject,
    name: RawObject,
) -> VmResult<()> {
    let caches = Tuple::from_raw(dependent.caches(&rt.heap));
    let Some((left, right)) = binop_key_layouts(caches.at(&rt.heap, entry + IC_ENTRY_KEY_OFFSET)) else {
        return Ok(());
    };
    let (left_selector, right_selector, inplace_selector) =
        (site.left_selector(), site.right_selector(), site.inplace_selector());
    let evict_inplace =
        selector_is(rt, inplace_selector, name) && is_cached_attribute_affected(rt, left, name, ty)?;
    let evict_left = !evict_inplace
        && selector_is(rt, left_selector, name)
        && is_cached_attribute_affected(rt, left, name, ty)?;
    let evict_right = !evict_inplace
        && !evict_left
        && selector_is(rt, right_selector, name)
        && is_cached_attribute_affected(rt, right, name, ty)?;
    if !evict_inplace && !evict_left && !evict_right {
        return Ok(());
    }
    evict(&mut rt.heap, caches, entry);
    trace!(
        "evicted operator cache for layouts ({}, {}) in line {}",
        left.raw(),
        right.raw(),
        site.line
    );

    let dependent_raw = dependent.raw();
    let (affected_layout, others) = if evict_inplace {
        (left, [(left, left_selector), (right, right_selector)])
    } else if evict_left {
        (left, [(left, inplace_selector), (right, right_selector)])
    } else {
        (right, [(left, inplace_selector), (left, left_selector)])
    };
    delete_dependent_from_inheriting_types(rt, affected_layout, name, ty, dependent_raw)?;
    for (layout, selector) in others {
        delete_dependent_to_defining_type(rt, dependent, layout, selector)?;
    }
    Ok(())
}

/// Evict the entries of `dependent` whose value a change of attribute
/// `name` on `ty` makes stale: entries keyed by `ty` or its subtypes that
/// resolve `name` through `ty`. Entries of supertypes and unrelated types
/// stay. Instance attribute offsets stay unless the new value is a data
/// descriptor.
pub fn ic_delete_cache_for_type_attr_in_dependent(
    rt: &mut Runtime,
    ty: RawObject,
    name: RawObject,
    is_data_descriptor: bool,
    dependent: RawObject,
) -> VmResult<()> {
    let Some(dependent) = Function::cast(&rt.heap, dependent) else {
        return Ok(());
    };
    for site in cache_sites(&rt.heap, dependent) {
        for entry in entries(site.line) {
            if site.kind == SiteKind::Attribute {
                evict_attribute_entry(rt, dependent, site, entry, ty, name, is_data_descriptor)?;
            } else {
                evict_operator_entry(rt, dependent, site, entry, ty, name)?;
            }
        }
    }
    Ok(())
}

/// Evict every cache entry made stale by changing attribute `name` of `ty`.
///
/// The candidates are the dependents of every cell of `name` along the MRO
/// of `ty` and in the subtypes of `ty`; a lookup that goes through `ty`
/// recorded itself on one of them. Does nothing when no such cell exists.
pub fn ic_invalidate_caches_for_type_attr(
    rt: &mut Runtime,
    ty: RawObject,
    name: RawObject,
    is_data_descriptor: bool,
) -> VmResult<()> {
    let mut related = rt.type_mro(ty);
    related.extend(rt.subtypes(ty).into_iter().filter(|subtype| *subtype != ty));
    let mut dependents = Vec::new();
    for related_type in related {
        if let Some(cell) = rt.type_own_cell(related_type, name)? {
            for dependent in ic_dependents(&rt.heap, cell) {
                if !dependents.contains(&dependent) {
                    dependents.push(dependent);
                }
            }
        }
    }
    rt.with_handles(|rt| {
        let (ty, name) = (rt.new_handle(ty), rt.new_handle(name));
        let dependents: Vec<_> = dependents.into_iter().map(|dependent| rt.new_handle(dependent)).collect();
        for dependent in dependents {
            let (ty, name, dependent) = (rt.handle(ty), rt.handle(name), rt.handle(dependent));
            ic_delete_cache_for_type_attr_in_dependent(rt, ty, name, is_data_descriptor, dependent)?;
        }
        Ok(())
    })
}
