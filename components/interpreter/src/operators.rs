//! Operator dispatch through special methods.
//!
//! `left + right` calls `type(left).__add__(left, right)` and falls back to
//! `type(right).__radd__(right, left)` when the first answer is
//! NotImplemented. When the right operand's type is a proper subclass that
//! overrides the reflected method, that method goes first. The method that
//! produced the result is reported back so call sites can cache it.

use bytecode_system::{BinaryOp, CompareOp};
use core_types::{ErrorKind, RawObject, VmError, VmResult};
use memory_manager::{Dict, Float, LargeInt, Tuple};

use crate::ic::BinaryOpFlags;
use crate::runtime::Runtime;

/// A function an operator resolved to and the operand order it was called
/// with. None when the result did not come from a cacheable method.
pub type ResolvedMethod = Option<(RawObject, BinaryOpFlags)>;

const SPECIAL_NAMES: &[&str] = &[
    "__neg__",
    "__pos__",
    "__invert__",
    "__bool__",
    "__len__",
    "__contains__",
    "__getitem__",
    "__init__",
    "__new__",
    "__call__",
    "__repr__",
    "__hash__",
    "__abs__",
];

/// Intern every special method name so that resolving an operator never
/// allocates.
pub(crate) fn intern_special_names(rt: &mut Runtime) -> VmResult<()> {
    for op in (0..).map_while(BinaryOp::from_arg) {
        for name in [op.selector(), op.swapped_selector(), op.inplace_selector()] {
            rt.intern(name)?;
        }
    }
    for op in (0..).map_while(CompareOp::from_arg) {
        if let Some(name) = op.selector() {
            rt.intern(name)?;
        }
    }
    for name in SPECIAL_NAMES {
        rt.intern(name)?;
    }
    Ok(())
}

impl Runtime {
    /// `type(object).<selector>`, skipping the instance.
    pub fn special_method(&mut self, object: RawObject, selector: &str) -> VmResult<Option<RawObject>> {
        let name = self.intern(selector)?;
        let ty = self.type_of(object);
        self.type_lookup(ty, name)
    }

    /// Methods to try for `left <op> right`, in order.
    fn operator_attempts(
        &mut self,
        left: RawObject,
        right: RawObject,
        selector: &str,
        swapped: &str,
        reflect_same_type: bool,
    ) -> VmResult<Vec<(RawObject, BinaryOpFlags)>> {
        let selector = self.intern(selector)?;
        let swapped = self.intern(swapped)?;
        let left_type = self.type_of(left);
        let right_type = self.type_of(right);
        let mut attempts = Vec::with_capacity(2);
        if let Some(method) = self.type_lookup(left_type, selector)? {
            attempts.push((method, BinaryOpFlags::None));
        }
        if left_type != right_type || reflect_same_type {
            if let Some(reflected) = self.type_lookup(right_type, swapped)? {
                let overrides = left_type != right_type
                    && self.is_subtype(right_type, left_type)
                    && self.type_lookup(left_type, swapped)? != Some(reflected);
                if overrides {
                    attempts.insert(0, (reflected, BinaryOpFlags::Reflected));
                } else {
                    attempts.push((reflected, BinaryOpFlags::Reflected));
                }
            }
        }
        Ok(attempts)
    }

    /// Call each attempt until one answers something other than
    /// NotImplemented; `fallback` decides when none does.
    fn dispatch_operator(
        &mut self,
        left: RawObject,
        right: RawObject,
        attempts: &[(RawObject, BinaryOpFlags)],
        fallback: impl FnOnce(&Runtime, RawObject, RawObject) -> VmResult<RawObject>,
    ) -> VmResult<(RawObject, ResolvedMethod)> {
        self.with_handles(|rt| {
            let left = rt.new_handle(left);
            let right = rt.new_handle(right);
            let attempts: Vec<_> = attempts
                .iter()
                .map(|(method, flags)| (rt.new_handle(*method), *flags))
                .collect();
            for (method, flags) in attempts {
                let (receiver, other) = match flags {
                    BinaryOpFlags::None => (left, right),
                    BinaryOpFlags::Reflected => (right, left),
                };
                let args = [rt.handle(receiver), rt.handle(other)];
                let result = rt.call(rt.handle(method), &args)?;
                if result != rt.not_implemented() {
                    let method = rt.handle(method);
                    let resolved = rt.is_function(method).then_some((method, flags));
                    return Ok((result, resolved));
                }
            }
            let (left, right) = (rt.handle(left), rt.handle(right));
            Ok((fallback(rt, left, right)?, None))
        })
    }

    /// `left <op> right`.
    pub fn binary_operation(&mut self, op: BinaryOp, left: RawObject, right: RawObject) -> VmResult<RawObject> {
        Ok(self.binary_operation_resolved(op, left, right)?.0)
    }

    /// `left <op> right`, also reporting the method that answered.
    pub fn binary_operation_resolved(
        &mut self,
        op: BinaryOp,
        left: RawObject,
        right: RawObject,
    ) -> VmResult<(RawObject, ResolvedMethod)> {
        let attempts = self.operator_attempts(left, right, op.selector(), op.swapped_selector(), false)?;
        self.dispatch_operator(left, right, &attempts, |rt, left, right| {
            Err(unsupported_operands(rt, op.symbol(), left, right))
        })
    }

    /// `left <op>= right`: the in-place method first, then the binary
    /// protocol.
    pub fn inplace_operation(&mut self, op: BinaryOp, left: RawObject, right: RawObject) -> VmResult<RawObject> {
        Ok(self.inplace_operation_resolved(op, left, right)?.0)
    }

    /// `left <op>= right`, also reporting the method that answered.
    pub fn inplace_operation_resolved(
        &mut self,
        op: BinaryOp,
        left: RawObject,
        right: RawObject,
    ) -> VmResult<(RawObject, ResolvedMethod)> {
        let mut attempts = Vec::with_capacity(3);
        if let Some(method) = self.special_method(left, op.inplace_selector())? {
            attempts.push((method, BinaryOpFlags::None));
        }
        attempts.extend(self.operator_attempts(left, right, op.selector(), op.swapped_selector(), false)?);
        let symbol = format!("{}=", op.symbol());
        self.dispatch_operator(left, right, &attempts, |rt, left, right| {
            Err(unsupported_operands(rt, &symbol, left, right))
        })
    }

    /// Call an operator method found in an inline cache.
    pub fn call_cached_operator(
        &mut self,
        method: RawObject,
        flags: BinaryOpFlags,
        left: RawObject,
        right: RawObject,
    ) -> VmResult<RawObject> {
        let args = match flags {
            BinaryOpFlags::None => [left, right],
            BinaryOpFlags::Reflected => [right, left],
        };
        self.call(method, &args)
    }

    /// `left <op> right` for a comparison.
    pub fn compare_operation(&mut self, op: CompareOp, left: RawObject, right: RawObject) -> VmResult<RawObject> {
        Ok(self.compare_operation_resolved(op, left, right)?.0)
    }

    /// A comparison, also reporting the method that answered. Only the six
    /// rich comparisons resolve to a method.
    pub fn compare_operation_resolved(
        &mut self,
        op: CompareOp,
        left: RawObject,
        right: RawObject,
    ) -> VmResult<(RawObject, ResolvedMethod)> {
        let (selector, swapped) = match (op.selector(), op.swapped().selector()) {
            (Some(selector), Some(swapped)) => (selector, swapped),
            _ => {
                let result = match op {
                    CompareOp::Is => left == right,
                    CompareOp::IsNot => left != right,
                    CompareOp::In => self.contains(right, left)?,
                    CompareOp::NotIn => !self.contains(right, left)?,
                    _ => self.exception_matches(left, right)?,
                };
                return Ok((RawObject::bool(result), None));
            }
        };
        let attempts = self.operator_attempts(left, right, selector, swapped, true)?;
        self.dispatch_operator(left, right, &attempts, |rt, left, right| match op {
            CompareOp::Eq => Ok(RawObject::bool(left == right)),
            CompareOp::Ne => Ok(RawObject::bool(left != right)),
            _ => Err(VmError::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op.symbol(),
                rt.type_name_of(left),
                rt.type_name_of(right)
            ))),
        })
    }

    /// `item in container`.
    pub fn contains(&mut self, container: RawObject, item: RawObject) -> VmResult<bool> {
        let Some(method) = self.special_method(container, "__contains__")? else {
            return Err(VmError::type_error(format!(
                "argument of type '{}' is not iterable",
                self.type_name_of(container)
            )));
        };
        let result = self.call(method, &[container, item])?;
        self.is_true(result)
    }

    /// Whether the exception `raised` (an instance or a type) is matched by
    /// `handler`, a type or a tuple of types.
    pub fn exception_matches(&mut self, raised: RawObject, handler: RawObject) -> VmResult<bool> {
        let candidates = self.tuple_items(handler).unwrap_or_else(|| vec![handler]);
        if candidates.iter().any(|candidate| !self.is_exception_type(*candidate)) {
            return Err(VmError::type_error(
                "catching classes that do not inherit from BaseException is not allowed",
            ));
        }
        let raised_type = if self.is_type(raised) { raised } else { self.type_of(raised) };
        Ok(candidates.iter().any(|candidate| self.is_subtype(raised_type, *candidate)))
    }

    /// Apply a unary special method such as `__neg__`.
    pub fn unary_operation(&mut self, selector: &str, operand: RawObject) -> VmResult<RawObject> {
        match self.special_method(operand, selector)? {
            Some(method) => self.call(method, &[operand]),
            None => {
                let symbol = match selector {
                    "__neg__" => "unary -",
                    "__pos__" => "unary +",
                    "__invert__" => "unary ~",
                    _ => selector,
                };
                Err(VmError::type_error(format!(
                    "bad operand type for {}: '{}'",
                    symbol,
                    self.type_name_of(operand)
                )))
            }
        }
    }

    /// Truthiness of `value`.
    pub fn is_true(&mut self, value: RawObject) -> VmResult<bool> {
        if let Some(truth) = value.immediate_truthiness() {
            return Ok(truth);
        }
        if let Some(float) = Float::cast(&self.heap, value) {
            return Ok(float.value(&self.heap) != 0.0);
        }
        if LargeInt::cast(&self.heap, value).is_some() {
            return Ok(true);
        }
        if self.is_str(value) {
            return Ok(!self.heap.bytes_of(value).is_empty());
        }
        if let Some(tuple) = Tuple::cast(&self.heap, value) {
            return Ok(tuple.length(&self.heap) > 0);
        }
        if let Some(dict) = Dict::cast(&self.heap, value) {
            return Ok(!dict.is_empty(&self.heap));
        }
        if let Some(method) = self.special_method(value, "__bool__")? {
            let result = self.call(method, &[value])?;
            return result.as_bool().ok_or_else(|| {
                VmError::type_error(format!(
                    "__bool__ should return bool, returned {}",
                    self.type_name_of(result)
                ))
            });
        }
        if let Some(method) = self.special_method(value, "__len__")? {
            let result = self.call(method, &[value])?;
            return match result.as_small_int() {
                Some(length) if length >= 0 => Ok(length != 0),
                Some(_) => Err(VmError::value_error("__len__() should return >= 0")),
                None => Err(VmError::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    self.type_name_of(result)
                ))),
            };
        }
        Ok(true)
    }

    /// `container[key]`.
    pub fn subscript(&mut self, container: RawObject, key: RawObject) -> VmResult<RawObject> {
        match self.special_method(container, "__getitem__")? {
            Some(method) => self.call(method, &[container, key]),
            None => Err(VmError::new(
                ErrorKind::TypeError,
                format!("'{}' object is not subscriptable", self.type_name_of(container)),
            )),
        }
    }
}

fn unsupported_operands(rt: &Runtime, symbol: &str, left: RawObject, right: RawObject) -> VmError {
    VmError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        rt.type_name_of(left),
        rt.type_name_of(right)
    ))
}
