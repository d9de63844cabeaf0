//! Methods of the builtin types and the builtins module.
//!
//! Every entry here becomes a builtin function object: its code carries an
//! index into the runtime's builtin table and the call machinery checks
//! arity before the Rust function runs, so `args` always has at least the
//! declared number of values. Methods receive their receiver as `args[0]`.

use bytecode_system::BinaryOp;
use core_types::{ErrorKind, LayoutId, RawObject, VmError, VmResult};
use memory_manager::{exception_fields, Code, Function, Handle, Tuple};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

use crate::interpreter;
use crate::operators::intern_special_names;
use crate::runtime::{BuiltinFunction, Runtime};

struct Method {
    name: &'static str,
    argcount: usize,
    varargs: bool,
    function: BuiltinFunction,
}

const fn method(name: &'static str, argcount: usize, function: BuiltinFunction) -> Method {
    Method {
        name,
        argcount,
        varargs: false,
        function,
    }
}

const fn variadic(name: &'static str, argcount: usize, function: BuiltinFunction) -> Method {
    Method {
        name,
        argcount,
        varargs: true,
        function,
    }
}

/// Types visible by name in the builtins module.
const EXPOSED_TYPES: &[LayoutId] = &[
    LayoutId::OBJECT,
    LayoutId::TYPE,
    LayoutId::INT,
    LayoutId::BOOL,
    LayoutId::FLOAT,
    LayoutId::STR,
    LayoutId::LARGE_BYTES,
    LayoutId::MUTABLE_BYTES,
    LayoutId::TUPLE,
    LayoutId::DICT,
    LayoutId::BASE_EXCEPTION,
    LayoutId::EXCEPTION,
    LayoutId::ATTRIBUTE_ERROR,
    LayoutId::EOF_ERROR,
    LayoutId::IMPORT_ERROR,
    LayoutId::INDEX_ERROR,
    LayoutId::KEY_ERROR,
    LayoutId::MEMORY_ERROR,
    LayoutId::NAME_ERROR,
    LayoutId::NOT_IMPLEMENTED_ERROR,
    LayoutId::OVERFLOW_ERROR,
    LayoutId::RECURSION_ERROR,
    LayoutId::RUNTIME_ERROR,
    LayoutId::SYSTEM_ERROR,
    LayoutId::TYPE_ERROR,
    LayoutId::VALUE_ERROR,
    LayoutId::ZERO_DIVISION_ERROR,
];

/// Install the builtin methods and the builtins module into `rt`.
pub(crate) fn install(rt: &mut Runtime) -> VmResult<()> {
    intern_special_names(rt)?;
    let tables: [(LayoutId, &[Method]); 11] = [
        (LayoutId::OBJECT, OBJECT_METHODS),
        (LayoutId::TYPE, TYPE_METHODS),
        (LayoutId::INT, INT_METHODS),
        (LayoutId::BOOL, BOOL_METHODS),
        (LayoutId::FLOAT, FLOAT_METHODS),
        (LayoutId::STR, STR_METHODS),
        (LayoutId::TUPLE, TUPLE_METHODS),
        (LayoutId::DICT, DICT_METHODS),
        (LayoutId::NONE_TYPE, NONE_METHODS),
        (LayoutId::FUNCTION, FUNCTION_METHODS),
        (LayoutId::BASE_EXCEPTION, EXCEPTION_METHODS),
    ];
    for (layout, methods) in tables {
        let type_name = rt.type_name(rt.type_at(layout)?);
        for entry in methods {
            let qualname = format!("{}.{}", type_name, entry.name);
            let function =
                rt.new_builtin_function(entry.name, &qualname, entry.argcount, entry.varargs, entry.function)?;
            // The layout table is a root, so the type is re-read after allocating
            let ty = rt.type_at(layout)?;
            rt.type_at_put_str(ty, entry.name, function)?;
        }
    }
    for entry in MODULE_FUNCTIONS {
        let function = rt.new_builtin_function(entry.name, entry.name, entry.argcount, entry.varargs, entry.function)?;
        let builtins = rt.builtins_dict;
        rt.set_global(builtins, entry.name, function)?;
    }
    for layout in EXPOSED_TYPES {
        let ty = rt.type_at(*layout)?;
        let name = rt.type_name(ty);
        let builtins = rt.builtins_dict;
        rt.set_global(builtins, &name, ty)?;
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Shared helpers
// ----------------------------------------------------------------------

fn descriptor_error(rt: &Runtime, selector: &str, expected: &str, receiver: RawObject) -> VmError {
    VmError::type_error(format!(
        "descriptor '{}' requires a '{}' object but received a '{}'",
        selector,
        expected,
        rt.type_name_of(receiver)
    ))
}

fn receiver_int(rt: &Runtime, args: &[RawObject], selector: &str) -> VmResult<BigInt> {
    rt.int_value(args[0])
        .ok_or_else(|| descriptor_error(rt, selector, "int", args[0]))
}

fn receiver_float(rt: &Runtime, args: &[RawObject], selector: &str) -> VmResult<f64> {
    rt.float_value(args[0])
        .ok_or_else(|| descriptor_error(rt, selector, "float", args[0]))
}

fn receiver_str(rt: &Runtime, args: &[RawObject], selector: &str) -> VmResult<String> {
    rt.str_value(args[0])
        .ok_or_else(|| descriptor_error(rt, selector, "str", args[0]))
}

fn receiver_tuple(rt: &Runtime, args: &[RawObject], selector: &str) -> VmResult<Vec<RawObject>> {
    rt.tuple_items(args[0])
        .ok_or_else(|| descriptor_error(rt, selector, "tuple", args[0]))
}

/// An int or float operand widened to f64.
fn as_float(rt: &Runtime, value: RawObject) -> Option<f64> {
    rt.float_value(value)
        .or_else(|| rt.int_value(value).and_then(|value| value.to_f64()))
}

/// A sequence index normalized against `length`.
fn sequence_index(rt: &Runtime, key: RawObject, length: usize, what: &str) -> VmResult<usize> {
    let Some(index) = rt.int_value(key) else {
        return Err(VmError::type_error(format!(
            "{} indices must be integers, not {}",
            what,
            rt.type_name_of(key)
        )));
    };
    let length = BigInt::from(length);
    let index = if index.is_negative() { index + &length } else { index };
    if index.is_negative() || index >= length {
        return Err(VmError::new(
            ErrorKind::IndexError,
            format!("{} index out of range", what),
        ));
    }
    index
        .to_usize()
        .ok_or_else(|| VmError::new(ErrorKind::IndexError, format!("{} index out of range", what)))
}

/// `left == right` with the identity shortcut containers use.
fn values_equal(rt: &mut Runtime, left: RawObject, right: RawObject) -> VmResult<bool> {
    if left == right {
        return Ok(true);
    }
    let result = rt.compare_operation(bytecode_system::CompareOp::Eq, left, right)?;
    rt.is_true(result)
}

/// `repr(value)` as Rust text.
pub fn repr(rt: &mut Runtime, value: RawObject) -> VmResult<String> {
    let Some(method) = rt.special_method(value, "__repr__")? else {
        return Ok(rt.display_value(value));
    };
    let result = rt.call(method, &[value])?;
    rt.str_value(result).ok_or_else(|| {
        VmError::type_error(format!(
            "__repr__ returned non-string (type {})",
            rt.type_name_of(result)
        ))
    })
}

/// `str(value)` as Rust text.
pub fn str_text(rt: &mut Runtime, value: RawObject) -> VmResult<String> {
    if let Some(text) = rt.str_value(value) {
        return Ok(text);
    }
    if rt.is_exception(value) {
        let args = rt.exception_args(value);
        return match rt.tuple_items(args).as_deref() {
            None | Some([]) => Ok(String::new()),
            Some([single]) => str_text(rt, *single),
            Some(_) => repr(rt, args),
        };
    }
    repr(rt, value)
}

/// Shortest text that reads back as `value`, in the usual float notation:
/// positional between 1e-4 and 1e16, scientific outside it.
///
/// # Example
///
/// ```
/// use interpreter::float_repr;
///
/// assert_eq!(float_repr(1.5), "1.5");
/// assert_eq!(float_repr(1e16), "1e+16");
/// assert_eq!(float_repr(0.0001), "0.0001");
/// assert_eq!(float_repr(-0.0), "-0.0");
/// ```
pub fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut buffer = ryu::Buffer::new();
    let text = buffer.format_finite(value);
    let (sign, text) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (mantissa, exponent) = match text.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i64>().unwrap_or(0)),
        None => (text, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = format!("{}{}", whole, fraction);
    // Position of the decimal point within `digits`
    let mut point = whole.len() as i64 + exponent;
    let trimmed = digits.trim_start_matches('0');
    point -= (digits.len() - trimmed.len()) as i64;
    let digits = trimmed.trim_end_matches('0');
    if digits.is_empty() {
        return format!("{}0.0", sign);
    }
    let scientific = point - 1;
    let body = if !(-4..16).contains(&scientific) {
        let (first, rest) = digits.split_at(1);
        let mantissa = if rest.is_empty() {
            first.to_string()
        } else {
            format!("{}.{}", first, rest)
        };
        let exponent_sign = if scientific < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, exponent_sign, scientific.abs())
    } else if point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else if point as usize >= digits.len() {
        format!("{}{}.0", digits, "0".repeat(point as usize - digits.len()))
    } else {
        let (whole, fraction) = digits.split_at(point as usize);
        format!("{}.{}", whole, fraction)
    };
    format!("{}{}", sign, body)
}

fn str_repr(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

// ----------------------------------------------------------------------
// object and type
// ----------------------------------------------------------------------

const OBJECT_METHODS: &[Method] = &[
    variadic("__new__", 1, object_new),
    method("__eq__", 2, object_eq),
    method("__ne__", 2, object_ne),
    method("__hash__", 1, object_hash),
    method("__repr__", 1, object_repr),
];

fn object_new(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    if args.len() > 1 {
        return Err(VmError::type_error("object() takes no arguments"));
    }
    rt.new_instance(LayoutId::OBJECT)
}

fn object_eq(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    Ok(if args[0] == args[1] {
        RawObject::bool(true)
    } else {
        rt.not_implemented()
    })
}

fn object_ne(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let Some(eq) = rt.special_method(args[0], "__eq__")? else {
        return Ok(rt.not_implemented());
    };
    let result = rt.call(eq, &[args[0], args[1]])?;
    if result == rt.not_implemented() {
        return Ok(result);
    }
    Ok(RawObject::bool(!rt.is_true(result)?))
}

fn object_hash(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let hash = rt.hash_key(args[0])?;
    rt.new_int(&BigInt::from(hash))
}

fn object_repr(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let object = args[0];
    let text = if rt.is_type(object) {
        format!("<class '{}'>", rt.type_name(object))
    } else if rt.is_function(object) {
        let qualname = Function::from_raw(object).qualname(rt.heap());
        format!("<function {}>", rt.str_value(qualname).unwrap_or_default())
    } else if object.is_heap_object() {
        let id = rt.identity_hash(object);
        format!("<{} object at {:#x}>", rt.type_name_of(object), id)
    } else {
        rt.display_value(object)
    };
    rt.new_str(&text)
}

const TYPE_METHODS: &[Method] = &[variadic("__new__", 1, type_new)];

fn type_new(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    match args {
        [_, object] => Ok(rt.type_of(*object)),
        [_, name, bases, namespace] => rt.new_type(*name, *bases, *namespace),
        _ => Err(VmError::type_error("type() takes 1 or 3 arguments")),
    }
}

const FUNCTION_METHODS: &[Method] = &[method("__repr__", 1, object_repr)];

const NONE_METHODS: &[Method] = &[method("__repr__", 1, none_repr)];

fn none_repr(rt: &mut Runtime, _args: &[RawObject]) -> VmResult<RawObject> {
    rt.new_str("None")
}

// ----------------------------------------------------------------------
// int and bool
// ----------------------------------------------------------------------

/// Integer arithmetic; None means the operation has no int meaning.
fn int_arithmetic(rt: &mut Runtime, op: BinaryOp, left: &BigInt, right: &BigInt) -> VmResult<Option<RawObject>> {
    let zero_division = || VmError::new(ErrorKind::ZeroDivisionError, "integer division or modulo by zero");
    let result = match op {
        BinaryOp::Add => left + right,
        BinaryOp::Sub => left - right,
        BinaryOp::Mul => left * right,
        BinaryOp::Floordiv | BinaryOp::Mod => {
            if right.is_zero() {
                return Err(zero_division());
            }
            let quotient = left / right;
            let remainder = left - &quotient * right;
            let adjust = !remainder.is_zero() && (remainder.is_negative() != right.is_negative());
            if op == BinaryOp::Floordiv {
                if adjust {
                    quotient - 1
                } else {
                    quotient
                }
            } else if adjust {
                remainder + right
            } else {
                remainder
            }
        }
        BinaryOp::Truediv => {
            if right.is_zero() {
                return Err(VmError::new(ErrorKind::ZeroDivisionError, "division by zero"));
            }
            let (Some(left), Some(right)) = (left.to_f64(), right.to_f64()) else {
                return Err(VmError::new(
                    ErrorKind::OverflowError,
                    "integer division result too large for a float",
                ));
            };
            return rt.new_float(left / right).map(Some);
        }
        BinaryOp::Pow => {
            if right.is_negative() {
                if left.is_zero() {
                    return Err(VmError::new(
                        ErrorKind::ZeroDivisionError,
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                let base = left.to_f64().unwrap_or(f64::INFINITY);
                let exponent = right.to_f64().unwrap_or(f64::NEG_INFINITY);
                return rt.new_float(base.powf(exponent)).map(Some);
            }
            let Some(exponent) = right.to_u32() else {
                return Err(VmError::new(ErrorKind::OverflowError, "exponent too large"));
            };
            left.pow(exponent)
        }
        BinaryOp::Lshift | BinaryOp::Rshift => {
            if right.is_negative() {
                return Err(VmError::value_error("negative shift count"));
            }
            let Some(count) = right.to_usize() else {
                return Err(VmError::new(ErrorKind::OverflowError, "shift count too large"));
            };
            if op == BinaryOp::Lshift {
                left << count
            } else {
                left >> count
            }
        }
        BinaryOp::And => left & right,
        BinaryOp::Or => left | right,
        BinaryOp::Xor => left ^ right,
        BinaryOp::Matmul => return Ok(None),
    };
    rt.new_int(&result).map(Some)
}

fn int_binary(rt: &mut Runtime, args: &[RawObject], (op, reflected): (BinaryOp, bool)) -> VmResult<RawObject> {
    let selector = if reflected { op.swapped_selector() } else { op.selector() };
    let receiver = receiver_int(rt, args, selector)?;
    let Some(other) = rt.int_value(args[1]) else {
        return Ok(rt.not_implemented());
    };
    let (left, right) = if reflected { (other, receiver) } else { (receiver, other) };
    Ok(int_arithmetic(rt, op, &left, &right)?.unwrap_or_else(|| rt.not_implemented()))
}

fn int_compare(rt: &mut Runtime, args: &[RawObject], selector: &'static str) -> VmResult<RawObject> {
    let receiver = receiver_int(rt, args, selector)?;
    let ordering = if let Some(other) = rt.int_value(args[1]) {
        receiver.partial_cmp(&other)
    } else if let Some(other) = rt.float_value(args[1]) {
        receiver.to_f64().and_then(|value| value.partial_cmp(&other))
    } else {
        return Ok(rt.not_implemented());
    };
    Ok(RawObject::bool(ordering_matches(ordering, selector)))
}

fn ordering_matches(ordering: Option<std::cmp::Ordering>, selector: &str) -> bool {
    use std::cmp::Ordering::*;
    match (selector, ordering) {
        ("__ne__", None) => true,
        (_, None) => false,
        ("__lt__", Some(ordering)) => ordering == Less,
        ("__le__", Some(ordering)) => ordering != Greater,
        ("__eq__", Some(ordering)) => ordering == Equal,
        ("__ne__", Some(ordering)) => ordering != Equal,
        ("__gt__", Some(ordering)) => ordering == Greater,
        (_, Some(ordering)) => ordering != Less,
    }
}

macro_rules! operator_functions {
    ($helper:ident: $($name:ident => $arg:expr),* $(,)?) => {
        $(
            fn $name(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
                $helper(rt, args, $arg)
            }
        )*
    };
}

operator_functions!(int_binary:
    int_add => (BinaryOp::Add, false),
    int_radd => (BinaryOp::Add, true),
    int_sub => (BinaryOp::Sub, false),
    int_rsub => (BinaryOp::Sub, true),
    int_mul => (BinaryOp::Mul, false),
    int_rmul => (BinaryOp::Mul, true),
    int_floordiv => (BinaryOp::Floordiv, false),
    int_rfloordiv => (BinaryOp::Floordiv, true),
    int_truediv => (BinaryOp::Truediv, false),
    int_rtruediv => (BinaryOp::Truediv, true),
    int_mod => (BinaryOp::Mod, false),
    int_rmod => (BinaryOp::Mod, true),
    int_pow => (BinaryOp::Pow, false),
    int_rpow => (BinaryOp::Pow, true),
    int_lshift => (BinaryOp::Lshift, false),
    int_rlshift => (BinaryOp::Lshift, true),
    int_rshift => (BinaryOp::Rshift, false),
    int_rrshift => (BinaryOp::Rshift, true),
    int_and => (BinaryOp::And, false),
    int_rand => (BinaryOp::And, true),
    int_or => (BinaryOp::Or, false),
    int_ror => (BinaryOp::Or, true),
    int_xor => (BinaryOp::Xor, false),
    int_rxor => (BinaryOp::Xor, true),
);

operator_functions!(int_compare:
    int_lt => "__lt__",
    int_le => "__le__",
    int_eq => "__eq__",
    int_ne => "__ne__",
    int_gt => "__gt__",
    int_ge => "__ge__",
);

const INT_METHODS: &[Method] = &[
    variadic("__new__", 1, int_new),
    method("__add__", 2, int_add),
    method("__radd__", 2, int_radd),
    method("__sub__", 2, int_sub),
    method("__rsub__", 2, int_rsub),
    method("__mul__", 2, int_mul),
    method("__rmul__", 2, int_rmul),
    method("__floordiv__", 2, int_floordiv),
    method("__rfloordiv__", 2, int_rfloordiv),
    method("__truediv__", 2, int_truediv),
    method("__rtruediv__", 2, int_rtruediv),
    method("__mod__", 2, int_mod),
    method("__rmod__", 2, int_rmod),
    method("__pow__", 2, int_pow),
    method("__rpow__", 2, int_rpow),
    method("__lshift__", 2, int_lshift),
    method("__rlshift__", 2, int_rlshift),
    method("__rshift__", 2, int_rshift),
    method("__rrshift__", 2, int_rrshift),
    method("__and__", 2, int_and),
    method("__rand__", 2, int_rand),
    method("__or__", 2, int_or),
    method("__ror__", 2, int_ror),
    method("__xor__", 2, int_xor),
    method("__rxor__", 2, int_rxor),
    method("__lt__", 2, int_lt),
    method("__le__", 2, int_le),
    method("__eq__", 2, int_eq),
    method("__ne__", 2, int_ne),
    method("__gt__", 2, int_gt),
    method("__ge__", 2, int_ge),
    method("__neg__", 1, int_neg),
    method("__pos__", 1, int_pos),
    method("__invert__", 1, int_invert),
    method("__abs__", 1, int_abs),
    method("__bool__", 1, int_bool),
    method("__repr__", 1, int_repr),
];

fn int_new(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = match args {
        [_] => BigInt::zero(),
        [_, value] => int_from(rt, *value)?,
        _ => return Err(VmError::type_error("int() takes at most 1 argument")),
    };
    rt.new_int(&value)
}

fn int_from(rt: &Runtime, value: RawObject) -> VmResult<BigInt> {
    if let Some(value) = rt.int_value(value) {
        return Ok(value);
    }
    if let Some(value) = rt.float_value(value) {
        if value.is_nan() {
            return Err(VmError::value_error("cannot convert float NaN to integer"));
        }
        if value.is_infinite() {
            return Err(VmError::new(
                ErrorKind::OverflowError,
                "cannot convert float infinity to integer",
            ));
        }
        return BigInt::from_f64(value.trunc())
            .ok_or_else(|| VmError::value_error("cannot convert float to integer"));
    }
    if let Some(text) = rt.str_value(value) {
        let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
        return cleaned
            .parse::<BigInt>()
            .map_err(|_| VmError::value_error(format!("invalid literal for int() with base 10: {}", str_repr(&text))));
    }
    Err(VmError::type_error(format!(
        "int() argument must be a string or a number, not '{}'",
        rt.type_name_of(value)
    )))
}

fn int_neg(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = receiver_int(rt, args, "__neg__")?;
    rt.new_int(&-value)
}

fn int_pos(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = receiver_int(rt, args, "__pos__")?;
    rt.new_int(&value)
}

fn int_invert(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = receiver_int(rt, args, "__invert__")?;
    rt.new_int(&(-value - 1))
}

fn int_abs(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = receiver_int(rt, args, "__abs__")?;
    rt.new_int(&value.abs())
}

fn int_bool(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = receiver_int(rt, args, "__bool__")?;
    Ok(RawObject::bool(!value.is_zero()))
}

fn int_repr(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = receiver_int(rt, args, "__repr__")?;
    rt.new_str(&value.to_string())
}

/// `&`, `|` and `^` between bools stay bools; anything else is int math.
fn bool_binary(rt: &mut Runtime, args: &[RawObject], op: BinaryOp) -> VmResult<RawObject> {
    match (args[0].as_bool(), args[1].as_bool()) {
        (Some(left), Some(right)) => Ok(RawObject::bool(match op {
            BinaryOp::And => left & right,
            BinaryOp::Or => left | right,
            _ => left ^ right,
        })),
        _ => int_binary(rt, args, (op, false)),
    }
}

operator_functions!(bool_binary:
    bool_and => BinaryOp::And,
    bool_or => BinaryOp::Or,
    bool_xor => BinaryOp::Xor,
);

const BOOL_METHODS: &[Method] = &[
    variadic("__new__", 1, bool_new),
    method("__and__", 2, bool_and),
    method("__rand__", 2, bool_and),
    method("__or__", 2, bool_or),
    method("__ror__", 2, bool_or),
    method("__xor__", 2, bool_xor),
    method("__rxor__", 2, bool_xor),
    method("__repr__", 1, bool_repr),
];

fn bool_new(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    match args {
        [_] => Ok(RawObject::bool(false)),
        [_, value] => Ok(RawObject::bool(rt.is_true(*value)?)),
        _ => Err(VmError::type_error("bool() takes at most 1 argument")),
    }
}

fn bool_repr(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    match args[0].as_bool() {
        Some(true) => rt.new_str("True"),
        Some(false) => rt.new_str("False"),
        None => Err(descriptor_error(rt, "__repr__", "bool", args[0])),
    }
}

// ----------------------------------------------------------------------
// float
// ----------------------------------------------------------------------

fn float_arithmetic(op: BinaryOp, left: f64, right: f64) -> VmResult<Option<f64>> {
    fn zero_division<T>(message: &str) -> VmResult<T> {
        Err(VmError::new(ErrorKind::ZeroDivisionError, message))
    }
    let modulo = |left: f64, right: f64| {
        let remainder = left % right;
        if remainder != 0.0 && (remainder < 0.0) != (right < 0.0) {
            remainder + right
        } else {
            remainder
        }
    };
    let result = match op {
        BinaryOp::Add => left + right,
        BinaryOp::Sub => left - right,
        BinaryOp::Mul => left * right,
        BinaryOp::Truediv if right == 0.0 => return zero_division("float division by zero"),
        BinaryOp::Truediv => left / right,
        BinaryOp::Floordiv if right == 0.0 => return zero_division("float floor division by zero"),
        BinaryOp::Floordiv => ((left - modulo(left, right)) / right).round(),
        BinaryOp::Mod if right == 0.0 => return zero_division("float modulo"),
        BinaryOp::Mod => modulo(left, right),
        BinaryOp::Pow => {
            if left == 0.0 && right < 0.0 {
                return zero_division("0.0 cannot be raised to a negative power");
            }
            if left < 0.0 && right.fract() != 0.0 {
                return Err(VmError::value_error(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            left.powf(right)
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

fn float_binary(rt: &mut Runtime, args: &[RawObject], (op, reflected): (BinaryOp, bool)) -> VmResult<RawObject> {
    let selector = if reflected { op.swapped_selector() } else { op.selector() };
    let receiver = receiver_float(rt, args, selector)?;
    let Some(other) = as_float(rt, args[1]) else {
        return Ok(rt.not_implemented());
    };
    let (left, right) = if reflected { (other, receiver) } else { (receiver, other) };
    match float_arithmetic(op, left, right)? {
        Some(result) => rt.new_float(result),
        None => Ok(rt.not_implemented()),
    }
}

fn float_compare(rt: &mut Runtime, args: &[RawObject], selector: &'static str) -> VmResult<RawObject> {
    let receiver = receiver_float(rt, args, selector)?;
    let Some(other) = as_float(rt, args[1]) else {
        return Ok(rt.not_implemented());
    };
    Ok(RawObject::bool(ordering_matches(receiver.partial_cmp(&other), selector)))
}

operator_functions!(float_binary:
    float_add => (BinaryOp::Add, false),
    float_radd => (BinaryOp::Add, true),
    float_sub => (BinaryOp::Sub, false),
    float_rsub => (BinaryOp::Sub, true),
    float_mul => (BinaryOp::Mul, false),
    float_rmul => (BinaryOp::Mul, true),
    float_truediv => (BinaryOp::Truediv, false),
    float_rtruediv => (BinaryOp::Truediv, true),
    float_floordiv => (BinaryOp::Floordiv, false),
    float_rfloordiv => (BinaryOp::Floordiv, true),
    float_mod => (BinaryOp::Mod, false),
    float_rmod => (BinaryOp::Mod, true),
    float_pow => (BinaryOp::Pow, false),
    float_rpow => (BinaryOp::Pow, true),
);

operator_functions!(float_compare:
    float_lt => "__lt__",
    float_le => "__le__",
    float_eq => "__eq__",
    float_ne => "__ne__",
    float_gt => "__gt__",
    float_ge => "__ge__",
);

const FLOAT_METHODS: &[Method] = &[
    variadic("__new__", 1, float_new),
    method("__add__", 2, float_add),
    method("__radd__", 2, float_radd),
    method("__sub__", 2, float_sub),
    method("__rsub__", 2, float_rsub),
    method("__mul__", 2, float_mul),
    method("__rmul__", 2, float_rmul),
    method("__truediv__", 2, float_truediv),
    method("__rtruediv__", 2, float_rtruediv),
    method("__floordiv__", 2, float_floordiv),
    method("__rfloordiv__", 2, float_rfloordiv),
    method("__mod__", 2, float_mod),
    method("__rmod__", 2, float_rmod),
    method("__pow__", 2, float_pow),
    method("__rpow__", 2, float_rpow),
    method("__lt__", 2, float_lt),
    method("__le__", 2, float_le),
    method("__eq__", 2, float_eq),
    method("__ne__", 2, float_ne),
    method("__gt__", 2, float_gt),
    method("__ge__", 2, float_ge),
    method("__neg__", 1, float_neg),
    method("__pos__", 1, float_pos),
    method("__abs__", 1, float_abs),
    method("__bool__", 1, float_bool),
    method("__repr__", 1, float_repr_method),
];

fn float_new(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = match args {
        [_] => 0.0,
        [_, value] => {
            if let Some(value) = as_float(rt, *value) {
                value
            } else if let Some(text) = rt.str_value(*value) {
                text.trim().parse::<f64>().map_err(|_| {
                    VmError::value_error(format!("could not convert string to float: {}", str_repr(&text)))
                })?
            } else {
                return Err(VmError::type_error(format!(
                    "float() argument must be a string or a number, not '{}'",
                    rt.type_name_of(*value)
                )));
            }
        }
        _ => return Err(VmError::type_error("float() takes at most 1 argument")),
    };
    rt.new_float(value)
}

fn float_neg(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = receiver_float(rt, args, "__neg__")?;
    rt.new_float(-value)
}

fn float_pos(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    receiver_float(rt, args, "__pos__")?;
    Ok(args[0])
}

fn float_abs(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = receiver_float(rt, args, "__abs__")?;
    rt.new_float(value.abs())
}

fn float_bool(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = receiver_float(rt, args, "__bool__")?;
    Ok(RawObject::bool(value != 0.0))
}

fn float_repr_method(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let value = receiver_float(rt, args, "__repr__")?;
    rt.new_str(&float_repr(value))
}

// ----------------------------------------------------------------------
// str
// ----------------------------------------------------------------------

fn str_compare(rt: &mut Runtime, args: &[RawObject], selector: &'static str) -> VmResult<RawObject> {
    let receiver = receiver_str(rt, args, selector)?;
    let Some(other) = rt.str_value(args[1]) else {
        return Ok(rt.not_implemented());
    };
    Ok(RawObject::bool(ordering_matches(Some(receiver.cmp(&other)), selector)))
}

operator_functions!(str_compare:
    str_lt => "__lt__",
    str_le => "__le__",
    str_eq => "__eq__",
    str_ne => "__ne__",
    str_gt => "__gt__",
    str_ge => "__ge__",
);

const STR_METHODS: &[Method] = &[
    variadic("__new__", 1, str_new),
    method("__add__", 2, str_add),
    method("__mul__", 2, str_mul),
    method("__rmul__", 2, str_mul),
    method("__lt__", 2, str_lt),
    method("__le__", 2, str_le),
    method("__eq__", 2, str_eq),
    method("__ne__", 2, str_ne),
    method("__gt__", 2, str_gt),
    method("__ge__", 2, str_ge),
    method("__len__", 1, str_len),
    method("__contains__", 2, str_contains),
    method("__getitem__", 2, str_getitem),
    method("__repr__", 1, str_repr_method),
];

fn str_new(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    match args {
        [_] => rt.intern(""),
        [_, value] if rt.is_str(*value) => Ok(*value),
        [_, value] => {
            let text = str_text(rt, *value)?;
            rt.new_str(&text)
        }
        _ => Err(VmError::type_error("str() takes at most 1 argument")),
    }
}

fn str_add(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let left = receiver_str(rt, args, "__add__")?;
    match rt.str_value(args[1]) {
        Some(right) => rt.new_str(&(left + &right)),
        None => Ok(rt.not_implemented()),
    }
}

fn str_mul(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let text = receiver_str(rt, args, "__mul__")?;
    let Some(count) = rt.int_value(args[1]) else {
        return Ok(rt.not_implemented());
    };
    let count = count.to_usize().unwrap_or(0);
    if text.len().saturating_mul(count) > rt.config().heap_size {
        return Err(VmError::new(ErrorKind::OverflowError, "repeated string is too long"));
    }
    rt.new_str(&text.repeat(count))
}

fn str_len(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let text = receiver_str(rt, args, "__len__")?;
    Ok(RawObject::small_int(text.chars().count() as i64))
}

fn str_contains(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let text = receiver_str(rt, args, "__contains__")?;
    let Some(needle) = rt.str_value(args[1]) else {
        return Err(VmError::type_error(format!(
            "'in <string>' requires string as left operand, not {}",
            rt.type_name_of(args[1])
        )));
    };
    Ok(RawObject::bool(text.contains(&needle)))
}

fn str_getitem(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let text = receiver_str(rt, args, "__getitem__")?;
    let chars: Vec<char> = text.chars().collect();
    let index = sequence_index(rt, args[1], chars.len(), "string")?;
    rt.new_str(&chars[index].to_string())
}

fn str_repr_method(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let text = receiver_str(rt, args, "__repr__")?;
    rt.new_str(&str_repr(&text))
}

// ----------------------------------------------------------------------
// tuple and dict
// ----------------------------------------------------------------------

const TUPLE_METHODS: &[Method] = &[
    variadic("__new__", 1, tuple_new),
    method("__add__", 2, tuple_add),
    method("__eq__", 2, tuple_eq),
    method("__ne__", 2, tuple_ne),
    method("__len__", 1, tuple_len),
    method("__contains__", 2, tuple_contains),
    method("__getitem__", 2, tuple_getitem),
    method("__repr__", 1, tuple_repr),
];

fn tuple_new(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    match args {
        [_] => rt.new_tuple(0),
        [_, value] if rt.tuple_items(*value).is_some() => Ok(*value),
        [_, value] => Err(VmError::type_error(format!(
            "'{}' object is not iterable",
            rt.type_name_of(*value)
        ))),
        _ => Err(VmError::type_error("tuple() takes at most 1 argument")),
    }
}

fn tuple_add(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let mut items = receiver_tuple(rt, args, "__add__")?;
    let Some(right) = rt.tuple_items(args[1]) else {
        return Ok(rt.not_implemented());
    };
    items.extend(right);
    rt.new_tuple_from(&items)
}

/// Element-wise equality; comparing elements may run program code.
fn tuples_equal(rt: &mut Runtime, left: RawObject, right: RawObject) -> VmResult<bool> {
    let length = Tuple::from_raw(left).length(rt.heap());
    if length != Tuple::from_raw(right).length(rt.heap()) {
        return Ok(false);
    }
    rt.with_handles(|rt| {
        let left = rt.new_handle(left);
        let right = rt.new_handle(right);
        for index in 0..length {
            let a = Tuple::from_raw(rt.handle(left)).at(rt.heap(), index);
            let b = Tuple::from_raw(rt.handle(right)).at(rt.heap(), index);
            if !values_equal(rt, a, b)? {
                return Ok(false);
            }
        }
        Ok(true)
    })
}

fn tuple_eq(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    receiver_tuple(rt, args, "__eq__")?;
    if rt.tuple_items(args[1]).is_none() {
        return Ok(rt.not_implemented());
    }
    Ok(RawObject::bool(tuples_equal(rt, args[0], args[1])?))
}

fn tuple_ne(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    receiver_tuple(rt, args, "__ne__")?;
    if rt.tuple_items(args[1]).is_none() {
        return Ok(rt.not_implemented());
    }
    Ok(RawObject::bool(!tuples_equal(rt, args[0], args[1])?))
}

fn tuple_len(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let items = receiver_tuple(rt, args, "__len__")?;
    Ok(RawObject::small_int(items.len() as i64))
}

fn tuple_contains(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let length = receiver_tuple(rt, args, "__contains__")?.len();
    rt.with_handles(|rt| {
        let tuple = rt.new_handle(args[0]);
        let item = rt.new_handle(args[1]);
        for index in 0..length {
            let element = Tuple::from_raw(rt.handle(tuple)).at(rt.heap(), index);
            if values_equal(rt, element, rt.handle(item))? {
                return Ok(RawObject::bool(true));
            }
        }
        Ok(RawObject::bool(false))
    })
}

fn tuple_getitem(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let items = receiver_tuple(rt, args, "__getitem__")?;
    let index = sequence_index(rt, args[1], items.len(), "tuple")?;
    Ok(items[index])
}

fn tuple_repr(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let length = receiver_tuple(rt, args, "__repr__")?.len();
    let parts = rt.with_handles(|rt| {
        let tuple = rt.new_handle(args[0]);
        let mut parts = Vec::with_capacity(length);
        for index in 0..length {
            let element = Tuple::from_raw(rt.handle(tuple)).at(rt.heap(), index);
            parts.push(repr(rt, element)?);
        }
        Ok(parts)
    })?;
    let text = if parts.len() == 1 {
        format!("({},)", parts[0])
    } else {
        format!("({})", parts.join(", "))
    };
    rt.new_str(&text)
}

const DICT_METHODS: &[Method] = &[
    variadic("__new__", 1, dict_new),
    method("__len__", 1, dict_len),
    method("__contains__", 2, dict_contains),
    method("__getitem__", 2, dict_getitem),
];

fn receiver_dict(rt: &Runtime, args: &[RawObject], selector: &str) -> VmResult<memory_manager::Dict> {
    memory_manager::Dict::cast(rt.heap(), args[0])
        .ok_or_else(|| descriptor_error(rt, selector, "dict", args[0]))
}

fn dict_new(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    if args.len() > 1 {
        return Err(VmError::type_error("dict() takes no positional arguments"));
    }
    rt.new_dict()
}

fn dict_len(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let dict = receiver_dict(rt, args, "__len__")?;
    Ok(RawObject::small_int(dict.len(rt.heap()) as i64))
}

fn dict_contains(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    receiver_dict(rt, args, "__contains__")?;
    Ok(RawObject::bool(rt.dict_at(args[0], args[1])?.is_some()))
}

fn dict_getitem(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    receiver_dict(rt, args, "__getitem__")?;
    rt.dict_at(args[0], args[1])?
        .ok_or_else(|| VmError::new(ErrorKind::KeyError, rt.display_value(args[1])))
}

// ----------------------------------------------------------------------
// BaseException
// ----------------------------------------------------------------------

const EXCEPTION_METHODS: &[Method] = &[
    variadic("__init__", 1, exception_init),
    method("__repr__", 1, exception_repr),
];

fn exception_init(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    if !rt.is_exception(args[0]) {
        return Err(descriptor_error(rt, "__init__", "BaseException", args[0]));
    }
    let mut live = args.to_vec();
    let tuple = rt.allocate_with(&mut live, |heap, live| heap.create_tuple_from(&live[1..]))?;
    rt.heap_mut().set_field(live[0], exception_fields::ARGS, tuple);
    Ok(RawObject::none())
}

fn exception_repr(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let name = rt.type_name_of(args[0]);
    let exception_args = rt.exception_args(args[0]);
    let inner = match rt.tuple_items(exception_args) {
        Some(items) if items.len() == 1 => repr(rt, items[0])?,
        Some(items) if items.is_empty() => String::new(),
        Some(_) => {
            let text = repr(rt, exception_args)?;
            text.trim_start_matches('(').trim_end_matches(')').to_string()
        }
        None => String::new(),
    };
    rt.new_str(&format!("{}({})", name, inner))
}

// ----------------------------------------------------------------------
// The builtins module
// ----------------------------------------------------------------------

const MODULE_FUNCTIONS: &[Method] = &[
    variadic("__build_class__", 2, builtin_build_class),
    method("abs", 1, builtin_abs),
    method("callable", 1, builtin_callable),
    method("delattr", 2, builtin_delattr),
    variadic("getattr", 2, builtin_getattr),
    method("hasattr", 2, builtin_hasattr),
    method("hash", 1, builtin_hash),
    method("id", 1, builtin_id),
    method("isinstance", 2, builtin_isinstance),
    method("issubclass", 2, builtin_issubclass),
    method("len", 1, builtin_len),
    variadic("print", 0, builtin_print),
    method("repr", 1, builtin_repr),
    method("setattr", 3, builtin_setattr),
];

/// Run a class body in a fresh namespace and create the class from it.
fn builtin_build_class(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    if !rt.is_function(args[0]) {
        return Err(VmError::type_error("__build_class__: func must be a function"));
    }
    if !rt.is_str(args[1]) {
        return Err(VmError::type_error("__build_class__: name is not a string"));
    }
    rt.with_handles(|rt| {
        let body = rt.new_handle(args[0]);
        let name = rt.new_handle(args[1]);
        let bases = rt.new_tuple_from(&args[2..])?;
        let bases = rt.new_handle(bases);
        let namespace = rt.new_dict()?;
        let namespace = rt.new_handle(namespace);
        let code = Code::from_raw(Function::from_raw(rt.handle(body)).code(rt.heap()));
        let locals = vec![RawObject::unbound(); code.total_locals(rt.heap())];
        let body_function = rt.handle(body);
        let names = rt.handle(namespace);
        interpreter::execute(rt, body_function, locals, Some(names))?;
        rt.new_type(rt.handle(name), rt.handle(bases), rt.handle(namespace))
    })
}

fn builtin_abs(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    match rt.special_method(args[0], "__abs__")? {
        Some(method) => rt.call(method, &[args[0]]),
        None => Err(VmError::type_error(format!(
            "bad operand type for abs(): '{}'",
            rt.type_name_of(args[0])
        ))),
    }
}

fn builtin_callable(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let callable = rt.unwrap_callable(args[0]).is_some()
        || rt.is_type(args[0])
        || rt.special_method(args[0], "__call__")?.is_some();
    Ok(RawObject::bool(callable))
}

fn attribute_name(rt: &Runtime, name: RawObject, function: &str) -> VmResult<RawObject> {
    if rt.is_str(name) {
        Ok(name)
    } else {
        Err(VmError::type_error(format!("{}(): attribute name must be string", function)))
    }
}

fn builtin_delattr(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let name = attribute_name(rt, args[1], "delattr")?;
    let name = rt.intern_object(name);
    rt.delete_attribute(args[0], name)?;
    Ok(RawObject::none())
}

fn builtin_getattr(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let default = match args.len() {
        2 => None,
        3 => Some(args[2]),
        given => {
            return Err(VmError::type_error(format!(
                "getattr expected at most 3 arguments, got {}",
                given
            )))
        }
    };
    let name = attribute_name(rt, args[1], "getattr")?;
    let name = rt.intern_object(name);
    let Some(default) = default else {
        return rt.get_attribute(args[0], name);
    };
    rt.with_handles(|rt| {
        let default = rt.new_handle(default);
        match rt.get_attribute(args[0], name) {
            Err(error) if error.kind == ErrorKind::AttributeError => {
                rt.clear_pending_exception();
                Ok(rt.handle(default))
            }
            result => result,
        }
    })
}

fn builtin_hasattr(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let name = attribute_name(rt, args[1], "hasattr")?;
    let name = rt.intern_object(name);
    Ok(RawObject::bool(rt.has_attribute(args[0], name)?))
}

fn builtin_hash(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    match rt.special_method(args[0], "__hash__")? {
        Some(method) => {
            let result = rt.call(method, &[args[0]])?;
            if rt.int_value(result).is_none() {
                return Err(VmError::type_error("__hash__ method should return an integer"));
            }
            Ok(result)
        }
        None => Err(VmError::type_error(format!(
            "unhashable type: '{}'",
            rt.type_name_of(args[0])
        ))),
    }
}

fn builtin_id(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    Ok(RawObject::small_int(rt.identity_hash(args[0])))
}

fn class_candidates(rt: &Runtime, classes: RawObject, function: &str) -> VmResult<Vec<RawObject>> {
    let candidates = rt.tuple_items(classes).unwrap_or_else(|| vec![classes]);
    if candidates.iter().any(|candidate| !rt.is_type(*candidate)) {
        return Err(VmError::type_error(format!(
            "{}() arg 2 must be a type or tuple of types",
            function
        )));
    }
    Ok(candidates)
}

fn builtin_isinstance(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let candidates = class_candidates(rt, args[1], "isinstance")?;
    Ok(RawObject::bool(
        candidates.iter().any(|candidate| rt.is_instance(args[0], *candidate)),
    ))
}

fn builtin_issubclass(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    if !rt.is_type(args[0]) {
        return Err(VmError::type_error("issubclass() arg 1 must be a class"));
    }
    let candidates = class_candidates(rt, args[1], "issubclass")?;
    Ok(RawObject::bool(
        candidates.iter().any(|candidate| rt.is_subtype(args[0], *candidate)),
    ))
}

fn builtin_len(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let Some(method) = rt.special_method(args[0], "__len__")? else {
        return Err(VmError::type_error(format!(
            "object of type '{}' has no len()",
            rt.type_name_of(args[0])
        )));
    };
    rt.call(method, &[args[0]])
}

fn builtin_print(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let parts = rt.with_handles(|rt| {
        let handles: Vec<Handle> = args.iter().map(|arg| rt.new_handle(*arg)).collect();
        let mut parts = Vec::with_capacity(handles.len());
        for handle in handles {
            let value = rt.handle(handle);
            parts.push(str_text(rt, value)?);
        }
        Ok(parts)
    })?;
    let mut line = parts.join(" ");
    line.push('\n');
    rt.write_stdout(&line)?;
    Ok(RawObject::none())
}

fn builtin_repr(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let text = repr(rt, args[0])?;
    rt.new_str(&text)
}

fn builtin_setattr(rt: &mut Runtime, args: &[RawObject]) -> VmResult<RawObject> {
    let name = attribute_name(rt, args[1], "setattr")?;
    let name = rt.intern_object(name);
    rt.set_attribute(args[0], name, args[2])?;
    Ok(RawObject::none())
}
