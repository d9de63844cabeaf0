//! Opcode definitions for the stack machine.

use std::fmt;

macro_rules! define_bytecodes {
    ($( $(#[$doc:meta])* $variant:ident = $value:literal => $name:literal, )*) => {
        /// A bytecode instruction.
        ///
        /// Generic opcodes keep the standard numbering; the rewriter's
        /// specialized opcodes are numbered from 200.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Bytecode {
            $( $(#[$doc])* $variant = $value, )*
        }

        impl Bytecode {
            /// Every defined bytecode, in numeric order.
            pub const ALL: &'static [Bytecode] = &[$( Bytecode::$variant, )*];

            /// Decode an opcode byte.
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $( $value => Some(Bytecode::$variant), )*
                    _ => None,
                }
            }

            /// Look up an opcode by its disassembly name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $name => Some(Bytecode::$variant), )*
                    _ => None,
                }
            }

            /// Disassembly name, e.g. `LOAD_ATTR`.
            pub fn name(self) -> &'static str {
                match self {
                    $( Bytecode::$variant => $name, )*
                }
            }
        }
    };
}

define_bytecodes! {
    /// Discard TOS
    PopTop = 1 => "POP_TOP",
    /// Swap the two topmost items
    RotTwo = 2 => "ROT_TWO",
    /// Lift the second and third items one place up, move TOS to third
    RotThree = 3 => "ROT_THREE",
    /// Duplicate TOS
    DupTop = 4 => "DUP_TOP",
    /// Duplicate the two topmost items
    DupTopTwo = 5 => "DUP_TOP_TWO",
    /// Do nothing
    Nop = 9 => "NOP",
    /// `+TOS`
    UnaryPositive = 10 => "UNARY_POSITIVE",
    /// `-TOS`
    UnaryNegative = 11 => "UNARY_NEGATIVE",
    /// `not TOS`
    UnaryNot = 12 => "UNARY_NOT",
    /// `~TOS`
    UnaryInvert = 15 => "UNARY_INVERT",
    /// `TOS1 @ TOS`
    BinaryMatrixMultiply = 16 => "BINARY_MATRIX_MULTIPLY",
    /// `TOS1 @= TOS`
    InplaceMatrixMultiply = 17 => "INPLACE_MATRIX_MULTIPLY",
    /// `TOS1 ** TOS`
    BinaryPower = 19 => "BINARY_POWER",
    /// `TOS1 * TOS`
    BinaryMultiply = 20 => "BINARY_MULTIPLY",
    /// `TOS1 % TOS`
    BinaryModulo = 22 => "BINARY_MODULO",
    /// `TOS1 + TOS`
    BinaryAdd = 23 => "BINARY_ADD",
    /// `TOS1 - TOS`
    BinarySubtract = 24 => "BINARY_SUBTRACT",
    /// `TOS1[TOS]`
    BinarySubscr = 25 => "BINARY_SUBSCR",
    /// `TOS1 // TOS`
    BinaryFloorDivide = 26 => "BINARY_FLOOR_DIVIDE",
    /// `TOS1 / TOS`
    BinaryTrueDivide = 27 => "BINARY_TRUE_DIVIDE",
    /// `TOS1 //= TOS`
    InplaceFloorDivide = 28 => "INPLACE_FLOOR_DIVIDE",
    /// `TOS1 /= TOS`
    InplaceTrueDivide = 29 => "INPLACE_TRUE_DIVIDE",
    /// Re-raise the exception saved by the current handler
    Reraise = 48 => "RERAISE",
    /// `TOS1 += TOS`
    InplaceAdd = 55 => "INPLACE_ADD",
    /// `TOS1 -= TOS`
    InplaceSubtract = 56 => "INPLACE_SUBTRACT",
    /// `TOS1 *= TOS`
    InplaceMultiply = 57 => "INPLACE_MULTIPLY",
    /// `TOS1 %= TOS`
    InplaceModulo = 59 => "INPLACE_MODULO",
    /// `TOS1 << TOS`
    BinaryLshift = 62 => "BINARY_LSHIFT",
    /// `TOS1 >> TOS`
    BinaryRshift = 63 => "BINARY_RSHIFT",
    /// `TOS1 & TOS`
    BinaryAnd = 64 => "BINARY_AND",
    /// `TOS1 ^ TOS`
    BinaryXor = 65 => "BINARY_XOR",
    /// `TOS1 | TOS`
    BinaryOr = 66 => "BINARY_OR",
    /// `TOS1 **= TOS`
    InplacePower = 67 => "INPLACE_POWER",
    /// Push the class builder
    LoadBuildClass = 71 => "LOAD_BUILD_CLASS",
    /// `TOS1 <<= TOS`
    InplaceLshift = 75 => "INPLACE_LSHIFT",
    /// `TOS1 >>= TOS`
    InplaceRshift = 76 => "INPLACE_RSHIFT",
    /// `TOS1 &= TOS`
    InplaceAnd = 77 => "INPLACE_AND",
    /// `TOS1 ^= TOS`
    InplaceXor = 78 => "INPLACE_XOR",
    /// `TOS1 |= TOS`
    InplaceOr = 79 => "INPLACE_OR",
    /// Return TOS to the caller
    ReturnValue = 83 => "RETURN_VALUE",
    /// Pop the innermost handler block
    PopBlock = 87 => "POP_BLOCK",
    /// Leave an exception handler
    PopExcept = 89 => "POP_EXCEPT",
    /// `names[arg] = TOS` in the module namespace
    StoreName = 90 => "STORE_NAME",
    /// `del names[arg]` in the module namespace
    DeleteName = 91 => "DELETE_NAME",
    /// `TOS.names[arg] = TOS1`
    StoreAttr = 95 => "STORE_ATTR",
    /// `del TOS.names[arg]`
    DeleteAttr = 96 => "DELETE_ATTR",
    /// Store TOS to global `names[arg]`
    StoreGlobal = 97 => "STORE_GLOBAL",
    /// Delete global `names[arg]`
    DeleteGlobal = 98 => "DELETE_GLOBAL",
    /// Push `consts[arg]`
    LoadConst = 100 => "LOAD_CONST",
    /// Push `names[arg]` from the module namespace or builtins
    LoadName = 101 => "LOAD_NAME",
    /// Build a tuple from the `arg` topmost items
    BuildTuple = 102 => "BUILD_TUPLE",
    /// Replace TOS with `TOS.names[arg]`
    LoadAttr = 106 => "LOAD_ATTR",
    /// Rich comparison selected by `arg`
    CompareOp = 107 => "COMPARE_OP",
    /// Jump forward by `arg` bytes
    JumpForward = 110 => "JUMP_FORWARD",
    /// Jump to `arg` if TOS is false, else pop
    JumpIfFalseOrPop = 111 => "JUMP_IF_FALSE_OR_POP",
    /// Jump to `arg` if TOS is true, else pop
    JumpIfTrueOrPop = 112 => "JUMP_IF_TRUE_OR_POP",
    /// Jump to `arg`
    JumpAbsolute = 113 => "JUMP_ABSOLUTE",
    /// Pop TOS, jump to `arg` if false
    PopJumpIfFalse = 114 => "POP_JUMP_IF_FALSE",
    /// Pop TOS, jump to `arg` if true
    PopJumpIfTrue = 115 => "POP_JUMP_IF_TRUE",
    /// Push global `names[arg]`
    LoadGlobal = 116 => "LOAD_GLOBAL",
    /// Push a handler block that continues at `pc + arg`
    SetupFinally = 122 => "SETUP_FINALLY",
    /// Push local `arg`
    LoadFast = 124 => "LOAD_FAST",
    /// Store TOS to local `arg`
    StoreFast = 125 => "STORE_FAST",
    /// Unbind local `arg`
    DeleteFast = 126 => "DELETE_FAST",
    /// Raise TOS (`arg` == 1) or re-raise the active exception (`arg` == 0)
    RaiseVarargs = 130 => "RAISE_VARARGS",
    /// Call with `arg` positional arguments
    CallFunction = 131 => "CALL_FUNCTION",
    /// Build a function from the code object on TOS
    MakeFunction = 132 => "MAKE_FUNCTION",
    /// Call with keyword names in a tuple on TOS
    CallFunctionKw = 141 => "CALL_FUNCTION_KW",
    /// Prefix supplying the high bits of the next argument
    ExtendedArg = 144 => "EXTENDED_ARG",
    /// Push the method `names[arg]` of TOS and its receiver
    LoadMethod = 160 => "LOAD_METHOD",
    /// Call a method pushed by LOAD_METHOD with `arg` arguments
    CallMethod = 161 => "CALL_METHOD",

    /// `TOS1 is TOS`
    CompareIs = 200 => "COMPARE_IS",
    /// `TOS1 is not TOS`
    CompareIsNot = 201 => "COMPARE_IS_NOT",
    /// Push the local stored at reversed index `arg`
    LoadFastReverse = 202 => "LOAD_FAST_REVERSE",
    /// Store TOS to the local at reversed index `arg`
    StoreFastReverse = 203 => "STORE_FAST_REVERSE",
    /// Push the immediate encoded in `arg`
    LoadImmediate = 204 => "LOAD_IMMEDIATE",
    /// LOAD_ATTR through cache line `arg`
    LoadAttrCached = 205 => "LOAD_ATTR_CACHED",
    /// LOAD_METHOD through cache line `arg`
    LoadMethodCached = 206 => "LOAD_METHOD_CACHED",
    /// STORE_ATTR through cache line `arg`
    StoreAttrCached = 207 => "STORE_ATTR_CACHED",
    /// Binary operator through cache line `arg`
    BinaryOpCached = 208 => "BINARY_OP_CACHED",
    /// In-place operator through cache line `arg`
    InplaceOpCached = 209 => "INPLACE_OP_CACHED",
    /// Rich comparison through cache line `arg`
    CompareOpCached = 210 => "COMPARE_OP_CACHED",
    /// Read the global whose value cell is cached at `arg`
    LoadGlobalCached = 211 => "LOAD_GLOBAL_CACHED",
    /// Write the global whose value cell is cached at `arg`
    StoreGlobalCached = 212 => "STORE_GLOBAL_CACHED",
}

impl Bytecode {
    /// The opcode byte.
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Whether this opcode reads its argument through an inline cache line.
    pub fn uses_attribute_cache(self) -> bool {
        matches!(
            self,
            Bytecode::LoadAttrCached
                | Bytecode::LoadMethodCached
                | Bytecode::StoreAttrCached
                | Bytecode::BinaryOpCached
                | Bytecode::InplaceOpCached
                | Bytecode::CompareOpCached
        )
    }

    /// The binary operator of a generic BINARY_* opcode.
    pub fn binary_op(self) -> Option<BinaryOp> {
        let op = match self {
            Bytecode::BinaryAdd => BinaryOp::Add,
            Bytecode::BinarySubtract => BinaryOp::Sub,
            Bytecode::BinaryMultiply => BinaryOp::Mul,
            Bytecode::BinaryMatrixMultiply => BinaryOp::Matmul,
            Bytecode::BinaryPower => BinaryOp::Pow,
            Bytecode::BinaryModulo => BinaryOp::Mod,
            Bytecode::BinaryFloorDivide => BinaryOp::Floordiv,
            Bytecode::BinaryTrueDivide => BinaryOp::Truediv,
            Bytecode::BinaryLshift => BinaryOp::Lshift,
            Bytecode::BinaryRshift => BinaryOp::Rshift,
            Bytecode::BinaryAnd => BinaryOp::And,
            Bytecode::BinaryXor => BinaryOp::Xor,
            Bytecode::BinaryOr => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    /// The binary operator of a generic INPLACE_* opcode.
    pub fn inplace_op(self) -> Option<BinaryOp> {
        let op = match self {
            Bytecode::InplaceAdd => BinaryOp::Add,
            Bytecode::InplaceSubtract => BinaryOp::Sub,
            Bytecode::InplaceMultiply => BinaryOp::Mul,
            Bytecode::InplaceMatrixMultiply => BinaryOp::Matmul,
            Bytecode::InplacePower => BinaryOp::Pow,
            Bytecode::InplaceModulo => BinaryOp::Mod,
            Bytecode::InplaceFloorDivide => BinaryOp::Floordiv,
            Bytecode::InplaceTrueDivide => BinaryOp::Truediv,
            Bytecode::InplaceLshift => BinaryOp::Lshift,
            Bytecode::InplaceRshift => BinaryOp::Rshift,
            Bytecode::InplaceAnd => BinaryOp::And,
            Bytecode::InplaceXor => BinaryOp::Xor,
            Bytecode::InplaceOr => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arithmetic and bitwise operators shared by BINARY_* and INPLACE_*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryOp {
    /// `+`
    Add = 0,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `@`
    Matmul,
    /// `**`
    Pow,
    /// `%`
    Mod,
    /// `//`
    Floordiv,
    /// `/`
    Truediv,
    /// `<<`
    Lshift,
    /// `>>`
    Rshift,
    /// `&`
    And,
    /// `^`
    Xor,
    /// `|`
    Or,
}

impl BinaryOp {
    const ALL: [BinaryOp; 13] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Matmul,
        BinaryOp::Pow,
        BinaryOp::Mod,
        BinaryOp::Floordiv,
        BinaryOp::Truediv,
        BinaryOp::Lshift,
        BinaryOp::Rshift,
        BinaryOp::And,
        BinaryOp::Xor,
        BinaryOp::Or,
    ];

    /// Decode an operator stored as an opcode argument.
    pub fn from_arg(arg: i32) -> Option<Self> {
        usize::try_from(arg).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Method implementing the operator, e.g. `__add__`.
    pub fn selector(self) -> &'static str {
        match self {
            BinaryOp::Add => "__add__",
            BinaryOp::Sub => "__sub__",
            BinaryOp::Mul => "__mul__",
            BinaryOp::Matmul => "__matmul__",
            BinaryOp::Pow => "__pow__",
            BinaryOp::Mod => "__mod__",
            BinaryOp::Floordiv => "__floordiv__",
            BinaryOp::Truediv => "__truediv__",
            BinaryOp::Lshift => "__lshift__",
            BinaryOp::Rshift => "__rshift__",
            BinaryOp::And => "__and__",
            BinaryOp::Xor => "__xor__",
            BinaryOp::Or => "__or__",
        }
    }

    /// Reflected method tried on the right operand, e.g. `__radd__`.
    pub fn swapped_selector(self) -> &'static str {
        match self {
            BinaryOp::Add => "__radd__",
            BinaryOp::Sub => "__rsub__",
            BinaryOp::Mul => "__rmul__",
            BinaryOp::Matmul => "__rmatmul__",
            BinaryOp::Pow => "__rpow__",
            BinaryOp::Mod => "__rmod__",
            BinaryOp::Floordiv => "__rfloordiv__",
            BinaryOp::Truediv => "__rtruediv__",
            BinaryOp::Lshift => "__rlshift__",
            BinaryOp::Rshift => "__rrshift__",
            BinaryOp::And => "__rand__",
            BinaryOp::Xor => "__rxor__",
            BinaryOp::Or => "__ror__",
        }
    }

    /// In-place method, e.g. `__iadd__`.
    pub fn inplace_selector(self) -> &'static str {
        match self {
            BinaryOp::Add => "__iadd__",
            BinaryOp::Sub => "__isub__",
            BinaryOp::Mul => "__imul__",
            BinaryOp::Matmul => "__imatmul__",
            BinaryOp::Pow => "__ipow__",
            BinaryOp::Mod => "__imod__",
            BinaryOp::Floordiv => "__ifloordiv__",
            BinaryOp::Truediv => "__itruediv__",
            BinaryOp::Lshift => "__ilshift__",
            BinaryOp::Rshift => "__irshift__",
            BinaryOp::And => "__iand__",
            BinaryOp::Xor => "__ixor__",
            BinaryOp::Or => "__ior__",
        }
    }

    /// Operator symbol for error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Matmul => "@",
            BinaryOp::Pow => "**",
            BinaryOp::Mod => "%",
            BinaryOp::Floordiv => "//",
            BinaryOp::Truediv => "/",
            BinaryOp::Lshift => "<<",
            BinaryOp::Rshift => ">>",
            BinaryOp::And => "&",
            BinaryOp::Xor => "^",
            BinaryOp::Or => "|",
        }
    }
}

/// Comparison selected by the argument of COMPARE_OP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompareOp {
    /// `<`
    Lt = 0,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `is`
    Is,
    /// `is not`
    IsNot,
    /// Exception match in an `except` clause
    ExcMatch,
}

impl CompareOp {
    const ALL: [CompareOp; 11] = [
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Gt,
        CompareOp::Ge,
        CompareOp::In,
        CompareOp::NotIn,
        CompareOp::Is,
        CompareOp::IsNot,
        CompareOp::ExcMatch,
    ];

    /// Decode a comparison stored as an opcode argument.
    pub fn from_arg(arg: i32) -> Option<Self> {
        usize::try_from(arg).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Whether this is one of the six rich comparisons.
    pub fn is_rich(self) -> bool {
        (self as u8) <= CompareOp::Ge as u8
    }

    /// Method implementing a rich comparison.
    pub fn selector(self) -> Option<&'static str> {
        match self {
            CompareOp::Lt => Some("__lt__"),
            CompareOp::Le => Some("__le__"),
            CompareOp::Eq => Some("__eq__"),
            CompareOp::Ne => Some("__ne__"),
            CompareOp::Gt => Some("__gt__"),
            CompareOp::Ge => Some("__ge__"),
            _ => None,
        }
    }

    /// The comparison tried with the operands swapped.
    pub fn swapped(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    /// Operator symbol for error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
            CompareOp::ExcMatch => "exception match",
        }
    }
}
