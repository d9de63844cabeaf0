//! Layout identifiers.

use std::fmt;

/// Identifies the structural layout of an object.
///
/// Immediate layouts reuse the low tag bits of their words. Heap layouts
/// start at [`LayoutId::OBJECT`]; every builtin heap layout has a fixed id
/// and layouts created at run time (user types and their attribute
/// transitions) are numbered from [`LayoutId::LAST_BUILTIN`] + 1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutId(u32);

impl LayoutId {
    /// Number of bits a layout id occupies in a header word.
    pub const BITS: u32 = 20;
    /// Largest layout id that fits in a header.
    pub const MAX: LayoutId = LayoutId((1 << Self::BITS) - 1);

    // Immediates
    /// SmallInt
    pub const SMALL_INT: LayoutId = LayoutId(0);
    /// Bool
    pub const BOOL: LayoutId = LayoutId(7);
    /// NoneType
    pub const NONE_TYPE: LayoutId = LayoutId(15);
    /// Error immediates; no type is associated with it
    pub const ERROR: LayoutId = LayoutId(23);
    /// SmallStr
    pub const SMALL_STR: LayoutId = LayoutId(31);

    // Heap objects
    /// Plain `object` instances
    pub const OBJECT: LayoutId = LayoutId(32);
    /// AttributeError instances
    pub const ATTRIBUTE_ERROR: LayoutId = LayoutId(33);
    /// BaseException instances
    pub const BASE_EXCEPTION: LayoutId = LayoutId(34);
    /// Bound methods
    pub const BOUND_METHOD: LayoutId = LayoutId(35);
    /// Immutable byte strings longer than a word
    pub const LARGE_BYTES: LayoutId = LayoutId(36);
    /// Code objects
    pub const CODE: LayoutId = LayoutId(37);
    /// Dictionaries
    pub const DICT: LayoutId = LayoutId(38);
    /// EOFError instances
    pub const EOF_ERROR: LayoutId = LayoutId(39);
    /// Exception instances
    pub const EXCEPTION: LayoutId = LayoutId(40);
    /// Boxed floats
    pub const FLOAT: LayoutId = LayoutId(41);
    /// Functions
    pub const FUNCTION: LayoutId = LayoutId(42);
    /// ImportError instances
    pub const IMPORT_ERROR: LayoutId = LayoutId(43);
    /// IndexError instances
    pub const INDEX_ERROR: LayoutId = LayoutId(44);
    /// The layout of the `int` type itself
    pub const INT: LayoutId = LayoutId(45);
    /// Multi-digit integers
    pub const LARGE_INT: LayoutId = LayoutId(46);
    /// Strings longer than a word
    pub const LARGE_STR: LayoutId = LayoutId(47);
    /// MemoryError instances
    pub const MEMORY_ERROR: LayoutId = LayoutId(48);
    /// Mutable byte buffers
    pub const MUTABLE_BYTES: LayoutId = LayoutId(49);
    /// NameError instances
    pub const NAME_ERROR: LayoutId = LayoutId(50);
    /// NotImplementedError instances
    pub const NOT_IMPLEMENTED_ERROR: LayoutId = LayoutId(51);
    /// The `NotImplemented` singleton
    pub const NOT_IMPLEMENTED_TYPE: LayoutId = LayoutId(52);
    /// OverflowError instances
    pub const OVERFLOW_ERROR: LayoutId = LayoutId(53);
    /// RecursionError instances
    pub const RECURSION_ERROR: LayoutId = LayoutId(54);
    /// RuntimeError instances
    pub const RUNTIME_ERROR: LayoutId = LayoutId(55);
    /// The layout of the `str` type itself
    pub const STR: LayoutId = LayoutId(56);
    /// SystemError instances
    pub const SYSTEM_ERROR: LayoutId = LayoutId(57);
    /// Tuples
    pub const TUPLE: LayoutId = LayoutId(58);
    /// Types
    pub const TYPE: LayoutId = LayoutId(59);
    /// TypeError instances
    pub const TYPE_ERROR: LayoutId = LayoutId(60);
    /// Mutable single-value boxes
    pub const VALUE_CELL: LayoutId = LayoutId(61);
    /// ValueError instances
    pub const VALUE_ERROR: LayoutId = LayoutId(62);
    /// Weakly referencing list nodes
    pub const WEAK_LINK: LayoutId = LayoutId(63);
    /// ZeroDivisionError instances
    pub const ZERO_DIVISION_ERROR: LayoutId = LayoutId(64);
    /// KeyError instances
    pub const KEY_ERROR: LayoutId = LayoutId(65);
    /// Last id reserved for builtin layouts
    pub const LAST_BUILTIN: LayoutId = LayoutId(65);

    /// Wrap a raw id.
    pub const fn from_raw(id: u32) -> Self {
        LayoutId(id)
    }

    /// The raw id.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is one of the immediate layouts.
    pub const fn is_immediate(self) -> bool {
        self.0 < Self::OBJECT.0
    }

    /// Whether this layout was created at run time.
    pub const fn is_user_defined(self) -> bool {
        self.0 > Self::LAST_BUILTIN.0
    }
}

impl fmt::Debug for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayoutId({})", self.0)
    }
}

impl fmt::Display for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
