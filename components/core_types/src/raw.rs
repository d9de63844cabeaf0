//! Tagged object words.
//!
//! Every value the runtime manipulates is a single 64-bit word. The low bits
//! select the representation:
//!
//! | pattern   | kind        | payload                                  |
//! |-----------|-------------|------------------------------------------|
//! | `.....0`  | SmallInt    | signed value in the upper 63 bits        |
//! | `....01`  | HeapObject  | address of the object's header word      |
//! | `...011`  | Header      | heap object metadata (never a value)     |
//! | `00111`   | Bool        | 0 or 1 in bit 5                          |
//! | `01111`   | NoneType    | nothing                                  |
//! | `10111`   | Error       | a [`Sentinel`] kind in bits 5 and up     |
//! | `11111`   | SmallStr    | length in bits 5..8, bytes from bit 8    |

use std::fmt;

use crate::layout::LayoutId;

/// Size of a machine word in bytes.
pub const WORD_SIZE: usize = 8;

/// Number of bits in a byte.
pub const BITS_PER_BYTE: u32 = 8;

const SMALL_INT_TAG: u64 = 0;
const SMALL_INT_TAG_BITS: u32 = 1;
const SMALL_INT_TAG_MASK: u64 = (1 << SMALL_INT_TAG_BITS) - 1;

const HEAP_OBJECT_TAG: u64 = 0b01;
const HEAP_OBJECT_TAG_MASK: u64 = 0b11;

const HEADER_TAG: u64 = 0b011;
const HEADER_TAG_MASK: u64 = 0b111;

const IMMEDIATE_TAG_BITS: u32 = 5;
const IMMEDIATE_TAG_MASK: u64 = (1 << IMMEDIATE_TAG_BITS) - 1;
const BOOL_TAG: u64 = 0b00111;
const NONE_TAG: u64 = 0b01111;
const ERROR_TAG: u64 = 0b10111;
const SMALL_STR_TAG: u64 = 0b11111;

const SMALL_STR_LENGTH_BITS: u32 = 3;
const SMALL_STR_LENGTH_MASK: u64 = (1 << SMALL_STR_LENGTH_BITS) - 1;

/// Kinds carried by Error immediates.
///
/// An Error immediate is never visible to bytecode. Native code returns it
/// to signal a condition (a pending exception, a failed lookup) without
/// allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Sentinel {
    /// An exception is pending on the current thread
    Exception = 0,
    /// A lookup did not find anything
    NotFound = 1,
    /// An index was outside of a sequence
    OutOfBounds = 2,
    /// The heap could not satisfy an allocation
    OutOfMemory = 3,
    /// An iterator is exhausted
    NoMoreItems = 4,
    /// A slot that has never been assigned (placeholder value cells)
    Unbound = 5,
}

impl Sentinel {
    fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            0 => Some(Sentinel::Exception),
            1 => Some(Sentinel::NotFound),
            2 => Some(Sentinel::OutOfBounds),
            3 => Some(Sentinel::OutOfMemory),
            4 => Some(Sentinel::NoMoreItems),
            5 => Some(Sentinel::Unbound),
            _ => None,
        }
    }
}

/// A tagged object word.
///
/// `RawObject` is `Copy` and compares by bit pattern, which is exactly the
/// `is` relation: immediates are equal when their values are equal, heap
/// references when they point at the same object. A heap reference is only
/// valid until the next collection; code that keeps one across an allocation
/// must hold it in a handle instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawObject(u64);

impl RawObject {
    /// Smallest value representable as a SmallInt.
    pub const SMALL_INT_MIN: i64 = -(1 << (64 - SMALL_INT_TAG_BITS - 1));
    /// Largest value representable as a SmallInt.
    pub const SMALL_INT_MAX: i64 = (1 << (64 - SMALL_INT_TAG_BITS - 1)) - 1;
    /// Maximum number of bytes stored inline in a SmallStr.
    pub const SMALL_STR_MAX_LENGTH: usize = WORD_SIZE - 1;

    /// Reinterpret raw bits as an object word.
    pub const fn from_raw(bits: u64) -> Self {
        RawObject(bits)
    }

    /// The raw bits of this word.
    pub const fn raw(self) -> u64 {
        self.0
    }

    // Constructors

    /// The `None` singleton.
    pub const fn none() -> Self {
        RawObject(NONE_TAG)
    }

    /// `True` or `False`.
    pub const fn bool(value: bool) -> Self {
        RawObject(((value as u64) << IMMEDIATE_TAG_BITS) | BOOL_TAG)
    }

    /// An Error immediate of the given kind.
    pub const fn error(kind: Sentinel) -> Self {
        RawObject(((kind as u64) << IMMEDIATE_TAG_BITS) | ERROR_TAG)
    }

    /// The Error immediate signalling a pending exception.
    pub const fn error_exception() -> Self {
        Self::error(Sentinel::Exception)
    }

    /// The Error immediate returned by failed lookups.
    pub const fn error_not_found() -> Self {
        Self::error(Sentinel::NotFound)
    }

    /// The marker stored in placeholder value cells.
    pub const fn unbound() -> Self {
        Self::error(Sentinel::Unbound)
    }

    /// A SmallInt.
    ///
    /// The value must lie within [`Self::SMALL_INT_MIN`]..=[`Self::SMALL_INT_MAX`];
    /// use [`Self::try_small_int`] when that is not known.
    pub fn small_int(value: i64) -> Self {
        debug_assert!(
            Self::is_small_int_value(value),
            "{} does not fit in a SmallInt",
            value
        );
        RawObject(((value << SMALL_INT_TAG_BITS) as u64) | SMALL_INT_TAG)
    }

    /// A SmallInt, or `None` if the value needs a LargeInt.
    pub fn try_small_int(value: i64) -> Option<Self> {
        if Self::is_small_int_value(value) {
            Some(Self::small_int(value))
        } else {
            None
        }
    }

    /// Whether `value` fits in a SmallInt.
    pub const fn is_small_int_value(value: i64) -> bool {
        value >= Self::SMALL_INT_MIN && value <= Self::SMALL_INT_MAX
    }

    /// A SmallStr holding `value`, if it is short enough.
    pub fn small_str(value: &str) -> Option<Self> {
        Self::small_str_from_bytes(value.as_bytes())
    }

    /// A SmallStr holding `bytes`, if there are at most seven of them.
    pub fn small_str_from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > Self::SMALL_STR_MAX_LENGTH {
            return None;
        }
        let mut bits = SMALL_STR_TAG | ((bytes.len() as u64) << IMMEDIATE_TAG_BITS);
        for (i, byte) in bytes.iter().enumerate() {
            bits |= (*byte as u64) << (BITS_PER_BYTE * (i as u32 + 1));
        }
        Some(RawObject(bits))
    }

    /// The empty string.
    pub const fn empty_str() -> Self {
        RawObject(SMALL_STR_TAG)
    }

    /// A reference to the heap object whose header lives at `address`.
    pub fn from_address(address: u64) -> Self {
        debug_assert!(address % WORD_SIZE as u64 == 0, "unaligned heap address");
        RawObject(address | HEAP_OBJECT_TAG)
    }

    // Predicates

    /// Whether this is a SmallInt.
    pub const fn is_small_int(self) -> bool {
        self.0 & SMALL_INT_TAG_MASK == SMALL_INT_TAG
    }

    /// Whether this is a reference to a heap object.
    pub const fn is_heap_object(self) -> bool {
        self.0 & HEAP_OBJECT_TAG_MASK == HEAP_OBJECT_TAG
    }

    /// Whether this is a header word.
    pub const fn is_header(self) -> bool {
        self.0 & HEADER_TAG_MASK == HEADER_TAG
    }

    /// Whether this is a Bool.
    pub const fn is_bool(self) -> bool {
        self.0 & IMMEDIATE_TAG_MASK == BOOL_TAG
    }

    /// Whether this is `None`.
    pub const fn is_none(self) -> bool {
        self.0 == NONE_TAG
    }

    /// Whether this is an Error immediate of any kind.
    pub const fn is_error(self) -> bool {
        self.0 & IMMEDIATE_TAG_MASK == ERROR_TAG
    }

    /// Whether this is the "not found" Error immediate.
    pub fn is_error_not_found(self) -> bool {
        self == Self::error_not_found()
    }

    /// Whether this is the "exception pending" Error immediate.
    pub fn is_error_exception(self) -> bool {
        self == Self::error_exception()
    }

    /// Whether this is the placeholder marker.
    pub fn is_unbound(self) -> bool {
        self == Self::unbound()
    }

    /// Whether this is a SmallStr.
    pub const fn is_small_str(self) -> bool {
        self.0 & IMMEDIATE_TAG_MASK == SMALL_STR_TAG
    }

    /// Whether this word carries its value inline.
    pub const fn is_immediate(self) -> bool {
        !self.is_heap_object() && !self.is_header()
    }

    // Views

    /// The SmallInt value, if this is a SmallInt.
    pub const fn as_small_int(self) -> Option<i64> {
        if self.is_small_int() {
            Some((self.0 as i64) >> SMALL_INT_TAG_BITS)
        } else {
            None
        }
    }

    /// The Bool value, if this is a Bool.
    pub const fn as_bool(self) -> Option<bool> {
        if self.is_bool() {
            Some(self.0 >> IMMEDIATE_TAG_BITS != 0)
        } else {
            None
        }
    }

    /// The Error kind, if this is an Error immediate.
    pub fn as_error(self) -> Option<Sentinel> {
        if self.is_error() {
            Sentinel::from_bits(self.0 >> IMMEDIATE_TAG_BITS)
        } else {
            None
        }
    }

    /// Length of a SmallStr.
    pub const fn small_str_length(self) -> Option<usize> {
        if self.is_small_str() {
            Some(((self.0 >> IMMEDIATE_TAG_BITS) & SMALL_STR_LENGTH_MASK) as usize)
        } else {
            None
        }
    }

    /// Bytes of a SmallStr.
    pub fn small_str_bytes(self) -> Option<Vec<u8>> {
        let length = self.small_str_length()?;
        Some(
            (0..length)
                .map(|i| (self.0 >> (BITS_PER_BYTE * (i as u32 + 1))) as u8)
                .collect(),
        )
    }

    /// Address of the referenced heap object's header word.
    pub fn address(self) -> Option<u64> {
        if self.is_heap_object() {
            Some(self.0 - HEAP_OBJECT_TAG)
        } else {
            None
        }
    }

    /// Layout of an immediate; `None` for heap references and headers.
    ///
    /// Immediate layout ids equal the low five tag bits, and every even
    /// pattern below 32 is a SmallInt.
    pub fn immediate_layout_id(self) -> Option<LayoutId> {
        if self.is_small_int() {
            Some(LayoutId::SMALL_INT)
        } else if self.is_immediate() {
            Some(LayoutId::from_raw((self.0 & IMMEDIATE_TAG_MASK) as u32))
        } else {
            None
        }
    }

    /// Python truthiness for immediates; heap objects answer `None`.
    pub fn immediate_truthiness(self) -> Option<bool> {
        if let Some(value) = self.as_small_int() {
            return Some(value != 0);
        }
        if let Some(value) = self.as_bool() {
            return Some(value);
        }
        if self.is_none() {
            return Some(false);
        }
        self.small_str_length().map(|length| length != 0)
    }
}

impl Default for RawObject {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(value) = self.as_small_int() {
            write!(f, "SmallInt({})", value)
        } else if let Some(value) = self.as_bool() {
            write!(f, "Bool({})", value)
        } else if self.is_none() {
            write!(f, "None")
        } else if let Some(kind) = self.as_error() {
            write!(f, "Error({:?})", kind)
        } else if let Some(bytes) = self.small_str_bytes() {
            write!(f, "SmallStr({:?})", String::from_utf8_lossy(&bytes))
        } else if let Some(address) = self.address() {
            write!(f, "HeapObject({:#x})", address)
        } else {
            write!(f, "Header({:#x})", self.0)
        }
    }
}

/// Encode an immediate as a LOAD_IMMEDIATE operand.
///
/// The operand is the low byte of the word. Only immediates whose bits
/// sign-extend from that byte survive the round trip through
/// [`object_from_oparg`].
pub fn oparg_from_object(object: RawObject) -> i8 {
    debug_assert!(!object.is_heap_object(), "heap objects are disallowed");
    object.raw() as i8
}

/// Decode a LOAD_IMMEDIATE operand.
pub fn object_from_oparg(arg: i8) -> RawObject {
    RawObject::from_raw(arg as i64 as u64)
}
