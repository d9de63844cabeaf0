//! Heap object header words.

use crate::layout::LayoutId;
use crate::raw::RawObject;

/// How the payload of a heap object is interpreted.
///
/// The collector only scans payload words of the object formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectFormat {
    /// Array of bytes; count is the byte length
    DataArray8 = 0,
    /// Array of raw 64-bit words; count is the word length
    DataArray64 = 3,
    /// Array of object words; count is the element count
    ObjectArray = 5,
    /// Fixed-size instance without object words
    DataInstance = 6,
    /// Fixed-size instance made of object words
    ObjectInstance = 7,
}

impl ObjectFormat {
    fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            0 => Some(ObjectFormat::DataArray8),
            3 => Some(ObjectFormat::DataArray64),
            5 => Some(ObjectFormat::ObjectArray),
            6 => Some(ObjectFormat::DataInstance),
            7 => Some(ObjectFormat::ObjectInstance),
            _ => None,
        }
    }

    /// Whether payload words hold object references the collector must visit.
    pub fn contains_objects(self) -> bool {
        matches!(self, ObjectFormat::ObjectArray | ObjectFormat::ObjectInstance)
    }

    /// Number of payload words for an object with `count` elements.
    pub fn payload_words(self, count: usize) -> usize {
        match self {
            ObjectFormat::DataArray8 => count.div_ceil(crate::WORD_SIZE),
            _ => count,
        }
    }
}

const TAG: u64 = 0b011;
const TAG_MASK: u64 = 0b111;

const FORMAT_OFFSET: u32 = 3;
const FORMAT_MASK: u64 = (1 << 3) - 1;

const LAYOUT_ID_OFFSET: u32 = 6;
const LAYOUT_ID_MASK: u64 = (1 << LayoutId::BITS) - 1;

const HASH_CODE_OFFSET: u32 = 26;
const HASH_CODE_BITS: u32 = 30;

const COUNT_OFFSET: u32 = 56;
const COUNT_MASK: u64 = (1 << 8) - 1;

/// The first word of every heap object.
///
/// Layout of the bits, low to high: 3 tag bits, 3 format bits, 20 layout id
/// bits, 30 hash bits, 8 count bits. A count of [`Header::COUNT_OVERFLOW`]
/// means the real count lives in an overflow word (a SmallInt) placed
/// immediately before the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header(u64);

impl Header {
    /// Count value that flags an overflow word.
    pub const COUNT_OVERFLOW: usize = COUNT_MASK as usize;
    /// Largest count stored in the header itself.
    pub const COUNT_MAX: usize = Self::COUNT_OVERFLOW - 1;
    /// Mask of the hash code bits.
    pub const HASH_CODE_MASK: u64 = (1 << HASH_CODE_BITS) - 1;

    /// Build a header. Counts above [`Self::COUNT_MAX`] are stored as the
    /// overflow marker.
    pub fn new(count: usize, hash: u64, layout_id: LayoutId, format: ObjectFormat) -> Self {
        let count_bits = if count > Self::COUNT_MAX {
            Self::COUNT_OVERFLOW as u64
        } else {
            count as u64
        };
        Header(
            TAG | ((format as u64) << FORMAT_OFFSET)
                | ((layout_id.raw() as u64 & LAYOUT_ID_MASK) << LAYOUT_ID_OFFSET)
                | ((hash & Self::HASH_CODE_MASK) << HASH_CODE_OFFSET)
                | (count_bits << COUNT_OFFSET),
        )
    }

    /// Interpret a word as a header, if it carries the header tag.
    pub fn from_raw(object: RawObject) -> Option<Self> {
        if object.raw() & TAG_MASK == TAG {
            Some(Header(object.raw()))
        } else {
            None
        }
    }

    /// The header as a storable word.
    pub fn as_raw(self) -> RawObject {
        RawObject::from_raw(self.0)
    }

    /// Payload format.
    pub fn format(self) -> ObjectFormat {
        ObjectFormat::from_bits((self.0 >> FORMAT_OFFSET) & FORMAT_MASK)
            .unwrap_or(ObjectFormat::ObjectInstance)
    }

    /// Layout of the object.
    pub fn layout_id(self) -> LayoutId {
        LayoutId::from_raw(((self.0 >> LAYOUT_ID_OFFSET) & LAYOUT_ID_MASK) as u32)
    }

    /// Copy of this header with a different layout.
    pub fn with_layout_id(self, layout_id: LayoutId) -> Self {
        let cleared = self.0 & !(LAYOUT_ID_MASK << LAYOUT_ID_OFFSET);
        Header(cleared | ((layout_id.raw() as u64 & LAYOUT_ID_MASK) << LAYOUT_ID_OFFSET))
    }

    /// Cached hash code; zero when none has been computed.
    pub fn hash_code(self) -> u64 {
        (self.0 >> HASH_CODE_OFFSET) & Self::HASH_CODE_MASK
    }

    /// Copy of this header with a different hash code.
    pub fn with_hash_code(self, hash: u64) -> Self {
        let cleared = self.0 & !(Self::HASH_CODE_MASK << HASH_CODE_OFFSET);
        Header(cleared | ((hash & Self::HASH_CODE_MASK) << HASH_CODE_OFFSET))
    }

    /// Count stored in the header, which may be the overflow marker.
    pub fn count(self) -> usize {
        ((self.0 >> COUNT_OFFSET) & COUNT_MASK) as usize
    }

    /// Whether the real count lives in an overflow word.
    pub fn has_overflow(self) -> bool {
        self.count() == Self::COUNT_OVERFLOW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_fields_roundtrip() {
        let header = Header::new(12, 0x1234, LayoutId::TUPLE, ObjectFormat::ObjectArray);
        assert_eq!(header.count(), 12);
        assert_eq!(header.hash_code(), 0x1234);
        assert_eq!(header.layout_id(), LayoutId::TUPLE);
        assert_eq!(header.format(), ObjectFormat::ObjectArray);
        assert!(!header.has_overflow());
        assert!(header.as_raw().is_header());
    }

    #[test]
    fn test_header_overflow() {
        let header = Header::new(100_000, 0, LayoutId::LARGE_INT, ObjectFormat::DataArray64);
        assert!(header.has_overflow());
        let header = Header::new(Header::COUNT_MAX, 0, LayoutId::TUPLE, ObjectFormat::ObjectArray);
        assert!(!header.has_overflow());
    }

    #[test]
    fn test_header_with_layout_and_hash() {
        let header = Header::new(2, 0, LayoutId::OBJECT, ObjectFormat::ObjectInstance)
            .with_layout_id(LayoutId::from_raw(900))
            .with_hash_code(77);
        assert_eq!(header.layout_id().raw(), 900);
        assert_eq!(header.hash_code(), 77);
        assert_eq!(header.count(), 2);
    }

    #[test]
    fn test_byte_payload_rounds_up() {
        assert_eq!(ObjectFormat::DataArray8.payload_words(0), 0);
        assert_eq!(ObjectFormat::DataArray8.payload_words(9), 2);
        assert_eq!(ObjectFormat::ObjectArray.payload_words(9), 9);
    }
}
