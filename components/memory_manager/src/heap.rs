//! Semispace heap.
//!
//! The heap owns two equally sized spaces at disjoint virtual address
//! ranges. Objects are allocated in the active space; a collection copies
//! the live ones into the other space and swaps the roles, so a surviving
//! object always changes address.
//!
//! Every object is laid out as an optional overflow word, a [`Header`] word
//! and its payload. A heap [`RawObject`] is the address of the header word
//! tagged as a heap reference.

use core_types::{
    ErrorKind, Header, LayoutId, ObjectFormat, RawObject, VmError, VmResult, WORD_SIZE,
};

use crate::space::{round_to_words, Space};

const WORD: u64 = WORD_SIZE as u64;
/// Virtual address of the first space; nothing is ever mapped at zero.
const FIRST_SPACE_START: u64 = 0x10_0000;
/// Spaces are placed on boundaries of this size with a gap between them.
const SPACE_ALIGNMENT: u64 = 0x10_0000;

/// Counters describing the work done by the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of collections performed
    pub collections: usize,
    /// Bytes copied across all collections
    pub bytes_copied: usize,
    /// Objects copied across all collections
    pub objects_copied: usize,
    /// Weak referents cleared because nothing else kept them alive
    pub weak_referents_cleared: usize,
    /// Bytes live after the most recent collection
    pub last_live_bytes: usize,
}

/// The managed heap.
#[derive(Debug)]
pub struct Heap {
    pub(crate) space: Space,
    pub(crate) reserve: Space,
    pub(crate) stats: GcStats,
    failed_request: Option<usize>,
}

impl Heap {
    /// Creates a heap whose spaces each hold `size` bytes.
    pub fn new(size: usize) -> Self {
        let size = round_to_words(size);
        let span = (size as u64).div_ceil(SPACE_ALIGNMENT) * SPACE_ALIGNMENT;
        let second = FIRST_SPACE_START + span + SPACE_ALIGNMENT;
        Heap {
            space: Space::new(FIRST_SPACE_START, size),
            reserve: Space::new(second, size),
            stats: GcStats::default(),
            failed_request: None,
        }
    }

    /// The active space.
    pub fn space(&self) -> &Space {
        &self.space
    }

    /// Collector statistics.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Allocate a block of `size` bytes and return the word at `offset`
    /// within it as a heap reference.
    ///
    /// Fails with OutOfMemory when the active space cannot fit the block.
    /// Requests larger than the whole space can never succeed, not even
    /// after a collection.
    pub fn allocate(&mut self, size: usize, offset: usize) -> VmResult<RawObject> {
        debug_assert!(offset % WORD_SIZE == 0 && offset < size.max(WORD_SIZE));
        match self.space.allocate(size) {
            Some(address) => Ok(RawObject::from_address(address + offset as u64)),
            None => {
                self.failed_request = Some(size);
                Err(VmError::out_of_memory(size))
            }
        }
    }

    /// Whether a request of `size` bytes can never be satisfied.
    pub fn exceeds_capacity(&self, size: usize) -> bool {
        round_to_words(size) > self.space.size()
    }

    /// Size of the most recent request that did not fit.
    pub fn failed_request(&self) -> Option<usize> {
        self.failed_request
    }

    /// Whether the most recent failed request is larger than a whole space,
    /// so no collection can make room for it.
    pub fn last_failure_is_oversized(&self) -> bool {
        self.failed_request
            .is_some_and(|size| self.exceeds_capacity(size))
    }

    /// Whether `object` refers into the active space.
    pub fn contains(&self, object: RawObject) -> bool {
        object
            .address()
            .is_some_and(|address| self.space.contains(address))
    }

    /// Whether `object` refers into the allocated part of the active space.
    pub fn is_allocated(&self, object: RawObject) -> bool {
        object
            .address()
            .is_some_and(|address| self.space.is_allocated(address))
    }

    fn address(object: RawObject) -> u64 {
        debug_assert!(object.is_heap_object(), "{:?} is not a heap object", object);
        object.address().unwrap_or_default()
    }

    /// Header of a heap object, or `None` for immediates.
    pub fn header(&self, object: RawObject) -> Option<Header> {
        let address = object.address()?;
        Header::from_raw(RawObject::from_raw(self.space.read(address)))
    }

    /// Replace the header of `object`.
    pub fn set_header(&mut self, object: RawObject, header: Header) {
        self.space.write(Self::address(object), header.as_raw().raw());
    }

    /// Layout of any object, immediate or not.
    pub fn layout_id_of(&self, object: RawObject) -> LayoutId {
        if let Some(id) = object.immediate_layout_id() {
            return id;
        }
        self.header(object)
            .map(Header::layout_id)
            .unwrap_or(LayoutId::ERROR)
    }

    /// Element count of a heap object, following the overflow word.
    pub fn count(&self, object: RawObject) -> usize {
        let address = Self::address(object);
        match self.header(object) {
            Some(header) if header.has_overflow() => {
                let overflow = RawObject::from_raw(self.space.read(address - WORD));
                overflow.as_small_int().unwrap_or(0) as usize
            }
            Some(header) => header.count(),
            None => 0,
        }
    }

    fn payload(object: RawObject, index: usize) -> u64 {
        Self::address(object) + WORD + (index * WORD_SIZE) as u64
    }

    /// Object word `index` of an object-format payload.
    pub fn field(&self, object: RawObject, index: usize) -> RawObject {
        RawObject::from_raw(self.space.read(Self::payload(object, index)))
    }

    /// Store `value` into object word `index`.
    pub fn set_field(&mut self, object: RawObject, index: usize, value: RawObject) {
        self.space.write(Self::payload(object, index), value.raw());
    }

    /// Raw word `index` of a data payload.
    pub fn word_at(&self, object: RawObject, index: usize) -> u64 {
        self.space.read(Self::payload(object, index))
    }

    /// Store raw word `index` of a data payload.
    pub fn set_word_at(&mut self, object: RawObject, index: usize, value: u64) {
        self.space.write(Self::payload(object, index), value);
    }

    /// Byte `index` of a byte payload.
    pub fn byte_at(&self, object: RawObject, index: usize) -> u8 {
        self.space
            .read_byte(Self::address(object) + WORD + index as u64)
    }

    /// Store byte `index` of a byte payload.
    pub fn set_byte_at(&mut self, object: RawObject, index: usize, value: u8) {
        self.space
            .write_byte(Self::address(object) + WORD + index as u64, value);
    }

    /// Copy of a byte payload.
    pub fn bytes_of(&self, object: RawObject) -> Vec<u8> {
        (0..self.count(object))
            .map(|index| self.byte_at(object, index))
            .collect()
    }

    /// Allocate an object with an initialized header. Object payloads start
    /// out as None, data payloads as zero.
    pub fn allocate_object(
        &mut self,
        layout_id: LayoutId,
        format: ObjectFormat,
        count: usize,
    ) -> VmResult<RawObject> {
        let overflow = count > Header::COUNT_MAX;
        if overflow && !RawObject::is_small_int_value(count as i64) {
            return Err(VmError::new(
                ErrorKind::OverflowError,
                format!("object of {} elements is too large", count),
            ));
        }
        let prefix = if overflow { WORD_SIZE } else { 0 };
        let payload = format.payload_words(count) * WORD_SIZE;
        let object = self.allocate(prefix + WORD_SIZE + payload, prefix)?;
        let address = Self::address(object);
        if overflow {
            self.space
                .write(address - WORD, RawObject::small_int(count as i64).raw());
        }
        let header = Header::new(count, 0, layout_id, format);
        self.space.write(address, header.as_raw().raw());
        if format.contains_objects() {
            for index in 0..count {
                self.set_field(object, index, RawObject::none());
            }
        }
        Ok(object)
    }

    /// Size in bytes of the block holding the object whose header is at
    /// `address`, and the address the block starts at.
    pub(crate) fn block_of(space: &Space, address: u64) -> Option<(u64, usize)> {
        let header = Header::from_raw(RawObject::from_raw(space.read(address)))?;
        let (start, count) = if header.has_overflow() {
            let overflow = RawObject::from_raw(space.read(address - WORD));
            (address - WORD, overflow.as_small_int()? as usize)
        } else {
            (address, header.count())
        };
        let end = address + WORD + (header.format().payload_words(count) * WORD_SIZE) as u64;
        Some((start, (end - start) as usize))
    }

    /// Visit every object in the active space in allocation order.
    pub fn visit_all_objects(&self, visitor: &mut dyn FnMut(RawObject)) {
        let mut address = self.space.start();
        while address < self.space.fill() {
            let word = RawObject::from_raw(self.space.read(address));
            let header_address = if word.is_small_int() {
                address + WORD
            } else {
                address
            };
            if header_address >= self.space.fill() {
                break;
            }
            let Some((start, size)) = Self::block_of(&self.space, header_address) else {
                break;
            };
            visitor(RawObject::from_address(header_address));
            address = start + size as u64;
        }
    }
}
