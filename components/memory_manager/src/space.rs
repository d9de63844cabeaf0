//! Bump-allocated memory region.
//!
//! A space owns a contiguous run of words at a fixed virtual address range.
//! Addresses handed out by a space are byte addresses aligned to the word
//! size, so they can be tagged as heap references without losing bits.

use core_types::WORD_SIZE;

const WORD: u64 = WORD_SIZE as u64;

/// Round `size` up to a whole number of words.
pub fn round_to_words(size: usize) -> usize {
    size.div_ceil(WORD_SIZE) * WORD_SIZE
}

/// A contiguous region allocated by bumping a fill pointer.
///
/// Invariant: `start <= fill <= end`, and every word between `start` and
/// `fill` belongs to exactly one allocated block.
#[derive(Debug)]
pub struct Space {
    start: u64,
    fill: u64,
    words: Vec<u64>,
}

impl Space {
    /// Creates a zeroed space of `size` bytes (rounded down to words)
    /// starting at virtual address `start`.
    pub fn new(start: u64, size: usize) -> Self {
        debug_assert!(start % WORD == 0, "space start must be word aligned");
        Space {
            start,
            fill: start,
            words: vec![0; size / WORD_SIZE],
        }
    }

    /// First address of the space.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last address of the space.
    pub fn end(&self) -> u64 {
        self.start + self.size() as u64
    }

    /// The next address that will be allocated.
    pub fn fill(&self) -> u64 {
        self.fill
    }

    /// Capacity in bytes.
    pub fn size(&self) -> usize {
        self.words.len() * WORD_SIZE
    }

    /// Bytes allocated so far.
    pub fn used(&self) -> usize {
        (self.fill - self.start) as usize
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        (self.end() - self.fill) as usize
    }

    /// Bump-allocate `size` bytes, rounded up to whole words.
    ///
    /// Returns `None` without side effects when the request does not fit.
    pub fn allocate(&mut self, size: usize) -> Option<u64> {
        let size = round_to_words(size);
        if size > self.remaining() {
            return None;
        }
        let address = self.fill;
        self.fill += size as u64;
        Some(address)
    }

    /// Whether `address` lies within the space bounds.
    pub fn contains(&self, address: u64) -> bool {
        self.start <= address && address < self.end()
    }

    /// Whether `address` lies within the allocated part of the space.
    pub fn is_allocated(&self, address: u64) -> bool {
        self.start <= address && address < self.fill
    }

    /// Forget every allocation and zero the words that were in use.
    pub fn reset(&mut self) {
        let used = self.used() / WORD_SIZE;
        self.words[..used].fill(0);
        self.fill = self.start;
    }

    fn index(&self, address: u64) -> usize {
        debug_assert!(self.contains(address), "address {:#x} outside space", address);
        ((address - self.start) / WORD) as usize
    }

    /// Read the word at a word-aligned `address`.
    pub fn read(&self, address: u64) -> u64 {
        self.words[self.index(address)]
    }

    /// Write the word at a word-aligned `address`.
    pub fn write(&mut self, address: u64, value: u64) {
        let index = self.index(address);
        self.words[index] = value;
    }

    /// Read the byte at `address`. Bytes are laid out little-endian within
    /// their word.
    pub fn read_byte(&self, address: u64) -> u8 {
        let word = self.read(address & !(WORD - 1));
        (word >> ((address % WORD) * 8)) as u8
    }

    /// Write the byte at `address`.
    pub fn write_byte(&mut self, address: u64, value: u8) {
        let aligned = address & !(WORD - 1);
        let shift = (address % WORD) * 8;
        let word = self.read(aligned);
        let word = (word & !(0xff << shift)) | ((value as u64) << shift);
        self.write(aligned, word);
    }

    /// Copy `size` bytes of whole words from `source` in `from` to
    /// `destination` in this space.
    pub fn copy_from(&mut self, from: &Space, source: u64, destination: u64, size: usize) {
        let count = size / WORD_SIZE;
        let src = from.index(source);
        let dst = self.index(destination);
        self.words[dst..dst + count].copy_from_slice(&from.words[src..src + count]);
    }
}
