//! Hash table objects.
//!
//! A dict keeps its entries in an open-addressed data tuple of
//! `(hash, key, value)` triples probed linearly. Hashes are supplied by the
//! caller, which knows how each key type hashes; keys compare equal when
//! they are identical or are strs with the same contents. Removal shifts the
//! following entries back instead of leaving tombstones.

use core_types::{LayoutId, RawObject, Sentinel, VmResult};

use crate::heap::Heap;
use crate::objects::Tuple;

const ENTRY_WORDS: usize = 3;
const HASH: usize = 0;
const KEY: usize = 1;
const VALUE: usize = 2;
const INITIAL_CAPACITY: usize = 8;

fn empty_key() -> RawObject {
    RawObject::error(Sentinel::NotFound)
}

/// View of a dict object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dict(RawObject);

impl Dict {
    const NUM_ITEMS: usize = 0;
    const DATA: usize = 1;
    const SIZE: usize = 2;

    /// View `object` if it is a dict.
    pub fn cast(heap: &Heap, object: RawObject) -> Option<Self> {
        (object.is_heap_object() && heap.layout_id_of(object) == LayoutId::DICT).then_some(Dict(object))
    }

    /// View `object` without checking its layout.
    pub fn from_raw(object: RawObject) -> Self {
        Dict(object)
    }

    /// The viewed reference.
    pub fn raw(self) -> RawObject {
        self.0
    }

    /// Number of entries.
    pub fn len(self, heap: &Heap) -> usize {
        heap.field(self.0, Self::NUM_ITEMS).as_small_int().unwrap_or(0) as usize
    }

    /// Whether the dict has no entries.
    pub fn is_empty(self, heap: &Heap) -> bool {
        self.len(heap) == 0
    }

    fn data(self, heap: &Heap) -> Tuple {
        Tuple::from_raw(heap.field(self.0, Self::DATA))
    }

    fn capacity(self, heap: &Heap) -> usize {
        self.data(heap).length(heap) / ENTRY_WORDS
    }

    fn stored_hash(hash: i64) -> RawObject {
        // Drop the top bit so every hash fits a SmallInt
        RawObject::small_int((hash << 1) >> 1)
    }

    fn home(hash: RawObject, capacity: usize) -> usize {
        (hash.as_small_int().unwrap_or(0) as u64 % capacity as u64) as usize
    }

    /// Slot holding `key`, or the empty slot where it would go.
    fn probe(self, heap: &Heap, key: RawObject, hash: RawObject) -> Option<(usize, bool)> {
        let capacity = self.capacity(heap);
        if capacity == 0 {
            return None;
        }
        let data = self.data(heap);
        let mut slot = Self::home(hash, capacity);
        for _ in 0..capacity {
            let base = slot * ENTRY_WORDS;
            let candidate = data.at(heap, base + KEY);
            if candidate == empty_key() {
                return Some((slot, false));
            }
            if data.at(heap, base + HASH) == hash && keys_equal(heap, candidate, key) {
                return Some((slot, true));
            }
            slot = (slot + 1) % capacity;
        }
        None
    }

    /// Value stored under `key`.
    pub fn at(self, heap: &Heap, key: RawObject, hash: i64) -> Option<RawObject> {
        let hash = Self::stored_hash(hash);
        match self.probe(heap, key, hash)? {
            (slot, true) => Some(self.data(heap).at(heap, slot * ENTRY_WORDS + VALUE)),
            (_, false) => None,
        }
    }

    /// Store `value` under `key`, growing the table when it gets two thirds
    /// full.
    pub fn at_put(self, heap: &mut Heap, key: RawObject, hash: i64, value: RawObject) -> VmResult<()> {
        let hash = Self::stored_hash(hash);
        if let Some((slot, true)) = self.probe(heap, key, hash) {
            self.data(heap).at_put(heap, slot * ENTRY_WORDS + VALUE, value);
            return Ok(());
        }
        let len = self.len(heap);
        if (len + 1) * 3 > self.capacity(heap) * 2 {
            self.grow(heap)?;
        }
        let Some((slot, _)) = self.probe(heap, key, hash) else {
            return Ok(());
        };
        let data = self.data(heap);
        let base = slot * ENTRY_WORDS;
        data.at_put(heap, base + HASH, hash);
        data.at_put(heap, base + KEY, key);
        data.at_put(heap, base + VALUE, value);
        heap.set_field(self.0, Self::NUM_ITEMS, RawObject::small_int(len as i64 + 1));
        Ok(())
    }

    fn grow(self, heap: &mut Heap) -> VmResult<()> {
        let old = self.data(heap);
        let old_capacity = self.capacity(heap);
        let capacity = (old_capacity * 2).max(INITIAL_CAPACITY);
        let data = Tuple::from_raw(heap.create_tuple(capacity * ENTRY_WORDS)?);
        for slot in 0..capacity {
            data.at_put(heap, slot * ENTRY_WORDS + KEY, empty_key());
        }
        heap.set_field(self.0, Self::DATA, data.raw());
        for slot in 0..old_capacity {
            let base = slot * ENTRY_WORDS;
            let key = old.at(heap, base + KEY);
            if key == empty_key() {
                continue;
            }
            let hash = old.at(heap, base + HASH);
            let mut target = Self::home(hash, capacity);
            while data.at(heap, target * ENTRY_WORDS + KEY) != empty_key() {
                target = (target + 1) % capacity;
            }
            let target_base = target * ENTRY_WORDS;
            data.at_put(heap, target_base + HASH, hash);
            data.at_put(heap, target_base + KEY, key);
            data.at_put(heap, target_base + VALUE, old.at(heap, base + VALUE));
        }
        Ok(())
    }

    /// Remove `key`, returning its value.
    pub fn remove(self, heap: &mut Heap, key: RawObject, hash: i64) -> Option<RawObject> {
        let hash = Self::stored_hash(hash);
        let (mut hole, true) = self.probe(heap, key, hash)? else {
            return None;
        };
        let data = self.data(heap);
        let capacity = self.capacity(heap);
        let value = data.at(heap, hole * ENTRY_WORDS + VALUE);
        let mut next = hole;
        loop {
            next = (next + 1) % capacity;
            let next_key = data.at(heap, next * ENTRY_WORDS + KEY);
            if next_key == empty_key() {
                break;
            }
            let home = Self::home(data.at(heap, next * ENTRY_WORDS + HASH), capacity);
            // Entries whose home lies cyclically in (hole, next] stay put
            let stays = if hole <= next {
                hole < home && home <= next
            } else {
                hole < home || home <= next
            };
            if stays {
                continue;
            }
            for offset in 0..ENTRY_WORDS {
                let word = data.at(heap, next * ENTRY_WORDS + offset);
                data.at_put(heap, hole * ENTRY_WORDS + offset, word);
            }
            hole = next;
        }
        data.at_put(heap, hole * ENTRY_WORDS + HASH, RawObject::none());
        data.at_put(heap, hole * ENTRY_WORDS + KEY, empty_key());
        data.at_put(heap, hole * ENTRY_WORDS + VALUE, RawObject::none());
        let len = self.len(heap);
        heap.set_field(self.0, Self::NUM_ITEMS, RawObject::small_int(len as i64 - 1));
        Some(value)
    }

    /// Entries in table order.
    pub fn items(self, heap: &Heap) -> Vec<(RawObject, RawObject)> {
        let data = self.data(heap);
        (0..self.capacity(heap))
            .filter_map(|slot| {
                let base = slot * ENTRY_WORDS;
                let key = data.at(heap, base + KEY);
                (key != empty_key()).then(|| (key, data.at(heap, base + VALUE)))
            })
            .collect()
    }
}

fn keys_equal(heap: &Heap, left: RawObject, right: RawObject) -> bool {
    left == right || heap.str_equals(left, right)
}

impl Heap {
    /// New empty dict.
    pub fn create_dict(&mut self) -> VmResult<RawObject> {
        let data = self.create_tuple(0)?;
        let dict = self.create_instance(LayoutId::DICT, Dict::SIZE)?;
        self.set_field(dict, Dict::NUM_ITEMS, RawObject::small_int(0));
        self.set_field(dict, Dict::DATA, data);
        Ok(dict)
    }
}
