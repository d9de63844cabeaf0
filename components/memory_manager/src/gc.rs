//! Copying garbage collector.
//!
//! This module implements Cheney's algorithm over the heap's two spaces:
//! - The empty space becomes the destination and the spaces swap roles
//! - Roots are copied first, then the destination is scanned breadth-first
//! - A copied object leaves its new reference in its old header word
//! - WeakLink referents are not traced; they are fixed up or cleared last

use core_types::{Header, LayoutId, RawObject, WORD_SIZE};
use log::debug;

use crate::heap::{GcStats, Heap};
use crate::objects::WeakLink;
use crate::space::Space;

const WORD: u64 = WORD_SIZE as u64;

/// Work done by one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Bytes in use before the collection
    pub bytes_before: usize,
    /// Bytes in use after the collection
    pub bytes_after: usize,
    /// Objects copied
    pub objects_copied: usize,
    /// Weak referents cleared
    pub weak_referents_cleared: usize,
}

struct Scavenger<'a> {
    from: &'a mut Space,
    to: &'a mut Space,
    weak_links: Vec<RawObject>,
    objects_copied: usize,
}

impl Scavenger<'_> {
    /// Returns the to-space location of `object`, copying it on first visit.
    fn forward(&mut self, object: RawObject) -> RawObject {
        let Some(address) = object.address() else {
            return object;
        };
        if !self.from.contains(address) {
            return object;
        }
        let word = RawObject::from_raw(self.from.read(address));
        if word.is_heap_object() {
            // Already copied: the header word holds the forwarding reference
            return word;
        }
        let Some((start, size)) = Heap::block_of(&*self.from, address) else {
            return object;
        };
        let Some(destination) = self.to.allocate(size) else {
            // The destination is as large as the source, so live data fits
            debug_assert!(false, "to-space exhausted during collection");
            return object;
        };
        self.to.copy_from(&*self.from, start, destination, size);
        self.objects_copied += 1;
        let moved = RawObject::from_address(destination + (address - start));
        self.from.write(address, moved.raw());
        moved
    }

    /// Scan copied objects until the scan pointer catches up with the fill.
    fn process_grey_objects(&mut self) {
        let mut scan = self.to.start();
        while scan < self.to.fill() {
            let word = RawObject::from_raw(self.to.read(scan));
            let header_address = if word.is_small_int() { scan + WORD } else { scan };
            let Some((start, size)) = Heap::block_of(&*self.to, header_address) else {
                break;
            };
            let Some(header) = Header::from_raw(RawObject::from_raw(self.to.read(header_address)))
            else {
                break;
            };
            if header.format().contains_objects() {
                let count = (start + size as u64 - header_address - WORD) / WORD;
                let mut first = 0;
                if header.layout_id() == LayoutId::WEAK_LINK {
                    self.weak_links.push(RawObject::from_address(header_address));
                    first = WeakLink::REFERENT + 1;
                }
                for index in first as u64..count {
                    let field = header_address + WORD + index * WORD;
                    let value = RawObject::from_raw(self.to.read(field));
                    let moved = self.forward(value);
                    self.to.write(field, moved.raw());
                }
            }
            scan = start + size as u64;
        }
    }
}

impl Heap {
    /// Run a full collection.
    ///
    /// `visit_roots` is called once with a visitor that must be applied to
    /// every root slot; each slot is rewritten to the object's new location.
    /// References not reachable from a root are invalid afterwards.
    pub fn collect<F>(&mut self, visit_roots: F) -> CollectionStats
    where
        F: FnOnce(&mut dyn FnMut(&mut RawObject)),
    {
        let bytes_before = self.space.used();
        std::mem::swap(&mut self.space, &mut self.reserve);
        let (objects_copied, weak_links) = {
            // Phase 1: copy every object reachable from the roots
            let mut scavenger = Scavenger {
                from: &mut self.reserve,
                to: &mut self.space,
                weak_links: Vec::new(),
                objects_copied: 0,
            };
            visit_roots(&mut |root| {
                *root = scavenger.forward(*root);
            });
            scavenger.process_grey_objects();
            (scavenger.objects_copied, scavenger.weak_links)
        };

        // Phase 2: fix up or clear weak referents
        let mut cleared = 0;
        for link in weak_links {
            let referent = self.field(link, WeakLink::REFERENT);
            let Some(address) = referent.address() else {
                continue;
            };
            if !self.reserve.contains(address) {
                continue;
            }
            let word = RawObject::from_raw(self.reserve.read(address));
            if word.is_heap_object() {
                self.set_field(link, WeakLink::REFERENT, word);
            } else {
                self.set_field(link, WeakLink::REFERENT, RawObject::none());
                cleared += 1;
            }
        }

        // Phase 3: the old space is garbage now
        self.reserve.reset();

        let bytes_after = self.space.used();
        self.stats = GcStats {
            collections: self.stats.collections + 1,
            bytes_copied: self.stats.bytes_copied + bytes_after,
            objects_copied: self.stats.objects_copied + objects_copied,
            weak_referents_cleared: self.stats.weak_referents_cleared + cleared,
            last_live_bytes: bytes_after,
        };
        debug!(
            "collection {}: {} -> {} bytes, {} objects copied, {} weak referents cleared",
            self.stats.collections, bytes_before, bytes_after, objects_copied, cleared
        );
        CollectionStats {
            bytes_before,
            bytes_after,
            objects_copied,
            weak_referents_cleared: cleared,
        }
    }
}
