//! Mutual-exclusion primitive for embedding code.
//!
//! The interpreter loop itself is single threaded and takes no locks.
//! Embedders that run their own threads around it get a plain lock that is
//! not tied to a guard's lifetime, and a table that hands such locks out by
//! id.

use std::collections::HashMap;
use std::sync::Arc;

use core_types::{ErrorKind, VmError, VmResult};
use log::trace;
use parking_lot::{Condvar, Mutex as RawMutex};

/// A lock that can be released from any call site, not only by dropping a
/// guard.
#[derive(Debug, Default)]
pub struct Mutex {
    locked: RawMutex<bool>,
    released: Condvar,
}

impl Mutex {
    /// Create an unlocked mutex.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is free, then take it.
    pub fn lock(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.released.wait(&mut locked);
        }
        *locked = true;
    }

    /// Take the lock if it is free. Never blocks.
    pub fn try_lock(&self) -> bool {
        let mut locked = self.locked.lock();
        if *locked {
            return false;
        }
        *locked = true;
        true
    }

    /// Release the lock and wake one waiter.
    pub fn unlock(&self) -> VmResult<()> {
        let mut locked = self.locked.lock();
        if !*locked {
            return Err(VmError::new(ErrorKind::RuntimeError, "release unlocked lock"));
        }
        *locked = false;
        self.released.notify_one();
        Ok(())
    }

    /// Whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}

/// Identifier of a mutex in a [`MutexTable`].
pub type MutexId = u64;

/// Mutexes addressed by id.
///
/// Acquiring clones the entry out of the table first, so a blocked
/// `acquire` never holds the table lock.
#[derive(Debug, Default)]
pub struct MutexTable {
    entries: RawMutex<HashMap<MutexId, Arc<Mutex>>>,
    next_id: RawMutex<MutexId>,
}

impl MutexTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new unlocked mutex.
    pub fn allocate(&self) -> MutexId {
        let id = {
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            *next_id
        };
        self.entries.lock().insert(id, Arc::new(Mutex::new()));
        trace!("allocated mutex {}", id);
        id
    }

    fn entry(&self, id: MutexId) -> VmResult<Arc<Mutex>> {
        self.entries
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| VmError::value_error(format!("unknown mutex {}", id)))
    }

    /// Block until mutex `id` is free, then take it.
    pub fn acquire(&self, id: MutexId) -> VmResult<()> {
        self.entry(id)?.lock();
        Ok(())
    }

    /// Take mutex `id` if it is free.
    pub fn try_acquire(&self, id: MutexId) -> VmResult<bool> {
        Ok(self.entry(id)?.try_lock())
    }

    /// Release mutex `id`.
    pub fn release(&self, id: MutexId) -> VmResult<()> {
        self.entry(id)?.unlock()
    }

    /// Remove mutex `id` from the table.
    pub fn free(&self, id: MutexId) -> VmResult<()> {
        self.entries
            .lock()
            .remove(&id)
            .map(|_| trace!("freed mutex {}", id))
            .ok_or_else(|| VmError::value_error(format!("unknown mutex {}", id)))
    }

    /// Number of live mutexes.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the table holds no mutexes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
