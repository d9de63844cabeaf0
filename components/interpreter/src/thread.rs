//! Execution state of the interpreter thread.

use core_types::RawObject;

use crate::frame::Frame;

/// The call stack and exception state.
#[derive(Debug)]
pub struct Thread {
    /// Active frames, innermost last
    pub frames: Vec<Frame>,
    /// Exception being propagated, or None
    pub pending_exception: RawObject,
    /// Exception whose handler is running, or None
    pub handled_exception: RawObject,
}

impl Default for Thread {
    fn default() -> Self {
        Thread {
            frames: Vec::new(),
            pending_exception: RawObject::none(),
            handled_exception: RawObject::none(),
        }
    }
}

impl Thread {
    /// Creates a thread with an empty call stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether an exception is being propagated.
    pub fn has_pending_exception(&self) -> bool {
        !self.pending_exception.is_none()
    }

    /// Apply `visitor` to every object reachable from the thread.
    pub fn visit(&mut self, visitor: &mut dyn FnMut(&mut RawObject)) {
        visitor(&mut self.pending_exception);
        visitor(&mut self.handled_exception);
        for frame in self.frames.iter_mut() {
            frame.visit(visitor);
        }
    }
}
