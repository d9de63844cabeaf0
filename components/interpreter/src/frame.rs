//! Call frames.

use arrayvec::ArrayVec;
use core_types::{ErrorKind, RawObject, VmError, VmResult};

/// Maximum nesting of try blocks within one frame.
pub const MAX_BLOCK_DEPTH: usize = 20;

/// What a block on the block stack protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Pushed by SETUP_FINALLY; unwinding jumps to its handler
    SetupFinally,
    /// Pushed when a handler starts; POP_EXCEPT restores the saved exception
    ExceptHandler,
}

/// An entry of the block stack.
#[derive(Debug, Clone, Copy)]
pub struct TryBlock {
    /// Block kind
    pub kind: BlockKind,
    /// Handler offset
    pub handler: usize,
    /// Value stack depth to restore
    pub level: usize,
    /// Exception that was being handled before this handler started
    pub saved_exception: RawObject,
}

/// Activation record of one function call.
#[derive(Debug)]
pub struct Frame {
    /// The executing function
    pub function: RawObject,
    /// Local slots: locals, then free variables, then cell variables.
    /// Unbound marks an unassigned slot.
    pub locals: Vec<RawObject>,
    /// Value stack
    pub stack: Vec<RawObject>,
    /// Try block stack
    pub blocks: ArrayVec<TryBlock, MAX_BLOCK_DEPTH>,
    /// Offset of the next instruction
    pub pc: usize,
    /// Module globals dict of name to ValueCell
    pub globals: RawObject,
    /// Namespace of LOAD_NAME and STORE_NAME. When it is `globals` the
    /// names resolve as globals; otherwise it maps names to plain values.
    pub names: RawObject,
    /// Whether returning from this frame returns to Rust code
    pub is_entry: bool,
}

impl Frame {
    /// New frame for `function` with its locals already bound.
    pub fn new(function: RawObject, locals: Vec<RawObject>, globals: RawObject, stack_hint: usize) -> Self {
        Frame {
            function,
            locals,
            stack: Vec::with_capacity(stack_hint),
            blocks: ArrayVec::new(),
            pc: 0,
            globals,
            names: RawObject::none(),
            is_entry: false,
        }
    }

    /// Push onto the value stack.
    pub fn push(&mut self, value: RawObject) {
        self.stack.push(value);
    }

    /// Pop the value stack.
    pub fn pop(&mut self) -> VmResult<RawObject> {
        self.stack.pop().ok_or_else(stack_underflow)
    }

    /// Value `depth` entries below the top; 0 is the top.
    pub fn peek(&self, depth: usize) -> VmResult<RawObject> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map(|index| self.stack[index])
            .ok_or_else(stack_underflow)
    }

    /// Replace the value `depth` entries below the top.
    pub fn set_peek(&mut self, depth: usize, value: RawObject) -> VmResult<()> {
        let index = self.stack.len().checked_sub(depth + 1).ok_or_else(stack_underflow)?;
        self.stack[index] = value;
        Ok(())
    }

    /// Drop the top `count` values.
    pub fn drop_values(&mut self, count: usize) -> VmResult<()> {
        let len = self.stack.len().checked_sub(count).ok_or_else(stack_underflow)?;
        self.stack.truncate(len);
        Ok(())
    }

    /// The top `count` values, bottom first.
    pub fn top_values(&self, count: usize) -> VmResult<Vec<RawObject>> {
        let start = self.stack.len().checked_sub(count).ok_or_else(stack_underflow)?;
        Ok(self.stack[start..].to_vec())
    }

    /// Push a try block.
    pub fn push_block(&mut self, block: TryBlock) -> VmResult<()> {
        self.blocks
            .try_push(block)
            .map_err(|_| VmError::new(ErrorKind::SystemError, "too many statically nested blocks"))
    }

    /// Apply `visitor` to every object the frame holds.
    pub fn visit(&mut self, visitor: &mut dyn FnMut(&mut RawObject)) {
        visitor(&mut self.function);
        visitor(&mut self.globals);
        visitor(&mut self.names);
        self.locals.iter_mut().for_each(|slot| visitor(slot));
        self.stack.iter_mut().for_each(|slot| visitor(slot));
        for block in self.blocks.iter_mut() {
            visitor(&mut block.saved_exception);
        }
    }
}

fn stack_underflow() -> VmError {
    VmError::new(ErrorKind::SystemError, "value stack underflow")
}
