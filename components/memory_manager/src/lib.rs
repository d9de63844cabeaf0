//! Memory Manager - managed heap and garbage collector
//!
//! This component provides:
//! - Bump allocation from word-addressed spaces
//! - A semispace heap with a copying collector (Cheney's algorithm)
//! - Weak referents that the collector clears instead of tracing
//! - Scoped handles that keep objects alive across collections
//! - Typed views over the concrete object layouts
//! - Open-addressed dict objects
//!
//! # Example
//!
//! ```
//! use core_types::RawObject;
//! use memory_manager::{Heap, Tuple};
//!
//! let mut heap = Heap::new(64 * 1024);
//! let mut tuple = heap.create_tuple_from(&[RawObject::small_int(1)]).unwrap();
//! heap.collect(|visit| visit(&mut tuple));
//! assert_eq!(Tuple::from_raw(tuple).at(&heap, 0), RawObject::small_int(1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod dict;
pub mod gc;
pub mod handles;
pub mod heap;
pub mod objects;
pub mod space;

// Re-export main types
pub use dict::Dict;
pub use gc::CollectionStats;
pub use handles::{Handle, HandleScope, Handles};
pub use heap::{GcStats, Heap};
pub use objects::{
    code_flags, exception_fields, type_flags, BoundMethod, Code, CodeFields, Float, Function,
    FunctionFields, LargeInt, MutableBytes, Tuple, Type, ValueCell, WeakLink,
};
pub use space::Space;
