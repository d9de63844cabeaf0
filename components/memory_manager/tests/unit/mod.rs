//! Unit tests for memory_manager

mod test_gc;
mod test_heap;
mod test_objects;
