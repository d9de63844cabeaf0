//! Unit tests for core_types

mod test_error;
mod test_hash;
mod test_raw;
