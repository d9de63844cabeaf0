//! Core object representation and error types for the Python runtime.
//!
//! This crate provides the foundational types shared by every other
//! component: the tagged object word, layout identifiers, heap object
//! headers, the error taxonomy, and the hashing algorithms that literal
//! values must agree on.
//!
//! # Overview
//!
//! - [`RawObject`] - Tagged word that is either an immediate or a heap reference
//! - [`LayoutId`] - Structural tag identifying an object's layout
//! - [`Header`] - First word of every heap object
//! - [`VmError`] - Error with kind, message and traceback
//! - [`ErrorKind`] - Classes of runtime errors
//! - [`HashSecret`] - Seed material for string and bytes hashing
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorKind, LayoutId, RawObject, VmError};
//!
//! // Immediates carry their value in the word itself
//! let forty_two = RawObject::small_int(42);
//! assert_eq!(forty_two.as_small_int(), Some(42));
//! assert_eq!(forty_two.immediate_layout_id(), Some(LayoutId::SMALL_INT));
//!
//! let name = RawObject::small_str("spam").unwrap();
//! assert_eq!(name.small_str_bytes().unwrap(), b"spam");
//!
//! // Create an error
//! let error = VmError::new(ErrorKind::TypeError, "'int' object is not callable");
//! assert_eq!(error.to_string(), "TypeError: 'int' object is not callable");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod hash;
mod header;
mod int;
mod layout;
mod raw;

pub use error::{ErrorKind, TracebackEntry, VmError, VmResult};
pub use hash::{hash_bytes, hash_float, hash_int, hash_small_int, siphash24, HashSecret, HASH_MODULUS};
pub use header::{Header, ObjectFormat};
pub use int::{bigint_from_digits, digits_from_bigint, is_canonical, normalize_digits};
pub use layout::LayoutId;
pub use raw::{object_from_oparg, oparg_from_object, RawObject, Sentinel, BITS_PER_BYTE, WORD_SIZE};
