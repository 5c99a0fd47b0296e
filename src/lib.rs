#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod buffer;

mod error;

pub mod hash;

pub mod hash_table;

/// A `u32`-keyed map built on `HashTable`.
///
/// Stores `(u32, V)` records and exposes a key-value interface whose
/// `insert` refuses duplicates instead of overwriting.
pub mod int_map;

/// A set of `u32` values built on `HashTable`.
pub mod int_set;

mod record;

pub use buffer::BufferAllocator;
pub use buffer::Global;
pub use error::AlreadyPresent;
pub use error::InsertError;
pub use error::TryReserveError;
pub use hash::MIN_CAPACITY;
pub use hash_table::DEFAULT_EMPTY_KEY;
pub use hash_table::HashTable;
pub use int_map::IntMap;
pub use int_set::IntSet;
pub use record::Record;
