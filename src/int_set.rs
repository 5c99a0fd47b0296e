use core::fmt::Debug;

use crate::hash_table::DEFAULT_EMPTY_KEY;
use crate::hash_table::HashTable;

/// A set of `u32` values backed by a [`HashTable`] of bare keys.
///
/// One value, [`DEFAULT_EMPTY_KEY`] unless chosen with
/// [`with_empty_key`](IntSet::with_empty_key), marks free slots and cannot
/// be stored. Inserting it is refused and it is never reported as present.
///
/// # Performance Characteristics
///
/// - **Memory**: 8 bytes per slot, 4 for the record and 4 for its key word.
#[derive(Clone, Default)]
pub struct IntSet {
    table: HashTable<u32>,
}

impl PartialEq for IntSet {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|v| other.contains(v))
    }
}

impl Eq for IntSet {}

impl Debug for IntSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl IntSet {
    /// Creates an empty set reserving [`DEFAULT_EMPTY_KEY`].
    pub const fn new() -> Self {
        Self::with_empty_key(DEFAULT_EMPTY_KEY)
    }

    /// Creates an empty set that reserves `empty_key` instead.
    pub const fn with_empty_key(empty_key: u32) -> Self {
        Self {
            table: HashTable::new(empty_key),
        }
    }

    /// Creates a set able to hold `capacity` values without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: HashTable::with_capacity(DEFAULT_EMPTY_KEY, capacity),
        }
    }

    /// Returns the number of values in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no values.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of values the set can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all values and frees the backing buffer.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Ensures the set can hold `capacity` values in total without growing.
    pub fn reserve(&mut self, capacity: usize) {
        self.table.reserve(capacity);
    }

    /// Adds `value` to the set, returning whether it was newly inserted.
    ///
    /// Returns `false` without inserting if `value` is the set's reserved
    /// empty key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::IntSet;
    ///
    /// let mut set = IntSet::new();
    /// assert!(set.insert(2));
    /// assert!(!set.insert(2));
    /// assert_eq!(set.len(), 1);
    ///
    /// assert!(!set.insert(u32::MAX));
    /// assert!(!set.contains(u32::MAX));
    /// ```
    pub fn insert(&mut self, value: u32) -> bool {
        if value == self.table.empty_key() {
            return false;
        }
        self.table.insert(value).is_ok()
    }

    /// Returns `true` if the set contains `value`.
    pub fn contains(&self, value: u32) -> bool {
        value != self.table.empty_key() && self.table.contains_key(value)
    }

    /// Removes `value`, returning whether it was present.
    pub fn remove(&mut self, value: u32) -> bool {
        value != self.table.empty_key() && self.table.remove(value).is_some()
    }

    /// The value this set cannot hold.
    pub fn empty_key(&self) -> u32 {
        self.table.empty_key()
    }

    /// Returns an iterator over the values in slot order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = u32> + '_ {
        self.table.iter().copied()
    }

    /// Removes and yields every value. The backing buffer is kept.
    pub fn drain(&mut self) -> impl ExactSizeIterator<Item = u32> + '_ {
        self.table.drain()
    }
}

impl Extend<u32> for IntSet {
    /// Inserts every value except the reserved empty key.
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        let empty_key = self.table.empty_key();
        self.table.extend(iter.into_iter().filter(|&v| v != empty_key));
    }
}

impl FromIterator<u32> for IntSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
