use core::fmt::Debug;
use core::iter::FusedIterator;

use crate::error::AlreadyPresent;
use crate::hash_table::DEFAULT_EMPTY_KEY;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;

/// A map from `u32` keys to values, stored as `(u32, V)` records in a
/// [`HashTable`].
///
/// Like the table, the map does not overwrite on insert: inserting a key
/// that is present leaves the stored value in place and returns
/// [`AlreadyPresent`]. Use [`get_mut`](IntMap::get_mut) or
/// [`entry`](IntMap::entry) to update.
///
/// One key value, [`DEFAULT_EMPTY_KEY`] unless chosen with
/// [`with_empty_key`](IntMap::with_empty_key), is reserved and cannot be
/// stored.
#[derive(Clone)]
pub struct IntMap<V> {
    table: HashTable<(u32, V)>,
}

impl<V: Debug> Debug for IntMap<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V: PartialEq> PartialEq for IntMap<V> {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<V: Eq> Eq for IntMap<V> {}

impl<V> Default for IntMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IntMap<V> {
    /// Creates an empty map reserving [`DEFAULT_EMPTY_KEY`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::IntMap;
    ///
    /// let map: IntMap<String> = IntMap::new();
    /// assert!(map.is_empty());
    /// ```
    pub const fn new() -> Self {
        Self::with_empty_key(DEFAULT_EMPTY_KEY)
    }

    /// Creates an empty map that reserves `empty_key` instead.
    pub const fn with_empty_key(empty_key: u32) -> Self {
        Self {
            table: HashTable::new(empty_key),
        }
    }

    /// Creates a map able to hold `capacity` entries without growing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::IntMap;
    ///
    /// let map: IntMap<u8> = IntMap::with_capacity(100);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: HashTable::with_capacity(DEFAULT_EMPTY_KEY, capacity),
        }
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of entries the map can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all entries and frees the backing buffer.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Ensures the map can hold `capacity` entries in total without growing.
    pub fn reserve(&mut self, capacity: usize) {
        self.table.reserve(capacity);
    }

    /// Inserts `value` under `key` unless the key is already present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::AlreadyPresent;
    /// use mapi::IntMap;
    ///
    /// let mut map = IntMap::new();
    /// assert_eq!(map.insert(37, "a"), Ok(&mut "a"));
    /// assert_eq!(map.insert(37, "b"), Err(AlreadyPresent { key: 37 }));
    /// assert_eq!(map.get(37), Some(&"a"));
    /// ```
    pub fn insert(&mut self, key: u32, value: V) -> Result<&mut V, AlreadyPresent> {
        self.table.insert((key, value)).map(|(_, v)| v)
    }

    /// Returns a reference to the value stored under `key`.
    pub fn get(&self, key: u32) -> Option<&V> {
        self.table.find(key).map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value stored under `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::IntMap;
    ///
    /// let mut map = IntMap::new();
    /// map.insert(1, String::from("hello")).unwrap();
    ///
    /// if let Some(value) = map.get_mut(1) {
    ///     value.push_str(" world");
    /// }
    /// assert_eq!(map.get(1).map(String::as_str), Some("hello world"));
    /// ```
    pub fn get_mut(&mut self, key: u32) -> Option<&mut V> {
        self.table.find_mut(key).map(|(_, v)| v)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: u32) -> bool {
        self.table.contains_key(key)
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: u32) -> Option<V> {
        self.table.remove(key).map(|(_, v)| v)
    }

    /// Removes `key`, returning the stored key and value.
    pub fn remove_entry(&mut self, key: u32) -> Option<(u32, V)> {
        self.table.remove(key)
    }

    /// Gets the entry for `key` for in-place manipulation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::IntMap;
    ///
    /// let mut counts: IntMap<usize> = IntMap::new();
    /// for word in [3, 1, 3, 3] {
    ///     *counts.entry(word).or_insert(0) += 1;
    /// }
    /// assert_eq!(counts.get(3), Some(&3));
    /// assert_eq!(counts.get(1), Some(&1));
    /// ```
    pub fn entry(&mut self, key: u32) -> Entry<'_, V> {
        match self.table.entry(key) {
            TableEntry::Occupied(inner) => Entry::Occupied(OccupiedEntry { inner }),
            TableEntry::Vacant(inner) => Entry::Vacant(VacantEntry { inner }),
        }
    }

    /// Returns an iterator over the entries in slot order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the keys in slot order.
    pub fn keys(&self) -> Keys<'_, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values in slot order.
    pub fn values(&self) -> Values<'_, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over mutable references to the values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, V> {
        ValuesMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Removes and yields every entry. The backing buffer is kept.
    pub fn drain(&mut self) -> Drain<'_, V> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<V> Extend<(u32, V)> for IntMap<V> {
    /// Inserts every pair; pairs whose key is already present are dropped.
    fn extend<I: IntoIterator<Item = (u32, V)>>(&mut self, iter: I) {
        self.table.extend(iter);
    }
}

impl<V> FromIterator<(u32, V)> for IntMap<V> {
    fn from_iter<I: IntoIterator<Item = (u32, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<'a, V> IntoIterator for &'a IntMap<V> {
    type IntoIter = Iter<'a, V>;
    type Item = (u32, &'a V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`IntMap`].
///
/// [`entry`]: IntMap::entry
pub enum Entry<'a, V> {
    /// A vacant entry.
    Vacant(VacantEntry<'a, V>),
    /// An occupied entry.
    Occupied(OccupiedEntry<'a, V>),
}

impl<'a, V> Entry<'a, V> {
    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the value computed by `default` if the entry is vacant.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to the value if the entry is occupied.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// The key of this entry.
    pub fn key(&self) -> u32 {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

impl<'a, V: Default> Entry<'a, V> {
    /// Inserts `V::default()` if the entry is vacant.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(V::default)
    }
}

/// A view into a vacant entry in an [`IntMap`].
pub struct VacantEntry<'a, V> {
    inner: crate::hash_table::VacantEntry<'a, (u32, V)>,
}

impl<'a, V> VacantEntry<'a, V> {
    /// The key of this entry.
    pub fn key(&self) -> u32 {
        self.inner.key()
    }

    /// Inserts `value` and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        let key = self.inner.key();
        &mut self.inner.insert((key, value)).1
    }
}

/// A view into an occupied entry in an [`IntMap`].
pub struct OccupiedEntry<'a, V> {
    inner: crate::hash_table::OccupiedEntry<'a, (u32, V)>,
}

impl<'a, V> OccupiedEntry<'a, V> {
    /// The key of this entry.
    pub fn key(&self) -> u32 {
        self.inner.key()
    }

    /// Gets a reference to the value.
    pub fn get(&self) -> &V {
        &self.inner.get().1
    }

    /// Gets a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.inner.get_mut().1
    }

    /// Converts the entry into a mutable reference with the entry's lifetime.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.inner.into_mut().1
    }

    /// Replaces the value, returning the old one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }

    /// Removes the entry, returning its value.
    pub fn remove(self) -> V {
        self.inner.remove().1
    }
}

/// An iterator over the entries of an [`IntMap`].
pub struct Iter<'a, V> {
    inner: crate::hash_table::Iter<'a, (u32, V)>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (u32, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}
impl<V> FusedIterator for Iter<'_, V> {}

/// An iterator over the keys of an [`IntMap`].
pub struct Keys<'a, V> {
    inner: Iter<'a, V>,
}

impl<V> Iterator for Keys<'_, V> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// An iterator over the values of an [`IntMap`].
pub struct Values<'a, V> {
    inner: Iter<'a, V>,
}

impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A mutable iterator over the values of an [`IntMap`].
pub struct ValuesMut<'a, V> {
    inner: crate::hash_table::IterMut<'a, (u32, V)>,
}

impl<'a, V> Iterator for ValuesMut<'a, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A draining iterator over the entries of an [`IntMap`].
pub struct Drain<'a, V> {
    inner: crate::hash_table::Drain<'a, (u32, V)>,
}

impl<V> Iterator for Drain<'_, V> {
    type Item = (u32, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
