/// A fixed-size value stored inline in a [`HashTable`] slot.
///
/// Every record carries a 32-bit key which the table hashes to find its slot.
/// Records are moved into the table by value and released through their
/// `Drop` implementation when erased, rejected as duplicates, or when the
/// table is cleared.
///
/// The table reserves one key value per instance as its empty-slot sentinel
/// (see [`HashTable::empty_key`]). Records must never report that key.
///
/// # Examples
///
/// ```rust
/// use mapi::HashTable;
/// use mapi::Record;
///
/// #[derive(Debug, PartialEq)]
/// struct Sample {
///     id: u32,
///     reading: f32,
/// }
///
/// impl Record for Sample {
///     fn key(&self) -> u32 {
///         self.id
///     }
///
///     fn set_key(&mut self, key: u32) {
///         self.id = key;
///     }
/// }
///
/// let mut table = HashTable::new(0);
/// table.insert(Sample { id: 7, reading: 1.5 }).unwrap();
/// assert_eq!(table.find(7).map(|s| s.reading), Some(1.5));
/// ```
///
/// [`HashTable`]: crate::HashTable
/// [`HashTable::empty_key`]: crate::HashTable::empty_key
pub trait Record {
    /// Returns the key this record is filed under.
    fn key(&self) -> u32;

    /// Overwrites the key this record is filed under.
    ///
    /// The table only calls this from [`VacantEntry::insert`], to stamp the
    /// entry's key onto the supplied record.
    ///
    /// [`VacantEntry::insert`]: crate::hash_table::VacantEntry::insert
    fn set_key(&mut self, key: u32);
}

impl Record for u32 {
    #[inline(always)]
    fn key(&self) -> u32 {
        *self
    }

    #[inline(always)]
    fn set_key(&mut self, key: u32) {
        *self = key;
    }
}

impl<V> Record for (u32, V) {
    #[inline(always)]
    fn key(&self) -> u32 {
        self.0
    }

    #[inline(always)]
    fn set_key(&mut self, key: u32) {
        self.0 = key;
    }
}
