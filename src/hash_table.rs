//! An open-addressing hash table over fixed-size records keyed by `u32`.
//!
//! Records live inline in a single cache-line aligned buffer. Collisions are
//! resolved with linear probing, the table never exceeds a 50% load factor,
//! and removal closes the gap it leaves with backward-shift repair instead of
//! tombstones, so probe sequences stay as short after churn as after a fresh
//! build.

use alloc::vec::Vec;
use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::buffer::BUFFER_ALIGN;
use crate::buffer::BufferAllocator;
use crate::buffer::Global;
use crate::error::AlreadyPresent;
use crate::error::Fallibility;
use crate::error::InsertError;
use crate::error::TryReserveError;
use crate::hash::buckets_for;
use crate::hash::mix;
use crate::hash::round_buckets;
use crate::record::Record;

/// Empty-slot sentinel used by [`HashTable::default`].
pub const DEFAULT_EMPTY_KEY: u32 = u32::MAX;

#[inline(always)]
fn prefetch<T>(ptr: *const T) {
    cfg_if::cfg_if! {
        if #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))] {
            // SAFETY: Prefetching is a hint and never dereferences `ptr`.
            unsafe {
                use core::arch::x86_64::*;
                _mm_prefetch(ptr as *const i8, _MM_HINT_T0);
            }
        } else {
            let _ = ptr;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DataLayout {
    layout: Layout,
    keys_offset: usize,
}

impl DataLayout {
    const fn empty() -> Self {
        DataLayout {
            layout: Layout::new::<()>(),
            keys_offset: 0,
        }
    }

    /// Record slots first, then one key word per slot, padded out to a whole
    /// number of cache lines. `None` if the size overflows.
    fn new<R>(buckets: usize) -> Option<Self> {
        let slots_layout = Layout::array::<MaybeUninit<R>>(buckets).ok()?;
        let keys_layout = Layout::array::<u32>(buckets).ok()?;

        let base = Layout::from_size_align(0, BUFFER_ALIGN).ok()?;
        let (layout, slots_offset) = base.extend(slots_layout).ok()?;
        debug_assert_eq!(slots_offset, 0);
        let (layout, keys_offset) = layout.extend(keys_layout).ok()?;

        Some(DataLayout {
            layout: layout.pad_to_align(),
            keys_offset,
        })
    }
}

/// Debug statistics for hash table analysis.
///
/// Available in tests and with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of records currently in the table
    pub populated: usize,
    /// Number of slots in the backing buffer
    pub buckets: usize,
    /// Records the table can hold before it grows
    pub capacity: usize,
    /// populated / buckets
    pub load_factor: f64,
    /// Largest distance of any record from its ideal slot
    pub max_probe_length: usize,
    /// Mean distance of records from their ideal slot
    pub mean_probe_length: f64,
    /// Total bytes of the backing buffer
    pub total_bytes: usize,
    /// Bytes held by empty slots
    pub wasted_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} slots ({:.2}% load factor, capacity {})",
            self.populated,
            self.buckets,
            self.load_factor * 100.0,
            self.capacity
        );
        println!(
            "Probe length: max {}, mean {:.3}",
            self.max_probe_length, self.mean_probe_length
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// Counts of records by distance from their ideal slot.
///
/// `bins[d]` is the number of records stored `d` slots past the slot their
/// key hashes to. Available in tests and with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHistogram {
    /// Record counts indexed by probe distance.
    pub bins: Vec<usize>,
}

#[cfg(any(test, feature = "stats"))]
impl ProbeHistogram {
    /// Total number of records counted.
    pub fn total(&self) -> usize {
        self.bins.iter().sum()
    }

    /// Pretty-prints the histogram horizontally using stdout.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = self.bins.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.total());

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            let partial = ['▏', '▎', '▍', '▌', '▋', '▊', '▉'];
            if units % 8 > 0 {
                bar.push(partial[units % 8 - 1]);
            }
            bar
        };

        for (distance, &count) in self.bins.iter().enumerate() {
            println!("{:>3} | {} ({})", distance, make_bar(count), count);
        }
    }
}

/// An open-addressing hash table of [`Record`]s keyed by `u32`.
///
/// Every slot of the backing buffer holds one record inline. A slot is free
/// exactly when its key equals the table's empty-key sentinel, which is
/// fixed at construction and must never be used as a real key.
///
/// The table keeps at least twice as many slots as records. Inserting the
/// record that would break that bound first doubles the buffer, moving every
/// record into a freshly allocated one; the table never shrinks except
/// through [`clear`](HashTable::clear).
///
/// Inserting a key that is already present is not an update: the candidate
/// is dropped and [`AlreadyPresent`] is returned.
///
/// ## Example
///
/// ```rust
/// use mapi::HashTable;
///
/// let mut table: HashTable<(u32, &str)> = HashTable::new(0);
/// table.insert((7, "seven")).unwrap();
/// table.insert((9, "nine")).unwrap();
///
/// assert!(table.insert((7, "again")).is_err());
/// assert_eq!(table.find(7), Some(&(7, "seven")));
///
/// table.erase(7);
/// assert_eq!(table.find(7), None);
/// assert_eq!(table.len(), 1);
/// ```
pub struct HashTable<R, A: BufferAllocator = Global> {
    layout: DataLayout,
    alloc: NonNull<u8>,

    buckets: usize,
    populated: usize,
    empty_key: u32,

    allocator: A,
    _phantom: PhantomData<R>,
}

// SAFETY: The table exclusively owns its buffer and the records in it.
unsafe impl<R: Send, A: BufferAllocator + Send> Send for HashTable<R, A> {}
// SAFETY: Shared access only hands out shared references to records.
unsafe impl<R: Sync, A: BufferAllocator + Sync> Sync for HashTable<R, A> {}

impl<R, A: BufferAllocator> Debug for HashTable<R, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::ToString;

        if self.buckets == 0 {
            return f
                .debug_struct("HashTable")
                .field("slots", &"unallocated")
                .field("populated", &self.populated)
                .field("buckets", &self.buckets)
                .finish();
        }

        f.debug_struct("HashTable")
            .field(
                "slots",
                &self
                    .keys()
                    .chunks(8)
                    .map(|row| {
                        row.iter()
                            .map(|&key| {
                                if key == self.empty_key {
                                    "........".to_string()
                                } else {
                                    format!("{key:08x}")
                                }
                            })
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .collect::<Vec<_>>(),
            )
            .field("populated", &self.populated)
            .field("buckets", &self.buckets)
            .finish()
    }
}

impl<R: Clone, A: BufferAllocator + Clone> Clone for HashTable<R, A> {
    fn clone(&self) -> Self {
        let mut new_table = Self::new_in(self.empty_key, self.allocator.clone());
        if self.buckets == 0 {
            return new_table;
        }

        // Same bucket count means every record keeps its slot, so no probing
        // is needed.
        new_table.rehash(self.buckets);
        debug_assert_eq!(new_table.buckets, self.buckets);

        for (index, &key) in self.keys().iter().enumerate() {
            if key == self.empty_key {
                continue;
            }
            // SAFETY: The slot is occupied per its key word.
            let record = unsafe { self.slots()[index].assume_init_ref() }.clone();
            new_table.write_slot(index, key, record);
        }

        debug_assert_eq!(new_table.populated, self.populated);
        new_table
    }
}

impl<R, A: BufferAllocator> Drop for HashTable<R, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<R> Default for HashTable<R> {
    fn default() -> Self {
        Self::new(DEFAULT_EMPTY_KEY)
    }
}

impl<R> HashTable<R> {
    /// Creates an empty table that treats `empty_key` as the free-slot
    /// sentinel.
    ///
    /// No memory is allocated until the first insert.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let table: HashTable<u32> = HashTable::new(0);
    /// assert_eq!(table.bucket_count(), 0);
    /// assert_eq!(table.find(5), None);
    /// ```
    pub const fn new(empty_key: u32) -> Self {
        Self::new_in(empty_key, Global)
    }

    /// Creates a table able to hold `records` records without growing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let table: HashTable<u32> = HashTable::with_capacity(0, 100);
    /// assert!(table.capacity() >= 100);
    /// assert!(table.bucket_count().is_power_of_two());
    /// ```
    pub fn with_capacity(empty_key: u32, records: usize) -> Self {
        Self::with_capacity_in(empty_key, records, Global)
    }
}

impl<R, A: BufferAllocator> HashTable<R, A> {
    /// Creates an empty table whose buffers come from `allocator`.
    pub const fn new_in(empty_key: u32, allocator: A) -> Self {
        Self {
            layout: DataLayout::empty(),
            alloc: NonNull::dangling(),
            buckets: 0,
            populated: 0,
            empty_key,
            allocator,
            _phantom: PhantomData,
        }
    }

    /// Creates a table able to hold `records` records without growing, with
    /// buffers from `allocator`.
    pub fn with_capacity_in(empty_key: u32, records: usize, allocator: A) -> Self {
        let mut table = Self::new_in(empty_key, allocator);
        table.reserve(records);
        table
    }

    /// The allocator backing this table.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// The key value marking free slots.
    pub const fn empty_key(&self) -> u32 {
        self.empty_key
    }

    /// Byte stride of each slot.
    pub const fn record_size(&self) -> usize {
        size_of::<R>()
    }

    /// Returns the number of records in the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let mut table = HashTable::new(0);
    /// assert_eq!(table.len(), 0);
    /// table.insert(1u32).unwrap();
    /// assert_eq!(table.len(), 1);
    /// ```
    pub const fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table holds no records.
    pub const fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of slots in the backing buffer.
    ///
    /// Always zero or a power of two no smaller than
    /// [`MIN_CAPACITY`](crate::hash::MIN_CAPACITY).
    pub const fn bucket_count(&self) -> usize {
        self.buckets
    }

    /// Returns the number of records the table can hold before it grows.
    pub const fn capacity(&self) -> usize {
        self.buckets / 2
    }

    fn keys_ptr(&self) -> NonNull<[u32]> {
        if self.buckets == 0 {
            return NonNull::slice_from_raw_parts(NonNull::dangling(), 0);
        }
        // SAFETY: The allocation holds `buckets` key words at `keys_offset`.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.keys_offset).cast(),
                self.buckets,
            )
        }
    }

    fn slots_ptr(&self) -> NonNull<[MaybeUninit<R>]> {
        if self.buckets == 0 {
            return NonNull::slice_from_raw_parts(NonNull::dangling(), 0);
        }
        // SAFETY: The allocation starts with `buckets` record slots.
        NonNull::slice_from_raw_parts(self.alloc.cast(), self.buckets)
    }

    #[inline(always)]
    fn keys(&self) -> &[u32] {
        // SAFETY: Every key word is initialized when the buffer is allocated.
        unsafe { self.keys_ptr().as_ref() }
    }

    #[inline(always)]
    fn slots(&self) -> &[MaybeUninit<R>] {
        // SAFETY: `MaybeUninit` carries no initialization requirement.
        unsafe { self.slots_ptr().as_ref() }
    }

    /// Key words and record slots, borrowed mutably together.
    #[inline(always)]
    fn parts_mut(&mut self) -> (&mut [u32], &mut [MaybeUninit<R>]) {
        // SAFETY: The two regions of the allocation are disjoint, and `&mut
        // self` guarantees exclusive access to both.
        unsafe { (self.keys_ptr().as_mut(), self.slots_ptr().as_mut()) }
    }

    #[inline(always)]
    fn ideal_slot(&self, key: u32) -> usize {
        mix(key) as usize & (self.buckets - 1)
    }

    /// Slot holding `key`, or the first free slot on its probe sequence.
    ///
    /// Requires a non-empty buffer, which always has a free slot.
    #[inline]
    fn probe(&self, key: u32) -> usize {
        debug_assert!(self.buckets != 0);
        let mask = self.buckets - 1;
        let keys = self.keys();

        let mut index = self.ideal_slot(key);
        prefetch(self.slots().as_ptr().wrapping_add(index));
        loop {
            let found = keys[index];
            if found == self.empty_key || found == key {
                return index;
            }
            index = (index + 1) & mask;
        }
    }

    /// The slot that holds or would hold `key`. `None` while the table has
    /// no buffer; never allocates.
    #[inline]
    fn at(&self, key: u32) -> Option<usize> {
        if self.buckets == 0 {
            return None;
        }
        Some(self.probe(key))
    }

    #[inline]
    fn find_index(&self, key: u32) -> Option<usize> {
        let index = self.at(key)?;
        if self.keys()[index] == self.empty_key {
            return None;
        }
        Some(index)
    }

    /// Finds the record filed under `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let mut table = HashTable::new(0);
    /// table.insert((42u32, "answer")).unwrap();
    ///
    /// assert_eq!(table.find(42), Some(&(42, "answer")));
    /// assert_eq!(table.find(99), None);
    /// ```
    #[inline]
    pub fn find(&self, key: u32) -> Option<&R> {
        let index = self.find_index(key)?;
        // SAFETY: The slot is occupied per its key word.
        Some(unsafe { self.slots()[index].assume_init_ref() })
    }

    /// Finds the record filed under `key`, returning a mutable reference.
    ///
    /// The record's key must not be changed through the reference.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let mut table = HashTable::new(0);
    /// table.insert((42u32, 1)).unwrap();
    ///
    /// if let Some(record) = table.find_mut(42) {
    ///     record.1 += 1;
    /// }
    /// assert_eq!(table.find(42), Some(&(42, 2)));
    /// ```
    #[inline]
    pub fn find_mut(&mut self, key: u32) -> Option<&mut R> {
        let index = self.find_index(key)?;
        let (_, slots) = self.parts_mut();
        // SAFETY: The slot is occupied per its key word.
        Some(unsafe { slots[index].assume_init_mut() })
    }

    /// Returns `true` if a record is filed under `key`.
    #[inline]
    pub fn contains_key(&self, key: u32) -> bool {
        self.find_index(key).is_some()
    }

    /// Ensures the table can hold `records` records in total without
    /// growing.
    ///
    /// Grows to the smallest power of two of at least `2 * records` slots
    /// when the current buffer is smaller than that. Never shrinks.
    ///
    /// # Panics
    ///
    /// Panics if the new size overflows, and aborts through
    /// [`handle_alloc_error`](alloc::alloc::handle_alloc_error) if the
    /// allocation fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let mut table: HashTable<u32> = HashTable::new(0);
    /// table.reserve(5);
    /// assert_eq!(table.bucket_count(), 16);
    ///
    /// table.reserve(1);
    /// assert_eq!(table.bucket_count(), 16);
    /// ```
    pub fn reserve(&mut self, records: usize) {
        let _ = self.reserve_impl(records, Fallibility::Infallible);
    }

    /// Fallible version of [`reserve`](HashTable::reserve).
    ///
    /// On error the table is unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    /// use mapi::TryReserveError;
    ///
    /// let mut table: HashTable<u32> = HashTable::new(0);
    /// assert_eq!(
    ///     table.try_reserve(usize::MAX),
    ///     Err(TryReserveError::CapacityOverflow)
    /// );
    /// assert_eq!(table.bucket_count(), 0);
    /// ```
    pub fn try_reserve(&mut self, records: usize) -> Result<(), TryReserveError> {
        self.reserve_impl(records, Fallibility::Fallible)
    }

    fn reserve_impl(
        &mut self,
        records: usize,
        fallibility: Fallibility,
    ) -> Result<(), TryReserveError> {
        let Some(wanted) = buckets_for(records) else {
            return Err(fallibility.capacity_overflow());
        };
        if wanted > self.buckets {
            return self.rehash_impl(wanted, fallibility);
        }
        Ok(())
    }

    /// Grows the buffer to at least `buckets` slots.
    ///
    /// The request is rounded up to a power of two, and to at least
    /// [`MIN_CAPACITY`](crate::hash::MIN_CAPACITY) when the table has no
    /// buffer yet. Requests at or below the current bucket count do nothing.
    ///
    /// # Panics
    ///
    /// Panics if the new size overflows, and aborts through
    /// [`handle_alloc_error`](alloc::alloc::handle_alloc_error) if the
    /// allocation fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let mut table: HashTable<u32> = HashTable::new(0);
    /// table.rehash(3);
    /// assert_eq!(table.bucket_count(), 8);
    ///
    /// table.rehash(33);
    /// assert_eq!(table.bucket_count(), 64);
    /// ```
    pub fn rehash(&mut self, buckets: usize) {
        let _ = self.rehash_impl(buckets, Fallibility::Infallible);
    }

    /// Fallible version of [`rehash`](HashTable::rehash).
    ///
    /// On error the table is unchanged.
    pub fn try_rehash(&mut self, buckets: usize) -> Result<(), TryReserveError> {
        self.rehash_impl(buckets, Fallibility::Fallible)
    }

    fn rehash_impl(
        &mut self,
        buckets: usize,
        fallibility: Fallibility,
    ) -> Result<(), TryReserveError> {
        let Some(buckets) = round_buckets(buckets, self.buckets) else {
            return Err(fallibility.capacity_overflow());
        };
        if buckets > self.buckets {
            return self.resize(buckets, fallibility);
        }
        Ok(())
    }

    /// Moves every record into a new buffer of `buckets` slots.
    ///
    /// The new buffer is allocated before anything else is touched, so a
    /// failure leaves the table as it was.
    #[cold]
    #[inline(never)]
    fn resize(&mut self, buckets: usize, fallibility: Fallibility) -> Result<(), TryReserveError> {
        debug_assert!(buckets.is_power_of_two() && buckets > self.buckets);

        let Some(new_layout) = DataLayout::new::<R>(buckets) else {
            return Err(fallibility.capacity_overflow());
        };
        let Some(new_alloc) = self.allocator.allocate(new_layout.layout) else {
            return Err(fallibility.alloc_err(new_layout.layout));
        };

        let empty_key = self.empty_key;
        // SAFETY: The new allocation holds `buckets` key words at
        // `keys_offset`.
        unsafe {
            let keys: *mut u32 = new_alloc.add(new_layout.keys_offset).cast().as_ptr();
            for index in 0..buckets {
                keys.add(index).write(empty_key);
            }
        }

        let old_layout = core::mem::replace(&mut self.layout, new_layout);
        let old_alloc = core::mem::replace(&mut self.alloc, new_alloc);
        let old_buckets = core::mem::replace(&mut self.buckets, buckets);
        if old_buckets == 0 {
            return Ok(());
        }

        // SAFETY: The old allocation stays live until the end of this block.
        // Each occupied record is moved out exactly once, and the old buffer
        // is released without running destructors; only the new buffer owns
        // the records from here on.
        unsafe {
            let old_keys = core::slice::from_raw_parts(
                old_alloc.add(old_layout.keys_offset).cast::<u32>().as_ptr(),
                old_buckets,
            );
            let old_slots = old_alloc.cast::<MaybeUninit<R>>().as_ptr();

            for (old_index, &key) in old_keys.iter().enumerate() {
                if key == empty_key {
                    continue;
                }

                let index = self.probe(key);
                let (keys, slots) = self.parts_mut();
                debug_assert_eq!(keys[index], empty_key);
                keys[index] = key;
                core::ptr::copy_nonoverlapping(
                    old_slots.add(old_index),
                    slots.as_mut_ptr().add(index),
                    1,
                );
            }

            self.allocator.deallocate(old_alloc, old_layout.layout);
        }

        Ok(())
    }

    /// Stores `record` in the free slot `index`.
    #[inline]
    fn write_slot(&mut self, index: usize, key: u32, record: R) -> &mut R {
        let empty_key = self.empty_key;
        debug_assert_ne!(key, empty_key, "the empty-key sentinel cannot be stored");
        self.populated += 1;
        let (keys, slots) = self.parts_mut();
        debug_assert_eq!(keys[index], empty_key);
        keys[index] = key;
        slots[index].write(record)
    }

    /// Places `record` in its probe slot, or drops it if its key is taken.
    /// Requires room for one more record.
    #[inline]
    fn place(&mut self, record: R) -> Result<&mut R, AlreadyPresent>
    where
        R: Record,
    {
        let key = record.key();
        let index = self.probe(key);
        if self.keys()[index] != self.empty_key {
            drop(record);
            return Err(AlreadyPresent { key });
        }
        Ok(self.write_slot(index, key, record))
    }

    /// Inserts `record` under its own key.
    ///
    /// Returns a reference to the stored record. If the key is already
    /// present the table is left as it was, `record` is dropped, and
    /// [`AlreadyPresent`] is returned. The table may grow either way.
    ///
    /// The record's key must differ from [`empty_key`](HashTable::empty_key).
    ///
    /// # Panics
    ///
    /// Panics if growing overflows, and aborts through
    /// [`handle_alloc_error`](alloc::alloc::handle_alloc_error) if growing
    /// fails to allocate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::AlreadyPresent;
    /// use mapi::HashTable;
    ///
    /// let mut table = HashTable::new(0);
    /// assert_eq!(table.insert((1u32, 'a')), Ok(&mut (1, 'a')));
    /// assert_eq!(table.insert((1u32, 'b')), Err(AlreadyPresent { key: 1 }));
    /// assert_eq!(table.find(1), Some(&(1, 'a')));
    /// ```
    pub fn insert(&mut self, record: R) -> Result<&mut R, AlreadyPresent>
    where
        R: Record,
    {
        self.reserve(self.populated + 1);
        self.place(record)
    }

    /// Fallible version of [`insert`](HashTable::insert).
    ///
    /// If growing fails the table is unchanged and `record` is handed back
    /// in [`InsertError::Alloc`].
    pub fn try_insert(&mut self, record: R) -> Result<&mut R, InsertError<R>>
    where
        R: Record,
    {
        if let Err(error) = self.try_reserve(self.populated + 1) {
            return Err(InsertError::Alloc { record, error });
        }
        self.place(record).map_err(InsertError::AlreadyPresent)
    }

    /// Removes and returns the record filed under `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let mut table = HashTable::new(0);
    /// table.insert((42u32, "x")).unwrap();
    ///
    /// assert_eq!(table.remove(42), Some((42, "x")));
    /// assert_eq!(table.remove(42), None);
    /// ```
    pub fn remove(&mut self, key: u32) -> Option<R> {
        let index = self.find_index(key)?;
        Some(self.remove_at(index))
    }

    /// Removes and drops the record filed under `key`. Does nothing if the
    /// key is absent.
    pub fn erase(&mut self, key: u32) {
        drop(self.remove(key));
    }

    /// Takes the record out of the occupied slot `index` and repairs the
    /// probe chain behind it.
    ///
    /// Walking forward from the hole, each record whose ideal slot does not
    /// lie in `(hole, probe]` (circularly) would become unreachable, so it is
    /// moved into the hole and its old slot becomes the new hole. The walk
    /// stops at the first free slot.
    fn remove_at(&mut self, index: usize) -> R {
        let mask = self.buckets - 1;
        let empty_key = self.empty_key;
        self.populated -= 1;

        let (keys, slots) = self.parts_mut();
        debug_assert_ne!(keys[index], empty_key);
        // SAFETY: The slot is occupied per its key word. It is treated as
        // vacant from here on.
        let record = unsafe { slots[index].assume_init_read() };
        let slots = slots.as_mut_ptr();

        let mut hole = index;
        let mut probe = index;
        loop {
            probe = (probe + 1) & mask;
            let key = keys[probe];
            if key == empty_key {
                break;
            }

            let ideal = mix(key) as usize & mask;
            let must_move = if probe > hole {
                ideal <= hole || ideal > probe
            } else {
                ideal <= hole && ideal > probe
            };

            if must_move {
                keys[hole] = key;
                // SAFETY: Both indexes are masked into bounds and distinct;
                // `probe` is occupied and `hole` holds no live record.
                unsafe {
                    core::ptr::copy_nonoverlapping(slots.add(probe), slots.add(hole), 1);
                }
                hole = probe;
            }
        }

        keys[hole] = empty_key;
        record
    }

    /// Drops every record and frees the buffer.
    ///
    /// Afterwards both [`len`](HashTable::len) and
    /// [`bucket_count`](HashTable::bucket_count) are zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let mut table = HashTable::new(0);
    /// table.insert(1u32).unwrap();
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.bucket_count(), 0);
    /// ```
    pub fn clear(&mut self) {
        if self.buckets == 0 {
            return;
        }

        if core::mem::needs_drop::<R>() && self.populated > 0 {
            let empty_key = self.empty_key;
            let (keys, slots) = self.parts_mut();
            for (key, slot) in keys.iter_mut().zip(slots.iter_mut()) {
                if *key != empty_key {
                    *key = empty_key;
                    // SAFETY: The slot was occupied per its key word.
                    unsafe { slot.assume_init_drop() };
                }
            }
        }

        let layout = core::mem::replace(&mut self.layout, DataLayout::empty());
        let alloc = core::mem::replace(&mut self.alloc, NonNull::dangling());
        self.buckets = 0;
        self.populated = 0;

        // SAFETY: `alloc` came from this allocator with this layout.
        unsafe { self.allocator.deallocate(alloc, layout.layout) };
    }

    /// Gets the entry for `key`, growing first so that a vacant entry can
    /// always be filled.
    ///
    /// # Panics
    ///
    /// Panics if growing overflows, and aborts through
    /// [`handle_alloc_error`](alloc::alloc::handle_alloc_error) if growing
    /// fails to allocate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    /// use mapi::hash_table::Entry;
    ///
    /// let mut table: HashTable<(u32, u64)> = HashTable::new(0);
    ///
    /// match table.entry(5) {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert((0, 1));
    ///     }
    ///     Entry::Occupied(_) => unreachable!(),
    /// }
    /// // The vacant entry stamped its key onto the record.
    /// assert_eq!(table.find(5), Some(&(5, 1)));
    ///
    /// *table.entry(5).or_insert((5, 0)) = (5, 9);
    /// assert_eq!(table.find(5), Some(&(5, 9)));
    /// ```
    pub fn entry(&mut self, key: u32) -> Entry<'_, R, A> {
        self.reserve(self.populated + 1);
        self.entry_impl(key)
    }

    /// Fallible version of [`entry`](HashTable::entry).
    pub fn try_entry(&mut self, key: u32) -> Result<Entry<'_, R, A>, TryReserveError> {
        self.try_reserve(self.populated + 1)?;
        Ok(self.entry_impl(key))
    }

    fn entry_impl(&mut self, key: u32) -> Entry<'_, R, A> {
        debug_assert_ne!(key, self.empty_key, "the empty-key sentinel has no entry");
        let index = self.probe(key);
        if self.keys()[index] == self.empty_key {
            Entry::Vacant(VacantEntry {
                table: self,
                index,
                key,
            })
        } else {
            Entry::Occupied(OccupiedEntry { table: self, index })
        }
    }

    /// Position of the first record in slot order.
    ///
    /// Equal to [`end`](HashTable::end) when the table is empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let mut table = HashTable::new(0);
    /// for key in 1..=3u32 {
    ///     table.insert(key).unwrap();
    /// }
    ///
    /// let mut seen = Vec::new();
    /// let mut cursor = table.begin();
    /// while cursor != table.end() {
    ///     seen.push(*table.get(cursor).unwrap());
    ///     cursor = table.advance(cursor);
    /// }
    /// seen.sort();
    /// assert_eq!(seen, [1, 2, 3]);
    /// ```
    pub fn begin(&self) -> Cursor {
        Cursor(self.skip_free(0))
    }

    /// Position of the next record after `cursor`, in slot order.
    pub fn advance(&self, cursor: Cursor) -> Cursor {
        Cursor(self.skip_free(cursor.0.saturating_add(1)))
    }

    /// The one-past-the-last position.
    pub fn end(&self) -> Cursor {
        Cursor(self.buckets)
    }

    /// The record at `cursor`, or `None` if the slot is free or out of range.
    pub fn get(&self, cursor: Cursor) -> Option<&R> {
        let key = *self.keys().get(cursor.0)?;
        if key == self.empty_key {
            return None;
        }
        // SAFETY: The slot is occupied per its key word.
        Some(unsafe { self.slots()[cursor.0].assume_init_ref() })
    }

    fn skip_free(&self, mut index: usize) -> usize {
        let keys = self.keys();
        while index < keys.len() && keys[index] == self.empty_key {
            index += 1;
        }
        index.min(keys.len())
    }

    /// Returns an iterator over all records in slot order.
    ///
    /// Slot order is neither insertion order nor stable across growth.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let mut table = HashTable::new(0);
    /// table.insert(3u32).unwrap();
    /// table.insert(4u32).unwrap();
    ///
    /// let mut keys: Vec<u32> = table.iter().copied().collect();
    /// keys.sort();
    /// assert_eq!(keys, [3, 4]);
    /// ```
    pub fn iter(&self) -> Iter<'_, R> {
        Iter {
            keys: self.keys(),
            slots: self.slots(),
            empty_key: self.empty_key,
            index: 0,
            remaining: self.populated,
        }
    }

    /// Returns an iterator over mutable references to all records in slot
    /// order.
    ///
    /// Record keys must not be changed through the references.
    pub fn iter_mut(&mut self) -> IterMut<'_, R> {
        let remaining = self.populated;
        let empty_key = self.empty_key;
        let slots = self.slots_ptr().cast::<MaybeUninit<R>>();
        IterMut {
            keys: self.keys(),
            slots,
            empty_key,
            index: 0,
            remaining,
            _marker: PhantomData,
        }
    }

    /// Removes and yields every record. The buffer is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mapi::HashTable;
    ///
    /// let mut table = HashTable::new(0);
    /// table.insert(1u32).unwrap();
    /// table.insert(2u32).unwrap();
    ///
    /// let mut drained: Vec<u32> = table.drain().collect();
    /// drained.sort();
    /// assert_eq!(drained, [1, 2]);
    /// assert!(table.is_empty());
    /// assert_eq!(table.bucket_count(), 8);
    /// ```
    pub fn drain(&mut self) -> Drain<'_, R, A> {
        Drain {
            table: self,
            index: 0,
        }
    }

    /// Computes a histogram of probe distances for the current table state.
    ///
    /// Available in tests and with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> ProbeHistogram {
        let mut bins = Vec::new();
        if self.buckets == 0 {
            return ProbeHistogram { bins };
        }

        let mask = self.buckets - 1;
        for (index, &key) in self.keys().iter().enumerate() {
            if key == self.empty_key {
                continue;
            }
            let distance = index.wrapping_sub(self.ideal_slot(key)) & mask;
            if bins.len() <= distance {
                bins.resize(distance + 1, 0);
            }
            bins[distance] += 1;
        }

        ProbeHistogram { bins }
    }

    /// Returns detailed utilization statistics for debugging.
    ///
    /// Available in tests and with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let histogram = self.probe_histogram();
        let total_distance: usize = histogram
            .bins
            .iter()
            .enumerate()
            .map(|(distance, &count)| distance * count)
            .sum();

        DebugStats {
            populated: self.populated,
            buckets: self.buckets,
            capacity: self.capacity(),
            load_factor: if self.buckets == 0 {
                0.0
            } else {
                self.populated as f64 / self.buckets as f64
            },
            max_probe_length: histogram.bins.len().saturating_sub(1),
            mean_probe_length: if self.populated == 0 {
                0.0
            } else {
                total_distance as f64 / self.populated as f64
            },
            total_bytes: if self.buckets == 0 {
                0
            } else {
                self.layout.layout.size()
            },
            wasted_bytes: (self.buckets - self.populated)
                * (size_of::<R>() + size_of::<u32>()),
        }
    }
}

impl<R: Record, A: BufferAllocator> Extend<R> for HashTable<R, A> {
    /// Inserts every record; records whose key is already present are
    /// dropped.
    fn extend<I: IntoIterator<Item = R>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        self.reserve(self.populated.saturating_add(lower));
        for record in iter {
            let _ = self.insert(record);
        }
    }
}

impl<R: Record> FromIterator<R> for HashTable<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        let mut table = Self::default();
        table.extend(iter);
        table
    }
}

impl<'a, R, A: BufferAllocator> IntoIterator for &'a HashTable<R, A> {
    type IntoIter = Iter<'a, R>;
    type Item = &'a R;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, R, A: BufferAllocator> IntoIterator for &'a mut HashTable<R, A> {
    type IntoIter = IterMut<'a, R>;
    type Item = &'a mut R;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A position in a [`HashTable`]'s slot order.
///
/// Produced by [`HashTable::begin`], [`HashTable::advance`] and
/// [`HashTable::end`]. Any insert, removal or growth invalidates it: reading
/// through a stale cursor is memory safe but may yield a different record
/// or none.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Cursor(usize);

/// A view into a single entry in the table, which may be vacant or occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
pub enum Entry<'a, R, A: BufferAllocator = Global> {
    /// A vacant entry - the key is not present in the table
    Vacant(VacantEntry<'a, R, A>),
    /// An occupied entry - the key is present in the table
    Occupied(OccupiedEntry<'a, R, A>),
}

impl<'a, R: Record, A: BufferAllocator> Entry<'a, R, A> {
    /// The key this entry is for.
    pub fn key(&self) -> u32 {
        match self {
            Entry::Vacant(entry) => entry.key(),
            Entry::Occupied(entry) => entry.key(),
        }
    }

    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the stored record.
    pub fn or_insert(self, default: R) -> &'a mut R {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the record computed by `default` if the entry is vacant.
    ///
    /// `default` is only called for vacant entries.
    pub fn or_insert_with(self, default: impl FnOnce() -> R) -> &'a mut R {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to the stored record if the entry is occupied. Vacant
    /// entries are left vacant and yield `None`.
    pub fn and_modify(self, f: impl FnOnce(&mut R)) -> Option<&'a mut R> {
        match self {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                f(record);
                Some(record)
            }
            Entry::Vacant(_) => None,
        }
    }
}

/// A view into a vacant entry in the table.
pub struct VacantEntry<'a, R, A: BufferAllocator = Global> {
    table: &'a mut HashTable<R, A>,
    index: usize,
    key: u32,
}

impl<'a, R: Record, A: BufferAllocator> VacantEntry<'a, R, A> {
    /// The key this entry is for.
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Stores `record` in the entry's slot and returns a mutable reference to
    /// it.
    ///
    /// The entry's key is written onto the record with
    /// [`Record::set_key`] first.
    pub fn insert(self, mut record: R) -> &'a mut R {
        record.set_key(self.key);
        self.table.write_slot(self.index, self.key, record)
    }
}

/// A view into an occupied entry in the table.
pub struct OccupiedEntry<'a, R, A: BufferAllocator = Global> {
    table: &'a mut HashTable<R, A>,
    index: usize,
}

impl<'a, R, A: BufferAllocator> OccupiedEntry<'a, R, A> {
    /// The key this entry is for.
    pub fn key(&self) -> u32 {
        self.table.keys()[self.index]
    }

    /// Gets a reference to the stored record.
    pub fn get(&self) -> &R {
        // SAFETY: The entry's slot is occupied.
        unsafe { self.table.slots()[self.index].assume_init_ref() }
    }

    /// Gets a mutable reference to the stored record.
    pub fn get_mut(&mut self) -> &mut R {
        let (_, slots) = self.table.parts_mut();
        // SAFETY: The entry's slot is occupied.
        unsafe { slots[self.index].assume_init_mut() }
    }

    /// Converts the entry into a mutable reference with the entry's lifetime.
    pub fn into_mut(self) -> &'a mut R {
        let (_, slots) = self.table.parts_mut();
        // SAFETY: The entry's slot is occupied.
        unsafe { slots[self.index].assume_init_mut() }
    }

    /// Removes the record from the table and returns it.
    pub fn remove(self) -> R {
        self.table.remove_at(self.index)
    }
}

/// An iterator over the records of a [`HashTable`] in slot order.
///
/// This struct is created by the [`iter`] method on [`HashTable`].
///
/// [`iter`]: HashTable::iter
pub struct Iter<'a, R> {
    keys: &'a [u32],
    slots: &'a [MaybeUninit<R>],
    empty_key: u32,
    index: usize,
    remaining: usize,
}

impl<R> Clone for Iter<'_, R> {
    fn clone(&self) -> Self {
        Iter {
            keys: self.keys,
            slots: self.slots,
            empty_key: self.empty_key,
            index: self.index,
            remaining: self.remaining,
        }
    }
}

impl<'a, R> Iterator for Iter<'a, R> {
    type Item = &'a R;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.keys.len() {
            let index = self.index;
            self.index += 1;
            if self.keys[index] != self.empty_key {
                self.remaining -= 1;
                // SAFETY: The slot is occupied per its key word.
                return Some(unsafe { self.slots[index].assume_init_ref() });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R> ExactSizeIterator for Iter<'_, R> {}
impl<R> FusedIterator for Iter<'_, R> {}

/// A mutable iterator over the records of a [`HashTable`] in slot order.
///
/// This struct is created by the [`iter_mut`] method on [`HashTable`].
///
/// [`iter_mut`]: HashTable::iter_mut
pub struct IterMut<'a, R> {
    keys: &'a [u32],
    slots: NonNull<MaybeUninit<R>>,
    empty_key: u32,
    index: usize,
    remaining: usize,
    _marker: PhantomData<&'a mut R>,
}

impl<'a, R> Iterator for IterMut<'a, R> {
    type Item = &'a mut R;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.keys.len() {
            let index = self.index;
            self.index += 1;
            if self.keys[index] != self.empty_key {
                self.remaining -= 1;
                // SAFETY: `index` is in bounds and occupied, and each slot is
                // yielded at most once, so the references never alias.
                return Some(unsafe { (*self.slots.as_ptr().add(index)).assume_init_mut() });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R> ExactSizeIterator for IterMut<'_, R> {}
impl<R> FusedIterator for IterMut<'_, R> {}

/// A draining iterator over the records of a [`HashTable`].
///
/// This struct is created by the [`drain`] method on [`HashTable`]. Records
/// not consumed are dropped when the iterator is.
///
/// [`drain`]: HashTable::drain
pub struct Drain<'a, R, A: BufferAllocator = Global> {
    table: &'a mut HashTable<R, A>,
    index: usize,
}

impl<R, A: BufferAllocator> Drop for Drain<'_, R, A> {
    fn drop(&mut self) {
        for _ in &mut *self {}
    }
}

impl<R, A: BufferAllocator> Iterator for Drain<'_, R, A> {
    type Item = R;

    fn next(&mut self) -> Option<Self::Item> {
        let empty_key = self.table.empty_key;
        while self.index < self.table.buckets {
            let index = self.index;
            self.index += 1;

            let (keys, slots) = self.table.parts_mut();
            if keys[index] != empty_key {
                keys[index] = empty_key;
                // SAFETY: The slot was occupied and is now marked free, so
                // the record is read out exactly once.
                let record = unsafe { slots[index].assume_init_read() };
                self.table.populated -= 1;
                return Some(record);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.populated, Some(self.table.populated))
    }
}

impl<R, A: BufferAllocator> ExactSizeIterator for Drain<'_, R, A> {}
impl<R, A: BufferAllocator> FusedIterator for Drain<'_, R, A> {}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::Cell;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::hash::MIN_CAPACITY;

    #[derive(Debug)]
    struct Tracked {
        key: u32,
        value: u64,
        drops: Rc<Cell<usize>>,
    }

    impl Tracked {
        fn new(key: u32, value: u64, drops: &Rc<Cell<usize>>) -> Self {
            Self {
                key,
                value,
                drops: Rc::clone(drops),
            }
        }
    }

    impl Record for Tracked {
        fn key(&self) -> u32 {
            self.key
        }

        fn set_key(&mut self, key: u32) {
            self.key = key;
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    /// Allocator that refuses once its budget of allocations is spent.
    struct Budgeted {
        remaining: Cell<usize>,
    }

    impl Budgeted {
        fn new(remaining: usize) -> Self {
            Self {
                remaining: Cell::new(remaining),
            }
        }
    }

    unsafe impl BufferAllocator for Budgeted {
        fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
            if self.remaining.get() == 0 {
                return None;
            }
            self.remaining.set(self.remaining.get() - 1);
            Global.allocate(layout)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            unsafe { Global.deallocate(ptr, layout) }
        }
    }

    /// First `count` keys whose ideal slot is `slot` in a table of `buckets`.
    fn keys_at_slot(slot: usize, buckets: usize, count: usize) -> Vec<u32> {
        (1u32..)
            .filter(|&key| mix(key) as usize & (buckets - 1) == slot)
            .take(count)
            .collect()
    }

    fn assert_invariants<R, A: BufferAllocator>(table: &HashTable<R, A>) {
        let occupied = table
            .keys()
            .iter()
            .filter(|&&key| key != table.empty_key())
            .count();
        assert_eq!(occupied, table.len(), "{table:#?}");
        let buckets = table.bucket_count();
        if buckets != 0 {
            assert!(buckets.is_power_of_two());
            assert!(buckets >= MIN_CAPACITY);
            assert!(buckets >= 2 * table.len(), "{table:#?}");
        }
    }

    #[test]
    fn empty_table_never_allocates_on_lookup() {
        let mut table: HashTable<u32> = HashTable::new(0);
        assert_eq!(table.find(5), None);
        assert_eq!(table.at(5), None);
        assert!(!table.contains_key(5));
        assert_eq!(table.len(), 0);
        assert_eq!(table.bucket_count(), 0);

        table.erase(5);
        assert_eq!(table.remove(5), None);
        assert_eq!(table.bucket_count(), 0);
        assert_eq!(table.begin(), table.end());
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn insert_and_find() {
        let mut table: HashTable<(u32, u64)> = HashTable::new(0);
        for key in 1..=64u32 {
            let stored = table.insert((key, key as u64 * 2)).unwrap();
            assert_eq!(*stored, (key, key as u64 * 2));
            assert_eq!(table.find(key), Some(&(key, key as u64 * 2)), "{table:#?}");
        }
        assert_eq!(table.len(), 64);
        for key in 1..=64u32 {
            assert_eq!(table.find(key), Some(&(key, key as u64 * 2)));
        }
        assert!(table.find(999).is_none());
        assert_invariants(&table);
    }

    #[test]
    fn duplicate_insert_is_rejected_and_released() {
        let drops = Rc::new(Cell::new(0));
        let mut table: HashTable<Tracked> = HashTable::new(0);

        table.insert(Tracked::new(42, 1, &drops)).unwrap();
        assert_eq!(
            table.insert(Tracked::new(42, 2, &drops)).unwrap_err(),
            AlreadyPresent { key: 42 }
        );

        assert_eq!(drops.get(), 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.find(42).map(|r| r.value), Some(1));
    }

    #[test]
    fn colliding_keys_are_probed_linearly() {
        let mut table: HashTable<u32> = HashTable::new(0);
        let keys = keys_at_slot(3, MIN_CAPACITY, 3);
        for &key in &keys {
            table.insert(key).unwrap();
        }

        assert_eq!(table.bucket_count(), MIN_CAPACITY);
        for (offset, &key) in keys.iter().enumerate() {
            assert_eq!(table.find(key), Some(&key));
            assert_eq!(table.at(key), Some(3 + offset));
        }
        assert_eq!(table.probe_histogram().bins, vec![1, 1, 1]);
    }

    #[test]
    fn growth_doubles_at_half_load() {
        let mut table: HashTable<u32> = HashTable::new(0);
        let keys = keys_at_slot(5, MIN_CAPACITY, 3);
        for &key in &keys {
            table.insert(key).unwrap();
        }

        let extra: Vec<u32> = (1u32..).filter(|key| !keys.contains(key)).take(2).collect();
        table.insert(extra[0]).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.bucket_count(), 8);

        table.insert(extra[1]).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(table.bucket_count(), 16);

        for key in keys.iter().chain(&extra) {
            assert_eq!(table.find(*key), Some(key));
        }
        assert_invariants(&table);
    }

    #[test]
    fn erase_repairs_wrapped_chain() {
        let mut table: HashTable<u32> = HashTable::new(0);
        let keys = keys_at_slot(7, MIN_CAPACITY, 3);
        for &key in &keys {
            table.insert(key).unwrap();
        }
        assert_eq!(table.at(keys[0]), Some(7));
        assert_eq!(table.at(keys[1]), Some(0));
        assert_eq!(table.at(keys[2]), Some(1));

        table.erase(keys[0]);

        assert_eq!(table.find(keys[0]), None);
        assert_eq!(table.at(keys[1]), Some(7));
        assert_eq!(table.at(keys[2]), Some(0));
        assert_eq!(table.find(keys[1]), Some(&keys[1]));
        assert_eq!(table.find(keys[2]), Some(&keys[2]));
        assert_invariants(&table);
    }

    #[test]
    fn erase_pulls_back_across_different_home_slots() {
        let mut table: HashTable<u32> = HashTable::new(0);
        let home7 = keys_at_slot(7, MIN_CAPACITY, 2);
        let home0 = keys_at_slot(0, MIN_CAPACITY, 1);
        table.insert(home7[0]).unwrap();
        table.insert(home7[1]).unwrap();
        table.insert(home0[0]).unwrap();
        assert_eq!(table.at(home0[0]), Some(1));

        table.erase(home7[0]);

        assert_eq!(table.at(home7[1]), Some(7));
        assert_eq!(table.at(home0[0]), Some(0));
        assert_invariants(&table);
    }

    #[test]
    fn erase_leaves_records_already_home() {
        let mut table: HashTable<u32> = HashTable::new(0);
        let home6 = keys_at_slot(6, MIN_CAPACITY, 1);
        let home7 = keys_at_slot(7, MIN_CAPACITY, 1);
        table.insert(home6[0]).unwrap();
        table.insert(home7[0]).unwrap();

        table.erase(home6[0]);

        assert_eq!(table.at(home7[0]), Some(7));
        assert_eq!(table.find(home7[0]), Some(&home7[0]));
        assert_eq!(table.at(home6[0]), Some(6));
    }

    #[test]
    fn erase_absent_key_is_a_no_op() {
        let drops = Rc::new(Cell::new(0));
        let mut table: HashTable<Tracked> = HashTable::new(0);
        table.insert(Tracked::new(1, 1, &drops)).unwrap();

        table.erase(2);
        assert_eq!(drops.get(), 0);
        assert_eq!(table.len(), 1);

        table.erase(1);
        assert_eq!(drops.get(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn erase_then_reinsert() {
        let mut table: HashTable<(u32, u64)> = HashTable::new(0);
        for key in 1..=5u32 {
            table.insert((key, 0)).unwrap();
        }
        table.erase(3);
        table.insert((3, 33)).unwrap();
        assert_eq!(table.find(3), Some(&(3, 33)));
        assert_eq!(table.len(), 5);
        assert_invariants(&table);
    }

    #[test]
    fn clear_releases_every_record() {
        let drops = Rc::new(Cell::new(0));
        let mut table: HashTable<Tracked> = HashTable::new(0);
        for key in 1..=10u32 {
            table.insert(Tracked::new(key, 0, &drops)).unwrap();
        }

        table.clear();

        assert_eq!(drops.get(), 10);
        assert_eq!(table.len(), 0);
        assert_eq!(table.bucket_count(), 0);

        table.insert(Tracked::new(4, 4, &drops)).unwrap();
        assert_eq!(table.find(4).map(|r| r.value), Some(4));
    }

    #[test]
    fn drop_releases_every_record() {
        let drops = Rc::new(Cell::new(0));
        {
            let mut table: HashTable<Tracked> = HashTable::new(0);
            for key in 1..=20u32 {
                table.insert(Tracked::new(key, 0, &drops)).unwrap();
            }
            for key in 1..=5u32 {
                table.erase(key);
            }
            assert_eq!(drops.get(), 5);
        }
        assert_eq!(drops.get(), 20);
    }

    #[test]
    fn growth_does_not_release_moved_records() {
        let drops = Rc::new(Cell::new(0));
        let mut table: HashTable<Tracked> = HashTable::new(0);
        for key in 1..=100u32 {
            table.insert(Tracked::new(key, key as u64, &drops)).unwrap();
        }
        assert_eq!(drops.get(), 0);
        for key in 1..=100u32 {
            assert_eq!(table.find(key).map(|r| r.value), Some(key as u64));
        }
    }

    #[test]
    fn failed_growth_leaves_table_unchanged() {
        let mut table: HashTable<(u32, u64), _> = HashTable::new_in(0, Budgeted::new(1));
        for key in 1..=4u32 {
            table.try_insert((key, key as u64)).unwrap();
        }
        assert_eq!(table.bucket_count(), 8);

        match table.try_insert((5, 5)) {
            Err(InsertError::Alloc { record, error }) => {
                assert_eq!(record, (5, 5));
                assert!(matches!(error, TryReserveError::AllocError { .. }));
            }
            other => panic!("expected allocation failure, got {other:?}"),
        }

        assert_eq!(table.len(), 4);
        assert_eq!(table.bucket_count(), 8);
        for key in 1..=4u32 {
            assert_eq!(table.find(key), Some(&(key, key as u64)));
        }
        assert!(table.try_rehash(64).is_err());
        assert_eq!(table.bucket_count(), 8);
        assert_invariants(&table);

        table.allocator().remaining.set(1);
        table.try_insert((5, 5)).unwrap();
        assert_eq!(table.bucket_count(), 16);
    }

    #[test]
    fn capacity_overflow_is_reported() {
        let mut table: HashTable<u32> = HashTable::new(0);
        table.insert(1).unwrap();
        assert_eq!(
            table.try_reserve(usize::MAX / 2 + 1),
            Err(TryReserveError::CapacityOverflow)
        );
        assert_eq!(
            table.try_rehash(usize::MAX),
            Err(TryReserveError::CapacityOverflow)
        );
        assert_eq!(table.bucket_count(), 8);
        assert_eq!(table.find(1), Some(&1));
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn reserve_overflow_panics() {
        let mut table: HashTable<u32> = HashTable::new(0);
        table.reserve(usize::MAX);
    }

    #[test]
    fn rehash_rounds_and_never_shrinks() {
        let mut table: HashTable<u32> = HashTable::new(0);
        table.rehash(1);
        assert_eq!(table.bucket_count(), MIN_CAPACITY);
        table.rehash(100);
        assert_eq!(table.bucket_count(), 128);
        table.rehash(16);
        assert_eq!(table.bucket_count(), 128);
        table.reserve(10);
        assert_eq!(table.bucket_count(), 128);
        assert_eq!(table.capacity(), 64);
    }

    #[test]
    fn entry_api() {
        let mut table: HashTable<(u32, u64)> = HashTable::new(0);

        match table.entry(10) {
            Entry::Vacant(entry) => {
                assert_eq!(entry.key(), 10);
                entry.insert((0, 100));
            }
            Entry::Occupied(_) => panic!("should be vacant first time"),
        }
        assert_eq!(table.find(10), Some(&(10, 100)));

        match table.entry(10) {
            Entry::Occupied(mut entry) => {
                assert_eq!(entry.key(), 10);
                assert_eq!(entry.get(), &(10, 100));
                entry.get_mut().1 = 101;
            }
            Entry::Vacant(_) => panic!("should be occupied"),
        }
        assert_eq!(table.find(10), Some(&(10, 101)));

        assert_eq!(table.entry(11).and_modify(|r| r.1 += 1), None);
        assert_eq!(table.entry(10).and_modify(|r| r.1 += 1), Some(&mut (10, 102)));
        assert_eq!(
            table.entry(12).or_insert_with(|| (12, 7)),
            &mut (12, 7)
        );

        match table.entry(10) {
            Entry::Occupied(entry) => assert_eq!(entry.remove(), (10, 102)),
            Entry::Vacant(_) => panic!("should be occupied"),
        }
        assert_eq!(table.len(), 1);
        assert_invariants(&table);
    }

    #[test]
    fn cursor_walks_physical_order() {
        let mut table: HashTable<u32> = HashTable::new(0);
        for key in 1..=6u32 {
            table.insert(key).unwrap();
        }

        let mut positions = Vec::new();
        let mut cursor = table.begin();
        while cursor != table.end() {
            positions.push(cursor);
            assert!(table.get(cursor).is_some());
            cursor = table.advance(cursor);
        }

        assert_eq!(positions.len(), 6);
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(table.advance(table.end()), table.end());
        assert_eq!(table.get(table.end()), None);

        let via_iter: Vec<u32> = table.iter().copied().collect();
        let via_cursor: Vec<u32> = positions.iter().map(|&c| *table.get(c).unwrap()).collect();
        assert_eq!(via_iter, via_cursor);
    }

    #[test]
    fn iter_mut_and_drain() {
        let mut table: HashTable<(u32, u64)> = HashTable::new(0);
        for key in 10..20u32 {
            table.insert((key, 0)).unwrap();
        }
        for record in table.iter_mut() {
            record.1 = record.0 as u64 + 1;
        }
        assert_eq!(table.iter().len(), 10);
        for key in 10..20u32 {
            assert_eq!(table.find(key), Some(&(key, key as u64 + 1)));
        }

        let mut drained: Vec<(u32, u64)> = table.drain().collect();
        drained.sort();
        assert_eq!(drained.len(), 10);
        assert_eq!(drained[0], (10, 11));
        assert!(table.is_empty());
        assert_eq!(table.bucket_count(), 32);
        for key in 10..20u32 {
            assert!(table.find(key).is_none());
        }
        assert_invariants(&table);
    }

    #[test]
    fn partial_drain_releases_the_rest() {
        let drops = Rc::new(Cell::new(0));
        let mut table: HashTable<Tracked> = HashTable::new(0);
        for key in 1..=8u32 {
            table.insert(Tracked::new(key, 0, &drops)).unwrap();
        }
        {
            let mut drain = table.drain();
            drop(drain.next());
        }
        assert_eq!(drops.get(), 8);
        assert!(table.is_empty());
    }

    #[test]
    fn clone_keeps_layout() {
        let mut table: HashTable<(u32, u64)> = HashTable::new(0);
        for key in 1..=40u32 {
            table.insert((key, key as u64)).unwrap();
        }
        for key in (1..=40u32).step_by(3) {
            table.erase(key);
        }

        let copy = table.clone();
        assert_eq!(copy.len(), table.len());
        assert_eq!(copy.bucket_count(), table.bucket_count());
        assert!(copy.iter().eq(table.iter()));

        let empty: HashTable<u32> = HashTable::new(0);
        assert_eq!(empty.clone().bucket_count(), 0);
    }

    #[test]
    fn custom_empty_key() {
        let mut table: HashTable<u32> = HashTable::new(7);
        for key in 0..7u32 {
            table.insert(key).unwrap();
        }
        assert_eq!(table.find(7), None);
        assert_eq!(table.find(0), Some(&0));
        assert_eq!(table.empty_key(), 7);

        let table: HashTable<u32> = HashTable::default();
        assert_eq!(table.empty_key(), DEFAULT_EMPTY_KEY);
    }

    #[test]
    fn extend_skips_duplicates() {
        let mut table: HashTable<(u32, char)> = HashTable::new(0);
        table.extend([(1, 'a'), (2, 'b'), (1, 'c')]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.find(1), Some(&(1, 'a')));

        let collected: HashTable<u32> = (1..=9u32).collect();
        assert_eq!(collected.len(), 9);
    }

    #[test]
    fn record_size_matches_stride() {
        let table: HashTable<(u32, [u8; 60])> = HashTable::new(0);
        assert_eq!(table.record_size(), 64);
    }

    #[test]
    fn over_aligned_records() {
        #[derive(Clone, Copy, Debug, PartialEq)]
        #[repr(align(128))]
        struct Wide {
            key: u32,
        }

        impl Record for Wide {
            fn key(&self) -> u32 {
                self.key
            }

            fn set_key(&mut self, key: u32) {
                self.key = key;
            }
        }

        let mut table: HashTable<Wide> = HashTable::new(0);
        for key in 1..=20u32 {
            let stored = table.insert(Wide { key }).unwrap();
            assert_eq!(stored as *mut Wide as usize % 128, 0);
        }
        for key in 1..=20u32 {
            assert_eq!(table.find(key), Some(&Wide { key }));
        }
    }

    #[test]
    fn debug_stats_report() {
        let mut table: HashTable<u32> = HashTable::new(0);
        for key in 1..=12u32 {
            table.insert(key).unwrap();
        }
        let stats = table.debug_stats();
        assert_eq!(stats.populated, 12);
        assert_eq!(stats.buckets, 32);
        assert_eq!(stats.capacity, 16);
        assert_eq!(table.probe_histogram().total(), 12);
        assert!(stats.total_bytes >= 32 * (4 + 4));
        assert_eq!(stats.total_bytes % BUFFER_ALIGN, 0);
        assert!(stats.max_probe_length < 32);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn randomized_churn() {
        const KEYS: usize = 512;
        let mut rng = SmallRng::seed_from_u64(0x6d61_7069);
        let mut table: HashTable<(u32, u64)> = HashTable::new(0);
        let mut model = vec![None; KEYS];

        for step in 0..20_000u64 {
            let key = rng.random_range(1..KEYS as u32);
            if rng.random_bool(0.55) {
                let inserted = table.insert((key, step)).is_ok();
                assert_eq!(inserted, model[key as usize].is_none());
                if inserted {
                    model[key as usize] = Some(step);
                }
            } else {
                let removed = table.remove(key);
                assert_eq!(removed.map(|r| r.1), model[key as usize].take());
            }

            if step.is_multiple_of(97) {
                for (key, expected) in model.iter().enumerate().skip(1) {
                    assert_eq!(
                        table.find(key as u32).map(|r| r.1),
                        *expected,
                        "key {key} at step {step}"
                    );
                }
                assert_invariants(&table);
            }
        }
    }

    #[test]
    fn debug_output_marks_free_slots() {
        use alloc::format;

        let mut table: HashTable<u32> = HashTable::new(0);
        assert!(format!("{table:?}").contains("unallocated"));
        table.insert(0xabcd).unwrap();
        let rendered = format!("{table:?}");
        assert!(rendered.contains("0000abcd"));
        assert!(rendered.contains("........"));
    }
}
