use core::alloc::Layout;
use core::fmt;

/// The error type for fallible growth of a [`HashTable`].
///
/// When returned, the table is left exactly as it was before the call.
///
/// [`HashTable`]: crate::HashTable
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TryReserveError {
    /// The requested number of slots overflows `usize` or `isize::MAX` bytes.
    CapacityOverflow,

    /// The allocator refused to provide the new backing buffer.
    AllocError {
        /// The layout of the buffer that could not be allocated.
        layout: Layout,
    },
}

impl fmt::Display for TryReserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryReserveError::CapacityOverflow => {
                f.write_str("hash table capacity overflow")
            }
            TryReserveError::AllocError { layout } => write!(
                f,
                "failed to allocate {} bytes for hash table buckets",
                layout.size()
            ),
        }
    }
}

impl core::error::Error for TryReserveError {}

/// Returned when inserting a record whose key is already in the table.
///
/// The rejected record has been dropped; the stored record is untouched.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AlreadyPresent {
    /// The duplicate key.
    pub key: u32,
}

impl fmt::Display for AlreadyPresent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key {} is already present", self.key)
    }
}

impl core::error::Error for AlreadyPresent {}

/// The error type for [`HashTable::try_insert`].
///
/// [`HashTable::try_insert`]: crate::HashTable::try_insert
#[derive(PartialEq, Eq, Debug)]
pub enum InsertError<R> {
    /// The key was already present. The candidate has been dropped.
    AlreadyPresent(AlreadyPresent),

    /// Growing the table failed. The table is unchanged and the candidate is
    /// handed back.
    Alloc {
        /// The record that could not be placed.
        record: R,
        /// Why the table could not grow.
        error: TryReserveError,
    },
}

impl<R> InsertError<R> {
    /// Recovers the candidate record if it was not consumed.
    pub fn into_record(self) -> Option<R> {
        match self {
            InsertError::AlreadyPresent(_) => None,
            InsertError::Alloc { record, .. } => Some(record),
        }
    }
}

impl<R> From<AlreadyPresent> for InsertError<R> {
    fn from(value: AlreadyPresent) -> Self {
        InsertError::AlreadyPresent(value)
    }
}

impl<R> fmt::Display for InsertError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::AlreadyPresent(e) => fmt::Display::fmt(e, f),
            InsertError::Alloc { error, .. } => fmt::Display::fmt(error, f),
        }
    }
}

impl<R: fmt::Debug> core::error::Error for InsertError<R> {}

/// Whether a failed growth is reported to the caller or aborts.
#[derive(Clone, Copy)]
pub(crate) enum Fallibility {
    Fallible,
    Infallible,
}

impl Fallibility {
    #[cold]
    #[inline(never)]
    pub(crate) fn capacity_overflow(self) -> TryReserveError {
        match self {
            Fallibility::Fallible => TryReserveError::CapacityOverflow,
            Fallibility::Infallible => panic!("Hash table capacity overflow"),
        }
    }

    #[cold]
    #[inline(never)]
    pub(crate) fn alloc_err(self, layout: Layout) -> TryReserveError {
        match self {
            Fallibility::Fallible => TryReserveError::AllocError { layout },
            Fallibility::Infallible => alloc::alloc::handle_alloc_error(layout),
        }
    }
}
