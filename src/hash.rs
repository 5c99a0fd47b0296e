//! Key mixing and slot-count arithmetic.

/// Smallest non-zero number of slots a table will allocate.
pub const MIN_CAPACITY: usize = 8;

/// Avalanche mix of a 32-bit key.
///
/// A multiply/shift/xor cascade so that keys differing in a single bit land
/// on unrelated slots. The initial probe slot of `key` in a table with
/// `buckets` slots is `mix(key) as usize & (buckets - 1)`.
///
/// # Examples
///
/// ```rust
/// use mapi::hash::mix;
///
/// assert_ne!(mix(1) & 7, mix(2) & 7);
/// assert_eq!(mix(42), mix(42));
/// ```
#[inline(always)]
pub const fn mix(key: u32) -> u32 {
    let mut a = key;
    a = a.wrapping_add(0x7ed5_5d16).wrapping_add(a << 12);
    a = (a ^ 0xc761_c23c) ^ (a >> 19);
    a = a.wrapping_add(0x1656_67b1).wrapping_add(a << 5);
    a = a.wrapping_add(0xd3a2_646c) ^ (a << 9);
    a = a.wrapping_add(0xfd70_46c5).wrapping_add(a << 3);
    a = (a ^ 0xb55a_4f09) ^ (a >> 16);
    a
}

/// Number of slots needed so that `records` entries stay at or below a 50%
/// load factor. `None` on overflow.
#[inline]
pub(crate) fn buckets_for(records: usize) -> Option<usize> {
    records.checked_mul(2)
}

/// Rounds a requested slot count up to the next valid bucket count.
///
/// Growing from an empty table clamps to [`MIN_CAPACITY`]. `None` on
/// overflow.
#[inline]
pub(crate) fn round_buckets(requested: usize, current: usize) -> Option<usize> {
    let rounded = requested.checked_next_power_of_two()?;
    if current == 0 {
        Some(rounded.max(MIN_CAPACITY))
    } else {
        Some(rounded)
    }
}
