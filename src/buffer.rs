//! The allocation seam for a table's backing buffer.
//!
//! A [`HashTable`] owns exactly one buffer at a time. Growth asks its
//! [`BufferAllocator`] for a fresh buffer, migrates every live record into
//! it, and only then hands the old buffer back. A refused allocation leaves
//! the table untouched.
//!
//! [`HashTable`]: crate::HashTable

use core::alloc::Layout;
use core::ptr::NonNull;

/// Alignment of every backing buffer, one cache line.
pub const BUFFER_ALIGN: usize = 64;

/// Provides aligned memory for table buffers.
///
/// # Safety
///
/// Implementations must return blocks that are valid for reads and writes of
/// `layout.size()` bytes, aligned to `layout.align()`, and that stay valid
/// until passed back to [`deallocate`](BufferAllocator::deallocate) with the
/// same layout. Layouts passed in always have a non-zero size.
pub unsafe trait BufferAllocator {
    /// Allocates a block for `layout`, or `None` if memory is unavailable.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Returns a block previously obtained from `allocate`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `self.allocate(layout)` and not yet
    /// deallocated.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Global;

// SAFETY: Delegates to the global allocator, which upholds the contract for
// non-zero-sized layouts.
unsafe impl BufferAllocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() != 0);
        // SAFETY: The layout has a non-zero size.
        NonNull::new(unsafe { alloc::alloc::alloc(layout) })
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Caller guarantees `ptr` came from `allocate(layout)`.
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

// SAFETY: Forwards to the referenced allocator.
unsafe impl<A: BufferAllocator + ?Sized> BufferAllocator for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Caller guarantees `ptr` came from `allocate(layout)`.
        unsafe { (**self).deallocate(ptr, layout) }
    }
}
