//! Allocator collaborators for the Flexer buffer.
//!
//! An [`Allocator`] hands out zero-filled byte regions, releases them, and resizes
//! them in place or by moving. The buffer never talks to the system allocator
//! directly; it goes through one of these implementations instead, and the one
//! used when nothing else is specified is selected at build time through
//! [`DefaultAllocator`].

use std::ptr::NonNull;

use thiserror::Error;

pub mod page;
pub mod system;
pub mod tracking;

#[cfg_attr(target_os = "linux", path = "mmap_linux.rs")]
#[cfg_attr(not(target_os = "linux"), path = "mmap_fallback.rs")]
pub mod mmap;

#[cfg(test)]
mod tests;

pub use page::PageAllocator;
pub use system::SystemAllocator;
pub use tracking::TrackingAllocator;

/// The allocator linked in when a buffer does not name one explicitly.
#[cfg(not(feature = "page-alloc"))]
pub type DefaultAllocator = SystemAllocator;

/// The allocator linked in when a buffer does not name one explicitly.
#[cfg(feature = "page-alloc")]
pub type DefaultAllocator = PageAllocator;

/// Allocator exhaustion.
///
/// Returned by every allocating operation; never retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("failed to allocate {requested_bytes} bytes")]
pub struct AllocError {
    pub requested_bytes: usize,
}

impl AllocError {
    pub fn new(requested_bytes: usize) -> AllocError {
        AllocError { requested_bytes }
    }
}

pub type Result<T, E = AllocError> = std::result::Result<T, E>;

/// A pluggable allocate/release/reallocate triple.
///
/// # Safety
///
/// Implementors must guarantee that:
/// - `allocate_zeroed(n)` returns a region valid for reads and writes of `n` bytes,
///   with every byte set to zero.
/// - `reallocate(ptr, old, new)` returns a region valid for `new` bytes whose first
///   `min(old, new)` bytes equal the old contents. On failure the old region must
///   remain valid and untouched.
/// - `release` and `reallocate` accept any region previously returned by the same
///   allocator, when called with the size it was last allocated with.
pub unsafe trait Allocator {
    /// Allocates `size` bytes of zero-filled memory.
    fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>>;

    /// Returns a region to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for a region of exactly `size`
    /// bytes, and must not be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, size: usize);

    /// Resizes a region, moving it if needed.
    ///
    /// Bytes beyond `old_size` in the returned region have unspecified contents.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for a region of exactly
    /// `old_size` bytes. On success the old pointer must no longer be used.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>>;
}

unsafe impl<A> Allocator for &A
where
    A: Allocator + ?Sized,
{
    #[inline]
    fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>> {
        (**self).allocate_zeroed(size)
    }

    #[inline]
    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        unsafe { (**self).release(ptr, size) }
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>> {
        unsafe { (**self).reallocate(ptr, old_size, new_size) }
    }
}
