//! The process-wide global allocator, reached through `std::alloc`.

use std::alloc::{Layout, alloc_zeroed, dealloc, realloc};
use std::ptr::NonNull;

use crate::{AllocError, Allocator, Result};

/// Allocator backed by the Rust global allocator.
///
/// Regions are aligned to [`SystemAllocator::ALIGNMENT`] bytes. Zero-sized requests
/// are served as one-byte regions so that every returned pointer is a real allocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// Alignment of every region handed out.
    pub const ALIGNMENT: usize = 16;

    #[inline]
    fn layout(size: usize) -> Result<Layout> {
        Layout::from_size_align(size.max(1), Self::ALIGNMENT)
            .map_err(|_| AllocError::new(size))
    }
}

unsafe impl Allocator for SystemAllocator {
    fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>> {
        let layout = Self::layout(size)?;
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or(AllocError::new(size))
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: the same layout was accepted when the region was allocated.
        let layout = unsafe { Layout::from_size_align_unchecked(size.max(1), Self::ALIGNMENT) };
        unsafe { dealloc(ptr.as_ptr(), layout) }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>> {
        let old_layout = Self::layout(old_size)?;
        // Validates that the new size still forms a legal layout.
        Self::layout(new_size)?;
        let ptr = unsafe { realloc(ptr.as_ptr(), old_layout, new_size.max(1)) };
        NonNull::new(ptr).ok_or(AllocError::new(new_size))
    }
}
