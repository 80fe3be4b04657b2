//! Page-granular allocator.
//!
//! Every region is rounded up to whole pages and is page-aligned. Growing a region
//! within its last page is free, and growing past it remaps the pages instead of
//! copying wherever the platform allows it. This pairs well with the buffer's
//! large-size policy, which sizes big regions to end just short of a page boundary.

use std::ptr::NonNull;

use crate::{AllocError, Allocator, Result, mmap};

/// Allocator serving regions from anonymous page mappings.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageAllocator;

impl PageAllocator {
    /// Size of one page on the current system.
    pub fn page_size() -> usize {
        mmap::get_page_size()
    }

    /// Number of bytes actually reserved for a request of `size` bytes.
    pub fn reserved_size(size: usize) -> usize {
        mmap::page_capacity(size)
    }
}

unsafe impl Allocator for PageAllocator {
    fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>> {
        match mmap::allocate(size) {
            Ok((ptr, _)) => NonNull::new(ptr as *mut u8).ok_or(AllocError::new(size)),
            Err(e) => {
                log::warn!("page allocation of {size} bytes failed: {e}");
                Err(AllocError::new(size))
            }
        }
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        let capacity = mmap::page_capacity(size);
        if let Err(e) = unsafe { mmap::free(ptr.as_ptr() as _, capacity) } {
            log::warn!("releasing {capacity} mapped bytes failed: {e}");
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>> {
        let capacity = mmap::page_capacity(old_size);
        match unsafe { mmap::remap(ptr.as_ptr() as _, capacity, new_size) } {
            Ok((new_ptr, _)) => NonNull::new(new_ptr as *mut u8).ok_or(AllocError::new(new_size)),
            Err(e) => {
                log::warn!("remapping {capacity} bytes to {new_size} bytes failed: {e}");
                Err(AllocError::new(new_size))
            }
        }
    }
}
