//! Page-aligned allocations emulated on top of `std::alloc`.

use std::alloc::{Layout, alloc_zeroed, dealloc, realloc};

/// Allocates `size` bytes of zero-filled, page-aligned memory.
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let capacity = page_capacity(size);
    let layout = page_layout(capacity)?;

    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "Failed to allocate memory",
        ));
    }

    Ok((ptr as *mut std::ffi::c_void, capacity))
}

/// Resizes an allocation returned by [`allocate`], keeping its page alignment.
///
/// # Safety
///
/// `ptr` and `capacity` must describe a live allocation returned by [`allocate`] or
/// [`remap`].
pub unsafe fn remap(
    ptr: *mut std::ffi::c_void,
    capacity: usize,
    new_size: usize,
) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let new_capacity = page_capacity(new_size);
    if new_capacity == capacity {
        return Ok((ptr, capacity));
    }
    let layout = page_layout(capacity)?;
    page_layout(new_capacity)?;
    let new_ptr = unsafe { realloc(ptr as *mut u8, layout, new_capacity) };
    if new_ptr.is_null() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "Failed to reallocate memory",
        ));
    }
    Ok((new_ptr as *mut std::ffi::c_void, new_capacity))
}

/// Frees memory returned by [`allocate`] or [`remap`].
///
/// # Safety
///
/// `ptr` and `capacity` must describe a live allocation.
pub unsafe fn free(ptr: *mut std::ffi::c_void, capacity: usize) -> std::io::Result<()> {
    assert!(capacity.is_multiple_of(get_page_size()));
    let layout = page_layout(capacity)?;
    unsafe {
        dealloc(ptr as *mut u8, layout);
    }
    Ok(())
}

/// Number of bytes actually reserved for a request of `size` bytes.
pub fn page_capacity(size: usize) -> usize {
    let page_size = get_page_size();
    size.max(1)
        .checked_next_multiple_of(page_size)
        .unwrap_or(usize::MAX & !(page_size - 1))
}

/// Returns the emulated page size in bytes.
pub fn get_page_size() -> usize {
    4 * 1024
}

fn page_layout(capacity: usize) -> std::io::Result<Layout> {
    Layout::from_size_align(capacity, get_page_size())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid layout"))
}
