//! Anonymous page mappings through `mmap(2)`.

use std::sync::OnceLock;

/// Maps `size` bytes of zero-filled, page-aligned memory.
///
/// The size is rounded up to a whole number of pages. Returns the mapping address
/// together with the mapped capacity, which must be passed back to [`free`] and
/// [`remap`].
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let capacity = page_capacity(size);
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr, capacity))
}

/// Resizes a mapping, letting the kernel move it when it cannot grow in place.
///
/// # Safety
///
/// `ptr` and `capacity` must describe a live mapping returned by [`allocate`] or
/// [`remap`]. On success the old address must no longer be used.
pub unsafe fn remap(
    ptr: *mut std::ffi::c_void,
    capacity: usize,
    new_size: usize,
) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let new_capacity = page_capacity(new_size);
    if new_capacity == capacity {
        return Ok((ptr, capacity));
    }
    let new_ptr = unsafe { libc::mremap(ptr, capacity, new_capacity, libc::MREMAP_MAYMOVE) };
    if new_ptr.is_null() || new_ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((new_ptr, new_capacity))
}

/// Unmaps memory returned by [`allocate`] or [`remap`].
///
/// # Safety
///
/// `ptr` and `capacity` must describe a live mapping, and no references into it may
/// outlive this call.
pub unsafe fn free(ptr: *mut std::ffi::c_void, capacity: usize) -> std::io::Result<()> {
    let res = unsafe { libc::munmap(ptr, capacity) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Number of bytes actually mapped for a request of `size` bytes.
pub fn page_capacity(size: usize) -> usize {
    let page_size = get_page_size();
    assert!(page_size.is_power_of_two());
    size.max(1)
        .checked_next_multiple_of(page_size)
        .unwrap_or(usize::MAX & !(page_size - 1))
}

/// Returns the system page size, cached after the first query.
///
/// Falls back to 4KB if `sysconf` fails.
pub fn get_page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| read_page_size().unwrap_or(4 * 1024))
}

fn read_page_size() -> std::io::Result<usize> {
    let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    assert!(res < i32::MAX as _);
    Ok(res as usize)
}
