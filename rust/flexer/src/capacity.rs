//! Capacity policy: which sizes a buffer may have and how it grows.
//!
//! Every capacity is even and at least [`MIN_SIZE`]. Sizes from one page upwards
//! are placed so that the region plus one descriptor record ends exactly on a
//! page boundary.

/// Capacity of a buffer created without an explicit size.
pub const DEFAULT_SIZE: usize = 16;

/// Smallest legal capacity.
pub const MIN_SIZE: usize = 2;

/// Granule of the large-size alignment.
pub const PAGE_SIZE: usize = 4096;

/// Size of the packed descriptor record (capacity, used and data words).
///
/// Large capacities are shortened by this much so that region and record share
/// whole pages.
pub const DESCRIPTOR_SIZE: usize = 3 * std::mem::size_of::<u64>();

/// Converts a requested size into a legal capacity.
///
/// Odd sizes are rounded up by one, tiny sizes are raised to [`MIN_SIZE`], and the
/// result goes through [`align_for_large_sizes`]. The conversion is idempotent.
///
/// Note that the large-size alignment can yield a capacity slightly below the
/// request: `normalize_requested_size(4096)` is `4096 - DESCRIPTOR_SIZE`.
pub fn normalize_requested_size(size: usize) -> usize {
    let size = size.checked_next_multiple_of(2).unwrap_or(usize::MAX - 1);
    align_for_large_sizes(size.max(MIN_SIZE))
}

/// Applies the page policy to sizes of [`PAGE_SIZE`] and above.
///
/// Smaller sizes pass through. Exactly one page becomes one page minus a
/// descriptor record; anything larger moves to the end of the following page,
/// again minus a descriptor record.
pub fn align_for_large_sizes(size: usize) -> usize {
    if size < PAGE_SIZE {
        return size;
    }
    if size == PAGE_SIZE {
        return PAGE_SIZE - DESCRIPTOR_SIZE;
    }
    let pages = size / PAGE_SIZE;
    match pages.checked_add(1).and_then(|p| p.checked_mul(PAGE_SIZE)) {
        Some(end) => end - DESCRIPTOR_SIZE,
        None => pages * PAGE_SIZE - DESCRIPTOR_SIZE,
    }
}

/// Capacity to grow to when a buffer of `capacity` must hold `required` bytes.
///
/// Doubles the current capacity (an empty buffer starts from [`DEFAULT_SIZE`]). If
/// that is still too small, or the page policy pulled the size under `required`,
/// the target is raised until it fits. The result is always a normalized size.
pub fn growth_target(capacity: usize, required: usize) -> usize {
    let doubled = if capacity == 0 {
        DEFAULT_SIZE
    } else {
        capacity.saturating_mul(2)
    };
    let target = normalize_requested_size(doubled.max(required));
    if target >= required {
        target
    } else {
        normalize_requested_size(required.saturating_add(DESCRIPTOR_SIZE))
    }
}

/// Array length used for stack storage of `size` bytes by [`local_use!`](crate::local_use).
pub const fn local_storage_size(size: usize) -> usize {
    if size < MIN_SIZE {
        MIN_SIZE
    } else {
        size + (size & 1)
    }
}
