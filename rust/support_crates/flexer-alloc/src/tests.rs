use std::ptr::NonNull;

use crate::{AllocError, Allocator, PageAllocator, SystemAllocator, TrackingAllocator, mmap};

fn bytes<'a>(ptr: NonNull<u8>, len: usize) -> &'a mut [u8] {
    unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) }
}

fn check_roundtrip<A: Allocator>(alloc: &A) {
    let ptr = alloc.allocate_zeroed(100).expect("allocate_zeroed");
    assert!(bytes(ptr, 100).iter().all(|&b| b == 0));
    bytes(ptr, 100)
        .iter_mut()
        .enumerate()
        .for_each(|(i, b)| *b = i as u8);

    let ptr = unsafe { alloc.reallocate(ptr, 100, 10_000) }.expect("reallocate");
    let data = bytes(ptr, 10_000);
    assert!(data[..100].iter().enumerate().all(|(i, &b)| b == i as u8));

    let ptr = unsafe { alloc.reallocate(ptr, 10_000, 50) }.expect("shrink");
    assert!(bytes(ptr, 50).iter().enumerate().all(|(i, &b)| b == i as u8));

    unsafe { alloc.release(ptr, 50) };
}

#[test]
fn test_system_allocator_roundtrip() {
    check_roundtrip(&SystemAllocator);
}

#[test]
fn test_system_allocator_alignment() {
    let ptr = SystemAllocator.allocate_zeroed(3).unwrap();
    assert!((ptr.as_ptr() as usize).is_multiple_of(SystemAllocator::ALIGNMENT));
    unsafe { SystemAllocator.release(ptr, 3) };
}

#[test]
fn test_system_allocator_zero_size() {
    let ptr = SystemAllocator.allocate_zeroed(0).unwrap();
    unsafe { SystemAllocator.release(ptr, 0) };
}

#[test]
fn test_system_allocator_impossible_size() {
    let err = SystemAllocator.allocate_zeroed(usize::MAX).unwrap_err();
    assert_eq!(err, AllocError::new(usize::MAX));
}

#[test]
fn test_page_allocator_roundtrip() {
    check_roundtrip(&PageAllocator);
}

#[test]
fn test_page_allocator_alignment() {
    let page_size = PageAllocator::page_size();
    assert!(page_size.is_power_of_two());

    let ptr = PageAllocator.allocate_zeroed(10).unwrap();
    assert!((ptr.as_ptr() as usize).is_multiple_of(page_size));
    unsafe { PageAllocator.release(ptr, 10) };
}

#[test]
fn test_page_allocator_grows_within_page_in_place() {
    let page_size = PageAllocator::page_size();
    let ptr = PageAllocator.allocate_zeroed(16).unwrap();
    let grown = unsafe { PageAllocator.reallocate(ptr, 16, page_size - 24) }.unwrap();
    assert_eq!(ptr, grown);
    unsafe { PageAllocator.release(grown, page_size - 24) };
}

#[test]
fn test_page_capacity() {
    let page_size = mmap::get_page_size();
    assert_eq!(mmap::page_capacity(0), page_size);
    assert_eq!(mmap::page_capacity(1), page_size);
    assert_eq!(mmap::page_capacity(page_size), page_size);
    assert_eq!(mmap::page_capacity(page_size * 3 + 100), page_size * 4);
    assert_eq!(PageAllocator::reserved_size(page_size + 1), page_size * 2);
}

#[test]
fn test_tracking_counts_live_memory() {
    let tracker = TrackingAllocator::new();
    let a = tracker.allocate_zeroed(64).unwrap();
    let b = tracker.allocate_zeroed(32).unwrap();
    assert_eq!(tracker.live_bytes(), 96);
    assert_eq!(tracker.live_allocations(), 2);
    assert_eq!(tracker.total_allocations(), 2);

    let a = unsafe { tracker.reallocate(a, 64, 128) }.unwrap();
    assert_eq!(tracker.live_bytes(), 160);
    assert_eq!(tracker.live_allocations(), 2);

    unsafe {
        tracker.release(a, 128);
        tracker.release(b, 32);
    }
    assert_eq!(tracker.live_bytes(), 0);
    assert_eq!(tracker.live_allocations(), 0);
    assert_eq!(tracker.total_allocations(), 2);
    assert_eq!(tracker.failures(), 0);
}

#[test]
fn test_tracking_budget_refuses_excess() {
    let tracker = TrackingAllocator::with_budget(100);
    let a = tracker.allocate_zeroed(60).unwrap();
    assert_eq!(
        tracker.allocate_zeroed(50).unwrap_err(),
        AllocError::new(50)
    );
    assert_eq!(tracker.failures(), 1);
    assert_eq!(tracker.live_bytes(), 60);

    let b = tracker.allocate_zeroed(40).unwrap();
    unsafe { tracker.release(b, 40) };

    // Growing past the budget fails and leaves the region intact.
    bytes(a, 60)[0] = 7;
    let err = unsafe { tracker.reallocate(a, 60, 120) }.unwrap_err();
    assert_eq!(err.requested_bytes, 120);
    assert_eq!(bytes(a, 60)[0], 7);
    assert_eq!(tracker.live_bytes(), 60);

    // Shrinking returns bytes to the budget.
    let a = unsafe { tracker.reallocate(a, 60, 20) }.unwrap();
    let c = tracker.allocate_zeroed(80).unwrap();
    unsafe {
        tracker.release(a, 20);
        tracker.release(c, 80);
    }
    assert_eq!(tracker.live_bytes(), 0);
}

#[test]
fn test_tracking_set_budget_applies_to_live_bytes() {
    let tracker = TrackingAllocator::new();
    let a = tracker.allocate_zeroed(64).unwrap();
    tracker.set_budget(Some(64));
    assert!(tracker.allocate_zeroed(1).is_err());

    tracker.set_budget(None);
    let b = tracker.allocate_zeroed(1 << 20).unwrap();
    unsafe {
        tracker.release(a, 64);
        tracker.release(b, 1 << 20);
    }
}

#[test]
fn test_tracking_by_reference() {
    let tracker = TrackingAllocator::wrap(PageAllocator);
    assert_eq!(*tracker.inner(), PageAllocator);
    let by_ref = &tracker;
    check_roundtrip(&by_ref);
    assert_eq!(tracker.live_allocations(), 0);
    assert_eq!(tracker.total_allocations(), 1);
}
