//! An allocator wrapper that meters every byte it hands out.
//!
//! `TrackingAllocator` forwards to an inner allocator while keeping live counters
//! and an optional byte budget. Requests that would push the live total over the
//! budget fail with [`AllocError`] without reaching the inner allocator, which makes
//! it the natural way to exercise exhaustion paths and to check for leaks.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{AllocError, Allocator, Result, SystemAllocator};

pub struct TrackingAllocator<A = SystemAllocator> {
    inner: A,
    /// Bytes that may still be handed out before requests start failing.
    remaining: Counter,
    live_bytes: AtomicU64,
    live_allocations: AtomicU64,
    total_allocations: AtomicU64,
    failures: AtomicU64,
}

impl TrackingAllocator<SystemAllocator> {
    /// Tracks the system allocator without a budget.
    pub fn new() -> TrackingAllocator {
        TrackingAllocator::wrap(SystemAllocator)
    }

    /// Tracks the system allocator, refusing to keep more than `budget` bytes live.
    pub fn with_budget(budget: u64) -> TrackingAllocator {
        let tracker = TrackingAllocator::new();
        tracker.set_budget(Some(budget));
        tracker
    }
}

impl<A: Allocator> TrackingAllocator<A> {
    pub fn wrap(inner: A) -> TrackingAllocator<A> {
        TrackingAllocator {
            inner,
            remaining: Counter::new(u64::MAX),
            live_bytes: AtomicU64::new(0),
            live_allocations: AtomicU64::new(0),
            total_allocations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Replaces the budget. `None` lifts the limit.
    ///
    /// The new budget applies to the bytes that are live at the time of the call:
    /// a budget below the current live total makes every further growth fail.
    pub fn set_budget(&self, budget: Option<u64>) {
        let live = self.live_bytes();
        let remaining = match budget {
            Some(budget) => budget.saturating_sub(live),
            None => u64::MAX,
        };
        self.remaining.set(remaining);
    }

    /// Bytes currently allocated and not yet released.
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Acquire)
    }

    /// Regions currently allocated and not yet released.
    pub fn live_allocations(&self) -> u64 {
        self.live_allocations.load(Ordering::Acquire)
    }

    /// Successful `allocate_zeroed` calls over the tracker's lifetime.
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations.load(Ordering::Acquire)
    }

    /// Requests refused by the budget or by the inner allocator.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn refuse(&self, requested: usize) -> AllocError {
        self.failures.fetch_add(1, Ordering::AcqRel);
        log::debug!("tracking allocator refused {requested} bytes");
        AllocError::new(requested)
    }
}

impl Default for TrackingAllocator<SystemAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for TrackingAllocator<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingAllocator")
            .field("live_bytes", &self.live_bytes.load(Ordering::Relaxed))
            .field(
                "live_allocations",
                &self.live_allocations.load(Ordering::Relaxed),
            )
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

unsafe impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>> {
        let amount = size as u64;
        if !self.remaining.withdraw(amount) {
            return Err(self.refuse(size));
        }
        match self.inner.allocate_zeroed(size) {
            Ok(ptr) => {
                self.live_bytes.fetch_add(amount, Ordering::AcqRel);
                self.live_allocations.fetch_add(1, Ordering::AcqRel);
                self.total_allocations.fetch_add(1, Ordering::AcqRel);
                Ok(ptr)
            }
            Err(_) => {
                self.remaining.deposit(amount);
                Err(self.refuse(size))
            }
        }
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        unsafe { self.inner.release(ptr, size) };
        let amount = size as u64;
        self.live_bytes.fetch_sub(amount, Ordering::AcqRel);
        self.live_allocations.fetch_sub(1, Ordering::AcqRel);
        self.remaining.deposit(amount);
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>> {
        let (old, new) = (old_size as u64, new_size as u64);
        if new > old && !self.remaining.withdraw(new - old) {
            return Err(self.refuse(new_size));
        }
        match unsafe { self.inner.reallocate(ptr, old_size, new_size) } {
            Ok(ptr) => {
                if new > old {
                    self.live_bytes.fetch_add(new - old, Ordering::AcqRel);
                } else {
                    self.live_bytes.fetch_sub(old - new, Ordering::AcqRel);
                    self.remaining.deposit(old - new);
                }
                Ok(ptr)
            }
            Err(_) => {
                if new > old {
                    self.remaining.deposit(new - old);
                }
                Err(self.refuse(new_size))
            }
        }
    }
}

/// A non-negative amount that many threads may withdraw from and deposit into.
struct Counter(AtomicU64);

impl Counter {
    fn new(amount: u64) -> Counter {
        Counter(AtomicU64::new(amount))
    }

    fn set(&self, amount: u64) {
        self.0.store(amount, Ordering::Release);
    }

    /// Subtracts `amount` if the counter holds at least that much.
    fn withdraw(&self, amount: u64) -> bool {
        let mut current = self.0.load(Ordering::Relaxed);
        while current >= amount {
            match self.0.compare_exchange_weak(
                current,
                current - amount,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(updated) => current = updated,
            }
        }
        false
    }

    fn deposit(&self, amount: u64) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |current| {
                Some(current.saturating_add(amount))
            });
    }
}
