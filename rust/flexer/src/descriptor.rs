//! The buffer descriptor: capacity, usage, and who owns the backing region.

use std::marker::PhantomData;
use std::ptr::NonNull;

use flexer_alloc::{AllocError, Allocator, DefaultAllocator};

use crate::capacity::{self, DEFAULT_SIZE, MIN_SIZE};
use crate::macros::flexer_assert;

/// Backing region of a [`FlexBuffer`].
pub(crate) enum Backing<'a> {
    /// No region yet; capacity and usage are both zero.
    Unallocated,
    /// Caller-supplied memory. Never released by the buffer.
    Borrowed {
        ptr: NonNull<u8>,
        _region: PhantomData<&'a mut [u8]>,
    },
    /// Memory obtained from the buffer's allocator.
    Owned(NonNull<u8>),
}

/// A growable byte buffer over one contiguous region.
///
/// The region is either owned (obtained from the allocator `A` and released by the
/// buffer) or *local*: borrowed from the caller for `'a`, typically a stack array.
/// A local buffer never grows its borrowed region. The first growth moves the
/// contents into an owned region and the buffer stays owned from then on.
///
/// Capacity is always even and every capacity change goes through the
/// [capacity policy](crate::capacity). Views handed out by queries and data
/// operations borrow the buffer, so any mutating call invalidates them.
pub struct FlexBuffer<'a, A: Allocator = DefaultAllocator> {
    pub(crate) backing: Backing<'a>,
    capacity: usize,
    pub(crate) used: usize,
    pub(crate) alloc: A,
}

// SAFETY: the buffer exclusively owns or exclusively borrows its region.
unsafe impl<A: Allocator + Send> Send for FlexBuffer<'_, A> {}

impl<'a> FlexBuffer<'a> {
    /// Creates a buffer with the default capacity.
    pub fn new() -> Result<FlexBuffer<'a>, AllocError> {
        Self::new_in(DefaultAllocator::default())
    }

    /// Creates a buffer whose capacity is `size` made legal.
    pub fn with_capacity(size: usize) -> Result<FlexBuffer<'a>, AllocError> {
        Self::with_capacity_in(size, DefaultAllocator::default())
    }

    /// Creates a placeholder buffer without a backing region.
    ///
    /// The region is allocated by the first [`push`](FlexBuffer::push).
    pub fn unallocated() -> FlexBuffer<'a> {
        Self::unallocated_in(DefaultAllocator::default())
    }

    /// Creates a local buffer over caller-supplied memory.
    ///
    /// See [`adopt_in`](FlexBuffer::adopt_in).
    pub fn adopt(mem: &'a mut [u8]) -> FlexBuffer<'a> {
        Self::adopt_in(mem, DefaultAllocator::default())
    }

    /// Creates a buffer with the default capacity, with the descriptor itself on
    /// the heap.
    pub fn new_boxed() -> Result<Box<FlexBuffer<'a>>, AllocError> {
        Self::new().map(Box::new)
    }

    /// Creates a heap-allocated descriptor for a buffer of `size` bytes made legal.
    pub fn new_boxed_sized(size: usize) -> Result<Box<FlexBuffer<'a>>, AllocError> {
        Self::with_capacity(size).map(Box::new)
    }

    /// Creates a heap-allocated descriptor without a backing region.
    pub fn new_boxed_unallocated() -> Box<FlexBuffer<'a>> {
        Box::new(Self::unallocated())
    }
}

impl<'a, A: Allocator> FlexBuffer<'a, A> {
    /// Creates a buffer with the default capacity, backed by `alloc`.
    pub fn new_in(alloc: A) -> Result<FlexBuffer<'a, A>, AllocError> {
        Self::with_capacity_in(DEFAULT_SIZE, alloc)
    }

    /// Creates a buffer backed by `alloc` whose capacity is `size` made legal.
    ///
    /// Fails only if the allocator cannot provide the region.
    pub fn with_capacity_in(size: usize, alloc: A) -> Result<FlexBuffer<'a, A>, AllocError> {
        Self::with_exact_capacity_in(capacity::normalize_requested_size(size), alloc)
    }

    /// Allocates an owned region of exactly `size` bytes, which must be even.
    ///
    /// Adopted buffers carry capacities the policy would not choose; copies of them
    /// keep those capacities through this constructor.
    pub(crate) fn with_exact_capacity_in(
        size: usize,
        alloc: A,
    ) -> Result<FlexBuffer<'a, A>, AllocError> {
        debug_assert_eq!(size % 2, 0);
        let ptr = alloc.allocate_zeroed(size).inspect_err(|e| {
            log::warn!("creating flex buffer: {e}");
        })?;
        Ok(FlexBuffer {
            backing: Backing::Owned(ptr),
            capacity: size,
            used: 0,
            alloc,
        })
    }

    /// Creates a placeholder buffer without a backing region, backed by `alloc`.
    pub fn unallocated_in(alloc: A) -> FlexBuffer<'a, A> {
        FlexBuffer {
            backing: Backing::Unallocated,
            capacity: 0,
            used: 0,
            alloc,
        }
    }

    /// Creates a local buffer over caller-supplied memory.
    ///
    /// The whole of `mem` is zeroed. Its length is rounded down to an even capacity;
    /// `alloc` is used only once the buffer outgrows `mem`, and `mem` itself is never
    /// released by the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `mem` is shorter than [`MIN_SIZE`], unless built with the `trusted`
    /// feature.
    pub fn adopt_in(mem: &'a mut [u8], alloc: A) -> FlexBuffer<'a, A> {
        flexer_assert!(
            mem.len() >= MIN_SIZE,
            "adopted memory must hold at least {MIN_SIZE} bytes, got {}",
            mem.len()
        );
        mem.fill(0);
        log::trace!("adopting {} bytes of local memory", mem.len());
        FlexBuffer {
            backing: Backing::Borrowed {
                ptr: NonNull::from(&mut *mem).cast(),
                _region: PhantomData,
            },
            capacity: mem.len() & !1,
            used: 0,
            alloc,
        }
    }

    /// Releases the buffer: frees an owned region and drops the descriptor.
    ///
    /// For a boxed descriptor the box is freed as well. Borrowed memory is left to
    /// the caller. Equivalent to dropping the buffer.
    pub fn release(self) {}

    /// Frees an owned backing region and resets capacity and usage to zero.
    ///
    /// The descriptor stays usable; the next [`push`](FlexBuffer::push) allocates a
    /// fresh region. Borrowed memory is only forgotten, never released. Calling this
    /// on a buffer without a region does nothing.
    pub fn release_storage(&mut self) {
        if let Backing::Owned(ptr) = self.backing {
            log::trace!("releasing {} owned bytes", self.capacity);
            // SAFETY: `ptr` came from `self.alloc` for exactly `self.capacity` bytes.
            unsafe { self.alloc.release(ptr, self.capacity) };
        }
        self.backing = Backing::Unallocated;
        self.capacity = 0;
        self.used = 0;
    }

    /// Number of bytes in use.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Size of the backing region in bytes; zero without a region.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if the buffer has a backing region.
    #[inline]
    pub fn is_allocated(&self) -> bool {
        !matches!(self.backing, Backing::Unallocated)
    }

    /// Returns `true` if nothing is in use. A buffer without a region is not
    /// considered empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.is_allocated() && self.used == 0
    }

    /// Returns `true` if the region is completely in use. A buffer without a region
    /// is not considered full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.is_allocated() && self.used >= self.capacity
    }

    /// Returns `true` if the backing region is borrowed from the caller.
    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self.backing, Backing::Borrowed { .. })
    }

    /// Overrides the ownership of the current backing region.
    ///
    /// Marking an owned region local makes the buffer forget it: the region is
    /// leaked rather than released, and the next growth copies out of it. Marking a
    /// local region owned hands it to the buffer's allocator. A buffer without a
    /// region is left unchanged.
    ///
    /// # Safety
    ///
    /// When `local` is `false` and the buffer is local, the borrowed region must have
    /// been allocated by this buffer's allocator for exactly
    /// [`capacity`](FlexBuffer::capacity) bytes, and must not be used by anyone else
    /// afterwards.
    pub unsafe fn set_local(&mut self, local: bool) {
        self.backing = match std::mem::replace(&mut self.backing, Backing::Unallocated) {
            Backing::Owned(ptr) if local => Backing::Borrowed {
                ptr,
                _region: PhantomData,
            },
            Backing::Borrowed { ptr, .. } if !local => Backing::Owned(ptr),
            backing => backing,
        };
    }

    /// The whole backing region, `capacity` bytes long, or `None` without a region.
    pub fn data(&self) -> Option<&[u8]> {
        // SAFETY: `base` points at a live region of exactly `capacity` bytes, and the
        // slice borrows `self`, so the region cannot move or be released under it.
        self.base()
            .map(|ptr| unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.capacity) })
    }

    /// Mutable access to the whole backing region.
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        // SAFETY: as in `data`; the exclusive borrow of `self` makes the slice unique.
        self.base()
            .map(|ptr| unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.capacity) })
    }

    /// The bytes in use.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.region()[..self.used]
    }

    /// Mutable access to the bytes in use.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let used = self.used;
        &mut self.region_mut()[..used]
    }

    /// Address one past the last byte in use, or `None` if nothing is in use.
    pub fn end(&self) -> Option<NonNull<u8>> {
        if self.used == 0 {
            return None;
        }
        // SAFETY: `used <= capacity`, so the result stays within or one past the region.
        self.base()
            .map(|ptr| unsafe { NonNull::new_unchecked(ptr.as_ptr().add(self.used)) })
    }

    /// The last `size` bytes written, or `None` if nothing is in use or fewer than
    /// `size` bytes are.
    pub fn last(&self, size: usize) -> Option<&[u8]> {
        if self.used == 0 || size > self.used {
            return None;
        }
        Some(&self.as_slice()[self.used - size..])
    }

    /// The allocator backing this buffer.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Records a new capacity. Ownership is tracked by `backing` and is left alone.
    #[inline]
    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        debug_assert_eq!(capacity % 2, 0, "capacity must stay even");
        self.capacity = capacity;
    }

    #[inline]
    pub(crate) fn base(&self) -> Option<NonNull<u8>> {
        match self.backing {
            Backing::Unallocated => None,
            Backing::Borrowed { ptr, .. } | Backing::Owned(ptr) => Some(ptr),
        }
    }

    /// The whole region as a slice, empty without a region.
    #[inline]
    pub(crate) fn region(&self) -> &[u8] {
        self.data().unwrap_or(&[])
    }

    #[inline]
    pub(crate) fn region_mut(&mut self) -> &mut [u8] {
        self.data_mut().unwrap_or(&mut [])
    }
}

impl<A: Allocator> Drop for FlexBuffer<'_, A> {
    fn drop(&mut self) {
        self.release_storage();
    }
}

impl<A: Allocator> std::fmt::Debug for FlexBuffer<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlexBuffer")
            .field("used", &self.used)
            .field("capacity", &self.capacity)
            .field("local", &self.is_local())
            .field("allocated", &self.is_allocated())
            .finish_non_exhaustive()
    }
}

impl Default for FlexBuffer<'_> {
    fn default() -> Self {
        Self::unallocated()
    }
}
