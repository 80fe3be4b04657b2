//! Data operations: growth, append/push, pop, in-place reservation, and copies.

use flexer_alloc::{AllocError, Allocator};

use crate::capacity::{self, DEFAULT_SIZE};
use crate::descriptor::{Backing, FlexBuffer};
use crate::macros::flexer_assert;

impl<'a, A: Allocator> FlexBuffer<'a, A> {
    /// Resizes the backing region to `new_size` made legal.
    ///
    /// Requests that would end up below the bytes in use are ignored. A local
    /// buffer moves its contents into a fresh owned region and stops being local;
    /// an owned region is reallocated, and any bytes beyond the old capacity read
    /// as zero. On failure the buffer is left exactly as it was.
    pub fn resize(&mut self, new_size: usize) -> Result<(), AllocError> {
        let new_size = capacity::normalize_requested_size(new_size);
        if new_size < self.used {
            log::trace!(
                "ignoring resize to {new_size} bytes below {} bytes in use",
                self.used
            );
            return Ok(());
        }
        self.grow_to(new_size)
    }

    /// Appends `item` to the end of the buffer, growing it if needed.
    ///
    /// # Panics
    ///
    /// Panics if the buffer has no backing region, unless built with the `trusted`
    /// feature. Use [`push`](FlexBuffer::push) when the region may not exist yet.
    pub fn append(&mut self, item: &[u8]) -> Result<(), AllocError> {
        flexer_assert!(
            self.is_allocated(),
            "append requires an allocated buffer; use push instead"
        );
        self.ensure_room(item.len())?;
        let start = self.used;
        self.region_mut()[start..start + item.len()].copy_from_slice(item);
        self.used += item.len();
        Ok(())
    }

    /// Appends `item`, first allocating a default-sized region if there is none.
    pub fn push(&mut self, item: &[u8]) -> Result<(), AllocError> {
        if !self.is_allocated() {
            self.grow_to(DEFAULT_SIZE)?;
        }
        self.append(item)
    }

    /// Removes the last `size` bytes and returns a view of them.
    ///
    /// The bytes stay in place until the next write reuses them; the returned view
    /// borrows the buffer, so it cannot outlive that write. Returns `None` and
    /// changes nothing if fewer than `size` bytes are in use.
    pub fn pop_bytes(&mut self, size: usize) -> Option<&[u8]> {
        if size > self.used {
            return None;
        }
        self.used -= size;
        let start = self.used;
        Some(&self.region()[start..start + size])
    }

    /// Claims `size` bytes at the end of the buffer for in-place writing.
    ///
    /// Grows the buffer if needed and returns the claimed region. Its contents are
    /// whatever was there before: zero for never-written memory, stale bytes after a
    /// [`reset`](FlexBuffer::reset) or a pop.
    pub fn reserve(&mut self, size: usize) -> Result<&mut [u8], AllocError> {
        self.ensure_room(size)?;
        let start = self.used;
        self.used += size;
        Ok(&mut self.region_mut()[start..start + size])
    }

    /// Marks the buffer empty without touching its contents or capacity.
    #[inline]
    pub fn reset(&mut self) {
        self.used = 0;
    }

    /// Marks the buffer empty and zeroes the whole backing region.
    pub fn clear(&mut self) {
        self.used = 0;
        self.region_mut().fill(0);
    }

    /// Copies the buffer into a new, independent, owned buffer.
    ///
    /// The copy has the same capacity and the same bytes in use. Local buffers are
    /// duplicated into owned memory as well; a buffer without a region yields an
    /// empty one of [`MIN_SIZE`](crate::MIN_SIZE) bytes.
    pub fn duplicate(&self) -> Result<FlexBuffer<'static, A>, AllocError>
    where
        A: Clone,
    {
        let mut dup = if self.is_allocated() {
            FlexBuffer::with_exact_capacity_in(self.capacity(), self.alloc.clone())?
        } else {
            FlexBuffer::with_capacity_in(0, self.alloc.clone())?
        };
        dup.region_mut()[..self.used].copy_from_slice(self.as_slice());
        dup.used = self.used;
        Ok(dup)
    }

    /// Makes room for `additional` more bytes, doubling the capacity as needed.
    fn ensure_room(&mut self, additional: usize) -> Result<(), AllocError> {
        if additional <= self.capacity() - self.used {
            return Ok(());
        }
        let required = self
            .used
            .checked_add(additional)
            .ok_or(AllocError::new(usize::MAX))?;
        self.grow_to(capacity::growth_target(self.capacity(), required))
    }

    /// Moves the buffer onto an owned region of exactly `new_size` bytes.
    ///
    /// `new_size` must be legal and no smaller than the bytes in use.
    fn grow_to(&mut self, new_size: usize) -> Result<(), AllocError> {
        debug_assert!(new_size >= self.used);
        let old_size = self.capacity();
        let ptr = match self.backing {
            Backing::Unallocated => self.alloc.allocate_zeroed(new_size),
            Backing::Borrowed { ptr, .. } => {
                self.alloc.allocate_zeroed(new_size).map(|new_ptr| {
                    log::debug!(
                        "moving local buffer of {old_size} bytes to an owned region of {new_size} bytes"
                    );
                    // SAFETY: the borrowed region holds at least `used` bytes and the new
                    // one `new_size >= used`; they are distinct allocations.
                    unsafe {
                        std::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), self.used);
                    }
                    new_ptr
                })
            }
            // SAFETY: `ptr` came from `self.alloc` for exactly `old_size` bytes.
            Backing::Owned(ptr) => unsafe { self.alloc.reallocate(ptr, old_size, new_size) }
                .inspect(|new_ptr| {
                    if new_size > old_size {
                        unsafe {
                            new_ptr
                                .as_ptr()
                                .add(old_size)
                                .write_bytes(0, new_size - old_size);
                        }
                    }
                }),
        }
        .inspect_err(|e| log::warn!("growing flex buffer from {old_size} bytes: {e}"))?;

        log::trace!("flex buffer capacity {old_size} -> {new_size}");
        self.backing = Backing::Owned(ptr);
        self.set_capacity(new_size);
        Ok(())
    }
}

impl<A: Allocator> std::io::Write for FlexBuffer<'_, A> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.push(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::OutOfMemory, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
