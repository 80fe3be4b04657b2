//! Flexer: a growable byte container over owned or caller-supplied memory.
//!
//! A [`FlexBuffer`] is a byte-oriented append/pop buffer. It starts either with an
//! owned region from its [`Allocator`], with no region at all, or on top of memory
//! the caller lends it (see [`FlexBuffer::adopt`] and [`local_use!`]). Growing a
//! buffer follows a doubling policy with page-friendly sizing for large regions,
//! described in [`capacity`].
//!
//! Allocation failures surface as [`AllocError`]; caller contract violations
//! panic unless the crate is built with the `trusted` feature.

pub mod capacity;
mod descriptor;
mod macros;
mod ops;


pub use capacity::{DEFAULT_SIZE, DESCRIPTOR_SIZE, MIN_SIZE};
pub use descriptor::FlexBuffer;
pub use flexer_alloc::{
    AllocError, Allocator, DefaultAllocator, PageAllocator, SystemAllocator, TrackingAllocator,
};
