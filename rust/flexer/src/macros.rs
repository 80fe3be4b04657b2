/// Checks a caller contract.
///
/// A violated contract is a bug in the caller and panics. Builds with the `trusted`
/// feature skip the check entirely; the operation then proceeds with unspecified
/// (but memory-safe) results.
macro_rules! flexer_assert {
    ($cond:expr, $($arg:tt)+) => {
        if cfg!(not(feature = "trusted")) {
            assert!($cond, $($arg)+);
        }
    };
}

pub(crate) use flexer_assert;

/// Declares a buffer backed by a stack array of at least `size` bytes.
///
/// The array length is made legal (even, at least [`MIN_SIZE`](crate::MIN_SIZE))
/// and the buffer adopts it, so it starts out local. `size` must be a constant
/// expression. An optional third argument names the allocator used once the buffer
/// outgrows the stack.
///
/// ```
/// flexer::local_use!(buf, 15);
/// assert!(buf.is_local());
/// assert_eq!(buf.capacity(), 16);
/// buf.push(b"hello").unwrap();
/// ```
#[macro_export]
macro_rules! local_use {
    ($name:ident, $size:expr) => {
        let mut storage = [0u8; $crate::capacity::local_storage_size($size)];
        #[allow(unused_mut)]
        let mut $name = $crate::FlexBuffer::adopt(&mut storage);
    };
    ($name:ident, $size:expr, $alloc:expr) => {
        let mut storage = [0u8; $crate::capacity::local_storage_size($size)];
        #[allow(unused_mut)]
        let mut $name = $crate::FlexBuffer::adopt_in(&mut storage, $alloc);
    };
}
