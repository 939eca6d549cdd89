//! Pads and aligns a value to the length of a cache line.
//!
//! The head and tail cursors of a queue are written by different threads.
//! If both landed on the same cache line, every producer store would
//! invalidate the line the consumers are reading, and vice versa. Padding
//! each cursor to its own line keeps that traffic apart.
//!
//! The alignment is the platform's destructive interference size: modern
//! x86_64 and aarch64 parts prefetch cache lines in pairs, so 128 bytes
//! there, 64 bytes elsewhere.

use std::fmt;
use std::ops::Deref;

/// Pads and aligns a value to the length of a cache line.
#[cfg_attr(any(target_arch = "x86_64", target_arch = "aarch64"), repr(align(128)))]
#[cfg_attr(
    not(any(target_arch = "x86_64", target_arch = "aarch64")),
    repr(align(64))
)]
pub(crate) struct CachePad<T> {
    value: T,
}

impl<T> CachePad<T> {
    /// Wraps `value` in its own cache line.
    pub(crate) fn new(value: T) -> CachePad<T> {
        CachePad { value }
    }
}

impl<T> Deref for CachePad<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for CachePad<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CachePad").field(&self.value).finish()
    }
}
