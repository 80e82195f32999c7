//! Scoped, cache-line-aligned scratch allocation.
//!
//! Packed A, packed B and (optionally) local-C buffers all come from here.
//! Allocation uses `std::alloc` directly with an explicit [`Layout`],
//! the same primitive the corpus's own allocator code builds on (see
//! `examples/other_examples/...memalloc-rust__src-allocator.rs.rs`), rather
//! than pulling in a dedicated aligned-allocation crate for what is a
//! handful of lines.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::{GemmError, GemmResult};

/// Default alignment for packed scratch buffers: one AVX2/AVX-512 cache
/// line's worth of SIMD width (32 bytes = a 256-bit register).
pub const DEFAULT_ALIGNMENT: usize = 32;

/// An aligned, owned buffer of `f64` scratch storage. Released on drop,
/// including on every early-return/failure path, since `Drop` always
/// runs.
pub struct AlignedBuffer {
    ptr: NonNull<f64>,
    len: usize,
    layout: Layout,
}

// SAFETY: `AlignedBuffer` owns its allocation exclusively; sending it to
// another thread transfers that ownership, and the allocator itself is
// thread-safe.
unsafe impl Send for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocates scratch for `len` `f64` elements, aligned to `alignment`
    /// bytes (defaults to [`DEFAULT_ALIGNMENT`] via [`Self::new`]).
    /// Contents are zero-initialized so padding lanes packers don't
    /// explicitly touch (e.g. tail padding) read back as exact zero
    /// (Testable Property 4).
    pub fn with_alignment(len: usize, alignment: usize) -> GemmResult<Self> {
        let size_bytes = len * std::mem::size_of::<f64>();
        let layout = Layout::from_size_align(size_bytes.max(1), alignment).map_err(|_| {
            GemmError::Alloc {
                size: size_bytes,
                align: alignment,
            }
        })?;

        // SAFETY: `layout` has non-zero size (we `.max(1)`d it above).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut f64).ok_or(GemmError::Alloc {
            size: size_bytes,
            align: alignment,
        })?;

        Ok(AlignedBuffer { ptr, len, layout })
    }

    /// Allocates `len` `f64` elements at the default 32-byte alignment.
    pub fn new(len: usize) -> GemmResult<Self> {
        Self::with_alignment(len, DEFAULT_ALIGNMENT)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[f64] {
        // SAFETY: `ptr` is valid for `len` initialized `f64`s (zeroed at
        // allocation time) for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        // SAFETY: see `as_slice`; `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_ptr(&self) -> *const f64 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut f64 {
        self.ptr.as_ptr()
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: `self.ptr`/`self.layout` are exactly what we passed to
        // `alloc_zeroed`, and this runs at most once (owned by `self`).
        unsafe {
            alloc::dealloc(self.ptr.as_ptr() as *mut u8, self.layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_initialized_and_aligned() {
        let buf = AlignedBuffer::new(64).unwrap();
        assert!(buf.as_slice().iter().all(|&x| x == 0.0));
        assert_eq!((buf.as_ptr() as usize) % DEFAULT_ALIGNMENT, 0);
    }

    #[test]
    fn mutation_round_trips() {
        let mut buf = AlignedBuffer::new(8).unwrap();
        buf.as_mut_slice()[3] = 42.0;
        assert_eq!(buf.as_slice()[3], 42.0);
    }
}
