//! Contiguous element buffers.
//!
//! A [`DataBuffer`] is one heap allocation holding every element of an
//! array in row-major order. It is aligned to [`DATA_ALIGN`] and never
//! smaller than `DATA_ALIGN` bytes, so even an empty array has a unique,
//! registrable address.
//!
//! This module carries the crate's raw allocation calls; every `unsafe`
//! block has a `// SAFETY:` comment.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::{self, NonNull};

use ndmalloc_core::{Addr, NdError};

/// Alignment of every data buffer, in bytes. A multiple of the pointer
/// width and at least the alignment of every [`Element`](crate::Element).
pub const DATA_ALIGN: usize = 16;

/// An owned, aligned byte buffer released on drop.
///
/// Contents are uninitialized unless the buffer came from
/// [`allocate_zeroed`](Self::allocate_zeroed) or was written through its
/// pointer; the buffer itself never reads them.
#[derive(Debug)]
pub struct DataBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: DataBuffer uniquely owns its allocation, like Box<[u8]>.
unsafe impl Send for DataBuffer {}
// SAFETY: &DataBuffer only exposes the address and length.
unsafe impl Sync for DataBuffer {}

impl DataBuffer {
    /// Allocate `bytes` of uninitialized memory.
    pub fn allocate(bytes: usize) -> Result<Self, NdError> {
        Self::alloc_with(bytes, false)
    }

    /// Allocate `bytes` of zero-filled memory.
    pub fn allocate_zeroed(bytes: usize) -> Result<Self, NdError> {
        Self::alloc_with(bytes, true)
    }

    fn alloc_with(bytes: usize, zeroed: bool) -> Result<Self, NdError> {
        let layout = layout_for(bytes)?;
        // SAFETY: layout_for never returns a zero-sized layout.
        let raw = unsafe {
            if zeroed {
                alloc::alloc_zeroed(layout)
            } else {
                alloc::alloc(layout)
            }
        };
        let ptr = NonNull::new(raw).ok_or(NdError::AllocationFailed {
            requested: layout.size(),
        })?;
        Ok(Self { ptr, len: bytes })
    }

    /// A fresh buffer of `new_bytes` holding this buffer's first
    /// `min(len, new_bytes)` bytes.
    ///
    /// `self` is left untouched, so a failure here loses nothing. With
    /// `zero_tail` the bytes past the copied prefix are zero; otherwise
    /// they are uninitialized.
    pub fn recreate(&self, new_bytes: usize, zero_tail: bool) -> Result<Self, NdError> {
        let fresh = Self::alloc_with(new_bytes, zero_tail)?;
        let keep = self.len.min(new_bytes);
        // SAFETY: both allocations are live, distinct, and at least `keep`
        // bytes long. The copy is untyped, so uninitialized source bytes
        // are carried over as-is.
        unsafe { ptr::copy_nonoverlapping(self.ptr.as_ptr(), fresh.ptr.as_ptr(), keep) };
        Ok(fresh)
    }

    /// Usable length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the usable length is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start of the buffer.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Start of the buffer as a registry key.
    pub fn addr(&self) -> Addr {
        Addr::of(self.ptr.as_ptr())
    }

    /// Give up ownership without releasing the memory.
    ///
    /// Reclaim it with [`from_raw`](Self::from_raw) and the same length.
    pub fn into_raw(self) -> NonNull<u8> {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }

    /// Reclaim a buffer released by [`into_raw`](Self::into_raw).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` on a buffer of exactly `len` bytes,
    /// and must not be reclaimed more than once.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }
}

impl Drop for DataBuffer {
    fn drop(&mut self) {
        // The layout was valid when the buffer was allocated.
        if let Ok(layout) = layout_for(self.len) {
            // SAFETY: ptr was allocated by the global allocator with this
            // exact layout and is released only here.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

fn layout_for(bytes: usize) -> Result<Layout, NdError> {
    Layout::from_size_align(bytes.max(DATA_ALIGN), DATA_ALIGN)
        .map_err(|_| NdError::AllocationFailed { requested: bytes })
}
