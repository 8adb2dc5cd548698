//! Array lifecycle FFI: allocate, zero-allocate, reshape, view, free.
//!
//! Handles are the scaffold pointers themselves (the data pointer for
//! rank 1), so C code indexes the result directly: `a[i][j]`.

use std::ffi::{c_short, c_void};
use std::ptr;

use ndmalloc_arena::{Allocator, ArrayHandle};

use crate::status::{self, NdStatus};

/// Extents from a C `(rank, shape*)` pair.
///
/// Sets [`NdStatus::InvalidArgument`] and returns `None` for a negative
/// rank or a null `shape` with a positive rank. A zero rank yields no
/// extents, which the allocator rejects.
///
/// # Safety
///
/// If `rank > 0` and `shape` is non-null, `shape` must point at `rank`
/// readable `size_t` values that stay valid for `'a`.
#[allow(unsafe_code)]
pub(crate) unsafe fn extents<'a>(rank: c_short, shape: *const usize) -> Option<&'a [usize]> {
    let Ok(rank) = usize::try_from(rank) else {
        status::set_last(NdStatus::InvalidArgument);
        return None;
    };
    if rank == 0 {
        return Some(&[]);
    }
    if shape.is_null() {
        status::set_last(NdStatus::InvalidArgument);
        return None;
    }
    // SAFETY: per the caller contract `shape` holds `rank` values.
    Some(unsafe { std::slice::from_raw_parts(shape, rank) })
}

/// A handle from a caller pointer, setting [`NdStatus::InvalidArgument`]
/// for NULL.
pub(crate) fn handle(ptr: *const c_void) -> Option<ArrayHandle> {
    let handle = ArrayHandle::from_raw(ptr.cast_mut().cast());
    if handle.is_none() {
        status::set_last(NdStatus::InvalidArgument);
    }
    handle
}

#[allow(unsafe_code)]
fn allocate(size: usize, rank: c_short, shape: *const usize, zeroed: bool) -> *mut c_void {
    // SAFETY: caller must pass `rank` readable extents.
    let Some(extents) = (unsafe { extents(rank, shape) }) else {
        return ptr::null_mut();
    };
    let allocator = Allocator::global();
    let result = if zeroed {
        allocator.allocate_zeroed(size, extents)
    } else {
        allocator.allocate(size, extents)
    };
    status::ok(ffi_try!(result, ptr::null_mut()).cast())
}

/// Allocate a rank-`rank` array of `size`-byte elements with extents
/// `shape[0..rank]`.
///
/// The element contents are unspecified. Returns NULL on failure, with
/// the reason in [`ndlaststatus`](crate::ndlaststatus).
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn sndmalloc(size: usize, rank: c_short, shape: *const usize) -> *mut c_void {
    ffi_guard!(ptr::null_mut(), { allocate(size, rank, shape, false) })
}

/// Like [`sndmalloc`], with every element byte set to zero.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn sndcalloc(size: usize, rank: c_short, shape: *const usize) -> *mut c_void {
    ffi_guard!(ptr::null_mut(), { allocate(size, rank, shape, true) })
}

/// Resize and re-stride the array `ptr`.
///
/// Elements keep their row-major linear positions up to the smaller of
/// the old and new sizes; new elements are zero. On success the returned
/// pointer replaces `ptr`, which becomes invalid. On failure NULL is
/// returned and `ptr` is still valid and unchanged. Views and arrays held
/// by a Rust `NdArray` cannot be reshaped here.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn sndrealloc(
    ptr: *mut c_void,
    size: usize,
    rank: c_short,
    shape: *const usize,
) -> *mut c_void {
    ffi_guard!(ptr::null_mut(), {
        let Some(handle) = handle(ptr) else {
            return ptr::null_mut();
        };
        // SAFETY: caller must pass `rank` readable extents.
        let Some(extents) = (unsafe { extents(rank, shape) }) else {
            return ptr::null_mut();
        };
        let result = Allocator::global().reshape_zeroed(handle, size, extents);
        status::ok(ffi_try!(result, ptr::null_mut()).cast())
    })
}

/// Build a rank-`rank` (≥ 2) scaffold over `data` without copying it.
///
/// `data` may be caller memory or a known array, which is resolved to its
/// data buffer and must be large enough. The caller keeps `data` alive
/// while the view is in use; [`ndfree`] on the view releases only the
/// scaffold.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn sndview(
    data: *mut c_void,
    size: usize,
    rank: c_short,
    shape: *const usize,
) -> *mut c_void {
    ffi_guard!(ptr::null_mut(), {
        if data.is_null() {
            status::set_last(NdStatus::InvalidArgument);
            return ptr::null_mut();
        }
        // SAFETY: caller must pass `rank` readable extents.
        let Some(extents) = (unsafe { extents(rank, shape) }) else {
            return ptr::null_mut();
        };
        let result = Allocator::global().view(data.cast(), size, extents);
        status::ok(ffi_try!(result, ptr::null_mut()).cast())
    })
}

/// Release an array or view.
///
/// NULL and unknown pointers are ignored (the status says which). The
/// 1-D slice of an array is not freed on its own, and neither is an array
/// or view held by a Rust `NdArray` or `NdView`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn ndfree(ptr: *mut c_void) {
    ffi_guard!((), {
        let Some(handle) = handle(ptr) else {
            return;
        };
        ffi_try!(Allocator::global().free(handle), ());
        status::ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndlaststatus;

    #[test]
    fn negative_rank_is_an_invalid_argument() {
        let shape = [2usize, 2];
        assert!(sndmalloc(4, -1, shape.as_ptr()).is_null());
        assert_eq!(ndlaststatus(), NdStatus::InvalidArgument);
    }

    #[test]
    fn null_shape_is_an_invalid_argument() {
        assert!(sndcalloc(4, 2, ptr::null()).is_null());
        assert_eq!(ndlaststatus(), NdStatus::InvalidArgument);
    }

    #[test]
    fn zero_rank_is_an_invalid_operation() {
        assert!(sndmalloc(4, 0, ptr::null()).is_null());
        assert_eq!(ndlaststatus(), NdStatus::InvalidOperation);
    }

    #[test]
    fn zero_element_size_rejected() {
        let shape = [3usize];
        assert!(sndmalloc(0, 1, shape.as_ptr()).is_null());
        assert_eq!(ndlaststatus(), NdStatus::InvalidOperation);
    }

    #[test]
    fn free_of_null_and_unknown_is_ignored() {
        ndfree(ptr::null_mut());
        assert_eq!(ndlaststatus(), NdStatus::InvalidArgument);
        let mut local = 0u64;
        ndfree((&mut local as *mut u64).cast());
        assert_eq!(ndlaststatus(), NdStatus::NotFound);
    }

    #[test]
    fn allocate_then_free_sets_ok() {
        let shape = [3usize, 4];
        let a = sndcalloc(8, 2, shape.as_ptr());
        assert!(!a.is_null());
        assert_eq!(ndlaststatus(), NdStatus::Ok);
        ndfree(a);
        assert_eq!(ndlaststatus(), NdStatus::Ok);
    }
}
