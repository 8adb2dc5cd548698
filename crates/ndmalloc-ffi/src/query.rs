//! Shape and ownership queries.
//!
//! Unknown pointers answer 0 or NULL and leave [`NdStatus::NotFound`]
//! as the last status.

use std::ffi::{c_int, c_short, c_void};
use std::ptr;

use ndmalloc_arena::Allocator;
use ndmalloc_core::{ArrayRecord, NdError};

use crate::array::handle;
use crate::status::{self, NdStatus};

/// Look up the record behind `ptr` and apply `f`, recording the status.
fn with_record<R>(ptr: *const c_void, fallback: R, f: impl FnOnce(&ArrayRecord) -> R) -> R {
    let Some(handle) = handle(ptr) else {
        return fallback;
    };
    let record = ffi_try!(Allocator::global().record(handle), fallback);
    status::ok(f(&record))
}

/// 1 if `ptr` is a known array or view, 0 otherwise.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn ndisknown(ptr: *const c_void) -> c_int {
    ffi_guard!(0, { with_record(ptr, 0, |_| 1) })
}

/// 1 if `ptr` is a known view (including the 1-D slice of an array).
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn ndisview(ptr: *const c_void) -> c_int {
    ffi_guard!(0, { with_record(ptr, 0, |r| c_int::from(r.is_view())) })
}

/// Number of dimensions, or 0 if unknown.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn ndrank(ptr: *const c_void) -> c_short {
    ffi_guard!(0, {
        with_record(ptr, 0, |r| c_short::try_from(r.rank()).unwrap_or(c_short::MAX))
    })
}

/// Extent of dimension `dim`, or 0 if unknown or `dim` is out of range.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn ndsize(ptr: *const c_void, dim: c_short) -> usize {
    ffi_guard!(0, {
        let Ok(dim) = usize::try_from(dim) else {
            status::set_last(NdStatus::InvalidArgument);
            return 0;
        };
        with_record(ptr, 0, |r| r.shape.extent(dim).unwrap_or(0))
    })
}

/// Total number of elements, or 0 if unknown.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn ndfullsize(ptr: *const c_void) -> usize {
    ffi_guard!(0, { with_record(ptr, 0, |r| r.shape.element_count()) })
}

/// Start of the contiguous element buffer, or NULL if unknown.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn nddata(ptr: *mut c_void) -> *mut c_void {
    ffi_guard!(ptr::null_mut(), {
        let Some(h) = handle(ptr) else {
            return ptr::null_mut();
        };
        match Allocator::global().data_ptr(h) {
            Some(data) => status::ok(data.as_ptr().cast()),
            None => {
                status::fail(&NdError::NotFound { addr: h.addr() });
                ptr::null_mut()
            }
        }
    })
}

/// Read-only [`nddata`].
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn ndcdata(ptr: *const c_void) -> *const c_void {
    ffi_guard!(ptr::null(), { nddata(ptr.cast_mut()).cast_const() })
}

/// Copy the extents of `ptr` into `out[0..cap]`.
///
/// Returns the rank written, or 0 if `ptr` is unknown, `out` is NULL, or
/// `cap` is smaller than the rank (nothing is written then).
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn ndshape(ptr: *const c_void, out: *mut usize, cap: usize) -> c_short {
    ffi_guard!(0, {
        if out.is_null() {
            status::set_last(NdStatus::InvalidArgument);
            return 0;
        }
        let Some(extents) = with_record(ptr, None, |r| Some(r.shape.extents().to_vec())) else {
            return 0;
        };
        if extents.len() > cap {
            status::set_last(NdStatus::InvalidArgument);
            return 0;
        }
        // SAFETY: caller must pass `cap` writable size_t slots at `out`,
        // and extents.len() <= cap.
        unsafe { ptr::copy_nonoverlapping(extents.as_ptr(), out, extents.len()) };
        c_short::try_from(extents.len()).unwrap_or(c_short::MAX)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ndfree, sndmalloc};
    use crate::ndlaststatus;

    #[test]
    fn queries_on_unknown_pointer() {
        let local = 0u32;
        let p = (&local as *const u32).cast::<c_void>();
        assert_eq!(ndisknown(p), 0);
        assert_eq!(ndlaststatus(), NdStatus::NotFound);
        assert_eq!(ndisview(p), 0);
        assert_eq!(ndrank(p), 0);
        assert_eq!(ndsize(p, 0), 0);
        assert_eq!(ndfullsize(p), 0);
        assert!(ndcdata(p).is_null());
        let mut out = [0usize; 4];
        assert_eq!(ndshape(p, out.as_mut_ptr(), 4), 0);
    }

    #[test]
    fn queries_on_null_pointer() {
        assert_eq!(ndisknown(ptr::null()), 0);
        assert_eq!(ndlaststatus(), NdStatus::InvalidArgument);
        assert!(nddata(ptr::null_mut()).is_null());
    }

    #[test]
    fn shape_needs_room_for_every_extent() {
        let shape = [2usize, 3, 4];
        let a = sndmalloc(1, 3, shape.as_ptr());
        let mut out = [0usize; 3];
        assert_eq!(ndshape(a, out.as_mut_ptr(), 2), 0);
        assert_eq!(ndlaststatus(), NdStatus::InvalidArgument);
        assert_eq!(out, [0, 0, 0]);
        assert_eq!(ndshape(a, out.as_mut_ptr(), 3), 3);
        assert_eq!(out, shape);
        assert_eq!(ndsize(a, 2), 4);
        assert_eq!(ndsize(a, 3), 0);
        assert_eq!(ndsize(a, -1), 0);
        ndfree(a);
    }
}
