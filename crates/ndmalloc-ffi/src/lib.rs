//! C ABI for ndmalloc.
//!
//! Exposes the array lifecycle to C callers as the familiar
//! `sndmalloc`/`sndcalloc`/`sndrealloc`/`sndview`/`ndfree` family plus
//! shape queries. Every array lives in the process-wide registry
//! ([`Allocator::global`](ndmalloc_arena::Allocator::global)), so handles
//! made here are also visible to Rust code using the global allocator.
//!
//! Entry points return a pointer (NULL on failure) or a plain value (0 on
//! failure), as the C convention expects. The reason for the most recent
//! failure on the calling thread is available from [`ndlaststatus`].
//! Panics never cross the boundary; they are caught and reported as
//! [`NdStatus::Panicked`].
//!
//! Variadic forms (`ndmalloc(size, rank, n0, n1, ...)`) are not exported:
//! pass the extents as an array instead.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

/// Run an FFI body, converting a panic into `$fallback` and
/// [`NdStatus::Panicked`].
macro_rules! ffi_guard {
    ($fallback:expr, $body:block) => {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| $body)) {
            Ok(value) => value,
            Err(_) => {
                $crate::status::set_last($crate::status::NdStatus::Panicked);
                $fallback
            }
        }
    };
}

/// Unwrap an `Ok`, or record the error as the thread's last status and
/// return `$fallback`.
macro_rules! ffi_try {
    ($result:expr, $fallback:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => {
                $crate::status::fail(&e);
                return $fallback;
            }
        }
    };
}

pub mod array;
pub mod query;
pub mod status;

pub use status::NdStatus;

/// Status of the calling thread's most recent ndmalloc call.
///
/// Every entry point sets it, on success as well as failure.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn ndlaststatus() -> NdStatus {
    status::last()
}
