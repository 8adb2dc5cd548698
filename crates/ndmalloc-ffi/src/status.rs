//! C-compatible status codes and the per-thread last status.
//!
//! [`NdStatus`] is a `repr(i32)` enum with one value per [`NdError`]
//! variant plus the boundary-only conditions.

use std::cell::Cell;

use ndmalloc_core::NdError;

/// Outcome of the calling thread's last ndmalloc call.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NdStatus {
    /// Success.
    Ok = 0,
    /// A data buffer, scaffold block, or registry growth could not be
    /// allocated.
    AllocationFailed = -1,
    /// The address was already registered.
    Duplicate = -2,
    /// The pointer is not a known array.
    NotFound = -3,
    /// The operation is not permitted for this array or shape.
    InvalidOperation = -4,
    /// A pointer argument is null or a rank or dimension is negative.
    InvalidArgument = -5,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl From<&NdError> for NdStatus {
    fn from(e: &NdError) -> Self {
        match e {
            NdError::AllocationFailed { .. } => NdStatus::AllocationFailed,
            NdError::Duplicate { .. } => NdStatus::Duplicate,
            NdError::NotFound { .. } => NdStatus::NotFound,
            NdError::InvalidOperation { .. } => NdStatus::InvalidOperation,
        }
    }
}

thread_local! {
    static LAST: Cell<NdStatus> = const { Cell::new(NdStatus::Ok) };
}

pub(crate) fn set_last(status: NdStatus) {
    LAST.with(|s| s.set(status));
}

pub(crate) fn last() -> NdStatus {
    LAST.with(Cell::get)
}

/// Record a failed call.
pub(crate) fn fail(e: &NdError) {
    tracing::debug!(error = %e, "ffi call failed");
    set_last(NdStatus::from(e));
}

/// Record a successful call and pass its value through.
pub(crate) fn ok<T>(value: T) -> T {
    set_last(NdStatus::Ok);
    value
}
