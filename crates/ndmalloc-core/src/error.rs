//! Error types for ndmalloc.
//!
//! A single taxonomy is shared by the registry, the allocator, and the C
//! boundary. Allocation-path failures are always unwound by the caller
//! before an error is returned; registry-path failures are plain status
//! values and never fatal.

use std::error::Error;
use std::fmt;

use crate::addr::Addr;

/// Errors from registry and allocator operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NdError {
    /// A data buffer, scaffold block, or registry growth could not be
    /// allocated.
    AllocationFailed {
        /// Number of bytes requested from the system allocator.
        requested: usize,
    },
    /// A registry insertion named a key that is already present.
    ///
    /// Not reachable through the public allocator API, but rejected
    /// rather than silently overwritten.
    Duplicate {
        /// The key that was already registered.
        addr: Addr,
    },
    /// A lookup or removal named a key that is not registered.
    NotFound {
        /// The unknown key.
        addr: Addr,
    },
    /// The operation is not permitted for this handle or shape
    /// (reshaping a view, freeing the 1-D slice of an array, a view
    /// larger than its source, a zero rank, an overflowing shape).
    InvalidOperation {
        /// Human-readable description of what was rejected.
        reason: String,
    },
}

impl NdError {
    /// Shorthand for an [`NdError::InvalidOperation`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for NdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed { requested } => {
                write!(f, "allocation of {requested} bytes failed")
            }
            Self::Duplicate { addr } => write!(f, "address {addr} is already registered"),
            Self::NotFound { addr } => write!(f, "address {addr} is not a known array"),
            Self::InvalidOperation { reason } => write!(f, "invalid operation: {reason}"),
        }
    }
}

impl Error for NdError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            NdError::AllocationFailed { requested: 64 }.to_string(),
            "allocation of 64 bytes failed"
        );
        assert_eq!(
            NdError::Duplicate { addr: Addr(16) }.to_string(),
            "address 0x10 is already registered"
        );
        assert_eq!(
            NdError::NotFound { addr: Addr(16) }.to_string(),
            "address 0x10 is not a known array"
        );
        assert_eq!(
            NdError::invalid("cannot reshape a view").to_string(),
            "invalid operation: cannot reshape a view"
        );
    }

    #[test]
    fn is_std_error() {
        fn assert_error<E: Error + Send + Sync + 'static>() {}
        assert_error::<NdError>();
    }
}
