//! ndmalloc: arbitrary-rank C-style multi-dimensional arrays.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the ndmalloc sub-crates. An array is one contiguous row-major data
//! buffer plus a scaffold of nested pointers, so its handle can be indexed
//! as `a[i][j]…` from C, and every handle is tracked in a registry that
//! answers shape and ownership queries.
//!
//! # Quick start
//!
//! ```rust
//! use ndmalloc::prelude::*;
//!
//! // A zero-filled 4×6 grid of f64.
//! let mut grid = NdArray::<f64>::zeros(&[4, 6]).unwrap();
//! grid[[2, 3]] = 1.5;
//!
//! // The registry knows it by handle.
//! let alloc = grid.allocator().clone();
//! assert_eq!(alloc.rank(grid.handle()), 2);
//! assert_eq!(alloc.extent(grid.handle(), 1), 6);
//!
//! // Resize and re-stride: the linear prefix is kept, the tail is zero.
//! grid.reshape(&[5, 5]).unwrap();
//! assert_eq!(grid[[2, 0]], 0.0);
//! assert_eq!(grid[[3, 0]], 1.5);
//!
//! // A view re-shapes existing memory without copying it.
//! let mut block = [[1.0f32; 5]; 3];
//! let view = NdView::new(block.as_flattened_mut(), &[5, 3]).unwrap();
//! assert_eq!(view[[4, 2]], 1.0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `ndmalloc-core` | Addresses, shapes, records, `NdError` |
//! | [`registry`] | `ndmalloc-registry` | Sorted pointer registry and its config |
//! | [`arena`] | `ndmalloc-arena` | Scaffold builder, allocator, typed arrays and views |
//!
//! The C ABI lives in the separate `ndmalloc-ffi` crate.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Addresses, shape tables, array records, and errors (`ndmalloc-core`).
pub use ndmalloc_core as types;

/// The sorted, mutex-guarded pointer registry (`ndmalloc-registry`).
///
/// [`registry::PointerRegistry`] maps handles to records;
/// [`registry::RegistryConfig`] sets its growth increment.
pub use ndmalloc_registry as registry;

/// Scaffold construction and the array lifecycle (`ndmalloc-arena`).
///
/// [`arena::Allocator`] is the untyped, C-shaped API;
/// [`arena::NdArray`] and [`arena::NdView`] are the typed ones.
pub use ndmalloc_arena as arena;

/// Common imports for typical ndmalloc usage.
///
/// ```rust
/// use ndmalloc::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use ndmalloc_core::{Addr, ArrayKind, ArrayRecord, NdError, ShapeTable};

    // Registry
    pub use ndmalloc_registry::{PointerRegistry, RegistryConfig};

    // Arrays
    pub use ndmalloc_arena::{Allocator, ArrayHandle, Element, NdArray, NdRef, NdView};
}
