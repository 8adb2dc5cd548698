//! Scaffold builder, data buffers, and the array lifecycle for ndmalloc.
//!
//! An array of rank R is one contiguous element buffer plus, for R > 1, a
//! block of R-1 levels of pointer words over it. The block address is the
//! handle, so C code indexes it with plain `a[i][j][k]`. Everything the
//! allocator needs to know about a handle lives out of band in the
//! pointer registry.
//!
//! This crate is one of two that may contain `unsafe` code (along with
//! `ndmalloc-ffi`). It is confined to the modules that own raw memory
//! ([`buffer`], [`scaffold`], [`allocator`]) and to the typed wrappers
//! that expose it as slices.
//!
//! # Architecture
//!
//! ```text
//! Allocator ── Arc<PointerRegistry> (global or private)
//! ├── DataBuffer     (16-byte aligned elements, RAII until published)
//! ├── ScaffoldBlock  (R-1 levels of words, RAII until published)
//! └── ArrayHandle    (block address, or data address for rank 1)
//!
//! NdArray<T>   owns a handle, frees it on drop
//! NdView<'a,T> borrows memory, frees only its scaffold on drop
//! NdRef<'a,T>  bounds-checked walk through the levels
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod allocator;
pub mod array;
pub mod buffer;
pub mod element;
pub mod nd;
pub mod scaffold;
pub mod view;

pub use allocator::{Allocator, ArrayHandle};
pub use array::NdArray;
pub use buffer::{DataBuffer, DATA_ALIGN};
pub use element::Element;
pub use nd::NdRef;
pub use scaffold::{ScaffoldBlock, ScaffoldRef};
pub use view::NdView;
