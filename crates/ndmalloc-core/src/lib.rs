//! Core types for the ndmalloc workspace.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! metadata that the pointer registry stores for every known array: the
//! [`ShapeTable`], the [`ArrayRecord`] with its [`ArrayKind`], the
//! address and clue types used as registry keys and hints, and the
//! [`NdError`] taxonomy shared by every layer above.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod addr;
pub mod error;
pub mod record;
pub mod shape;

pub use addr::{Addr, Clue};
pub use error::NdError;
pub use record::{ArrayKind, ArrayRecord};
pub use shape::{Extents, ShapeTable};
