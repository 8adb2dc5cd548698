//! Test utilities for ndmalloc development.
//!
//! Provides an independent row-major reference ([`row_major_offset`]), a
//! multi-index odometer ([`MultiIndex`]), value fills for checking that
//! data survives reshapes, and proptest strategies for shapes.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod strategies;

pub use fixtures::{row_major_offset, sequential, MultiIndex};
pub use strategies::{arb_extents, arb_reshape_pair};
