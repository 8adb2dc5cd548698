//! Out-of-band pointer registry for ndmalloc.
//!
//! Associates metadata with raw, otherwise untyped addresses without ever
//! reading memory near those addresses. The registry is the single source
//! of truth for whether an address is a known array.
//!
//! # Architecture
//!
//! ```text
//! PointerRegistry<V> (Mutex, process-wide or per-allocator)
//! └── RegistryTable<V>
//!     └── SmallVec<[Entry<V>; 512]>  sorted by Addr
//!         ├── inline while len <= 512 (no heap allocation)
//!         └── heap, grown and shrunk in RegistryConfig::increment steps
//! ```
//!
//! Lookups start at an optional [`Clue`](ndmalloc_core::Clue) and fall back
//! to binary search, so a stale clue costs time but never correctness.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod registry;
pub mod table;

pub use config::RegistryConfig;
pub use registry::PointerRegistry;
pub use table::{Entry, RegistryTable, INLINE_CAPACITY};
