//! Registry keys and position hints.

use std::fmt;

/// A raw memory address used as a registry key.
///
/// Addresses are compared numerically. The registry never dereferences
/// them: an `Addr` is only ever a name for a handle or a data buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(pub usize);

impl Addr {
    /// The null address. Never a valid registry key.
    pub const NULL: Addr = Addr(0);

    /// Address of a raw pointer.
    pub fn of<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    /// Whether this is the null address.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The address `bytes` further on, or `None` on overflow.
    pub fn checked_add(self, bytes: usize) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<usize> for Addr {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

/// Opaque position hint returned by a registry insertion.
///
/// A clue names the slot a key occupied when it was issued. It stays
/// accurate until the next structural mutation of the registry; after
/// that it is merely a good place to start searching. A stale or
/// out-of-range clue never produces a wrong answer, only a slower one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Clue(usize);

impl Clue {
    /// Create a clue for the given slot index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// The slot index this clue points at.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Clue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
