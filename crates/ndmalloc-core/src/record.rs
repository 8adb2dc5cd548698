//! Registry records: what the allocator knows about each handle.

use std::fmt;

use crate::addr::Addr;
use crate::shape::ShapeTable;

pub use crate::addr::Clue;

/// Ownership class of a registered address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    /// The array controls the lifetime of its data buffer; freeing it
    /// releases the bytes.
    Owned,
    /// The array indexes memory it does not own; freeing it releases only
    /// its scaffold. The contiguous 1-D slice of an owned array is also
    /// registered as a view.
    View,
}

impl fmt::Display for ArrayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned => write!(f, "owned"),
            Self::View => write!(f, "view"),
        }
    }
}

/// Metadata kept in the pointer registry for one known address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayRecord {
    /// Whether this address owns its data.
    pub kind: ArrayKind,
    /// Extents of the array. Never shared with another record.
    pub shape: ShapeTable,
    /// Size of one element in bytes.
    pub element_size: usize,
    /// Start of the contiguous element buffer.
    pub data: Addr,
    /// For views built over a known array: that array's data address.
    /// `None` for owned arrays and for views over caller memory.
    pub source: Option<Addr>,
    /// Set when a typed wrapper holds this address and its memory. Such
    /// records are released only by that wrapper.
    pub managed: bool,
}

impl ArrayRecord {
    /// Record for an owned array.
    pub fn owned(shape: ShapeTable, element_size: usize, data: Addr) -> Self {
        Self {
            kind: ArrayKind::Owned,
            shape,
            element_size,
            data,
            source: None,
            managed: false,
        }
    }

    /// Record for a view over `data`, optionally naming the known array
    /// whose buffer it borrows.
    pub fn view(shape: ShapeTable, element_size: usize, data: Addr, source: Option<Addr>) -> Self {
        Self {
            kind: ArrayKind::View,
            shape,
            element_size,
            data,
            source,
            managed: false,
        }
    }

    /// Record for the contiguous 1-D slice of an owned rank > 1 array.
    pub fn slice_of(owner: &ArrayRecord) -> Self {
        Self {
            managed: owner.managed,
            ..Self::view(
                ShapeTable::flat(owner.shape.element_count()),
                owner.element_size,
                owner.data,
                None,
            )
        }
    }

    /// The same record, marked as held by a typed wrapper.
    pub fn into_managed(self) -> Self {
        Self {
            managed: true,
            ..self
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Whether this record is a view.
    pub fn is_view(&self) -> bool {
        self.kind == ArrayKind::View
    }

    /// Size of the element buffer in bytes.
    pub fn byte_len(&self) -> usize {
        // Records are only built from shapes whose byte length was checked.
        self.shape.element_count().saturating_mul(self.element_size)
    }
}
