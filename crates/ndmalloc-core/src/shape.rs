//! Per-array dimension tables.
//!
//! A [`ShapeTable`] is the extents of one array plus the derived counts the
//! allocator needs: the total number of elements and the number of
//! pointer-width words in the indexing scaffold. Both are computed once at
//! construction from the extents and the table is immutable afterwards, so
//! they cannot go stale. Deriving a new array from an old one always clones
//! the table.

use std::fmt;

use smallvec::SmallVec;

use crate::error::NdError;

/// Inline storage for extents. Ranks up to 4 need no heap allocation.
pub type Extents = SmallVec<[usize; 4]>;

/// Dimension extents of one array, with precomputed totals.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShapeTable {
    extents: Extents,
    element_count: usize,
    scaffold_words: usize,
}

impl ShapeTable {
    /// Build a shape table by copying the caller's extents.
    ///
    /// Fails with [`NdError::InvalidOperation`] for a zero rank or when the
    /// element count or scaffold size does not fit in a `usize`. Zero
    /// extents are allowed and yield an empty array.
    pub fn new(extents: &[usize]) -> Result<Self, NdError> {
        if extents.is_empty() {
            return Err(NdError::invalid("rank must be at least 1"));
        }
        let element_count = extents
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| {
                NdError::invalid(format!("element count of shape {extents:?} overflows usize"))
            })?;
        let scaffold_words = scaffold_words(extents).ok_or_else(|| {
            NdError::invalid(format!("scaffold size of shape {extents:?} overflows usize"))
        })?;
        Ok(Self {
            extents: Extents::from_slice(extents),
            element_count,
            scaffold_words,
        })
    }

    /// A rank-1 table of `len` elements.
    pub fn flat(len: usize) -> Self {
        Self {
            extents: smallvec::smallvec![len],
            element_count: len,
            scaffold_words: 0,
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    /// All extents, outermost first.
    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    /// Extent of dimension `dim`, or `None` past the rank.
    pub fn extent(&self, dim: usize) -> Option<usize> {
        self.extents.get(dim).copied()
    }

    /// Product of all extents.
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// Size of the element buffer in bytes, or `None` on overflow.
    pub fn byte_len(&self, element_size: usize) -> Option<usize> {
        self.element_count.checked_mul(element_size)
    }

    /// Number of pointer-width words in the indexing scaffold:
    /// `Σ_{i=0}^{rank-2} ∏_{k≤i} extents[k]`. Zero for rank 1.
    pub fn scaffold_words(&self) -> usize {
        self.scaffold_words
    }

    /// Length of one innermost row, `extents[rank - 1]`.
    pub fn row_len(&self) -> usize {
        self.extents[self.extents.len() - 1]
    }

    /// Row-major linear offset of a full multi-index.
    ///
    /// Returns `None` if the index has the wrong rank or any component is
    /// out of bounds.
    pub fn row_major_offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.rank() {
            return None;
        }
        let mut offset = 0usize;
        for (&i, &n) in index.iter().zip(self.extents.iter()) {
            if i >= n {
                return None;
            }
            offset = offset * n + i;
        }
        Some(offset)
    }
}

impl fmt::Display for ShapeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, n) in self.extents.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{n}")?;
        }
        write!(f, ")")
    }
}

fn scaffold_words(extents: &[usize]) -> Option<usize> {
    let levels = extents.len().saturating_sub(1);
    let mut words = 0usize;
    for &n in extents[..levels].iter().rev() {
        words = words.checked_add(1)?.checked_mul(n)?;
    }
    Some(words)
}
