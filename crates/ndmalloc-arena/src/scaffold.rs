//! Nested-pointer scaffold over a contiguous data buffer.
//!
//! For a rank-R array the scaffold is one block of pointer-width words
//! split into R-1 regions, outermost first:
//!
//! ```text
//! extents = [5, 4, 3]
//!
//! region 0 (5 words)   ──► region 1, word 4*j
//! region 1 (20 words)  ──► data + elem_size * 3 * j
//! data     (60 elems)
//! ```
//!
//! Region `i` has `∏_{k≤i} extents[k]` words. Word `j` of an inner region
//! points at word `j * extents[i+1]` of the next region; word `j` of the
//! last region points at element `j * extents[R-1]` of the data buffer.
//! The block address is the array handle, so a C caller can index it as
//! `T**…*` with R-1 dereferences followed by one subscript.
//!
//! Words hold plain addresses. The Rust side never dereferences them:
//! [`ScaffoldRef`] translates each word back to a slot index or element
//! offset and bounds-checks it against the block and the shape.

use std::mem;
use std::ptr::{self, NonNull};

use ndmalloc_core::{Addr, NdError, ShapeTable};

/// Size of one scaffold word in bytes.
pub const WORD: usize = mem::size_of::<usize>();

/// Number of words a scaffold block for `shape` occupies.
///
/// At least one, so the block has a unique address even when an extent
/// is zero.
pub fn block_len(shape: &ShapeTable) -> usize {
    shape.scaffold_words().max(1)
}

/// An owned scaffold block, released on drop.
#[derive(Debug)]
pub struct ScaffoldBlock {
    words: Box<[usize]>,
}

impl ScaffoldBlock {
    /// Build the scaffold for `shape` over the buffer at `data`.
    ///
    /// Returns `Ok(None)` for rank 1, where the data address is the handle.
    /// Fails with [`NdError::AllocationFailed`] if the block cannot be
    /// allocated and with [`NdError::InvalidOperation`] if the data range
    /// does not fit in the address space. Nothing is leaked on failure.
    pub fn build(
        data: Addr,
        element_size: usize,
        shape: &ShapeTable,
    ) -> Result<Option<Self>, NdError> {
        if shape.rank() < 2 {
            return Ok(None);
        }
        let len = block_len(shape);
        let mut words = Vec::new();
        words
            .try_reserve_exact(len)
            .map_err(|_| NdError::AllocationFailed {
                requested: len.saturating_mul(WORD),
            })?;
        words.resize(len, 0);
        let mut block = Self {
            words: words.into_boxed_slice(),
        };
        block.fill(data, element_size, shape)?;
        Ok(Some(block))
    }

    fn fill(&mut self, data: Addr, element_size: usize, shape: &ShapeTable) -> Result<(), NdError> {
        let extents = shape.extents();
        let last = extents.len() - 1;
        shape
            .byte_len(element_size)
            .ok_or_else(|| NdError::invalid(format!("byte length of shape {shape} overflows")))?;
        // Bounded by the byte length checked above.
        let row_bytes = element_size * extents[last];
        let base = self.addr().0;

        let mut start = 0usize;
        let mut count = extents[0];
        for level in 0..last {
            let next = start + count;
            if level + 1 < last {
                let stride = extents[level + 1];
                for j in 0..count {
                    self.words[start + j] = base + WORD * (next + j * stride);
                }
                start = next;
                count *= stride;
            } else {
                for j in 0..count {
                    let row = data.checked_add(j * row_bytes).ok_or_else(|| {
                        NdError::invalid(format!("data range at {data} wraps the address space"))
                    })?;
                    self.words[start + j] = row.0;
                }
            }
        }
        Ok(())
    }

    /// Address of the block: the array handle.
    pub fn addr(&self) -> Addr {
        Addr::of(self.words.as_ptr())
    }

    /// The raw scaffold words.
    pub fn words(&self) -> &[usize] {
        &self.words
    }

    /// A bounds-checked walker over this block.
    pub fn walker<'a>(
        &'a self,
        data: Addr,
        element_size: usize,
        shape: &'a ShapeTable,
    ) -> ScaffoldRef<'a> {
        ScaffoldRef::new(&self.words, shape.extents(), data, element_size)
    }

    /// Give up ownership without releasing the block.
    pub fn into_raw(self) -> NonNull<usize> {
        let words: &'static mut [usize] = Box::leak(self.words);
        NonNull::from(words).cast()
    }

    /// Reclaim a block released by [`into_raw`](Self::into_raw).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` on a block of exactly `len` words
    /// and must not be reclaimed more than once.
    #[allow(unsafe_code)]
    pub unsafe fn from_raw(ptr: NonNull<usize>, len: usize) -> Self {
        // SAFETY: per the caller contract this is the boxed slice leaked by
        // into_raw, with its original length.
        let words = unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)) };
        Self { words }
    }
}

/// Read-only, bounds-checked view of a scaffold block.
#[derive(Clone, Copy, Debug)]
pub struct ScaffoldRef<'a> {
    words: &'a [usize],
    extents: &'a [usize],
    base: usize,
    data: usize,
    element_size: usize,
}

impl<'a> ScaffoldRef<'a> {
    /// Walker over `words`, which must be the block whose first word is
    /// the array handle.
    pub fn new(words: &'a [usize], extents: &'a [usize], data: Addr, element_size: usize) -> Self {
        Self {
            words,
            extents,
            base: Addr::of(words.as_ptr()).0,
            data: data.0,
            element_size,
        }
    }

    /// Walker over a block owned by the registry.
    ///
    /// # Safety
    ///
    /// `base` must be the handle of a live rank > 1 array of shape `shape`,
    /// and the block must stay allocated for `'a`.
    #[allow(unsafe_code)]
    pub unsafe fn from_raw(
        base: NonNull<usize>,
        shape: &'a ShapeTable,
        data: Addr,
        element_size: usize,
    ) -> Self {
        // SAFETY: per the caller contract the block is live for 'a and
        // holds block_len(shape) initialized words that are never written
        // after construction.
        let words = unsafe { std::slice::from_raw_parts(base.as_ptr(), block_len(shape)) };
        Self::new(words, shape.extents(), data, element_size)
    }

    /// Number of dimensions, including the innermost.
    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    /// Extents of the array.
    pub fn extents(&self) -> &'a [usize] {
        self.extents
    }

    /// Slot in the block that word `slot` points at.
    ///
    /// `None` if `slot` is out of range or the word does not point into
    /// the block.
    pub fn child_slot(&self, slot: usize) -> Option<usize> {
        let delta = self.words.get(slot)?.checked_sub(self.base)?;
        if delta % WORD != 0 {
            return None;
        }
        let child = delta / WORD;
        // One past the end starts an empty region.
        (child <= self.words.len()).then_some(child)
    }

    /// Element offset of the row that word `slot` points at.
    pub fn row_offset(&self, slot: usize) -> Option<usize> {
        let delta = self.words.get(slot)?.checked_sub(self.data)?;
        if self.element_size == 0 || delta % self.element_size != 0 {
            return None;
        }
        Some(delta / self.element_size)
    }

    /// Linear element offset of a full multi-index, found by following the
    /// scaffold rather than by computing strides.
    ///
    /// `None` for a wrong-rank or out-of-bounds index.
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        let rank = self.rank();
        if rank < 2 || index.len() != rank {
            return None;
        }
        if index.iter().zip(self.extents).any(|(&i, &n)| i >= n) {
            return None;
        }
        let mut slot = index[0];
        for &i in &index[1..rank - 1] {
            slot = self.child_slot(slot)? + i;
        }
        Some(self.row_offset(slot)? + index[rank - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: Addr = Addr(0x10_0000);

    fn build(extents: &[usize], elem: usize) -> (ScaffoldBlock, ShapeTable) {
        let shape = ShapeTable::new(extents).unwrap();
        let block = ScaffoldBlock::build(DATA, elem, &shape).unwrap().unwrap();
        (block, shape)
    }

    #[test]
    fn rank_one_has_no_scaffold() {
        let shape = ShapeTable::new(&[10]).unwrap();
        assert!(ScaffoldBlock::build(DATA, 8, &shape).unwrap().is_none());
    }

    #[test]
    fn rank_two_rows_point_into_data() {
        let (block, _) = build(&[4, 6], 8);
        assert_eq!(block.words().len(), 4);
        for (i, &w) in block.words().iter().enumerate() {
            assert_eq!(w, DATA.0 + 8 * 6 * i);
        }
    }

    #[test]
    fn rank_three_regions_chain() {
        let (block, _) = build(&[5, 4, 3], 4);
        let base = block.addr().0;
        let words = block.words();
        assert_eq!(words.len(), 5 + 20);
        for j in 0..5 {
            assert_eq!(words[j], base + WORD * (5 + 4 * j));
        }
        for j in 0..20 {
            assert_eq!(words[5 + j], DATA.0 + 4 * 3 * j);
        }
    }

    #[test]
    fn zero_extent_block_still_has_an_address() {
        let (block, shape) = build(&[0, 5], 8);
        assert_eq!(shape.scaffold_words(), 0);
        assert_eq!(block.words().len(), 1);
        let (block, _) = build(&[3, 0, 2], 8);
        assert_eq!(block.words().len(), 3);
    }

    #[test]
    fn walker_resolves_row_major_offsets() {
        let (block, shape) = build(&[2, 3, 4], 8);
        let walk = block.walker(DATA, 8, &shape);
        assert_eq!(walk.offset(&[0, 0, 0]), Some(0));
        assert_eq!(walk.offset(&[1, 2, 3]), Some(23));
        assert_eq!(walk.offset(&[1, 0, 1]), Some(13));
    }

    #[test]
    fn walker_rejects_bad_indices() {
        let (block, shape) = build(&[2, 3], 8);
        let walk = block.walker(DATA, 8, &shape);
        assert_eq!(walk.offset(&[2, 0]), None);
        assert_eq!(walk.offset(&[0, 3]), None);
        assert_eq!(walk.offset(&[0]), None);
        assert_eq!(walk.offset(&[0, 0, 0]), None);
        assert_eq!(walk.child_slot(99), None);
    }

    #[test]
    #[allow(unsafe_code)]
    fn raw_round_trip_keeps_words() {
        let (block, shape) = build(&[3, 3], 2);
        let addr = block.addr();
        let raw = block.into_raw();
        assert_eq!(Addr::of(raw.as_ptr()), addr);
        // SAFETY: raw came from into_raw on a block of block_len(shape) words.
        let back = unsafe { ScaffoldBlock::from_raw(raw, block_len(&shape)) };
        assert_eq!(back.words()[2], DATA.0 + 2 * 3 * 2);
    }

    #[test]
    fn wrapping_data_range_rejected() {
        let shape = ShapeTable::new(&[4, 4]).unwrap();
        let result = ScaffoldBlock::build(Addr(usize::MAX - 8), 8, &shape);
        assert!(matches!(result, Err(NdError::InvalidOperation { .. })));
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use ndmalloc_test_utils::{arb_extents, MultiIndex};
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn walker_matches_row_major_formula(
                extents in arb_extents(2..=5, 1..=4),
                elem in prop::sample::select(vec![1usize, 2, 4, 8, 16]),
            ) {
                let shape = ShapeTable::new(&extents).unwrap();
                let block = ScaffoldBlock::build(DATA, elem, &shape).unwrap().unwrap();
                let walk = block.walker(DATA, elem, &shape);
                for index in MultiIndex::new(&extents) {
                    prop_assert_eq!(walk.offset(&index), shape.row_major_offset(&index));
                }
            }
        }
    }
}
