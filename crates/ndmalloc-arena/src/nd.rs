//! Bounds-checked, level-by-level indexing.

use std::fmt;
use std::mem;

use ndmalloc_core::{Addr, ShapeTable};

use crate::allocator::ArrayHandle;
use crate::scaffold::ScaffoldRef;

/// One level of an array: the whole array, a sub-array, or a single row.
///
/// `sub(i)` steps one dimension down by following the scaffold, exactly
/// as `a[i]` does on the C side, but every step is checked against the
/// extents. A rank-1 level is a row and yields a plain slice.
pub struct NdRef<'a, T> {
    scaffold: Option<ScaffoldRef<'a>>,
    extents: &'a [usize],
    data: &'a [T],
    level: usize,
    // Scaffold slot of this level's first entry, or, for a row, the
    // element offset of its first element.
    pos: usize,
}

impl<T> Clone for NdRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NdRef<'_, T> {}

impl<'a, T> NdRef<'a, T> {
    pub(crate) fn root(
        scaffold: Option<ScaffoldRef<'a>>,
        extents: &'a [usize],
        data: &'a [T],
    ) -> Self {
        Self {
            scaffold,
            extents,
            data,
            level: 0,
            pos: 0,
        }
    }

    /// Dimensions remaining at this level.
    pub fn rank(&self) -> usize {
        self.extents.len() - self.level
    }

    /// Extent of this level's outermost dimension.
    pub fn extent(&self) -> usize {
        self.extents[self.level]
    }

    /// Extents remaining at this level, outermost first.
    pub fn extents(&self) -> &'a [usize] {
        &self.extents[self.level..]
    }

    /// The `i`-th sub-array, one rank lower. `None` past the extent or on
    /// a row.
    pub fn sub(&self, i: usize) -> Option<NdRef<'a, T>> {
        if self.rank() < 2 || i >= self.extent() {
            return None;
        }
        let scaffold = self.scaffold?;
        let slot = self.pos + i;
        let pos = if self.rank() > 2 {
            scaffold.child_slot(slot)?
        } else {
            scaffold.row_offset(slot)?
        };
        Some(Self {
            level: self.level + 1,
            pos,
            ..*self
        })
    }

    /// The elements of a rank-1 level. `None` above rank 1.
    pub fn row(&self) -> Option<&'a [T]> {
        if self.rank() != 1 {
            return None;
        }
        self.data.get(self.pos..self.pos + self.extent())
    }

    /// Linear offset in the data buffer of `index`, relative to this level.
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.rank() {
            return None;
        }
        let (&last, outer) = index.split_last()?;
        let mut level = *self;
        for &i in outer {
            level = level.sub(i)?;
        }
        (last < level.extent()).then_some(level.pos + last)
    }

    /// The element at `index`, relative to this level.
    pub fn get(&self, index: &[usize]) -> Option<&'a T> {
        self.data.get(self.offset(index)?)
    }
}

impl<T> fmt::Debug for NdRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdRef")
            .field("extents", &self.extents())
            .field("pos", &self.pos)
            .finish()
    }
}

/// Root level of a registered array.
///
/// # Safety
///
/// `handle` must be a live registered array of shape `shape` whose data
/// buffer starts at `data`, and it must stay registered for `'a`.
#[allow(unsafe_code)]
pub(crate) unsafe fn root<'a, T>(
    handle: ArrayHandle,
    shape: &'a ShapeTable,
    data: &'a [T],
) -> NdRef<'a, T> {
    let scaffold = (shape.rank() > 1).then(|| {
        // SAFETY: forwarded from this function's contract.
        unsafe {
            ScaffoldRef::from_raw(
                handle.non_null().cast(),
                shape,
                Addr::of(data.as_ptr()),
                mem::size_of::<T>(),
            )
        }
    });
    NdRef::root(scaffold, shape.extents(), data)
}

/// Panic message for a failed `Index` lookup.
pub(crate) fn out_of_bounds(index: &[usize], shape: &ShapeTable) -> ! {
    panic!("index {index:?} out of bounds for shape {shape}")
}

macro_rules! impl_nd_index {
    ($ty:ident $(<$lt:lifetime>)?) => {
        impl<$($lt,)? T: $crate::Element> std::ops::Index<&[usize]> for $ty<$($lt,)? T> {
            type Output = T;

            fn index(&self, index: &[usize]) -> &T {
                match self.get(index) {
                    Some(v) => v,
                    None => $crate::nd::out_of_bounds(index, self.shape()),
                }
            }
        }

        impl<$($lt,)? T: $crate::Element> std::ops::IndexMut<&[usize]> for $ty<$($lt,)? T> {
            fn index_mut(&mut self, index: &[usize]) -> &mut T {
                match self.offset(index) {
                    Some(off) => &mut self.as_mut_slice()[off],
                    None => $crate::nd::out_of_bounds(index, self.shape()),
                }
            }
        }

        impl<$($lt,)? T: $crate::Element, const N: usize> std::ops::Index<[usize; N]>
            for $ty<$($lt,)? T>
        {
            type Output = T;

            fn index(&self, index: [usize; N]) -> &T {
                &self[&index[..]]
            }
        }

        impl<$($lt,)? T: $crate::Element, const N: usize> std::ops::IndexMut<[usize; N]>
            for $ty<$($lt,)? T>
        {
            fn index_mut(&mut self, index: [usize; N]) -> &mut T {
                &mut self[&index[..]]
            }
        }
    };
}

pub(crate) use impl_nd_index;
