//! Non-owning typed views.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use std::slice;

use ndmalloc_core::{NdError, ShapeTable};

use crate::allocator::{Allocator, ArrayHandle, Holder};
use crate::array::check_alignment;
use crate::element::Element;
use crate::nd::{self, NdRef};

/// A registered rank > 1 scaffold over memory borrowed for `'a`.
///
/// Dropping the view releases only its scaffold. The borrowed memory can
/// be a caller buffer (a stack array, a `Vec`) or an [`NdArray`](crate::NdArray)
/// through [`view_mut`](crate::NdArray::view_mut); either way the borrow
/// checker keeps the memory alive for as long as the view exists.
///
/// ```
/// use ndmalloc_arena::NdView;
///
/// let mut block = [[0.0f32; 5]; 3];
/// let mut view = NdView::new(block.as_flattened_mut(), &[3, 5]).unwrap();
/// view[[1, 4]] = 2.0;
/// drop(view);
/// assert_eq!(block[1][4], 2.0);
/// ```
pub struct NdView<'a, T: Element> {
    allocator: Allocator,
    handle: ArrayHandle,
    shape: ShapeTable,
    data: NonNull<T>,
    _borrow: PhantomData<&'a mut [T]>,
}

// SAFETY: NdView behaves like the &'a mut [T] it was built from.
unsafe impl<T: Element> Send for NdView<'_, T> {}
// SAFETY: as above.
unsafe impl<T: Element> Sync for NdView<'_, T> {}

impl<'a, T: Element> NdView<'a, T> {
    /// A view over `data` registered in the process-wide registry.
    pub fn new(data: &'a mut [T], extents: &[usize]) -> Result<Self, NdError> {
        Self::new_in(&Allocator::global(), data, extents)
    }

    /// A view over `data` registered with `allocator`.
    ///
    /// Fails with [`NdError::InvalidOperation`] for rank ≤ 1 or if the
    /// shape needs more elements than `data` holds.
    pub fn new_in(
        allocator: &Allocator,
        data: &'a mut [T],
        extents: &[usize],
    ) -> Result<Self, NdError> {
        check_alignment::<T>()?;
        let shape = ShapeTable::new(extents)?;
        if shape.element_count() > data.len() {
            return Err(NdError::invalid(format!(
                "view of shape {shape} needs {} elements but the slice holds {}",
                shape.element_count(),
                data.len()
            )));
        }
        let ptr = NonNull::from(data).cast::<T>();
        let handle = allocator.view_with(
            ptr.as_ptr().cast(),
            mem::size_of::<T>(),
            extents,
            Holder::Wrapper,
        )?;
        Ok(Self {
            allocator: allocator.clone(),
            handle,
            shape,
            data: ptr,
            _borrow: PhantomData,
        })
    }

    /// The registered handle.
    pub fn handle(&self) -> ArrayHandle {
        self.handle
    }

    /// Shape of the view.
    pub fn shape(&self) -> &ShapeTable {
        &self.shape
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Extents, outermost first.
    pub fn extents(&self) -> &[usize] {
        self.shape.extents()
    }

    /// Number of elements the view covers.
    pub fn len(&self) -> usize {
        self.shape.element_count()
    }

    /// Whether the view covers no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The covered elements in row-major order.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: construction checked that the borrowed slice holds at
        // least len() elements; the borrow lasts for 'a.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len()) }
    }

    /// The covered elements in row-major order, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in as_slice; the view was built from a &'a mut borrow.
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len()) }
    }

    /// The root level for scaffold-walking access.
    pub fn nd(&self) -> NdRef<'_, T> {
        // SAFETY: self keeps the handle registered until drop, and the
        // shape and data match the registration.
        unsafe { nd::root(self.handle, &self.shape, self.as_slice()) }
    }

    /// Linear offset of `index`, found through the scaffold.
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        self.nd().offset(index)
    }

    /// The element at `index`, or `None` if out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<&T> {
        self.nd().get(index)
    }

    /// The element at `index`, mutably.
    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut T> {
        let offset = self.offset(index)?;
        self.as_mut_slice().get_mut(offset)
    }
}

nd::impl_nd_index!(NdView<'a>);

impl<T: Element> Drop for NdView<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.allocator.free_with(self.handle, Holder::Wrapper) {
            tracing::warn!(error = %e, handle = %self.handle.addr(), "failed to free view");
        }
    }
}

impl<T: Element + fmt::Debug> fmt::Debug for NdView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdView")
            .field("shape", &self.shape.extents())
            .field("handle", &self.handle.addr())
            .field("data", &self.as_slice())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NdArray;

    #[test]
    fn view_over_vec_aliases_it() {
        let a = Allocator::new();
        let mut backing: Vec<u32> = (0..12).collect();
        {
            let mut v = NdView::new_in(&a, &mut backing, &[3, 4]).unwrap();
            assert!(a.is_view(v.handle()));
            assert_eq!(v[[2, 3]], 11);
            v[[0, 0]] = 100;
        }
        assert_eq!(backing[0], 100);
        assert!(a.registry().is_empty());
    }

    #[test]
    fn view_larger_than_slice_rejected() {
        let a = Allocator::new();
        let mut backing = [0u8; 5];
        let err = NdView::new_in(&a, &mut backing, &[2, 3]).unwrap_err();
        assert!(matches!(err, NdError::InvalidOperation { .. }));
        assert!(a.registry().is_empty());
    }

    #[test]
    fn rank_one_view_rejected() {
        let mut backing = [0i32; 4];
        assert!(NdView::new(&mut backing, &[4]).is_err());
    }

    #[test]
    fn view_of_array_tracks_its_source() {
        let a = Allocator::new();
        let mut arr = NdArray::<f64>::zeros_in(&a, &[2, 6]).unwrap();
        {
            let mut v = arr.view_mut(&[3, 4]).unwrap();
            assert!(a.check_view(v.handle()).is_ok());
            assert!(a.record(v.handle()).unwrap().source.is_some());
            v[[2, 3]] = 8.0;
        }
        assert_eq!(arr[[1, 5]], 8.0);
        assert_eq!(a.registry().len(), 2);
    }

    #[test]
    fn handle_cannot_be_freed_behind_the_view() {
        let a = Allocator::new();
        let mut backing = [3i32; 6];
        let v = NdView::new_in(&a, &mut backing, &[2, 3]).unwrap();
        assert!(matches!(a.free(v.handle()), Err(NdError::InvalidOperation { .. })));
        assert!(a.is_known(v.handle()));
        assert_eq!(v[[1, 2]], 3);
        drop(v);
        assert!(a.registry().is_empty());
    }

    #[test]
    fn view_may_cover_a_prefix() {
        let mut backing = [1u16; 10];
        let v = NdView::new(&mut backing, &[2, 2]).unwrap();
        assert_eq!(v.len(), 4);
        assert_eq!(v.as_slice(), &[1, 1, 1, 1]);
    }
}
