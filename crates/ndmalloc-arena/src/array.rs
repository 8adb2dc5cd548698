//! Owned, typed arrays.

#![allow(unsafe_code)]

use std::fmt;
use std::mem;
use std::ptr::NonNull;
use std::slice;

use ndmalloc_core::{NdError, ShapeTable};

use crate::allocator::{Allocator, ArrayHandle, Holder};
use crate::buffer::DATA_ALIGN;
use crate::element::Element;
use crate::nd::{self, NdRef};
use crate::view::NdView;

/// An owned rank-R array of `T`, registered with an [`Allocator`] and
/// released on drop.
///
/// The array is a registered handle like any other: [`handle`](Self::handle)
/// can be passed to C code that indexes `a[i][j]…`, and the allocator's
/// queries report its shape. Elements are always initialized.
///
/// ```
/// use ndmalloc_arena::NdArray;
///
/// let mut grid = NdArray::<f64>::zeros(&[4, 6]).unwrap();
/// grid[[2, 3]] = 1.5;
/// assert_eq!(grid.nd().sub(2).unwrap().row().unwrap()[3], 1.5);
/// assert_eq!(grid.as_slice()[2 * 6 + 3], 1.5);
/// ```
pub struct NdArray<T: Element> {
    allocator: Allocator,
    handle: ArrayHandle,
    shape: ShapeTable,
    data: NonNull<T>,
}

// SAFETY: NdArray uniquely owns its elements, like Vec<T>.
unsafe impl<T: Element> Send for NdArray<T> {}
// SAFETY: &NdArray only hands out &T.
unsafe impl<T: Element> Sync for NdArray<T> {}

impl<T: Element> NdArray<T> {
    /// A zero-filled array in the process-wide registry.
    pub fn zeros(extents: &[usize]) -> Result<Self, NdError> {
        Self::zeros_in(&Allocator::global(), extents)
    }

    /// A zero-filled array registered with `allocator`.
    pub fn zeros_in(allocator: &Allocator, extents: &[usize]) -> Result<Self, NdError> {
        check_alignment::<T>()?;
        let shape = ShapeTable::new(extents)?;
        let (handle, data) =
            allocator.allocate_with(mem::size_of::<T>(), extents, true, Holder::Wrapper)?;
        Ok(Self {
            allocator: allocator.clone(),
            handle,
            shape,
            data: data.cast(),
        })
    }

    /// An array with every element set to `value`.
    pub fn from_elem(extents: &[usize], value: T) -> Result<Self, NdError> {
        Self::from_elem_in(&Allocator::global(), extents, value)
    }

    /// [`from_elem`](Self::from_elem) registered with `allocator`.
    pub fn from_elem_in(
        allocator: &Allocator,
        extents: &[usize],
        value: T,
    ) -> Result<Self, NdError> {
        let mut array = Self::zeros_in(allocator, extents)?;
        array.as_mut_slice().fill(value);
        Ok(array)
    }

    /// An array whose element at each multi-index is `f(index)`, filled in
    /// row-major order.
    pub fn from_fn(extents: &[usize], f: impl FnMut(&[usize]) -> T) -> Result<Self, NdError> {
        Self::from_fn_in(&Allocator::global(), extents, f)
    }

    /// [`from_fn`](Self::from_fn) registered with `allocator`.
    pub fn from_fn_in(
        allocator: &Allocator,
        extents: &[usize],
        mut f: impl FnMut(&[usize]) -> T,
    ) -> Result<Self, NdError> {
        let mut array = Self::zeros_in(allocator, extents)?;
        let extents = array.shape.extents().to_vec();
        let mut index = vec![0usize; extents.len()];
        for slot in array.as_mut_slice() {
            *slot = f(&index);
            advance(&mut index, &extents);
        }
        Ok(array)
    }

    /// The registered handle.
    ///
    /// The handle stays managed by this array: [`Allocator::free`] and
    /// [`Allocator::reshape`] refuse it. Queries and views accept it.
    pub fn handle(&self) -> ArrayHandle {
        self.handle
    }

    /// The allocator this array is registered with.
    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// Shape of the array.
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

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape.element_count()
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start of the element buffer.
    pub fn as_ptr(&self) -> *const T {
        self.data.as_ptr()
    }

    /// Mutable start of the element buffer.
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.data.as_ptr()
    }

    /// All elements in row-major order.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the buffer holds len() initialized elements, is aligned
        // for T, and is owned by self.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len()) }
    }

    /// All elements in row-major order, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in as_slice; &mut self guarantees exclusivity.
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

    /// Resize and re-stride in place.
    ///
    /// Elements keep their linear positions up to the smaller length; new
    /// elements are zero. On failure the array is unchanged.
    pub fn reshape(&mut self, extents: &[usize]) -> Result<(), NdError> {
        let shape = ShapeTable::new(extents)?;
        let (handle, data) = self.allocator.reshape_with(
            self.handle,
            mem::size_of::<T>(),
            extents,
            true,
            Holder::Wrapper,
        )?;
        self.handle = handle;
        self.shape = shape;
        self.data = data.cast();
        Ok(())
    }

    /// A view of this array's elements with a different shape.
    ///
    /// The view needs no more elements than the array holds and borrows
    /// the array for its lifetime.
    pub fn view_mut(&mut self, extents: &[usize]) -> Result<NdView<'_, T>, NdError> {
        let allocator = self.allocator.clone();
        NdView::new_in(&allocator, self.as_mut_slice(), extents)
    }
}

nd::impl_nd_index!(NdArray);

impl<T: Element> Drop for NdArray<T> {
    fn drop(&mut self) {
        if let Err(e) = self.allocator.free_with(self.handle, Holder::Wrapper) {
            tracing::warn!(error = %e, handle = %self.handle.addr(), "failed to free array");
        }
    }
}

impl<T: Element + fmt::Debug> fmt::Debug for NdArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdArray")
            .field("shape", &self.shape.extents())
            .field("handle", &self.handle.addr())
            .field("data", &self.as_slice())
            .finish()
    }
}

pub(crate) fn check_alignment<T>() -> Result<(), NdError> {
    if mem::align_of::<T>() > DATA_ALIGN {
        return Err(NdError::invalid(format!(
            "element alignment {} exceeds the buffer alignment {DATA_ALIGN}",
            mem::align_of::<T>()
        )));
    }
    Ok(())
}

/// Step a row-major odometer; wraps to all zeros after the last index.
fn advance(index: &mut [usize], extents: &[usize]) {
    for axis in (0..index.len()).rev() {
        index[axis] += 1;
        if index[axis] < extents[axis] {
            return;
        }
        index[axis] = 0;
    }
}
