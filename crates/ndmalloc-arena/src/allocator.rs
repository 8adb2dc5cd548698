//! Array lifecycle: allocate, reshape, view, free, and queries.
//!
//! An [`Allocator`] pairs the scaffold builder and data buffers with a
//! [`PointerRegistry`]. Memory is built completely before it is published:
//! the registry only ever holds records for fully constructed arrays, and
//! every multi-record change (an owned array plus its 1-D slice, or a
//! reshape swapping old records for new ones) is made under one lock
//! acquisition after reserving the table capacity it needs.
//!
//! Once registered, the scaffold block and data buffer are owned by the
//! registry record and reclaimed by [`Allocator::free`]. Records made for
//! [`NdArray`](crate::NdArray) and [`NdView`](crate::NdView) are marked
//! managed: the public `free` and `reshape` refuse them, and only the
//! wrapper holding the handle releases or reshapes them.

#![allow(unsafe_code)]

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use ndmalloc_core::{Addr, ArrayKind, ArrayRecord, Clue, NdError, ShapeTable};
use ndmalloc_registry::{PointerRegistry, RegistryConfig, RegistryTable};

use crate::buffer::DataBuffer;
use crate::scaffold::{block_len, ScaffoldBlock};

/// Opaque handle to a registered array.
///
/// For rank 1 this is the data address; for rank > 1 it is the scaffold
/// block address, which a C caller subscripts directly. The handle carries
/// the registry clue from its registration to speed up later lookups.
/// Equality and hashing consider only the address.
#[derive(Clone, Copy)]
pub struct ArrayHandle {
    ptr: NonNull<u8>,
    clue: Option<Clue>,
}

// SAFETY: a handle is an address token. Every access through it goes
// through the registry, which is synchronized.
unsafe impl Send for ArrayHandle {}
// SAFETY: as above; &ArrayHandle exposes only the address.
unsafe impl Sync for ArrayHandle {}

impl ArrayHandle {
    /// Wrap a raw pointer with no clue. `None` for null.
    ///
    /// Any pointer may be wrapped; queries on an unknown address report
    /// "not known" rather than reading memory.
    pub fn from_raw(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, clue: None })
    }

    fn new(ptr: NonNull<u8>, clue: Clue) -> Self {
        Self {
            ptr,
            clue: Some(clue),
        }
    }

    pub(crate) fn non_null(self) -> NonNull<u8> {
        self.ptr
    }

    /// The handle as a raw pointer.
    pub fn as_ptr(self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// The handle cast to a typed pointer (`*mut *mut T` style for C).
    pub fn cast<T>(self) -> *mut T {
        self.ptr.as_ptr().cast()
    }

    /// The handle as a registry key.
    pub fn addr(self) -> Addr {
        Addr::of(self.ptr.as_ptr())
    }

    /// Position hint from registration, if any.
    pub fn clue(self) -> Option<Clue> {
        self.clue
    }
}

impl PartialEq for ArrayHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for ArrayHandle {}

impl Hash for ArrayHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
    }
}

impl fmt::Debug for ArrayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayHandle")
            .field("addr", &self.addr())
            .field("clue", &self.clue)
            .finish()
    }
}

/// Who is asking to change a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Holder {
    /// A caller of the public, handle-based API.
    Caller,
    /// The typed wrapper that holds the handle.
    Wrapper,
}

impl Holder {
    fn mark(self, record: ArrayRecord) -> ArrayRecord {
        match self {
            Holder::Caller => record,
            Holder::Wrapper => record.into_managed(),
        }
    }

    fn admit(self, key: Addr, record: &ArrayRecord) -> Result<(), NdError> {
        if record.managed && self == Holder::Caller {
            return Err(NdError::invalid(format!(
                "{key} is held by an NdArray or NdView; drop the wrapper instead"
            )));
        }
        Ok(())
    }
}

/// Allocates, reshapes, views, and frees registered arrays.
///
/// Cheap to clone; clones share one registry.
#[derive(Clone, Debug)]
pub struct Allocator {
    registry: Arc<PointerRegistry>,
}

impl Allocator {
    /// Allocator backed by the process-wide registry.
    ///
    /// Arrays made through any global allocator, including the C ABI, are
    /// visible to all of them.
    pub fn global() -> Self {
        Self {
            registry: Arc::clone(PointerRegistry::global()),
        }
    }

    /// Allocator with a private, default-configured registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(PointerRegistry::new()))
    }

    /// Allocator over an existing registry.
    pub fn with_registry(registry: Arc<PointerRegistry>) -> Self {
        Self { registry }
    }

    /// Allocator with a private registry using `config`.
    pub fn with_config(config: RegistryConfig) -> Result<Self, NdError> {
        Ok(Self::with_registry(Arc::new(PointerRegistry::with_config(
            config,
        )?)))
    }

    /// The registry this allocator publishes to.
    pub fn registry(&self) -> &Arc<PointerRegistry> {
        &self.registry
    }

    // ── Allocation ──────────────────────────────────────────────

    /// Allocate an owned array with uninitialized elements.
    ///
    /// `extents` is copied. On any failure every partial allocation is
    /// released and nothing is registered.
    pub fn allocate(
        &self,
        element_size: usize,
        extents: &[usize],
    ) -> Result<ArrayHandle, NdError> {
        self.allocate_with(element_size, extents, false, Holder::Caller)
            .map(|(handle, _)| handle)
    }

    /// Allocate an owned array with zero-filled elements.
    pub fn allocate_zeroed(
        &self,
        element_size: usize,
        extents: &[usize],
    ) -> Result<ArrayHandle, NdError> {
        self.allocate_with(element_size, extents, true, Holder::Caller)
            .map(|(handle, _)| handle)
    }

    /// Allocate and return the handle together with the data pointer.
    pub(crate) fn allocate_with(
        &self,
        element_size: usize,
        extents: &[usize],
        zeroed: bool,
        holder: Holder,
    ) -> Result<(ArrayHandle, NonNull<u8>), NdError> {
        let shape = ShapeTable::new(extents)?;
        let bytes = checked_bytes(&shape, element_size)?;
        let buffer = if zeroed {
            DataBuffer::allocate_zeroed(bytes)?
        } else {
            DataBuffer::allocate(bytes)?
        };
        let block = ScaffoldBlock::build(buffer.addr(), element_size, &shape)?;
        let record = holder.mark(ArrayRecord::owned(shape, element_size, buffer.addr()));
        let key = block.as_ref().map_or(buffer.addr(), ScaffoldBlock::addr);

        let clue = {
            let mut table = self.registry.lock();
            commit(&mut table, key, record)
        };
        let clue = match clue {
            Ok(clue) => clue,
            Err(e) => {
                tracing::warn!(error = %e, "allocation rolled back");
                return Err(e);
            }
        };
        Ok(publish(buffer, block, clue))
    }

    /// Resize and re-stride an owned array.
    ///
    /// The result holds the first `min(old, new)` bytes of the old buffer
    /// in linear order; bytes past them are uninitialized. The
    /// old handle is invalid afterwards. Views, unknown handles, and the
    /// handles of [`NdArray`](crate::NdArray)s are rejected with
    /// [`NdError::InvalidOperation`], and any failure leaves the original
    /// array registered and intact.
    pub fn reshape(
        &self,
        handle: ArrayHandle,
        element_size: usize,
        extents: &[usize],
    ) -> Result<ArrayHandle, NdError> {
        self.reshape_with(handle, element_size, extents, false, Holder::Caller)
            .map(|(handle, _)| handle)
    }

    /// Like [`reshape`](Self::reshape), with elements past the preserved
    /// prefix zero-filled.
    pub fn reshape_zeroed(
        &self,
        handle: ArrayHandle,
        element_size: usize,
        extents: &[usize],
    ) -> Result<ArrayHandle, NdError> {
        self.reshape_with(handle, element_size, extents, true, Holder::Caller)
            .map(|(handle, _)| handle)
    }

    /// Reshape and return the new handle together with its data pointer.
    pub(crate) fn reshape_with(
        &self,
        handle: ArrayHandle,
        element_size: usize,
        extents: &[usize],
        zero_tail: bool,
        holder: Holder,
    ) -> Result<(ArrayHandle, NonNull<u8>), NdError> {
        let old_key = handle.addr();
        let old = match self.registry.lookup(old_key, handle.clue) {
            Ok(record) if record.kind == ArrayKind::Owned => record,
            Ok(_) => return Err(NdError::invalid("a view cannot be reshaped")),
            Err(_) => {
                return Err(NdError::invalid(format!(
                    "{old_key} is not a known array and cannot be reshaped"
                )))
            }
        };
        holder.admit(old_key, &old)?;
        let shape = ShapeTable::new(extents)?;
        let bytes = checked_bytes(&shape, element_size)?;

        // Borrow the old buffer only to copy out of it; it stays registered.
        // SAFETY: `old` is the live owned record for this buffer, so its
        // data address and byte length are exactly what into_raw recorded.
        let old_buffer = ManuallyDrop::new(unsafe {
            DataBuffer::from_raw(addr_ptr(old.data), old.byte_len())
        });
        let buffer = old_buffer.recreate(bytes, zero_tail)?;
        let block = ScaffoldBlock::build(buffer.addr(), element_size, &shape)?;
        let record = holder.mark(ArrayRecord::owned(shape, element_size, buffer.addr()));
        let new_key = block.as_ref().map_or(buffer.addr(), ScaffoldBlock::addr);

        let swapped = {
            let mut table = self.registry.lock();
            swap(&mut table, old_key, handle.clue, &old, new_key, record)
        };
        let clue = match swapped {
            Ok(clue) => clue,
            Err(e) => {
                tracing::warn!(error = %e, handle = %old_key, "reshape rolled back");
                return Err(e);
            }
        };
        tracing::debug!(from = %old.shape, to = ?extents, "reshaped array");
        // SAFETY: the old records were removed above, so this is the only
        // remaining owner of the old memory.
        unsafe { release(old_key, &old) };
        Ok(publish(buffer, block, clue))
    }

    /// Build a scaffold over memory the allocator does not own.
    ///
    /// `data` may be caller memory or any known array. A known handle is
    /// resolved to its data buffer, which must hold at least as many
    /// elements (and bytes) as requested; the view remembers it for
    /// [`check_view`](Self::check_view).
    /// Rank ≤ 1 and null data are rejected with
    /// [`NdError::InvalidOperation`].
    ///
    /// The caller keeps `data` alive for as long as the view is used.
    pub fn view(
        &self,
        data: *mut u8,
        element_size: usize,
        extents: &[usize],
    ) -> Result<ArrayHandle, NdError> {
        self.view_with(data, element_size, extents, Holder::Caller)
    }

    pub(crate) fn view_with(
        &self,
        data: *mut u8,
        element_size: usize,
        extents: &[usize],
        holder: Holder,
    ) -> Result<ArrayHandle, NdError> {
        if data.is_null() {
            return Err(NdError::invalid("a view needs non-null data"));
        }
        let shape = ShapeTable::new(extents)?;
        if shape.rank() < 2 {
            return Err(NdError::invalid("a view needs rank greater than 1"));
        }
        let bytes = checked_bytes(&shape, element_size)?;

        let requested = Addr::of(data);
        let known = self.registry.lock().get(requested, None).map(|r| {
            // A view over caller memory has no registered buffer to track.
            let source = if r.is_view() && r.rank() > 1 {
                r.source
            } else {
                Some(r.data)
            };
            (r.data, r.shape.element_count(), r.byte_len(), source)
        });
        let (data, source) = match known {
            Some((_, count, _, _)) if count < shape.element_count() => {
                return Err(NdError::invalid(format!(
                    "view of {} elements exceeds the {count} elements of {requested}",
                    shape.element_count()
                )))
            }
            Some((_, _, available, _)) if available < bytes => {
                return Err(NdError::invalid(format!(
                    "view of {bytes} bytes exceeds the {available} bytes of {requested}"
                )))
            }
            Some((data, _, _, source)) => (data, source),
            None => (requested, None),
        };

        let block = ScaffoldBlock::build(data, element_size, &shape)?
            .ok_or_else(|| NdError::invalid("a view needs rank greater than 1"))?;
        let record = holder.mark(ArrayRecord::view(shape, element_size, data, source));
        let clue = {
            let mut table = self.registry.lock();
            commit(&mut table, block.addr(), record)?
        };
        Ok(ArrayHandle::new(block.into_raw().cast(), clue))
    }

    /// Release an array.
    ///
    /// - Unknown handle: `Err(NotFound)`, nothing touched.
    /// - Owned: its records are removed, then its scaffold and data buffer
    ///   are released. Views over it are not touched.
    /// - View of rank > 1: its record is removed and its scaffold released.
    /// - The 1-D slice of an array: `Err(InvalidOperation)`, nothing
    ///   touched; free the array instead.
    /// - The handle of an [`NdArray`](crate::NdArray) or
    ///   [`NdView`](crate::NdView): `Err(InvalidOperation)`, nothing
    ///   touched; drop the wrapper instead.
    pub fn free(&self, handle: ArrayHandle) -> Result<(), NdError> {
        self.free_with(handle, Holder::Caller)
    }

    pub(crate) fn free_with(&self, handle: ArrayHandle, holder: Holder) -> Result<(), NdError> {
        let key = handle.addr();
        let record = {
            let mut table = self.registry.lock();
            match table.get(key, handle.clue) {
                Some(r) if r.is_view() && r.rank() == 1 => {
                    return Err(NdError::invalid(
                        "the 1-D slice of an array cannot be freed on its own",
                    ));
                }
                Some(r) => holder.admit(key, r)?,
                None => {
                    tracing::trace!(handle = %key, "free of unknown address ignored");
                    return Err(NdError::NotFound { addr: key });
                }
            }
            let record = table.remove(key, handle.clue)?;
            if record.kind == ArrayKind::Owned && record.rank() > 1 {
                remove_slice(&mut table, &record);
            }
            record
        };
        // SAFETY: the records for `key` were just removed, so no other
        // free or reshape can reach this memory.
        unsafe { release(key, &record) };
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Whether the handle's address is registered.
    pub fn is_known(&self, handle: ArrayHandle) -> bool {
        self.registry.contains(handle.addr())
    }

    /// Whether the handle is a registered view, including the 1-D slice
    /// of an array.
    pub fn is_view(&self, handle: ArrayHandle) -> bool {
        self.query(handle, ArrayRecord::is_view).unwrap_or(false)
    }

    /// Number of dimensions, or 0 if unknown.
    pub fn rank(&self, handle: ArrayHandle) -> usize {
        self.query(handle, ArrayRecord::rank).unwrap_or(0)
    }

    /// Extent of dimension `dim`, or 0 if unknown or past the rank.
    pub fn extent(&self, handle: ArrayHandle, dim: usize) -> usize {
        self.query(handle, |r| r.shape.extent(dim))
            .flatten()
            .unwrap_or(0)
    }

    /// A copy of the shape, or `None` if unknown.
    pub fn shape(&self, handle: ArrayHandle) -> Option<ShapeTable> {
        self.query(handle, |r| r.shape.clone())
    }

    /// Total number of elements, or 0 if unknown.
    pub fn element_count(&self, handle: ArrayHandle) -> usize {
        self.query(handle, |r| r.shape.element_count()).unwrap_or(0)
    }

    /// Element size in bytes, or 0 if unknown.
    pub fn element_size(&self, handle: ArrayHandle) -> usize {
        self.query(handle, |r| r.element_size).unwrap_or(0)
    }

    /// Start of the contiguous element buffer, or `None` if unknown.
    pub fn data_ptr(&self, handle: ArrayHandle) -> Option<NonNull<u8>> {
        self.query(handle, |r| addr_ptr(r.data))
    }

    /// A copy of the registry record.
    pub fn record(&self, handle: ArrayHandle) -> Result<ArrayRecord, NdError> {
        self.registry.lookup(handle.addr(), handle.clue)
    }

    /// Check that a view's source array is still registered.
    ///
    /// Owned arrays and views over caller memory always pass. A view whose
    /// source has been freed fails with [`NdError::NotFound`] naming the
    /// source's data address. The check is by address, so a new array that
    /// happens to reuse the freed buffer's address also passes.
    pub fn check_view(&self, handle: ArrayHandle) -> Result<(), NdError> {
        let record = self.record(handle)?;
        match record.source {
            Some(source) if !self.registry.contains(source) => {
                Err(NdError::NotFound { addr: source })
            }
            _ => Ok(()),
        }
    }

    fn query<R>(&self, handle: ArrayHandle, f: impl FnOnce(&ArrayRecord) -> R) -> Option<R> {
        self.registry.with(handle.addr(), handle.clue, f).ok()
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ─────────────────────────────────────────────────────

fn checked_bytes(shape: &ShapeTable, element_size: usize) -> Result<usize, NdError> {
    if element_size == 0 {
        return Err(NdError::invalid("element size must be at least 1 byte"));
    }
    shape
        .byte_len(element_size)
        .ok_or_else(|| NdError::invalid(format!("byte length of shape {shape} overflows")))
}

/// Recover a pointer from a registry key.
///
/// Keys are made with `Addr::of`, which exposes the pointer's provenance.
pub(crate) fn addr_ptr<T>(addr: Addr) -> NonNull<T> {
    NonNull::new(ptr::with_exposed_provenance_mut(addr.0)).unwrap_or(NonNull::dangling())
}

/// Register a new array: its handle record and, for an owned rank > 1
/// array, the 1-D slice of its buffer. Both or neither.
fn commit(
    table: &mut RegistryTable<ArrayRecord>,
    key: Addr,
    record: ArrayRecord,
) -> Result<Clue, NdError> {
    let with_slice = record.kind == ArrayKind::Owned && record.rank() > 1;
    table.reserve(if with_slice { 2 } else { 1 })?;
    if with_slice {
        table.insert(record.data, ArrayRecord::slice_of(&record))?;
    }
    let data = record.data;
    match table.insert(key, record) {
        Ok(clue) => Ok(clue),
        Err(e) => {
            if with_slice {
                let _ = table.remove(data, None);
            }
            Err(e)
        }
    }
}

/// Replace an owned array's records with those of its reshaped successor.
fn swap(
    table: &mut RegistryTable<ArrayRecord>,
    old_key: Addr,
    old_clue: Option<Clue>,
    old: &ArrayRecord,
    new_key: Addr,
    record: ArrayRecord,
) -> Result<Clue, NdError> {
    // The array may have been freed since it was looked up.
    match table.get(old_key, old_clue) {
        Some(current)
            if current.data == old.data
                && current.kind == ArrayKind::Owned
                && current.managed == old.managed => {}
        _ => {
            return Err(NdError::invalid(format!(
                "{old_key} was released during the reshape"
            )))
        }
    }
    commit(table, new_key, record)?;
    // Present: checked above under the same lock.
    let _ = table.remove(old_key, old_clue);
    if old.rank() > 1 {
        remove_slice(table, old);
    }
    Ok(table.position(new_key, None).unwrap_or(Clue::new(0)))
}

fn remove_slice(table: &mut RegistryTable<ArrayRecord>, owner: &ArrayRecord) {
    if let Err(e) = table.remove(owner.data, None) {
        tracing::warn!(error = %e, "owned array had no registered 1-D slice");
    }
}

/// Hand freshly built memory over to the registry.
fn publish(
    buffer: DataBuffer,
    block: Option<ScaffoldBlock>,
    clue: Clue,
) -> (ArrayHandle, NonNull<u8>) {
    let data = buffer.into_raw();
    let handle = match block {
        Some(block) => block.into_raw().cast(),
        None => data,
    };
    (ArrayHandle::new(handle, clue), data)
}

/// Reclaim and drop the memory behind an unregistered record.
///
/// # Safety
///
/// `record` must have just been removed from the registry under `key`, and
/// no other owner of its memory may remain.
unsafe fn release(key: Addr, record: &ArrayRecord) {
    if record.rank() > 1 {
        // SAFETY: rank > 1 handles are scaffold blocks of block_len words.
        drop(unsafe { ScaffoldBlock::from_raw(addr_ptr(key), block_len(&record.shape)) });
    }
    if record.kind == ArrayKind::Owned {
        // SAFETY: owned records name a buffer of exactly byte_len bytes.
        drop(unsafe { DataBuffer::from_raw(addr_ptr(record.data), record.byte_len()) });
    }
}
