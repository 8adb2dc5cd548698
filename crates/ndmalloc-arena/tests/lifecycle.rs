//! Ownership, view, reshape, and free semantics.

use ndmalloc_arena::{Allocator, ArrayHandle, NdArray, NdView};
use ndmalloc_core::{ArrayKind, NdError};

// ── Helpers ─────────────────────────────────────────────────────

fn handle_of<T>(ptr: *mut T) -> ArrayHandle {
    ArrayHandle::from_raw(ptr.cast()).unwrap()
}

fn filled(alloc: &Allocator, extents: &[usize]) -> NdArray<f64> {
    let mut arr = NdArray::zeros_in(alloc, extents).unwrap();
    for (i, v) in arr.as_mut_slice().iter_mut().enumerate() {
        *v = i as f64;
    }
    arr
}

// ── Ownership separation ────────────────────────────────────────

#[test]
fn freeing_views_never_frees_the_source() {
    let alloc = Allocator::new();
    let mut arr = filled(&alloc, &[4, 6]);
    let data = arr.as_mut_ptr();

    for shape in [[2usize, 12], [3, 8], [6, 4], [24, 1]] {
        let h = alloc.view(data.cast(), 8, &shape).unwrap();
        assert!(alloc.is_view(h));
        alloc.free(h).unwrap();
    }

    let h = arr.handle();
    assert!(alloc.is_known(h));
    assert!(!alloc.is_view(h));
    assert_eq!(alloc.rank(h), 2);
    assert_eq!(alloc.element_count(h), 24);
    assert_eq!(alloc.data_ptr(h).unwrap().as_ptr(), data.cast());
    assert_eq!(arr[[3, 5]], 23.0);
    arr[[0, 0]] = -1.0;
    assert_eq!(arr.as_slice()[0], -1.0);
}

#[test]
fn freeing_the_owner_leaves_views_registered() {
    let alloc = Allocator::new();
    let arr = filled(&alloc, &[2, 3]);
    let h = alloc.view(arr.as_ptr().cast_mut().cast(), 8, &[3, 2]).unwrap();
    drop(arr);
    assert!(alloc.is_known(h));
    assert_eq!(
        alloc.check_view(h),
        Err(NdError::NotFound {
            addr: alloc.record(h).unwrap().source.unwrap()
        })
    );
    alloc.free(h).unwrap();
    assert!(alloc.registry().is_empty());
}

// ── View capacity ───────────────────────────────────────────────

#[test]
fn view_larger_than_source_fails() {
    let alloc = Allocator::new();
    let arr = filled(&alloc, &[4, 6]);
    let data = arr.as_ptr().cast_mut().cast();
    let err = alloc.view(data, 8, &[5, 5]).unwrap_err();
    assert!(matches!(err, NdError::InvalidOperation { .. }));
    assert_eq!(alloc.registry().len(), 2);
}

#[test]
fn view_at_most_source_size_exposes_prefix() {
    let alloc = Allocator::new();
    let arr = filled(&alloc, &[4, 6]);
    let data = arr.as_ptr().cast_mut().cast();
    let h = alloc.view(data, 8, &[2, 5]).unwrap();
    let record = alloc.record(h).unwrap();
    assert_eq!(record.kind, ArrayKind::View);
    assert_eq!(record.data, ndmalloc_core::Addr::of(arr.as_ptr()));
    alloc.free(h).unwrap();

    let mut copy = arr.as_slice()[..10].to_vec();
    let v = NdView::new_in(&alloc, &mut copy, &[2, 5]).unwrap();
    for i in 0..2 {
        for j in 0..5 {
            assert_eq!(v[[i, j]], (i * 5 + j) as f64);
        }
    }
}

#[test]
fn view_counts_elements_not_just_bytes() {
    let alloc = Allocator::new();
    // 4 u64 elements: 32 bytes, which would also fit 8 four-byte elements.
    let h = alloc.allocate_zeroed(8, &[4]).unwrap();
    let err = alloc.view(h.as_ptr(), 4, &[2, 4]).unwrap_err();
    assert!(matches!(err, NdError::InvalidOperation { .. }));
    assert_eq!(alloc.registry().len(), 1);

    let v = alloc.view(h.as_ptr(), 2, &[2, 2]).unwrap();
    assert_eq!(alloc.element_count(v), 4);
    alloc.free(v).unwrap();
    alloc.free(h).unwrap();
}

#[test]
fn view_over_a_known_handle_resolves_to_its_data() {
    let alloc = Allocator::new();
    let arr = filled(&alloc, &[3, 4]);
    // Passing the scaffold handle rather than the data pointer.
    let h = alloc.view(arr.handle().as_ptr(), 8, &[4, 3]).unwrap();
    assert_eq!(
        alloc.data_ptr(h).unwrap().as_ptr(),
        arr.as_ptr().cast_mut().cast()
    );
    alloc.free(h).unwrap();
}

#[test]
fn view_needs_rank_two_and_data() {
    let alloc = Allocator::new();
    let mut buf = [0u8; 16];
    assert!(matches!(
        alloc.view(buf.as_mut_ptr(), 1, &[16]),
        Err(NdError::InvalidOperation { .. })
    ));
    assert!(matches!(
        alloc.view(std::ptr::null_mut(), 1, &[4, 4]),
        Err(NdError::InvalidOperation { .. })
    ));
    assert!(alloc.registry().is_empty());
}

// ── Reshape ─────────────────────────────────────────────────────

#[test]
fn reshape_rejects_views_and_unknown_handles() {
    let alloc = Allocator::new();
    let mut buf = [0u32; 6];
    let v = alloc.view(buf.as_mut_ptr().cast(), 4, &[2, 3]).unwrap();
    assert!(matches!(
        alloc.reshape(v, 4, &[3, 2]),
        Err(NdError::InvalidOperation { .. })
    ));
    assert!(alloc.is_known(v));

    let stray = handle_of(buf.as_mut_ptr());
    assert!(matches!(
        alloc.reshape(stray, 4, &[3, 2]),
        Err(NdError::InvalidOperation { .. })
    ));
    alloc.free(v).unwrap();
}

#[test]
fn failed_reshape_keeps_original_usable() {
    let alloc = Allocator::new();
    let h = alloc.allocate_zeroed(8, &[3, 3]).unwrap();
    let before = alloc.record(h).unwrap();
    assert!(alloc.reshape(h, 8, &[usize::MAX, 2]).is_err());
    assert!(alloc.reshape(h, 8, &[]).is_err());
    assert!(alloc.reshape(h, 0, &[2, 2]).is_err());
    assert_eq!(alloc.record(h).unwrap(), before);
    assert_eq!(alloc.registry().len(), 2);
    alloc.free(h).unwrap();
}

#[test]
fn reshape_across_ranks() {
    let alloc = Allocator::new();
    let mut arr = filled(&alloc, &[2, 3, 4]);
    arr.reshape(&[24]).unwrap();
    assert_eq!(arr.rank(), 1);
    assert_eq!(alloc.registry().len(), 1);
    assert_eq!(arr[[23]], 23.0);

    arr.reshape(&[2, 2, 2, 2]).unwrap();
    assert_eq!(alloc.registry().len(), 2);
    assert_eq!(arr[[1, 1, 1, 1]], 15.0);

    arr.reshape(&[5, 5]).unwrap();
    assert_eq!(arr[[3, 0]], 15.0);
    assert_eq!(arr[[3, 1]], 0.0);
}

// ── Free ────────────────────────────────────────────────────────

#[test]
fn double_free_is_reported_not_fatal() {
    let alloc = Allocator::new();
    let h = alloc.allocate(4, &[2, 2]).unwrap();
    alloc.free(h).unwrap();
    assert!(matches!(alloc.free(h), Err(NdError::NotFound { .. })));
}

#[test]
fn wrapper_handles_are_released_only_by_their_wrapper() {
    let alloc = Allocator::new();
    let other = Allocator::with_registry(alloc.registry().clone());
    let mut arr = filled(&alloc, &[3, 3]);
    let h = arr.handle();
    for a in [&alloc, &other] {
        assert!(matches!(a.free(h), Err(NdError::InvalidOperation { .. })));
        assert!(matches!(a.reshape(h, 8, &[9]), Err(NdError::InvalidOperation { .. })));
    }
    assert_eq!(arr[[2, 2]], 8.0);
    arr[[2, 2]] = 0.5;

    let mut backing = [0.0f64; 4];
    let view = NdView::new_in(&other, &mut backing, &[2, 2]).unwrap();
    assert!(matches!(alloc.free(view.handle()), Err(NdError::InvalidOperation { .. })));
    drop(view);

    assert_eq!(arr.as_slice()[8], 0.5);
    drop(arr);
    assert!(alloc.registry().is_empty());
}

#[test]
fn registries_are_isolated() {
    let a = Allocator::new();
    let b = Allocator::new();
    let h = a.allocate(4, &[2, 2]).unwrap();
    assert!(!b.is_known(h));
    assert!(matches!(b.free(h), Err(NdError::NotFound { .. })));
    a.free(h).unwrap();
}

#[test]
fn shared_registry_sees_all_arrays() {
    let a = Allocator::new();
    let b = Allocator::with_registry(a.registry().clone());
    let arr = NdArray::<u8>::zeros_in(&a, &[4, 4]).unwrap();
    assert!(b.is_known(arr.handle()));
    assert_eq!(b.extent(arr.handle(), 0), 4);
}
