//! End-to-end scenarios through the raw allocator API, indexing the way C
//! code does: by following scaffold words.

#![allow(unsafe_code)]

use std::mem;
use std::ptr;

use ndmalloc_arena::{Allocator, ArrayHandle};
use ndmalloc_test_utils::sequential;

// ── Helpers ─────────────────────────────────────────────────────

/// Address of element `index`, found by dereferencing the scaffold the
/// way `a[i][j]…` does in C.
///
/// # Safety
///
/// `handle` must be a live array with the given extents and element size.
unsafe fn element_ptr(
    handle: ArrayHandle,
    extents: &[usize],
    elem: usize,
    index: &[usize],
) -> *mut u8 {
    let (&last, outer) = index.split_last().unwrap();
    let mut level = handle.as_ptr();
    for (d, &i) in outer.iter().enumerate() {
        assert!(i < extents[d]);
        // SAFETY: `level` points at a scaffold region with extents[d] words.
        let word = unsafe { *level.cast::<usize>().add(i) };
        level = ptr::with_exposed_provenance_mut(word);
    }
    assert!(last < extents[extents.len() - 1]);
    // SAFETY: `level` is a row of the data buffer.
    unsafe { level.add(last * elem) }
}

unsafe fn read<T: Copy>(handle: ArrayHandle, extents: &[usize], index: &[usize]) -> T {
    // SAFETY: forwarded.
    unsafe { *element_ptr(handle, extents, mem::size_of::<T>(), index).cast::<T>() }
}

unsafe fn write<T: Copy>(handle: ArrayHandle, extents: &[usize], index: &[usize], v: T) {
    // SAFETY: forwarded.
    unsafe { *element_ptr(handle, extents, mem::size_of::<T>(), index).cast::<T>() = v }
}

fn data_slice<T>(alloc: &Allocator, handle: ArrayHandle) -> &[T] {
    let data = alloc.data_ptr(handle).unwrap();
    let len = alloc.element_count(handle);
    // SAFETY: the handle is live and its buffer holds `len` elements of T.
    unsafe { std::slice::from_raw_parts(data.as_ptr().cast::<T>(), len) }
}

// ── Scenario A: zero-filled rank-2 int ──────────────────────────

#[test]
fn zeroed_int_grid() {
    let alloc = Allocator::new();
    let extents = [4, 6];
    let h = alloc.allocate_zeroed(mem::size_of::<i32>(), &extents).unwrap();

    for i in 0..4 {
        for j in 0..6 {
            // SAFETY: h is a live 4x6 i32 array.
            assert_eq!(unsafe { read::<i32>(h, &extents, &[i, j]) }, 0);
        }
    }
    // SAFETY: as above.
    unsafe {
        write::<i32>(h, &extents, &[0, 0], 5);
        write::<i32>(h, &extents, &[3, 5], 1);
    }
    let data = data_slice::<i32>(&alloc, h);
    assert_eq!(data[0], 5);
    assert_eq!(data[23], 1);

    assert_eq!(alloc.shape(h).unwrap().extents(), &[4, 6]);
    assert_eq!(alloc.element_count(h), 24);
    alloc.free(h).unwrap();
    assert!(alloc.registry().is_empty());
}

// ── Scenario B: reshape preserves the linear prefix ─────────────

#[test]
fn reshape_float_grid() {
    let alloc = Allocator::new();
    let h = alloc.allocate(mem::size_of::<f32>(), &[4, 4]).unwrap();
    for i in 0..4 {
        for j in 0..4 {
            // SAFETY: h is a live 4x4 f32 array.
            unsafe { write(h, &[4, 4], &[i, j], (i * 4 + j + 1) as f32) };
        }
    }

    let h2 = alloc.reshape(h, mem::size_of::<f32>(), &[9, 2]).unwrap();
    let expected: Vec<f32> = (1..=16).map(|v| v as f32).collect();
    assert_eq!(&data_slice::<f32>(&alloc, h2)[..16], &expected[..]);
    for n in 0..16 {
        // SAFETY: h2 is a live 9x2 f32 array.
        let v: f32 = unsafe { read(h2, &[9, 2], &[n / 2, n % 2]) };
        assert_eq!(v, (n + 1) as f32);
    }

    assert!(!alloc.is_known(ArrayHandle::from_raw(h.as_ptr()).unwrap()));
    assert!(alloc.is_known(h2));
    assert_eq!(alloc.rank(h2), 2);
    assert_eq!(alloc.shape(h2).unwrap().extents(), &[9, 2]);
    alloc.free(h2).unwrap();
    assert!(alloc.registry().is_empty());
}

// ── Scenario C: view over a stack array ─────────────────────────

#[test]
fn view_over_stack_array() {
    let alloc = Allocator::new();
    let mut stack = [[0.0f32; 5]; 3];
    let flat = sequential(15);
    for (slot, v) in stack.as_flattened_mut().iter_mut().zip(&flat) {
        *slot = *v as f32;
    }
    let before = stack;

    let h = alloc
        .view(stack.as_mut_ptr().cast(), mem::size_of::<f32>(), &[3, 5])
        .unwrap();
    assert!(alloc.is_view(h));
    assert!(alloc.is_known(h));
    assert_eq!(alloc.shape(h).unwrap().extents(), &[3, 5]);
    // SAFETY: h views the live 3x5 stack array.
    assert_eq!(unsafe { read::<f32>(h, &[3, 5], &[2, 4]) }, 14.0);
    assert_eq!(alloc.data_ptr(h).unwrap().as_ptr(), stack.as_mut_ptr().cast());

    alloc.free(h).unwrap();
    assert!(!alloc.is_known(h));
    assert_eq!(stack, before);
    assert!(alloc.registry().is_empty());
}

// ── Extra: rank 1 and rank 4 through the same walk ──────────────

#[test]
fn rank_one_handle_is_the_buffer() {
    let alloc = Allocator::new();
    let h = alloc.allocate_zeroed(8, &[7]).unwrap();
    // SAFETY: h is a live rank-1 u64 array of 7.
    unsafe { write::<u64>(h, &[7], &[6], 42) };
    assert_eq!(data_slice::<u64>(&alloc, h)[6], 42);
    alloc.free(h).unwrap();
}

#[test]
fn rank_four_round_trip() {
    let alloc = Allocator::new();
    let extents = [2, 3, 2, 4];
    let h = alloc.allocate_zeroed(2, &extents).unwrap();
    let mut n = 0u16;
    for a in 0..2 {
        for b in 0..3 {
            for c in 0..2 {
                for d in 0..4 {
                    // SAFETY: h is a live u16 array of these extents.
                    unsafe { write(h, &extents, &[a, b, c, d], n) };
                    n += 1;
                }
            }
        }
    }
    let expected: Vec<u16> = (0..48).collect();
    assert_eq!(data_slice::<u16>(&alloc, h), &expected[..]);
    alloc.free(h).unwrap();
}
