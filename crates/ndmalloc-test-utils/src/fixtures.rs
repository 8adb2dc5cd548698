//! Reference computations shared across test suites.
//!
//! These deliberately avoid every ndmalloc type, so a test comparing the
//! allocator against them is comparing two independent implementations.

/// Row-major linear offset of `index` within `extents`, computed from
/// strides.
///
/// # Panics
///
/// Panics if the ranks differ or any component is out of bounds.
pub fn row_major_offset(extents: &[usize], index: &[usize]) -> usize {
    assert_eq!(extents.len(), index.len(), "rank mismatch");
    let mut offset = 0;
    for (&i, &n) in index.iter().zip(extents) {
        assert!(i < n, "index {i} out of bounds for extent {n}");
        offset = offset * n + i;
    }
    offset
}

/// `0.0, 1.0, 2.0, …` of length `len`.
pub fn sequential(len: usize) -> Vec<f64> {
    (0..len).map(|i| i as f64).collect()
}

/// Iterator over every multi-index of a shape in row-major order (last
/// axis fastest). Yields nothing if any extent is zero.
pub struct MultiIndex {
    extents: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl MultiIndex {
    pub fn new(extents: &[usize]) -> Self {
        let next = if extents.is_empty() || extents.contains(&0) {
            None
        } else {
            Some(vec![0; extents.len()])
        };
        Self {
            extents: extents.to_vec(),
            next,
        }
    }
}

impl Iterator for MultiIndex {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut succ = current.clone();
        for axis in (0..succ.len()).rev() {
            succ[axis] += 1;
            if succ[axis] < self.extents[axis] {
                self.next = Some(succ);
                break;
            }
            succ[axis] = 0;
        }
        Some(current)
    }
}
