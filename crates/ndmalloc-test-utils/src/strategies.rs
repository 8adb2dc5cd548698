//! Proptest strategies for array shapes.

use std::ops::RangeInclusive;

use proptest::prelude::*;

/// Extents with a rank in `rank` and each extent in `extent`.
pub fn arb_extents(
    rank: RangeInclusive<usize>,
    extent: RangeInclusive<usize>,
) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(extent, rank)
}

/// Two shapes for a reshape test: an original and a target, each of rank
/// 1 to 4 with extents 1 to 5.
pub fn arb_reshape_pair() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    (arb_extents(1..=4, 1..=5), arb_extents(1..=4, 1..=5))
}
