//! Element types for the typed array layer.

#![allow(unsafe_code)]

/// A plain numeric type that can live in an ndmalloc data buffer.
///
/// # Safety
///
/// Implementors must be `Copy` types with no padding-dependent invariants
/// for which the all-zero byte pattern is a valid value, and whose
/// alignment does not exceed [`DATA_ALIGN`](crate::DATA_ALIGN).
pub unsafe trait Element: Copy + Send + Sync + 'static {}

macro_rules! impl_element {
    ($($t:ty),* $(,)?) => {
        $(
            // SAFETY: primitive numeric; zero is valid and alignment ≤ 16.
            unsafe impl Element for $t {}
        )*
    };
}

impl_element!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);
