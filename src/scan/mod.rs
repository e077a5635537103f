//! Byte scanner
//!
//! Vectorized searches for the next byte that needs attention, so long runs
//! of plain text can be skipped without branching on every byte:
//!
//! - [`find_either_of_two_bytes`]: first byte equal to either target,
//!   e.g. ESC or a UTF-8 lead byte
//! - [`find_byte_not_in_range`]: first byte outside an inclusive range,
//!   e.g. `[0x20, 0x7e]` to find the end of printable ASCII
//!
//! Both take a [`PaddedSlice`], which guarantees the lookbehind bytes the
//! vector loads may touch.

mod padded;

pub use padded::{PaddedBuffer, PaddedSlice, SCAN_PADDING};

use crate::simd::SimdLevel;

/// Offset of the first byte in `haystack` equal to `a` or `b`
#[inline]
pub fn find_either_of_two_bytes(haystack: PaddedSlice<'_>, a: u8, b: u8) -> Option<usize> {
    find_either_of_two_bytes_with(SimdLevel::detect(), haystack, a, b)
}

/// Offset of the first byte in `haystack` outside the inclusive range `[a, b]`.
///
/// `a` must not be greater than `b`; the result is unspecified otherwise
/// (debug builds panic).
#[inline]
pub fn find_byte_not_in_range(haystack: PaddedSlice<'_>, a: u8, b: u8) -> Option<usize> {
    find_byte_not_in_range_with(SimdLevel::detect(), haystack, a, b)
}

/// [`find_either_of_two_bytes`] using a specific kernel
pub fn find_either_of_two_bytes_with(
    level: SimdLevel,
    haystack: PaddedSlice<'_>,
    a: u8,
    b: u8,
) -> Option<usize> {
    let (buf, start, end) = haystack.raw_parts();
    level.either_of_two(buf, start, end, a, b)
}

/// [`find_byte_not_in_range`] using a specific kernel
pub fn find_byte_not_in_range_with(
    level: SimdLevel,
    haystack: PaddedSlice<'_>,
    a: u8,
    b: u8,
) -> Option<usize> {
    let (buf, start, end) = haystack.raw_parts();
    level.not_in_range(buf, start, end, a, b)
}
