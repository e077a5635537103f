//! SSE2 kernels, 16 bytes per load.
//!
//! SSE2 is part of the x86-64 baseline, so these are always usable there.

use std::arch::x86_64::*;

use super::scan_window;

const WIDTH: usize = 16;

/// # Safety
/// Requires SSE2. `start <= end <= buf.len()`.
#[target_feature(enable = "sse2")]
pub unsafe fn either_of_two(buf: &[u8], start: usize, end: usize, a: u8, b: u8) -> Option<usize> {
    let a_vec = _mm_set1_epi8(a as i8);
    let b_vec = _mm_set1_epi8(b as i8);

    scan_window!(buf, start, end, WIDTH,
        at => {
            let chunk = _mm_loadu_si128(buf[at..at + WIDTH].as_ptr().cast());
            let hits = _mm_or_si128(_mm_cmpeq_epi8(chunk, a_vec), _mm_cmpeq_epi8(chunk, b_vec));
            _mm_movemask_epi8(hits) as u32
        },
        byte => byte == a || byte == b
    )
}

/// # Safety
/// Requires SSE2. `start <= end <= buf.len()`, `a <= b`.
#[target_feature(enable = "sse2")]
pub unsafe fn not_in_range(buf: &[u8], start: usize, end: usize, a: u8, b: u8) -> Option<usize> {
    // x is in [a, b] iff (x - a) wrapping is <= (b - a) unsigned
    let low = _mm_set1_epi8(a as i8);
    let span = _mm_set1_epi8(b.wrapping_sub(a) as i8);

    scan_window!(buf, start, end, WIDTH,
        at => {
            let chunk = _mm_loadu_si128(buf[at..at + WIDTH].as_ptr().cast());
            let shifted = _mm_sub_epi8(chunk, low);
            let inside = _mm_cmpeq_epi8(_mm_min_epu8(shifted, span), shifted);
            !(_mm_movemask_epi8(inside) as u32) & 0xFFFF
        },
        byte => byte < a || byte > b
    )
}
