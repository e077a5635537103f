//! AVX2 kernels, 32 bytes per load.

use std::arch::x86_64::*;

use super::scan_window;

const WIDTH: usize = 32;

/// # Safety
/// Requires AVX2. `start <= end <= buf.len()`.
#[target_feature(enable = "avx2")]
pub unsafe fn either_of_two(buf: &[u8], start: usize, end: usize, a: u8, b: u8) -> Option<usize> {
    let a_vec = _mm256_set1_epi8(a as i8);
    let b_vec = _mm256_set1_epi8(b as i8);

    scan_window!(buf, start, end, WIDTH,
        at => {
            let chunk = _mm256_loadu_si256(buf[at..at + WIDTH].as_ptr().cast());
            let hits = _mm256_or_si256(
                _mm256_cmpeq_epi8(chunk, a_vec),
                _mm256_cmpeq_epi8(chunk, b_vec),
            );
            _mm256_movemask_epi8(hits) as u32
        },
        byte => byte == a || byte == b
    )
}

/// # Safety
/// Requires AVX2. `start <= end <= buf.len()`, `a <= b`.
#[target_feature(enable = "avx2")]
pub unsafe fn not_in_range(buf: &[u8], start: usize, end: usize, a: u8, b: u8) -> Option<usize> {
    let low = _mm256_set1_epi8(a as i8);
    let span = _mm256_set1_epi8(b.wrapping_sub(a) as i8);

    scan_window!(buf, start, end, WIDTH,
        at => {
            let chunk = _mm256_loadu_si256(buf[at..at + WIDTH].as_ptr().cast());
            let shifted = _mm256_sub_epi8(chunk, low);
            let inside = _mm256_cmpeq_epi8(_mm256_min_epu8(shifted, span), shifted);
            !(_mm256_movemask_epi8(inside) as u32)
        },
        byte => byte < a || byte > b
    )
}
