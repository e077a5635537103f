//! Scalar kernels, used on CPUs without vector support and as the
//! reference the vector kernels are tested against.

/// First byte in `buf[start..end]` equal to `a` or `b`, relative to `start`
#[inline]
pub fn either_of_two(buf: &[u8], start: usize, end: usize, a: u8, b: u8) -> Option<usize> {
    buf[start..end].iter().position(|&byte| byte == a || byte == b)
}

/// First byte in `buf[start..end]` outside `[a, b]`, relative to `start`
#[inline]
pub fn not_in_range(buf: &[u8], start: usize, end: usize, a: u8, b: u8) -> Option<usize> {
    buf[start..end].iter().position(|&byte| byte < a || byte > b)
}
