//! Vector kernels for byte scanning
//!
//! Every kernel searches the window `buf[start..end]` of a larger backing
//! slice and returns the match offset relative to `start`. Vector loads are
//! allowed to begin before `start` (that is what the lookbehind padding of
//! [`PaddedBuffer`](crate::scan::PaddedBuffer) is for) and to overlap the
//! previous load at the tail, but they never leave `buf`. Lanes outside the
//! window are masked off, so bytes there can never be reported.
//!
//! Dispatch picks the widest instruction set the CPU supports:
//! - AVX2 (32 bytes per load)
//! - SSE2 (16 bytes per load, always present on x86-64)
//! - Scalar fallback everywhere else

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Shared window walk for the vector kernels.
///
/// `$at => $mask` yields the lane bitmask for a load at offset `$at`
/// (bit `i` is `buf[$at + i]`); `$byte => $hit` is the scalar predicate for
/// windows too short for a single load. Expands to the whole function body.
#[cfg(target_arch = "x86_64")]
macro_rules! scan_window {
    ($buf:ident, $start:ident, $end:ident, $width:expr, $at:ident => $mask:expr, $byte:ident => $hit:expr) => {{
        debug_assert!($start <= $end && $end <= $buf.len());
        if $start >= $end {
            return None;
        }

        // Align the first load down to 8 bytes, using at most LOOKBEHIND
        // bytes in front of the window.
        let lead = ($buf.as_ptr() as usize).wrapping_add($start) & $crate::simd::LOOKBEHIND;
        let mut $at = $start - lead.min($start);

        while $at + $width <= $end {
            let mut mask: u32 = $mask;
            if $at < $start {
                mask &= u32::MAX << ($start - $at);
            }
            if mask != 0 {
                return Some($at + mask.trailing_zeros() as usize - $start);
            }
            $at += $width;
        }

        let checked = $at.max($start);
        if checked >= $end {
            return None;
        }

        if $end >= $width {
            // One overlapping load ending exactly at the window end
            let $at = $end - $width;
            let mask: u32 = ($mask) & (u32::MAX << (checked - $at));
            return if mask != 0 {
                Some($at + mask.trailing_zeros() as usize - $start)
            } else {
                None
            };
        }

        $buf[checked..$end]
            .iter()
            .position(|&$byte| $hit)
            .map(|i| i + checked - $start)
    }};
}

#[cfg(target_arch = "x86_64")]
pub(crate) use scan_window;

pub mod scalar;

#[cfg(target_arch = "x86_64")]
pub mod sse2;

#[cfg(target_arch = "x86_64")]
pub mod avx2;

/// Bytes before a window start that a kernel may read to align its first load
pub const LOOKBEHIND: usize = 7;

/// Instruction set used by the scanning kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimdLevel {
    /// Byte-at-a-time loops, available everywhere
    Scalar,
    /// 128-bit vectors
    Sse2,
    /// 256-bit vectors
    Avx2,
}

static DETECTED: OnceLock<SimdLevel> = OnceLock::new();

impl SimdLevel {
    /// The best level supported by the running CPU (probed once)
    pub fn detect() -> Self {
        *DETECTED.get_or_init(Self::probe)
    }

    #[cfg(target_arch = "x86_64")]
    fn probe() -> Self {
        if is_x86_feature_detected!("avx2") {
            SimdLevel::Avx2
        } else if is_x86_feature_detected!("sse2") {
            SimdLevel::Sse2
        } else {
            SimdLevel::Scalar
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn probe() -> Self {
        SimdLevel::Scalar
    }

    /// All levels usable on this CPU, narrowest first
    pub fn available() -> Vec<SimdLevel> {
        let best = Self::detect();
        [SimdLevel::Scalar, SimdLevel::Sse2, SimdLevel::Avx2]
            .into_iter()
            .filter(|level| *level <= best)
            .collect()
    }

    /// Never go above what the CPU actually supports
    pub fn clamp_to_cpu(self) -> Self {
        self.min(Self::detect())
    }

    /// Vector width in bytes
    pub fn width(self) -> usize {
        match self {
            SimdLevel::Scalar => 1,
            SimdLevel::Sse2 => 16,
            SimdLevel::Avx2 => 32,
        }
    }

    /// Short lowercase name, as used in config files
    pub fn name(self) -> &'static str {
        match self {
            SimdLevel::Scalar => "scalar",
            SimdLevel::Sse2 => "sse2",
            SimdLevel::Avx2 => "avx2",
        }
    }

    /// First byte in `buf[start..end]` equal to `a` or `b`, relative to `start`
    #[inline]
    pub fn either_of_two(self, buf: &[u8], start: usize, end: usize, a: u8, b: u8) -> Option<usize> {
        match self.clamp_to_cpu() {
            #[cfg(target_arch = "x86_64")]
            // SAFETY: clamp_to_cpu only yields AVX2 when the CPU has it
            SimdLevel::Avx2 => unsafe { avx2::either_of_two(buf, start, end, a, b) },
            #[cfg(target_arch = "x86_64")]
            // SAFETY: as above for SSE2
            SimdLevel::Sse2 => unsafe { sse2::either_of_two(buf, start, end, a, b) },
            _ => scalar::either_of_two(buf, start, end, a, b),
        }
    }

    /// First byte in `buf[start..end]` outside `[a, b]`, relative to `start`
    #[inline]
    pub fn not_in_range(self, buf: &[u8], start: usize, end: usize, a: u8, b: u8) -> Option<usize> {
        debug_assert!(a <= b, "empty byte range [{a:#04x}, {b:#04x}]");
        match self.clamp_to_cpu() {
            #[cfg(target_arch = "x86_64")]
            // SAFETY: clamp_to_cpu only yields AVX2 when the CPU has it
            SimdLevel::Avx2 => unsafe { avx2::not_in_range(buf, start, end, a, b) },
            #[cfg(target_arch = "x86_64")]
            // SAFETY: as above for SSE2
            SimdLevel::Sse2 => unsafe { sse2::not_in_range(buf, start, end, a, b) },
            _ => scalar::not_in_range(buf, start, end, a, b),
        }
    }
}

impl std::fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
