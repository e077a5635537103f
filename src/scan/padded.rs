//! Buffers with guaranteed lookbehind padding.
//!
//! The vector scanners may read a few bytes in front of the window they are
//! asked to search. [`PaddedBuffer`] keeps [`SCAN_PADDING`] zero bytes ahead
//! of its data, and a [`PaddedSlice`] can only be cut from one, so every
//! window handed to a scanner has readable memory behind it.
//!
//! # Layout
//!
//! ```text
//! [padding (7 x 0x00)..., data bytes...]
//!  ^                      ^
//!  0                      SCAN_PADDING
//! ```

use std::ops::{Bound, RangeBounds};

use crate::simd::LOOKBEHIND;

/// Readable bytes kept in front of the data region
pub const SCAN_PADDING: usize = LOOKBEHIND;

/// Growable byte buffer with lookbehind padding in front of its data
#[derive(Clone)]
pub struct PaddedBuffer {
    /// `[padding..., data...]`
    buf: Vec<u8>,
    /// Length of the region handed out by the last `spare()` call
    pending: usize,
}

impl PaddedBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty buffer with room for `capacity` data bytes
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(SCAN_PADDING + capacity);
        buf.resize(SCAN_PADDING, 0);
        Self { buf, pending: 0 }
    }

    /// Create a buffer holding a copy of `data`
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut padded = Self::with_capacity(data.len());
        padded.extend_from_slice(data);
        padded
    }

    /// Number of data bytes (excludes padding)
    pub fn len(&self) -> usize {
        self.buf.len() - SCAN_PADDING
    }

    /// Whether there are no data bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The data bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[SCAN_PADDING..]
    }

    /// Append bytes to the data region
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.commit(0);
        self.buf.extend_from_slice(data);
    }

    /// Spare room at the end of the data region for a `read()` call.
    ///
    /// The returned slice is zero-filled and `len` bytes long; call
    /// [`commit`](Self::commit) with the number of bytes actually written.
    /// Any other mutation discards an uncommitted region.
    pub fn spare(&mut self, len: usize) -> &mut [u8] {
        self.commit(0);
        let filled = self.buf.len();
        self.buf.resize(filled + len, 0);
        self.pending = len;
        &mut self.buf[filled..]
    }

    /// Keep `written` bytes of the last [`spare`](Self::spare) region
    pub fn commit(&mut self, written: usize) {
        let unused = self.pending - written.min(self.pending);
        self.buf.truncate(self.buf.len() - unused);
        self.pending = 0;
    }

    /// Drop the first `count` data bytes, keeping the padding
    pub fn consume(&mut self, count: usize) {
        self.commit(0);
        let count = count.min(self.len());
        self.buf.drain(SCAN_PADDING..SCAN_PADDING + count);
    }

    /// Drop all data bytes
    pub fn clear(&mut self) {
        self.buf.truncate(SCAN_PADDING);
        self.pending = 0;
    }

    /// The whole data region as a scannable slice
    pub fn as_padded(&self) -> PaddedSlice<'_> {
        PaddedSlice {
            buf: &self.buf,
            start: SCAN_PADDING,
            end: self.buf.len(),
        }
    }

    /// A sub-range of the data region as a scannable slice
    pub fn window<R: RangeBounds<usize>>(&self, range: R) -> PaddedSlice<'_> {
        self.as_padded().slice(range)
    }
}

impl Default for PaddedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PaddedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaddedBuffer")
            .field("len", &self.len())
            .finish()
    }
}

/// A window into a [`PaddedBuffer`] with readable bytes in front of it
#[derive(Debug, Clone, Copy)]
pub struct PaddedSlice<'a> {
    /// Backing bytes, padding included
    buf: &'a [u8],
    start: usize,
    end: usize,
}

impl<'a> PaddedSlice<'a> {
    /// The bytes inside the window
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buf[self.start..self.end]
    }

    /// Window length in bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// A sub-window; the lookbehind guarantee carries over.
    ///
    /// # Panics
    /// If the range is out of bounds for this window.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> PaddedSlice<'a> {
        let from = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
            Bound::Unbounded => 0,
        };
        let to = match range.end_bound() {
            Bound::Included(&n) => n + 1,
            Bound::Excluded(&n) => n,
            Bound::Unbounded => self.len(),
        };
        assert!(
            from <= to && to <= self.len(),
            "window {from}..{to} out of bounds for length {}",
            self.len()
        );
        PaddedSlice {
            buf: self.buf,
            start: self.start + from,
            end: self.start + to,
        }
    }

    /// Backing bytes plus the window bounds, for the kernels
    pub(crate) fn raw_parts(&self) -> (&'a [u8], usize, usize) {
        (self.buf, self.start, self.end)
    }
}
