//! Mochi Scan
//!
//! The input side of a terminal emulator: turns the raw bytes a child
//! process writes to its pty into Unicode scalars, stopping at every escape
//! byte so an escape-sequence parser can take over.
//!
//! - `scan`: vectorized byte searches over padded buffers
//! - `utf8`: the incremental decode session
//! - `stream`: drives the decoder over arbitrary chunks
//! - `simd`: kernel selection (AVX2, SSE2, scalar)
//! - `pty`: child processes as an input source (unix)

pub mod config;
pub mod error;
pub mod logging;
#[cfg(unix)]
pub mod pty;
pub mod scan;
pub mod simd;
pub mod stream;
pub mod utf8;

pub use config::{Config, SimdPreference};
pub use error::{ScanError, ScanResult};
pub use scan::{find_byte_not_in_range, find_either_of_two_bytes, PaddedBuffer, PaddedSlice};
pub use simd::SimdLevel;
pub use stream::{Handler, ScanStats, StreamScanner};
pub use utf8::{Utf8Decoder, Utf8State, OUTPUT_CAPACITY, REPLACEMENT};
