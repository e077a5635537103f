//! Stream scanning
//!
//! Drives a [`Utf8Decoder`] over arbitrary chunks of child output. Decoded
//! text goes to [`Handler::text`]; whenever the decoder stops at an ESC byte
//! the remaining input is offered to [`Handler::escape`], which stands in for
//! the escape-sequence parser and reports how much it took.

use serde::Serialize;

use crate::config::Config;
use crate::simd::SimdLevel;
use crate::utf8::{Utf8Decoder, REPLACEMENT};

/// Receives the output of a [`StreamScanner`]
pub trait Handler {
    /// Decoded code points, in order. The slice is only valid for this call.
    fn text(&mut self, chars: &[u32]);

    /// `input` starts with an ESC byte. Return how many bytes the escape
    /// parser consumed; anything below 1 is treated as 1.
    fn escape(&mut self, input: &[u8]) -> usize;
}

/// Running totals for a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Bytes fed in
    pub bytes: u64,
    /// Code points handed to [`Handler::text`]
    pub chars: u64,
    /// U+FFFD among those code points
    pub replacements: u64,
    /// Times control passed to [`Handler::escape`]
    pub escapes: u64,
    /// Calls into the decoder
    pub decode_calls: u64,
}

/// One input stream (one pty) worth of scanning state
#[derive(Debug, Clone, Default)]
pub struct StreamScanner {
    decoder: Utf8Decoder,
    stats: ScanStats,
}

impl StreamScanner {
    /// Create a scanner using the best kernel the CPU supports
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scanner using a specific kernel
    pub fn with_level(level: SimdLevel) -> Self {
        Self {
            decoder: Utf8Decoder::with_level(level),
            stats: ScanStats::default(),
        }
    }

    /// Create a scanner as configured
    pub fn from_config(config: &Config) -> Self {
        Self::with_level(config.simd.resolve())
    }

    /// Scan one chunk, calling `handler` for text runs and escape bytes.
    ///
    /// A multi-byte sequence cut off at the end of `data` is completed by
    /// the next call.
    pub fn feed<H: Handler + ?Sized>(&mut self, data: &[u8], handler: &mut H) {
        let mut offset = 0;

        while offset < data.len() {
            let found_esc = self.decoder.decode_to_esc(&data[offset..]);
            self.stats.decode_calls += 1;

            let chars = self.decoder.output();
            if !chars.is_empty() {
                self.stats.chars += chars.len() as u64;
                self.stats.replacements +=
                    chars.iter().filter(|&&cp| cp == REPLACEMENT).count() as u64;
                handler.text(chars);
            }
            offset += self.decoder.consumed();

            if found_esc {
                let rest = &data[offset..];
                let taken = handler.escape(rest).clamp(1, rest.len());
                self.stats.escapes += 1;
                offset += taken;
            }
        }

        self.stats.bytes += data.len() as u64;
        tracing::trace!(
            bytes = data.len(),
            pending = self.decoder.is_pending(),
            "scanned chunk"
        );
    }

    /// Drop any half-decoded sequence, e.g. after the stream was resynced
    pub fn reset(&mut self) {
        if self.decoder.is_pending() {
            tracing::debug!(state = ?self.decoder.state(), "discarding partial UTF-8 sequence");
        }
        self.decoder.reset();
    }

    /// Totals since creation
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Kernel used by the decoder
    pub fn level(&self) -> SimdLevel {
        self.decoder.level()
    }

    /// Whether a multi-byte sequence is waiting for more input
    pub fn is_pending(&self) -> bool {
        self.decoder.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collects text and treats every escape as ESC plus one byte
    #[derive(Default)]
    struct Recorder {
        text: String,
        escapes: Vec<Vec<u8>>,
    }

    impl Handler for Recorder {
        fn text(&mut self, chars: &[u32]) {
            self.text
                .extend(chars.iter().map(|&cp| char::from_u32(cp).unwrap_or('\u{FFFD}')));
        }

        fn escape(&mut self, input: &[u8]) -> usize {
            let taken = input.len().min(2);
            self.escapes.push(input[..taken].to_vec());
            taken
        }
    }

    #[test]
    fn test_text_and_escapes() {
        let mut scanner = StreamScanner::new();
        let mut rec = Recorder::default();
        scanner.feed(b"ab\x1bcde\x1bMf", &mut rec);
        assert_eq!(rec.text, "abdef");
        assert_eq!(rec.escapes, vec![b"\x1bc".to_vec(), b"\x1bM".to_vec()]);

        let stats = scanner.stats();
        assert_eq!(stats.bytes, 9);
        assert_eq!(stats.chars, 5);
        assert_eq!(stats.escapes, 2);
        assert_eq!(stats.replacements, 0);
    }

    #[test]
    fn test_escape_at_end_of_chunk() {
        let mut scanner = StreamScanner::new();
        let mut rec = Recorder::default();
        scanner.feed(b"hi\x1b", &mut rec);
        assert_eq!(rec.text, "hi");
        assert_eq!(rec.escapes, vec![b"\x1b".to_vec()]);
    }

    #[test]
    fn test_zero_length_escape_still_progresses() {
        struct Lazy(usize);
        impl Handler for Lazy {
            fn text(&mut self, _chars: &[u32]) {}
            fn escape(&mut self, _input: &[u8]) -> usize {
                self.0 += 1;
                0
            }
        }

        let mut scanner = StreamScanner::new();
        let mut lazy = Lazy(0);
        scanner.feed(b"\x1b\x1b\x1b", &mut lazy);
        assert_eq!(lazy.0, 3);
    }

    #[test]
    fn test_sequence_split_across_feeds() {
        let mut scanner = StreamScanner::new();
        let mut rec = Recorder::default();
        let bytes = "日本".as_bytes();
        scanner.feed(&bytes[..4], &mut rec);
        assert!(scanner.is_pending());
        scanner.feed(&bytes[4..], &mut rec);
        assert!(!scanner.is_pending());
        assert_eq!(rec.text, "日本");
    }

    #[test]
    fn test_long_chunk_uses_several_decode_calls() {
        let mut scanner = StreamScanner::new();
        let mut rec = Recorder::default();
        let input = "0123456789".repeat(20);
        scanner.feed(input.as_bytes(), &mut rec);
        assert_eq!(rec.text, input);
        assert_eq!(scanner.stats().decode_calls, 4);
    }

    #[test]
    fn test_replacements_counted() {
        let mut scanner = StreamScanner::new();
        let mut rec = Recorder::default();
        scanner.feed(&[b'a', 0xFF, 0xC0, 0x80, b'b'], &mut rec);
        assert_eq!(rec.text, "a\u{FFFD}\u{FFFD}b");
        assert_eq!(scanner.stats().replacements, 2);
    }

    #[test]
    fn test_reset_discards_partial() {
        let mut scanner = StreamScanner::new();
        let mut rec = Recorder::default();
        scanner.feed(&[0xE4, 0xB8], &mut rec);
        scanner.reset();
        assert!(!scanner.is_pending());
        scanner.feed(b"ok", &mut rec);
        assert_eq!(rec.text, "ok");
    }
}
