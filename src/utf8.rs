//! Incremental UTF-8 decoding up to the next escape byte
//!
//! [`Utf8Decoder`] is the per-stream decode session. Each call to
//! [`Utf8Decoder::decode_to_esc`] decodes as much of a chunk as fits into a
//! fixed 64-slot output buffer and stops early, *before* consuming it, at an
//! ESC byte so the caller can hand the rest to an escape-sequence parser.
//! Multi-byte sequences split across chunks resume on the next call.
//!
//! Malformed input never fails: every broken sequence becomes exactly one
//! U+FFFD and decoding resynchronizes at the offending byte.

use crate::simd::SimdLevel;

/// Output slots per call: one 512-bit vector worth of 32-bit code points
pub const OUTPUT_CAPACITY: usize = 64;

/// U+FFFD REPLACEMENT CHARACTER
pub const REPLACEMENT: u32 = 0xFFFD;

const ESC: u8 = 0x1B;

/// Printable ASCII, copied to the output in bulk
const PRINTABLE_LOW: u8 = 0x20;
const PRINTABLE_HIGH: u8 = 0x7E;

/// Output storage, aligned for the widest vector store
#[derive(Clone)]
#[repr(C, align(64))]
struct OutputBuf([u32; OUTPUT_CAPACITY]);

/// Registers of a multi-byte sequence still waiting for continuation bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Utf8State {
    /// Continuation bytes still expected; 0 when no sequence is open
    pub remaining: u8,
    /// Total length of the open sequence (2-4)
    pub len: u8,
    /// Code point bits accumulated so far
    pub codep: u32,
}

impl Utf8State {
    /// No sequence is open
    pub fn is_clean(&self) -> bool {
        self.remaining == 0
    }
}

/// What one byte did to the state machine
enum Step {
    /// Byte consumed
    Consumed,
    /// Sequence broken; a replacement was emitted and the byte must be
    /// looked at again from the clean state
    Retry,
    /// ESC in the clean state; stop without consuming it
    Escape,
}

/// Per-stream UTF-8 decode session
#[derive(Clone)]
pub struct Utf8Decoder {
    output: OutputBuf,
    output_len: usize,
    consumed: usize,
    state: Utf8State,
    level: SimdLevel,
}

impl Default for Utf8Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8Decoder {
    /// Create a decoder using the best scanner the CPU supports
    pub fn new() -> Self {
        Self::with_level(SimdLevel::detect())
    }

    /// Create a decoder using a specific scanner kernel
    pub fn with_level(level: SimdLevel) -> Self {
        Self {
            output: OutputBuf([0; OUTPUT_CAPACITY]),
            output_len: 0,
            consumed: 0,
            state: Utf8State::default(),
            level: level.clamp_to_cpu(),
        }
    }

    /// Forget any partially decoded sequence (stream resynchronized)
    pub fn reset(&mut self) {
        self.state = Utf8State::default();
    }

    /// Check if decoder is in the middle of a sequence
    pub fn is_pending(&self) -> bool {
        !self.state.is_clean()
    }

    /// Partial-sequence registers
    pub fn state(&self) -> Utf8State {
        self.state
    }

    /// Scanner kernel in use
    pub fn level(&self) -> SimdLevel {
        self.level
    }

    /// Code points produced by the last call
    pub fn output(&self) -> &[u32] {
        &self.output.0[..self.output_len]
    }

    /// The last call's output as `char`s
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.output()
            .iter()
            .map(|&cp| char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    /// Input bytes consumed by the last call
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Decode `src` until an ESC byte, the end of input, or a full output
    /// buffer, whichever comes first.
    ///
    /// Returns `true` if decoding stopped because `src[consumed()]` is an
    /// ESC byte. The output and consumed count are replaced on every call.
    pub fn decode_to_esc(&mut self, src: &[u8]) -> bool {
        self.output_len = 0;
        let mut pos = 0;

        let found_esc = loop {
            if pos == src.len() || self.output_len == OUTPUT_CAPACITY {
                break false;
            }

            if self.state.is_clean() && is_printable(src[pos]) {
                pos += self.copy_printable_run(src, pos);
                continue;
            }

            match self.step(src[pos]) {
                Step::Consumed => pos += 1,
                Step::Retry => {}
                Step::Escape => break true,
            }
        };

        self.consumed = pos;
        found_esc
    }

    /// Copy the printable ASCII run at `src[pos..]` straight into the output,
    /// bounded by the free slots. Returns the run length (at least 1).
    fn copy_printable_run(&mut self, src: &[u8], pos: usize) -> usize {
        let room = OUTPUT_CAPACITY - self.output_len;
        let end = src.len().min(pos + room);
        let run = self
            .level
            .not_in_range(src, pos, end, PRINTABLE_LOW, PRINTABLE_HIGH)
            .unwrap_or(end - pos);

        let slots = &mut self.output.0[self.output_len..self.output_len + run];
        for (slot, &byte) in slots.iter_mut().zip(&src[pos..pos + run]) {
            *slot = u32::from(byte);
        }
        self.output_len += run;
        run
    }

    fn step(&mut self, byte: u8) -> Step {
        if self.state.is_clean() {
            match byte {
                ESC => return Step::Escape,
                0x00..=0x7F => self.push(u32::from(byte)),
                0xC0..=0xDF => self.open(2, byte & 0x1F),
                0xE0..=0xEF => self.open(3, byte & 0x0F),
                0xF0..=0xF7 => self.open(4, byte & 0x07),
                // Stray continuation byte or a byte that never appears in UTF-8
                _ => self.push(REPLACEMENT),
            }
            return Step::Consumed;
        }

        if byte & 0xC0 != 0x80 {
            // Sequence cut short
            self.push(REPLACEMENT);
            self.state = Utf8State::default();
            return Step::Retry;
        }

        self.state.codep = (self.state.codep << 6) | u32::from(byte & 0x3F);
        self.state.remaining -= 1;
        if self.state.is_clean() {
            let scalar = validate(self.state.codep, self.state.len);
            self.push(scalar);
            self.state = Utf8State::default();
        }
        Step::Consumed
    }

    fn open(&mut self, len: u8, payload: u8) {
        self.state = Utf8State {
            remaining: len - 1,
            len,
            codep: u32::from(payload),
        };
    }

    #[inline]
    fn push(&mut self, cp: u32) {
        self.output.0[self.output_len] = cp;
        self.output_len += 1;
    }
}

impl std::fmt::Debug for Utf8Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Utf8Decoder")
            .field("output", &self.output())
            .field("consumed", &self.consumed)
            .field("state", &self.state)
            .field("level", &self.level)
            .finish()
    }
}

#[inline]
fn is_printable(byte: u8) -> bool {
    (PRINTABLE_LOW..=PRINTABLE_HIGH).contains(&byte)
}

/// Reject overlong forms, surrogates and values past U+10FFFF
fn validate(cp: u32, len: u8) -> u32 {
    let min = match len {
        2 => 0x80,
        3 => 0x800,
        _ => 0x1_0000,
    };
    if cp < min || (0xD800..=0xDFFF).contains(&cp) || cp > 0x10_FFFF {
        REPLACEMENT
    } else {
        cp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> (Vec<u32>, usize, bool) {
        let mut decoder = Utf8Decoder::new();
        let found_esc = decoder.decode_to_esc(bytes);
        (decoder.output().to_vec(), decoder.consumed(), found_esc)
    }

    #[test]
    fn test_ascii() {
        let (out, consumed, esc) = decode_all(b"Az0");
        assert_eq!(out, vec![b'A' as u32, b'z' as u32, b'0' as u32]);
        assert_eq!(consumed, 3);
        assert!(!esc);
    }

    #[test]
    fn test_controls_other_than_esc_pass_through() {
        let (out, consumed, esc) = decode_all(b"a\r\n\x07\x7fb");
        assert_eq!(out, vec![0x61, 0x0D, 0x0A, 0x07, 0x7F, 0x62]);
        assert_eq!(consumed, 6);
        assert!(!esc);
    }

    #[test]
    fn test_two_byte() {
        // 'é' = U+00E9 = 0xC3 0xA9
        assert_eq!(decode_all(&[0xC3, 0xA9]).0, vec![0xE9]);
    }

    #[test]
    fn test_three_byte() {
        // '中' = U+4E2D = 0xE4 0xB8 0xAD
        assert_eq!(decode_all(&[0xE4, 0xB8, 0xAD]).0, vec![0x4E2D]);
    }

    #[test]
    fn test_four_byte() {
        // '😀' = U+1F600 = 0xF0 0x9F 0x98 0x80
        assert_eq!(decode_all(&[0xF0, 0x9F, 0x98, 0x80]).0, vec![0x1F600]);
    }

    #[test]
    fn test_stops_before_escape() {
        let mut decoder = Utf8Decoder::new();
        assert!(decoder.decode_to_esc(b"ab\x1bcd"));
        assert_eq!(decoder.output(), &[b'a' as u32, b'b' as u32]);
        assert_eq!(decoder.consumed(), 2);

        assert!(decoder.decode_to_esc(b"\x1bcd"));
        assert_eq!(decoder.consumed(), 0);
        assert!(decoder.output().is_empty());
    }

    #[test]
    fn test_split_four_byte_sequence() {
        let mut decoder = Utf8Decoder::new();
        assert!(!decoder.decode_to_esc(&[0xF0, 0x9F]));
        assert_eq!(decoder.consumed(), 2);
        assert!(decoder.output().is_empty());
        assert!(decoder.is_pending());

        assert!(!decoder.decode_to_esc(&[0x98, 0x80]));
        assert_eq!(decoder.consumed(), 2);
        assert_eq!(decoder.output(), &[0x1F600]);
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_split_one_byte_at_a_time() {
        let mut decoder = Utf8Decoder::new();
        let mut out = Vec::new();
        for &byte in "a中😀".as_bytes() {
            decoder.decode_to_esc(&[byte]);
            assert_eq!(decoder.consumed(), 1);
            out.extend_from_slice(decoder.output());
        }
        assert_eq!(out, vec![0x61, 0x4E2D, 0x1F600]);
    }

    #[test]
    fn test_overlong_nul_is_one_replacement() {
        let (out, consumed, _) = decode_all(&[0xC0, 0x80]);
        assert_eq!(out, vec![REPLACEMENT]);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_overlong_three_byte() {
        // Overlong encoding of '/' (0x2F)
        assert_eq!(decode_all(&[0xE0, 0x80, 0xAF]).0, vec![REPLACEMENT]);
    }

    #[test]
    fn test_surrogate_rejected() {
        // U+D800 encoded directly
        assert_eq!(decode_all(&[0xED, 0xA0, 0x80]).0, vec![REPLACEMENT]);
    }

    #[test]
    fn test_above_max_scalar_rejected() {
        // Would be U+110000
        assert_eq!(decode_all(&[0xF4, 0x90, 0x80, 0x80]).0, vec![REPLACEMENT]);
        assert_eq!(decode_all(&[0xF7, 0xBF, 0xBF, 0xBF]).0, vec![REPLACEMENT]);
    }

    #[test]
    fn test_invalid_start_bytes() {
        assert_eq!(decode_all(&[0xFF]).0, vec![REPLACEMENT]);
        assert_eq!(decode_all(&[0x80, 0xBF]).0, vec![REPLACEMENT, REPLACEMENT]);
    }

    #[test]
    fn test_truncated_sequence_reprocesses_byte() {
        // Start a 3-byte sequence, then plain ASCII
        let (out, consumed, _) = decode_all(&[0xE4, 0xB8, b'A']);
        assert_eq!(out, vec![REPLACEMENT, b'A' as u32]);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_truncated_sequence_before_lead_byte() {
        let (out, _, _) = decode_all(&[0xC3, 0xC3, 0xA9]);
        assert_eq!(out, vec![REPLACEMENT, 0xE9]);
    }

    #[test]
    fn test_truncated_sequence_before_escape() {
        let mut decoder = Utf8Decoder::new();
        assert!(decoder.decode_to_esc(&[b'x', 0xE4, ESC, b'[']));
        assert_eq!(decoder.output(), &[b'x' as u32, REPLACEMENT]);
        assert_eq!(decoder.consumed(), 2);
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_pending_sequence_interrupted_by_escape_next_call() {
        let mut decoder = Utf8Decoder::new();
        decoder.decode_to_esc(&[0xE4]);
        assert!(decoder.is_pending());
        assert!(decoder.decode_to_esc(&[ESC, b'c']));
        assert_eq!(decoder.output(), &[REPLACEMENT]);
        assert_eq!(decoder.consumed(), 0);
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_output_capacity_limits_progress() {
        let input = "x".repeat(150);
        let mut decoder = Utf8Decoder::new();
        assert!(!decoder.decode_to_esc(input.as_bytes()));
        assert_eq!(decoder.output().len(), OUTPUT_CAPACITY);
        assert_eq!(decoder.consumed(), OUTPUT_CAPACITY);

        let mut offset = decoder.consumed();
        let mut total = decoder.output().len();
        while offset < input.len() {
            decoder.decode_to_esc(&input.as_bytes()[offset..]);
            offset += decoder.consumed();
            total += decoder.output().len();
        }
        assert_eq!(total, 150);
    }

    #[test]
    fn test_capacity_with_multibyte_input() {
        let input = "中".repeat(70);
        let mut decoder = Utf8Decoder::new();
        decoder.decode_to_esc(input.as_bytes());
        assert_eq!(decoder.output().len(), OUTPUT_CAPACITY);
        assert_eq!(decoder.consumed(), OUTPUT_CAPACITY * 3);
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_replacement_on_last_slot_defers_byte() {
        // 63 ASCII bytes, a truncated sequence and one more ASCII byte: the
        // replacement takes the last slot and 'z' waits for the next call.
        let mut input = vec![b'a'; 63];
        input.extend_from_slice(&[0xC3, b'z']);
        let mut decoder = Utf8Decoder::new();
        decoder.decode_to_esc(&input);
        assert_eq!(decoder.output().len(), OUTPUT_CAPACITY);
        assert_eq!(decoder.output()[63], REPLACEMENT);
        assert_eq!(decoder.consumed(), 64);

        decoder.decode_to_esc(&input[64..]);
        assert_eq!(decoder.output(), &[b'z' as u32]);
    }

    #[test]
    fn test_empty_input() {
        let (out, consumed, esc) = decode_all(b"");
        assert!(out.is_empty());
        assert_eq!(consumed, 0);
        assert!(!esc);
    }

    #[test]
    fn test_reset() {
        let mut decoder = Utf8Decoder::new();
        decoder.decode_to_esc(&[0xC3]);
        assert!(decoder.is_pending());
        decoder.reset();
        assert!(!decoder.is_pending());
        decoder.decode_to_esc(&[0xA9]);
        assert_eq!(decoder.output(), &[REPLACEMENT]);
    }

    #[test]
    fn test_chars() {
        let mut decoder = Utf8Decoder::new();
        decoder.decode_to_esc("héllo 😀".as_bytes());
        assert_eq!(decoder.chars().collect::<String>(), "héllo 😀");
    }

    #[test]
    fn test_every_level_decodes_the_same() {
        let input = "plain ascii, then ünïcödé, 中文, emoji 😀😎 and \x07 controls".repeat(3);
        let expected: Vec<u32> = input.chars().map(u32::from).collect();
        for level in SimdLevel::available() {
            let mut decoder = Utf8Decoder::with_level(level);
            let mut out = Vec::new();
            let mut offset = 0;
            while offset < input.len() {
                decoder.decode_to_esc(&input.as_bytes()[offset..]);
                offset += decoder.consumed();
                out.extend_from_slice(decoder.output());
            }
            assert_eq!(out, expected, "{level}");
        }
    }
}
