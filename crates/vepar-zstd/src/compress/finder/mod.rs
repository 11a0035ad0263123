//! LZ77 match finders for the Zstd encoder.
//!
//! Every finder parses the current block (the tail of a [`History`]) into
//! literals and sequences. Tables hold biased absolute positions, so a zero
//! entry is always out of range and dropping history only moves the bias.
//!
//! | Level | Finder | Tables |
//! |-------|--------|--------|
//! | L1 | [`FastFinder`] | hash4, 2^16 entries |
//! | L2 | [`FastFinder`] | hash4, 2^18 entries |
//! | L3 | [`ChainedFinder`] | hash4, current + previous per slot |
//! | L4 | [`DoubleFinder`] | short hash4 + long hash7 |
//! | L5 | [`DoubleFinder`] | L4 plus a short-table chain |
//! | L6 | [`BestFinder`] | two-entry long table, short table, global chain |

mod best;
mod chained;
mod double;
mod fast;

pub use best::BestFinder;
pub use chained::ChainedFinder;
pub use double::DoubleFinder;
pub use fast::FastFinder;

use vepar_core::token::ZSTD_MAX_MATCH;
use vepar_core::{Sequence, SequenceBlock};
use vepar_simd::Accel;

use super::ZstdLevel;
use crate::block::RepeatOffsets;

/// Bias values above this are folded back into the tables.
const BIAS_LIMIT: u32 = 1 << 30;

/// Bytes a finder may read past a search position.
pub(crate) const INPUT_MARGIN: usize = 8;

/// Blocks shorter than this are emitted as literals.
pub(crate) const MIN_BLOCK_FOR_MATCHES: usize = 16;

/// Shortest match a hash lookup accepts.
pub(crate) const MIN_MATCH: usize = 4;

/// Encoder history: up to `window` bytes of earlier blocks followed by the
/// block being parsed.
#[derive(Debug)]
pub struct History {
    buf: Vec<u8>,
    bias: u32,
    window: usize,
}

impl History {
    /// Empty history for `window` bytes of back-references.
    pub fn new(window: usize) -> Self {
        Self {
            buf: Vec::new(),
            bias: window as u32,
            window,
        }
    }

    /// The history bytes, current block last.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Largest offset a match may use.
    #[inline]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Table entry for position `s`.
    #[inline]
    pub(crate) fn entry(&self, s: usize) -> u32 {
        s as u32 + self.bias
    }

    /// Position an entry points at, if it is usable from `s`.
    #[inline]
    pub(crate) fn candidate(&self, entry: u32, s: usize) -> Option<usize> {
        let t = entry.checked_sub(self.bias)? as usize;
        if t >= s || s - t > self.window {
            return None;
        }
        Some(t)
    }

    /// Append a block, returning its start index and, if the tables must
    /// be rebased, the amount to subtract from every entry.
    pub fn append(&mut self, block: &[u8]) -> (usize, Option<u32>) {
        let mut rebase = None;
        if self.buf.len() + block.len() > 2 * self.window.max(block.len()) {
            let drop = self.buf.len().saturating_sub(self.window);
            if drop > 0 {
                self.buf.drain(..drop);
                self.bias += drop as u32;
                tracing::trace!(drop, bias = self.bias, "shifted encoder history");
                rebase = self.fold_bias();
            }
        }
        let start = self.buf.len();
        self.buf.extend_from_slice(block);
        (start, rebase)
    }

    /// Forget all history. Entries already in the tables go out of range.
    pub fn reset(&mut self) -> Option<u32> {
        self.bias += self.buf.len() as u32 + self.window as u32;
        self.buf.clear();
        self.fold_bias()
    }

    fn fold_bias(&mut self) -> Option<u32> {
        if self.bias <= BIAS_LIMIT {
            return None;
        }
        let delta = self.bias - self.window as u32;
        self.bias = self.window as u32;
        Some(delta)
    }
}

/// Subtract `delta` from every entry, clearing entries that fall below it.
pub(crate) fn rebase_table(table: &mut [u32], delta: u32) {
    for e in table.iter_mut() {
        *e = e.saturating_sub(delta);
    }
}

/// A parser from block bytes to sequences.
pub trait MatchFinder: Send + std::fmt::Debug {
    /// Level this finder implements.
    fn level(&self) -> ZstdLevel;

    /// Parse `hist.bytes()[start..]` into `out`.
    ///
    /// `reps` is the register a decoder holds at the start of the block;
    /// finders check it for cheap repeat matches.
    fn find(&mut self, hist: &History, start: usize, reps: RepeatOffsets, out: &mut SequenceBlock);

    /// Subtract `delta` from all table entries.
    fn rebase(&mut self, delta: u32);
}

/// Finder for `level`.
pub fn finder_for(level: ZstdLevel, accel: Accel) -> Box<dyn MatchFinder> {
    match level {
        ZstdLevel::Fastest | ZstdLevel::Fast => Box::new(FastFinder::new(level, accel)),
        ZstdLevel::Chained => Box::new(ChainedFinder::new(accel)),
        ZstdLevel::Default => Box::new(DoubleFinder::new(false, accel)),
        ZstdLevel::Better => Box::new(DoubleFinder::new(true, accel)),
        ZstdLevel::Best => Box::new(BestFinder::new(accel)),
    }
}

#[inline]
pub(crate) fn load32(b: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]])
}

#[inline]
pub(crate) fn load64(b: &[u8], i: usize) -> u64 {
    u64::from_le_bytes([
        b[i],
        b[i + 1],
        b[i + 2],
        b[i + 3],
        b[i + 4],
        b[i + 5],
        b[i + 6],
        b[i + 7],
    ])
}

const PRIME_4: u32 = 2_654_435_761;
const PRIME_7: u64 = 58_295_818_150_454_627;
const PRIME_8: u64 = 0xCF1B_BCDC_B7A5_6463;

/// Hash of the low 4 bytes of `v` into `bits` bits.
#[inline]
pub(crate) fn hash4(v: u32, bits: u8) -> usize {
    (v.wrapping_mul(PRIME_4) >> (32 - bits)) as usize
}

/// Hash of the low 7 bytes of `v` into `bits` bits.
#[inline]
pub(crate) fn hash7(v: u64, bits: u8) -> usize {
    (((v << 8).wrapping_mul(PRIME_7)) >> (64 - bits)) as usize
}

/// Hash of all 8 bytes of `v` into `bits` bits.
#[inline]
pub(crate) fn hash8(v: u64, bits: u8) -> usize {
    (v.wrapping_mul(PRIME_8) >> (64 - bits)) as usize
}

/// Appends literals and sequences for one block, tracking the repeat
/// offsets a decoder will hold.
pub(crate) struct Emitter<'a> {
    src: &'a [u8],
    out: &'a mut SequenceBlock,
    reps: RepeatOffsets,
    accel: Accel,
    end: usize,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(
        hist: &'a History,
        out: &'a mut SequenceBlock,
        reps: RepeatOffsets,
        accel: Accel,
    ) -> Self {
        Self {
            src: hist.bytes(),
            out,
            reps,
            accel,
            end: hist.bytes().len(),
        }
    }

    /// Repeat offset `i` (0-based) as a distance.
    #[inline]
    pub(crate) fn rep(&self, i: usize) -> usize {
        self.reps.get()[i] as usize
    }

    /// Length of the match between `t` and `s`, capped at the block end.
    #[inline]
    pub(crate) fn match_len(&self, t: usize, s: usize) -> usize {
        let max = (self.end - s).min(ZSTD_MAX_MATCH as usize);
        self.accel.match_length(&self.src[t..], &self.src[s..self.end], max)
    }

    /// Length of a match at `offset` from `s`, or 0 if the offset reaches
    /// outside `[floor, s)`.
    #[inline]
    pub(crate) fn match_at(&self, s: usize, offset: usize, floor: usize, window: usize) -> usize {
        if offset == 0 || offset > s - floor || offset > window {
            return 0;
        }
        self.match_len(s - offset, s)
    }

    /// Extend a match at `(t, s)` backwards, never before `floor`.
    #[inline]
    pub(crate) fn extend_back(&self, mut t: usize, mut s: usize, floor: usize) -> (usize, usize) {
        while t > 0 && s > floor && self.src[t - 1] == self.src[s - 1] {
            t -= 1;
            s -= 1;
        }
        (t, s)
    }

    /// Emit literals `[lit_start, s)` and a match of `length` at `offset`.
    pub(crate) fn emit(&mut self, lit_start: usize, s: usize, offset: usize, length: usize) {
        debug_assert!(length >= 3 && offset >= 1);
        let lit_len = (s - lit_start) as u32;
        self.out.literals.extend_from_slice(&self.src[lit_start..s]);
        let value = self.reps.encode(offset as u32, lit_len);
        self.reps.resolve(value, lit_len);
        self.out
            .sequences
            .push(Sequence::new(lit_len, offset as u32, length as u32));
    }

    /// Emit the trailing literals `[lit_start, end)`.
    pub(crate) fn finish(self, lit_start: usize) {
        self.out
            .literals
            .extend_from_slice(&self.src[lit_start..self.end]);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use vepar_core::token::{replay, Token};

    /// Check offsets and lengths, then rebuild the block from `out`.
    pub(crate) fn check_parse(hist: &History, start: usize, out: &SequenceBlock) {
        let mut rebuilt = hist.bytes()[..start].to_vec();
        let mut pos = start;
        for seq in &out.sequences {
            pos += seq.lit_len as usize;
            assert!(seq.offset >= 1);
            assert!(seq.offset as usize <= pos, "offset past history");
            assert!(seq.offset as usize <= hist.window(), "offset past window");
            assert!(seq.match_len >= 3 && seq.match_len <= ZSTD_MAX_MATCH);
            pos += seq.match_len as usize;
        }
        let tokens: Vec<Token> = out.to_tokens();
        replay(&tokens, hist.window(), &mut rebuilt).unwrap();
        assert_eq!(rebuilt, hist.bytes());
    }

    pub(crate) fn corpus(len: usize, seed: u64) -> Vec<u8> {
        let words: [&[u8]; 8] = [
            b"the ", b"quick ", b"brown ", b"fox ", b"jumps ", b"over ", b"lazy ", b"dog. ",
        ];
        let mut x = seed | 1;
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            if x % 7 == 0 {
                out.push((x >> 24) as u8);
            } else {
                out.extend_from_slice(words[(x >> 32) as usize % words.len()]);
            }
        }
        out.truncate(len);
        out
    }

    #[test]
    fn test_history_shift_keeps_window() {
        let mut hist = History::new(1024);
        let block = vec![7u8; 700];
        for _ in 0..6 {
            let (start, rebase) = hist.append(&block);
            assert!(rebase.is_none());
            assert_eq!(&hist.bytes()[start..], block.as_slice());
            assert!(hist.bytes().len() <= 2 * 1024 + 700);
        }
    }

    #[test]
    fn test_candidate_bounds() {
        let mut hist = History::new(1024);
        hist.append(&[0u8; 100]);
        assert_eq!(hist.candidate(0, 50), None);
        assert_eq!(hist.candidate(hist.entry(10), 50), Some(10));
        assert_eq!(hist.candidate(hist.entry(50), 50), None);
        let stale = hist.entry(10);
        hist.reset();
        hist.append(&[0u8; 100]);
        assert_eq!(hist.candidate(stale, 50), None);
    }

    #[test]
    fn test_bias_folds() {
        let mut hist = History::new(1 << 20);
        let mut folded = false;
        for _ in 0..2000 {
            folded |= hist.reset().is_some();
        }
        assert!(folded);
        assert!(hist.bias <= BIAS_LIMIT);
    }

    #[test]
    fn test_rebase_table() {
        let mut table = [0u32, 5, 100, 1000];
        rebase_table(&mut table, 100);
        assert_eq!(table, [0, 0, 0, 900]);
    }

    #[test]
    fn test_every_level_parses_validly() {
        for level in ZstdLevel::ALL {
            let mut finder = finder_for(level, Accel::Native);
            assert_eq!(finder.level(), level);
            let mut hist = History::new(1 << 16);
            let data = corpus(150_000, 11);
            let mut reps = RepeatOffsets::new();
            for chunk in data.chunks(1 << 15) {
                let (start, rebase) = hist.append(chunk);
                if let Some(delta) = rebase {
                    finder.rebase(delta);
                }
                let mut out = SequenceBlock::new();
                finder.find(&hist, start, reps, &mut out);
                check_parse(&hist, start, &out);
                assert!(!out.sequences.is_empty(), "{level:?} found no matches");
                for seq in &out.sequences {
                    let v = reps.encode(seq.offset, seq.lit_len);
                    reps.resolve(v, seq.lit_len);
                }
            }
        }
    }

    #[test]
    fn test_portable_and_native_agree() {
        let data = corpus(40_000, 5);
        for level in ZstdLevel::ALL {
            let mut results = Vec::new();
            for accel in [Accel::Portable, Accel::Native] {
                let mut finder = finder_for(level, accel);
                let mut hist = History::new(1 << 16);
                let (start, _) = hist.append(&data);
                let mut out = SequenceBlock::new();
                finder.find(&hist, start, RepeatOffsets::new(), &mut out);
                results.push(out);
            }
            assert_eq!(results[0], results[1], "{level:?}");
        }
    }

    #[test]
    fn test_tiny_block_is_literals() {
        for level in ZstdLevel::ALL {
            let mut finder = finder_for(level, Accel::Native);
            let mut hist = History::new(1 << 16);
            let (start, _) = hist.append(b"abcabcabc");
            let mut out = SequenceBlock::new();
            finder.find(&hist, start, RepeatOffsets::new(), &mut out);
            assert!(out.sequences.is_empty());
            assert_eq!(out.literals, b"abcabcabc");
        }
    }
}
