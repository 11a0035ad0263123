//! Single-table greedy finder (levels 1 and 2).

use vepar_core::SequenceBlock;
use vepar_simd::Accel;

use super::{
    hash4, load32, rebase_table, Emitter, History, MatchFinder, INPUT_MARGIN,
    MIN_BLOCK_FOR_MATCHES, MIN_MATCH,
};
use crate::block::RepeatOffsets;
use crate::compress::ZstdLevel;

/// Greedy parser over one hash4 table.
///
/// Every searched position is written to the table. After a match the
/// positions it covers are indexed too, so the next block can still find
/// them.
#[derive(Debug)]
pub struct FastFinder {
    table: Vec<u32>,
    hash_bits: u8,
    skip_log: u32,
    level: ZstdLevel,
    accel: Accel,
}

impl FastFinder {
    /// Finder for [`ZstdLevel::Fastest`] (2^16 entries) or any other level
    /// (2^18 entries).
    pub fn new(level: ZstdLevel, accel: Accel) -> Self {
        let (hash_bits, skip_log) = match level {
            ZstdLevel::Fastest => (16, 5),
            _ => (18, 6),
        };
        Self {
            table: vec![0; 1 << hash_bits],
            hash_bits,
            skip_log,
            level,
            accel,
        }
    }

    /// Number of table slots.
    pub fn table_size(&self) -> usize {
        self.table.len()
    }
}

impl MatchFinder for FastFinder {
    fn level(&self) -> ZstdLevel {
        self.level
    }

    fn find(&mut self, hist: &History, start: usize, reps: RepeatOffsets, out: &mut SequenceBlock) {
        let src = hist.bytes();
        let end = src.len();
        let window = hist.window();
        let mut e = Emitter::new(hist, out, reps, self.accel);
        if end - start < MIN_BLOCK_FOR_MATCHES {
            e.finish(start);
            return;
        }

        let s_limit = end - INPUT_MARGIN;
        let bits = self.hash_bits;
        let mut next_emit = start;
        let mut s = start;

        while s < s_limit {
            let rep = e.rep(0);
            let rep_len = if s + 1 < s_limit {
                e.match_at(s + 1, rep, 0, window)
            } else {
                0
            };
            let h = hash4(load32(src, s), bits);
            let cand = self.table[h];
            self.table[h] = hist.entry(s);

            let (ms, offset, length) = if rep_len >= MIN_MATCH {
                let (_, ms) = e.extend_back(s + 1 - rep, s + 1, next_emit);
                (ms, rep, rep_len + (s + 1 - ms))
            } else {
                match hist.candidate(cand, s) {
                    Some(t) if load32(src, t) == load32(src, s) => {
                        let len = e.match_len(t, s);
                        let (t, ms) = e.extend_back(t, s, next_emit);
                        (ms, ms - t, len + (s - ms))
                    }
                    _ => {
                        s += 1 + ((s - next_emit) >> self.skip_log);
                        continue;
                    }
                }
            };

            e.emit(next_emit, ms, offset, length);
            let match_end = ms + length;
            let mut p = s + 1;
            while p < match_end.min(s_limit) {
                self.table[hash4(load32(src, p), bits)] = hist.entry(p);
                p += 1;
            }
            s = match_end;
            next_emit = s;
        }
        e.finish(next_emit);
    }

    fn rebase(&mut self, delta: u32) {
        rebase_table(&mut self.table, delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::finder::tests::{check_parse, corpus};

    #[test]
    fn test_table_sizes() {
        assert_eq!(FastFinder::new(ZstdLevel::Fastest, Accel::Native).table_size(), 1 << 16);
        assert_eq!(FastFinder::new(ZstdLevel::Fast, Accel::Native).table_size(), 1 << 18);
    }

    #[test]
    fn test_finds_repeated_phrase() {
        let mut finder = FastFinder::new(ZstdLevel::Fastest, Accel::Native);
        let mut hist = History::new(1 << 16);
        let mut data = b"0123456789abcdefghij".to_vec();
        data.extend_from_slice(b"0123456789abcdefghij");
        data.extend_from_slice(b"--------");
        let (start, _) = hist.append(&data);
        let mut out = SequenceBlock::new();
        finder.find(&hist, start, RepeatOffsets::new(), &mut out);
        check_parse(&hist, start, &out);
        assert_eq!(out.sequences[0].offset, 20);
        assert!(out.sequences[0].match_len >= 20);
    }

    #[test]
    fn test_matches_reach_previous_block() {
        let mut finder = FastFinder::new(ZstdLevel::Fast, Accel::Native);
        let mut hist = History::new(1 << 16);
        let data = corpus(4096, 3);
        let (start, _) = hist.append(&data);
        let mut out = SequenceBlock::new();
        finder.find(&hist, start, RepeatOffsets::new(), &mut out);

        let (start, _) = hist.append(&data);
        out.reset();
        finder.find(&hist, start, RepeatOffsets::new(), &mut out);
        check_parse(&hist, start, &out);
        assert!(out.literals.len() < 256);
    }
}
