//! Short/long table finder (levels 4 and 5).
//!
//! The long table hashes 7 bytes and finds the long matches that dominate
//! ratio on text and structured data; the short table hashes 4 bytes and
//! catches the rest. Level 5 adds a chain behind the short table so older
//! short candidates are still reachable.

use vepar_core::SequenceBlock;
use vepar_simd::Accel;

use super::{
    hash4, hash7, load32, load64, rebase_table, Emitter, History, MatchFinder, INPUT_MARGIN,
    MIN_BLOCK_FOR_MATCHES, MIN_MATCH,
};
use crate::block::RepeatOffsets;
use crate::compress::ZstdLevel;

const SHORT_BITS: u8 = 17;
const LONG_BITS: u8 = 19;
const CHAIN_LOG: u32 = 17;
const CHAIN_DEPTH: usize = 8;

/// Positions inside a match are indexed at this stride.
const INSERT_STRIDE: usize = 4;

#[derive(Debug)]
pub struct DoubleFinder {
    short: Vec<u32>,
    long: Vec<u32>,
    chain: Option<Vec<u32>>,
    accel: Accel,
}

impl DoubleFinder {
    /// Level 4 finder, or level 5 with `chained`.
    pub fn new(chained: bool, accel: Accel) -> Self {
        Self {
            short: vec![0; 1 << SHORT_BITS],
            long: vec![0; 1 << LONG_BITS],
            chain: chained.then(|| vec![0; 1 << CHAIN_LOG]),
            accel,
        }
    }

    fn insert(&mut self, src: &[u8], hist: &History, p: usize) {
        let entry = hist.entry(p);
        self.long[hash7(load64(src, p), LONG_BITS)] = entry;
        let h = hash4(load32(src, p), SHORT_BITS);
        let prev = std::mem::replace(&mut self.short[h], entry);
        if let Some(chain) = self.chain.as_mut() {
            chain[entry as usize & ((1 << CHAIN_LOG) - 1)] = prev;
        }
    }

    /// Best short candidate for `s`, walking the chain when present.
    fn best_short(&self, e: &Emitter<'_>, hist: &History, head: u32, s: usize) -> Option<(usize, usize)> {
        let src = hist.bytes();
        let cv = load32(src, s);
        let mut best: Option<(usize, usize)> = None;
        let mut entry = head;
        let depth = if self.chain.is_some() { CHAIN_DEPTH } else { 1 };
        for _ in 0..depth {
            let Some(t) = hist.candidate(entry, s) else {
                break;
            };
            if load32(src, t) == cv {
                let len = e.match_len(t, s);
                if best.map_or(true, |(_, l)| len > l) {
                    best = Some((t, len));
                }
            }
            let Some(chain) = self.chain.as_ref() else {
                break;
            };
            let next = chain[entry as usize & ((1 << CHAIN_LOG) - 1)];
            // Slots are shared by positions a chain length apart; only
            // strictly older links are followed.
            if next >= entry {
                break;
            }
            entry = next;
        }
        best
    }
}

impl MatchFinder for DoubleFinder {
    fn level(&self) -> ZstdLevel {
        if self.chain.is_some() {
            ZstdLevel::Better
        } else {
            ZstdLevel::Default
        }
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
        let mut next_emit = start;
        let mut s = start;

        while s < s_limit {
            let rep = e.rep(0);
            let rep_len = if s + 1 < s_limit {
                e.match_at(s + 1, rep, 0, window)
            } else {
                0
            };
            let hl = hash7(load64(src, s), LONG_BITS);
            let long_cand = self.long[hl];
            let short_head = self.short[hash4(load32(src, s), SHORT_BITS)];
            self.insert(src, hist, s);

            let (t, ms, length) = if rep_len >= MIN_MATCH {
                let (t, ms) = e.extend_back(s + 1 - rep, s + 1, next_emit);
                (t, ms, rep_len + (s + 1 - ms))
            } else if let Some(t) = hist
                .candidate(long_cand, s)
                .filter(|&t| load64(src, t) == load64(src, s))
            {
                let len = e.match_len(t, s);
                let (t, ms) = e.extend_back(t, s, next_emit);
                (t, ms, len + (s - ms))
            } else if let Some((t, len)) = self.best_short(&e, hist, short_head, s) {
                // A long match one byte later usually beats a short one here.
                let s1 = s + 1;
                let h1 = hash7(load64(src, s1), LONG_BITS);
                let next = self.long[h1];
                self.long[h1] = hist.entry(s1);
                let ahead = hist
                    .candidate(next, s1)
                    .filter(|&t1| load64(src, t1) == load64(src, s1))
                    .map(|t1| (t1, e.match_len(t1, s1)));
                match ahead {
                    Some((t1, len1)) if len1 > len => {
                        let (t1, ms) = e.extend_back(t1, s1, next_emit);
                        (t1, ms, len1 + (s1 - ms))
                    }
                    _ => {
                        let (t, ms) = e.extend_back(t, s, next_emit);
                        (t, ms, len + (s - ms))
                    }
                }
            } else {
                s += 1 + ((s - next_emit) >> 7);
                continue;
            };

            e.emit(next_emit, ms, ms - t, length);
            let match_end = ms + length;
            let last = match_end.min(s_limit);
            let mut p = s + 1;
            while p < last {
                self.insert(src, hist, p);
                p += INSERT_STRIDE;
            }
            if match_end >= 2 && match_end - 2 > s && match_end - 2 < s_limit {
                self.insert(src, hist, match_end - 2);
            }
            s = match_end;
            next_emit = s;
        }
        e.finish(next_emit);
    }

    fn rebase(&mut self, delta: u32) {
        rebase_table(&mut self.short, delta);
        rebase_table(&mut self.long, delta);
        if let Some(chain) = self.chain.as_mut() {
            chain.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::finder::tests::{check_parse, corpus};

    fn parse(finder: &mut DoubleFinder, data: &[u8]) -> SequenceBlock {
        let mut hist = History::new(1 << 17);
        let (start, _) = hist.append(data);
        let mut out = SequenceBlock::new();
        finder.find(&hist, start, RepeatOffsets::new(), &mut out);
        check_parse(&hist, start, &out);
        out
    }

    #[test]
    fn test_levels() {
        assert_eq!(DoubleFinder::new(false, Accel::Native).level(), ZstdLevel::Default);
        assert_eq!(DoubleFinder::new(true, Accel::Native).level(), ZstdLevel::Better);
    }

    #[test]
    fn test_long_match_preferred() {
        let mut data = b"abcd1234567890XYZ".to_vec();
        data.extend_from_slice(b"abcdQ");
        data.extend_from_slice(b"abcd1234567890XYZ");
        data.extend_from_slice(b"________");
        let out = parse(&mut DoubleFinder::new(false, Accel::Native), &data);
        assert!(out
            .sequences
            .iter()
            .any(|seq| seq.offset == 22 && seq.match_len >= 17));
    }

    #[test]
    fn test_chain_does_not_lose_matches() {
        let data = corpus(60_000, 17);
        let plain = parse(&mut DoubleFinder::new(false, Accel::Native), &data);
        let chained = parse(&mut DoubleFinder::new(true, Accel::Native), &data);
        assert!(chained.literals.len() <= plain.literals.len() + plain.literals.len() / 4);
    }
}
