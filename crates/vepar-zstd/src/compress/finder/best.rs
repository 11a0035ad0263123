//! Scored, lazily committed finder (level 6).

use vepar_core::SequenceBlock;
use vepar_simd::Accel;

use super::{
    hash4, hash8, load32, load64, rebase_table, Emitter, History, MatchFinder, INPUT_MARGIN,
    MIN_BLOCK_FOR_MATCHES, MIN_MATCH,
};
use crate::block::RepeatOffsets;
use crate::compress::ZstdLevel;

const LONG_BITS: u8 = 20;
const SHORT_BITS: u8 = 18;
const CHAIN_LOG: u32 = 22;
const CHAIN_MASK: usize = (1 << CHAIN_LOG) - 1;
const CHAIN_DEPTH: usize = 16;

/// A scored match candidate.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    start: usize,
    source: usize,
    len: usize,
    score: i64,
}

impl Candidate {
    /// Bytes covered, minus literals skipped before `start`, minus an
    /// estimate of the offset's extra bits when it is not a repeat.
    fn new(base: usize, start: usize, source: usize, len: usize, repeat: bool) -> Self {
        let offset = (start - source) as u32;
        let penalty = if repeat {
            0
        } else {
            (32 - offset.leading_zeros()) as i64 / 4
        };
        Self {
            start,
            source,
            len,
            score: len as i64 - (start - base) as i64 - penalty,
        }
    }
}

/// Highest-ratio finder.
///
/// The long table keeps two entries per slot, the short table one, and a
/// chain of 2^22 links extends every short bucket into older history.
/// Repeat offsets are tried one and three bytes ahead, and a match is only
/// committed after checking whether the next position scores better.
#[derive(Debug)]
pub struct BestFinder {
    long: Vec<[u32; 2]>,
    short: Vec<u32>,
    chain: Vec<u32>,
    accel: Accel,
}

impl BestFinder {
    pub fn new(accel: Accel) -> Self {
        Self {
            long: vec![[0; 2]; 1 << LONG_BITS],
            short: vec![0; 1 << SHORT_BITS],
            chain: vec![0; 1 << CHAIN_LOG],
            accel,
        }
    }

    fn insert(&mut self, src: &[u8], hist: &History, p: usize) {
        let entry = hist.entry(p);
        let slot = &mut self.long[hash8(load64(src, p), LONG_BITS)];
        slot[1] = slot[0];
        slot[0] = entry;
        let h = hash4(load32(src, p), SHORT_BITS);
        self.chain[entry as usize & CHAIN_MASK] = std::mem::replace(&mut self.short[h], entry);
    }

    fn search(&self, e: &Emitter<'_>, hist: &History, s: usize, base: usize) -> Option<Candidate> {
        let src = hist.bytes();
        let window = hist.window();
        let mut best: Option<Candidate> = None;
        let mut consider = |c: Candidate| {
            if best.map_or(true, |b| c.score > b.score) {
                best = Some(c);
            }
        };

        for (ahead, reps) in [(1usize, 3usize), (3, 1)] {
            let p = s + ahead;
            if p >= src.len() - INPUT_MARGIN {
                continue;
            }
            for i in 0..reps {
                let offset = e.rep(i);
                let len = e.match_at(p, offset, 0, window);
                if len >= MIN_MATCH {
                    consider(Candidate::new(base, p, p - offset, len, true));
                }
            }
        }

        for entry in self.long[hash8(load64(src, s), LONG_BITS)] {
            if let Some(t) = hist.candidate(entry, s) {
                if load64(src, t) == load64(src, s) {
                    consider(Candidate::new(base, s, t, e.match_len(t, s), false));
                }
            }
        }

        let cv = load32(src, s);
        let mut entry = self.short[hash4(cv, SHORT_BITS)];
        for _ in 0..CHAIN_DEPTH {
            let Some(t) = hist.candidate(entry, s) else {
                break;
            };
            if load32(src, t) == cv {
                consider(Candidate::new(base, s, t, e.match_len(t, s), false));
            }
            let next = self.chain[entry as usize & CHAIN_MASK];
            if next >= entry {
                break;
            }
            entry = next;
        }
        best
    }
}

impl MatchFinder for BestFinder {
    fn level(&self) -> ZstdLevel {
        ZstdLevel::Best
    }

    fn find(&mut self, hist: &History, start: usize, reps: RepeatOffsets, out: &mut SequenceBlock) {
        let src = hist.bytes();
        let end = src.len();
        let mut e = Emitter::new(hist, out, reps, self.accel);
        if end - start < MIN_BLOCK_FOR_MATCHES {
            e.finish(start);
            return;
        }

        let s_limit = end - INPUT_MARGIN;
        let mut next_emit = start;
        let mut s = start;
        let mut inserted = start;

        while s < s_limit {
            let found = self.search(&e, hist, s, s);
            while inserted <= s {
                self.insert(src, hist, inserted);
                inserted += 1;
            }
            let Some(mut best) = found else {
                s += 1 + ((s - next_emit) >> 8);
                continue;
            };

            if best.start == s && s + 1 < s_limit {
                if let Some(next) = self.search(&e, hist, s + 1, s) {
                    if next.score > best.score {
                        tracing::trace!(pos = s, gain = next.score - best.score, "lazy match");
                        best = next;
                    }
                }
            }

            let (t, ms) = e.extend_back(best.source, best.start, next_emit);
            let length = best.len + (best.start - ms);
            e.emit(next_emit, ms, ms - t, length);
            s = ms + length;
            next_emit = s;
            while inserted < s.min(s_limit) {
                self.insert(src, hist, inserted);
                inserted += 1;
            }
        }
        e.finish(next_emit);
    }

    fn rebase(&mut self, delta: u32) {
        for slot in self.long.iter_mut() {
            slot[0] = slot[0].saturating_sub(delta);
            slot[1] = slot[1].saturating_sub(delta);
        }
        rebase_table(&mut self.short, delta);
        self.chain.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::finder::tests::{check_parse, corpus};
    use crate::compress::finder::DoubleFinder;

    #[test]
    fn test_offset_penalty() {
        let near = Candidate::new(100, 100, 99, 8, false);
        let far = Candidate::new(70_100, 70_100, 100, 8, false);
        // 17-bit offset costs 4.
        assert_eq!(near.score, 8);
        assert_eq!(far.score, 4);
        assert!(near.score > far.score);
    }

    #[test]
    fn test_skipped_literals_and_repeats() {
        let rep = Candidate::new(70_100, 70_100, 100, 8, true);
        assert_eq!(rep.score, 8);

        let skipped = Candidate::new(0, 3, 1, 8, true);
        assert_eq!(skipped.score, 5);

        // Two literals ahead of a distant match.
        let late = Candidate::new(70_098, 70_100, 100, 8, false);
        assert_eq!(late.score, 2);
    }

    #[test]
    fn test_lazy_prefers_longer_next_match() {
        // At "Xabcdefghij" the short hash of "Xabc" finds a 4-byte match; one
        // byte later "abcdefghij" matches in full.
        let mut data = b"Xabc----abcdefghijklmnop====".to_vec();
        data.extend_from_slice(b"Xabcdefghijklmnop");
        data.extend_from_slice(b"########");
        let mut finder = BestFinder::new(Accel::Native);
        let mut hist = History::new(1 << 16);
        let (start, _) = hist.append(&data);
        let mut out = SequenceBlock::new();
        finder.find(&hist, start, RepeatOffsets::new(), &mut out);
        check_parse(&hist, start, &out);
        assert!(out
            .sequences
            .iter()
            .any(|seq| seq.offset == 21 && seq.match_len == 16));
    }

    #[test]
    fn test_fewer_literals_than_double_finder() {
        let data = corpus(80_000, 23);
        let mut hist = History::new(1 << 17);
        let (start, _) = hist.append(&data);

        let mut best = SequenceBlock::new();
        BestFinder::new(Accel::Native).find(&hist, start, RepeatOffsets::new(), &mut best);
        check_parse(&hist, start, &best);

        let mut double = SequenceBlock::new();
        DoubleFinder::new(false, Accel::Native).find(&hist, start, RepeatOffsets::new(), &mut double);
        assert!(best.literals.len() <= double.literals.len() + double.literals.len() / 10);
    }
}
