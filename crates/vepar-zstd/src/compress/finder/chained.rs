//! Two-entry bucket finder (level 3).

use vepar_core::SequenceBlock;
use vepar_simd::Accel;

use super::{
    hash4, load32, rebase_table, Emitter, History, MatchFinder, INPUT_MARGIN,
    MIN_BLOCK_FOR_MATCHES, MIN_MATCH,
};
use crate::block::RepeatOffsets;
use crate::compress::ZstdLevel;

const HASH_BITS: u8 = 17;

/// Each slot keeps the latest position and the one it displaced.
#[derive(Debug)]
pub struct ChainedFinder {
    current: Vec<u32>,
    previous: Vec<u32>,
    accel: Accel,
}

impl ChainedFinder {
    pub fn new(accel: Accel) -> Self {
        Self {
            current: vec![0; 1 << HASH_BITS],
            previous: vec![0; 1 << HASH_BITS],
            accel,
        }
    }

    #[inline]
    fn insert(&mut self, h: usize, entry: u32) {
        self.previous[h] = self.current[h];
        self.current[h] = entry;
    }
}

impl MatchFinder for ChainedFinder {
    fn level(&self) -> ZstdLevel {
        ZstdLevel::Chained
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
        let mut misses = 0usize;

        while s < s_limit {
            let rep = e.rep(0);
            let rep_len = if s + 1 < s_limit {
                e.match_at(s + 1, rep, 0, window)
            } else {
                0
            };
            let cv = load32(src, s);
            let h = hash4(cv, HASH_BITS);
            let candidates = [self.current[h], self.previous[h]];
            self.insert(h, hist.entry(s));

            let (ms, offset, length) = if rep_len >= MIN_MATCH {
                let (_, ms) = e.extend_back(s + 1 - rep, s + 1, next_emit);
                (ms, rep, rep_len + (s + 1 - ms))
            } else {
                // The newer entry wins ties; a mismatch falls through to the
                // older one.
                let mut best: Option<(usize, usize)> = None;
                for entry in candidates {
                    let Some(t) = hist.candidate(entry, s) else {
                        continue;
                    };
                    if load32(src, t) != cv {
                        continue;
                    }
                    let len = e.match_len(t, s);
                    if best.map_or(true, |(_, l)| len > l) {
                        best = Some((t, len));
                    }
                }
                match best {
                    Some((t, len)) => {
                        let (t, ms) = e.extend_back(t, s, next_emit);
                        (ms, ms - t, len + (s - ms))
                    }
                    None => {
                        misses += 1;
                        s += 1 + (misses >> 5);
                        continue;
                    }
                }
            };

            misses = 0;
            e.emit(next_emit, ms, offset, length);
            let match_end = ms + length;
            let mut p = s + 1;
            while p < match_end.min(s_limit) {
                self.insert(hash4(load32(src, p), HASH_BITS), hist.entry(p));
                p += 1;
            }
            s = match_end;
            next_emit = s;
        }
        e.finish(next_emit);
    }

    fn rebase(&mut self, delta: u32) {
        rebase_table(&mut self.current, delta);
        rebase_table(&mut self.previous, delta);
    }
}
