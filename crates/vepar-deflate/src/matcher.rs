//! Hash-chain match finder over a 32 KiB sliding window.
//!
//! The window buffer holds up to two window sizes of input. Positions are
//! indexes into that buffer; the hash tables store them biased by
//! `hash_offset`, so sliding the buffer or forgetting all history is a
//! single addition instead of a table rewrite.

use tracing::trace;
use vepar_core::token::{DEFLATE_MAX_MATCH, MIN_MATCH};
use vepar_simd::Accel;

use crate::tokens::TokenBuffer;

/// LZ77 window of DEFLATE.
pub const WINDOW_SIZE: usize = 32 * 1024;

const HASH_BITS: u32 = 17;
const HASH_SIZE: usize = 1 << HASH_BITS;
const HASH_MASK: u32 = HASH_SIZE as u32 - 1;
/// Bytes hashed per position.
const HASH_BYTES: usize = 4;
/// Input kept back while more is expected, so every match can reach full length.
const MIN_LOOKAHEAD: usize = DEFLATE_MAX_MATCH as usize + HASH_BYTES;
/// Three-byte matches further back than this cost more than literals.
const TOO_FAR: usize = 4096;
const INSERT_BATCH: usize = 256;
const RENORMALIZE_AT: u32 = 1 << 30;

/// Search parameters of one compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelParams {
    /// Shorten the chain walk once a match this long is in hand.
    pub good: u32,
    /// Skip the lazy search after a match this long.
    pub lazy: u32,
    /// Stop searching at a match this long.
    pub nice: u32,
    /// Hash chain steps per search.
    pub chain: u32,
    /// Greedy levels hash the inside of matches up to this length.
    pub insert_limit: u32,
}

const LAZY: u32 = u32::MAX;

const LEVELS: [LevelParams; 9] = [
    LevelParams { good: 4, lazy: 0, nice: 8, chain: 4, insert_limit: 4 },
    LevelParams { good: 4, lazy: 0, nice: 16, chain: 8, insert_limit: 5 },
    LevelParams { good: 4, lazy: 0, nice: 32, chain: 32, insert_limit: 6 },
    LevelParams { good: 4, lazy: 4, nice: 16, chain: 16, insert_limit: LAZY },
    LevelParams { good: 8, lazy: 16, nice: 32, chain: 32, insert_limit: LAZY },
    LevelParams { good: 8, lazy: 16, nice: 128, chain: 128, insert_limit: LAZY },
    LevelParams { good: 8, lazy: 32, nice: 128, chain: 256, insert_limit: LAZY },
    LevelParams { good: 32, lazy: 128, nice: 258, chain: 1024, insert_limit: LAZY },
    LevelParams { good: 32, lazy: 258, nice: 258, chain: 4096, insert_limit: LAZY },
];

impl LevelParams {
    /// Parameters of levels 1 to 9; other values are clamped.
    pub fn for_level(level: i32) -> Self {
        LEVELS[(level.clamp(1, 9) - 1) as usize]
    }

    pub fn is_lazy(&self) -> bool {
        self.insert_limit == LAZY
    }
}

/// How input turns into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Literals only, written as stored blocks.
    Stored,
    /// Literals only, Huffman coded.
    HuffmanOnly,
    /// First match found wins.
    Greedy(LevelParams),
    /// A match is deferred while the next position might do better.
    Lazy(LevelParams),
}

impl Strategy {
    pub fn for_level(level: i32) -> Self {
        match level {
            i32::MIN..=-1 => Strategy::HuffmanOnly,
            0 => Strategy::Stored,
            _ => {
                let params = LevelParams::for_level(level);
                if params.is_lazy() {
                    Strategy::Lazy(params)
                } else {
                    Strategy::Greedy(params)
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct Matcher {
    strategy: Strategy,
    accel: Accel,
    window: Vec<u8>,
    head: Vec<u32>,
    prev: Vec<u32>,
    hash_offset: u32,
    /// Next position to tokenize.
    pos: usize,
    /// First position not yet written out in a block.
    block_start: usize,
    prev_len: usize,
    prev_dist: usize,
    match_available: bool,
}

impl Matcher {
    pub fn new(strategy: Strategy, accel: Accel) -> Self {
        Self {
            strategy,
            accel,
            window: Vec::with_capacity(2 * WINDOW_SIZE),
            head: vec![0; HASH_SIZE],
            prev: vec![0; WINDOW_SIZE],
            hash_offset: 1,
            pos: 0,
            block_start: 0,
            prev_len: 0,
            prev_dist: 0,
            match_available: false,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.head.fill(0);
        self.prev.fill(0);
        self.hash_offset = 1;
        self.pos = 0;
        self.block_start = 0;
        self.clear_pending();
    }

    fn clear_pending(&mut self) {
        self.prev_len = 0;
        self.prev_dist = 0;
        self.match_available = false;
    }

    /// Copy as much of `input` as fits into the window.
    pub fn fill(&mut self, input: &[u8]) -> usize {
        let n = (2 * WINDOW_SIZE - self.window.len()).min(input.len());
        self.window.extend_from_slice(&input[..n]);
        n
    }

    pub fn is_full(&self) -> bool {
        self.window.len() == 2 * WINDOW_SIZE
    }

    /// Whether the oldest window of input has been written out.
    pub fn can_slide(&self) -> bool {
        self.block_start >= WINDOW_SIZE
    }

    /// Drop the oldest window of input.
    pub fn slide(&mut self) {
        debug_assert!(self.can_slide() && self.pos >= WINDOW_SIZE);
        self.window.drain(..WINDOW_SIZE);
        self.pos -= WINDOW_SIZE;
        self.block_start -= WINDOW_SIZE;
        self.advance_offset(WINDOW_SIZE as u32);
        trace!(hash_offset = self.hash_offset, "window slid");
    }

    /// Invalidate every hash entry so no later match reaches back past here.
    pub fn forget_history(&mut self) {
        self.advance_offset(self.window.len() as u32);
        self.clear_pending();
    }

    fn advance_offset(&mut self, by: u32) {
        self.hash_offset += by;
        if self.hash_offset > RENORMALIZE_AT {
            let sub = self.hash_offset - 1;
            for entry in self.head.iter_mut().chain(self.prev.iter_mut()) {
                *entry = entry.saturating_sub(sub);
            }
            self.hash_offset = 1;
        }
    }

    /// Input bytes of the current block.
    pub fn block_bytes(&self, covered: usize) -> &[u8] {
        &self.window[self.block_start..self.block_start + covered]
    }

    pub fn consume_block(&mut self, covered: usize) {
        self.block_start += covered;
    }

    /// Tokenize buffered input. Returns `true` when `tokens` filled up and
    /// must be written before continuing; `flush` processes every byte
    /// instead of keeping a lookahead back.
    pub fn advance(&mut self, tokens: &mut TokenBuffer, flush: bool) -> bool {
        match self.strategy {
            Strategy::Stored | Strategy::HuffmanOnly => self.literals(tokens),
            Strategy::Greedy(params) => self.greedy(tokens, params, flush),
            Strategy::Lazy(params) => self.lazy(tokens, params, flush),
        }
    }

    fn literals(&mut self, tokens: &mut TokenBuffer) -> bool {
        while self.pos < self.window.len() {
            if tokens.is_full() {
                return true;
            }
            tokens.push_literal(self.window[self.pos]);
            self.pos += 1;
        }
        false
    }

    fn limit(&self, flush: bool) -> usize {
        if flush {
            self.window.len()
        } else {
            self.window.len().saturating_sub(MIN_LOOKAHEAD)
        }
    }

    fn greedy(&mut self, tokens: &mut TokenBuffer, params: LevelParams, flush: bool) -> bool {
        let end = self.window.len();
        let limit = self.limit(flush);
        while self.pos < limit {
            if tokens.is_full() {
                return true;
            }
            let i = self.pos;
            let (len, dist) = if i + HASH_BYTES <= end {
                let candidate = self.insert(i);
                self.longest_match(i, candidate, 0, params)
            } else {
                (0, 0)
            };

            if len >= MIN_MATCH as usize {
                tokens.push_match(len as u32, dist as u32);
                if len as u32 <= params.insert_limit {
                    self.insert_range(i + 1, i + len);
                }
                self.pos = i + len;
            } else {
                tokens.push_literal(self.window[i]);
                self.pos = i + 1;
            }
        }
        false
    }

    fn lazy(&mut self, tokens: &mut TokenBuffer, params: LevelParams, flush: bool) -> bool {
        let end = self.window.len();
        let limit = self.limit(flush);
        while self.pos < limit {
            if tokens.is_full() {
                return true;
            }
            let i = self.pos;
            let (mut cur_len, mut cur_dist) = (0, 0);
            if i + HASH_BYTES <= end {
                let candidate = self.insert(i);
                if (self.prev_len as u32) < params.lazy {
                    (cur_len, cur_dist) = self.longest_match(i, candidate, self.prev_len, params);
                }
            }

            if self.prev_len >= MIN_MATCH as usize && cur_len <= self.prev_len {
                tokens.push_match(self.prev_len as u32, self.prev_dist as u32);
                let match_end = i - 1 + self.prev_len;
                self.insert_range(i + 1, match_end);
                self.pos = match_end;
                self.clear_pending();
            } else {
                if self.match_available {
                    tokens.push_literal(self.window[i - 1]);
                }
                self.match_available = true;
                self.prev_len = cur_len;
                self.prev_dist = cur_dist;
                self.pos = i + 1;
            }
        }
        if flush && self.match_available {
            if tokens.is_full() {
                return true;
            }
            tokens.push_literal(self.window[self.pos - 1]);
            self.clear_pending();
        }
        false
    }

    #[inline]
    fn hash_at(&self, i: usize) -> usize {
        let b = &self.window[i..i + HASH_BYTES];
        let h = ((b[0] as u32) << 15) + ((b[1] as u32) << 10) + ((b[2] as u32) << 5) + b[3] as u32;
        (h & HASH_MASK) as usize
    }

    /// Insert position `i` and return the previous head of its chain.
    #[inline]
    fn insert(&mut self, i: usize) -> u32 {
        let h = self.hash_at(i);
        self.link(i, h)
    }

    #[inline]
    fn link(&mut self, i: usize, h: usize) -> u32 {
        let old = self.head[h];
        self.prev[i % WINDOW_SIZE] = old;
        self.head[h] = i as u32 + self.hash_offset;
        old
    }

    /// Insert every hashable position in `from..to`, batching the hashes.
    fn insert_range(&mut self, from: usize, to: usize) {
        let to = to.min((self.window.len() + 1).saturating_sub(HASH_BYTES));
        let mut hashes = [0usize; INSERT_BATCH];
        let mut start = from;
        while start < to {
            let n = (to - start).min(INSERT_BATCH);
            for (k, h) in hashes[..n].iter_mut().enumerate() {
                *h = self.hash_at(start + k);
            }
            for (k, &h) in hashes[..n].iter().enumerate() {
                self.link(start + k, h);
            }
            start += n;
        }
    }

    /// Longest match at `i` strictly longer than `prev_len`, walking the
    /// chain that starts at `entry`. Returns `(0, 0)` when none is found.
    fn longest_match(
        &self,
        i: usize,
        mut entry: u32,
        prev_len: usize,
        params: LevelParams,
    ) -> (usize, usize) {
        let max = (self.window.len() - i).min(DEFLATE_MAX_MATCH as usize);
        let mut best = prev_len.max(MIN_MATCH as usize - 1);
        if best >= max {
            return (0, 0);
        }
        let mut chain = params.chain;
        if prev_len as u32 >= params.good {
            chain >>= 2;
        }
        let nice = (params.nice as usize).min(max);
        let win = &self.window;
        let mut best_dist = 0;

        while chain > 0 && entry >= self.hash_offset {
            let c = (entry - self.hash_offset) as usize;
            if c >= i || i - c > WINDOW_SIZE {
                break;
            }
            if win[c + best] == win[i + best] && win[c] == win[i] {
                let len = self.accel.match_length(&win[c..], &win[i..], max);
                if len > best {
                    best = len;
                    best_dist = i - c;
                    if len >= nice {
                        break;
                    }
                }
            }
            entry = self.prev[c % WINDOW_SIZE];
            chain -= 1;
        }

        if best_dist == 0 || (best == MIN_MATCH as usize && best_dist > TOO_FAR) {
            (0, 0)
        } else {
            (best, best_dist)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vepar_core::{token, Token};

    fn tokenize(level: i32, data: &[u8]) -> Vec<Token> {
        let mut matcher = Matcher::new(Strategy::for_level(level), Accel::Native);
        let mut tokens = TokenBuffer::new();
        let mut all = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            if matcher.is_full() {
                if !matcher.can_slide() {
                    let covered = tokens.covered();
                    matcher.consume_block(covered);
                    all.extend_from_slice(tokens.tokens());
                    tokens.clear();
                }
                matcher.slide();
            }
            let n = matcher.fill(rest);
            rest = &rest[n..];
            while matcher.advance(&mut tokens, false) {
                matcher.consume_block(tokens.covered());
                all.extend_from_slice(tokens.tokens());
                tokens.clear();
            }
        }
        while matcher.advance(&mut tokens, true) {
            matcher.consume_block(tokens.covered());
            all.extend_from_slice(tokens.tokens());
            tokens.clear();
        }
        all.extend_from_slice(tokens.tokens());
        all
    }

    fn replayed(tokens: &[Token]) -> Vec<u8> {
        let mut out = Vec::new();
        token::replay(tokens, WINDOW_SIZE, &mut out).unwrap();
        out
    }

    fn text(len: usize) -> Vec<u8> {
        let words = ["window", "chain", "lazy", "hash", "match", "literal", "block"];
        let mut out = Vec::new();
        let mut x = 17u32;
        while out.len() < len {
            x = x.wrapping_mul(1103515245).wrapping_add(12345);
            out.extend_from_slice(words[(x >> 16) as usize % words.len()].as_bytes());
            out.push(b' ');
        }
        out.truncate(len);
        out
    }

    #[test]
    fn test_every_level_replays_exactly() {
        let data = text(150_000);
        for level in -2..=9 {
            if level == -1 {
                continue;
            }
            let tokens = tokenize(level, &data);
            assert_eq!(replayed(&tokens), data, "level {level}");
            for t in &tokens {
                t.check(258, WINDOW_SIZE as u32).unwrap();
            }
        }
    }

    #[test]
    fn test_literal_strategies_emit_no_matches() {
        let data = text(5000);
        for level in [-2, 0] {
            assert!(tokenize(level, &data)
                .iter()
                .all(|t| matches!(t, Token::Literal(_))));
        }
    }

    #[test]
    fn test_repeats_become_matches() {
        let data = b"aaabbbcccaaabbbccc".repeat(64);
        let tokens = tokenize(1, &data);
        assert!(tokens.iter().any(|t| matches!(t, Token::Match { .. })));
        assert!(tokens.len() < data.len() / 4);
    }

    #[test]
    fn test_higher_levels_find_fewer_tokens() {
        let data = text(60_000);
        let fast = tokenize(1, &data).len();
        let best = tokenize(9, &data).len();
        assert!(best < fast, "{best} >= {fast}");
    }

    #[test]
    fn test_forget_history_blocks_back_references() {
        let mut matcher = Matcher::new(Strategy::for_level(6), Accel::Native);
        let mut tokens = TokenBuffer::new();
        let part = b"no references may cross a full flush boundary".repeat(4);
        matcher.fill(&part);
        while matcher.advance(&mut tokens, true) {}
        let first = tokens.covered();
        matcher.consume_block(first);
        tokens.clear();
        matcher.forget_history();

        matcher.fill(&part);
        while matcher.advance(&mut tokens, true) {}
        let mut pos = 0usize;
        for t in tokens.tokens() {
            if let Token::Match { offset, .. } = *t {
                assert!(offset as usize <= pos);
            }
            pos += t.output_len();
        }
        assert_eq!(pos, part.len());
    }

    #[test]
    fn test_renormalize_keeps_chains_valid() {
        let mut matcher = Matcher::new(Strategy::for_level(3), Accel::Portable);
        matcher.hash_offset = RENORMALIZE_AT - 10;
        let data = text(80_000);
        let mut tokens = TokenBuffer::new();
        let mut all = Vec::new();
        let mut rest = &data[..];
        while !rest.is_empty() {
            if matcher.is_full() {
                if !matcher.can_slide() {
                    matcher.consume_block(tokens.covered());
                    all.extend_from_slice(tokens.tokens());
                    tokens.clear();
                }
                matcher.slide();
            }
            let n = matcher.fill(rest);
            rest = &rest[n..];
            while matcher.advance(&mut tokens, false) {
                matcher.consume_block(tokens.covered());
                all.extend_from_slice(tokens.tokens());
                tokens.clear();
            }
        }
        assert!(matcher.hash_offset < RENORMALIZE_AT);
        while matcher.advance(&mut tokens, true) {
            matcher.consume_block(tokens.covered());
            all.extend_from_slice(tokens.tokens());
            tokens.clear();
        }
        all.extend_from_slice(tokens.tokens());
        assert_eq!(replayed(&all), data);
    }
}
