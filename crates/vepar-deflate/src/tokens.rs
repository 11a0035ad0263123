//! Token buffer for one DEFLATE block.

use vepar_core::Token;

use crate::huffman::{distance_code, length_code, END_OF_BLOCK, MAX_DIST_CODES, MAX_LIT_CODES};

/// Tokens queued before a block is written.
pub const MAX_BLOCK_TOKENS: usize = 16384;

/// Tokens of the current block with their symbol frequencies.
///
/// The end-of-block symbol is always counted once.
#[derive(Debug, Clone)]
pub struct TokenBuffer {
    tokens: Vec<Token>,
    lit_freq: [u32; MAX_LIT_CODES],
    dist_freq: [u32; MAX_DIST_CODES],
    covered: usize,
}

impl Default for TokenBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBuffer {
    pub fn new() -> Self {
        let mut buffer = Self {
            tokens: Vec::with_capacity(MAX_BLOCK_TOKENS),
            lit_freq: [0; MAX_LIT_CODES],
            dist_freq: [0; MAX_DIST_CODES],
            covered: 0,
        };
        buffer.clear();
        buffer
    }

    #[inline]
    pub fn push_literal(&mut self, byte: u8) {
        self.tokens.push(Token::Literal(byte));
        self.lit_freq[byte as usize] += 1;
        self.covered += 1;
    }

    /// Queue a match of `length` in `3..=258` at `distance` in `1..=32768`.
    #[inline]
    pub fn push_match(&mut self, length: u32, distance: u32) {
        debug_assert!((3..=258).contains(&length) && (1..=32768).contains(&distance));
        self.tokens.push(Token::Match {
            length,
            offset: distance,
        });
        self.lit_freq[257 + length_code(length)] += 1;
        self.dist_freq[distance_code(distance)] += 1;
        self.covered += length as usize;
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.tokens.len() >= MAX_BLOCK_TOKENS
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Input bytes the queued tokens stand for.
    pub fn covered(&self) -> usize {
        self.covered
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn lit_freq(&self) -> &[u32; MAX_LIT_CODES] {
        &self.lit_freq
    }

    pub fn dist_freq(&self) -> &[u32; MAX_DIST_CODES] {
        &self.dist_freq
    }

    pub fn match_count(&self) -> usize {
        self.dist_freq.iter().map(|&f| f as usize).sum()
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
        self.lit_freq = [0; MAX_LIT_CODES];
        self.dist_freq = [0; MAX_DIST_CODES];
        self.lit_freq[END_OF_BLOCK] = 1;
        self.covered = 0;
    }
}
