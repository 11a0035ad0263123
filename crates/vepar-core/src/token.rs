//! Token model shared by the LZ77 match finders.
//!
//! A match finder turns input into a stream of [`Token`]s. DEFLATE writes
//! them through its length/distance alphabets; Zstd regroups them into
//! [`Sequence`] triples plus a separate literal buffer ([`SequenceBlock`]).

use crate::error::{Error, Result};

/// Shortest match either format can express.
pub const MIN_MATCH: u32 = 3;

/// Longest DEFLATE match.
pub const DEFLATE_MAX_MATCH: u32 = 258;

/// Longest Zstd match.
pub const ZSTD_MAX_MATCH: u32 = 131_074;

/// Largest DEFLATE distance.
pub const DEFLATE_MAX_OFFSET: u32 = 32 * 1024;

/// One unit of LZ77 output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// A single literal byte.
    Literal(u8),
    /// Copy `length` bytes starting `offset` bytes back.
    Match { length: u32, offset: u32 },
    /// End of the current block.
    EndOfBlock,
}

impl Token {
    /// Number of output bytes this token produces.
    #[inline]
    pub fn output_len(&self) -> usize {
        match *self {
            Token::Literal(_) => 1,
            Token::Match { length, .. } => length as usize,
            Token::EndOfBlock => 0,
        }
    }

    /// Check a match against the limits of a format.
    pub fn check(&self, max_length: u32, max_offset: u32) -> Result<()> {
        if let Token::Match { length, offset } = *self {
            if !(MIN_MATCH..=max_length).contains(&length) {
                return Err(Error::corrupt(format!("match length {length} out of range")));
            }
            if offset == 0 || offset > max_offset {
                return Err(Error::corrupt(format!("match offset {offset} out of range")));
            }
        }
        Ok(())
    }
}

/// A Zstd sequence: `lit_len` literals then a match.
///
/// `offset` is the actual distance. A trailing run of literals with no
/// match is carried by the literal buffer, not by a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sequence {
    /// Literals copied before the match.
    pub lit_len: u32,
    /// Match distance in bytes (>= 1).
    pub offset: u32,
    /// Match length in bytes.
    pub match_len: u32,
}

impl Sequence {
    /// Create a new sequence.
    pub fn new(lit_len: u32, offset: u32, match_len: u32) -> Self {
        Sequence {
            lit_len,
            offset,
            match_len,
        }
    }
}

/// Literal bytes plus the sequences that interleave them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceBlock {
    /// All literal bytes of the block, in order.
    pub literals: Vec<u8>,
    /// Sequences consuming `literals` front to back.
    pub sequences: Vec<Sequence>,
}

impl SequenceBlock {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear without releasing capacity.
    pub fn reset(&mut self) {
        self.literals.clear();
        self.sequences.clear();
    }

    /// Regroup a token stream. `EndOfBlock` tokens are ignored.
    pub fn from_tokens(tokens: &[Token]) -> Self {
        let mut block = SequenceBlock::new();
        let mut pending = 0u32;
        for token in tokens {
            match *token {
                Token::Literal(b) => {
                    block.literals.push(b);
                    pending += 1;
                }
                Token::Match { length, offset } => {
                    block.sequences.push(Sequence::new(pending, offset, length));
                    pending = 0;
                }
                Token::EndOfBlock => {}
            }
        }
        block
    }

    /// Expand back into tokens, terminated by `EndOfBlock`.
    pub fn to_tokens(&self) -> Vec<Token> {
        let mut out = Vec::with_capacity(self.literals.len() + self.sequences.len() + 1);
        let mut lit = self.literals.iter();
        for seq in &self.sequences {
            out.extend(lit.by_ref().take(seq.lit_len as usize).map(|&b| Token::Literal(b)));
            out.push(Token::Match {
                length: seq.match_len,
                offset: seq.offset,
            });
        }
        out.extend(lit.map(|&b| Token::Literal(b)));
        out.push(Token::EndOfBlock);
        out
    }

    /// Total bytes the block decodes to.
    pub fn output_len(&self) -> usize {
        self.literals.len()
            + self
                .sequences
                .iter()
                .map(|s| s.match_len as usize)
                .sum::<usize>()
    }
}

/// Replay tokens onto `out`, which holds the preceding history.
///
/// This is the reference reconstruction used to validate match finders:
/// every offset must stay within `window` and within the bytes already
/// present in `out`.
pub fn replay(tokens: &[Token], window: usize, out: &mut Vec<u8>) -> Result<()> {
    for token in tokens {
        match *token {
            Token::Literal(b) => out.push(b),
            Token::Match { length, offset } => {
                let offset = offset as usize;
                if offset == 0 || offset > out.len() || offset > window {
                    return Err(Error::corrupt(format!(
                        "offset {offset} exceeds history {} or window {window}",
                        out.len()
                    )));
                }
                let start = out.len() - offset;
                for i in 0..length as usize {
                    let b = out[start + i];
                    out.push(b);
                }
            }
            Token::EndOfBlock => {}
        }
    }
    Ok(())
}
