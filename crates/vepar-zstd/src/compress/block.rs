//! Block encoding.

use vepar_core::{BlockKind, Result, SequenceBlock};
use vepar_simd::Accel;

use super::finder::{finder_for, History, MatchFinder};
use super::literals::LiteralsEncoder;
use super::sequences::SequenceEncoder;
use super::ZstdLevel;
use crate::block::RepeatOffsets;
use crate::frame::{BlockHeader, BlockType};

/// Turns blocks of a frame into raw, RLE or compressed blocks.
///
/// A compressed block only replaces the entropy tables and repeat offsets
/// the decoder holds when it is actually emitted; raw and RLE fallbacks
/// leave them untouched.
#[derive(Debug)]
pub struct BlockEncoder {
    finder: Box<dyn MatchFinder>,
    literals: LiteralsEncoder,
    sequences: SequenceEncoder,
    parsed: SequenceBlock,
    body: Vec<u8>,
}

impl BlockEncoder {
    pub fn new(level: ZstdLevel, accel: Accel) -> Self {
        Self {
            finder: finder_for(level, accel),
            literals: LiteralsEncoder::new(accel),
            sequences: SequenceEncoder::new(),
            parsed: SequenceBlock::new(),
            body: Vec::new(),
        }
    }

    /// Level of the match finder.
    pub fn level(&self) -> ZstdLevel {
        self.finder.level()
    }

    /// Start a new frame.
    pub fn reset(&mut self) {
        self.literals.reset();
        self.sequences.reset();
    }

    /// Repeat offsets the decoder will hold after the blocks written so far.
    pub fn repeat_offsets(&self) -> RepeatOffsets {
        self.sequences.repeat_offsets()
    }

    /// Shift match finder tables after the history dropped `delta` bytes
    /// of bias.
    pub fn rebase(&mut self, delta: u32) {
        self.finder.rebase(delta);
    }

    /// Encode `hist.bytes()[start..]` as one block and append it to `out`.
    pub fn encode_block(
        &mut self,
        hist: &History,
        start: usize,
        last: bool,
        out: &mut Vec<u8>,
    ) -> Result<BlockKind> {
        let block = &hist.bytes()[start..];
        if block.len() > 1 && block.iter().all(|&b| b == block[0]) {
            BlockHeader::new(last, BlockType::Rle, block.len()).write(out);
            out.push(block[0]);
            tracing::trace!(size = block.len(), "RLE block");
            return Ok(BlockKind::Rle);
        }

        self.parsed.reset();
        self.finder
            .find(hist, start, self.sequences.repeat_offsets(), &mut self.parsed);

        self.body.clear();
        self.literals.encode(&self.parsed.literals, &mut self.body)?;
        self.sequences.encode(&self.parsed, &mut self.body)?;

        if self.body.len() >= block.len() {
            self.literals.discard();
            self.sequences.discard();
            BlockHeader::new(last, BlockType::Raw, block.len()).write(out);
            out.extend_from_slice(block);
            tracing::trace!(
                size = block.len(),
                compressed = self.body.len(),
                "raw block fallback"
            );
            return Ok(BlockKind::Raw);
        }

        self.literals.commit();
        self.sequences.commit();
        BlockHeader::new(last, BlockType::Compressed, self.body.len()).write(out);
        out.extend_from_slice(&self.body);
        tracing::trace!(
            size = block.len(),
            compressed = self.body.len(),
            sequences = self.parsed.sequences.len(),
            "compressed block"
        );
        Ok(BlockKind::Compressed)
    }
}
