//! Zstd block decoding.
//!
//! A compressed block is a literals section followed by a sequences
//! section:
//!
//! ```text
//! +------------------+--------------------------------------------+
//! | Literals section | Sequences section                          |
//! | (raw/rle/huff0)  | count | modes | tables | FSE bitstream     |
//! +------------------+--------------------------------------------+
//! ```
//!
//! Executing the sequences interleaves literal runs with matches copied
//! from earlier output. Huffman and FSE tables, and the repeat offsets,
//! carry over from block to block within a frame.

pub mod executor;
pub mod literals;
pub mod scratch;
pub mod sequences;

pub use executor::{execute_sequences, RepeatOffsets};
pub use literals::{decode_literals, LiteralsBlockType, LiteralsHeader};
pub use scratch::{PoolStats, ScratchPool};
pub use sequences::{
    decode_sequences, ll_code, ml_code, of_code, SeqKind, SeqMode, SequenceTables,
    SequencesHeader,
};

use vepar_core::{Error, Result, Sequence};
use vepar_simd::Accel;

use crate::frame::{BlockHeader, BlockType, MAX_BLOCK_SIZE};
use crate::huffman::HuffmanTable;

/// Append a raw block's content.
pub fn decode_raw_block(content: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(content);
}

/// Append `size` copies of `byte`.
pub fn decode_rle_block(byte: u8, size: usize, out: &mut Vec<u8>) {
    out.resize(out.len() + size, byte);
}

/// Per-frame block decoding state.
///
/// Holds the entropy tables and repeat offsets that later blocks may
/// reference, plus scratch buffers reused across blocks.
#[derive(Debug)]
pub struct BlockDecoder {
    huffman: Option<HuffmanTable>,
    tables: SequenceTables,
    reps: RepeatOffsets,
    literals: Vec<u8>,
    sequences: Vec<Sequence>,
    pool: ScratchPool,
    accel: Accel,
}

impl Default for BlockDecoder {
    fn default() -> Self {
        Self::new(Accel::default())
    }
}

impl BlockDecoder {
    /// Fresh decoder.
    pub fn new(accel: Accel) -> Self {
        Self {
            huffman: None,
            tables: SequenceTables::new(),
            reps: RepeatOffsets::new(),
            literals: Vec::new(),
            sequences: Vec::new(),
            pool: ScratchPool::new(),
            accel,
        }
    }

    /// Start a new frame: tables go back to the pool and the repeat
    /// offsets return to `(1, 4, 8)`.
    pub fn reset(&mut self) {
        self.tables.release(&mut self.pool);
        if let Some(table) = self.huffman.take() {
            self.pool.put_huffman(table);
        }
        self.reps = RepeatOffsets::new();
    }

    /// Current repeat offsets.
    pub fn repeat_offsets(&self) -> RepeatOffsets {
        self.reps
    }

    /// Table storage counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Decode one block and append its output to `out`.
    ///
    /// `content` is the block body (`header.compressed_size()` bytes).
    /// `out[base..]` is the frame's output so far and `window` bounds match
    /// offsets and the block's decoded size.
    pub fn decode_block(
        &mut self,
        header: &BlockHeader,
        content: &[u8],
        out: &mut Vec<u8>,
        base: usize,
        window: usize,
    ) -> Result<()> {
        match header.block_type {
            BlockType::Raw => {
                decode_raw_block(content, out);
                Ok(())
            }
            BlockType::Rle => {
                let Some(&byte) = content.first() else {
                    return Err(Error::unexpected_eof(0));
                };
                decode_rle_block(byte, header.block_size, out);
                Ok(())
            }
            BlockType::Compressed => self.decode_compressed(content, out, base, window),
        }
    }

    fn decode_compressed(
        &mut self,
        content: &[u8],
        out: &mut Vec<u8>,
        base: usize,
        window: usize,
    ) -> Result<()> {
        let max_output = window.min(MAX_BLOCK_SIZE);
        let used = decode_literals(content, &mut self.huffman, &mut self.pool, &mut self.literals)?;
        let rest = &content[used..];
        let header = SequencesHeader::parse(rest)?;

        if header.count == 0 {
            if rest.len() != header.header_size {
                return Err(Error::corrupt(format!(
                    "{} bytes after an empty sequences section",
                    rest.len() - header.header_size
                )));
            }
            if self.literals.len() > max_output {
                return Err(Error::corrupt(format!(
                    "block decodes to {} bytes, limit {}",
                    self.literals.len(),
                    max_output
                )));
            }
            out.extend_from_slice(&self.literals);
            return Ok(());
        }

        let rest = &rest[header.header_size..];
        let used = self.tables.read(&header, rest, &mut self.pool)?;
        self.sequences.clear();
        decode_sequences(
            &rest[used..],
            header.count,
            &self.tables,
            &mut self.reps,
            &mut self.sequences,
        )?;

        let produced = self.literals.len() as u64
            + self
                .sequences
                .iter()
                .map(|s| s.match_len as u64)
                .sum::<u64>();
        if produced > max_output as u64 {
            return Err(Error::corrupt(format!(
                "block decodes to {} bytes, limit {}",
                produced, max_output
            )));
        }
        execute_sequences(&self.literals, &self.sequences, out, base, window, self.accel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    fn raw_literals(lits: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        LiteralsHeader::uncompressed(LiteralsBlockType::Raw, lits.len()).write(&mut out);
        out.extend_from_slice(lits);
        out
    }

    #[test]
    fn test_raw_and_rle_blocks() {
        let mut dec = BlockDecoder::default();
        let mut out = Vec::new();
        let raw = BlockHeader::new(false, BlockType::Raw, 3);
        dec.decode_block(&raw, b"abc", &mut out, 0, 1 << 20).unwrap();
        let rle = BlockHeader::new(true, BlockType::Rle, 4);
        dec.decode_block(&rle, b"z", &mut out, 0, 1 << 20).unwrap();
        assert_eq!(out, b"abczzzz");
    }

    #[test]
    fn test_literals_only_block() {
        let mut content = raw_literals(b"hello");
        content.push(0);
        let header = BlockHeader::new(true, BlockType::Compressed, content.len());
        let mut dec = BlockDecoder::default();
        let mut out = Vec::new();
        dec.decode_block(&header, &content, &mut out, 0, 1 << 20).unwrap();
        assert_eq!(out, b"hello");

        content.push(0);
        let header = BlockHeader::new(true, BlockType::Compressed, content.len());
        assert!(dec.decode_block(&header, &content, &mut out, 0, 1 << 20).is_err());
    }

    #[test]
    fn test_single_rle_sequence() {
        // One sequence: 2 literals, offset 2, match 6. Literal length code 2,
        // offset value 5 (code 2, one extra bit set), match length code 3.
        let mut content = raw_literals(b"ab");
        SequencesHeader::new(1, [SeqMode::Rle; 3]).write(&mut content);
        content.extend_from_slice(&[2, 2, 3]);
        let mut w = BitWriter::new();
        w.add_bits32(1, 2);
        w.close();
        content.extend_from_slice(&w.into_inner());

        let header = BlockHeader::new(true, BlockType::Compressed, content.len());
        let mut dec = BlockDecoder::default();
        let mut out = Vec::new();
        dec.decode_block(&header, &content, &mut out, 0, 1 << 20).unwrap();
        assert_eq!(out, b"abababab");
        assert_eq!(dec.repeat_offsets().get(), [2, 1, 4]);
    }

    #[test]
    fn test_block_output_limit() {
        let mut content = raw_literals(b"ab");
        SequencesHeader::new(1, [SeqMode::Rle; 3]).write(&mut content);
        content.extend_from_slice(&[2, 2, 3]);
        let mut w = BitWriter::new();
        w.add_bits32(1, 2);
        w.close();
        content.extend_from_slice(&w.into_inner());

        let header = BlockHeader::new(true, BlockType::Compressed, content.len());
        let mut dec = BlockDecoder::default();
        let mut out = Vec::new();
        assert!(dec.decode_block(&header, &content, &mut out, 0, 4).is_err());
    }

    #[test]
    fn test_reset_restores_offsets() {
        let mut dec = BlockDecoder::default();
        dec.reps.resolve(100, 1);
        dec.reset();
        assert_eq!(dec.repeat_offsets(), RepeatOffsets::new());
    }
}
