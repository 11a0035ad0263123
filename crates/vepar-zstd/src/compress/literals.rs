//! Literals section encoding.

use vepar_core::{Error, Result};
use vepar_simd::Accel;

use crate::block::{LiteralsBlockType, LiteralsHeader};
use crate::huffman::{HuffmanCompressor, HuffmanStreams, ReusePolicy};

/// Literal runs up to this size are stored raw.
pub const RAW_LITERALS_MAX: usize = 32;

/// Literal runs from this size on use four Huffman streams.
pub const FOUR_STREAMS_MIN: usize = 1024;

/// Chooses between raw, RLE, Huffman and treeless literals.
#[derive(Debug, Default)]
pub struct LiteralsEncoder {
    huffman: HuffmanCompressor,
}

impl LiteralsEncoder {
    pub fn new(accel: Accel) -> Self {
        Self {
            huffman: HuffmanCompressor::new().with_accel(accel),
        }
    }

    /// Set when the previous block's Huffman table may be reused.
    pub fn with_reuse(mut self, reuse: ReusePolicy) -> Self {
        self.huffman = self.huffman.with_reuse(reuse);
        self
    }

    /// Keep the table built by the last `encode` for later blocks.
    pub fn commit(&mut self) {
        self.huffman.commit();
    }

    /// Forget the table built by the last `encode`.
    pub fn discard(&mut self) {
        self.huffman.discard();
    }

    /// New frame.
    pub fn reset(&mut self) {
        self.huffman.reset();
    }

    /// Append the literals section for `literals` to `out`.
    pub fn encode(&mut self, literals: &[u8], out: &mut Vec<u8>) -> Result<LiteralsBlockType> {
        self.huffman.discard();
        let n = literals.len();
        if n > 1 && literals.iter().all(|&b| b == literals[0]) {
            return Ok(write_rle(literals[0], n, out));
        }
        if n <= RAW_LITERALS_MAX {
            return Ok(write_raw(literals, out));
        }

        let streams = if n >= FOUR_STREAMS_MIN {
            HuffmanStreams::Four
        } else {
            HuffmanStreams::Single
        };
        let coded = match self.huffman.compress(literals, streams) {
            Ok(coded) => coded,
            Err(Error::UseRle) => return Ok(write_rle(literals[0], n, out)),
            Err(Error::Incompressible) => return Ok(write_raw(literals, out)),
            Err(e) => return Err(e),
        };

        let block_type = if coded.reused {
            LiteralsBlockType::Treeless
        } else {
            LiteralsBlockType::Compressed
        };
        let header = LiteralsHeader::huffman(block_type, n, coded.data.len(), streams)?;
        if header.total_size() >= LiteralsHeader::uncompressed(LiteralsBlockType::Raw, n).total_size()
        {
            self.huffman.discard();
            return Ok(write_raw(literals, out));
        }
        tracing::trace!(
            literals = n,
            compressed = coded.data.len(),
            table = coded.table_len,
            ?block_type,
            "Huffman literals"
        );
        header.write(out);
        out.extend_from_slice(&coded.data);
        Ok(block_type)
    }
}

fn write_raw(literals: &[u8], out: &mut Vec<u8>) -> LiteralsBlockType {
    LiteralsHeader::uncompressed(LiteralsBlockType::Raw, literals.len()).write(out);
    out.extend_from_slice(literals);
    LiteralsBlockType::Raw
}

fn write_rle(byte: u8, n: usize, out: &mut Vec<u8>) -> LiteralsBlockType {
    LiteralsHeader::uncompressed(LiteralsBlockType::Rle, n).write(out);
    out.push(byte);
    LiteralsBlockType::Rle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{decode_literals, ScratchPool};
    use crate::huffman::HuffmanTable;

    fn text(len: usize) -> Vec<u8> {
        b"it was the best of times, it was the worst of times, "
            .iter()
            .cycle()
            .take(len)
            .copied()
            .collect()
    }

    fn decode(section: &[u8], table: &mut Option<HuffmanTable>) -> Vec<u8> {
        let mut pool = ScratchPool::new();
        let mut out = Vec::new();
        let used = decode_literals(section, table, &mut pool, &mut out).unwrap();
        assert_eq!(used, section.len());
        out
    }

    #[test]
    fn test_small_and_uniform_inputs() {
        let mut enc = LiteralsEncoder::default();
        let mut out = Vec::new();
        assert_eq!(enc.encode(b"", &mut out).unwrap(), LiteralsBlockType::Raw);
        assert_eq!(out, [0]);

        out.clear();
        assert_eq!(enc.encode(&[9; 500], &mut out).unwrap(), LiteralsBlockType::Rle);
        assert_eq!(decode(&out, &mut None), vec![9; 500]);

        out.clear();
        assert_eq!(enc.encode(b"short text", &mut out).unwrap(), LiteralsBlockType::Raw);
        assert_eq!(decode(&out, &mut None), b"short text");
    }

    #[test]
    fn test_stream_layouts() {
        for (len, streams) in [(500, HuffmanStreams::Single), (5000, HuffmanStreams::Four)] {
            let mut enc = LiteralsEncoder::default();
            let input = text(len);
            let mut out = Vec::new();
            assert_eq!(enc.encode(&input, &mut out).unwrap(), LiteralsBlockType::Compressed);
            assert_eq!(LiteralsHeader::parse(&out).unwrap().streams, streams);
            assert_eq!(decode(&out, &mut None), input);
        }
    }

    #[test]
    fn test_treeless_after_commit() {
        let mut enc = LiteralsEncoder::new(Accel::Native).with_reuse(ReusePolicy::Prefer);
        let mut table = None;
        let mut out = Vec::new();
        enc.encode(&text(3000), &mut out).unwrap();
        enc.commit();
        assert_eq!(decode(&out, &mut table), text(3000));

        out.clear();
        assert_eq!(enc.encode(&text(2000), &mut out).unwrap(), LiteralsBlockType::Treeless);
        assert_eq!(decode(&out, &mut table), text(2000));
    }

    #[test]
    fn test_discarded_table_is_not_reused() {
        let mut enc = LiteralsEncoder::new(Accel::Native).with_reuse(ReusePolicy::Prefer);
        let mut out = Vec::new();
        enc.encode(&text(3000), &mut out).unwrap();
        enc.discard();
        out.clear();
        assert_eq!(enc.encode(&text(2000), &mut out).unwrap(), LiteralsBlockType::Compressed);
    }
}
