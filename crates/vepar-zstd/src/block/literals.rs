//! Literals section of a compressed block.
//!
//! ```text
//! byte 0, bits 1-0: Literals_Block_Type (raw, rle, compressed, treeless)
//! byte 0, bits 3-2: Size_Format
//!
//! raw / rle:          x0 -> 5-bit size   (1 byte)
//!                     01 -> 12-bit size  (2 bytes)
//!                     11 -> 20-bit size  (3 bytes)
//! compressed / treeless:
//!                     00 -> 1 stream,  10-bit sizes (3 bytes)
//!                     01 -> 4 streams, 10-bit sizes (3 bytes)
//!                     10 -> 4 streams, 14-bit sizes (4 bytes)
//!                     11 -> 4 streams, 18-bit sizes (5 bytes)
//! ```
//!
//! Sizes follow the two header bit fields as one little-endian integer:
//! regenerated size first, then compressed size.

use vepar_core::{Error, Result};

use super::scratch::ScratchPool;
use crate::frame::MAX_BLOCK_SIZE;
use crate::huffman::{read_table_in, HuffmanDecoder, HuffmanStreams, HuffmanTable};

/// Literals block type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralsBlockType {
    /// Raw literals - uncompressed bytes.
    Raw,
    /// RLE literals - single byte repeated.
    Rle,
    /// Huffman compressed literals with new tree.
    Compressed,
    /// Huffman compressed using previous tree.
    Treeless,
}

impl LiteralsBlockType {
    /// Parse block type from 2-bit field.
    pub fn from_field(field: u8) -> Self {
        match field & 3 {
            0 => LiteralsBlockType::Raw,
            1 => LiteralsBlockType::Rle,
            2 => LiteralsBlockType::Compressed,
            _ => LiteralsBlockType::Treeless,
        }
    }

    /// The 2-bit field value.
    pub fn field(self) -> u64 {
        match self {
            LiteralsBlockType::Raw => 0,
            LiteralsBlockType::Rle => 1,
            LiteralsBlockType::Compressed => 2,
            LiteralsBlockType::Treeless => 3,
        }
    }

    /// Whether the payload is Huffman coded.
    pub fn is_huffman(self) -> bool {
        matches!(
            self,
            LiteralsBlockType::Compressed | LiteralsBlockType::Treeless
        )
    }
}

/// Parsed literals section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralsHeader {
    /// Block type.
    pub block_type: LiteralsBlockType,
    /// Decoded size of the literals.
    pub regenerated_size: usize,
    /// Payload bytes after the header (1 for RLE).
    pub compressed_size: usize,
    /// Stream layout of Huffman payloads.
    pub streams: HuffmanStreams,
    /// Header bytes.
    pub header_size: usize,
}

impl LiteralsHeader {
    /// Header for raw or RLE literals.
    pub fn uncompressed(block_type: LiteralsBlockType, regenerated_size: usize) -> Self {
        let header_size = match regenerated_size {
            0..=31 => 1,
            32..=4095 => 2,
            _ => 3,
        };
        Self {
            block_type,
            regenerated_size,
            compressed_size: if block_type == LiteralsBlockType::Rle {
                1
            } else {
                regenerated_size
            },
            streams: HuffmanStreams::Single,
            header_size,
        }
    }

    /// Header for Huffman literals. One stream is only expressible with
    /// 10-bit sizes.
    pub fn huffman(
        block_type: LiteralsBlockType,
        regenerated_size: usize,
        compressed_size: usize,
        streams: HuffmanStreams,
    ) -> Result<Self> {
        let largest = regenerated_size.max(compressed_size);
        let header_size = match largest {
            0..=1023 => 3,
            1024..=16383 => 4,
            16384..=262143 => 5,
            _ => {
                return Err(Error::Unsupported(format!(
                    "literals size {} exceeds 18 bits",
                    largest
                )))
            }
        };
        if streams == HuffmanStreams::Single && header_size != 3 {
            return Err(Error::Unsupported(format!(
                "single-stream literals of {} bytes",
                largest
            )));
        }
        Ok(Self {
            block_type,
            regenerated_size,
            compressed_size,
            streams,
            header_size,
        })
    }

    /// Parse a literals header.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let Some(&b0) = input.first() else {
            return Err(Error::corrupt("empty literals section"));
        };
        let block_type = LiteralsBlockType::from_field(b0);
        let size_format = (b0 >> 2) & 3;

        let header_size = if block_type.is_huffman() {
            match size_format {
                0 | 1 => 3,
                2 => 4,
                _ => 5,
            }
        } else {
            match size_format {
                0 | 2 => 1,
                1 => 2,
                _ => 3,
            }
        };
        let Some(bytes) = input.get(..header_size) else {
            return Err(Error::corrupt("literals header truncated"));
        };
        let v = bytes
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64);

        if !block_type.is_huffman() {
            let regenerated_size = match header_size {
                1 => (v >> 3) as usize,
                2 => (v >> 4) as usize & 0xFFF,
                _ => (v >> 4) as usize & 0xFFFFF,
            };
            return Ok(Self::uncompressed(block_type, regenerated_size));
        }

        let (bits, streams) = match size_format {
            0 => (10, HuffmanStreams::Single),
            1 => (10, HuffmanStreams::Four),
            2 => (14, HuffmanStreams::Four),
            _ => (18, HuffmanStreams::Four),
        };
        let mask = (1u64 << bits) - 1;
        Ok(Self {
            block_type,
            regenerated_size: ((v >> 4) & mask) as usize,
            compressed_size: ((v >> (4 + bits)) & mask) as usize,
            streams,
            header_size,
        })
    }

    /// Append the header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        let ty = self.block_type.field();
        let v = if self.block_type.is_huffman() {
            let (format, bits) = match (self.header_size, self.streams) {
                (3, HuffmanStreams::Single) => (0u64, 10),
                (3, HuffmanStreams::Four) => (1, 10),
                (4, _) => (2, 14),
                _ => (3, 18),
            };
            ty | format << 2
                | (self.regenerated_size as u64) << 4
                | (self.compressed_size as u64) << (4 + bits)
        } else {
            match self.header_size {
                1 => ty | (self.regenerated_size as u64) << 3,
                2 => ty | 1 << 2 | (self.regenerated_size as u64) << 4,
                _ => ty | 3 << 2 | (self.regenerated_size as u64) << 4,
            }
        };
        out.extend_from_slice(&v.to_le_bytes()[..self.header_size]);
    }

    /// Header plus payload bytes.
    pub fn total_size(&self) -> usize {
        self.header_size + self.compressed_size
    }
}

/// Decode the literals section at the start of `input` into `out`.
///
/// `table` holds the Huffman table of the previous compressed literals in
/// this frame; a compressed section replaces it, drawing table storage from
/// `pool` when there is no previous table. Returns the bytes consumed.
pub fn decode_literals(
    input: &[u8],
    table: &mut Option<HuffmanTable>,
    pool: &mut ScratchPool,
    out: &mut Vec<u8>,
) -> Result<usize> {
    let header = LiteralsHeader::parse(input)?;
    if header.regenerated_size > MAX_BLOCK_SIZE {
        return Err(Error::corrupt(format!(
            "{} literals exceed the block maximum",
            header.regenerated_size
        )));
    }
    let Some(payload) = input.get(header.header_size..header.total_size()) else {
        return Err(Error::corrupt(format!(
            "literals need {} bytes, block has {}",
            header.total_size(),
            input.len()
        )));
    };

    out.clear();
    match header.block_type {
        LiteralsBlockType::Raw => out.extend_from_slice(payload),
        LiteralsBlockType::Rle => out.resize(header.regenerated_size, payload[0]),
        LiteralsBlockType::Compressed => {
            let storage = match table.take() {
                Some(old) => old.into_storage(),
                None => pool.take_huffman(),
            };
            let (fresh, used) = read_table_in(payload, storage)?;
            decode_streams(&fresh, &header, &payload[used..], out)?;
            *table = Some(fresh);
        }
        LiteralsBlockType::Treeless => {
            let Some(prev) = table.as_ref() else {
                return Err(Error::corrupt("treeless literals without a previous Huffman table"));
            };
            decode_streams(prev, &header, payload, out)?;
        }
    }
    Ok(header.total_size())
}

fn decode_streams(
    table: &HuffmanTable,
    header: &LiteralsHeader,
    data: &[u8],
    out: &mut Vec<u8>,
) -> Result<()> {
    let decoder = HuffmanDecoder::new(table);
    match header.streams {
        HuffmanStreams::Single => decoder.decompress_1x(data, header.regenerated_size, out),
        HuffmanStreams::Four => decoder.decompress_4x(data, header.regenerated_size, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huffman::{HuffmanCompressor, ReusePolicy};

    #[test]
    fn test_raw_header_sizes() {
        for (size, len) in [(0usize, 1usize), (31, 1), (32, 2), (4095, 2), (4096, 3), (131072, 3)] {
            let header = LiteralsHeader::uncompressed(LiteralsBlockType::Raw, size);
            let mut out = Vec::new();
            header.write(&mut out);
            assert_eq!(out.len(), len);
            assert_eq!(LiteralsHeader::parse(&out).unwrap(), header);
        }
    }

    #[test]
    fn test_rle_literals() {
        // type 1, size format 0, size 5
        let input = [(5 << 3) | 1, b'z'];
        let mut out = Vec::new();
        let mut pool = ScratchPool::new();
        let used = decode_literals(&input, &mut None, &mut pool, &mut out).unwrap();
        assert_eq!(used, 2);
        assert_eq!(out, b"zzzzz");
    }

    #[test]
    fn test_huffman_header_formats() {
        let cases = [
            (1000, 600, HuffmanStreams::Single, 3),
            (1000, 600, HuffmanStreams::Four, 3),
            (16000, 9000, HuffmanStreams::Four, 4),
            (131072, 70000, HuffmanStreams::Four, 5),
        ];
        for (regen, comp, streams, len) in cases {
            let header =
                LiteralsHeader::huffman(LiteralsBlockType::Compressed, regen, comp, streams)
                    .unwrap();
            let mut out = Vec::new();
            header.write(&mut out);
            assert_eq!(out.len(), len);
            assert_eq!(LiteralsHeader::parse(&out).unwrap(), header);
        }
        assert!(LiteralsHeader::huffman(
            LiteralsBlockType::Compressed,
            2000,
            900,
            HuffmanStreams::Single
        )
        .is_err());
    }

    #[test]
    fn test_treeless_without_table() {
        let header =
            LiteralsHeader::huffman(LiteralsBlockType::Treeless, 40, 10, HuffmanStreams::Single)
                .unwrap();
        let mut input = Vec::new();
        header.write(&mut input);
        input.extend_from_slice(&[0x55; 10]);
        let mut pool = ScratchPool::new();
        let err = decode_literals(&input, &mut None, &mut pool, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::CorruptInput { .. }));
    }

    #[test]
    fn test_compressed_then_treeless() {
        let text = b"she sells sea shells by the sea shore, the shells she sells are sea shells. "
            .repeat(3);
        let mut enc = HuffmanCompressor::new().with_reuse(ReusePolicy::Must);
        assert!(enc.compress(&text, HuffmanStreams::Single).is_err());

        let mut enc = HuffmanCompressor::new();
        let first = enc.compress(&text, HuffmanStreams::Single).unwrap();
        enc.commit();
        let mut section = Vec::new();
        LiteralsHeader::huffman(
            LiteralsBlockType::Compressed,
            text.len(),
            first.data.len(),
            HuffmanStreams::Single,
        )
        .unwrap()
        .write(&mut section);
        section.extend_from_slice(&first.data);

        let mut enc = enc.with_reuse(ReusePolicy::Must);
        let second = enc.compress(&text[4..], HuffmanStreams::Single).unwrap();
        assert!(second.reused);
        let mut treeless = Vec::new();
        LiteralsHeader::huffman(
            LiteralsBlockType::Treeless,
            text.len() - 4,
            second.data.len(),
            HuffmanStreams::Single,
        )
        .unwrap()
        .write(&mut treeless);
        treeless.extend_from_slice(&second.data);

        let mut table = None;
        let mut pool = ScratchPool::new();
        let mut out = Vec::new();
        let used = decode_literals(&section, &mut table, &mut pool, &mut out).unwrap();
        assert_eq!(used, section.len());
        assert_eq!(out, text);
        assert!(table.is_some());
        decode_literals(&treeless, &mut table, &mut pool, &mut out).unwrap();
        assert_eq!(out, &text[4..]);
    }

    #[test]
    fn test_truncated_payload() {
        let header = LiteralsHeader::uncompressed(LiteralsBlockType::Raw, 20);
        let mut input = Vec::new();
        header.write(&mut input);
        input.extend_from_slice(&[1; 5]);
        let mut pool = ScratchPool::new();
        assert!(decode_literals(&input, &mut None, &mut pool, &mut Vec::new()).is_err());
    }
}
