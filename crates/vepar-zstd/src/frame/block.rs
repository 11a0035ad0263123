//! The 3-byte header in front of every block.

use vepar_core::{BlockKind, Error, Result};

/// `Block_Type` values 0..=2; 3 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Content copied verbatim.
    Raw,
    /// One byte, repeated `block_size` times.
    Rle,
    /// Literals section followed by a sequences section.
    Compressed,
}

impl BlockType {
    /// Decode the 2-bit field of the header found at `offset`.
    pub fn from_field(field: u8, offset: usize) -> Result<Self> {
        match field & 3 {
            0 => Ok(BlockType::Raw),
            1 => Ok(BlockType::Rle),
            2 => Ok(BlockType::Compressed),
            _ => Err(Error::ReservedBlockType { offset }),
        }
    }

    pub fn field(self) -> u32 {
        match self {
            BlockType::Raw => 0,
            BlockType::Rle => 1,
            BlockType::Compressed => 2,
        }
    }

    pub fn kind(self) -> BlockKind {
        match self {
            BlockType::Raw => BlockKind::Raw,
            BlockType::Rle => BlockKind::Rle,
            BlockType::Compressed => BlockKind::Compressed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub last_block: bool,
    pub block_type: BlockType,
    /// Regenerated length for Raw and RLE, content length for Compressed.
    pub block_size: usize,
}

impl BlockHeader {
    pub const SIZE: usize = 3;

    pub fn new(last_block: bool, block_type: BlockType, block_size: usize) -> Self {
        Self {
            last_block,
            block_type,
            block_size,
        }
    }

    /// Read the header at the start of `data`; `offset` is its frame position.
    ///
    /// Little-endian 24 bits: `last` in bit 0, type in bits 1..3, size above.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::unexpected_eof(data.len()));
        }
        let raw = u32::from_le_bytes([data[0], data[1], data[2], 0]);
        Ok(Self {
            last_block: raw & 1 == 1,
            block_type: BlockType::from_field((raw >> 1) as u8, offset)?,
            block_size: (raw >> 3) as usize,
        })
    }

    /// Fails with `CompressedSizeTooBig` above `max`, the smaller of window and 128 KiB.
    pub fn check_size(&self, max: usize) -> Result<()> {
        if self.block_size > max {
            return Err(Error::block_too_big(self.block_size, max));
        }
        Ok(())
    }

    /// Append the 3-byte header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        let v = (self.block_size as u32) << 3
            | self.block_type.field() << 1
            | self.last_block as u32;
        out.extend_from_slice(&v.to_le_bytes()[..3]);
    }

    /// Bytes of block content that follow the header.
    pub fn compressed_size(&self) -> usize {
        match self.block_type {
            BlockType::Rle => 1,
            BlockType::Raw | BlockType::Compressed => self.block_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_block_header() {
        // (100 << 3) | (0 << 1) | 0 = 0x320
        let header = BlockHeader::parse(&[0x20, 0x03, 0x00], 0).unwrap();
        assert!(!header.last_block);
        assert_eq!(header.block_type, BlockType::Raw);
        assert_eq!(header.block_size, 100);
        assert_eq!(header.compressed_size(), 100);
    }

    #[test]
    fn test_rle_block_header() {
        let header = BlockHeader::new(true, BlockType::Rle, 131072);
        let mut out = Vec::new();
        header.write(&mut out);
        assert_eq!(out, [0x03, 0x00, 0x10]);
        let parsed = BlockHeader::parse(&out, 0).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.compressed_size(), 1);
    }

    #[test]
    fn test_reserved_block_type() {
        assert!(matches!(
            BlockHeader::parse(&[0x06, 0x00, 0x00], 17),
            Err(Error::ReservedBlockType { offset: 17 })
        ));
    }

    #[test]
    fn test_size_limit() {
        let header = BlockHeader::new(false, BlockType::Compressed, 2000);
        assert!(header.check_size(131072).is_ok());
        assert!(matches!(
            header.check_size(1024),
            Err(Error::CompressedSizeTooBig { size: 2000, max: 1024 })
        ));
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            BlockHeader::parse(&[0x01, 0x00], 0),
            Err(Error::UnexpectedEof { bytes_read: 2 })
        ));
    }
}
