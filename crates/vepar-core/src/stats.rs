//! Per-stream counters kept by encoders and decoders.

use crate::types::{Algorithm, CompressionRatio};

/// Block encoding chosen for a span of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Zstd raw block or DEFLATE stored block.
    Raw,
    /// Zstd single-byte run block.
    Rle,
    /// Zstd compressed block.
    Compressed,
    /// DEFLATE block using the fixed code.
    FixedHuffman,
    /// DEFLATE block carrying its own code.
    DynamicHuffman,
}

impl BlockKind {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        self as usize
    }
}

/// Counters for one frame or stream.
///
/// Sizes are summed block by block: `original_size` counts the bytes a
/// block covers, `compressed_size` the bytes it occupies on the wire.
#[derive(Debug, Clone, Default)]
pub struct CompressionStats {
    /// Codec that produced the counters.
    pub algorithm: Option<Algorithm>,
    /// Uncompressed bytes.
    pub original_size: usize,
    /// Compressed bytes.
    pub compressed_size: usize,
    /// Wall time of the last one-shot call, in microseconds.
    pub time_us: u64,
    /// Blocks written or read.
    pub blocks_processed: usize,
    block_kinds: [usize; BlockKind::COUNT],
    /// Whether the vectorized kernels were selected.
    pub simd_used: bool,
    /// Frame content checksum, when one was written.
    pub checksum: Option<u64>,
}

impl CompressionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a block covering `input_len` bytes stored in `output_len`.
    pub fn record_block(&mut self, kind: BlockKind, input_len: usize, output_len: usize) {
        self.blocks_processed += 1;
        self.block_kinds[kind.index()] += 1;
        self.original_size += input_len;
        self.compressed_size += output_len;
    }

    /// Blocks of `kind` so far.
    pub fn blocks_of(&self, kind: BlockKind) -> usize {
        self.block_kinds[kind.index()]
    }

    pub fn ratio(&self) -> CompressionRatio {
        CompressionRatio::new(self.original_size, self.compressed_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_block_counts() {
        let mut stats = CompressionStats::new();
        stats.record_block(BlockKind::Rle, 131072, 4);
        stats.record_block(BlockKind::Rle, 131072, 4);
        stats.record_block(BlockKind::Compressed, 1000, 300);

        assert_eq!(stats.blocks_processed, 3);
        assert_eq!(stats.blocks_of(BlockKind::Rle), 2);
        assert_eq!(stats.blocks_of(BlockKind::Raw), 0);
        assert_eq!(stats.original_size, 263144);
        assert_eq!(stats.compressed_size, 308);
    }

    #[test]
    fn test_deflate_kinds_are_separate() {
        let mut stats = CompressionStats::new();
        stats.record_block(BlockKind::FixedHuffman, 10, 4);
        stats.record_block(BlockKind::DynamicHuffman, 4000, 900);
        stats.record_block(BlockKind::Raw, 100, 105);

        assert_eq!(stats.blocks_of(BlockKind::FixedHuffman), 1);
        assert_eq!(stats.blocks_of(BlockKind::DynamicHuffman), 1);
        assert_eq!(stats.blocks_of(BlockKind::Compressed), 0);
        assert_eq!(stats.ratio().original_size, 4110);
    }
}
