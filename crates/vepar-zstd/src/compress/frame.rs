//! Frame encoding.

use std::time::Instant;

use vepar_core::{Algorithm, BlockKind, CompressionStats, Result};

use super::{BlockEncoder, EncoderConfig, History};
use crate::frame::{content_checksum, BlockHeader, BlockType, FrameHeader};

/// Worst-case frame size for `input_len` bytes.
pub fn max_compressed_size(input_len: usize) -> usize {
    input_len + (input_len >> 7) + 512
}

/// Writes Zstd frames.
///
/// Reusable: every frame starts from fresh entropy state and an empty
/// history, but the match finder tables are kept and invalidated by the
/// history bias instead of being cleared.
#[derive(Debug)]
pub struct FrameEncoder {
    config: EncoderConfig,
    blocks: BlockEncoder,
    history: History,
    stats: CompressionStats,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(EncoderConfig::default())
    }
}

impl FrameEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            blocks: BlockEncoder::new(config.level, config.accel),
            history: History::new(config.window_size),
            stats: CompressionStats::new(),
            config,
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Statistics of the last frame.
    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    /// Compress `input` as one frame.
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(max_compressed_size(input.len()));
        self.compress_into(input, &mut out)?;
        Ok(out)
    }

    /// Append one frame holding `input` to `out`, returning its size.
    pub fn compress_into(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<usize> {
        let started = Instant::now();
        let before = out.len();
        self.begin_frame(FrameHeader::for_content(
            input.len() as u64,
            self.config.window_size as u64,
            self.config.checksum,
        ), out);

        if input.is_empty() {
            self.write_empty_block(out);
        } else {
            let count = input.len().div_ceil(self.config.block_size);
            for (i, block) in input.chunks(self.config.block_size).enumerate() {
                self.encode_block(block, i + 1 == count, out)?;
            }
        }
        if self.config.checksum {
            self.write_checksum(content_checksum(input), out);
        }
        self.end_frame(input.len(), out.len() - before, started);
        Ok(out.len() - before)
    }

    /// Compress `input` with a producer thread splitting blocks (and a
    /// second one hashing the content) while this thread encodes.
    ///
    /// At most `depth` blocks wait in the channel. Output is identical to
    /// [`compress`](Self::compress).
    #[cfg(feature = "parallel")]
    pub fn compress_pipelined(&mut self, input: &[u8], depth: usize) -> Result<Vec<u8>> {
        use crossbeam_channel::bounded;

        let started = Instant::now();
        let depth = depth.max(1);
        let block_size = self.config.block_size;
        let checksum = self.config.checksum;
        let mut out = Vec::with_capacity(max_compressed_size(input.len()));

        let (block_tx, block_rx) = bounded::<(usize, &[u8])>(depth);
        let (sum_tx, sum_rx) = bounded::<u32>(1);
        std::thread::scope(|s| {
            s.spawn(move || {
                for item in input.chunks(block_size).enumerate() {
                    if block_tx.send(item).is_err() {
                        break;
                    }
                }
            });
            if checksum {
                s.spawn(move || {
                    let _ = sum_tx.send(content_checksum(input));
                });
            }
            self.consume_pipeline(input.len(), block_rx, sum_rx, &mut out)
        })?;

        tracing::debug!(depth, blocks = self.stats.blocks_processed, "pipelined frame");
        self.end_frame(input.len(), out.len(), started);
        Ok(out)
    }

    #[cfg(feature = "parallel")]
    fn consume_pipeline(
        &mut self,
        input_len: usize,
        blocks: crossbeam_channel::Receiver<(usize, &[u8])>,
        sums: crossbeam_channel::Receiver<u32>,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        use vepar_core::Error;

        self.begin_frame(FrameHeader::for_content(
            input_len as u64,
            self.config.window_size as u64,
            self.config.checksum,
        ), out);
        if input_len == 0 {
            self.write_empty_block(out);
        }
        let count = input_len.div_ceil(self.config.block_size);
        let mut expected = 0;
        for (seq, block) in blocks.iter() {
            if seq != expected {
                return Err(Error::InvalidState {
                    expected: "next block in sequence",
                    actual: "out-of-order block",
                });
            }
            self.encode_block(block, seq + 1 == count, out)?;
            expected += 1;
        }
        if self.config.checksum {
            let sum = sums.recv().map_err(|_| Error::InvalidState {
                expected: "content checksum",
                actual: "checksum worker gone",
            })?;
            self.write_checksum(sum, out);
        }
        Ok(())
    }

    /// Reset per-frame state and write `header`.
    pub(crate) fn begin_frame(&mut self, header: FrameHeader, out: &mut Vec<u8>) {
        self.blocks.reset();
        if let Some(delta) = self.history.reset() {
            self.blocks.rebase(delta);
        }
        self.stats = CompressionStats::new();
        self.stats.algorithm = Some(Algorithm::Zstd);
        self.stats.simd_used = self.config.accel.is_vectorized();
        header.write(out);
    }

    /// Drop the history so later blocks never reference earlier ones.
    pub(crate) fn forget_history(&mut self) {
        if let Some(delta) = self.history.reset() {
            self.blocks.rebase(delta);
        }
    }

    /// Encode the next block of the current frame.
    pub(crate) fn encode_block(&mut self, block: &[u8], last: bool, out: &mut Vec<u8>) -> Result<BlockKind> {
        let (start, rebase) = self.history.append(block);
        if let Some(delta) = rebase {
            self.blocks.rebase(delta);
        }
        let before = out.len();
        let kind = self.blocks.encode_block(&self.history, start, last, out)?;
        self.stats.record_block(kind, block.len(), out.len() - before);
        Ok(kind)
    }

    /// A last raw block of size 0, for frames with no content.
    pub(crate) fn write_empty_block(&mut self, out: &mut Vec<u8>) {
        BlockHeader::new(true, BlockType::Raw, 0).write(out);
        self.stats.record_block(BlockKind::Raw, 0, BlockHeader::SIZE);
    }

    pub(crate) fn write_checksum(&mut self, checksum: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(&checksum.to_le_bytes());
        self.stats.checksum = Some(checksum as u64);
    }

    pub(crate) fn end_frame(&mut self, input_len: usize, frame_len: usize, started: Instant) {
        self.stats.original_size = input_len;
        self.stats.compressed_size = frame_len;
        self.stats.time_us = started.elapsed().as_micros() as u64;
        tracing::debug!(
            input = input_len,
            output = frame_len,
            blocks = self.stats.blocks_processed,
            level = self.config.level.number(),
            "frame encoded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::ZstdLevel;
    use crate::decompress::decompress;
    use crate::frame::ZSTD_MAGIC;

    fn corpus(len: usize) -> Vec<u8> {
        crate::compress::finder::tests::corpus(len, 41)
    }

    #[test]
    fn test_empty_frame() {
        let mut enc = FrameEncoder::new(EncoderConfig::default().with_checksum(false));
        let frame = enc.compress(b"").unwrap();
        assert_eq!(&frame[..4], &ZSTD_MAGIC.to_le_bytes());
        assert_eq!(&frame[frame.len() - 3..], &[1, 0, 0]);
        assert_eq!(decompress(&frame).unwrap(), b"");
    }

    #[test]
    fn test_all_levels_roundtrip() {
        let data = corpus(300_000);
        for level in ZstdLevel::ALL {
            let mut enc = FrameEncoder::new(EncoderConfig::new(level));
            let frame = enc.compress(&data).unwrap();
            assert!(frame.len() < data.len() / 2, "{level:?}: {}", frame.len());
            assert_eq!(decompress(&frame).unwrap(), data, "{level:?}");
            assert_eq!(enc.stats().blocks_processed, 3);
            assert_eq!(enc.stats().compressed_size, frame.len());
        }
    }

    #[test]
    fn test_encoder_is_reusable() {
        let mut enc = FrameEncoder::default();
        let a = corpus(50_000);
        let first = enc.compress(&a).unwrap();
        let second = enc.compress(&a).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_small_window_and_blocks() {
        let data = corpus(100_000);
        let config = EncoderConfig::new(ZstdLevel::Better)
            .with_window_size(4096)
            .with_block_size(1000);
        let frame = FrameEncoder::new(config).compress(&data).unwrap();
        assert_eq!(decompress(&frame).unwrap(), data);
    }

    #[test]
    fn test_long_run_uses_rle_blocks() {
        let data = vec![0xAAu8; 1 << 20];
        let mut enc = FrameEncoder::default();
        let frame = enc.compress(&data).unwrap();
        assert_eq!(enc.stats().blocks_of(BlockKind::Rle), 8);
        assert_eq!(decompress(&frame).unwrap(), data);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_pipeline_matches_sequential() {
        let data = corpus(700_000);
        for depth in [1, 3] {
            let mut seq = FrameEncoder::default();
            let mut par = FrameEncoder::default();
            assert_eq!(
                par.compress_pipelined(&data, depth).unwrap(),
                seq.compress(&data).unwrap()
            );
        }
        assert_eq!(
            FrameEncoder::default().compress_pipelined(b"", 2).unwrap(),
            FrameEncoder::default().compress(b"").unwrap()
        );
    }
}
