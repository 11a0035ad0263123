//! DEFLATE compression.
//!
//! Implements RFC 1951 compression: hash-chain LZ77 feeding a block writer
//! that picks stored, fixed or dynamic Huffman coding per block.

use std::time::Instant;

use tracing::{debug, trace};
use vepar_core::{
    Algorithm, CompressionLevel, CompressionStats, Error, Flush, Result, StreamState,
    StreamingCompressor,
};
use vepar_simd::Accel;

use crate::matcher::{Matcher, Strategy};
use crate::tokens::TokenBuffer;
use crate::writer::{BlockType, BlockWriter};

/// Literal-only Huffman coding, no match search.
pub const HUFFMAN_ONLY: i32 = -2;

/// Highest DEFLATE level.
pub const MAX_LEVEL: i32 = 9;

/// Compression settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateConfig {
    /// `0` stores, `1..=9` search harder as they grow, [`HUFFMAN_ONLY`]
    /// codes literals only.
    pub level: i32,
    /// Accelerator for match extension.
    pub accel: Accel,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            level: 6,
            accel: Accel::default(),
        }
    }
}

impl DeflateConfig {
    /// Settings for `level`, which must be [`HUFFMAN_ONLY`] or `0..=9`.
    pub fn new(level: i32) -> Result<Self> {
        if level != HUFFMAN_ONLY && !(0..=MAX_LEVEL).contains(&level) {
            return Err(Error::InvalidLevel {
                level,
                min: HUFFMAN_ONLY,
                max: MAX_LEVEL,
            });
        }
        Ok(Self {
            level,
            ..Self::default()
        })
    }

    /// Map a generic level onto DEFLATE levels.
    pub fn from_level(level: CompressionLevel) -> Result<Self> {
        match level {
            CompressionLevel::None => Self::new(0),
            CompressionLevel::Fast => Self::new(1),
            CompressionLevel::Default => Self::new(6),
            CompressionLevel::Best | CompressionLevel::Ultra => Self::new(9),
            CompressionLevel::Custom(n) => Self::new(n),
        }
    }

    /// Select the accelerator.
    pub fn with_accel(mut self, accel: Accel) -> Self {
        self.accel = accel;
        self
    }

    pub fn strategy(&self) -> Strategy {
        Strategy::for_level(self.level)
    }
}

/// Compress `input` into a raw DEFLATE stream.
pub fn deflate(input: &[u8], config: DeflateConfig) -> Result<Vec<u8>> {
    Deflater::new(config).compress(input)
}

/// Incremental DEFLATE encoder.
///
/// One instance produces one stream. Output not taken by the caller stays
/// queued until the next call.
#[derive(Debug)]
pub struct Deflater {
    config: DeflateConfig,
    matcher: Matcher,
    tokens: TokenBuffer,
    writer: BlockWriter,
    state: StreamState,
    queued: Vec<u8>,
    drained: usize,
    stats: CompressionStats,
    started: Option<Instant>,
    total_in: usize,
    total_out: usize,
    finishing: bool,
}

impl Default for Deflater {
    fn default() -> Self {
        Self::new(DeflateConfig::default())
    }
}

impl Deflater {
    pub fn new(config: DeflateConfig) -> Self {
        Self {
            matcher: Matcher::new(config.strategy(), config.accel),
            config,
            tokens: TokenBuffer::new(),
            writer: BlockWriter::new(),
            state: StreamState::Initial,
            queued: Vec::new(),
            drained: 0,
            stats: Self::fresh_stats(config),
            started: None,
            total_in: 0,
            total_out: 0,
            finishing: false,
        }
    }

    fn fresh_stats(config: DeflateConfig) -> CompressionStats {
        let mut stats = CompressionStats::new();
        stats.algorithm = Some(Algorithm::Deflate);
        stats.simd_used = config.accel.is_vectorized();
        stats
    }

    pub fn config(&self) -> &DeflateConfig {
        &self.config
    }

    /// Lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Compressed bytes waiting for output space.
    pub fn pending(&self) -> usize {
        self.queued.len() - self.drained
    }

    /// Compress a whole input as one stream, resetting first.
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.reset();
        self.started = Some(Instant::now());
        self.total_in = input.len();
        self.push(input);
        self.close();
        let out = std::mem::take(&mut self.queued);
        self.total_out = out.len();
        self.end_stream();
        Ok(out)
    }

    /// Feed input through the window, writing blocks as tokens fill up.
    fn push(&mut self, mut input: &[u8]) {
        while !input.is_empty() {
            if self.matcher.is_full() {
                if !self.matcher.can_slide() {
                    self.emit_block(false);
                }
                self.matcher.slide();
            }
            let n = self.matcher.fill(input);
            input = &input[n..];
            self.tokenize(false);
        }
    }

    fn tokenize(&mut self, flush: bool) {
        while self.matcher.advance(&mut self.tokens, flush) {
            self.emit_block(false);
        }
    }

    fn emit_block(&mut self, last: bool) {
        let covered = self.tokens.covered();
        let before = self.writer.bit_len();
        let stored_only = self.matcher.strategy() == Strategy::Stored;
        let kind = self.writer.write_block(
            &self.tokens,
            self.matcher.block_bytes(covered),
            last,
            stored_only,
        );
        let bits = self.writer.bit_len() - before;
        trace!(?kind, covered, bytes = bits / 8, last, "block written");
        self.stats.record_block(kind.kind(), covered, bits / 8);
        self.matcher.consume_block(covered);
        self.tokens.clear();
        self.queued.extend_from_slice(&self.writer.take_bytes());
    }

    /// Write out everything buffered, leaving the stream open.
    fn flush_pending(&mut self) {
        self.tokenize(true);
        if self.tokens.covered() > 0 {
            self.emit_block(false);
        }
    }

    /// Write the final block.
    fn close(&mut self) {
        self.tokenize(true);
        self.emit_block(true);
        self.writer.align();
        self.queued.extend_from_slice(&self.writer.take_bytes());
        self.finishing = true;
    }

    fn flush(&mut self, flush: Flush) {
        match flush {
            Flush::None => {}
            Flush::Block => self.flush_pending(),
            Flush::Sync => {
                self.flush_pending();
                self.writer.write_sync_marker();
                self.queued.extend_from_slice(&self.writer.take_bytes());
            }
            Flush::Full => {
                self.flush_pending();
                self.writer.write_sync_marker();
                self.queued.extend_from_slice(&self.writer.take_bytes());
                self.matcher.forget_history();
            }
            Flush::Finish => self.close(),
        }
    }

    fn drain_into(&mut self, output: &mut [u8]) -> usize {
        let n = self.pending().min(output.len());
        output[..n].copy_from_slice(&self.queued[self.drained..self.drained + n]);
        self.drained += n;
        self.total_out += n;
        if self.drained == self.queued.len() {
            self.queued.clear();
            self.drained = 0;
        }
        n
    }

    fn check_writable(&self) -> Result<()> {
        if self.finishing {
            return Err(Error::InvalidState {
                expected: "active stream",
                actual: "finishing",
            });
        }
        match self.state {
            StreamState::Error => Err(Error::InvalidState {
                expected: "active stream",
                actual: "stream failed; reset first",
            }),
            s if !s.can_write() => Err(Error::InvalidState {
                expected: "active stream",
                actual: s.name(),
            }),
            _ => Ok(()),
        }
    }

    fn end_stream(&mut self) {
        self.stats.original_size = self.total_in;
        self.stats.compressed_size = self.total_out;
        if let Some(started) = self.started {
            self.stats.time_us = started.elapsed().as_micros() as u64;
        }
        self.state = StreamState::Finished;
        debug!(
            level = self.config.level,
            input = self.total_in,
            output = self.total_out,
            blocks = self.stats.blocks_processed,
            stored = self.stats.blocks_of(BlockType::Stored.kind()),
            "deflate stream complete"
        );
    }
}

impl StreamingCompressor for Deflater {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Deflate
    }

    fn begin(&mut self) -> Result<()> {
        self.reset();
        self.state = StreamState::Active;
        Ok(())
    }

    fn compress_chunk(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: Flush,
    ) -> Result<(usize, usize)> {
        self.check_writable()?;
        self.state = StreamState::Active;
        self.started.get_or_insert_with(Instant::now);
        self.total_in += input.len();

        self.push(input);
        self.flush(flush);
        let written = self.drain_into(output);
        Ok((input.len(), written))
    }

    fn finish(&mut self, output: &mut [u8]) -> Result<usize> {
        if self.state == StreamState::Finished {
            return Ok(0);
        }
        if !self.finishing {
            self.check_writable()?;
            self.started.get_or_insert_with(Instant::now);
            self.close();
        }
        let written = self.drain_into(output);
        if self.pending() == 0 {
            self.end_stream();
        }
        Ok(written)
    }

    fn reset(&mut self) {
        self.matcher.reset();
        self.tokens.clear();
        self.writer.reset();
        self.state = StreamState::Initial;
        self.queued.clear();
        self.drained = 0;
        self.stats = Self::fresh_stats(self.config);
        self.started = None;
        self.total_in = 0;
        self.total_out = 0;
        self.finishing = false;
    }

    fn stats(&self) -> CompressionStats {
        let mut stats = self.stats.clone();
        stats.original_size = self.total_in;
        stats.compressed_size = self.total_out;
        stats
    }
}
