//! Zstd frame decompression.
//!
//! [`FrameDecoder`] decodes whole frames from a slice; concatenated frames
//! decode in sequence. [`ZstdStreamDecoder`] accepts input in arbitrary
//! chunks and hands back output as blocks complete.

use tracing::{debug, trace, warn};
use vepar_core::{
    Algorithm, CompressionStats, Error, Result, StreamState, StreamingDecompressor,
};
use vepar_simd::Accel;

use crate::block::{BlockDecoder, PoolStats};
use crate::frame::{
    content_checksum, is_skippable, BlockHeader, ContentHasher, FrameHeader, MAX_BLOCK_SIZE,
    MAX_WINDOW_SIZE, ZSTD_MAGIC,
};

/// Decoder limits and options.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Largest window a frame may declare.
    pub max_window_size: u64,
    /// Cap on decoded bytes, checked against the declared content size and
    /// the running output.
    pub max_decoded_size: Option<u64>,
    /// Verify the content checksum when a frame carries one.
    pub verify_checksum: bool,
    /// Accelerator for match copies.
    pub accel: Accel,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_window_size: MAX_WINDOW_SIZE,
            max_decoded_size: None,
            verify_checksum: true,
            accel: Accel::default(),
        }
    }
}

impl DecoderConfig {
    /// Set the largest accepted window.
    pub fn with_max_window(mut self, bytes: u64) -> Self {
        self.max_window_size = bytes;
        self
    }

    /// Cap the decoded size.
    pub fn with_max_decoded_size(mut self, bytes: u64) -> Self {
        self.max_decoded_size = Some(bytes);
        self
    }

    /// Enable or disable checksum verification.
    pub fn with_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// Select the accelerator.
    pub fn with_accel(mut self, accel: Accel) -> Self {
        self.accel = accel;
        self
    }

    /// Check a parsed header against the limits, returning the window.
    fn admit(&self, header: &FrameHeader) -> Result<usize> {
        if header.window_size == 0 {
            warn!("rejecting frame with an empty window");
            return Err(Error::window_too_small(0));
        }
        if header.window_size > self.max_window_size {
            warn!(
                window = header.window_size,
                max = self.max_window_size,
                "rejecting frame window"
            );
            return Err(Error::WindowSizeExceeded {
                window: header.window_size,
                max: self.max_window_size,
            });
        }
        if header.dictionary_id != 0 {
            return Err(Error::Unsupported(format!(
                "frame requires dictionary {}",
                header.dictionary_id
            )));
        }
        if let (Some(size), Some(limit)) = (header.frame_content_size, self.max_decoded_size) {
            if size > limit {
                return Err(Error::MaxDecodedSizeExceeded { limit });
            }
        }
        Ok(header.window_size as usize)
    }
}

fn read_magic(input: &[u8]) -> Result<u32> {
    let Some(b) = input.get(..4) else {
        return Err(Error::unexpected_eof(input.len()));
    };
    let magic = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    if magic != ZSTD_MAGIC {
        if is_skippable(magic) {
            warn!(magic, "skippable frames are not supported");
        }
        return Err(Error::MagicMismatch { found: magic });
    }
    Ok(magic)
}

/// One-shot frame decoder.
///
/// Block state and table storage are reused across frames and calls.
#[derive(Debug)]
pub struct FrameDecoder {
    config: DecoderConfig,
    blocks: BlockDecoder,
    stats: CompressionStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl FrameDecoder {
    /// Decoder with `config`.
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            blocks: BlockDecoder::new(config.accel),
            config,
            stats: CompressionStats::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Statistics of the last [`FrameDecoder::decode_all`] call.
    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    /// Table storage counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.blocks.pool_stats()
    }

    /// Decode every frame in `input`.
    pub fn decode_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.stats = CompressionStats::new();
        self.stats.algorithm = Some(Algorithm::Zstd);
        let mut out = Vec::new();
        let mut pos = 0;
        loop {
            pos += self.decode_frame_at(&input[pos..], &mut out, 0)?;
            if pos == input.len() {
                break;
            }
        }
        self.stats.compressed_size = input.len();
        self.stats.original_size = out.len();
        Ok(out)
    }

    /// Decode the frame at the start of `input`, appending to `out`.
    ///
    /// Returns the number of input bytes the frame occupied.
    pub fn decode_frame(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<usize> {
        let origin = out.len();
        self.decode_frame_at(input, out, origin)
    }

    fn decode_frame_at(&mut self, input: &[u8], out: &mut Vec<u8>, origin: usize) -> Result<usize> {
        read_magic(input)?;
        let header = FrameHeader::parse(&input[4..])?;
        let window = self.config.admit(&header)?;
        let max_block = window.min(MAX_BLOCK_SIZE);
        debug!(
            window,
            content_size = ?header.frame_content_size,
            checksum = header.has_checksum,
            "decoding frame"
        );

        let base = out.len();
        if let Some(size) = header.frame_content_size {
            out.reserve(size.min(1 << 27) as usize);
        }
        self.blocks.reset();

        let mut pos = header.header_size;
        loop {
            let block = BlockHeader::parse(input.get(pos..).unwrap_or_default(), pos)?;
            block.check_size(max_block)?;
            pos += BlockHeader::SIZE;
            let size = block.compressed_size();
            let Some(content) = input.get(pos..pos + size) else {
                return Err(Error::unexpected_eof(input.len()));
            };

            let before = out.len();
            if let Err(e) = self.blocks.decode_block(&block, content, out, base, window) {
                return Err(match e {
                    Error::CorruptInput { message, offset: None } => {
                        Error::corrupt_at(message, pos)
                    }
                    other => other,
                });
            }
            pos += size;
            trace!(kind = ?block.block_type, size, decoded = out.len() - before, "block");
            self.stats
                .record_block(block.block_type.kind(), size, out.len() - before);

            if let Some(limit) = self.config.max_decoded_size {
                if (out.len() - origin) as u64 > limit {
                    return Err(Error::MaxDecodedSizeExceeded { limit });
                }
            }
            if block.last_block {
                break;
            }
        }

        let decoded = out.len() - base;
        if let Some(expected) = header.frame_content_size {
            if decoded as u64 != expected {
                return Err(Error::corrupt(format!(
                    "frame declares {} bytes, decoded {}",
                    expected, decoded
                )));
            }
        }
        if header.has_checksum {
            let Some(b) = input.get(pos..pos + 4) else {
                return Err(Error::unexpected_eof(input.len()));
            };
            pos += 4;
            if self.config.verify_checksum {
                let expected = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                let actual = content_checksum(&out[base..]);
                if expected != actual {
                    warn!(expected, actual, "content checksum mismatch");
                    return Err(Error::checksum_mismatch(expected, actual));
                }
            }
        }
        self.blocks.reset();
        Ok(pos)
    }
}

/// Decode every frame in `input` with default limits.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    FrameDecoder::default().decode_all(input)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    BlockHeader,
    Block(BlockHeader),
    Checksum,
    Done,
}

/// Incremental decoder over a stream of frames.
///
/// Input is buffered until a whole header or block is available; decoded
/// bytes wait in the history until the caller drains them. History beyond
/// the window is released once drained.
///
/// An empty chunk marks the end of input: fewer than four bytes left over
/// after a complete frame are then a truncated magic number.
#[derive(Debug)]
pub struct ZstdStreamDecoder {
    config: DecoderConfig,
    blocks: BlockDecoder,
    stage: Stage,
    state: StreamState,
    input: Vec<u8>,
    consumed: usize,
    history: Vec<u8>,
    drained: usize,
    base: usize,
    window: usize,
    has_checksum: bool,
    content_size: Option<u64>,
    hasher: ContentHasher,
    produced: u64,
}

impl Default for ZstdStreamDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl ZstdStreamDecoder {
    /// Drained history is compacted in steps of at least this many bytes.
    const COMPACT_STEP: usize = 1 << 16;

    /// Decoder with `config`.
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            blocks: BlockDecoder::new(config.accel),
            config,
            stage: Stage::Header,
            state: StreamState::Initial,
            input: Vec::new(),
            consumed: 0,
            history: Vec::new(),
            drained: 0,
            base: 0,
            window: 0,
            has_checksum: false,
            content_size: None,
            hasher: ContentHasher::new(),
            produced: 0,
        }
    }

    /// Lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Decoded bytes not yet handed to the caller.
    pub fn pending(&self) -> usize {
        self.history.len() - self.drained
    }

    fn take(&mut self, n: usize) {
        self.input.drain(..n);
        self.consumed += n;
    }

    fn advance(&mut self, at_end: bool) -> Result<()> {
        loop {
            match self.stage {
                Stage::Done => {
                    match self.input.len() {
                        0 => return Ok(()),
                        n if n < 4 && at_end => {
                            return Err(Error::unexpected_eof(self.consumed + n));
                        }
                        n if n < 4 => return Ok(()),
                        _ => {}
                    }
                    self.stage = Stage::Header;
                }
                Stage::Header => {
                    if self.input.len() < 4 {
                        return Ok(());
                    }
                    read_magic(&self.input)?;
                    let header = match FrameHeader::parse(&self.input[4..]) {
                        Ok(h) => h,
                        Err(Error::UnexpectedEof { .. }) => return Ok(()),
                        Err(e) => return Err(e),
                    };
                    self.window = self.config.admit(&header)?;
                    self.take(header.header_size);
                    self.blocks.reset();
                    self.hasher.reset();
                    self.has_checksum = header.has_checksum;
                    self.content_size = header.frame_content_size;
                    self.produced = 0;
                    self.base = self.history.len();
                    self.stage = Stage::BlockHeader;
                    debug!(window = self.window, "stream frame started");
                }
                Stage::BlockHeader => {
                    if self.input.len() < BlockHeader::SIZE {
                        return Ok(());
                    }
                    let block = BlockHeader::parse(&self.input, self.consumed)?;
                    block.check_size(self.window.min(MAX_BLOCK_SIZE))?;
                    self.take(BlockHeader::SIZE);
                    self.stage = Stage::Block(block);
                }
                Stage::Block(block) => {
                    let size = block.compressed_size();
                    if self.input.len() < size {
                        return Ok(());
                    }
                    let before = self.history.len();
                    self.blocks.decode_block(
                        &block,
                        &self.input[..size],
                        &mut self.history,
                        self.base,
                        self.window,
                    )?;
                    self.hasher.update(&self.history[before..]);
                    self.produced += (self.history.len() - before) as u64;
                    if let Some(limit) = self.config.max_decoded_size {
                        if self.produced > limit {
                            return Err(Error::MaxDecodedSizeExceeded { limit });
                        }
                    }
                    self.take(size);
                    self.stage = match (block.last_block, self.has_checksum) {
                        (false, _) => Stage::BlockHeader,
                        (true, true) => Stage::Checksum,
                        (true, false) => {
                            self.end_frame()?;
                            Stage::Done
                        }
                    };
                }
                Stage::Checksum => {
                    let Some(b) = self.input.get(..4) else {
                        return Ok(());
                    };
                    let expected = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    let actual = self.hasher.checksum();
                    if self.config.verify_checksum && expected != actual {
                        return Err(Error::checksum_mismatch(expected, actual));
                    }
                    self.take(4);
                    self.end_frame()?;
                    self.stage = Stage::Done;
                }
            }
        }
    }

    fn end_frame(&mut self) -> Result<()> {
        if let Some(expected) = self.content_size {
            if self.produced != expected {
                return Err(Error::corrupt(format!(
                    "frame declares {} bytes, decoded {}",
                    expected, self.produced
                )));
            }
        }
        self.blocks.reset();
        Ok(())
    }

    fn compact(&mut self) {
        let cut = match self.stage {
            Stage::Done | Stage::Header => self.drained,
            _ => self
                .drained
                .min(self.history.len().saturating_sub(self.window)),
        };
        if cut == 0 || (cut < Self::COMPACT_STEP && cut < self.history.len()) {
            return;
        }
        self.history.drain(..cut);
        self.drained -= cut;
        self.base = self.base.saturating_sub(cut);
    }
}

impl StreamingDecompressor for ZstdStreamDecoder {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Zstd
    }

    fn begin(&mut self) -> Result<()> {
        self.reset();
        self.state = StreamState::Active;
        Ok(())
    }

    fn decompress_chunk(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(usize, usize, bool)> {
        if self.state == StreamState::Error {
            return Err(Error::InvalidState {
                expected: "active stream",
                actual: "stream failed; reset first",
            });
        }
        self.state = StreamState::Active;
        self.input.extend_from_slice(input);
        if let Err(e) = self.advance(input.is_empty()) {
            self.state = StreamState::Error;
            return Err(e);
        }

        let n = self.pending().min(output.len());
        output[..n].copy_from_slice(&self.history[self.drained..self.drained + n]);
        self.drained += n;
        self.compact();

        let finished = self.stage == Stage::Done && self.pending() == 0 && self.input.is_empty();
        if finished {
            self.state = StreamState::Finished;
        }
        Ok((input.len(), n, finished))
    }

    fn is_finished(&self) -> bool {
        self.state == StreamState::Finished
    }

    fn reset(&mut self) {
        self.blocks.reset();
        self.stage = Stage::Header;
        self.state = StreamState::Initial;
        self.input.clear();
        self.consumed = 0;
        self.history.clear();
        self.drained = 0;
        self.base = 0;
        self.window = 0;
        self.has_checksum = false;
        self.content_size = None;
        self.hasher.reset();
        self.produced = 0;
    }
}
