//! Zstd compression pipeline.
//!
//! ```text
//! input ─► FrameEncoder ─► History ─► MatchFinder ─► SequenceBlock
//!              │                                         │
//!              │              ┌──────────────────────────┤
//!              │              ▼                          ▼
//!              │       LiteralsEncoder            SequenceEncoder
//!              │       (raw/rle/huff0)            (FSE, 4 modes)
//!              │              └────────────┬─────────────┘
//!              ▼                           ▼
//!        frame header ◄──────────── BlockEncoder (raw/rle/compressed)
//!        checksum
//! ```
//!
//! One [`FrameEncoder`] owns the history, the match finder tables, and the
//! entropy state a decoder will reconstruct. Blocks are encoded strictly in
//! order; the `parallel` feature only overlaps block splitting and
//! checksumming with encoding.

mod block;
pub mod finder;
mod frame;
mod literals;
mod sequences;
mod stream;

pub use block::BlockEncoder;
pub use finder::{History, MatchFinder};
pub use frame::{max_compressed_size, FrameEncoder};
pub use literals::LiteralsEncoder;
pub use sequences::SequenceEncoder;
pub use stream::ZstdStreamEncoder;

use vepar_core::CompressionLevel;
use vepar_simd::Accel;

use crate::frame::{MAX_BLOCK_SIZE, MAX_WINDOW_SIZE, MIN_WINDOW_SIZE};

/// Encoder levels, from fastest to densest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ZstdLevel {
    /// L1: one 2^16 hash table, greedy.
    Fastest,
    /// L2: one 2^18 hash table, greedy.
    Fast,
    /// L3: two entries per hash slot.
    Chained,
    /// L4: short and long hash tables.
    #[default]
    Default,
    /// L5: L4 plus a short-table chain.
    Better,
    /// L6: scored candidates, repeat checks and one-step lazy matching.
    Best,
}

impl ZstdLevel {
    /// All levels in order.
    pub const ALL: [ZstdLevel; 6] = [
        ZstdLevel::Fastest,
        ZstdLevel::Fast,
        ZstdLevel::Chained,
        ZstdLevel::Default,
        ZstdLevel::Better,
        ZstdLevel::Best,
    ];

    /// Level for a numeric setting.
    pub fn from_numeric(level: i32) -> Self {
        match level {
            i32::MIN..=1 => ZstdLevel::Fastest,
            2 => ZstdLevel::Fast,
            3 => ZstdLevel::Chained,
            4..=6 => ZstdLevel::Default,
            7..=9 => ZstdLevel::Better,
            _ => ZstdLevel::Best,
        }
    }

    /// 1-based level number.
    pub fn number(self) -> u8 {
        self as u8 + 1
    }
}

impl From<CompressionLevel> for ZstdLevel {
    fn from(level: CompressionLevel) -> Self {
        ZstdLevel::from_numeric(level.to_level())
    }
}

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Match finder level.
    pub level: ZstdLevel,
    /// Largest match distance, a power of two in `[1 KB, 128 MB]`.
    pub window_size: usize,
    /// Append the XXH64 content checksum.
    pub checksum: bool,
    /// Input bytes per block, at most 128 KB and at most the window.
    pub block_size: usize,
    /// Kernel selection.
    pub accel: Accel,
    /// Pending blocks in the parallel pipeline.
    pub pipeline_depth: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            level: ZstdLevel::Default,
            window_size: 8 << 20,
            checksum: true,
            block_size: MAX_BLOCK_SIZE,
            accel: Accel::default(),
            pipeline_depth: 4,
        }
    }
}

impl EncoderConfig {
    /// Default settings at `level`.
    pub fn new(level: ZstdLevel) -> Self {
        Self::default().with_level(level)
    }

    pub fn with_level(mut self, level: ZstdLevel) -> Self {
        self.level = level;
        self
    }

    /// Set the window, rounded up to a power of two and clamped to the
    /// format's range. The block size shrinks with it.
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size
            .clamp(MIN_WINDOW_SIZE as usize, MAX_WINDOW_SIZE as usize)
            .next_power_of_two();
        self.block_size = self.block_size.min(self.window_size);
        self
    }

    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// Set the block size, clamped to `[1, min(128 KB, window)]`.
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size.clamp(1, MAX_BLOCK_SIZE.min(self.window_size));
        self
    }

    pub fn with_accel(mut self, accel: Accel) -> Self {
        self.accel = accel;
        self
    }

    /// Set the pipeline depth (at least 1).
    pub fn with_pipeline_depth(mut self, depth: usize) -> Self {
        self.pipeline_depth = depth.max(1);
        self
    }
}
