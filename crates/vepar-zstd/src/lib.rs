//! # Vepar Zstd
//!
//! Pure Rust Zstandard (RFC 8878) encoder and decoder.
//!
//! ## Quick Start
//!
//! ```rust
//! use vepar_zstd::{ZstdCodec, ZstdCompressor};
//! use vepar_core::{Compressor, Decompressor, CompressionLevel};
//!
//! let codec = ZstdCodec::new();
//! let compressed = codec.compress(b"Hello, World!").unwrap();
//! assert_eq!(codec.decompress(&compressed).unwrap(), b"Hello, World!");
//!
//! let compressor = ZstdCompressor::with_level(CompressionLevel::Best);
//! let compressed = compressor.compress(b"test data").unwrap();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        vepar-zstd                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  compress/          │  decompress.rs                        │
//! │  ├── finder/ (L1-6) │  FrameDecoder, ZstdStreamDecoder      │
//! │  ├── literals.rs    │                                       │
//! │  ├── sequences.rs   │                                       │
//! │  ├── block.rs       │                                       │
//! │  ├── frame.rs       │                                       │
//! │  └── stream.rs      │                                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  huffman/ (huff0)   │  fse/                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  frame/             │  block/                               │
//! │  ├── header.rs      │  ├── literals.rs                      │
//! │  ├── block.rs       │  ├── sequences.rs                     │
//! │  └── checksum.rs    │  └── executor.rs                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  bits.rs  (forward writer, reverse reader)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scope
//!
//! Frames are written without dictionaries, one frame per call. The decoder
//! rejects frames that name a dictionary and reports skippable frames as a
//! magic mismatch.
//!
//! ## Features
//!
//! - `parallel`: rayon for four-stream Huffman segments and a bounded
//!   crossbeam pipeline for frame blocks. Output never depends on it.
//!
//! ## References
//!
//! - [RFC 8878 - Zstandard Compression](https://datatracker.ietf.org/doc/html/rfc8878)
//! - [zstd_compression_format.md](https://github.com/facebook/zstd/blob/dev/doc/zstd_compression_format.md)

pub mod bits;
pub mod block;
pub mod compress;
pub mod decompress;
pub mod frame;
pub mod fse;
pub mod huffman;

use std::sync::Mutex;

pub use compress::{EncoderConfig, FrameEncoder, ZstdLevel, ZstdStreamEncoder};
pub use decompress::{decompress, DecoderConfig, FrameDecoder, ZstdStreamDecoder};

use vepar_core::{
    Algorithm, Codec, CompressionLevel, CompressionStats, Compressor, Decompressor,
    ParallelCompressor, Result,
};

/// Compress `input` into one frame with default settings.
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    FrameEncoder::default().compress(input)
}

/// [`Compressor`] over [`FrameEncoder`].
///
/// Every call encodes an independent frame; the statistics of the most
/// recent call are kept for [`Compressor::stats`].
#[derive(Debug)]
pub struct ZstdCompressor {
    level: CompressionLevel,
    config: EncoderConfig,
    last: Mutex<Option<CompressionStats>>,
}

impl ZstdCompressor {
    pub fn new() -> Self {
        Self::with_level(CompressionLevel::Default)
    }

    pub fn with_level(level: CompressionLevel) -> Self {
        Self {
            level,
            config: EncoderConfig::new(level.into()),
            last: Mutex::new(None),
        }
    }

    /// Wrap explicit settings; `level()` reports the nearest preset.
    pub fn with_config(config: EncoderConfig) -> Self {
        let level = match config.level {
            ZstdLevel::Fastest | ZstdLevel::Fast => CompressionLevel::Fast,
            ZstdLevel::Chained | ZstdLevel::Default => CompressionLevel::Default,
            ZstdLevel::Better => CompressionLevel::Best,
            ZstdLevel::Best => CompressionLevel::Ultra,
        };
        Self {
            level,
            config,
            last: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn remember(&self, stats: &CompressionStats) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(stats.clone());
        }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ZstdCompressor {
    fn clone(&self) -> Self {
        Self {
            level: self.level,
            config: self.config.clone(),
            last: Mutex::new(None),
        }
    }
}

impl Compressor for ZstdCompressor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Zstd
    }

    fn level(&self) -> CompressionLevel {
        self.level
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = FrameEncoder::new(self.config.clone());
        let out = encoder.compress(input)?;
        self.remember(encoder.stats());
        Ok(out)
    }

    fn max_compressed_size(&self, input_len: usize) -> usize {
        compress::max_compressed_size(input_len)
    }

    fn stats(&self) -> Option<CompressionStats> {
        self.last.lock().ok().and_then(|last| last.clone())
    }
}

impl ParallelCompressor for ZstdCompressor {
    fn compress_parallel(&self, input: &[u8], depth: usize) -> Result<Vec<u8>> {
        let depth = if depth == 0 {
            self.config.pipeline_depth
        } else {
            depth
        };
        #[cfg(feature = "parallel")]
        {
            let mut encoder = FrameEncoder::new(self.config.clone());
            let out = encoder.compress_pipelined(input, depth)?;
            self.remember(encoder.stats());
            Ok(out)
        }
        #[cfg(not(feature = "parallel"))]
        {
            tracing::trace!(depth, "parallel feature disabled, compressing sequentially");
            self.compress(input)
        }
    }

    fn set_threads(&mut self, depth: usize) {
        self.config = self.config.clone().with_pipeline_depth(depth);
    }
}

/// [`Decompressor`] over [`FrameDecoder`]; concatenated frames decode back to back.
#[derive(Debug, Clone, Default)]
pub struct ZstdDecompressor {
    config: DecoderConfig,
}

impl ZstdDecompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self { config }
    }
}

impl Decompressor for ZstdDecompressor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Zstd
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        FrameDecoder::new(self.config.clone()).decode_all(input)
    }
}

/// Both directions with default decoder limits.
#[derive(Debug, Clone, Default)]
pub struct ZstdCodec {
    compressor: ZstdCompressor,
    decompressor: ZstdDecompressor,
}

impl ZstdCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: CompressionLevel) -> Self {
        Self {
            compressor: ZstdCompressor::with_level(level),
            decompressor: ZstdDecompressor::new(),
        }
    }
}

impl Compressor for ZstdCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Zstd
    }

    fn level(&self) -> CompressionLevel {
        self.compressor.level()
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.compressor.compress(input)
    }

    fn max_compressed_size(&self, input_len: usize) -> usize {
        self.compressor.max_compressed_size(input_len)
    }

    fn stats(&self) -> Option<CompressionStats> {
        Compressor::stats(&self.compressor)
    }
}

impl Decompressor for ZstdCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Zstd
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.decompressor.decompress(input)
    }
}

impl Codec for ZstdCodec {
    fn new() -> Self {
        ZstdCodec::new()
    }

    fn with_level(level: CompressionLevel) -> Self {
        ZstdCodec::with_level(level)
    }
}
