//! Trait adapters over [`deflate`](crate::deflate) and [`inflate_with`](crate::inflate_with).

use std::sync::Mutex;

use vepar_core::{
    Algorithm, Codec, CompressionLevel, CompressionStats, Compressor, Decompressor, Result,
    StreamingCompressor,
};

use crate::deflate::{DeflateConfig, Deflater};
use crate::inflate::{inflate_with, InflateConfig};
use crate::writer::MAX_STORED_BLOCK;

/// [`Compressor`] for raw DEFLATE streams.
///
/// Levels outside the DEFLATE range fall back to the default level.
#[derive(Debug)]
pub struct DeflateCompressor {
    level: CompressionLevel,
    config: DeflateConfig,
    last: Mutex<Option<CompressionStats>>,
}

impl DeflateCompressor {
    pub fn new() -> Self {
        Self::with_level(CompressionLevel::Default)
    }

    /// Map a preset onto `-2` or `0..=9`.
    pub fn with_level(level: CompressionLevel) -> Self {
        let config = DeflateConfig::from_level(level).unwrap_or_default();
        Self {
            level,
            config,
            last: Mutex::new(None),
        }
    }

    pub fn with_config(config: DeflateConfig) -> Self {
        Self {
            level: CompressionLevel::from_level(config.level),
            config,
            last: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DeflateConfig {
        &self.config
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DeflateCompressor {
    fn clone(&self) -> Self {
        Self::with_config(self.config)
    }
}

impl Compressor for DeflateCompressor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Deflate
    }

    fn level(&self) -> CompressionLevel {
        self.level
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut deflater = Deflater::new(self.config);
        let out = deflater.compress(input)?;
        if let Ok(mut last) = self.last.lock() {
            *last = Some(StreamingCompressor::stats(&deflater));
        }
        Ok(out)
    }

    fn max_compressed_size(&self, input_len: usize) -> usize {
        // Every stored block costs five bytes; window slides and full token
        // buffers can split blocks below the stored maximum.
        input_len + (input_len / 8192 + input_len / MAX_STORED_BLOCK + 2) * 5 + 8
    }

    fn stats(&self) -> Option<CompressionStats> {
        self.last.lock().ok().and_then(|last| last.clone())
    }
}

/// [`Decompressor`] for raw DEFLATE streams.
#[derive(Debug, Clone, Default)]
pub struct DeflateDecompressor {
    config: InflateConfig,
}

impl DeflateDecompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an output cap or a fixed accelerator.
    pub fn with_config(config: InflateConfig) -> Self {
        Self { config }
    }
}

impl Decompressor for DeflateDecompressor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Deflate
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        inflate_with(input, &self.config)
    }
}

/// Both directions; the decompressor keeps default limits.
#[derive(Debug, Clone, Default)]
pub struct DeflateCodec {
    compressor: DeflateCompressor,
    decompressor: DeflateDecompressor,
}

impl DeflateCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: CompressionLevel) -> Self {
        Self {
            compressor: DeflateCompressor::with_level(level),
            decompressor: DeflateDecompressor::new(),
        }
    }
}

impl Compressor for DeflateCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Deflate
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

impl Decompressor for DeflateCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Deflate
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.decompressor.decompress(input)
    }
}

impl Codec for DeflateCodec {
    fn new() -> Self {
        DeflateCodec::new()
    }

    fn with_level(level: CompressionLevel) -> Self {
        DeflateCodec::with_level(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vepar_core::{BlockKind, Error};

    #[test]
    fn test_deflate_codec_roundtrip() {
        let codec = DeflateCodec::new();
        let input = b"Hello, World! Hello, World! Hello, World!";
        let compressed = codec.compress(input).unwrap();
        assert!(compressed.len() < input.len());
        assert_eq!(codec.decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_codec_levels() {
        let data = b"Test data for compression levels. ".repeat(200);
        for level in [
            CompressionLevel::None,
            CompressionLevel::Fast,
            CompressionLevel::Default,
            CompressionLevel::Best,
            CompressionLevel::Ultra,
            CompressionLevel::Custom(3),
            CompressionLevel::Custom(-2),
        ] {
            let codec = DeflateCodec::with_level(level);
            assert!(codec.verify_roundtrip(&data).unwrap(), "{level:?}");
        }
    }

    #[test]
    fn test_out_of_range_level_uses_default() {
        let compressor = DeflateCompressor::with_level(CompressionLevel::Custom(15));
        assert_eq!(compressor.config().level, 6);
        assert_eq!(compressor.level(), CompressionLevel::Custom(15));
    }

    #[test]
    fn test_stored_level_stats() {
        let compressor = DeflateCompressor::with_level(CompressionLevel::None);
        let data = vec![42u8; 100_000];
        let compressed = compressor.compress(&data).unwrap();
        assert!(compressed.len() <= compressor.max_compressed_size(data.len()));
        let stats = compressor.stats().unwrap();
        assert_eq!(stats.blocks_of(BlockKind::Raw), stats.blocks_processed);
        assert_eq!(stats.original_size, data.len());
        assert_eq!(stats.compressed_size, compressed.len());
    }

    #[test]
    fn test_compress_to_bounds() {
        let compressor = DeflateCompressor::new();
        let data = b"bounded output ".repeat(100);
        let mut out = vec![0u8; compressor.max_compressed_size(data.len())];
        let n = compressor.compress_to(&data, &mut out).unwrap();
        assert_eq!(DeflateDecompressor::new().decompress(&out[..n]).unwrap(), data);

        let mut tiny = [0u8; 2];
        assert!(matches!(
            compressor.compress_to(&data, &mut tiny),
            Err(Error::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_decompressor_limit() {
        let compressed = DeflateCompressor::new().compress(&[0u8; 10_000]).unwrap();
        let strict = DeflateDecompressor::with_config(InflateConfig::default().with_max_output(1000));
        assert!(matches!(
            strict.decompress(&compressed),
            Err(Error::MaxDecodedSizeExceeded { limit: 1000 })
        ));
    }
}
