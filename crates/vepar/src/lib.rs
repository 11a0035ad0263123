//! # Vepar
//!
//! Pure Rust Zstandard and raw DEFLATE codecs.
//!
//! Both formats share one token model (literals and back-references), one
//! error type and one set of accelerated kernels. The entropy coders (huff0,
//! FSE, DEFLATE Huffman) and the match finders are public for callers that
//! want to drive them directly.
//!
//! ## Quick Start
//!
//! ```rust
//! use vepar::{Codec, Compressor, Decompressor, DeflateCodec, ZstdCodec};
//!
//! let zstd = ZstdCodec::new();
//! let frame = zstd.compress(b"Hello, Vepar! Hello, Vepar!").unwrap();
//! assert_eq!(zstd.decompress(&frame).unwrap(), b"Hello, Vepar! Hello, Vepar!");
//!
//! let deflate = DeflateCodec::new();
//! let stream = deflate.compress(b"Hello, Vepar! Hello, Vepar!").unwrap();
//! assert_eq!(deflate.decompress(&stream).unwrap(), b"Hello, Vepar! Hello, Vepar!");
//! ```
//!
//! ## Available Algorithms
//!
//! | Algorithm | Feature | Levels | Format |
//! |-----------|---------|--------|--------|
//! | Zstd | `zstd` | fastest, fast, chained, default, better, best | RFC 8878 frames |
//! | Deflate | `deflate` | -2, 0..=9 | RFC 1951 raw blocks |
//!
//! ## Feature Flags
//!
//! - `zstd` - Zstandard codec (default)
//! - `deflate` - raw DEFLATE codec (default)
//! - `parallel` - pipelined Zstd frame encoding with bit-identical output
//! - `full` - all of the above

pub use vepar_core::{
    Algorithm, BlockKind, Codec, CompressionLevel, CompressionRatio, CompressionStats,
    Compressor, Decompressor, Error, Flush, ParallelCompressor, Result, Sequence,
    SequenceBlock, StreamState, StreamingCompressor, StreamingDecompressor, Token,
};

/// Literal and back-reference tokens shared by both formats.
pub use vepar_core::token;

// Re-export Zstd
#[cfg(feature = "zstd")]
pub use vepar_zstd::{
    DecoderConfig, EncoderConfig, FrameDecoder, FrameEncoder, ZstdCodec, ZstdCompressor,
    ZstdDecompressor, ZstdLevel, ZstdStreamDecoder, ZstdStreamEncoder,
};

#[cfg(feature = "zstd")]
pub mod zstd {
    //! Zstandard building blocks: frames, blocks, huff0 and FSE.
    pub use vepar_zstd::{block, compress, decompress, frame, fse, huffman};
}

// Re-export Deflate
#[cfg(feature = "deflate")]
pub use vepar_deflate::{
    DeflateCodec, DeflateCompressor, DeflateConfig, DeflateDecompressor, Deflater,
    InflateConfig, Inflater,
};

#[cfg(feature = "deflate")]
pub mod deflate {
    //! DEFLATE building blocks: bit I/O, Huffman codes, matcher and writer.
    pub use vepar_deflate::{
        bits, deflate, huffman, inflate, inflate_to, inflate_with, matcher, tokens, writer,
        HUFFMAN_ONLY,
    };
}

pub mod simd {
    //! Accelerated kernels with portable fallbacks.
    pub use vepar_simd::{
        byte_histogram, copy_match, detect_simd, fill_repeat, has_avx2, match_length,
        simd_level, Accel, SimdLevel,
    };
}

/// Compress `input` with `algorithm` at `level`.
///
/// Levels map per codec; see [`ZstdLevel`] and [`DeflateConfig`].
pub fn compress(algorithm: Algorithm, level: CompressionLevel, input: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        #[cfg(feature = "zstd")]
        Algorithm::Zstd => ZstdCompressor::with_level(level).compress(input),
        #[cfg(feature = "deflate")]
        Algorithm::Deflate => {
            let config = DeflateConfig::from_level(level)?;
            vepar_deflate::deflate(input, config)
        }
        #[allow(unreachable_patterns)]
        other => Err(disabled(other)),
    }
}

/// Decompress `input` produced by `algorithm` with default limits.
pub fn decompress(algorithm: Algorithm, input: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        #[cfg(feature = "zstd")]
        Algorithm::Zstd => vepar_zstd::decompress(input),
        #[cfg(feature = "deflate")]
        Algorithm::Deflate => vepar_deflate::inflate(input),
        #[allow(unreachable_patterns)]
        other => Err(disabled(other)),
    }
}

fn disabled(algorithm: Algorithm) -> Error {
    Error::Unsupported(format!("{} support is not compiled in", algorithm.name()))
}
