//! # Vepar Core
//!
//! Core traits, types, and streaming API for the Vepar compression library.
//!
//! Vepar is named after the 42nd spirit of the Ars Goetia, a duke of the
//! waters who governs the sea, fitting for a library that moves data through
//! sliding windows and entropy streams.
//!
//! ## Design Philosophy
//!
//! - **Indices, not pointers**: match finders track absolute positions
//! - **Streaming-first**: all codecs support incremental processing
//! - **Accelerator-ready**: hot loops have portable and native twins
//! - **Typed failures**: every decode error names what went wrong
//!
//! ## Core Traits
//!
//! - [`Compressor`] - One-shot compression operations
//! - [`Decompressor`] - One-shot decompression operations
//! - [`Codec`] - Combined compress/decompress capability
//! - [`StreamingCompressor`] - Incremental compression
//! - [`StreamingDecompressor`] - Incremental decompression
//!
//! ## Example
//!
//! ```ignore
//! use vepar_core::{Codec, CompressionLevel};
//! use vepar_zstd::ZstdCodec;
//!
//! let codec = ZstdCodec::with_level(CompressionLevel::Fast);
//! let compressed = codec.compress(data)?;
//! let original = codec.decompress(&compressed)?;
//! ```

pub mod error;
pub mod stats;
pub mod stream;
pub mod token;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use stats::{BlockKind, CompressionStats};
pub use stream::{Flush, StreamState};
pub use token::{Sequence, SequenceBlock, Token};
pub use traits::{
    Codec, Compressor, Decompressor, ParallelCompressor, StreamingCompressor,
    StreamingDecompressor,
};
pub use types::{Algorithm, CompressionLevel, CompressionRatio};
