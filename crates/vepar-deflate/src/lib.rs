//! # Vepar Deflate
//!
//! Raw DEFLATE (RFC 1951) compression and decompression.
//!
//! ## Levels
//!
//! - **0**: stored blocks only
//! - **1-3**: greedy hash-chain matching
//! - **4-9**: lazy matching with longer chains
//! - **-2** ([`HUFFMAN_ONLY`]): literals only, entropy coded
//!
//! Each block is written as stored, fixed-Huffman or dynamic-Huffman,
//! whichever is smallest.
//!
//! ## Example
//!
//! ```rust
//! use vepar_core::{Codec, Compressor, Decompressor};
//! use vepar_deflate::DeflateCodec;
//!
//! let codec = DeflateCodec::new();
//! let compressed = codec.compress(b"abcabcabcabcabc").unwrap();
//! assert_eq!(codec.decompress(&compressed).unwrap(), b"abcabcabcabcabc");
//! ```
//!
//! Zlib and gzip wrappers are not provided.

pub mod bits;
pub mod codec;
pub mod deflate;
pub mod huffman;
pub mod inflate;
pub mod matcher;
pub mod tokens;
pub mod writer;

pub use codec::{DeflateCodec, DeflateCompressor, DeflateDecompressor};

pub use deflate::{deflate, DeflateConfig, Deflater, HUFFMAN_ONLY};
pub use inflate::{inflate, inflate_to, inflate_with, InflateConfig, Inflater};
