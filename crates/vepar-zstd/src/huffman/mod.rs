//! Huffman coding for Zstandard literals (huff0).
//!
//! Zstd uses canonical Huffman codes whose lengths travel as weights in a
//! table descriptor. The descriptor is either FSE-compressed or packed as
//! 4-bit values, and the weight of the last symbol is implied by the others
//! summing to a power of two.
//!
//! ## Weight System
//!
//! - Weight `w > 0` means `code_length = table_log + 1 - w`
//! - Weight `0` means the symbol is absent
//! - Higher weight = shorter code = more frequent symbol
//!
//! ## Streams
//!
//! Literals are coded as one bitstream, or as four streams preceded by a
//! six-byte jump table holding the sizes of the first three. The four
//! segments are `ceil(n / 4)` bytes each, the last one takes the remainder.
//!
//! ## References
//!
//! - [RFC 8878 Section 4.2](https://datatracker.ietf.org/doc/html/rfc8878#section-4.2)

mod build;
mod decoder;
mod encoder;
mod table;

pub use build::optimal_table_log;
pub use decoder::HuffmanDecoder;
pub use encoder::{HuffmanCode, HuffmanCompressor, HuffmanEncoder, HuffmanOutput};
pub use table::{read_table, read_table_in, HuffmanTable, HuffmanTableEntry};

use vepar_core::Result;

/// Maximum number of symbols in a Huffman table (0-255 for literals).
pub const HUFFMAN_MAX_SYMBOLS: usize = 256;

/// Maximum Huffman weight value.
pub const HUFFMAN_MAX_WEIGHT: u8 = 12;

/// Largest table log a descriptor may declare.
pub const HUF_TABLELOG_MAX: u8 = 12;

/// Table log the encoder aims for.
pub const HUF_TABLELOG_DEFAULT: u8 = 11;

/// Smallest table log the encoder picks.
pub const HUF_TABLELOG_MIN: u8 = 5;

/// Largest input the encoder accepts in one call.
pub const HUF_BLOCK_SIZE_MAX: usize = 128 * 1024;

/// FSE table log for compressed weight descriptors.
pub const HUF_WEIGHTS_TABLELOG: u8 = 6;

/// Stream layout of a Huffman payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanStreams {
    /// One bitstream.
    Single,
    /// Four bitstreams behind a jump table.
    Four,
}

/// When a compressor may code with the previous block's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReusePolicy {
    /// Reuse when it is estimated to be smaller than a new table.
    #[default]
    Allow,
    /// Always build a new table.
    None,
    /// Reuse whenever the previous table can code the input.
    Prefer,
    /// Reuse or fail with `Incompressible`.
    Must,
}

/// Compress `input` as a table descriptor followed by one bitstream.
pub fn compress_1x(input: &[u8]) -> Result<Vec<u8>> {
    let mut c = HuffmanCompressor::new().with_reuse(ReusePolicy::None);
    Ok(c.compress(input, HuffmanStreams::Single)?.data)
}

/// Compress `input` as a table descriptor followed by four bitstreams.
pub fn compress_4x(input: &[u8]) -> Result<Vec<u8>> {
    let mut c = HuffmanCompressor::new().with_reuse(ReusePolicy::None);
    Ok(c.compress(input, HuffmanStreams::Four)?.data)
}

/// Decompress the output of [`compress_1x`] into `n` bytes.
pub fn decompress_1x(input: &[u8], n: usize) -> Result<Vec<u8>> {
    let (table, used) = read_table(input)?;
    let mut out = Vec::with_capacity(n);
    HuffmanDecoder::new(&table).decompress_1x(&input[used..], n, &mut out)?;
    Ok(out)
}

/// Decompress the output of [`compress_4x`] into `n` bytes.
pub fn decompress_4x(input: &[u8], n: usize) -> Result<Vec<u8>> {
    let (table, used) = read_table(input)?;
    let mut out = Vec::with_capacity(n);
    HuffmanDecoder::new(&table).decompress_4x(&input[used..], n, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vepar_core::Error;

    fn text() -> Vec<u8> {
        b"It was the best of times, it was the worst of times, it was the age of wisdom, \
          it was the age of foolishness, it was the epoch of belief, it was the epoch of \
          incredulity, it was the season of Light, it was the season of Darkness."
            .repeat(8)
    }

    #[test]
    fn test_roundtrip_single_stream() {
        let data = text();
        let packed = compress_1x(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress_1x(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_roundtrip_four_streams() {
        let data = text();
        for len in [12usize, 13, 14, 15, 16, 1000, data.len()] {
            let src = &data[..len];
            match compress_4x(src) {
                Ok(packed) => assert_eq!(decompress_4x(&packed, len).unwrap(), src),
                Err(Error::Incompressible) => assert!(len < 100),
                Err(e) => panic!("unexpected error {e}"),
            }
        }
    }

    #[test]
    fn test_digits_of_e() {
        let e = b"2.7182818284590452353602874713526624977572470936999595749669676277240766303535475945713821785251664274";
        let data = e.repeat(3);
        let packed = compress_1x(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress_1x(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_encoder_signals() {
        assert!(matches!(compress_1x(&[9; 300]), Err(Error::UseRle)));
        assert!(matches!(compress_1x(b"x"), Err(Error::Incompressible)));
        let spread: Vec<u8> = (0..=255).collect();
        assert!(matches!(compress_1x(&spread), Err(Error::Incompressible)));
        assert!(matches!(compress_4x(b"aab"), Err(Error::Incompressible)));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let data = text();
        let packed = compress_1x(&data).unwrap();
        assert!(decompress_1x(&packed, data.len() - 1).is_err());
        assert!(decompress_1x(&packed, data.len() + 1).is_err());
    }
}
