//! Finite State Entropy (tANS) coding.
//!
//! FSE codes a symbol stream with a single state value per stream. A
//! normalized distribution (counts summing to `1 << table_log`) is spread
//! over the table; the decoder reads the state's symbol, then a few bits to
//! pick the next state.
//!
//! Zstd uses FSE for the three sequence streams (literal lengths, match
//! lengths, offsets) and for compressing Huffman weight tables.
//!
//! ## Example
//!
//! ```
//! use vepar_zstd::fse;
//!
//! let data = b"abracadabra abracadabra abracadabra abracadabra".repeat(4);
//! let packed = fse::compress(&data, fse::FSE_DEFAULT_TABLELOG).unwrap();
//! let back = fse::decompress(&packed, fse::FSE_MAX_TABLELOG, data.len()).unwrap();
//! assert_eq!(back, data);
//! ```

mod coder;
mod ncount;
mod normalize;
mod predefined;
mod table;

pub use coder::{
    compress, compress_using, decompress, decompress_using, FseDecoderState, FseEncoderState,
};
pub use ncount::{read_ncount, write_ncount};
pub use normalize::{normalize_count, normalize_count2, optimal_table_log, NormalizedCounts};
pub use predefined::{
    ll_decode_table, ll_encode_table, ml_decode_table, ml_encode_table, of_decode_table,
    of_encode_table, LL_DEFAULT_LOG, LL_DEFAULT_NORM, ML_DEFAULT_LOG, ML_DEFAULT_NORM,
    OF_DEFAULT_LOG, OF_DEFAULT_NORM,
};
pub use table::{FseDecodeEntry, FseDecodeTable, FseEncodeTable, SymbolTransform};

/// Smallest table log a descriptor can carry.
pub const FSE_MIN_TABLELOG: u8 = 5;

/// Largest table log accepted by the standalone coder.
pub const FSE_MAX_TABLELOG: u8 = 15;

/// Table log used when the caller has no preference.
pub const FSE_DEFAULT_TABLELOG: u8 = 11;
