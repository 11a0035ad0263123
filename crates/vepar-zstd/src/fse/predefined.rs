//! Predefined sequence distributions (RFC 8878 section 3.1.1.3.2.2).

use std::sync::OnceLock;

use vepar_core::{Error, Result};

use super::{FseDecodeTable, FseEncodeTable, NormalizedCounts};

/// Literal length table log.
pub const LL_DEFAULT_LOG: u8 = 6;
/// Match length table log.
pub const ML_DEFAULT_LOG: u8 = 6;
/// Offset table log.
pub const OF_DEFAULT_LOG: u8 = 5;

/// Literal length codes 0..=35.
pub const LL_DEFAULT_NORM: [i16; 36] = [
    4, 3, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 3, 2, 1, 1, 1, 1, 1,
    -1, -1, -1, -1,
];

/// Match length codes 0..=52.
pub const ML_DEFAULT_NORM: [i16; 53] = [
    1, 4, 3, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, -1, -1, -1, -1, -1, -1, -1,
];

/// Offset codes 0..=28.
pub const OF_DEFAULT_NORM: [i16; 29] = [
    1, 1, 1, 1, 1, 1, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, -1, -1, -1, -1, -1,
];

fn counts(norm: &[i16], log: u8) -> NormalizedCounts {
    NormalizedCounts::new(norm.to_vec(), log)
}

macro_rules! predefined_tables {
    ($dec:ident, $enc:ident, $norm:ident, $log:ident) => {
        #[doc = concat!("Decoding table for `", stringify!($norm), "`.")]
        pub fn $dec() -> Result<&'static FseDecodeTable> {
            static TABLE: OnceLock<Option<FseDecodeTable>> = OnceLock::new();
            TABLE
                .get_or_init(|| FseDecodeTable::build(&counts(&$norm, $log)).ok())
                .as_ref()
                .ok_or_else(|| invalid(stringify!($norm)))
        }

        #[doc = concat!("Encoding table for `", stringify!($norm), "`.")]
        pub fn $enc() -> Result<&'static FseEncodeTable> {
            static TABLE: OnceLock<Option<FseEncodeTable>> = OnceLock::new();
            TABLE
                .get_or_init(|| FseEncodeTable::build(&counts(&$norm, $log)).ok())
                .as_ref()
                .ok_or_else(|| invalid(stringify!($norm)))
        }
    };
}

fn invalid(name: &'static str) -> Error {
    Error::InvalidState {
        expected: "valid predefined distribution",
        actual: name,
    }
}

predefined_tables!(ll_decode_table, ll_encode_table, LL_DEFAULT_NORM, LL_DEFAULT_LOG);
predefined_tables!(ml_decode_table, ml_encode_table, ML_DEFAULT_NORM, ML_DEFAULT_LOG);
predefined_tables!(of_decode_table, of_encode_table, OF_DEFAULT_NORM, OF_DEFAULT_LOG);
