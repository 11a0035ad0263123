//! Sequences section of a compressed block.
//!
//! ```text
//! +-----------------+-----------+-------------------+------------------+
//! | Number_of_Seqs  | Modes     | LL / OF / ML      | Bitstream        |
//! | 1-3 bytes       | 1 byte    | table descriptors | (read backwards) |
//! +-----------------+-----------+-------------------+------------------+
//! ```
//!
//! Each sequence is three codes (literal length, offset, match length)
//! decoded with one FSE state per stream. Codes map to a baseline plus a
//! number of extra bits read from the same bitstream.

use std::borrow::Cow;

use vepar_core::{Error, Result, Sequence};

use super::executor::RepeatOffsets;
use super::scratch::ScratchPool;
use crate::bits::{highbit32, ReverseBitReader};
use crate::fse::{
    self, read_ncount, FseDecodeTable, FseDecoderState, FseEncodeTable,
};

/// Literal length baselines by code.
pub const LL_BASELINE: [u32; 36] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 18, 20, 22, 24, 28, 32, 40, 48, 64,
    128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 65536,
];

/// Literal length extra bits by code.
pub const LL_BITS: [u8; 36] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 4, 6, 7, 8, 9, 10, 11,
    12, 13, 14, 15, 16,
];

/// Match length baselines by code.
pub const ML_BASELINE: [u32; 53] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
    28, 29, 30, 31, 32, 33, 34, 35, 37, 39, 41, 43, 47, 51, 59, 67, 83, 99, 131, 259, 515, 1027,
    2051, 4099, 8195, 16387, 32771, 65539,
];

/// Match length extra bits by code.
pub const ML_BITS: [u8; 53] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 1, 1, 1, 1, 2, 2, 3, 3, 4, 4, 5, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16,
];

/// Largest literal length code.
pub const LL_MAX_SYMBOL: u8 = 35;
/// Largest match length code.
pub const ML_MAX_SYMBOL: u8 = 52;
/// Largest offset code.
pub const OF_MAX_SYMBOL: u8 = 31;

/// Largest literal length table log.
pub const LL_MAX_LOG: u8 = 9;
/// Largest match length table log.
pub const ML_MAX_LOG: u8 = 9;
/// Largest offset table log.
pub const OF_MAX_LOG: u8 = 8;

/// Literal length code for `lit_len`.
#[inline]
pub fn ll_code(lit_len: u32) -> u8 {
    if lit_len < 64 {
        (LL_BASELINE.partition_point(|&b| b <= lit_len) - 1) as u8
    } else {
        highbit32(lit_len) as u8 + 19
    }
}

/// Match length code for `match_len` (at least 3).
#[inline]
pub fn ml_code(match_len: u32) -> u8 {
    let base = match_len.saturating_sub(3);
    if base < 128 {
        (ML_BASELINE.partition_point(|&b| b <= match_len).max(1) - 1) as u8
    } else {
        highbit32(base) as u8 + 36
    }
}

/// Offset code for an offset value (distance + 3, or a repeat code).
#[inline]
pub fn of_code(value: u32) -> u8 {
    highbit32(value) as u8
}

/// How a sequence stream gets its FSE table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqMode {
    /// The fixed distribution from the format.
    Predefined,
    /// Every code in the block is one symbol, stored as a single byte.
    Rle,
    /// A table descriptor follows.
    Fse,
    /// Reuse the table from the previous compressed block.
    Repeat,
}

impl SeqMode {
    /// Decode the 2-bit field.
    pub fn from_field(field: u8) -> Self {
        match field & 3 {
            0 => SeqMode::Predefined,
            1 => SeqMode::Rle,
            2 => SeqMode::Fse,
            _ => SeqMode::Repeat,
        }
    }

    /// The 2-bit field value.
    pub fn field(self) -> u8 {
        match self {
            SeqMode::Predefined => 0,
            SeqMode::Rle => 1,
            SeqMode::Fse => 2,
            SeqMode::Repeat => 3,
        }
    }
}

/// The three sequence streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqKind {
    /// Literal length codes.
    LiteralLength,
    /// Offset codes.
    Offset,
    /// Match length codes.
    MatchLength,
}

impl SeqKind {
    /// Streams in the order their descriptors appear.
    pub const ALL: [SeqKind; 3] = [SeqKind::LiteralLength, SeqKind::Offset, SeqKind::MatchLength];

    /// Largest code of this stream.
    pub fn max_symbol(self) -> u8 {
        match self {
            SeqKind::LiteralLength => LL_MAX_SYMBOL,
            SeqKind::Offset => OF_MAX_SYMBOL,
            SeqKind::MatchLength => ML_MAX_SYMBOL,
        }
    }

    /// Largest table log a descriptor may declare.
    pub fn max_log(self) -> u8 {
        match self {
            SeqKind::LiteralLength => LL_MAX_LOG,
            SeqKind::Offset => OF_MAX_LOG,
            SeqKind::MatchLength => ML_MAX_LOG,
        }
    }

    /// Predefined decoding table.
    pub fn predefined_decode(self) -> Result<&'static FseDecodeTable> {
        match self {
            SeqKind::LiteralLength => fse::ll_decode_table(),
            SeqKind::Offset => fse::of_decode_table(),
            SeqKind::MatchLength => fse::ml_decode_table(),
        }
    }

    /// Predefined encoding table.
    pub fn predefined_encode(self) -> Result<&'static FseEncodeTable> {
        match self {
            SeqKind::LiteralLength => fse::ll_encode_table(),
            SeqKind::Offset => fse::of_encode_table(),
            SeqKind::MatchLength => fse::ml_encode_table(),
        }
    }

    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            SeqKind::LiteralLength => "literal length",
            SeqKind::Offset => "offset",
            SeqKind::MatchLength => "match length",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SeqKind::LiteralLength => 0,
            SeqKind::Offset => 1,
            SeqKind::MatchLength => 2,
        }
    }
}

/// Sequence count and compression modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencesHeader {
    /// Number of sequences in the block.
    pub count: usize,
    /// Modes for literal length, offset and match length, in that order.
    pub modes: [SeqMode; 3],
    /// Bytes used by the count and mode byte.
    pub header_size: usize,
}

impl SequencesHeader {
    /// Header for `count` sequences.
    pub fn new(count: usize, modes: [SeqMode; 3]) -> Self {
        let header_size = match count {
            0 => 1,
            1..=127 => 2,
            128..=0x7EFF => 3,
            _ => 4,
        };
        Self {
            count,
            modes,
            header_size,
        }
    }

    /// Mode of one stream.
    pub fn mode(&self, kind: SeqKind) -> SeqMode {
        self.modes[kind.index()]
    }

    /// Parse the count and (for a non-zero count) the mode byte.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let Some(&b0) = input.first() else {
            return Err(Error::corrupt("missing sequences section"));
        };
        let (count, used) = match b0 {
            0 => {
                return Ok(Self::new(0, [SeqMode::Predefined; 3]));
            }
            1..=127 => (b0 as usize, 1),
            128..=254 => {
                let Some(&b1) = input.get(1) else {
                    return Err(Error::corrupt("truncated sequence count"));
                };
                ((((b0 as usize) - 0x80) << 8) + b1 as usize, 2)
            }
            255 => {
                let Some(b) = input.get(1..3) else {
                    return Err(Error::corrupt("truncated sequence count"));
                };
                (u16::from_le_bytes([b[0], b[1]]) as usize + 0x7F00, 3)
            }
        };
        let Some(&modes) = input.get(used) else {
            return Err(Error::corrupt("missing sequence compression modes"));
        };
        if modes & 3 != 0 {
            return Err(Error::corrupt("reserved bits set in sequence modes"));
        }
        Ok(Self {
            count,
            modes: [
                SeqMode::from_field(modes >> 6),
                SeqMode::from_field(modes >> 4),
                SeqMode::from_field(modes >> 2),
            ],
            header_size: used + 1,
        })
    }

    /// Append the count and mode byte to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        match self.count {
            0 => {
                out.push(0);
                return;
            }
            1..=127 => out.push(self.count as u8),
            128..=0x7EFF => {
                out.push(((self.count >> 8) + 0x80) as u8);
                out.push(self.count as u8);
            }
            _ => {
                out.push(0xFF);
                out.extend_from_slice(&((self.count - 0x7F00) as u16).to_le_bytes());
            }
        }
        let [ll, of, ml] = self.modes;
        out.push(ll.field() << 6 | of.field() << 4 | ml.field() << 2);
    }
}

/// Decoding tables for the three streams, kept between blocks for repeat
/// mode.
#[derive(Debug, Default)]
pub struct SequenceTables {
    tables: [Option<Cow<'static, FseDecodeTable>>; 3],
}

impl SequenceTables {
    /// No tables; repeat mode is invalid until a block sets them.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of one stream, if any block has set it.
    pub fn get(&self, kind: SeqKind) -> Option<&FseDecodeTable> {
        self.tables[kind.index()].as_deref()
    }

    /// Apply `header`'s modes, reading descriptors from `input`.
    ///
    /// Returns the number of bytes consumed.
    pub fn read(
        &mut self,
        header: &SequencesHeader,
        input: &[u8],
        pool: &mut ScratchPool,
    ) -> Result<usize> {
        let mut pos = 0;
        for kind in SeqKind::ALL {
            let slot = &mut self.tables[kind.index()];
            match header.mode(kind) {
                SeqMode::Predefined => {
                    release(slot, pool);
                    *slot = Some(Cow::Borrowed(kind.predefined_decode()?));
                }
                SeqMode::Rle => {
                    let Some(&symbol) = input.get(pos) else {
                        return Err(Error::corrupt(format!(
                            "missing {} RLE symbol",
                            kind.name()
                        )));
                    };
                    if symbol > kind.max_symbol() {
                        return Err(Error::corrupt(format!(
                            "{} RLE symbol {} exceeds {}",
                            kind.name(),
                            symbol,
                            kind.max_symbol()
                        )));
                    }
                    pos += 1;
                    release(slot, pool);
                    *slot = Some(Cow::Owned(FseDecodeTable::rle(symbol)));
                }
                SeqMode::Fse => {
                    let (norm, used) = read_ncount(
                        &input[pos..],
                        kind.max_symbol() as usize,
                        kind.max_log(),
                    )?;
                    pos += used;
                    release(slot, pool);
                    let storage = pool.take_fse(norm.table_log);
                    *slot = Some(Cow::Owned(FseDecodeTable::build_in(&norm, storage)?));
                }
                SeqMode::Repeat => {
                    if slot.is_none() {
                        return Err(Error::corrupt(format!(
                            "repeat {} table without a previous table",
                            kind.name()
                        )));
                    }
                }
            }
        }
        Ok(pos)
    }

    /// Hand owned tables back to `pool` and forget all tables.
    pub fn release(&mut self, pool: &mut ScratchPool) {
        for slot in self.tables.iter_mut() {
            release(slot, pool);
        }
    }
}

fn release(slot: &mut Option<Cow<'static, FseDecodeTable>>, pool: &mut ScratchPool) {
    if let Some(Cow::Owned(table)) = slot.take() {
        pool.put_fse(table);
    }
}

/// Decode `count` sequences from the backward bitstream `input`.
///
/// Offsets are resolved through `reps`, so the pushed sequences carry real
/// distances.
pub fn decode_sequences(
    input: &[u8],
    count: usize,
    tables: &SequenceTables,
    reps: &mut RepeatOffsets,
    out: &mut Vec<Sequence>,
) -> Result<()> {
    let table = |kind: SeqKind| {
        tables.get(kind).ok_or(Error::InvalidState {
            expected: "sequence tables",
            actual: "no table for stream",
        })
    };
    let (ll_table, of_table, ml_table) = (
        table(SeqKind::LiteralLength)?,
        table(SeqKind::Offset)?,
        table(SeqKind::MatchLength)?,
    );

    let mut r = ReverseBitReader::new(input)?;
    let mut ll = FseDecoderState::new(ll_table, &mut r);
    let mut of = FseDecoderState::new(of_table, &mut r);
    let mut ml = FseDecoderState::new(ml_table, &mut r);

    out.reserve(count);
    for i in 0..count {
        r.fill();
        let ll_code = ll.symbol() as usize;
        let ml_code = ml.symbol() as usize;
        let of_code = of.symbol();
        if ll_code > LL_MAX_SYMBOL as usize
            || ml_code > ML_MAX_SYMBOL as usize
            || of_code > OF_MAX_SYMBOL
        {
            return Err(Error::corrupt(format!("sequence {} has an invalid code", i)));
        }

        let value = (1u32 << of_code) + r.get_bits(of_code);
        r.fill();
        let match_len = ML_BASELINE[ml_code] + r.get_bits(ML_BITS[ml_code]);
        let lit_len = LL_BASELINE[ll_code] + r.get_bits(LL_BITS[ll_code]);
        let offset = reps.resolve(value, lit_len);
        out.push(Sequence::new(lit_len, offset, match_len));

        if i + 1 < count {
            r.fill();
            ll.update(&mut r);
            ml.update(&mut r);
            of.update(&mut r);
        }
        if r.overread() {
            return Err(Error::corrupt(format!(
                "sequence bitstream exhausted at sequence {} of {}",
                i, count
            )));
        }
    }
    if !r.finished() {
        return Err(Error::corrupt(format!(
            "{} bits left over after {} sequences",
            r.remaining(),
            count
        )));
    }
    r.close()
}
