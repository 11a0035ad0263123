//! Huffman coding for DEFLATE.
//!
//! Canonical codes per RFC 1951 section 3.2.2: lengths are built with a
//! length limit, codes are assigned in symbol order within each length,
//! and stored bit-reversed for the LSB-first writer.

use std::sync::OnceLock;

use vepar_core::{Error, Result};

use crate::bits::{reverse_bits, BitReader};

/// Maximum bits in a literal/length or distance code.
pub const MAX_BITS: u32 = 15;

/// Maximum bits in a code length code.
pub const MAX_CL_BITS: u32 = 7;

/// Literal/length symbols a dynamic block may use.
pub const MAX_LIT_CODES: usize = 286;

/// Distance symbols a dynamic block may use.
pub const MAX_DIST_CODES: usize = 30;

/// Code length code symbols.
pub const MAX_CL_CODES: usize = 19;

/// End-of-block symbol.
pub const END_OF_BLOCK: usize = 256;

/// Fixed Huffman literal/length code lengths (RFC 1951 section 3.2.6).
pub const FIXED_LIT_LENGTHS: [u8; 288] = {
    let mut lengths = [0u8; 288];
    let mut i = 0;
    while i < 144 {
        lengths[i] = 8;
        i += 1;
    }
    while i < 256 {
        lengths[i] = 9;
        i += 1;
    }
    while i < 280 {
        lengths[i] = 7;
        i += 1;
    }
    while i < 288 {
        lengths[i] = 8;
        i += 1;
    }
    lengths
};

/// Fixed Huffman distance code lengths.
pub const FIXED_DIST_LENGTHS: [u8; 32] = [5; 32];

/// Order of code length codes in the dynamic header.
pub const CL_CODE_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Extra bits for length codes 257-285.
pub const LENGTH_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base lengths for length codes 257-285.
pub const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits for distance codes 0-29.
pub const DISTANCE_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Base distances for distance codes 0-29.
pub const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Index into [`LENGTH_BASE`] for a match length in `3..=258`.
#[inline]
pub fn length_code(length: u32) -> usize {
    LENGTH_BASE.partition_point(|&base| base as u32 <= length) - 1
}

/// Index into [`DISTANCE_BASE`] for a distance in `1..=32768`.
#[inline]
pub fn distance_code(distance: u32) -> usize {
    DISTANCE_BASE.partition_point(|&base| base as u32 <= distance) - 1
}

/// Length-limited Huffman code lengths for `freqs`.
///
/// Unused symbols get length 0. A lone used symbol gets a one-bit partner
/// so every emitted code is complete.
pub fn build_lengths(freqs: &[u32], max_bits: u32) -> Vec<u8> {
    let mut lengths = vec![0u8; freqs.len()];
    let mut leaves: Vec<(u32, usize)> = freqs
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f > 0)
        .map(|(s, &f)| (f, s))
        .collect();

    match leaves.len() {
        0 => return lengths,
        1 => {
            let sym = leaves[0].1;
            lengths[sym] = 1;
            if freqs.len() > 1 {
                lengths[if sym == 0 { 1 } else { 0 }] = 1;
            }
            return lengths;
        }
        _ => {}
    }
    leaves.sort_unstable();

    // Two-queue construction: leaves ascending, internal nodes appended in
    // the order they are created, which is also ascending.
    let n = leaves.len();
    let mut weight: Vec<u64> = leaves.iter().map(|&(f, _)| f as u64).collect();
    weight.resize(2 * n - 1, 0);
    let mut parent = vec![0usize; 2 * n - 1];
    let (mut leaf, mut node) = (0, n);
    for next in n..2 * n - 1 {
        let mut pick = || {
            if leaf < n && (node >= next || weight[leaf] <= weight[node]) {
                leaf += 1;
                leaf - 1
            } else {
                node += 1;
                node - 1
            }
        };
        let a = pick();
        let b = pick();
        weight[next] = weight[a] + weight[b];
        parent[a] = next;
        parent[b] = next;
    }

    let mut depth = vec![0u32; 2 * n - 1];
    let mut count = vec![0u32; max_bits as usize + 1];
    for i in (0..2 * n - 2).rev() {
        depth[i] = depth[parent[i]] + 1;
    }
    for &d in &depth[..n] {
        count[d.min(max_bits) as usize] += 1;
    }

    // Clamping to max_bits over-subscribes the code; pay it back by
    // splitting shorter codes.
    let max = max_bits as usize;
    let mut total: u64 = (1..=max).map(|i| (count[i] as u64) << (max - i)).sum();
    while total > 1u64 << max {
        count[max] -= 1;
        for i in (1..max).rev() {
            if count[i] > 0 {
                count[i] -= 1;
                count[i + 1] += 2;
                break;
            }
        }
        total -= 1;
    }

    let mut rarest = leaves.iter();
    for len in (1..=max).rev() {
        for _ in 0..count[len] {
            if let Some(&(_, sym)) = rarest.next() {
                lengths[sym] = len as u8;
            }
        }
    }
    lengths
}

/// Canonical encoder table.
#[derive(Debug, Clone)]
pub struct HuffmanCode {
    codes: Vec<u16>,
    lengths: Vec<u8>,
}

impl HuffmanCode {
    /// Assign canonical codes to `lengths`.
    pub fn from_lengths(lengths: &[u8]) -> Self {
        let mut bl_count = [0u32; MAX_BITS as usize + 1];
        for &len in lengths {
            bl_count[len as usize] += 1;
        }
        bl_count[0] = 0;

        let mut next_code = [0u32; MAX_BITS as usize + 1];
        let mut code = 0u32;
        for bits in 1..=MAX_BITS as usize {
            code = (code + bl_count[bits - 1]) << 1;
            next_code[bits] = code;
        }

        let codes = lengths
            .iter()
            .map(|&len| {
                if len == 0 {
                    return 0;
                }
                let code = next_code[len as usize];
                next_code[len as usize] += 1;
                reverse_bits(code, len as u32) as u16
            })
            .collect();
        Self {
            codes,
            lengths: lengths.to_vec(),
        }
    }

    /// Bit-reversed code and length of `symbol`.
    #[inline]
    pub fn get(&self, symbol: usize) -> (u32, u32) {
        (self.codes[symbol] as u32, self.lengths[symbol] as u32)
    }

    pub fn lengths(&self) -> &[u8] {
        &self.lengths
    }

    /// Bits needed to code `freqs` with this table.
    pub fn cost(&self, freqs: &[u32]) -> u64 {
        freqs
            .iter()
            .zip(&self.lengths)
            .map(|(&f, &len)| f as u64 * len as u64)
            .sum()
    }
}

/// Table-driven decoder indexed by the next `bits` input bits.
#[derive(Debug, Clone)]
pub struct HuffmanDecoder {
    /// `(symbol << 4) | length`, 0 for unused slots.
    table: Vec<u16>,
    bits: u32,
}

impl HuffmanDecoder {
    /// Build a decoder, rejecting over-subscribed length sets.
    ///
    /// Incomplete codes are accepted; their unused slots fail on lookup.
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let mut bl_count = [0i32; MAX_BITS as usize + 1];
        for &len in lengths {
            if len as u32 > MAX_BITS {
                return Err(Error::corrupt(format!("code length {len} exceeds {MAX_BITS}")));
            }
            bl_count[len as usize] += 1;
        }
        let mut left = 1i32;
        for &count in &bl_count[1..] {
            left = (left << 1) - count;
            if left < 0 {
                return Err(Error::corrupt("over-subscribed Huffman code"));
            }
        }
        Ok(Self::build(lengths))
    }

    fn build(lengths: &[u8]) -> Self {
        let bits = lengths.iter().copied().max().unwrap_or(0) as u32;
        if bits == 0 {
            return Self {
                table: Vec::new(),
                bits: 0,
            };
        }
        let code = HuffmanCode::from_lengths(lengths);
        let mut table = vec![0u16; 1 << bits];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let (reversed, len) = code.get(symbol);
            let entry = ((symbol as u16) << 4) | len as u16;
            let mut index = reversed as usize;
            while index < table.len() {
                table[index] = entry;
                index += 1 << len;
            }
        }
        Self { table, bits }
    }

    /// Decode one symbol.
    #[inline]
    pub fn decode(&self, reader: &mut BitReader) -> Result<u16> {
        if self.bits == 0 {
            return Err(Error::corrupt("symbol read from an empty Huffman code"));
        }
        let peek = reader.peek(self.bits);
        let entry = self.table[peek as usize];
        let len = (entry & 0xF) as u32;
        if len == 0 || len > reader.available() {
            if reader.available() < self.bits {
                return Err(Error::unexpected_eof(reader.bytes_consumed()));
            }
            return Err(Error::corrupt("invalid Huffman code"));
        }
        reader.consume(len);
        Ok(entry >> 4)
    }
}

/// Fixed literal/length and distance encoders.
pub fn fixed_codes() -> &'static (HuffmanCode, HuffmanCode) {
    static CODES: OnceLock<(HuffmanCode, HuffmanCode)> = OnceLock::new();
    CODES.get_or_init(|| {
        (
            HuffmanCode::from_lengths(&FIXED_LIT_LENGTHS),
            HuffmanCode::from_lengths(&FIXED_DIST_LENGTHS),
        )
    })
}

/// Fixed literal/length and distance decoders.
pub fn fixed_decoders() -> &'static (HuffmanDecoder, HuffmanDecoder) {
    static DECODERS: OnceLock<(HuffmanDecoder, HuffmanDecoder)> = OnceLock::new();
    DECODERS.get_or_init(|| {
        (
            HuffmanDecoder::build(&FIXED_LIT_LENGTHS),
            HuffmanDecoder::build(&FIXED_DIST_LENGTHS),
        )
    })
}
