//! Huffman encoding for Zstd literals.
//!
//! [`HuffmanEncoder`] is one built code; [`HuffmanCompressor`] wraps it with
//! the signals a literal section needs (RLE, incompressible) and the
//! previous-table memory used for treeless literals.
//!
//! A compressor stages every newly built table. The caller commits it once
//! the block that carries it is actually emitted, so the previous table
//! always matches what the decoder has seen.

use vepar_core::{Error, Result};
use vepar_simd::Accel;

use super::build::{build_codes, optimal_table_log};
use super::{
    HuffmanStreams, ReusePolicy, HUF_BLOCK_SIZE_MAX, HUF_TABLELOG_DEFAULT, HUF_WEIGHTS_TABLELOG,
};
use crate::bits::BitWriter;
use crate::fse;

/// Code assigned to one symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HuffmanCode {
    /// Code bits, right-aligned.
    pub code: u16,
    /// Code length; zero for absent symbols.
    pub nb_bits: u8,
}

/// A built Huffman code over symbols `0..symbol_len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanEncoder {
    codes: Vec<HuffmanCode>,
    table_log: u8,
}

impl HuffmanEncoder {
    /// Build a code for `hist`, trimmed to its last non-zero count.
    ///
    /// At least two symbols must be present.
    pub fn build(hist: &[u32], max_table_log: u8) -> Result<Self> {
        let symbol_len = hist.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
        let hist = &hist[..symbol_len];
        let total: u64 = hist.iter().map(|&c| c as u64).sum();
        let max_bits = optimal_table_log(max_table_log, total as usize, symbol_len);
        let (codes, table_log) = build_codes(hist, max_bits)?;
        Ok(Self { codes, table_log })
    }

    /// Longest code length.
    #[inline]
    pub fn table_log(&self) -> u8 {
        self.table_log
    }

    /// Highest coded symbol + 1.
    #[inline]
    pub fn symbol_len(&self) -> usize {
        self.codes.len()
    }

    /// Code of `symbol`.
    #[inline]
    pub fn code(&self, symbol: u8) -> HuffmanCode {
        self.codes.get(symbol as usize).copied().unwrap_or_default()
    }

    /// Whether every symbol present in `hist` has a code.
    pub fn covers(&self, hist: &[u32]) -> bool {
        hist.iter()
            .enumerate()
            .all(|(s, &n)| n == 0 || self.codes.get(s).is_some_and(|c| c.nb_bits > 0))
    }

    /// Exact payload size in bits for `hist`, excluding padding.
    pub fn estimate_bits(&self, hist: &[u32]) -> u64 {
        hist.iter()
            .zip(self.codes.iter())
            .map(|(&n, c)| n as u64 * c.nb_bits as u64)
            .sum()
    }

    /// Per-symbol weights, `table_log + 1 - nb_bits` or 0.
    pub fn weights(&self) -> Vec<u8> {
        self.codes
            .iter()
            .map(|c| {
                if c.nb_bits == 0 {
                    0
                } else {
                    self.table_log + 1 - c.nb_bits
                }
            })
            .collect()
    }

    /// Append the table descriptor.
    ///
    /// Weights of all symbols but the last are written, FSE-compressed when
    /// that takes fewer than `symbol_len / 2` bytes.
    pub fn write_table(&self, out: &mut Vec<u8>) -> Result<()> {
        let weights = self.weights();
        let max_symbol_value = weights.len() - 1;
        let weights = &weights[..max_symbol_value];

        if max_symbol_value >= 2 {
            match fse::compress(weights, HUF_WEIGHTS_TABLELOG) {
                Ok(packed) if packed.len() < self.symbol_len() >> 1 => {
                    out.push(packed.len() as u8);
                    out.extend_from_slice(&packed);
                    return Ok(());
                }
                Ok(_) | Err(Error::Incompressible) | Err(Error::UseRle) => {}
                Err(e) => return Err(e),
            }
        }
        if max_symbol_value > 128 {
            return Err(Error::Incompressible);
        }
        out.push(128 | (max_symbol_value as u8 - 1));
        for pair in weights.chunks(2) {
            let lo = pair.get(1).copied().unwrap_or(0);
            out.push((pair[0] << 4) | lo);
        }
        Ok(())
    }

    #[inline]
    fn put(&self, w: &mut BitWriter, symbol: u8) {
        let c = self.codes[symbol as usize];
        w.add_bits16(c.code, c.nb_bits);
    }

    /// Append one bitstream coding `input` to `out`.
    ///
    /// Symbols are written from the end so the reverse reader yields them
    /// in order. Every byte of `input` must have a code.
    pub fn compress_1x(&self, input: &[u8], out: Vec<u8>) -> Vec<u8> {
        let mut w = BitWriter::from_vec(out);
        let mut n = input.len() & !3;
        for i in (0..input.len() & 3).rev() {
            self.put(&mut w, input[n + i]);
        }
        let narrow = self.table_log <= 8;
        while n >= 4 {
            let q = &input[n - 4..n];
            w.flush32();
            self.put(&mut w, q[3]);
            self.put(&mut w, q[2]);
            if !narrow {
                w.flush32();
            }
            self.put(&mut w, q[1]);
            self.put(&mut w, q[0]);
            n -= 4;
        }
        w.close();
        w.into_inner()
    }

    /// Append a jump table and four bitstreams coding `input` to `out`.
    pub fn compress_4x(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let segment = (input.len() + 3) / 4;
        let streams = self.encode_segments(input, segment);

        let jump = out.len();
        out.extend_from_slice(&[0; 6]);
        for (i, stream) in streams.iter().enumerate() {
            if stream.len() > u16::MAX as usize {
                return Err(Error::Incompressible);
            }
            if i < 3 {
                let at = jump + 2 * i;
                out[at..at + 2].copy_from_slice(&(stream.len() as u16).to_le_bytes());
            }
            out.extend_from_slice(stream);
        }
        Ok(())
    }

    #[cfg(feature = "parallel")]
    fn encode_segments(&self, input: &[u8], segment: usize) -> Vec<Vec<u8>> {
        use rayon::prelude::*;
        let chunks: Vec<&[u8]> = split_segments(input, segment);
        chunks
            .par_iter()
            .map(|seg| self.compress_1x(seg, Vec::with_capacity(seg.len())))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn encode_segments(&self, input: &[u8], segment: usize) -> Vec<Vec<u8>> {
        split_segments(input, segment)
            .into_iter()
            .map(|seg| self.compress_1x(seg, Vec::with_capacity(seg.len())))
            .collect()
    }
}

fn split_segments(input: &[u8], segment: usize) -> Vec<&[u8]> {
    let mut rest = input;
    (0..4)
        .map(|_| {
            let take = segment.min(rest.len());
            let (head, tail) = rest.split_at(take);
            rest = tail;
            head
        })
        .collect()
}

/// Output of [`HuffmanCompressor::compress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanOutput {
    /// Table descriptor (unless reused) followed by the payload.
    pub data: Vec<u8>,
    /// Bytes of `data` taken by the descriptor; 0 when reused.
    pub table_len: usize,
    /// The previous table coded this input.
    pub reused: bool,
}

/// Literal compressor with table reuse across blocks.
#[derive(Debug, Clone)]
pub struct HuffmanCompressor {
    max_table_log: u8,
    reuse: ReusePolicy,
    accel: Accel,
    prev: Option<HuffmanEncoder>,
    pending: Option<HuffmanEncoder>,
}

impl Default for HuffmanCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl HuffmanCompressor {
    /// Compressor with the default table log and [`ReusePolicy::Allow`].
    pub fn new() -> Self {
        Self {
            max_table_log: HUF_TABLELOG_DEFAULT,
            reuse: ReusePolicy::default(),
            accel: Accel::default(),
            prev: None,
            pending: None,
        }
    }

    /// Set the reuse policy.
    pub fn with_reuse(mut self, reuse: ReusePolicy) -> Self {
        self.reuse = reuse;
        self
    }

    /// Set the maximum table log.
    pub fn with_max_table_log(mut self, log: u8) -> Self {
        self.max_table_log = log;
        self
    }

    /// Set the histogram kernel.
    pub fn with_accel(mut self, accel: Accel) -> Self {
        self.accel = accel;
        self
    }

    /// Table a decoder currently holds.
    pub fn prev_table(&self) -> Option<&HuffmanEncoder> {
        self.prev.as_ref()
    }

    /// Make the table built by the last `compress` the previous table.
    pub fn commit(&mut self) {
        if let Some(table) = self.pending.take() {
            self.prev = Some(table);
        }
    }

    /// Drop the table built by the last `compress`.
    pub fn discard(&mut self) {
        self.pending = None;
    }

    /// Forget all tables.
    pub fn reset(&mut self) {
        self.prev = None;
        self.pending = None;
    }

    /// Compress `input`.
    ///
    /// Returns [`Error::UseRle`] when one byte value fills the input and
    /// [`Error::Incompressible`] when the output would not be smaller.
    pub fn compress(&mut self, input: &[u8], streams: HuffmanStreams) -> Result<HuffmanOutput> {
        self.pending = None;
        if input.len() <= 1 {
            return Err(Error::Incompressible);
        }
        if input.len() > HUF_BLOCK_SIZE_MAX {
            return Err(Error::Unsupported(format!(
                "Huffman input of {} bytes exceeds {}",
                input.len(),
                HUF_BLOCK_SIZE_MAX
            )));
        }
        let hist = self.accel.histogram(input);
        let max_count = hist.iter().copied().max().unwrap_or(0) as usize;
        if max_count == input.len() {
            return Err(Error::UseRle);
        }
        if max_count == 1 || max_count <= input.len() >> 7 {
            return Err(Error::Incompressible);
        }
        if streams == HuffmanStreams::Four && input.len() < 12 {
            return Err(Error::Incompressible);
        }

        let can_reuse = self.reuse != ReusePolicy::None
            && self.prev.as_ref().is_some_and(|p| p.covers(&hist));
        if self.reuse == ReusePolicy::Must && !can_reuse {
            return Err(Error::Incompressible);
        }
        if can_reuse && matches!(self.reuse, ReusePolicy::Prefer | ReusePolicy::Must) {
            match self.encode_reused(input, streams) {
                Ok(out) => return Ok(out),
                Err(e) if self.reuse == ReusePolicy::Must => return Err(e),
                Err(_) => {}
            }
        }

        let table = HuffmanEncoder::build(&hist, self.max_table_log)?;
        let mut data = Vec::with_capacity(input.len());
        let table_len = match table.write_table(&mut data) {
            Ok(()) => data.len(),
            Err(Error::Incompressible) if can_reuse => {
                return self.encode_reused(input, streams);
            }
            Err(e) => return Err(e),
        };

        if can_reuse && self.reuse == ReusePolicy::Allow {
            let old_bits = self.prev.as_ref().map_or(u64::MAX, |p| p.estimate_bits(&hist));
            let new_bits = table.estimate_bits(&hist) + table_len as u64 * 8;
            if old_bits < new_bits {
                tracing::trace!(old_bits, new_bits, "reusing previous Huffman table");
                return self.encode_reused(input, streams);
            }
        }

        let data = encode_with(&table, input, streams, data)?;
        if data.len() >= input.len() {
            return Err(Error::Incompressible);
        }
        self.pending = Some(table);
        Ok(HuffmanOutput {
            data,
            table_len,
            reused: false,
        })
    }

    fn encode_reused(&self, input: &[u8], streams: HuffmanStreams) -> Result<HuffmanOutput> {
        let prev = self.prev.as_ref().ok_or(Error::Incompressible)?;
        let data = encode_with(prev, input, streams, Vec::with_capacity(input.len()))?;
        if data.len() >= input.len() {
            return Err(Error::Incompressible);
        }
        Ok(HuffmanOutput {
            data,
            table_len: 0,
            reused: true,
        })
    }
}

fn encode_with(
    table: &HuffmanEncoder,
    input: &[u8],
    streams: HuffmanStreams,
    mut out: Vec<u8>,
) -> Result<Vec<u8>> {
    match streams {
        HuffmanStreams::Single => Ok(table.compress_1x(input, out)),
        HuffmanStreams::Four => {
            table.compress_4x(input, &mut out)?;
            Ok(out)
        }
    }
}
