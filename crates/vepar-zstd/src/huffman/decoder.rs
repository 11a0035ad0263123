//! Huffman stream decoder.
//!
//! Implements single and four-stream literal decoding for Zstandard.

use vepar_core::{Error, Result};

use super::table::HuffmanTable;
use crate::bits::ReverseBitReader;

/// Huffman bitstream decoder.
///
/// Decodes symbols from reverse bitstreams using a Huffman table.
#[derive(Debug, Clone, Copy)]
pub struct HuffmanDecoder<'a> {
    table: &'a HuffmanTable,
}

impl<'a> HuffmanDecoder<'a> {
    /// Create a new Huffman decoder with the given table.
    pub fn new(table: &'a HuffmanTable) -> Self {
        Self { table }
    }

    /// Decode a single symbol.
    ///
    /// Peeks `table_log` bits and consumes only the code bits. Past the head
    /// of the stream the peek sees zeros.
    #[inline]
    pub fn decode_symbol(&self, bits: &mut ReverseBitReader<'_>) -> u8 {
        bits.fill();
        let entry = self
            .table
            .decode(bits.peek_bits_fast(self.table.table_log()) as usize);
        bits.advance(entry.num_bits);
        entry.symbol
    }

    /// Get the underlying table.
    pub fn table(&self) -> &HuffmanTable {
        self.table
    }

    /// Decode exactly `n` symbols from one stream, appending them to `out`.
    pub fn decompress_1x(&self, input: &[u8], n: usize, out: &mut Vec<u8>) -> Result<()> {
        let mut bits = ReverseBitReader::new(input)?;
        out.reserve(n);
        for _ in 0..n {
            out.push(self.decode_symbol(&mut bits));
        }
        finish(&bits)
    }

    /// Decode exactly `n` symbols from a jump table and four streams,
    /// appending them to `out`.
    pub fn decompress_4x(&self, input: &[u8], n: usize, out: &mut Vec<u8>) -> Result<()> {
        if input.len() < 10 {
            return Err(Error::corrupt("four-stream literals shorter than jump table"));
        }
        let size = |i: usize| u16::from_le_bytes([input[2 * i], input[2 * i + 1]]) as usize;
        let (s1, s2, s3) = (size(0), size(1), size(2));
        let a = 6;
        let b = a + s1;
        let c = b + s2;
        let d = c + s3;
        if d >= input.len() {
            return Err(Error::corrupt(format!(
                "jump table sizes {} exceed {} stream bytes",
                d - a,
                input.len() - a
            )));
        }

        let segment = (n + 3) / 4;
        let Some(last) = n.checked_sub(3 * segment) else {
            return Err(Error::corrupt(format!(
                "{} literals cannot fill four streams",
                n
            )));
        };

        let mut streams = [
            ReverseBitReader::new(&input[a..b])?,
            ReverseBitReader::new(&input[b..c])?,
            ReverseBitReader::new(&input[c..d])?,
            ReverseBitReader::new(&input[d..])?,
        ];

        let base = out.len();
        out.resize(base + n, 0);
        let dst = &mut out[base..];

        // Interleave while all four streams have symbols left.
        for i in 0..last {
            for (k, bits) in streams.iter_mut().enumerate() {
                dst[k * segment + i] = self.decode_symbol(bits);
            }
        }
        for (k, bits) in streams.iter_mut().take(3).enumerate() {
            for i in last..segment {
                dst[k * segment + i] = self.decode_symbol(bits);
            }
        }

        for bits in &streams {
            finish(bits)?;
        }
        Ok(())
    }
}

fn finish(bits: &ReverseBitReader<'_>) -> Result<()> {
    if !bits.finished() {
        return Err(Error::corrupt(format!(
            "Huffman stream has {} unread bits",
            bits.remaining()
        )));
    }
    bits.close()
}
