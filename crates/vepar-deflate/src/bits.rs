//! LSB-first bit I/O for DEFLATE.
//!
//! DEFLATE packs fields starting at the least significant bit of each byte
//! and stores Huffman codes bit-reversed, so both directions keep a 64-bit
//! accumulator whose low bits are the next ones on the wire.

use vepar_core::{Error, Result};

#[inline]
fn low_bits(value: u64, n: u32) -> u64 {
    if n == 0 {
        0
    } else {
        value & (u64::MAX >> (64 - n))
    }
}

/// Forward bit reader.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u64,
    nbits: u32,
}

impl<'a> BitReader<'a> {
    /// Create a reader at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            nbits: 0,
        }
    }

    /// Create a reader positioned `bit` bits into `data`.
    pub fn at_bit(data: &'a [u8], bit: usize) -> Self {
        let mut reader = Self::new(data);
        reader.pos = (bit / 8).min(data.len());
        let skip = (bit % 8) as u32;
        if skip > 0 {
            reader.refill();
            let skip = skip.min(reader.nbits);
            reader.consume(skip);
        }
        reader
    }

    #[inline]
    fn refill(&mut self) {
        while self.nbits <= 56 && self.pos < self.data.len() {
            self.acc |= (self.data[self.pos] as u64) << self.nbits;
            self.pos += 1;
            self.nbits += 8;
        }
    }

    /// The next `n` bits (n <= 32) without consuming them. Bits past the
    /// end of input read as zero; see [`available`](Self::available).
    #[inline]
    pub fn peek(&mut self, n: u32) -> u32 {
        if self.nbits < n {
            self.refill();
        }
        low_bits(self.acc, n) as u32
    }

    /// Bits buffered after the last `peek`.
    #[inline]
    pub fn available(&self) -> u32 {
        self.nbits
    }

    /// Drop `n` buffered bits.
    #[inline]
    pub fn consume(&mut self, n: u32) {
        debug_assert!(n <= self.nbits);
        self.acc = if n >= 64 { 0 } else { self.acc >> n };
        self.nbits -= n;
    }

    /// Read `n` bits (n <= 32).
    #[inline]
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        let value = self.peek(n);
        if self.nbits < n {
            return Err(Error::unexpected_eof(self.pos));
        }
        self.consume(n);
        Ok(value)
    }

    /// Skip to the next byte boundary and hand whole buffered bytes back to
    /// the input.
    pub fn align(&mut self) {
        let partial = self.nbits % 8;
        self.consume(partial);
        self.pos -= (self.nbits / 8) as usize;
        self.acc = 0;
        self.nbits = 0;
    }

    /// Byte-aligned raw read of `n` bytes.
    pub fn read_aligned(&mut self, n: usize) -> Result<&'a [u8]> {
        self.align();
        let end = self.pos + n;
        let Some(bytes) = self.data.get(self.pos..end) else {
            return Err(Error::unexpected_eof(self.data.len()));
        };
        self.pos = end;
        Ok(bytes)
    }

    /// Bits consumed so far.
    #[inline]
    pub fn bit_position(&self) -> usize {
        self.pos * 8 - self.nbits as usize
    }

    /// Whole bytes consumed, counting a partly read byte as consumed.
    pub fn bytes_consumed(&self) -> usize {
        self.bit_position().div_ceil(8)
    }
}

/// Forward bit writer with 48-bit flushes.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    out: Vec<u8>,
    acc: u64,
    nbits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            acc: 0,
            nbits: 0,
        }
    }

    /// Append the low `n` bits of `value` (n <= 16).
    #[inline]
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 16);
        self.acc |= low_bits(value as u64, n) << self.nbits;
        self.nbits += n;
        if self.nbits >= 48 {
            self.out.extend_from_slice(&self.acc.to_le_bytes()[..6]);
            self.acc >>= 48;
            self.nbits -= 48;
        }
    }

    /// Pad with zero bits to a byte boundary and emit everything buffered.
    pub fn flush_align(&mut self) {
        while self.nbits > 0 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.nbits = self.nbits.saturating_sub(8);
        }
        self.acc = 0;
    }

    /// Byte-aligned raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.flush_align();
        self.out.extend_from_slice(bytes);
    }

    /// Bits written so far, including buffered ones.
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.out.len() * 8 + self.nbits as usize
    }

    /// Bits pending in the last, partial byte.
    #[inline]
    pub fn pending_bits(&self) -> u32 {
        self.nbits % 8
    }

    /// Move out every complete byte, keeping a partial byte buffered.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        while self.nbits >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.nbits -= 8;
        }
        std::mem::take(&mut self.out)
    }

    /// Pad to a byte boundary and return the output.
    pub fn finish(mut self) -> Vec<u8> {
        self.flush_align();
        self.out
    }
}

/// Reverse the low `len` bits of `code`.
#[inline]
pub fn reverse_bits(code: u32, len: u32) -> u32 {
    if len == 0 {
        0
    } else {
        code.reverse_bits() >> (32 - len)
    }
}
