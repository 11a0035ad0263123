//! Bit-level I/O for FSE and Huffman bitstreams.
//!
//! Zstd entropy streams are written forwards, least significant bit first,
//! and read backwards starting from the last byte. The final byte carries
//! an end marker: its highest set bit is padding, everything below it is
//! payload.
//!
//! ```text
//! writer:  bit 0 ─────────────────────────────► bit N   [1 marker] [0 pad]
//! reader:                      ◄───────────── starts after the marker
//! ```

use vepar_core::{Error, Result};

/// Index of the highest set bit. `v` must be non-zero.
#[inline]
pub fn highbit32(v: u32) -> u32 {
    31 - v.leading_zeros()
}

/// Forward bit writer with a 64-bit register and 32-bit flushes.
///
/// At most 32 bits may be added between two calls to [`BitWriter::flush32`].
#[derive(Debug, Default)]
pub struct BitWriter {
    bit_container: u64,
    n_bits: u8,
    out: Vec<u8>,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer that appends to `out`.
    pub fn from_vec(out: Vec<u8>) -> Self {
        Self {
            bit_container: 0,
            n_bits: 0,
            out,
        }
    }

    /// Add the low `bits` bits of `value`, `bits <= 16`.
    #[inline]
    pub fn add_bits16(&mut self, value: u16, bits: u8) {
        debug_assert!(bits <= 16);
        let v = value as u64 & ((1u64 << bits) - 1);
        self.bit_container |= v << (self.n_bits & 63);
        self.n_bits += bits;
    }

    /// Add the low `bits` bits of `value`, `bits <= 32`.
    #[inline]
    pub fn add_bits32(&mut self, value: u32, bits: u8) {
        debug_assert!(bits <= 32);
        let v = value as u64 & ((1u64 << bits) - 1);
        self.bit_container |= v << (self.n_bits & 63);
        self.n_bits += bits;
    }

    /// Emit four bytes if at least 32 bits are buffered.
    #[inline]
    pub fn flush32(&mut self) {
        if self.n_bits < 32 {
            return;
        }
        self.out
            .extend_from_slice(&(self.bit_container as u32).to_le_bytes());
        self.bit_container >>= 32;
        self.n_bits -= 32;
    }

    /// Emit every buffered bit, padding the last byte with zeros.
    pub fn flush_align(&mut self) {
        let n_bytes = (self.n_bits as usize + 7) >> 3;
        let bytes = self.bit_container.to_le_bytes();
        self.out.extend_from_slice(&bytes[..n_bytes]);
        self.n_bits = 0;
        self.bit_container = 0;
    }

    /// Write the end marker and align.
    pub fn close(&mut self) {
        self.flush32();
        self.add_bits16(1, 1);
        self.flush_align();
    }

    /// Bytes flushed so far.
    pub fn len(&self) -> usize {
        self.out.len()
    }

    /// True when nothing has been flushed.
    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// Give back the output buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.out
    }
}

/// Reads a Zstd entropy bitstream from its last byte towards its first.
///
/// `bits_read` counts consumed bits of `value`; values above 64 mean the
/// stream was overread, which [`ReverseBitReader::close`] reports.
#[derive(Debug)]
pub struct ReverseBitReader<'a> {
    input: &'a [u8],
    off: usize,
    value: u64,
    bits_read: u32,
}

impl<'a> ReverseBitReader<'a> {
    /// Position the reader just below the end marker of `input`.
    pub fn new(input: &'a [u8]) -> Result<Self> {
        let last = match input.last() {
            Some(&b) => b,
            None => return Err(Error::corrupt("empty bitstream")),
        };
        if last == 0 {
            return Err(Error::corrupt("bitstream end marker missing"));
        }
        let mut reader = ReverseBitReader {
            input,
            off: input.len(),
            value: 0,
            bits_read: 64,
        };
        if input.len() >= 8 {
            reader.fill_fast_start();
        } else {
            reader.fill();
            reader.fill();
        }
        reader.bits_read += 8 - highbit32(last as u32);
        Ok(reader)
    }

    /// Read `n` bits, `n <= 32`. Zero bits read as zero.
    #[inline]
    pub fn get_bits(&mut self, n: u8) -> u32 {
        if n == 0 {
            return 0;
        }
        self.get_bits_fast(n)
    }

    /// Read `n` bits without the zero guard, `1 <= n <= 32`.
    #[inline]
    pub fn get_bits_fast(&mut self, n: u8) -> u32 {
        let v = self.peek_bits_fast(n);
        self.bits_read += n as u32;
        v
    }

    /// Look at the next `n` bits without consuming them, `1 <= n <= 32`.
    #[inline]
    pub fn peek_bits_fast(&self, n: u8) -> u32 {
        ((self.value << (self.bits_read & 63)) >> ((64 - n as u32) & 63)) as u32
    }

    /// Consume `n` previously peeked bits.
    #[inline]
    pub fn advance(&mut self, n: u8) {
        self.bits_read += n as u32;
    }

    #[inline]
    fn fill_fast_start(&mut self) {
        self.off -= 8;
        self.value = load_u64(self.input, self.off);
        self.bits_read = 0;
    }

    /// Refill 32 bits. Requires at least four unread bytes.
    #[inline]
    pub fn fill_fast(&mut self) {
        if self.bits_read < 32 {
            return;
        }
        self.off -= 4;
        self.value = (self.value << 32) | load_u32(self.input, self.off) as u64;
        self.bits_read -= 32;
    }

    /// Refill as much as possible, byte-wise near the head of the stream.
    pub fn fill(&mut self) {
        if self.bits_read < 32 {
            return;
        }
        if self.off >= 4 {
            self.fill_fast();
            return;
        }
        while self.off > 0 {
            self.off -= 1;
            self.value = (self.value << 8) | self.input[self.off] as u64;
            self.bits_read -= 8;
        }
    }

    /// Unread bytes before the register.
    #[inline]
    pub fn off(&self) -> usize {
        self.off
    }

    /// All bits of the stream have been consumed.
    #[inline]
    pub fn finished(&self) -> bool {
        self.off == 0 && self.bits_read >= 64
    }

    /// More bits were consumed than the stream holds.
    #[inline]
    pub fn overread(&self) -> bool {
        self.bits_read > 64
    }

    /// Bits left to read.
    pub fn remaining(&self) -> usize {
        self.off * 8 + 64usize.saturating_sub(self.bits_read as usize)
    }

    /// Fail on overread.
    pub fn close(&self) -> Result<()> {
        if self.overread() {
            return Err(Error::corrupt(format!(
                "bitstream overread by {} bits",
                self.bits_read - 64
            )));
        }
        Ok(())
    }
}

#[inline]
fn load_u32(b: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]])
}

#[inline]
fn load_u64(b: &[u8], i: usize) -> u64 {
    u64::from_le_bytes([
        b[i],
        b[i + 1],
        b[i + 2],
        b[i + 3],
        b[i + 4],
        b[i + 5],
        b[i + 6],
        b[i + 7],
    ])
}
