//! DEFLATE decompression (inflate).
//!
//! Implements RFC 1951 decoding of stored, fixed-Huffman and dynamic-Huffman
//! blocks, one-shot and incremental.

use tracing::debug;
use vepar_core::{
    Algorithm, BlockKind, CompressionStats, Error, Result, StreamState, StreamingDecompressor,
};
use vepar_simd::Accel;

use crate::bits::BitReader;
use crate::huffman::{
    fixed_decoders, HuffmanDecoder, CL_CODE_ORDER, DISTANCE_BASE, DISTANCE_EXTRA_BITS,
    END_OF_BLOCK, LENGTH_BASE, LENGTH_EXTRA_BITS, MAX_CL_CODES, MAX_DIST_CODES, MAX_LIT_CODES,
};
use crate::matcher::WINDOW_SIZE;

/// Decoder limits and options.
#[derive(Debug, Clone, Default)]
pub struct InflateConfig {
    /// Cap on decoded bytes.
    pub max_output: Option<u64>,
    /// Accelerator for match copies.
    pub accel: Accel,
}

impl InflateConfig {
    /// Cap the decoded size.
    pub fn with_max_output(mut self, bytes: u64) -> Self {
        self.max_output = Some(bytes);
        self
    }

    /// Select the accelerator.
    pub fn with_accel(mut self, accel: Accel) -> Self {
        self.accel = accel;
        self
    }
}

/// Output position past which decoding fails.
#[derive(Debug, Clone, Copy)]
struct OutputCap {
    end: usize,
    limit: u64,
}

impl OutputCap {
    fn new(out_len: usize, produced: u64, limit: Option<u64>) -> Self {
        match limit {
            Some(limit) => Self {
                end: out_len.saturating_add(limit.saturating_sub(produced) as usize),
                limit,
            },
            None => Self {
                end: usize::MAX,
                limit: u64::MAX,
            },
        }
    }

    #[inline]
    fn check(&self, out_len: usize) -> Result<()> {
        if out_len > self.end {
            return Err(Error::MaxDecodedSizeExceeded { limit: self.limit });
        }
        Ok(())
    }
}

/// Decode one block onto `out`. Returns whether it was the final block.
fn inflate_block(
    reader: &mut BitReader,
    out: &mut Vec<u8>,
    accel: Accel,
    cap: OutputCap,
) -> Result<(bool, BlockKind)> {
    let last = reader.read_bits(1)? == 1;
    let btype = reader.read_bits(2)?;
    let kind = match btype {
        0 => {
            inflate_stored(reader, out, cap)?;
            BlockKind::Raw
        }
        1 => {
            let (lit, dist) = fixed_decoders();
            inflate_codes(reader, out, lit, dist, accel, cap)?;
            BlockKind::FixedHuffman
        }
        2 => {
            let (lit, dist) = read_dynamic_tables(reader)?;
            inflate_codes(reader, out, &lit, &dist, accel, cap)?;
            BlockKind::DynamicHuffman
        }
        _ => {
            return Err(Error::corrupt_at(
                "reserved block type 3",
                reader.bytes_consumed(),
            ))
        }
    };
    Ok((last, kind))
}

/// Inflate a stored (uncompressed) block.
fn inflate_stored(reader: &mut BitReader, out: &mut Vec<u8>, cap: OutputCap) -> Result<()> {
    let header = reader.read_aligned(4)?;
    let len = u16::from_le_bytes([header[0], header[1]]);
    let nlen = u16::from_le_bytes([header[2], header[3]]);
    if len != !nlen {
        return Err(Error::corrupt_at(
            "stored block length mismatch",
            reader.bytes_consumed(),
        ));
    }
    let data = reader.read_aligned(len as usize)?;
    cap.check(out.len() + data.len())?;
    out.extend_from_slice(data);
    Ok(())
}

/// Read the code-length preamble of a dynamic block.
fn read_dynamic_tables(reader: &mut BitReader) -> Result<(HuffmanDecoder, HuffmanDecoder)> {
    let hlit = reader.read_bits(5)? as usize + 257;
    let hdist = reader.read_bits(5)? as usize + 1;
    let hclen = reader.read_bits(4)? as usize + 4;

    if hlit > MAX_LIT_CODES || hdist > MAX_DIST_CODES {
        return Err(Error::corrupt(format!(
            "invalid code counts: {hlit} literal, {hdist} distance"
        )));
    }

    let mut cl_lengths = [0u8; MAX_CL_CODES];
    for &sym in &CL_CODE_ORDER[..hclen] {
        cl_lengths[sym] = reader.read_bits(3)? as u8;
    }
    let cl_decoder = HuffmanDecoder::from_lengths(&cl_lengths)?;

    let mut lengths = vec![0u8; hlit + hdist];
    let mut i = 0;
    while i < lengths.len() {
        let sym = cl_decoder.decode(reader)?;
        let (value, count) = match sym {
            0..=15 => (sym as u8, 1),
            16 => {
                if i == 0 {
                    return Err(Error::corrupt("repeat of a missing code length"));
                }
                (lengths[i - 1], reader.read_bits(2)? as usize + 3)
            }
            17 => (0, reader.read_bits(3)? as usize + 3),
            18 => (0, reader.read_bits(7)? as usize + 11),
            _ => return Err(Error::corrupt("invalid code length symbol")),
        };
        if i + count > lengths.len() {
            return Err(Error::corrupt("code length repeat overflows the table"));
        }
        lengths[i..i + count].fill(value);
        i += count;
    }

    if lengths[END_OF_BLOCK] == 0 {
        return Err(Error::corrupt("missing end-of-block code"));
    }

    let lit = HuffmanDecoder::from_lengths(&lengths[..hlit])?;
    let dist = HuffmanDecoder::from_lengths(&lengths[hlit..])?;
    Ok((lit, dist))
}

/// Decode literal/length and distance symbols up to end-of-block.
fn inflate_codes(
    reader: &mut BitReader,
    out: &mut Vec<u8>,
    lit: &HuffmanDecoder,
    dist: &HuffmanDecoder,
    accel: Accel,
    cap: OutputCap,
) -> Result<()> {
    loop {
        let sym = lit.decode(reader)? as usize;
        if sym < END_OF_BLOCK {
            out.push(sym as u8);
            cap.check(out.len())?;
            continue;
        }
        if sym == END_OF_BLOCK {
            return Ok(());
        }

        let code = sym - 257;
        if code >= LENGTH_BASE.len() {
            return Err(Error::corrupt(format!("invalid length symbol {sym}")));
        }
        let length = LENGTH_BASE[code] as usize
            + reader.read_bits(LENGTH_EXTRA_BITS[code] as u32)? as usize;

        let dsym = dist.decode(reader)? as usize;
        if dsym >= DISTANCE_BASE.len() {
            return Err(Error::corrupt(format!("invalid distance symbol {dsym}")));
        }
        let distance = DISTANCE_BASE[dsym] as usize
            + reader.read_bits(DISTANCE_EXTRA_BITS[dsym] as u32)? as usize;

        if distance > out.len() {
            return Err(Error::corrupt_at(
                format!("distance {distance} beyond {} bytes of output", out.len()),
                reader.bytes_consumed(),
            ));
        }
        cap.check(out.len() + length)?;
        accel.copy_match(out, distance, length);
    }
}

/// Inflate with explicit limits.
pub fn inflate_with(input: &[u8], config: &InflateConfig) -> Result<Vec<u8>> {
    let mut reader = BitReader::new(input);
    let mut out = Vec::with_capacity(input.len().saturating_mul(3));
    let cap = OutputCap::new(0, 0, config.max_output);
    loop {
        let (last, _) = inflate_block(&mut reader, &mut out, config.accel, cap)?;
        if last {
            return Ok(out);
        }
    }
}

/// Inflate a raw DEFLATE stream.
pub fn inflate(input: &[u8]) -> Result<Vec<u8>> {
    inflate_with(input, &InflateConfig::default())
}

/// Inflate into a caller buffer, returning the decoded length.
pub fn inflate_to(input: &[u8], output: &mut [u8]) -> Result<usize> {
    let decoded = inflate(input)?;
    if decoded.len() > output.len() {
        return Err(Error::buffer_too_small(decoded.len(), output.len()));
    }
    output[..decoded.len()].copy_from_slice(&decoded);
    Ok(decoded.len())
}

/// Incremental inflater.
///
/// Input is buffered and decoded one whole block at a time: a block cut
/// off by the end of the buffered input is rolled back and retried when
/// more arrives. Retries wait until the undecoded input has grown by half,
/// or until the caller passes an empty chunk.
#[derive(Debug)]
pub struct Inflater {
    config: InflateConfig,
    state: StreamState,
    input: Vec<u8>,
    /// Bit position of the next block within `input`.
    bit_pos: usize,
    retry_at: usize,
    history: Vec<u8>,
    drained: usize,
    produced: u64,
    done: bool,
    stats: CompressionStats,
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new(InflateConfig::default())
    }
}

impl Inflater {
    /// Drained history is compacted in steps of at least this many bytes.
    const COMPACT_STEP: usize = 1 << 16;

    pub fn new(config: InflateConfig) -> Self {
        Self {
            config,
            state: StreamState::Initial,
            input: Vec::new(),
            bit_pos: 0,
            retry_at: 0,
            history: Vec::new(),
            drained: 0,
            produced: 0,
            done: false,
            stats: CompressionStats::new(),
        }
    }

    /// Lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Decoded bytes not yet handed to the caller.
    pub fn pending(&self) -> usize {
        self.history.len() - self.drained
    }

    /// Blocks decoded so far, by kind.
    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    fn advance(&mut self, force: bool) -> Result<()> {
        if !force && self.input.len() < self.retry_at {
            return Ok(());
        }
        while !self.done {
            let mut reader = BitReader::at_bit(&self.input, self.bit_pos);
            let mark = self.history.len();
            let cap = OutputCap::new(mark, self.produced, self.config.max_output);
            match inflate_block(&mut reader, &mut self.history, self.config.accel, cap) {
                Ok((last, kind)) => {
                    let bits = reader.bit_position() - self.bit_pos;
                    let produced = self.history.len() - mark;
                    self.stats.record_block(kind, produced, bits / 8);
                    self.produced += produced as u64;
                    self.bit_pos = reader.bit_position();
                    self.done = last;
                }
                Err(Error::UnexpectedEof { .. }) => {
                    self.history.truncate(mark);
                    let undecoded = self.input.len() - self.bit_pos / 8;
                    self.retry_at = self.input.len() + undecoded / 2;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let whole = self.bit_pos / 8;
        if whole > 0 {
            self.input.drain(..whole);
            self.bit_pos -= whole * 8;
            self.retry_at = self.retry_at.saturating_sub(whole);
        }
        if self.done {
            debug!(
                output = self.produced,
                blocks = self.stats.blocks_processed,
                "inflate stream complete"
            );
        }
        Ok(())
    }

    fn compact(&mut self) {
        let cut = self
            .drained
            .min(self.history.len().saturating_sub(WINDOW_SIZE));
        if cut < Self::COMPACT_STEP {
            return;
        }
        self.history.drain(..cut);
        self.drained -= cut;
    }
}

impl StreamingDecompressor for Inflater {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Deflate
    }

    fn begin(&mut self) -> Result<()> {
        self.reset();
        self.state = StreamState::Active;
        Ok(())
    }

    fn decompress_chunk(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(usize, usize, bool)> {
        if self.state == StreamState::Error {
            return Err(Error::InvalidState {
                expected: "active stream",
                actual: "stream failed; reset first",
            });
        }
        self.state = StreamState::Active;
        if !self.done {
            self.input.extend_from_slice(input);
            if let Err(e) = self.advance(input.is_empty()) {
                self.state = StreamState::Error;
                return Err(e);
            }
        }

        let n = self.pending().min(output.len());
        output[..n].copy_from_slice(&self.history[self.drained..self.drained + n]);
        self.drained += n;
        self.compact();

        let finished = self.done && self.pending() == 0;
        if finished {
            self.state = StreamState::Finished;
        }
        Ok((input.len(), n, finished))
    }

    fn is_finished(&self) -> bool {
        self.state == StreamState::Finished
    }

    fn reset(&mut self) {
        self.state = StreamState::Initial;
        self.input.clear();
        self.bit_pos = 0;
        self.retry_at = 0;
        self.history.clear();
        self.drained = 0;
        self.produced = 0;
        self.done = false;
        self.stats = CompressionStats::new();
    }
}
