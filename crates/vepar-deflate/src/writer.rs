//! DEFLATE block writer.
//!
//! Every block is costed three ways (stored, fixed Huffman, dynamic Huffman)
//! and written in whichever form is smallest in bits.

use tracing::trace;
use vepar_core::{BlockKind, Token};

use crate::bits::BitWriter;
use crate::huffman::{
    build_lengths, distance_code, fixed_codes, length_code, HuffmanCode, CL_CODE_ORDER,
    DISTANCE_BASE, DISTANCE_EXTRA_BITS, END_OF_BLOCK, LENGTH_BASE, LENGTH_EXTRA_BITS, MAX_BITS,
    MAX_CL_BITS, MAX_CL_CODES,
};
use crate::tokens::TokenBuffer;

/// Largest payload of one stored block.
pub const MAX_STORED_BLOCK: usize = 65535;

/// Block encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Stored,
    Fixed,
    Dynamic,
}

impl BlockType {
    pub fn kind(self) -> BlockKind {
        match self {
            BlockType::Stored => BlockKind::Raw,
            BlockType::Fixed => BlockKind::FixedHuffman,
            BlockType::Dynamic => BlockKind::DynamicHuffman,
        }
    }
}

/// Extra bits carried by the length and distance symbols of a block.
fn extra_bits(lit_freq: &[u32], dist_freq: &[u32]) -> u64 {
    let lengths: u64 = LENGTH_EXTRA_BITS
        .iter()
        .zip(&lit_freq[257..])
        .map(|(&e, &f)| e as u64 * f as u64)
        .sum();
    let distances: u64 = DISTANCE_EXTRA_BITS
        .iter()
        .zip(dist_freq)
        .map(|(&e, &f)| e as u64 * f as u64)
        .sum();
    lengths + distances
}

/// Shannon bound of coding `freqs`, rounded up.
fn entropy_bits(freqs: &[u32]) -> u64 {
    let total: u64 = freqs.iter().map(|&f| f as u64).sum();
    if total == 0 {
        return 0;
    }
    let total_f = total as f64;
    let bits: f64 = freqs
        .iter()
        .filter(|&&f| f > 0)
        .map(|&f| {
            let f = f as f64;
            -f * (f / total_f).log2()
        })
        .sum();
    bits.ceil() as u64
}

/// Lower bound on the size of a dynamic block.
pub fn estimate_dynamic_bits(lit_freq: &[u32], dist_freq: &[u32]) -> u64 {
    // 3 block header bits and the 14-bit HLIT/HDIST/HCLEN fields.
    17 + entropy_bits(lit_freq) + entropy_bits(dist_freq) + extra_bits(lit_freq, dist_freq)
}

/// Exact size of `len` bytes written as stored blocks starting at a bit
/// offset of `pending` within the current byte.
pub fn stored_bits(len: usize, pending: u32) -> u64 {
    let chunks = len.div_ceil(MAX_STORED_BLOCK).max(1) as u64;
    let first_pad = (8 - (pending + 3) % 8) % 8;
    3 + first_pad as u64 + (chunks - 1) * 8 + chunks * 32 + len as u64 * 8
}

/// Exact size of a fixed-Huffman block.
pub fn fixed_bits(lit_freq: &[u32], dist_freq: &[u32]) -> u64 {
    let (lit, dist) = fixed_codes();
    3 + lit.cost(lit_freq) + dist.cost(dist_freq) + extra_bits(lit_freq, dist_freq)
}

/// Code-length alphabet symbol with its repeat argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClSymbol {
    symbol: u8,
    extra: u8,
}

impl ClSymbol {
    fn extra_len(self) -> u32 {
        match self.symbol {
            16 => 2,
            17 => 3,
            18 => 7,
            _ => 0,
        }
    }
}

/// Run-length code a sequence of code lengths with symbols 16, 17 and 18.
fn run_length_code(lengths: &[u8]) -> Vec<ClSymbol> {
    let mut out = Vec::with_capacity(lengths.len());
    let mut i = 0;
    while i < lengths.len() {
        let len = lengths[i];
        let mut run = 1;
        while i + run < lengths.len() && lengths[i + run] == len {
            run += 1;
        }
        i += run;

        if len == 0 {
            while run >= 11 {
                let r = run.min(138);
                out.push(ClSymbol { symbol: 18, extra: (r - 11) as u8 });
                run -= r;
            }
            if run >= 3 {
                out.push(ClSymbol { symbol: 17, extra: (run - 3) as u8 });
                run = 0;
            }
        } else {
            out.push(ClSymbol { symbol: len, extra: 0 });
            run -= 1;
            while run >= 3 {
                let r = run.min(6);
                out.push(ClSymbol { symbol: 16, extra: (r - 3) as u8 });
                run -= r;
            }
        }
        for _ in 0..run {
            out.push(ClSymbol { symbol: len, extra: 0 });
        }
    }
    out
}

/// Trees and header of a dynamic block.
#[derive(Debug)]
struct DynamicPlan {
    lit: HuffmanCode,
    dist: HuffmanCode,
    cl: HuffmanCode,
    hlit: usize,
    hdist: usize,
    hclen: usize,
    symbols: Vec<ClSymbol>,
    bits: u64,
}

impl DynamicPlan {
    fn new(lit_freq: &[u32], dist_freq: &[u32]) -> Self {
        let lit_lengths = build_lengths(lit_freq, MAX_BITS);
        let dist_lengths = build_lengths(dist_freq, MAX_BITS);

        let hlit = lit_lengths
            .iter()
            .rposition(|&l| l != 0)
            .map_or(0, |p| p + 1)
            .max(257);
        let hdist = dist_lengths
            .iter()
            .rposition(|&l| l != 0)
            .map_or(0, |p| p + 1)
            .max(1);

        let mut all = Vec::with_capacity(hlit + hdist);
        all.extend_from_slice(&lit_lengths[..hlit]);
        all.extend_from_slice(&dist_lengths[..hdist]);
        let symbols = run_length_code(&all);

        let mut cl_freq = [0u32; MAX_CL_CODES];
        for s in &symbols {
            cl_freq[s.symbol as usize] += 1;
        }
        let cl = HuffmanCode::from_lengths(&build_lengths(&cl_freq, MAX_CL_BITS));
        let hclen = CL_CODE_ORDER
            .iter()
            .rposition(|&sym| cl.lengths()[sym] != 0)
            .map_or(0, |p| p + 1)
            .max(4);

        let lit = HuffmanCode::from_lengths(&lit_lengths);
        let dist = HuffmanCode::from_lengths(&dist_lengths);

        let header = 3 + 14 + 3 * hclen as u64
            + cl.cost(&cl_freq)
            + symbols.iter().map(|s| s.extra_len() as u64).sum::<u64>();
        let bits = header
            + lit.cost(lit_freq)
            + dist.cost(dist_freq)
            + extra_bits(lit_freq, dist_freq);

        Self {
            lit,
            dist,
            cl,
            hlit,
            hdist,
            hclen,
            symbols,
            bits,
        }
    }

    fn write_header(&self, out: &mut BitWriter) {
        out.write_bits((self.hlit - 257) as u32, 5);
        out.write_bits((self.hdist - 1) as u32, 5);
        out.write_bits((self.hclen - 4) as u32, 4);
        for &sym in &CL_CODE_ORDER[..self.hclen] {
            out.write_bits(self.cl.lengths()[sym] as u32, 3);
        }
        for s in &self.symbols {
            let (code, len) = self.cl.get(s.symbol as usize);
            out.write_bits(code, len);
            if s.extra_len() > 0 {
                out.write_bits(s.extra as u32, s.extra_len());
            }
        }
    }
}

/// Serializes token blocks into a DEFLATE bit stream.
#[derive(Debug, Default)]
pub struct BlockWriter {
    out: BitWriter,
}

impl BlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bits written so far.
    pub fn bit_len(&self) -> usize {
        self.out.bit_len()
    }

    /// Move out every complete byte.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.out.take_bytes()
    }

    /// Pad the final block to a byte boundary.
    pub fn align(&mut self) {
        self.out.flush_align();
    }

    pub fn reset(&mut self) {
        self.out = BitWriter::new();
    }

    /// Write `tokens`, which stand for `raw`, as the cheapest block type.
    pub fn write_block(
        &mut self,
        tokens: &TokenBuffer,
        raw: &[u8],
        last: bool,
        stored_only: bool,
    ) -> BlockType {
        debug_assert_eq!(tokens.covered(), raw.len());
        let stored = stored_bits(raw.len(), self.out.pending_bits());
        if stored_only {
            self.write_stored(raw, last);
            return BlockType::Stored;
        }

        let lit_freq = tokens.lit_freq();
        let dist_freq = tokens.dist_freq();
        let fixed = fixed_bits(lit_freq, dist_freq);
        let estimate = estimate_dynamic_bits(lit_freq, dist_freq);

        let plan = if estimate < stored.min(fixed) {
            Some(DynamicPlan::new(lit_freq, dist_freq))
        } else {
            None
        };
        let dynamic = plan.as_ref().map_or(u64::MAX, |p| p.bits);

        trace!(
            tokens = tokens.len(),
            raw = raw.len(),
            stored,
            fixed,
            dynamic,
            estimate,
            "block costs"
        );

        if stored <= fixed && stored <= dynamic {
            self.write_stored(raw, last);
            BlockType::Stored
        } else if let Some(plan) = plan.filter(|p| p.bits < fixed) {
            self.out.write_bits(last as u32, 1);
            self.out.write_bits(2, 2);
            plan.write_header(&mut self.out);
            self.write_tokens(tokens.tokens(), &plan.lit, &plan.dist);
            BlockType::Dynamic
        } else {
            let (lit, dist) = fixed_codes();
            self.out.write_bits(last as u32, 1);
            self.out.write_bits(1, 2);
            self.write_tokens(tokens.tokens(), lit, dist);
            BlockType::Fixed
        }
    }

    /// Raw bytes split into stored blocks of at most 65535 bytes.
    pub fn write_stored(&mut self, raw: &[u8], last: bool) {
        let mut chunks = raw.chunks(MAX_STORED_BLOCK).peekable();
        if chunks.peek().is_none() {
            self.stored_header(0, last);
            return;
        }
        while let Some(chunk) = chunks.next() {
            let final_chunk = last && chunks.peek().is_none();
            self.stored_header(chunk.len(), final_chunk);
            self.out.write_bytes(chunk);
        }
    }

    fn stored_header(&mut self, len: usize, last: bool) {
        self.out.write_bits(last as u32, 1);
        self.out.write_bits(0, 2);
        self.out.flush_align();
        let len = len as u16;
        self.out.write_bytes(&len.to_le_bytes());
        self.out.write_bytes(&(!len).to_le_bytes());
    }

    /// Empty stored block that leaves the stream byte-aligned.
    pub fn write_sync_marker(&mut self) {
        self.stored_header(0, false);
    }

    fn write_tokens(&mut self, tokens: &[Token], lit: &HuffmanCode, dist: &HuffmanCode) {
        for token in tokens {
            match *token {
                Token::Literal(byte) => {
                    let (code, len) = lit.get(byte as usize);
                    self.out.write_bits(code, len);
                }
                Token::Match { length, offset } => {
                    let lc = length_code(length);
                    let (code, len) = lit.get(257 + lc);
                    self.out.write_bits(code, len);
                    let extra = LENGTH_EXTRA_BITS[lc] as u32;
                    if extra > 0 {
                        self.out.write_bits(length - LENGTH_BASE[lc] as u32, extra);
                    }

                    let dc = distance_code(offset);
                    let (code, len) = dist.get(dc);
                    self.out.write_bits(code, len);
                    let extra = DISTANCE_EXTRA_BITS[dc] as u32;
                    if extra > 0 {
                        self.out.write_bits(offset - DISTANCE_BASE[dc] as u32, extra);
                    }
                }
                Token::EndOfBlock => {}
            }
        }
        let (code, len) = lit.get(END_OF_BLOCK);
        self.out.write_bits(code, len);
    }
}
