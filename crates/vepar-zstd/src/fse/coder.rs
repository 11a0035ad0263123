//! FSE state machines and the standalone two-state coder.

use vepar_core::{Error, Result};

use super::{
    normalize_count, optimal_table_log, read_ncount, write_ncount, FseDecodeTable,
    FseEncodeTable, FSE_MAX_TABLELOG,
};
use crate::bits::{BitWriter, ReverseBitReader};

/// Encoder state bound to a table.
#[derive(Debug, Clone, Copy)]
pub struct FseEncoderState<'t> {
    table: &'t FseEncodeTable,
    state: u16,
}

impl<'t> FseEncoderState<'t> {
    /// Start with the last symbol of the stream; this emits no bits.
    pub fn new(table: &'t FseEncodeTable, first: u8) -> Self {
        let tt = table.transform(first);
        let nb_bits_out = (tt.delta_nb_bits.wrapping_add(1 << 15)) >> 16;
        let im = ((nb_bits_out << 16).wrapping_sub(tt.delta_nb_bits)) as i32;
        let lookup = (im >> nb_bits_out) + tt.delta_find_state;
        Self {
            table,
            state: table.state(lookup),
        }
    }

    /// Encode `symbol`, writing the low bits that leave the state.
    #[inline]
    pub fn encode(&mut self, w: &mut BitWriter, symbol: u8) {
        let tt = self.table.transform(symbol);
        let nb_bits_out = (self.state as u32).wrapping_add(tt.delta_nb_bits) >> 16;
        let dst = (self.state as u32 >> nb_bits_out) as i32 + tt.delta_find_state;
        w.add_bits16(self.state, nb_bits_out as u8);
        self.state = self.table.state(dst);
    }

    /// Write the final state for the decoder to start from.
    pub fn flush(&self, w: &mut BitWriter) {
        w.flush32();
        w.add_bits16(self.state, self.table.table_log());
    }
}

/// Decoder state bound to a table.
#[derive(Debug, Clone, Copy)]
pub struct FseDecoderState<'t> {
    table: &'t FseDecodeTable,
    state: usize,
}

impl<'t> FseDecoderState<'t> {
    /// Read the initial state.
    pub fn new(table: &'t FseDecodeTable, r: &mut ReverseBitReader<'_>) -> Self {
        let state = r.get_bits(table.table_log()) as usize;
        Self { table, state }
    }

    /// Symbol of the current state.
    #[inline]
    pub fn symbol(&self) -> u8 {
        self.table.entry(self.state).symbol
    }

    /// Bits the next transition reads.
    #[inline]
    pub fn nb_bits(&self) -> u8 {
        self.table.entry(self.state).nb_bits
    }

    /// Move to the next state.
    #[inline]
    pub fn update(&mut self, r: &mut ReverseBitReader<'_>) {
        let e = self.table.entry(self.state);
        self.state = e.new_state as usize + r.get_bits(e.nb_bits) as usize;
    }

    /// Emit the current symbol and move on.
    #[inline]
    pub fn next(&mut self, r: &mut ReverseBitReader<'_>) -> u8 {
        let e = self.table.entry(self.state);
        self.state = e.new_state as usize + r.get_bits(e.nb_bits) as usize;
        e.symbol
    }
}

/// Compress `input` into a table descriptor followed by a two-state
/// bitstream.
///
/// Returns [`Error::UseRle`] for a single repeated byte and
/// [`Error::Incompressible`] when the result would not be smaller.
pub fn compress(input: &[u8], max_table_log: u8) -> Result<Vec<u8>> {
    if input.len() <= 1 {
        return Err(Error::Incompressible);
    }
    let hist = vepar_simd::byte_histogram(input);
    let max_count = hist.iter().copied().max().unwrap_or(0) as usize;
    if max_count == input.len() {
        return Err(Error::UseRle);
    }
    if max_count == 1 || max_count < input.len() >> 7 {
        return Err(Error::Incompressible);
    }
    let symbol_len = hist.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);

    let table_log = optimal_table_log(
        max_table_log.min(FSE_MAX_TABLELOG),
        input.len(),
        symbol_len,
    );
    let norm = normalize_count(&hist[..symbol_len], input.len(), table_log)?;
    let table = FseEncodeTable::build(&norm)?;

    let mut out = Vec::with_capacity(input.len());
    write_ncount(&norm, &mut out)?;
    let out = compress_using(input, &table, out);
    if out.len() >= input.len() {
        return Err(Error::Incompressible);
    }
    Ok(out)
}

/// Append the two-state bitstream for `input` (at least 2 bytes) to `out`.
///
/// The last byte is always encoded by the first state so the decoder can
/// alternate starting with it.
pub fn compress_using(input: &[u8], table: &FseEncodeTable, out: Vec<u8>) -> Vec<u8> {
    let mut w = BitWriter::from_vec(out);
    let mut ip = input.len();

    let (mut c1, mut c2);
    if ip & 1 == 1 {
        c1 = FseEncoderState::new(table, input[ip - 1]);
        c2 = FseEncoderState::new(table, input[ip - 2]);
        c1.encode(&mut w, input[ip - 3]);
        ip -= 3;
    } else {
        c2 = FseEncoderState::new(table, input[ip - 1]);
        c1 = FseEncoderState::new(table, input[ip - 2]);
        ip -= 2;
    }
    if ip & 2 != 0 {
        c2.encode(&mut w, input[ip - 1]);
        c1.encode(&mut w, input[ip - 2]);
        ip -= 2;
    }

    let narrow = table.table_log() <= 8;
    while ip >= 4 {
        w.flush32();
        c2.encode(&mut w, input[ip - 1]);
        c1.encode(&mut w, input[ip - 2]);
        if !narrow {
            w.flush32();
        }
        c2.encode(&mut w, input[ip - 3]);
        c1.encode(&mut w, input[ip - 4]);
        ip -= 4;
    }

    c2.flush(&mut w);
    c1.flush(&mut w);
    w.close();
    w.into_inner()
}

/// Decompress output of [`compress`], producing at most `limit` bytes.
pub fn decompress(input: &[u8], max_table_log: u8, limit: usize) -> Result<Vec<u8>> {
    let (norm, used) = read_ncount(input, 255, max_table_log)?;
    let table = FseDecodeTable::build(&norm)?;
    decompress_using(&input[used..], &table, limit)
}

/// Decode a two-state bitstream with `table`.
pub fn decompress_using(input: &[u8], table: &FseDecodeTable, limit: usize) -> Result<Vec<u8>> {
    let mut r = ReverseBitReader::new(input)?;
    let mut s1 = FseDecoderState::new(table, &mut r);
    let mut s2 = FseDecoderState::new(table, &mut r);
    let mut out = Vec::new();

    loop {
        r.fill();
        if r.finished() && s1.nb_bits() > 0 {
            out.push(s1.symbol());
            out.push(s2.symbol());
            break;
        }
        out.push(s1.next(&mut r));
        if r.finished() && s2.nb_bits() > 0 {
            out.push(s2.symbol());
            out.push(s1.symbol());
            break;
        }
        out.push(s2.next(&mut r));
        if out.len() > limit || r.overread() {
            break;
        }
    }
    if out.len() > limit {
        return Err(Error::corrupt(format!(
            "FSE output exceeds limit of {} bytes",
            limit
        )));
    }
    r.close()?;
    Ok(out)
}
