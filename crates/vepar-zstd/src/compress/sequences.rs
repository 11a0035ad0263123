//! Sequences section encoding.
//!
//! Each of the three code streams picks the cheapest of four table modes:
//! RLE when a single code fills the block, otherwise the predefined table,
//! the previous block's table, or a new table whose descriptor is written
//! inline. New tables carry a small surcharge so a marginal gain does not
//! pay for a descriptor.

use std::borrow::Cow;

use vepar_core::{Error, Result, SequenceBlock};

use crate::bits::BitWriter;
use crate::block::sequences::{LL_BASELINE, LL_BITS, ML_BASELINE, ML_BITS};
use crate::block::{ll_code, ml_code, of_code, RepeatOffsets, SeqKind, SeqMode, SequencesHeader};
use crate::fse::{
    normalize_count, optimal_table_log, write_ncount, FseEncodeTable, FseEncoderState,
    NormalizedCounts,
};

/// Codes and extra bits of one sequence.
#[derive(Debug, Clone, Copy)]
struct Coded {
    ll: u8,
    of: u8,
    ml: u8,
    ll_extra: u32,
    of_extra: u32,
    ml_extra: u32,
}

type TableSlot = Option<Cow<'static, FseEncodeTable>>;

/// Encodes sequences while tracking what the decoder will hold: the three
/// tables and the repeat offsets.
///
/// [`encode`](Self::encode) leaves its effects pending; the block encoder
/// calls [`commit`](Self::commit) once the block is written compressed,
/// or [`discard`](Self::discard) when it falls back to a raw or RLE block.
#[derive(Debug, Default)]
pub struct SequenceEncoder {
    tables: [TableSlot; 3],
    reps: RepeatOffsets,
    pending: Option<([TableSlot; 3], RepeatOffsets)>,
    codes: Vec<Coded>,
}

impl SequenceEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repeat offsets as the decoder holds them.
    pub fn repeat_offsets(&self) -> RepeatOffsets {
        self.reps
    }

    /// Table a decoder holds for `kind`, if any.
    pub fn table(&self, kind: SeqKind) -> Option<&FseEncodeTable> {
        self.tables[kind.index()].as_deref()
    }

    /// Apply the last `encode`.
    pub fn commit(&mut self) {
        if let Some((fresh, reps)) = self.pending.take() {
            for (slot, table) in self.tables.iter_mut().zip(fresh) {
                if table.is_some() {
                    *slot = table;
                }
            }
            self.reps = reps;
        }
    }

    /// Forget the last `encode`.
    pub fn discard(&mut self) {
        self.pending = None;
    }

    /// New frame: no tables, offsets back to `(1, 4, 8)`.
    pub fn reset(&mut self) {
        self.tables = Default::default();
        self.reps = RepeatOffsets::new();
        self.pending = None;
    }

    /// Append the sequences section for `block` to `out`, returning the
    /// modes chosen for literal lengths, offsets and match lengths.
    pub fn encode(&mut self, block: &SequenceBlock, out: &mut Vec<u8>) -> Result<[SeqMode; 3]> {
        self.pending = None;
        let n = block.sequences.len();
        if n == 0 {
            let header = SequencesHeader::new(0, [SeqMode::Predefined; 3]);
            header.write(out);
            return Ok(header.modes);
        }

        let mut reps = self.reps;
        let mut hists = [vec![0u32; 36], vec![0u32; 32], vec![0u32; 53]];
        self.codes.clear();
        for seq in &block.sequences {
            if seq.match_len < 3 || seq.offset == 0 {
                return Err(Error::InvalidState {
                    expected: "match of at least 3 bytes at a non-zero offset",
                    actual: "degenerate sequence",
                });
            }
            let value = reps.encode(seq.offset, seq.lit_len);
            reps.resolve(value, seq.lit_len);
            let (ll, of, ml) = (ll_code(seq.lit_len), of_code(value), ml_code(seq.match_len));
            hists[0][ll as usize] += 1;
            hists[1][of as usize] += 1;
            hists[2][ml as usize] += 1;
            self.codes.push(Coded {
                ll,
                of,
                ml,
                ll_extra: seq.lit_len - LL_BASELINE[ll as usize],
                of_extra: value - (1 << of),
                ml_extra: seq.match_len - ML_BASELINE[ml as usize],
            });
        }

        let mut modes = [SeqMode::Predefined; 3];
        let mut fresh: [TableSlot; 3] = Default::default();
        let mut descriptors = Vec::new();
        for kind in SeqKind::ALL {
            let i = kind.index();
            let (mode, table) =
                choose_table(kind, &hists[i], n, self.tables[i].as_deref(), &mut descriptors)?;
            modes[i] = mode;
            fresh[i] = table;
        }

        SequencesHeader::new(n, modes).write(out);
        out.extend_from_slice(&descriptors);
        let table = |kind: SeqKind| {
            let i = kind.index();
            fresh[i]
                .as_deref()
                .or(self.tables[i].as_deref())
                .ok_or(Error::InvalidState {
                    expected: "previous sequence table",
                    actual: "none",
                })
        };
        write_bitstream(
            &self.codes,
            table(SeqKind::LiteralLength)?,
            table(SeqKind::Offset)?,
            table(SeqKind::MatchLength)?,
            out,
        );
        tracing::trace!(
            sequences = n,
            ll = ?modes[0],
            of = ?modes[1],
            ml = ?modes[2],
            "encoded sequences"
        );
        self.pending = Some((fresh, reps));
        Ok(modes)
    }
}

/// Encoding table for a stream where every code is `symbol`. It has a
/// single state, so coding emits no bits.
fn rle_table(symbol: u8) -> Result<FseEncodeTable> {
    let mut counts = vec![0i16; symbol as usize + 1];
    counts[symbol as usize] = 1;
    FseEncodeTable::build(&NormalizedCounts::new(counts, 0))
}

fn choose_table(
    kind: SeqKind,
    hist: &[u32],
    n: usize,
    prev: Option<&FseEncodeTable>,
    descriptors: &mut Vec<u8>,
) -> Result<(SeqMode, TableSlot)> {
    let symbol_len = hist.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
    let max = hist.iter().copied().max().unwrap_or(0) as usize;
    if max == n {
        let symbol = (symbol_len - 1) as u8;
        descriptors.push(symbol);
        return Ok((SeqMode::Rle, Some(Cow::Owned(rle_table(symbol)?))));
    }

    let predefined_table = kind.predefined_encode()?;
    let predefined = predefined_table.norm().estimate_bits(hist);
    let repeat = prev
        .filter(|t| t.covers(hist))
        .and_then(|t| t.norm().estimate_bits(hist));

    let table_log = optimal_table_log(kind.max_log(), n, symbol_len);
    let norm = normalize_count(&hist[..symbol_len], n, table_log)?;
    let mut ncount = Vec::new();
    write_ncount(&norm, &mut ncount)?;
    let mut new_cost = norm
        .estimate_bits(hist)
        .unwrap_or(u64::MAX)
        .saturating_add(ncount.len() as u64 * 8);
    new_cost = new_cost.saturating_add((new_cost.saturating_add(256)) >> 4);

    if let Some(r) = repeat {
        if r <= new_cost && predefined.map_or(true, |p| r <= p) {
            return Ok((SeqMode::Repeat, None));
        }
    }
    if predefined.is_some_and(|p| p <= new_cost) {
        return Ok((
            SeqMode::Predefined,
            Some(Cow::Borrowed(predefined_table)),
        ));
    }
    descriptors.extend_from_slice(&ncount);
    Ok((SeqMode::Fse, Some(Cow::Owned(FseEncodeTable::build(&norm)?))))
}

/// Interleave the three state machines and the extra bits, last sequence
/// first, so a backward reader sees them in sequence order.
fn write_bitstream(
    codes: &[Coded],
    ll: &FseEncodeTable,
    of: &FseEncodeTable,
    ml: &FseEncodeTable,
    out: &mut Vec<u8>,
) {
    let Some((last, rest)) = codes.split_last() else {
        return;
    };
    let mut w = BitWriter::from_vec(std::mem::take(out));
    let mut ml_state = FseEncoderState::new(ml, last.ml);
    let mut of_state = FseEncoderState::new(of, last.of);
    let mut ll_state = FseEncoderState::new(ll, last.ll);
    w.add_bits32(last.ll_extra, LL_BITS[last.ll as usize]);
    w.add_bits32(last.ml_extra, ML_BITS[last.ml as usize]);
    w.flush32();
    w.add_bits32(last.of_extra, last.of);
    w.flush32();

    for c in rest.iter().rev() {
        of_state.encode(&mut w, c.of);
        ml_state.encode(&mut w, c.ml);
        ll_state.encode(&mut w, c.ll);
        w.flush32();
        w.add_bits32(c.ll_extra, LL_BITS[c.ll as usize]);
        w.add_bits32(c.ml_extra, ML_BITS[c.ml as usize]);
        w.flush32();
        w.add_bits32(c.of_extra, c.of);
        w.flush32();
    }

    ml_state.flush(&mut w);
    of_state.flush(&mut w);
    ll_state.flush(&mut w);
    w.close();
    *out = w.into_inner();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{decode_sequences, ScratchPool, SequenceTables};
    use vepar_core::Sequence;

    /// Decoder-side state mirroring one frame.
    struct Mirror {
        tables: SequenceTables,
        reps: RepeatOffsets,
        pool: ScratchPool,
    }

    impl Mirror {
        fn new() -> Self {
            Self {
                tables: SequenceTables::new(),
                reps: RepeatOffsets::new(),
                pool: ScratchPool::new(),
            }
        }

        fn decode(&mut self, section: &[u8]) -> Vec<Sequence> {
            let header = SequencesHeader::parse(section).unwrap();
            let mut out = Vec::new();
            if header.count == 0 {
                return out;
            }
            let rest = &section[header.header_size..];
            let used = self.tables.read(&header, rest, &mut self.pool).unwrap();
            decode_sequences(&rest[used..], header.count, &self.tables, &mut self.reps, &mut out)
                .unwrap();
            out
        }
    }

    fn block_of(sequences: Vec<Sequence>) -> SequenceBlock {
        let lits: usize = sequences.iter().map(|s| s.lit_len as usize).sum();
        SequenceBlock {
            literals: vec![b'x'; lits],
            sequences,
        }
    }

    fn varied(n: usize, seed: u32) -> Vec<Sequence> {
        let mut x = seed | 1;
        (0..n)
            .map(|i| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                let lit_len = if x % 3 == 0 { 0 } else { x % 40 };
                let offset = if i % 5 == 0 { 1 + (x >> 8) % 100_000 } else { 1 + (x >> 12) % 512 };
                let match_len = 3 + (x >> 20) % 60;
                Sequence::new(lit_len, offset, match_len)
            })
            .collect()
    }

    #[test]
    fn test_empty_section() {
        let mut enc = SequenceEncoder::new();
        let mut out = Vec::new();
        enc.encode(&SequenceBlock::new(), &mut out).unwrap();
        assert_eq!(out, [0]);
    }

    #[test]
    fn test_varied_sequences_decode() {
        let seqs = varied(2000, 7);
        let mut enc = SequenceEncoder::new();
        let mut out = Vec::new();
        let modes = enc.encode(&block_of(seqs.clone()), &mut out).unwrap();
        assert!(modes.contains(&SeqMode::Fse));
        enc.commit();
        assert_eq!(Mirror::new().decode(&out), seqs);
    }

    #[test]
    fn test_single_code_uses_rle() {
        let seqs = vec![Sequence::new(2, 2, 6); 3];
        let mut enc = SequenceEncoder::new();
        let mut out = Vec::new();
        let modes = enc.encode(&block_of(seqs.clone()), &mut out).unwrap();
        assert_eq!(modes[0], SeqMode::Rle);
        assert_eq!(modes[2], SeqMode::Rle);
        assert_eq!(Mirror::new().decode(&out), seqs);
    }

    #[test]
    fn test_few_sequences_use_predefined() {
        let seqs = vec![
            Sequence::new(5, 100, 4),
            Sequence::new(0, 7, 9),
            Sequence::new(12, 300, 5),
        ];
        let mut enc = SequenceEncoder::new();
        let mut out = Vec::new();
        let modes = enc.encode(&block_of(seqs.clone()), &mut out).unwrap();
        assert!(modes.contains(&SeqMode::Predefined));
        assert_eq!(Mirror::new().decode(&out), seqs);
    }

    #[test]
    fn test_state_carries_across_committed_blocks() {
        let mut enc = SequenceEncoder::new();
        let mut mirror = Mirror::new();
        let first = varied(3000, 3);
        let second = varied(3000, 3);
        let mut out = Vec::new();
        enc.encode(&block_of(first.clone()), &mut out).unwrap();
        enc.commit();
        assert_eq!(mirror.decode(&out), first);

        out.clear();
        let modes = enc.encode(&block_of(second.clone()), &mut out).unwrap();
        enc.commit();
        assert!(modes.contains(&SeqMode::Repeat));
        assert_eq!(mirror.decode(&out), second);
        assert_eq!(enc.repeat_offsets(), mirror.reps);
    }

    #[test]
    fn test_discard_keeps_decoder_view() {
        let mut enc = SequenceEncoder::new();
        let mut mirror = Mirror::new();
        let mut out = Vec::new();
        enc.encode(&block_of(vec![Sequence::new(1, 50, 8)]), &mut out).unwrap();
        enc.discard();
        assert!(enc.table(SeqKind::Offset).is_none());
        assert_eq!(enc.repeat_offsets(), RepeatOffsets::new());

        out.clear();
        let seqs = vec![Sequence::new(0, 4, 5), Sequence::new(3, 8, 3)];
        enc.encode(&block_of(seqs.clone()), &mut out).unwrap();
        enc.commit();
        assert_eq!(mirror.decode(&out), seqs);
    }

    #[test]
    fn test_degenerate_sequence_rejected() {
        let mut enc = SequenceEncoder::new();
        let mut out = Vec::new();
        assert!(enc
            .encode(&block_of(vec![Sequence::new(1, 0, 5)]), &mut out)
            .is_err());
    }
}
