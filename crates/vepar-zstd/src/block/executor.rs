//! Repeat offsets and sequence execution.

use vepar_core::token::ZSTD_MAX_MATCH;
use vepar_core::{Error, Result, Sequence};
use vepar_simd::Accel;

/// The three most recent match offsets.
///
/// Offset values 1-3 in a sequence refer to this register, shifted by one
/// when the sequence has no literals. Values above 3 carry `offset + 3`.
///
/// | value | `lit_len == 0`              | `lit_len > 0`        |
/// |-------|-----------------------------|----------------------|
/// | `> 3` | `value - 3`, push           | same                 |
/// | `3`   | `rep1 - 1` (at least 1), push | `rep3`, rotate     |
/// | `2`   | `rep3`, rotate              | `rep2`, swap 1 and 2 |
/// | `1`   | `rep2`, swap 1 and 2        | `rep1`               |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatOffsets {
    offsets: [u32; 3],
}

impl Default for RepeatOffsets {
    fn default() -> Self {
        Self { offsets: [1, 4, 8] }
    }
}

impl RepeatOffsets {
    /// Register at the start of a frame: `(1, 4, 8)`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current `(rep1, rep2, rep3)`.
    pub fn get(&self) -> [u32; 3] {
        self.offsets
    }

    /// Turn an offset value into a distance and update the register.
    ///
    /// `value` must be at least 1; the result is never zero.
    pub fn resolve(&mut self, value: u32, lit_len: u32) -> u32 {
        let [r1, r2, r3] = self.offsets;
        let (offset, next) = match (value, lit_len) {
            (v, _) if v > 3 => (v - 3, [v - 3, r1, r2]),
            (1, 0) => (r2, [r2, r1, r3]),
            (2, 0) => (r3, [r3, r1, r2]),
            (_, 0) => {
                let o = r1.saturating_sub(1).max(1);
                (o, [o, r1, r2])
            }
            (1, _) => (r1, self.offsets),
            (2, _) => (r2, [r2, r1, r3]),
            _ => (r3, [r3, r1, r2]),
        };
        self.offsets = next;
        offset
    }

    /// The offset value that [`RepeatOffsets::resolve`] maps back to
    /// `offset`, preferring repeat codes. Does not update the register.
    pub fn encode(&self, offset: u32, lit_len: u32) -> u32 {
        let [r1, r2, r3] = self.offsets;
        if lit_len > 0 {
            match offset {
                o if o == r1 => 1,
                o if o == r2 => 2,
                o if o == r3 => 3,
                o => o + 3,
            }
        } else {
            match offset {
                o if o == r2 => 1,
                o if o == r3 => 2,
                o if r1 > 1 && o == r1 - 1 => 3,
                o => o + 3,
            }
        }
    }
}

/// Append the output of `sequences` to `out`.
///
/// `out[base..]` is the history a match may reach into; offsets must also
/// stay within `window`. Literals left over after the last sequence are
/// appended at the end.
pub fn execute_sequences(
    literals: &[u8],
    sequences: &[Sequence],
    out: &mut Vec<u8>,
    base: usize,
    window: usize,
    accel: Accel,
) -> Result<()> {
    let mut lit = 0usize;
    for (i, seq) in sequences.iter().enumerate() {
        let end = lit + seq.lit_len as usize;
        let Some(run) = literals.get(lit..end) else {
            return Err(Error::corrupt(format!(
                "sequence {} wants literals up to {}, only {} decoded",
                i,
                end,
                literals.len()
            )));
        };
        out.extend_from_slice(run);
        lit = end;

        let offset = seq.offset as usize;
        let length = seq.match_len as usize;
        if length == 0 {
            continue;
        }
        if seq.match_len > ZSTD_MAX_MATCH {
            return Err(Error::corrupt(format!(
                "match length {} exceeds {}",
                seq.match_len, ZSTD_MAX_MATCH
            )));
        }
        let available = out.len() - base;
        if offset == 0 || offset > available || offset > window {
            return Err(Error::corrupt(format!(
                "sequence {} offset {} exceeds {} bytes of history (window {})",
                i, offset, available, window
            )));
        }
        accel.copy_match(out, offset, length);
    }
    out.extend_from_slice(&literals[lit..]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_table() {
        let mut reps = RepeatOffsets::new();
        assert_eq!(reps.resolve(1, 5), 1);
        assert_eq!(reps.get(), [1, 4, 8]);
        assert_eq!(reps.resolve(2, 5), 4);
        assert_eq!(reps.get(), [4, 1, 8]);
        assert_eq!(reps.resolve(3, 5), 8);
        assert_eq!(reps.get(), [8, 4, 1]);
        assert_eq!(reps.resolve(1, 0), 4);
        assert_eq!(reps.get(), [4, 8, 1]);
        assert_eq!(reps.resolve(2, 0), 1);
        assert_eq!(reps.get(), [1, 4, 8]);
        assert_eq!(reps.resolve(103, 0), 100);
        assert_eq!(reps.get(), [100, 1, 4]);
        assert_eq!(reps.resolve(3, 0), 99);
        assert_eq!(reps.get(), [99, 100, 1]);
    }

    #[test]
    fn test_rep1_minus_one_clamps() {
        let mut reps = RepeatOffsets::new();
        assert_eq!(reps.resolve(3, 0), 1);
        assert_eq!(reps.get(), [1, 1, 4]);
    }

    #[test]
    fn test_encode_inverts_resolve() {
        let mut rng = 0x9E37_79B9u32;
        let mut enc = RepeatOffsets::new();
        let mut dec = RepeatOffsets::new();
        let mut recent = [1u32, 4, 8];
        for step in 0..5000 {
            rng ^= rng << 13;
            rng ^= rng >> 17;
            rng ^= rng << 5;
            let offset = match rng % 4 {
                0 => recent[(rng >> 8) as usize % 3],
                1 => recent[0].saturating_sub(1).max(1),
                _ => 1 + (rng >> 4) % 5000,
            };
            let lit_len = (rng >> 20) % 3;
            let value = enc.encode(offset, lit_len);
            assert!(value >= 1);
            assert_eq!(enc.resolve(value, lit_len), offset, "step {step}");
            assert_eq!(dec.resolve(value, lit_len), offset);
            assert!(enc.get().iter().all(|&r| r > 0));
            recent = enc.get();
        }
        assert_eq!(enc, dec);
    }

    #[test]
    fn test_execute_with_history() {
        let mut out = b"xxabcd".to_vec();
        let seqs = [Sequence::new(1, 4, 4), Sequence::new(0, 1, 3)];
        execute_sequences(b"ZQ", &seqs, &mut out, 2, 1 << 20, Accel::Native).unwrap();
        assert_eq!(out, b"xxabcdZbcdZZZZQ");
    }

    #[test]
    fn test_execute_rejects_bad_offsets() {
        let mut out = b"xxabcd".to_vec();
        let seqs = [Sequence::new(0, 5, 3)];
        assert!(execute_sequences(b"", &seqs, &mut out, 2, 1 << 20, Accel::Native).is_err());

        let mut out = b"abcd".to_vec();
        let seqs = [Sequence::new(0, 3, 3)];
        assert!(execute_sequences(b"", &seqs, &mut out, 0, 2, Accel::Native).is_err());

        let seqs = [Sequence::new(0, 0, 3)];
        assert!(execute_sequences(b"", &seqs, &mut out, 0, 64, Accel::Native).is_err());

        let seqs = [Sequence::new(3, 1, 3)];
        assert!(execute_sequences(b"ab", &seqs, &mut out, 0, 64, Accel::Native).is_err());
    }
}
