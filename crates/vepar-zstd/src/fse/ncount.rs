//! Normalized-count table descriptors.
//!
//! ```text
//! [4 bits: table_log - 5] [count 0] [count 1] ... until slots are exhausted
//! ```
//!
//! Each count is stored as `count + 1` in a variable number of bits that
//! shrinks as the remaining slots shrink. A zero count is followed by a run
//! length of further zeros: 16-bit `0xFFFF` groups skip 24 symbols, 2-bit
//! `3` flags skip 3, and a final 2-bit value adds the rest.

use vepar_core::{Error, Result};

use super::{NormalizedCounts, FSE_MIN_TABLELOG};

/// LSB-first bit accumulator for descriptor writing.
struct CountWriter<'a> {
    out: &'a mut Vec<u8>,
    acc: u64,
    n: u32,
}

impl<'a> CountWriter<'a> {
    fn new(out: &'a mut Vec<u8>) -> Self {
        Self { out, acc: 0, n: 0 }
    }

    #[inline]
    fn put(&mut self, value: u32, bits: u32) {
        self.acc |= ((value as u64) & ((1u64 << bits) - 1)) << self.n;
        self.n += bits;
        while self.n >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.n -= 8;
        }
    }

    fn finish(self) {
        if self.n > 0 {
            self.out.push(self.acc as u8);
        }
    }
}

/// Append the descriptor for `norm` to `out`.
pub fn write_ncount(norm: &NormalizedCounts, out: &mut Vec<u8>) -> Result<()> {
    let table_log = norm.table_log as u32;
    let counts = &norm.counts;
    let table_size = 1i32 << table_log;

    let mut w = CountWriter::new(out);
    w.put(table_log - FSE_MIN_TABLELOG as u32, 4);

    let mut remaining = table_size + 1;
    let mut threshold = table_size;
    let mut nb_bits = table_log + 1;
    let mut charnum = 0usize;
    let mut previous0 = false;

    while remaining > 1 {
        if previous0 {
            let mut start = charnum;
            while charnum < counts.len() && counts[charnum] == 0 {
                charnum += 1;
            }
            while charnum >= start + 24 {
                start += 24;
                w.put(0xFFFF, 16);
            }
            while charnum >= start + 3 {
                start += 3;
                w.put(3, 2);
            }
            w.put((charnum - start) as u32, 2);
        }
        let Some(&c) = counts.get(charnum) else {
            return Err(Error::corrupt("normalized counts do not fill the table"));
        };
        charnum += 1;

        let max = 2 * threshold - 1 - remaining;
        let mut count = c as i32;
        remaining -= count.abs();
        count += 1;
        if count >= threshold {
            count += max;
        }
        w.put(count as u32, if count < max { nb_bits - 1 } else { nb_bits });
        previous0 = count == 1;

        if remaining < 1 {
            return Err(Error::corrupt("normalized counts overflow the table"));
        }
        while remaining < threshold {
            nb_bits -= 1;
            threshold >>= 1;
        }
    }
    w.finish();
    Ok(())
}

/// Read up to 32 bits starting at `bitpos`; bytes past the end read as zero.
#[inline]
fn peek32(input: &[u8], bitpos: usize) -> u32 {
    let byte = bitpos >> 3;
    let mut v = 0u64;
    for i in 0..5 {
        if let Some(&b) = input.get(byte + i) {
            v |= (b as u64) << (8 * i);
        }
    }
    (v >> (bitpos & 7)) as u32
}

/// Parse a descriptor, returning the counts and the bytes consumed.
///
/// Symbols above `max_symbol` and table logs above `max_log` are rejected.
pub fn read_ncount(
    input: &[u8],
    max_symbol: usize,
    max_log: u8,
) -> Result<(NormalizedCounts, usize)> {
    if input.is_empty() {
        return Err(Error::corrupt("empty FSE table descriptor"));
    }
    let table_log = (peek32(input, 0) & 0xF) as u8 + FSE_MIN_TABLELOG;
    if table_log > max_log {
        return Err(Error::corrupt(format!(
            "FSE table log {} exceeds maximum {}",
            table_log, max_log
        )));
    }

    let limit = input.len() * 8;
    let mut bitpos = 4usize;
    let mut remaining = (1i32 << table_log) + 1;
    let mut threshold = 1i32 << table_log;
    let mut nb_bits = table_log as usize + 1;
    let mut got_total = 0i32;
    let mut previous0 = false;
    let mut counts: Vec<i16> = Vec::with_capacity(max_symbol + 1);

    while remaining > 1 {
        if previous0 {
            let mut n0 = counts.len();
            while peek32(input, bitpos) & 0xFFFF == 0xFFFF {
                n0 += 24;
                bitpos += 16;
                if n0 > max_symbol {
                    return Err(Error::corrupt("FSE zero run exceeds maximum symbol"));
                }
            }
            while peek32(input, bitpos) & 3 == 3 {
                n0 += 3;
                bitpos += 2;
            }
            n0 += (peek32(input, bitpos) & 3) as usize;
            bitpos += 2;
            if n0 > max_symbol {
                return Err(Error::corrupt("FSE zero run exceeds maximum symbol"));
            }
            counts.resize(n0, 0);
        }
        if counts.len() > max_symbol {
            return Err(Error::corrupt("FSE descriptor exceeds maximum symbol"));
        }

        let v = peek32(input, bitpos) as i32;
        let max = 2 * threshold - 1 - remaining;
        let mut count;
        if (v & (threshold - 1)) < max {
            count = v & (threshold - 1);
            bitpos += nb_bits - 1;
        } else {
            count = v & (2 * threshold - 1);
            if count >= threshold {
                count -= max;
            }
            bitpos += nb_bits;
        }
        count -= 1;
        if count < 0 {
            remaining += count;
            got_total -= count;
        } else {
            remaining -= count;
            got_total += count;
        }
        counts.push(count as i16);
        previous0 = count == 0;

        if remaining < 1 {
            return Err(Error::corrupt("FSE counts overflow the table"));
        }
        while remaining < threshold {
            nb_bits -= 1;
            threshold >>= 1;
        }
        if bitpos > limit {
            return Err(Error::corrupt("FSE table descriptor truncated"));
        }
    }

    if got_total != 1 << table_log {
        return Err(Error::corrupt(format!(
            "FSE counts sum to {} instead of {}",
            got_total,
            1 << table_log
        )));
    }
    Ok((NormalizedCounts::new(counts, table_log), (bitpos + 7) >> 3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fse::{LL_DEFAULT_LOG, LL_DEFAULT_NORM, ML_DEFAULT_LOG, ML_DEFAULT_NORM};

    #[test]
    fn test_predefined_distributions_roundtrip() {
        for (norm, log) in [
            (&LL_DEFAULT_NORM[..], LL_DEFAULT_LOG),
            (&ML_DEFAULT_NORM[..], ML_DEFAULT_LOG),
        ] {
            let counts = NormalizedCounts::new(norm.to_vec(), log);
            let mut out = Vec::new();
            write_ncount(&counts, &mut out).unwrap();
            let (back, used) = read_ncount(&out, 255, 9).unwrap();
            assert_eq!(used, out.len());
            assert_eq!(back, counts);
        }
    }

    #[test]
    fn test_zero_runs() {
        // Symbols 0 and 40 only: exercises the 24-symbol escape and the
        // 2-bit repeat flags.
        let mut counts = vec![0i16; 41];
        counts[0] = 20;
        counts[40] = 12;
        let norm = NormalizedCounts::new(counts, 5);
        let mut out = Vec::new();
        write_ncount(&norm, &mut out).unwrap();
        let (back, used) = read_ncount(&out, 255, 9).unwrap();
        assert_eq!(back, norm);
        assert_eq!(used, out.len());
    }

    #[test]
    fn test_trailing_bytes_not_consumed() {
        let norm = NormalizedCounts::new(vec![16, 8, 4, 4], 5);
        let mut out = Vec::new();
        write_ncount(&norm, &mut out).unwrap();
        let len = out.len();
        out.extend_from_slice(&[0xAB, 0xCD, 0xEF]);
        let (back, used) = read_ncount(&out, 255, 9).unwrap();
        assert_eq!(back, norm);
        assert_eq!(used, len);
    }

    #[test]
    fn test_limits_enforced() {
        let norm = NormalizedCounts::new(vec![16, 8, 4, 4], 5);
        let mut out = Vec::new();
        write_ncount(&norm, &mut out).unwrap();
        assert!(read_ncount(&out, 2, 9).is_err());

        let big = NormalizedCounts::new(vec![1000, 24], 10);
        let mut out = Vec::new();
        write_ncount(&big, &mut out).unwrap();
        assert!(read_ncount(&out, 255, 9).is_err());
        assert!(read_ncount(&[], 255, 9).is_err());
    }
}
