//! Histogram normalization to a power-of-two total.

use vepar_core::{Error, Result};

use super::FSE_MIN_TABLELOG;
use crate::bits::highbit32;

/// Rounding thresholds for probabilities below 8, in units of `1 << (scale - 20)`.
const RTB_TABLE: [u64; 8] = [0, 473195, 504333, 520860, 550000, 700000, 750000, 830000];

/// Normalized symbol counts summing to `1 << table_log`.
///
/// A count of `-1` marks a "less than one" probability: the symbol owns a
/// single slot at the top of the table and always reads a full `table_log`
/// bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCounts {
    /// Per-symbol counts, indexed by symbol value.
    pub counts: Vec<i16>,
    /// Log2 of the table size.
    pub table_log: u8,
}

impl NormalizedCounts {
    /// Wrap a set of counts.
    pub fn new(counts: Vec<i16>, table_log: u8) -> Self {
        Self { counts, table_log }
    }

    /// Number of symbols (highest symbol + 1).
    #[inline]
    pub fn symbol_len(&self) -> usize {
        self.counts.len()
    }

    /// Table size.
    #[inline]
    pub fn table_size(&self) -> usize {
        1 << self.table_log
    }

    /// Sum of slots claimed, with `-1` counting as one.
    pub fn slots(&self) -> i64 {
        self.counts
            .iter()
            .map(|&c| if c == -1 { 1 } else { c.max(0) as i64 })
            .sum()
    }

    /// Estimated cost in bits of coding `hist` with these counts, or `None`
    /// if a present symbol has no slot.
    pub fn estimate_bits(&self, hist: &[u32]) -> Option<u64> {
        let tl = self.table_log as f64;
        let mut bits = 0.0f64;
        for (s, &n) in hist.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let norm = match self.counts.get(s) {
                Some(&c) if c == -1 => 1.0,
                Some(&c) if c > 0 => c as f64,
                _ => return None,
            };
            bits += n as f64 * (tl - norm.log2());
        }
        Some(bits.ceil() as u64)
    }
}

/// Pick a table log for `total` samples over `symbol_len` symbols, bounded
/// by `max_log`.
pub fn optimal_table_log(max_log: u8, total: usize, symbol_len: usize) -> u8 {
    let total = total.max(2) as u32;
    let symbol_len = symbol_len.max(2) as u32;
    let max_bits_src = highbit32(total - 1) as i32 - 2;
    let min_bits_src = highbit32(total - 1) + 1;
    let min_bits_symbols = highbit32(symbol_len - 1) + 2;
    let min_bits = min_bits_src.min(min_bits_symbols) as u8;

    let mut table_log = max_log;
    if max_bits_src >= 0 && (max_bits_src as u8) < table_log {
        table_log = max_bits_src as u8;
    }
    if min_bits > table_log {
        table_log = min_bits;
    }
    table_log.max(FSE_MIN_TABLELOG).min(max_log)
}

/// Scale `hist` (whose counts sum to `total`) so it sums to `1 << table_log`.
///
/// Falls back to [`normalize_count2`] when the rounding residual is too
/// large to dump on the most probable symbol.
pub fn normalize_count(hist: &[u32], total: usize, table_log: u8) -> Result<NormalizedCounts> {
    if total == 0 {
        return Err(Error::corrupt("cannot normalize an empty histogram"));
    }
    let scale = 62 - table_log as u64;
    let step = (1u64 << 62) / total as u64;
    let v_step = 1u64 << (scale - 20);
    let low_threshold = (total >> table_log) as u64;

    let mut norm = vec![0i16; hist.len()];
    let mut still_to_distribute = 1i32 << table_log;
    let mut largest = 0usize;
    let mut largest_p = 0i16;

    for (i, &cnt) in hist.iter().enumerate() {
        let cnt = cnt as u64;
        if cnt == 0 {
            continue;
        }
        if cnt <= low_threshold {
            norm[i] = -1;
            still_to_distribute -= 1;
            continue;
        }
        let mut proba = ((cnt * step) >> scale) as i16;
        if proba < 8 {
            let rest_to_beat = v_step * RTB_TABLE[proba as usize];
            let v = cnt * step - ((proba as u64) << scale);
            if v > rest_to_beat {
                proba += 1;
            }
        }
        if proba > largest_p {
            largest_p = proba;
            largest = i;
        }
        norm[i] = proba;
        still_to_distribute -= proba as i32;
    }

    if largest_p == 0 || -still_to_distribute >= (norm[largest] >> 1) as i32 {
        return normalize_count2(hist, total, table_log);
    }
    norm[largest] += still_to_distribute as i16;
    Ok(NormalizedCounts::new(norm, table_log))
}

/// Proportional normalization for skewed histograms.
///
/// Low counts are pinned to `-1` or `1` first, then the remaining slots are
/// shared out with a fixed-point cumulative scale so rounding never loses a
/// slot.
pub fn normalize_count2(hist: &[u32], total: usize, table_log: u8) -> Result<NormalizedCounts> {
    const NOT_YET_ASSIGNED: i16 = -2;

    let mut norm = vec![0i16; hist.len()];
    let mut distributed = 0u64;
    let mut total = total as u64;
    let low_threshold = total >> table_log;
    let mut low_one = (total * 3) >> (table_log + 1);

    for (i, &cnt) in hist.iter().enumerate() {
        let cnt = cnt as u64;
        if cnt == 0 {
            continue;
        }
        if cnt <= low_threshold {
            norm[i] = -1;
            distributed += 1;
            total -= cnt;
            continue;
        }
        if cnt <= low_one {
            norm[i] = 1;
            distributed += 1;
            total -= cnt;
            continue;
        }
        norm[i] = NOT_YET_ASSIGNED;
    }

    let table_size = 1u64 << table_log;
    if distributed > table_size {
        return Err(Error::corrupt("too many symbols for table size"));
    }
    let mut to_distribute = table_size - distributed;

    if to_distribute > 0 && total / to_distribute > low_one {
        low_one = (total * 3) / (to_distribute * 2);
        for (i, &cnt) in hist.iter().enumerate() {
            let cnt = cnt as u64;
            if norm[i] == NOT_YET_ASSIGNED && cnt <= low_one {
                norm[i] = 1;
                distributed += 1;
                total -= cnt;
            }
        }
        to_distribute = table_size - distributed;
    }

    if distributed as usize == hist.len() {
        // Every symbol is pinned: the most frequent one takes the rest.
        let max_v = hist
            .iter()
            .enumerate()
            .max_by_key(|&(i, &c)| (c, std::cmp::Reverse(i)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let base = if norm[max_v] == -1 { 1 } else { norm[max_v] };
        norm[max_v] = base + to_distribute as i16;
        return Ok(NormalizedCounts::new(norm, table_log));
    }

    if total == 0 {
        if !norm.iter().any(|&c| c > 0) {
            return Err(Error::corrupt("no symbol can absorb remaining slots"));
        }
        let mut i = 0;
        while to_distribute > 0 {
            if norm[i] > 0 {
                to_distribute -= 1;
                norm[i] += 1;
            }
            i = (i + 1) % norm.len();
        }
        return Ok(NormalizedCounts::new(norm, table_log));
    }

    let v_step_log = 62 - table_log as u64;
    let mid = (1u64 << (v_step_log - 1)) - 1;
    let r_step = ((1u64 << v_step_log) * to_distribute + mid) / total;
    let mut tmp_total = mid;
    for (i, &cnt) in hist.iter().enumerate() {
        if norm[i] != NOT_YET_ASSIGNED {
            continue;
        }
        let end = tmp_total + cnt as u64 * r_step;
        let s_start = tmp_total >> v_step_log;
        let s_end = end >> v_step_log;
        let weight = s_end - s_start;
        if weight < 1 {
            return Err(Error::corrupt("normalization produced an empty weight"));
        }
        norm[i] = weight as i16;
        tmp_total = end;
    }
    Ok(NormalizedCounts::new(norm, table_log))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram(data: &[u8]) -> Vec<u32> {
        let mut hist = vec![0u32; 256];
        for &b in data {
            hist[b as usize] += 1;
        }
        let len = hist.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
        hist.truncate(len);
        hist
    }

    #[test]
    fn test_counts_sum_to_table_size() {
        let data: Vec<u8> = (0..5000u32).map(|i| ((i * 7919) % 23) as u8 ^ (i % 3) as u8).collect();
        let hist = histogram(&data);
        for tl in 5..=11 {
            let norm = normalize_count(&hist, data.len(), tl).unwrap();
            assert_eq!(norm.slots(), 1 << tl, "table log {tl}");
        }
    }

    #[test]
    fn test_rare_symbols_get_less_than_one() {
        let hist = vec![10_000u32, 9_000, 1];
        let total = hist.iter().sum::<u32>() as usize;
        let norm = normalize_count(&hist, total, 6).unwrap();
        assert_eq!(norm.counts[2], -1);
        assert_eq!(norm.slots(), 64);
    }

    #[test]
    fn test_skewed_histogram_uses_second_method() {
        // One dominant symbol and many small ones push the residual past
        // half of the largest bucket.
        let mut hist = vec![3u32; 60];
        hist[0] = 200;
        let total = hist.iter().sum::<u32>() as usize;
        let a = normalize_count(&hist, total, 6).unwrap();
        assert_eq!(a.slots(), 64);
        assert!(a.counts.iter().all(|&c| c != 0));
        let b = normalize_count2(&hist, total, 6).unwrap();
        assert_eq!(b.slots(), 64);
    }

    #[test]
    fn test_optimal_table_log_bounds() {
        assert_eq!(optimal_table_log(11, 10, 3), 5);
        assert_eq!(optimal_table_log(11, 1 << 20, 256), 11);
        assert_eq!(optimal_table_log(9, 1 << 20, 36), 9);
        // few samples reduce accuracy
        assert_eq!(optimal_table_log(11, 200, 8), 5);
        assert_eq!(optimal_table_log(11, 4000, 8), 9);
    }

    #[test]
    fn test_estimate_bits() {
        let norm = NormalizedCounts::new(vec![32, 16, 16], 6);
        // p = 1/2, 1/4, 1/4
        assert_eq!(norm.estimate_bits(&[4, 2, 2]), Some(4 + 4 + 4));
        assert_eq!(norm.estimate_bits(&[1, 0, 0, 1]), None);
    }
}
