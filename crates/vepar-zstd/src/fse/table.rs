//! FSE decoding and encoding tables.
//!
//! Both tables come from the same symbol spread: symbols with a `-1` count
//! take one slot each at the top of the table, then every other symbol is
//! dropped `count` times along a cursor that advances by
//! `(size >> 1) + (size >> 3) + 3` modulo the size, skipping the top region.
//! Valid counts always bring the cursor back to slot 0.

use vepar_core::{Error, Result};

use super::NormalizedCounts;
use crate::bits::highbit32;

#[inline]
fn table_step(size: usize) -> usize {
    (size >> 1) + (size >> 3) + 3
}

/// Lay symbols into `1 << table_log` slots.
fn spread_symbols(norm: &NormalizedCounts) -> Result<Vec<u8>> {
    if norm.symbol_len() > 256 {
        return Err(Error::corrupt("FSE alphabet larger than 256 symbols"));
    }
    if norm.counts.iter().any(|&c| c < -1) {
        return Err(Error::corrupt("negative FSE count"));
    }
    let size = norm.table_size();
    if norm.slots() != size as i64 {
        return Err(Error::corrupt(format!(
            "FSE counts claim {} slots of {}",
            norm.slots(),
            size
        )));
    }
    let mask = size - 1;
    let mut symbols = vec![0u8; size];

    let mut high = size as isize - 1;
    for (s, &c) in norm.counts.iter().enumerate() {
        if c == -1 {
            symbols[high as usize] = s as u8;
            high -= 1;
        }
    }

    let step = table_step(size);
    let mut pos = 0usize;
    for (s, &c) in norm.counts.iter().enumerate() {
        for _ in 0..c.max(0) {
            symbols[pos] = s as u8;
            pos = (pos + step) & mask;
            while pos as isize > high {
                pos = (pos + step) & mask;
            }
        }
    }
    if pos != 0 {
        return Err(Error::corrupt("FSE spread did not return to slot 0"));
    }
    Ok(symbols)
}

/// One decoding state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FseDecodeEntry {
    /// Base of the next state; the low bits read are added to it.
    pub new_state: u16,
    /// Decoded symbol.
    pub symbol: u8,
    /// Bits to read for the transition.
    pub nb_bits: u8,
}

/// FSE decoding table of `1 << table_log` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FseDecodeTable {
    entries: Vec<FseDecodeEntry>,
    table_log: u8,
}

impl FseDecodeTable {
    /// Build from normalized counts.
    pub fn build(norm: &NormalizedCounts) -> Result<Self> {
        Self::build_in(norm, Vec::new())
    }

    /// Build reusing `storage` for the entries.
    pub fn build_in(norm: &NormalizedCounts, mut storage: Vec<FseDecodeEntry>) -> Result<Self> {
        let symbols = spread_symbols(norm)?;
        let size = symbols.len() as u32;
        let table_log = norm.table_log;

        let mut symbol_next: Vec<u32> = norm
            .counts
            .iter()
            .map(|&c| if c == -1 { 1 } else { c.max(0) as u32 })
            .collect();

        storage.clear();
        storage.reserve(symbols.len());
        for (u, &s) in symbols.iter().enumerate() {
            let next = symbol_next[s as usize];
            symbol_next[s as usize] += 1;
            let nb_bits = table_log as u32 - highbit32(next);
            let new_state = (next << nb_bits) - size;
            if new_state == u as u32 && nb_bits == 0 {
                return Err(Error::corrupt("FSE state loops without reading bits"));
            }
            storage.push(FseDecodeEntry {
                new_state: new_state as u16,
                symbol: s,
                nb_bits: nb_bits as u8,
            });
        }
        Ok(Self {
            entries: storage,
            table_log,
        })
    }

    /// Single-state table that always yields `symbol` and reads no bits.
    pub fn rle(symbol: u8) -> Self {
        Self {
            entries: vec![FseDecodeEntry {
                new_state: 0,
                symbol,
                nb_bits: 0,
            }],
            table_log: 0,
        }
    }

    /// Log2 of the table size.
    #[inline]
    pub fn table_log(&self) -> u8 {
        self.table_log
    }

    /// All entries in state order.
    #[inline]
    pub fn entries(&self) -> &[FseDecodeEntry] {
        &self.entries
    }

    /// Entry for `state`.
    #[inline]
    pub fn entry(&self, state: usize) -> FseDecodeEntry {
        self.entries[state]
    }

    /// Release the entry storage for reuse.
    pub fn into_storage(self) -> Vec<FseDecodeEntry> {
        self.entries
    }
}

/// Per-symbol encoding transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolTransform {
    /// Offset into the state table for this symbol's states.
    pub delta_find_state: i32,
    /// Packs the bit count threshold: `(state + delta_nb_bits) >> 16` bits
    /// leave the state when encoding this symbol.
    pub delta_nb_bits: u32,
}

/// FSE encoding table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FseEncodeTable {
    state_table: Vec<u16>,
    symbol_tt: Vec<SymbolTransform>,
    norm: NormalizedCounts,
}

impl FseEncodeTable {
    /// Build from normalized counts.
    pub fn build(norm: &NormalizedCounts) -> Result<Self> {
        let symbols = spread_symbols(norm)?;
        let size = symbols.len();
        let table_log = norm.table_log as u32;

        let mut cumul = vec![0u32; norm.symbol_len() + 1];
        for (s, &c) in norm.counts.iter().enumerate() {
            let slots = if c == -1 { 1 } else { c.max(0) as u32 };
            cumul[s + 1] = cumul[s] + slots;
        }

        let mut state_table = vec![0u16; size];
        for (u, &s) in symbols.iter().enumerate() {
            let at = &mut cumul[s as usize];
            state_table[*at as usize] = (size + u) as u16;
            *at += 1;
        }

        let mut symbol_tt = vec![SymbolTransform::default(); 256];
        let mut total = 0i32;
        for (s, &c) in norm.counts.iter().enumerate() {
            let tt = &mut symbol_tt[s];
            match c {
                0 => {}
                -1 | 1 => {
                    tt.delta_nb_bits = (table_log << 16).wrapping_sub(1 << table_log);
                    tt.delta_find_state = total - 1;
                    total += 1;
                }
                _ => {
                    let c = c as u32;
                    let max_bits_out = table_log - highbit32(c - 1);
                    let min_state_plus = c << max_bits_out;
                    tt.delta_nb_bits = (max_bits_out << 16).wrapping_sub(min_state_plus);
                    tt.delta_find_state = total - c as i32;
                    total += c as i32;
                }
            }
        }

        Ok(Self {
            state_table,
            symbol_tt,
            norm: norm.clone(),
        })
    }

    /// Log2 of the table size.
    #[inline]
    pub fn table_log(&self) -> u8 {
        self.norm.table_log
    }

    /// The counts this table was built from.
    #[inline]
    pub fn norm(&self) -> &NormalizedCounts {
        &self.norm
    }

    /// Whether every symbol present in `hist` has a slot.
    pub fn covers(&self, hist: &[u32]) -> bool {
        hist.iter().enumerate().all(|(s, &n)| {
            n == 0 || self.norm.counts.get(s).is_some_and(|&c| c != 0)
        })
    }

    #[inline]
    pub(crate) fn transform(&self, symbol: u8) -> SymbolTransform {
        self.symbol_tt[symbol as usize]
    }

    #[inline]
    pub(crate) fn state(&self, index: i32) -> u16 {
        self.state_table[index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spread_visits_every_slot() {
        let norm = NormalizedCounts::new(vec![10, 6, -1, 7, 8], 5);
        let symbols = spread_symbols(&norm).unwrap();
        assert_eq!(symbols.len(), 32);
        let mut seen = [0usize; 5];
        for &s in &symbols {
            seen[s as usize] += 1;
        }
        assert_eq!(seen, [10, 6, 1, 7, 8]);
        // low-probability symbol sits in the top slot
        assert_eq!(symbols[31], 2);
    }

    #[test]
    fn test_bad_counts_rejected() {
        let norm = NormalizedCounts::new(vec![10, 6, 7], 5);
        assert!(FseDecodeTable::build(&norm).is_err());
        assert!(FseEncodeTable::build(&norm).is_err());
    }

    #[test]
    fn test_single_symbol_rejected() {
        let norm = NormalizedCounts::new(vec![0, 32], 5);
        assert!(FseDecodeTable::build(&norm).is_err());
    }

    #[test]
    fn test_decode_states_stay_in_table() {
        let norm = NormalizedCounts::new(vec![19, 5, -1, -1, 3, 1, 2], 5);
        let table = FseDecodeTable::build(&norm).unwrap();
        assert_eq!(table.entries().len(), 32);
        for e in table.entries() {
            let reach = e.new_state as usize + (1usize << e.nb_bits);
            assert!(reach <= 32);
        }
    }

    #[test]
    fn test_encode_table_covers() {
        let norm = NormalizedCounts::new(vec![20, 0, 12], 5);
        let table = FseEncodeTable::build(&norm).unwrap();
        assert!(table.covers(&[4, 0, 9]));
        assert!(!table.covers(&[4, 1, 9]));
        assert!(!table.covers(&[4, 0, 9, 1]));
    }

    #[test]
    fn test_rle_table() {
        let table = FseDecodeTable::rle(7);
        assert_eq!(table.table_log(), 0);
        assert_eq!(table.entry(0).symbol, 7);
        assert_eq!(table.entry(0).nb_bits, 0);
    }
}
