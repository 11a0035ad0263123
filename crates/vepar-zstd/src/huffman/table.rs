//! Huffman decoding tables.
//!
//! A table is rebuilt from the weight descriptor that precedes compressed
//! literals: weights are read, the implied last weight is recovered, and
//! every symbol fills `2^(weight - 1)` consecutive slots of a
//! `2^table_log` lookup table, longest codes first.

use vepar_core::{Error, Result};

use super::{HUFFMAN_MAX_WEIGHT, HUF_TABLELOG_MAX, HUF_WEIGHTS_TABLELOG};
use crate::bits::highbit32;
use crate::fse;

/// A single entry in a Huffman decoding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HuffmanTableEntry {
    /// The symbol this code decodes to.
    pub symbol: u8,
    /// Number of bits in the code.
    pub num_bits: u8,
}

impl HuffmanTableEntry {
    /// Create a new Huffman table entry.
    pub const fn new(symbol: u8, num_bits: u8) -> Self {
        Self { symbol, num_bits }
    }
}

/// Huffman decoding table.
///
/// Single-level lookup indexed by the next `table_log` bits of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    entries: Vec<HuffmanTableEntry>,
    weights: Vec<u8>,
    table_log: u8,
}

impl HuffmanTable {
    /// Build a table from complete weights (the implied last weight included).
    pub fn from_weights(weights: &[u8]) -> Result<Self> {
        Self::from_weights_in(weights, Vec::new())
    }

    /// Build a table reusing `storage` for the entries.
    pub fn from_weights_in(weights: &[u8], mut storage: Vec<HuffmanTableEntry>) -> Result<Self> {
        let mut rank_stats = [0u32; HUFFMAN_MAX_WEIGHT as usize + 1];
        let mut total = 0u32;
        for &w in weights {
            if w > HUFFMAN_MAX_WEIGHT {
                return Err(Error::corrupt(format!("Huffman weight {} too large", w)));
            }
            rank_stats[w as usize] += 1;
            total += (1 << w) >> 1;
        }
        if total == 0 || !total.is_power_of_two() {
            return Err(Error::corrupt(format!(
                "Huffman weights sum to {}, not a power of two",
                total
            )));
        }
        let table_log = highbit32(total) as u8;
        if table_log > HUF_TABLELOG_MAX {
            return Err(Error::corrupt(format!(
                "Huffman table log {} exceeds {}",
                table_log, HUF_TABLELOG_MAX
            )));
        }
        if rank_stats[1] < 2 || rank_stats[1] & 1 != 0 {
            return Err(Error::corrupt(
                "Huffman code needs an even number of longest codes",
            ));
        }

        let mut next = 0u32;
        for w in 1..=table_log as usize {
            let start = next;
            next += rank_stats[w] << (w - 1);
            rank_stats[w] = start;
        }

        storage.clear();
        storage.resize(1 << table_log, HuffmanTableEntry::default());
        for (symbol, &w) in weights.iter().enumerate() {
            if w == 0 {
                continue;
            }
            let len = (1u32 << w) >> 1;
            let start = rank_stats[w as usize] as usize;
            let entry = HuffmanTableEntry::new(symbol as u8, table_log + 1 - w);
            storage[start..start + len as usize].fill(entry);
            rank_stats[w as usize] += len;
        }

        Ok(Self {
            entries: storage,
            weights: weights.to_vec(),
            table_log,
        })
    }

    /// Bits peeked per lookup.
    #[inline]
    pub fn table_log(&self) -> u8 {
        self.table_log
    }

    /// Weight of every symbol.
    pub fn weights(&self) -> &[u8] {
        &self.weights
    }

    /// Entry for the peeked `index`.
    #[inline]
    pub fn decode(&self, index: usize) -> HuffmanTableEntry {
        self.entries[index]
    }

    /// Release the entry storage for reuse.
    pub fn into_storage(self) -> Vec<HuffmanTableEntry> {
        self.entries
    }
}

/// Parse the weight descriptor, returning all weights (implied last one
/// included) and the bytes consumed.
pub fn parse_huffman_weights(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let Some(&header) = data.first() else {
        return Err(Error::corrupt("empty Huffman table descriptor"));
    };
    let (mut weights, used) = if header >= 128 {
        let count = header as usize - 127;
        let bytes = (count + 1) / 2;
        let Some(packed) = data.get(1..1 + bytes) else {
            return Err(Error::corrupt("Huffman weights truncated"));
        };
        let weights: Vec<u8> = packed
            .iter()
            .flat_map(|&b| [b >> 4, b & 15])
            .take(count)
            .collect();
        (weights, 1 + bytes)
    } else {
        let size = header as usize;
        let Some(packed) = data.get(1..1 + size) else {
            return Err(Error::corrupt("FSE-compressed Huffman weights truncated"));
        };
        let weights = fse::decompress(packed, HUF_WEIGHTS_TABLELOG, 255)?;
        (weights, 1 + size)
    };
    if weights.len() > 255 {
        return Err(Error::corrupt("too many Huffman weights"));
    }

    let mut total = 0u32;
    for &w in &weights {
        if w > HUFFMAN_MAX_WEIGHT {
            return Err(Error::corrupt(format!("Huffman weight {} too large", w)));
        }
        total += (1 << w) >> 1;
    }
    if total == 0 {
        return Err(Error::corrupt("all Huffman weights are zero"));
    }
    let table_log = highbit32(total) + 1;
    if table_log > HUF_TABLELOG_MAX as u32 {
        return Err(Error::corrupt(format!(
            "Huffman table log {} exceeds {}",
            table_log, HUF_TABLELOG_MAX
        )));
    }
    let rest = (1u32 << table_log) - total;
    if !rest.is_power_of_two() {
        return Err(Error::corrupt("implied Huffman weight is not a power of two"));
    }
    weights.push(highbit32(rest) as u8 + 1);
    Ok((weights, used))
}

/// Read a table descriptor, returning the table and the bytes consumed.
pub fn read_table(data: &[u8]) -> Result<(HuffmanTable, usize)> {
    read_table_in(data, Vec::new())
}

/// [`read_table`] reusing `storage` for the table entries.
pub fn read_table_in(
    data: &[u8],
    storage: Vec<HuffmanTableEntry>,
) -> Result<(HuffmanTable, usize)> {
    let (weights, used) = parse_huffman_weights(data)?;
    Ok((HuffmanTable::from_weights_in(&weights, storage)?, used))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_table() {
        // Weights [2, 1, 1]: sym1 = 00, sym2 = 01, sym0 = 1.
        let table = HuffmanTable::from_weights(&[2, 1, 1]).unwrap();
        assert_eq!(table.table_log(), 2);
        assert_eq!(table.decode(0b00), HuffmanTableEntry::new(1, 2));
        assert_eq!(table.decode(0b01), HuffmanTableEntry::new(2, 2));
        assert_eq!(table.decode(0b10), HuffmanTableEntry::new(0, 1));
        assert_eq!(table.decode(0b11), HuffmanTableEntry::new(0, 1));
    }

    #[test]
    fn test_raw_descriptor_implies_last_weight() {
        // two weights (2, 1) packed in one byte, third weight implied as 1
        let (weights, used) = parse_huffman_weights(&[129, 0x21, 0xFF]).unwrap();
        assert_eq!(used, 2);
        assert_eq!(weights, vec![2, 1, 1]);
    }

    #[test]
    fn test_rejects_odd_longest_codes() {
        assert!(HuffmanTable::from_weights(&[1]).is_err());
        assert!(HuffmanTable::from_weights(&[0, 1, 0]).is_err());
        assert!(HuffmanTable::from_weights(&[2, 1, 0, 2]).is_err());
    }

    #[test]
    fn test_rejects_bad_descriptors() {
        assert!(parse_huffman_weights(&[]).is_err());
        // raw form claims four weights but carries one byte
        assert!(parse_huffman_weights(&[131, 0x11]).is_err());
        // 4 + 1 = 5 leaves 3, not a power of two
        assert!(parse_huffman_weights(&[129, 0x31]).is_err());
        // all zero
        assert!(parse_huffman_weights(&[129, 0x00]).is_err());
        // FSE form truncated
        assert!(parse_huffman_weights(&[20, 1, 2]).is_err());
    }

    #[test]
    fn test_storage_reuse() {
        let table = HuffmanTable::from_weights(&[2, 1, 1]).unwrap();
        let storage = table.into_storage();
        let again = HuffmanTable::from_weights_in(&[1, 1], storage).unwrap();
        assert_eq!(again.table_log(), 1);
        assert_eq!(again.decode(1), HuffmanTableEntry::new(1, 1));
    }
}
