//! Reusable storage for decoding tables.
//!
//! Every compressed block that carries its own FSE descriptors or Huffman
//! weights builds a table. The pool keeps released table storage in free
//! lists indexed by table log so the next frame can rebuild in place
//! instead of allocating.

use crate::fse::{FseDecodeEntry, FseDecodeTable, FSE_MAX_TABLELOG};
use crate::huffman::{HuffmanTable, HuffmanTableEntry, HUF_TABLELOG_MAX};

/// Free lists for released decoding tables.
#[derive(Debug)]
pub struct ScratchPool {
    fse: Vec<Vec<Vec<FseDecodeEntry>>>,
    huffman: Vec<Vec<Vec<HuffmanTableEntry>>>,
    stats: PoolStats,
}

/// Pool usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Requests served from a free list.
    pub hits: u64,
    /// Requests that had to start from empty storage.
    pub misses: u64,
    /// Buffers currently held.
    pub free_buffers: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scratch: {} hits, {} misses, {} free buffers",
            self.hits, self.misses, self.free_buffers
        )
    }
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchPool {
    /// Largest number of buffers kept per table log.
    pub const MAX_PER_LOG: usize = 4;

    /// Empty pool.
    pub fn new() -> Self {
        Self {
            fse: vec![Vec::new(); FSE_MAX_TABLELOG as usize + 1],
            huffman: vec![Vec::new(); HUF_TABLELOG_MAX as usize + 1],
            stats: PoolStats::default(),
        }
    }

    /// Storage for an FSE table of `table_log`.
    pub fn take_fse(&mut self, table_log: u8) -> Vec<FseDecodeEntry> {
        let found = self
            .fse
            .get_mut(table_log as usize)
            .and_then(|list| list.pop());
        self.record(found)
    }

    /// Return a table's storage.
    pub fn put_fse(&mut self, table: FseDecodeTable) {
        let log = table.table_log() as usize;
        if let Some(list) = self.fse.get_mut(log) {
            if list.len() < Self::MAX_PER_LOG {
                list.push(table.into_storage());
                self.stats.free_buffers += 1;
            }
        }
    }

    /// Storage for a Huffman table.
    ///
    /// The table log is only known once the weights are parsed, so the
    /// largest held buffer is handed out.
    pub fn take_huffman(&mut self) -> Vec<HuffmanTableEntry> {
        let found = self
            .huffman
            .iter_mut()
            .rev()
            .find_map(|list| list.pop());
        self.record(found)
    }

    /// Return a Huffman table's storage.
    pub fn put_huffman(&mut self, table: HuffmanTable) {
        let log = table.table_log() as usize;
        if let Some(list) = self.huffman.get_mut(log) {
            if list.len() < Self::MAX_PER_LOG {
                list.push(table.into_storage());
                self.stats.free_buffers += 1;
            }
        }
    }

    /// Usage counters.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Drop every held buffer.
    pub fn clear(&mut self) {
        self.fse.iter_mut().for_each(Vec::clear);
        self.huffman.iter_mut().for_each(Vec::clear);
        self.stats.free_buffers = 0;
    }

    fn record<T>(&mut self, found: Option<Vec<T>>) -> Vec<T> {
        match found {
            Some(buf) => {
                self.stats.hits += 1;
                self.stats.free_buffers -= 1;
                buf
            }
            None => {
                self.stats.misses += 1;
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fse::NormalizedCounts;

    #[test]
    fn test_fse_storage_is_keyed_by_log() {
        let mut pool = ScratchPool::new();
        let norm = NormalizedCounts::new(vec![20, 12], 5);
        let table = FseDecodeTable::build(&norm).unwrap();
        pool.put_fse(table);
        assert_eq!(pool.stats().free_buffers, 1);

        assert!(pool.take_fse(6).is_empty());
        let storage = pool.take_fse(5);
        assert!(storage.capacity() >= 32);
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().misses, 1);
        assert_eq!(pool.stats().free_buffers, 0);

        let rebuilt = FseDecodeTable::build_in(&norm, storage).unwrap();
        assert_eq!(rebuilt, FseDecodeTable::build(&norm).unwrap());
    }

    #[test]
    fn test_free_list_is_bounded() {
        let mut pool = ScratchPool::new();
        for _ in 0..10 {
            pool.put_fse(FseDecodeTable::rle(3));
        }
        assert_eq!(pool.stats().free_buffers, ScratchPool::MAX_PER_LOG);
        pool.clear();
        assert_eq!(pool.stats().free_buffers, 0);
    }

    #[test]
    fn test_huffman_storage() {
        let mut pool = ScratchPool::new();
        let table = HuffmanTable::from_weights(&[2, 1, 1]).unwrap();
        let log = table.table_log();
        pool.put_huffman(table);
        let storage = pool.take_huffman();
        assert!(storage.capacity() >= 1 << log);
        assert!(pool.take_huffman().is_empty());
    }
}
