//! XXHash64 content checksums.
//!
//! A frame with the checksum flag ends with the low 32 bits of the
//! XXH64 (seed 0) of its decompressed content, little-endian.

use xxhash_rust::xxh64::{xxh64, Xxh64};

/// Compute XXHash64 of `data` with the given seed.
#[inline]
pub fn xxhash64(data: &[u8], seed: u64) -> u64 {
    xxh64(data, seed)
}

/// The 32-bit frame checksum of `data`.
#[inline]
pub fn content_checksum(data: &[u8]) -> u32 {
    xxhash64(data, 0) as u32
}

/// Incremental frame checksum.
#[derive(Clone)]
pub struct ContentHasher {
    inner: Xxh64,
}

impl ContentHasher {
    /// Start an empty checksum.
    pub fn new() -> Self {
        Self {
            inner: Xxh64::new(0),
        }
    }

    /// Feed decompressed bytes.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// The 32-bit checksum of everything fed so far.
    pub fn checksum(&self) -> u32 {
        self.inner.digest() as u32
    }

    /// Forget all input.
    pub fn reset(&mut self) {
        self.inner.reset(0);
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher")
            .field("checksum", &self.checksum())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(xxhash64(b"", 0), 0xEF46DB3751D8E999);
        assert_eq!(content_checksum(b""), 0x51D8E999);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 251) as u8).collect();
        let mut h = ContentHasher::new();
        for chunk in data.chunks(37) {
            h.update(chunk);
        }
        assert_eq!(h.checksum(), content_checksum(&data));

        h.reset();
        assert_eq!(h.checksum(), content_checksum(b""));
    }

    #[test]
    fn test_seed_changes_hash() {
        assert_ne!(xxhash64(b"vepar", 0), xxhash64(b"vepar", 1));
    }
}
