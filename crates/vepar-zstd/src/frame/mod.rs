//! Frame envelope: magic, header, block headers and trailing checksum.
//!
//! ```text
//! magic (4) | header (2..=14) | block header (3) + content ... | xxh64 low 32 bits (0 or 4)
//! ```
//!
//! Skippable frames (magic `0x184D2A5?`) are recognised only to log them; the
//! decoder rejects them with `MagicMismatch`.

mod block;
mod checksum;
mod header;

pub use block::{BlockHeader, BlockType};
pub use checksum::{content_checksum, xxhash64, ContentHasher};
pub use header::{FrameDescriptor, FrameHeader};

/// `28 B5 2F FD` on the wire.
pub const ZSTD_MAGIC: u32 = 0xFD2FB528;

pub const SKIPPABLE_MAGIC_LOW: u32 = 0x184D2A50;
pub const SKIPPABLE_MAGIC_HIGH: u32 = 0x184D2A5F;

/// Decoder default cap on the declared window.
pub const MAX_WINDOW_SIZE: u64 = 1 << 27;

/// `Window_Descriptor` with exponent and mantissa both zero.
pub const MIN_WINDOW_SIZE: u64 = 1 << 10;

/// Block content limit, before the window further caps it.
pub const MAX_BLOCK_SIZE: usize = 1 << 17;

pub fn is_skippable(magic: u32) -> bool {
    magic & 0xFFFF_FFF0 == SKIPPABLE_MAGIC_LOW
}
