//! Zstd frame header parsing and writing.
//!
//! The frame header contains the frame descriptor and optional fields.

use vepar_core::{Error, Result};

use super::{MIN_WINDOW_SIZE, ZSTD_MAGIC};

/// Frame header descriptor byte.
///
/// ```text
/// Bit 7-6: Frame_Content_Size_flag
/// Bit 5:   Single_Segment_flag
/// Bit 4:   Unused_bit (must be 0)
/// Bit 3:   Reserved_bit (must be 0)
/// Bit 2:   Content_Checksum_flag
/// Bit 1-0: Dictionary_ID_flag
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    raw: u8,
}

impl FrameDescriptor {
    /// Parse a frame descriptor from a byte.
    pub fn new(byte: u8) -> Result<Self> {
        if byte & 0x08 != 0 {
            return Err(Error::corrupt("reserved bit in frame descriptor must be 0"));
        }
        Ok(Self { raw: byte })
    }

    /// The raw byte.
    #[inline]
    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// Frame_Content_Size_flag (bits 7-6).
    #[inline]
    pub fn frame_content_size_flag(&self) -> u8 {
        (self.raw >> 6) & 0x03
    }

    /// Number of bytes of the frame content size field.
    pub fn frame_content_size_bytes(&self) -> usize {
        match self.frame_content_size_flag() {
            0 if self.single_segment_flag() => 1,
            0 => 0,
            1 => 2,
            2 => 4,
            _ => 8,
        }
    }

    /// Single_Segment_flag (bit 5): the window is the content size.
    #[inline]
    pub fn single_segment_flag(&self) -> bool {
        (self.raw & 0x20) != 0
    }

    /// Content_Checksum_flag (bit 2).
    #[inline]
    pub fn content_checksum_flag(&self) -> bool {
        (self.raw & 0x04) != 0
    }

    /// Dictionary_ID_flag (bits 1-0).
    #[inline]
    pub fn dictionary_id_flag(&self) -> u8 {
        self.raw & 0x03
    }

    /// Number of bytes of the dictionary ID field.
    pub fn dictionary_id_bytes(&self) -> usize {
        match self.dictionary_id_flag() {
            0 => 0,
            1 => 1,
            2 => 2,
            _ => 4,
        }
    }

    /// Whether a window descriptor byte follows.
    #[inline]
    pub fn has_window_descriptor(&self) -> bool {
        !self.single_segment_flag()
    }
}

/// Parsed Zstd frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame descriptor.
    pub descriptor: FrameDescriptor,
    /// Window size in bytes. Single-segment frames use the content size.
    pub window_size: u64,
    /// Dictionary ID (0 if not present).
    pub dictionary_id: u32,
    /// Frame content size (None if not present).
    pub frame_content_size: Option<u64>,
    /// Whether content checksum is present.
    pub has_checksum: bool,
    /// Total header size in bytes (including magic number).
    pub header_size: usize,
}

impl FrameHeader {
    /// Parse a frame header.
    ///
    /// The buffer starts at the frame descriptor (after the magic number).
    /// Truncation reports [`Error::UnexpectedEof`] so streaming callers can
    /// wait for more input.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let Some(&first) = data.first() else {
            return Err(Error::unexpected_eof(0));
        };
        let descriptor = FrameDescriptor::new(first)?;
        let mut offset = 1;

        let window_size = if descriptor.has_window_descriptor() {
            let Some(&byte) = data.get(offset) else {
                return Err(Error::unexpected_eof(data.len()));
            };
            offset += 1;
            Self::decode_window_size(byte)
        } else {
            0
        };

        let dict_bytes = descriptor.dictionary_id_bytes();
        let dictionary_id = match data.get(offset..offset + dict_bytes) {
            Some(b) => read_le(b) as u32,
            None => return Err(Error::unexpected_eof(data.len())),
        };
        offset += dict_bytes;

        let fcs_bytes = descriptor.frame_content_size_bytes();
        let frame_content_size = match data.get(offset..offset + fcs_bytes) {
            Some(_) if fcs_bytes == 0 => None,
            Some(b) if fcs_bytes == 2 => Some(read_le(b) + 256),
            Some(b) => Some(read_le(b)),
            None => return Err(Error::unexpected_eof(data.len())),
        };
        offset += fcs_bytes;

        let window_size = if descriptor.single_segment_flag() {
            frame_content_size.unwrap_or(0)
        } else {
            window_size
        };

        Ok(Self {
            descriptor,
            window_size,
            dictionary_id,
            frame_content_size,
            has_checksum: descriptor.content_checksum_flag(),
            header_size: 4 + offset,
        })
    }

    /// Decode the window size from the window descriptor byte.
    ///
    /// `window_base = 1 << (10 + exponent)`, plus `mantissa` eighths of it.
    pub fn decode_window_size(byte: u8) -> u64 {
        let exponent = (byte >> 3) as u32;
        let mantissa = (byte & 0x07) as u64;
        let base = 1u64 << (10 + exponent);
        base + (base / 8) * mantissa
    }

    /// Header for a frame carrying `content_size` bytes.
    ///
    /// `window_size` must be a power of two of at least 1 KB. Content that
    /// fits in the window (and is not empty) produces a single-segment
    /// frame.
    pub fn for_content(content_size: u64, window_size: u64, checksum: bool) -> Self {
        let window_size = window_size.max(MIN_WINDOW_SIZE).next_power_of_two();
        let single = content_size > 0 && content_size <= window_size;
        let fcs_flag = match content_size {
            0..=255 => 0u8,
            256..=65791 => 1,
            65792..=0xFFFF_FFFF => 2,
            _ => 3,
        };
        let mut raw = fcs_flag << 6;
        if single {
            raw |= 0x20;
        }
        if checksum {
            raw |= 0x04;
        }
        let descriptor = FrameDescriptor { raw };
        let frame_content_size = if single || fcs_flag > 0 {
            Some(content_size)
        } else {
            None
        };
        let mut header_size = 4 + 1 + descriptor.frame_content_size_bytes();
        if !single {
            header_size += 1;
        }
        Self {
            descriptor,
            window_size: if single { content_size } else { window_size },
            dictionary_id: 0,
            frame_content_size,
            has_checksum: checksum,
            header_size,
        }
    }

    /// Header for a frame whose size is not known up front.
    pub fn unknown_size(window_size: u64, checksum: bool) -> Self {
        Self::for_content(0, window_size, checksum)
    }

    /// Append magic number and header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ZSTD_MAGIC.to_le_bytes());
        out.push(self.descriptor.raw);
        if self.descriptor.has_window_descriptor() {
            let log = 63 - self.window_size.max(MIN_WINDOW_SIZE).leading_zeros();
            out.push(((log - 10) << 3) as u8);
        }
        let fcs = self.frame_content_size.unwrap_or(0);
        match self.descriptor.frame_content_size_bytes() {
            0 => {}
            1 => out.push(fcs as u8),
            2 => out.extend_from_slice(&((fcs - 256) as u16).to_le_bytes()),
            4 => out.extend_from_slice(&(fcs as u32).to_le_bytes()),
            _ => out.extend_from_slice(&fcs.to_le_bytes()),
        }
    }
}

fn read_le(b: &[u8]) -> u64 {
    b.iter()
        .rev()
        .fold(0u64, |acc, &byte| (acc << 8) | byte as u64)
}
