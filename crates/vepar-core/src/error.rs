//! Error types for compression operations.

use thiserror::Error;

/// Result type alias for compression operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Compression error types.
///
/// `Incompressible` and `UseRle` are encoder-local signals: block assemblers
/// catch them and fall back to a raw or RLE block, so they never reach the
/// caller of a codec.
#[derive(Debug, Error)]
pub enum Error {
    /// Entropy coding would not shrink the input; store it raw.
    #[error("input is incompressible")]
    Incompressible,

    /// Input is a single repeated byte; emit it as RLE.
    #[error("input is a single repeated symbol, use RLE")]
    UseRle,

    /// A Zstd block header carried the reserved block type 3.
    #[error("reserved block type at offset {offset}")]
    ReservedBlockType { offset: usize },

    /// A block is larger than the format or window allows.
    #[error("compressed block of {size} bytes exceeds maximum {max}")]
    CompressedSizeTooBig { size: usize, max: usize },

    /// Frame magic number did not match.
    #[error("magic number mismatch: found 0x{found:08x}")]
    MagicMismatch { found: u32 },

    /// Frame window larger than the decoder accepts.
    #[error("window size {window} exceeds maximum {max}")]
    WindowSizeExceeded { window: u64, max: u64 },

    /// Frame window too small to hold any data.
    #[error("window size {window} is too small")]
    WindowSizeTooSmall { window: u64 },

    /// Input data is corrupt or invalid.
    #[error("corrupt input: {message}")]
    CorruptInput {
        message: String,
        offset: Option<usize>,
    },

    /// Checksum verification failed.
    #[error("checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Decoded output would exceed the caller-imposed cap.
    #[error("decoded size exceeds limit of {limit} bytes")]
    MaxDecodedSizeExceeded { limit: u64 },

    /// Buffer too small for output.
    #[error("buffer too small: need {required} bytes, got {provided}")]
    BufferTooSmall { required: usize, provided: usize },

    /// Invalid compression level specified.
    #[error("invalid compression level {level}: must be in range [{min}, {max}]")]
    InvalidLevel { level: i32, min: i32, max: i32 },

    /// Unexpected end of input stream.
    #[error("unexpected EOF after {bytes_read} bytes")]
    UnexpectedEof { bytes_read: usize },

    /// I/O error from underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream state error.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Unsupported feature or format.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Create a corrupt input error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Error::CorruptInput {
            message: message.into(),
            offset: None,
        }
    }

    /// Create a corrupt input error with offset context.
    pub fn corrupt_at(message: impl Into<String>, offset: usize) -> Self {
        Error::CorruptInput {
            message: format!("{} at offset {}", message.into(), offset),
            offset: Some(offset),
        }
    }

    /// Create a buffer too small error.
    pub fn buffer_too_small(required: usize, provided: usize) -> Self {
        Error::BufferTooSmall { required, provided }
    }

    /// Create a checksum mismatch error.
    pub fn checksum_mismatch(expected: u32, actual: u32) -> Self {
        Error::ChecksumMismatch { expected, actual }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(bytes_read: usize) -> Self {
        Error::UnexpectedEof { bytes_read }
    }

    /// Create an I/O error with a custom message.
    pub fn io(message: impl Into<String>) -> Self {
        Error::Io(std::io::Error::other(message.into()))
    }

    /// Create a window-too-small error.
    pub fn window_too_small(window: u64) -> Self {
        Error::WindowSizeTooSmall { window }
    }

    /// Create a block-too-large error.
    pub fn block_too_big(size: usize, max: usize) -> Self {
        Error::CompressedSizeTooBig { size, max }
    }

    /// Check if this is one of the encoder-local fallback signals.
    pub fn is_encoder_signal(&self) -> bool {
        matches!(self, Error::Incompressible | Error::UseRle)
    }

    /// Check if error is recoverable (can retry with different parameters).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedEof { .. }
                | Error::BufferTooSmall { .. }
                | Error::Incompressible
                | Error::UseRle
        )
    }

    /// Get error category for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Incompressible => "incompressible",
            Error::UseRle => "use_rle",
            Error::ReservedBlockType { .. } => "reserved_block_type",
            Error::CompressedSizeTooBig { .. } => "compressed_size_too_big",
            Error::MagicMismatch { .. } => "magic_mismatch",
            Error::WindowSizeExceeded { .. } => "window_size_exceeded",
            Error::WindowSizeTooSmall { .. } => "window_size_too_small",
            Error::CorruptInput { .. } => "corrupt_input",
            Error::ChecksumMismatch { .. } => "checksum_mismatch",
            Error::MaxDecodedSizeExceeded { .. } => "max_decoded_size_exceeded",
            Error::BufferTooSmall { .. } => "buffer_too_small",
            Error::InvalidLevel { .. } => "invalid_level",
            Error::UnexpectedEof { .. } => "unexpected_eof",
            Error::Io(_) => "io_error",
            Error::InvalidState { .. } => "invalid_state",
            Error::Unsupported(_) => "unsupported",
        }
    }
}
