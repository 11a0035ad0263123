//! # Vepar SIMD
//!
//! Accelerated primitives for the LZ77 match finders and decoders.
//!
//! Every kernel has a portable twin with identical results; [`Accel`]
//! picks one. Encoders thread an `Accel` through their hot loops so the
//! two paths can be compared byte for byte.
//!
//! ## Supported Architectures
//!
//! - **x86_64**: AVX2 (match length), 4-bank histogram
//! - **Fallback**: 8-byte word comparison, chunked copies
//!
//! ## Example
//!
//! ```ignore
//! use vepar_simd::Accel;
//!
//! let n = Accel::Native.match_length(&window[cand..], &window[pos..], 258);
//! ```

mod histogram;
mod match_len;
mod memops;

pub use histogram::{byte_histogram, byte_histogram_portable};
pub use match_len::{match_length, match_length_portable};
pub use memops::{copy_match, copy_match_portable, fill_repeat};

use std::sync::OnceLock;

/// Widest vector extension the running CPU reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SimdLevel {
    /// Word-at-a-time portable code only.
    #[default]
    None,
    Sse42,
    Avx2,
    Neon,
}

impl SimdLevel {
    /// Name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            SimdLevel::None => "none",
            SimdLevel::Sse42 => "sse4.2",
            SimdLevel::Avx2 => "avx2",
            SimdLevel::Neon => "neon",
        }
    }

    /// Bytes compared per step by the match-length kernel.
    pub fn vector_width(self) -> usize {
        match self {
            SimdLevel::None => 8,
            SimdLevel::Sse42 | SimdLevel::Neon => 16,
            SimdLevel::Avx2 => 32,
        }
    }
}

/// Detect available SIMD level at runtime.
#[cfg(target_arch = "x86_64")]
pub fn detect_simd() -> SimdLevel {
    if is_x86_feature_detected!("avx2") {
        SimdLevel::Avx2
    } else if is_x86_feature_detected!("sse4.2") {
        SimdLevel::Sse42
    } else {
        SimdLevel::None
    }
}

/// Detect available SIMD level at runtime.
#[cfg(target_arch = "aarch64")]
pub fn detect_simd() -> SimdLevel {
    SimdLevel::Neon
}

/// Detect available SIMD level at runtime.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub fn detect_simd() -> SimdLevel {
    SimdLevel::None
}

static SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Get the current SIMD level (detected once, then cached).
pub fn simd_level() -> SimdLevel {
    *SIMD_LEVEL.get_or_init(|| {
        let level = detect_simd();
        tracing::debug!(level = level.as_str(), "detected simd level");
        level
    })
}

/// Check if AVX2 is available.
#[inline]
pub fn has_avx2() -> bool {
    simd_level() >= SimdLevel::Avx2
}

/// Kernel selection for encoders and decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accel {
    /// Byte-at-a-time reference kernels.
    Portable,
    /// Word-wide and vector kernels where the CPU allows.
    #[default]
    Native,
}

impl Accel {
    /// Number of equal leading bytes of `a` and `b`, at most `max_len`.
    #[inline]
    pub fn match_length(self, a: &[u8], b: &[u8], max_len: usize) -> usize {
        match self {
            Accel::Portable => match_length_portable(a, b, max_len),
            Accel::Native => match_length(a, b, max_len),
        }
    }

    /// Append `length` bytes copied from `offset` bytes back.
    #[inline]
    pub fn copy_match(self, output: &mut Vec<u8>, offset: usize, length: usize) {
        match self {
            Accel::Portable => copy_match_portable(output, offset, length),
            Accel::Native => copy_match(output, offset, length),
        }
    }

    /// 256-bin byte histogram.
    #[inline]
    pub fn histogram(self, data: &[u8]) -> [u32; 256] {
        match self {
            Accel::Portable => byte_histogram_portable(data),
            Accel::Native => byte_histogram(data),
        }
    }

    /// Whether vector instructions back the native kernels on this CPU.
    pub fn is_vectorized(self) -> bool {
        self == Accel::Native && simd_level() > SimdLevel::None
    }
}
