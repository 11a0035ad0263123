//! Level presets, algorithm tags and ratio arithmetic.

/// Codec-neutral level knob.
///
/// Each codec maps presets onto its own scale: DEFLATE takes the numeric
/// value directly (`-2`, `0..=9`), Zstd buckets it into its six match-finder
/// tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionLevel {
    /// Level 0: DEFLATE stored blocks, the fastest Zstd tier.
    None,
    /// Level 1.
    Fast,
    /// Level 6.
    #[default]
    Default,
    /// Level 9.
    Best,
    /// Level 12, above the DEFLATE range.
    Ultra,
    /// Any other numeric level; codecs reject what they cannot honour.
    Custom(i32),
}

impl CompressionLevel {
    /// Numeric value of the preset.
    pub fn to_level(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Fast => 1,
            Self::Default => 6,
            Self::Best => 9,
            Self::Ultra => 12,
            Self::Custom(n) => n,
        }
    }

    /// Preset for a numeric value, `Custom` when none matches.
    pub fn from_level(n: i32) -> Self {
        [Self::None, Self::Fast, Self::Default, Self::Best, Self::Ultra]
            .into_iter()
            .find(|preset| preset.to_level() == n)
            .unwrap_or(Self::Custom(n))
    }
}

/// Wire formats this library speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// RFC 8878 frames.
    Zstd,
    /// RFC 1951 raw block streams, no zlib or gzip wrapper.
    Deflate,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Zstd => "zstd",
            Self::Deflate => "deflate",
        }
    }
}

/// Input and output sizes of one compression.
#[derive(Debug, Clone, Copy)]
pub struct CompressionRatio {
    pub original_size: usize,
    pub compressed_size: usize,
}

impl CompressionRatio {
    pub fn new(original_size: usize, compressed_size: usize) -> Self {
        Self {
            original_size,
            compressed_size,
        }
    }

    /// `original / compressed`; 0.0 for an empty output.
    pub fn ratio(&self) -> f64 {
        match self.compressed_size {
            0 => 0.0,
            n => self.original_size as f64 / n as f64,
        }
    }

    /// Share of the input saved, in percent. Negative when the output grew.
    pub fn savings_percent(&self) -> f64 {
        match self.original_size {
            0 => 0.0,
            n => 100.0 - self.compressed_size as f64 * 100.0 / n as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_map_to_numbers() {
        assert_eq!(CompressionLevel::default().to_level(), 6);
        assert_eq!(CompressionLevel::from_level(9), CompressionLevel::Best);
        assert_eq!(CompressionLevel::from_level(0), CompressionLevel::None);
        assert_eq!(CompressionLevel::from_level(-2), CompressionLevel::Custom(-2));
        for n in -3..15 {
            assert_eq!(CompressionLevel::from_level(n).to_level(), n);
        }
    }

    #[test]
    fn test_ratio_and_savings() {
        let r = CompressionRatio::new(1000, 250);
        assert_eq!(r.ratio(), 4.0);
        assert_eq!(r.savings_percent(), 75.0);
        assert_eq!(CompressionRatio::new(10, 0).ratio(), 0.0);
        assert!(CompressionRatio::new(100, 105).savings_percent() < 0.0);
    }
}
