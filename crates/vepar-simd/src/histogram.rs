//! Byte histograms for entropy coding decisions.

/// Straight 256-bin count.
pub fn byte_histogram_portable(data: &[u8]) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for &b in data {
        hist[b as usize] += 1;
    }
    hist
}

/// 256-bin count spread over four banks to break store-to-load chains on
/// runs of the same byte.
pub fn byte_histogram(data: &[u8]) -> [u32; 256] {
    if data.len() < 64 {
        return byte_histogram_portable(data);
    }

    let mut banks = [[0u32; 256]; 4];
    let chunks = data.chunks_exact(16);
    let rest = chunks.remainder();
    for c in chunks {
        for (i, &b) in c.iter().enumerate() {
            banks[i & 3][b as usize] += 1;
        }
    }
    for &b in rest {
        banks[0][b as usize] += 1;
    }

    let mut hist = [0u32; 256];
    for (i, h) in hist.iter_mut().enumerate() {
        *h = banks[0][i] + banks[1][i] + banks[2][i] + banks[3][i];
    }
    hist
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_counts() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 10) as u8).collect();
        let hist = byte_histogram(&data);
        assert_eq!(hist[0], 100);
        assert_eq!(hist[9], 100);
        assert_eq!(hist[10], 0);
        assert_eq!(hist, byte_histogram_portable(&data));
    }

    #[test]
    fn test_histogram_short_and_uniform() {
        assert_eq!(byte_histogram(b"aab")[b'a' as usize], 2);
        let data = [0xAAu8; 1 << 16];
        assert_eq!(byte_histogram(&data)[0xAA], 1 << 16);
    }
}
