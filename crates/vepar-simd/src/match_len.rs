//! Forward match extension.
//!
//! Both kernels return the length of the common prefix of two slices,
//! capped at `max_len` and at the shorter slice.

/// Common-prefix length, byte at a time.
#[inline]
pub fn match_length_portable(a: &[u8], b: &[u8], max_len: usize) -> usize {
    a.iter()
        .zip(b.iter())
        .take(max_len)
        .take_while(|(x, y)| x == y)
        .count()
}

/// Common-prefix length using 8-byte words, or AVX2 on long spans.
#[inline]
pub fn match_length(a: &[u8], b: &[u8], max_len: usize) -> usize {
    let len = a.len().min(b.len()).min(max_len);
    if len == 0 {
        return 0;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if len >= 32 && crate::has_avx2() {
            // SAFETY: AVX2 support was checked at runtime and both slices
            // hold at least `len` bytes.
            return unsafe { match_length_avx2(&a[..len], &b[..len]) };
        }
    }

    match_length_words(&a[..len], &b[..len])
}

#[inline]
fn match_length_words(a: &[u8], b: &[u8]) -> usize {
    let len = a.len();
    let mut n = 0;
    for (wa, wb) in a.chunks_exact(8).zip(b.chunks_exact(8)) {
        let x = u64::from_le_bytes([wa[0], wa[1], wa[2], wa[3], wa[4], wa[5], wa[6], wa[7]]);
        let y = u64::from_le_bytes([wb[0], wb[1], wb[2], wb[3], wb[4], wb[5], wb[6], wb[7]]);
        let diff = x ^ y;
        if diff != 0 {
            return n + (diff.trailing_zeros() / 8) as usize;
        }
        n += 8;
    }
    while n < len && a[n] == b[n] {
        n += 1;
    }
    n
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn match_length_avx2(a: &[u8], b: &[u8]) -> usize {
    use std::arch::x86_64::*;

    let len = a.len();
    let mut n = 0;
    while n + 32 <= len {
        let mask = unsafe {
            let va = _mm256_loadu_si256(a.as_ptr().add(n) as *const __m256i);
            let vb = _mm256_loadu_si256(b.as_ptr().add(n) as *const __m256i);
            _mm256_movemask_epi8(_mm256_cmpeq_epi8(va, vb)) as u32
        };
        if mask != u32::MAX {
            return n + (!mask).trailing_zeros() as usize;
        }
        n += 32;
    }
    n + match_length_words(&a[n..], &b[n..])
}
