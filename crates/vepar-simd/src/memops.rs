//! Match copies for LZ77 decoders.
//!
//! A copy whose offset is shorter than its length reads bytes it has just
//! written; both kernels reproduce that run-length behavior exactly.

/// Append `length` bytes starting `offset` bytes before the end of `output`,
/// one byte at a time.
///
/// Callers guarantee `1 <= offset <= output.len()`.
#[inline]
pub fn copy_match_portable(output: &mut Vec<u8>, offset: usize, length: usize) {
    debug_assert!(offset > 0 && offset <= output.len());
    output.reserve(length);
    let start = output.len() - offset;
    for i in 0..length {
        let b = output[start + i];
        output.push(b);
    }
}

/// Append `length` bytes starting `offset` bytes before the end of `output`.
///
/// Non-overlapping spans are copied at once; overlapping spans are copied in
/// chunks of `offset` bytes, each of which is already fully written.
#[inline]
pub fn copy_match(output: &mut Vec<u8>, offset: usize, length: usize) {
    debug_assert!(offset > 0 && offset <= output.len());
    let start = output.len() - offset;

    if offset >= length {
        output.extend_from_within(start..start + length);
        return;
    }

    if offset == 1 {
        let b = output[start];
        output.resize(output.len() + length, b);
        return;
    }

    output.reserve(length);
    let mut remaining = length;
    let mut src = start;
    while remaining > 0 {
        // src trails the end by exactly `offset`, so the source span is
        // already written.
        let chunk = remaining.min(output.len() - src);
        output.extend_from_within(src..src + chunk);
        src += chunk;
        remaining -= chunk;
    }
}

/// Append `count` repetitions of `pattern`.
#[inline]
pub fn fill_repeat(output: &mut Vec<u8>, pattern: &[u8], count: usize) {
    match pattern {
        [] => {}
        [b] => output.resize(output.len() + count, *b),
        _ => {
            output.reserve(pattern.len() * count);
            for _ in 0..count {
                output.extend_from_slice(pattern);
            }
        }
    }
}
