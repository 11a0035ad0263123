//! Property-based tests for the streaming DEFLATE types.
//!
//! These tests check, over seeded corpora:
//! - the inflater matches one-shot `inflate` at any chunking
//! - flushes between chunks never change the decoded stream
//! - arbitrary bytes are rejected or decoded, never a panic
//!
//! Run with: cargo test -p vepar-deflate --test streaming

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vepar_core::{Flush, StreamingCompressor, StreamingDecompressor};
use vepar_deflate::{deflate, inflate, inflate_with, DeflateConfig, Deflater, InflateConfig, Inflater, HUFFMAN_ONLY};

/// Short words with occasional random bytes and runs.
fn corpus(seed: u64, len: usize) -> Vec<u8> {
    let words: [&[u8]; 7] = [
        b"stored ", b"fixed ", b"dynamic ", b"length ", b"distance ", b"literal ", b"end\n",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len + 16);
    while out.len() < len {
        match rng.gen_range(0..12) {
            0 => out.push(rng.gen()),
            1 => {
                let b = rng.gen();
                out.resize(out.len() + rng.gen_range(3..300), b);
            }
            _ => out.extend_from_slice(words[rng.gen_range(0..words.len())]),
        }
    }
    out.truncate(len);
    out
}

fn level_strategy() -> impl Strategy<Value = i32> {
    prop_oneof![Just(HUFFMAN_ONLY), 0i32..=9]
}

fn flush_strategy() -> impl Strategy<Value = Flush> {
    prop_oneof![
        4 => Just(Flush::None),
        1 => Just(Flush::Sync),
        1 => Just(Flush::Full),
        1 => Just(Flush::Block),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    })]

    /// Property: the inflater produces the one-shot output at any chunking.
    #[test]
    fn prop_inflater_any_chunking(
        seed in any::<u64>(),
        len in 0usize..60_000,
        level in level_strategy(),
    ) {
        let data = corpus(seed, len);
        let compressed = deflate(&data, DeflateConfig::new(level).unwrap()).unwrap();
        prop_assert_eq!(&inflate(&compressed).unwrap(), &data);

        let mut rng = StdRng::seed_from_u64(!seed);
        let mut inflater = Inflater::default();
        inflater.begin().unwrap();
        let mut buf = [0u8; 509];
        let mut out = Vec::with_capacity(data.len());
        let mut pos = 0;
        let mut finished = false;
        while pos < compressed.len() {
            let end = (pos + rng.gen_range(1..700)).min(compressed.len());
            let (read, n, done) = inflater.decompress_chunk(&compressed[pos..end], &mut buf).unwrap();
            prop_assert_eq!(read, end - pos);
            out.extend_from_slice(&buf[..n]);
            pos = end;
            finished = done;
        }
        let mut rounds = 0;
        while !finished {
            let (_, n, done) = inflater.decompress_chunk(&[], &mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
            finished = done;
            rounds += 1;
            prop_assert!(rounds <= data.len() / buf.len() + 2, "inflater stalled");
        }
        prop_assert_eq!(out, data);
    }

    /// Property: any mix of flush modes between chunks decodes to the input.
    #[test]
    fn prop_deflater_flushes_roundtrip(
        seed in any::<u64>(),
        len in 0usize..40_000,
        level in 1i32..=9,
        flushes in prop::collection::vec(flush_strategy(), 1..24),
    ) {
        let data = corpus(seed, len);
        let mut rng = StdRng::seed_from_u64(seed.rotate_left(17));
        let mut deflater = Deflater::new(DeflateConfig::new(level).unwrap());
        deflater.begin().unwrap();

        let mut buf = vec![0u8; 2 * data.len() + 1024];
        let mut out = Vec::new();
        let mut pos = 0;
        for &flush in &flushes {
            let end = (pos + rng.gen_range(0..=data.len() / flushes.len() + 1)).min(data.len());
            let (read, n) = deflater.compress_chunk(&data[pos..end], &mut buf, flush).unwrap();
            prop_assert_eq!(read, end - pos);
            out.extend_from_slice(&buf[..n]);
            pos = end;
        }
        let (_, n) = deflater.compress_chunk(&data[pos..], &mut buf, Flush::None).unwrap();
        out.extend_from_slice(&buf[..n]);
        loop {
            let n = deflater.finish(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        prop_assert_eq!(inflate(&out).unwrap(), data);
    }

    /// Property: arbitrary input never panics the decoder.
    #[test]
    fn prop_inflate_arbitrary_bytes(
        bytes in prop::collection::vec(any::<u8>(), 0..2048),
        cap in 1u64..100_000,
    ) {
        let _ = inflate(&bytes);
        if let Ok(out) = inflate_with(&bytes, &InflateConfig::default().with_max_output(cap)) {
            prop_assert!(out.len() as u64 <= cap);
        }
    }
}
