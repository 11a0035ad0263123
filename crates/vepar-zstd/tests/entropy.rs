//! Property-based tests for the entropy stages and the streaming decoder.
//!
//! These tests check, over seeded corpora:
//! - FSE table descriptors read back to the counts that were written
//! - standalone FSE streams decode to their input
//! - huff0 table descriptors rebuild the encoder's weights
//! - the streaming decoder matches the one-shot decoder at any chunking
//!
//! Run with: cargo test -p vepar-zstd --test entropy

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vepar_core::{Error, StreamingDecompressor};
use vepar_zstd::fse::{self, normalize_count, optimal_table_log, read_ncount, write_ncount};
use vepar_zstd::huffman::{read_table, HuffmanEncoder};
use vepar_zstd::{decompress, EncoderConfig, FrameEncoder, ZstdLevel, ZstdStreamDecoder};

/// Bytes below `symbols`, skewed towards small values.
fn skewed(seed: u64, len: usize, symbols: u8) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| rng.gen_range(0..symbols).min(rng.gen_range(0..symbols)))
        .collect()
}

/// Words with the odd random byte, so every level finds matches.
fn prose(seed: u64, len: usize) -> Vec<u8> {
    let words: [&[u8]; 6] = [b"huff ", b"zero ", b"state ", b"table ", b"offset ", b"run\n"];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        out.extend_from_slice(words[rng.gen_range(0..words.len())]);
        if rng.gen_ratio(1, 9) {
            out.push(rng.gen());
        }
    }
    out.truncate(len);
    out
}

/// Histogram trimmed to the last present symbol.
fn histogram(data: &[u8]) -> Vec<u32> {
    let mut hist = vec![0u32; 256];
    for &b in data {
        hist[b as usize] += 1;
    }
    let len = hist.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
    hist.truncate(len);
    hist
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    })]

    /// Property: a written NCount descriptor reads back to the same counts.
    #[test]
    fn prop_ncount_roundtrip(
        seed in any::<u64>(),
        len in 64usize..4000,
        symbols in 2u8..40,
        max_log in 6u8..=9,
    ) {
        let data = skewed(seed, len, symbols);
        let hist = histogram(&data);
        prop_assume!(hist.iter().filter(|&&c| c > 0).count() >= 2);

        let log = optimal_table_log(max_log, len, hist.len());
        let norm = normalize_count(&hist, len, log).unwrap();
        let mut out = Vec::new();
        write_ncount(&norm, &mut out).unwrap();

        let (back, used) = read_ncount(&out, 255, 12).unwrap();
        prop_assert_eq!(used, out.len());
        prop_assert_eq!(back.table_log, norm.table_log);
        prop_assert_eq!(back.counts, norm.counts);
    }

    /// Property: standalone FSE output decodes to its input.
    #[test]
    fn prop_fse_standalone_roundtrip(
        seed in any::<u64>(),
        len in 2usize..6000,
        symbols in 1u8..64,
    ) {
        let data = skewed(seed, len, symbols);
        match fse::compress(&data, 11) {
            Ok(packed) => {
                prop_assert!(packed.len() < data.len());
                prop_assert_eq!(fse::decompress(&packed, 11, data.len()).unwrap(), data);
            }
            Err(Error::Incompressible) | Err(Error::UseRle) => {}
            Err(e) => prop_assert!(false, "unexpected error: {e}"),
        }
    }

    /// Property: the huff0 table descriptor rebuilds the encoder's weights.
    #[test]
    fn prop_huffman_descriptor_roundtrip(
        seed in any::<u64>(),
        len in 64usize..8000,
        symbols in 2u8..=255,
        max_log in 8u8..=11,
    ) {
        let data = skewed(seed, len, symbols);
        let hist = histogram(&data);
        prop_assume!(hist.iter().filter(|&&c| c > 0).count() >= 2);

        let enc = HuffmanEncoder::build(&hist, max_log).unwrap();
        let mut out = Vec::new();
        match enc.write_table(&mut out) {
            Ok(()) => {
                let (table, used) = read_table(&out).unwrap();
                prop_assert_eq!(used, out.len());
                prop_assert_eq!(table.table_log(), enc.table_log());
                let enc_weights = enc.weights();
                prop_assert_eq!(table.weights(), enc_weights.as_slice());
            }
            // Raw weights cannot describe more than 128 symbols.
            Err(Error::Incompressible) => prop_assert!(enc.symbol_len() > 129),
            Err(e) => prop_assert!(false, "unexpected error: {e}"),
        }
    }

    /// Property: chunked streaming decode equals the one-shot decoder.
    #[test]
    fn prop_stream_decoder_any_chunking(
        seed in any::<u64>(),
        len in 0usize..40_000,
        level in prop::sample::select(ZstdLevel::ALL.to_vec()),
        checksum in any::<bool>(),
    ) {
        let data = prose(seed, len);
        let config = EncoderConfig::new(level)
            .with_checksum(checksum)
            .with_block_size(4096);
        let frame = FrameEncoder::new(config).compress(&data).unwrap();
        prop_assert_eq!(&decompress(&frame).unwrap(), &data);

        let mut rng = StdRng::seed_from_u64(seed ^ 0x5EED);
        let mut dec = ZstdStreamDecoder::default();
        dec.begin().unwrap();
        let mut buf = [0u8; 97];
        let mut out = Vec::with_capacity(data.len());
        let mut pos = 0;
        let mut finished = false;
        while pos < frame.len() {
            let end = (pos + rng.gen_range(1..300)).min(frame.len());
            let (read, n, done) = dec.decompress_chunk(&frame[pos..end], &mut buf).unwrap();
            prop_assert_eq!(read, end - pos);
            out.extend_from_slice(&buf[..n]);
            pos = end;
            finished = done;
        }
        let mut rounds = 0;
        while !finished {
            let (_, n, done) = dec.decompress_chunk(&[], &mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
            finished = done;
            rounds += 1;
            prop_assert!(rounds <= data.len() / buf.len() + 2, "decoder stalled");
        }
        prop_assert_eq!(out, data);
    }
}
