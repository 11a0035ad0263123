//! Vepar compression benchmarks
//!
//! Benchmarks cover:
//! - Zstd encode per level and decode
//! - DEFLATE encode per level and inflate
//! - huff0 and FSE entropy stages
//! - portable versus native kernels

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vepar::deflate::{deflate, inflate};
use vepar::simd::Accel;
use vepar::zstd::{fse, huffman};
use vepar::{
    DecoderConfig, DeflateConfig, EncoderConfig, FrameDecoder, FrameEncoder, ZstdLevel,
};

const SIZES: [usize; 3] = [16 * 1024, 256 * 1024, 1024 * 1024];

/// Words drawn from a skewed vocabulary, like log lines or prose.
fn generate_text(size: usize) -> Vec<u8> {
    let words: [&[u8]; 12] = [
        b"the ", b"of ", b"and ", b"block ", b"window ", b"offset ", b"literal ", b"match ",
        b"frame ", b"table ", b"symbol ", b"stream\n",
    ];
    let mut rng = StdRng::seed_from_u64(42);
    let mut out = Vec::with_capacity(size + 16);
    while out.len() < size {
        let i = rng.gen_range(0..words.len()).min(rng.gen_range(0..words.len()));
        out.extend_from_slice(words[i]);
        if rng.gen_ratio(1, 20) {
            out.extend_from_slice(format!("{} ", rng.gen::<u16>()).as_bytes());
        }
    }
    out.truncate(size);
    out
}

/// Bytes with a geometric-ish distribution, for the entropy stages.
fn generate_skewed(size: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..size)
        .map(|_| {
            let a: u8 = rng.gen_range(0..64);
            let b: u8 = rng.gen_range(0..64);
            a.min(b)
        })
        .collect()
}

fn generate_random(size: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(1);
    let mut out = vec![0u8; size];
    rng.fill(out.as_mut_slice());
    out
}

fn bench_zstd_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("zstd_compress");
    for size in SIZES {
        let data = generate_text(size);
        group.throughput(Throughput::Bytes(size as u64));
        for level in ZstdLevel::ALL {
            let id = BenchmarkId::new(format!("L{}", level.number()), size);
            group.bench_with_input(id, &data, |b, data| {
                let mut encoder = FrameEncoder::new(EncoderConfig::new(level));
                b.iter(|| encoder.compress(black_box(data)).unwrap())
            });
        }
    }
    group.finish();
}

fn bench_zstd_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("zstd_decompress");
    for size in SIZES {
        let data = generate_text(size);
        let frame = FrameEncoder::new(EncoderConfig::new(ZstdLevel::Default))
            .compress(&data)
            .unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("text", size), &frame, |b, frame| {
            let mut decoder = FrameDecoder::new(DecoderConfig::default());
            b.iter(|| decoder.decode_all(black_box(frame)).unwrap())
        });
    }
    group.finish();
}

fn bench_deflate(c: &mut Criterion) {
    let mut group = c.benchmark_group("deflate");
    let data = generate_text(256 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));
    for level in [1, 3, 6, 9] {
        let config = DeflateConfig::new(level).unwrap();
        group.bench_with_input(BenchmarkId::new("compress", level), &data, |b, data| {
            b.iter(|| deflate(black_box(data), config).unwrap())
        });
    }
    let compressed = deflate(&data, DeflateConfig::default()).unwrap();
    group.bench_with_input(BenchmarkId::new("inflate", 6), &compressed, |b, compressed| {
        b.iter(|| inflate(black_box(compressed)).unwrap())
    });

    let random = generate_random(256 * 1024);
    group.bench_with_input(BenchmarkId::new("compress_random", 6), &random, |b, data| {
        b.iter(|| deflate(black_box(data), DeflateConfig::default()).unwrap())
    });
    group.finish();
}

fn bench_entropy(c: &mut Criterion) {
    let mut group = c.benchmark_group("entropy");
    let data = generate_skewed(64 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    let packed_1x = huffman::compress_1x(&data).unwrap();
    let packed_4x = huffman::compress_4x(&data).unwrap();
    let packed_fse = fse::compress(&data, 11).unwrap();

    group.bench_function("huff0_compress_4x", |b| {
        b.iter(|| huffman::compress_4x(black_box(&data)).unwrap())
    });
    group.bench_function("huff0_decompress_1x", |b| {
        b.iter(|| huffman::decompress_1x(black_box(&packed_1x), data.len()).unwrap())
    });
    group.bench_function("huff0_decompress_4x", |b| {
        b.iter(|| huffman::decompress_4x(black_box(&packed_4x), data.len()).unwrap())
    });
    group.bench_function("fse_compress", |b| {
        b.iter(|| fse::compress(black_box(&data), 11).unwrap())
    });
    group.bench_function("fse_decompress", |b| {
        b.iter(|| fse::decompress(black_box(&packed_fse), 11, data.len()).unwrap())
    });
    group.finish();
}

fn bench_accelerators(c: &mut Criterion) {
    let mut group = c.benchmark_group("accelerators");
    let data = generate_text(256 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));
    for accel in [Accel::Portable, Accel::Native] {
        let name = format!("{accel:?}");
        let config = EncoderConfig::new(ZstdLevel::Default).with_accel(accel);
        group.bench_with_input(BenchmarkId::new("zstd_L4", &name), &data, |b, data| {
            let mut encoder = FrameEncoder::new(config.clone());
            b.iter(|| encoder.compress(black_box(data)).unwrap())
        });
        let config = DeflateConfig::default().with_accel(accel);
        group.bench_with_input(BenchmarkId::new("deflate_L6", &name), &data, |b, data| {
            b.iter(|| deflate(black_box(data), config).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_zstd_compress,
    bench_zstd_decompress,
    bench_deflate,
    bench_entropy,
    bench_accelerators,
);
criterion_main!(benches);
