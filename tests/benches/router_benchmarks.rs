//! # Router Hot-Path Benchmarks
//!
//! | Area | Operation | Target |
//! |------|-----------|--------|
//! | URI | `topic_match` per delivery | < 1µs |
//! | URI | `restrict_by` per chain hop | < 1µs |
//! | Objects | DOT sign / decode + verify | < 1ms |
//! | OOB | frame encode / decode | < 50µs |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use bw_01_objects::{ronum, AccessGrant, Dot, DotBody, DotParams, Entity, Metadata, PayloadObject};
use bw_07_oob_adapter::{Command, Frame, FrameReader, DEFAULT_MAX_FRAME_BYTES};
use shared_types::{restrict_by, topic_match, AccessPermissions};

// ============================================================================
// URI matching
// ============================================================================

fn bench_uri_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("uri-matching");
    group.measurement_time(Duration::from_secs(5));

    let topic: Vec<&str> = "building/4/floor/2/room/17/temp".split('/').collect();
    let patterns = [
        ("exact", "building/4/floor/2/room/17/temp"),
        ("plus", "building/+/floor/+/room/+/temp"),
        ("star_tail", "building/4/*"),
        ("star_mid", "building/*/temp"),
    ];
    for (name, pattern) in patterns {
        let parts: Vec<&str> = pattern.split('/').collect();
        group.bench_with_input(BenchmarkId::new("topic_match", name), &parts, |b, p| {
            b.iter(|| black_box(topic_match(black_box(&topic), p)))
        });
    }

    let pairs = [
        ("disjoint", "a/+/c", "a/b/d"),
        ("plus_plus", "a/+/c", "a/b/+"),
        ("star_star", "a/*/z", "a/b/*"),
    ];
    for (name, from, by) in pairs {
        group.bench_function(BenchmarkId::new("restrict_by", name), |b| {
            b.iter(|| black_box(restrict_by(black_box(from), black_box(by))))
        });
    }

    group.finish();
}

// ============================================================================
// DOT signing
// ============================================================================

fn bench_dot_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("dot-signatures");
    group.measurement_time(Duration::from_secs(10));

    let giver = Entity::create(Metadata::default()).unwrap();
    let receiver = Entity::create(Metadata::default()).unwrap();
    let params = DotParams {
        receiver: *receiver.vk(),
        ttl: 3,
        meta: Metadata::default(),
        body: DotBody::Access(AccessGrant {
            mvk: *giver.vk(),
            suffix: "building/+/floor/*".to_string(),
            permissions: AccessPermissions::parse("PC*").unwrap(),
        }),
    };
    let sk = giver.sk().unwrap();

    group.bench_function("dot_sign", |b| {
        b.iter(|| black_box(Dot::sign(sk, params.clone()).unwrap()))
    });

    let dot = Dot::sign(sk, params.clone()).unwrap();
    let content = dot.content().to_vec();
    group.bench_function("dot_decode_and_verify", |b| {
        b.iter(|| {
            let d = Dot::decode(ronum::ACCESS_DOT, black_box(&content)).unwrap();
            black_box(d.sig_valid())
        })
    });

    group.finish();
}

// ============================================================================
// OOB framing
// ============================================================================

fn sample_frame(payload_bytes: usize) -> Frame {
    let mut f = Frame::new(Command::Publish, 42)
        .header("uri", "bm9ub25ub25ub25ub25ub25ub25ub25ub25ub25ub24=/building/4/temp")
        .header("primary_access_chain", "Q2hhaW5DaGFpbkNoYWluQ2hhaW5DaGFpbkNoYWluQ2g=");
    f.add_payload_object(PayloadObject::new(0x4000_0000, vec![0x5a; payload_bytes]));
    f
}

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("oob-frames");
    group.measurement_time(Duration::from_secs(5));
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    for size in [64usize, 1024, 64 * 1024] {
        let frame = sample_frame(size);
        let encoded = frame.encode();
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &frame, |b, f| {
            b.iter(|| black_box(f.encode()))
        });

        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, bytes| {
            b.iter(|| {
                rt.block_on(async {
                    let mut reader = FrameReader::new(bytes.as_slice(), DEFAULT_MAX_FRAME_BYTES);
                    black_box(reader.read_next().await.unwrap())
                })
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_uri_matching,
    bench_dot_signatures,
    bench_frame_codec,
);

criterion_main!(benches);
