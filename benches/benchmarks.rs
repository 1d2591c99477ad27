//! Performance benchmarks for the wsframe codec.
//!
//! Run with: `cargo bench`

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use wsframe::protocol::{
    Decoder, Encoder, Frame, OpCode, RequestHead, apply_mask, apply_mask_fast, compute_accept_key,
    negotiate,
};
use wsframe::{Config, Connection};

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

fn client_frame(opcode: OpCode, payload_size: usize) -> BytesMut {
    let mut buf = BytesMut::new();
    Frame::new(true, opcode, vec![b'a'; payload_size]).write(&mut buf, Some(MASK));
    buf
}

// =============================================================================
// Decoding
// =============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [10usize, 1024, 65536] {
        let wire = client_frame(OpCode::Binary, size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("masked_frame", size), &wire, |b, wire| {
            let mut decoder = Decoder::default();
            b.iter(|| {
                let mut buf = wire.clone();
                decoder.decode(black_box(&mut buf))
            })
        });
    }

    group.finish();
}

// =============================================================================
// Encoding
// =============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [10usize, 1024, 65536] {
        let payload = vec![0xAB; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("single", size), &payload, |b, payload| {
            let encoder = Encoder::default();
            let mut out = BytesMut::with_capacity(size + 14);
            b.iter(|| {
                out.clear();
                encoder.encode(OpCode::Binary, black_box(payload), &mut out)
            })
        });

        group.bench_with_input(
            BenchmarkId::new("fragmented_4k", size),
            &payload,
            |b, payload| {
                let encoder = Encoder::new(Some(4096));
                let mut out = BytesMut::with_capacity(size * 2 + 14);
                b.iter(|| {
                    out.clear();
                    encoder.encode(OpCode::Binary, black_box(payload), &mut out)
                })
            },
        );
    }

    group.finish();
}

// =============================================================================
// Masking
// =============================================================================

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");

    for size in [64usize, 1024, 65536, 1024 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(BenchmarkId::new("apply_mask", size), |b| {
            let mut data = vec![0xAB; size];
            b.iter(|| apply_mask(black_box(&mut data), MASK))
        });

        group.bench_function(BenchmarkId::new("apply_mask_fast", size), |b| {
            let mut data = vec![0xAB; size];
            b.iter(|| apply_mask_fast(black_box(&mut data), MASK))
        });
    }

    group.finish();
}

// =============================================================================
// Connection
// =============================================================================

fn bench_connection(c: &mut Criterion) {
    let mut group = c.benchmark_group("connection");

    // 100 small text messages in one read
    let mut burst = BytesMut::new();
    for _ in 0..100 {
        burst.extend_from_slice(&client_frame(OpCode::Text, 32));
    }
    group.throughput(Throughput::Elements(100));
    group.bench_function("decode_100_text", |b| {
        b.iter(|| {
            let mut conn = Connection::open(Config::default());
            conn.decode(black_box(&burst)).count()
        })
    });

    // 16 fragments of 4KB
    let mut fragmented = BytesMut::new();
    for i in 0..16 {
        let opcode = if i == 0 { OpCode::Binary } else { OpCode::Continuation };
        Frame::new(i == 15, opcode, vec![0xCD; 4096]).write(&mut fragmented, Some(MASK));
    }
    group.throughput(Throughput::Bytes(16 * 4096));
    group.bench_function("reassemble_16x4kb", |b| {
        b.iter(|| {
            let mut conn = Connection::open(Config::default());
            conn.decode(black_box(&fragmented)).count()
        })
    });

    group.finish();
}

// =============================================================================
// Handshake
// =============================================================================

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");

    let key = "dGhlIHNhbXBsZSBub25jZQ==";
    group.bench_function("compute_accept_key", |b| {
        b.iter(|| compute_accept_key(black_box(key)))
    });

    let request = b"GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Protocol: chat, superchat\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    group.bench_function("parse_request_head", |b| {
        b.iter(|| RequestHead::parse(black_box(request), 8192))
    });

    group.bench_function("parse_and_negotiate", |b| {
        b.iter(|| {
            let (head, _) = RequestHead::parse(black_box(request), 8192)
                .unwrap()
                .unwrap();
            negotiate(&head).map(|response| response.to_bytes())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_decode,
    bench_encode,
    bench_masking,
    bench_connection,
    bench_handshake,
);
criterion_main!(benches);
