//! Performance benchmarks for the hot paths of a sweep

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::net::Ipv4Addr;
use tokio_util::codec::Decoder;
use wlscan::network::codec::LengthFrameCodec;
use wlscan::network::packet::{self, PacketBuilder};
use wlscan::network::varint;
use wlscan::{AddressTable, Endpoint};

fn bench_varint(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint");

    for value in [1i32, 300, 2_097_151, -1] {
        let mut encoded = BytesMut::new();
        varint::encode(value, &mut encoded);

        group.bench_with_input(BenchmarkId::new("decode", value), &encoded, |b, encoded| {
            b.iter(|| varint::decode(black_box(encoded)))
        });
    }

    group.finish();
}

fn bench_packets(c: &mut Criterion) {
    let mut group = c.benchmark_group("packets");

    group.bench_function("status_ping", |b| {
        b.iter(|| packet::status_ping(black_box(0), black_box("203.0.113.7"), black_box(25565)))
    });

    let json = format!(
        r#"{{"version":{{"name":"Paper 1.20.1","protocol":763}},"description":"{}"}}"#,
        "x".repeat(512)
    );
    let frame = PacketBuilder::new(0x00).string(&json).build();
    group.bench_function("decode_status_frame", |b| {
        b.iter(|| {
            let mut codec = LengthFrameCodec::new();
            let mut buf = BytesMut::from(&frame[..]);
            codec.decode(black_box(&mut buf))
        })
    });

    group.finish();
}

fn bench_rotation(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_table");

    for size in [1_000usize, 100_000] {
        let endpoints: Vec<Endpoint> = (0..size)
            .map(|i| Endpoint::new(Ipv4Addr::from(0x0a00_0000 + i as u32), 25565))
            .collect();
        let table = AddressTable::from_endpoints(&endpoints);

        group.bench_with_input(BenchmarkId::new("rotated_walk", size), &table, |b, table| {
            b.iter(|| table.rotated(black_box(table.len() / 2 * 6)).count())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_varint, bench_packets, bench_rotation);
criterion_main!(benches);
