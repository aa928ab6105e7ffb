//! Criterion benchmarks for the rpclink JSON codec and candidate bookkeeping.
//!
//! Discovery responses can arrive in bursts when many servers answer the same
//! broadcast, so decoding and de-duplication sit on the hot path of a cycle.
//!
//! Run with:
//! ```bash
//! cargo bench --package rpclink-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rpclink_core::{
    decode_datagram, encode_message, DedupRegistry, DiscoveryRequest, Remote, WireMessage,
};

fn bench_decode_response(c: &mut Criterion) {
    let bytes = br#"{"name":"db","port":7000,"encrypted":"0f1e2d","hash":"9a8b7c"}"#;
    c.bench_function("decode_discovery_response", |b| {
        b.iter(|| decode_datagram(black_box(bytes)))
    });
}

fn bench_encode_request(c: &mut Criterion) {
    let msg = WireMessage::DiscoveryRequest(DiscoveryRequest::new("db"));
    c.bench_function("encode_discovery_request", |b| {
        b.iter(|| encode_message(black_box(&msg)))
    });
}

fn bench_dedup_burst(c: &mut Criterion) {
    let remotes: Vec<Remote> = (0..256u16)
        .map(|i| Remote::new([10, 0, (i >> 8) as u8, i as u8].into(), 7000))
        .collect();
    c.bench_function("dedup_256_responses_twice", |b| {
        b.iter(|| {
            let mut registry = DedupRegistry::new();
            for remote in remotes.iter().chain(remotes.iter()) {
                black_box(registry.insert(remote.key()));
            }
        })
    });
}

criterion_group!(benches, bench_decode_response, bench_encode_request, bench_dedup_burst);
criterion_main!(benches);
