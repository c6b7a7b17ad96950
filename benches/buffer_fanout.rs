//! Benchmarks for the producer → buffer → reader path
//!
//! Measures what the producer pays per frame:
//! - Publishing with 0..1000 idle subscriptions attached
//! - Reader-side peek and change checks
//! - A full producer cycle, with and without real JPEG encoding
//!
//! Run: `cargo bench --features benchmark --bench buffer_fanout`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use framecast::buffer::FrameBuffer;
use framecast::encoder::{FrameEncoder, JpegFrameEncoder};
use framecast::producer::{FrameProducer, ProducerConfig};
use framecast::source::FrameSource;
use framecast::sources::TestPatternSource;
use framecast::test_utils::{PassthroughEncoder, ScriptedFactory, frame};
use framecast::types::Frame;
use std::hint::black_box;
use std::sync::Arc;

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");
    group.throughput(Throughput::Elements(1));

    for readers in [0usize, 10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(readers), &readers, |b, &readers| {
            let buffer = FrameBuffer::default();
            let _subscriptions: Vec<_> = (0..readers).map(|_| buffer.subscribe()).collect();
            let payload = bytes::Bytes::from(vec![0u8; 32 * 1024]);
            let mut id = 0;

            b.iter(|| {
                id += 1;
                black_box(buffer.publish(Frame::new(id, payload.clone())))
            })
        });
    }

    group.finish();
}

fn bench_reader_side(c: &mut Criterion) {
    let buffer = FrameBuffer::default();
    for id in 1..=10 {
        buffer.publish(frame(id));
    }

    c.bench_function("peek", |b| b.iter(|| black_box(buffer.peek())));
    c.bench_function("has_newer_than", |b| b.iter(|| black_box(buffer.has_newer_than(Some(9)))));
}

fn bench_producer_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("producer_cycle");

    group.bench_function("passthrough", |b| {
        let buffer = Arc::new(FrameBuffer::default());
        let mut producer = FrameProducer::new(
            ScriptedFactory::healthy(),
            PassthroughEncoder,
            buffer,
            ProducerConfig::default(),
        );
        b.iter(|| black_box(producer.run_cycle()))
    });

    let mut source = TestPatternSource::new(640, 480);
    let raw = source.next_frame().ok().flatten().expect("test pattern produced no frame");
    let encoder = JpegFrameEncoder::default();
    group.throughput(Throughput::Bytes(raw.pixels.len() as u64));
    group.bench_function("jpeg_640x480", |b| b.iter(|| black_box(encoder.encode(black_box(&raw)))));

    group.finish();
}

criterion_group!(benches, bench_publish, bench_reader_side, bench_producer_cycle);
criterion_main!(benches);
