//! Stream framing benchmarks
//!
//! Measures UTF-8 decoding, line framing and batch parsing over a
//! synthetic image search response cut into chunks of various sizes.
//!
//! Run with: `cargo bench --bench framing_bench`

use bytes::Bytes;
use case_sim_client::transport::{
    parse_batch_line, ImageBatchStream, LineFramer, TransportError, Utf8Decoder,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::StreamExt;

fn response_body(batches: u32) -> String {
    let mut body = String::new();
    for n in 1..=batches {
        body.push_str(&format!(
            "data: {{\"batch_number\":{n},\"query_used\":\"chest x-ray consolidation\",\
             \"images\":[{{\"url\":\"https://img.example/{n}.png\",\"description\":\"Radiographie n°{n} 🩺\"}}],\
             \"batch_size\":1,\"is_final\":{}}}\n",
            n == batches
        ));
    }
    body
}

fn chunks(body: &str, size: usize) -> Vec<Bytes> {
    body.as_bytes()
        .chunks(size)
        .map(Bytes::copy_from_slice)
        .collect()
}

fn bench_decode_and_frame(c: &mut Criterion) {
    let body = response_body(200);
    let mut group = c.benchmark_group("decode_and_frame");
    group.throughput(Throughput::Bytes(body.len() as u64));

    for size in [7usize, 64, 1024, 16 * 1024] {
        let input = chunks(&body, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                let mut decoder = Utf8Decoder::new();
                let mut framer = LineFramer::new();
                let mut lines = 0usize;
                for chunk in input {
                    lines += framer.push(&decoder.decode(chunk)).len();
                }
                black_box(lines);
            });
        });
    }

    group.finish();
}

fn bench_parse_line(c: &mut Criterion) {
    let body = response_body(1);
    let line = body.trim_end();

    c.bench_function("parse_batch_line", |b| {
        b.iter(|| black_box(parse_batch_line(black_box(line))));
    });
}

fn bench_batch_stream(c: &mut Criterion) {
    let body = response_body(200);
    let mut group = c.benchmark_group("image_batch_stream");
    group.throughput(Throughput::Bytes(body.len() as u64));

    for size in [64usize, 4096] {
        let input = chunks(&body, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                let items: Vec<Result<Bytes, TransportError>> =
                    input.iter().cloned().map(Ok).collect();
                let stream = ImageBatchStream::new(Box::pin(futures::stream::iter(items)));
                let count = futures::executor::block_on(stream.count());
                black_box(count);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_decode_and_frame,
    bench_parse_line,
    bench_batch_stream
);
criterion_main!(benches);
