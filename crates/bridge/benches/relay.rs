//! Performance benchmarks for the relay hot paths.
//!
//! These benchmarks measure:
//! - Ring buffer put/get cycles at the default buffer sizes
//! - Packet queue handoff between threads
//! - Packet checksum

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bridge::packet::{checksum, Packet, PacketQueue};
use bridge::ring::{RingBuffer, DEFAULT_INBOUND_SIZE, DEFAULT_OUTBOUND_SIZE};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

/// Benchmark draining a large payload through a small ring buffer.
fn bench_ring_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");
    let data = vec![0xA5u8; 4096];
    group.throughput(Throughput::Bytes(data.len() as u64));

    for (name, size) in [
        ("inbound_32B", DEFAULT_INBOUND_SIZE),
        ("outbound_64B", DEFAULT_OUTBOUND_SIZE),
        ("large_1KB", 1024),
    ] {
        let mut ring = RingBuffer::new(size);
        let mut out = vec![0u8; size];
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut offset = 0;
                while offset < data.len() {
                    offset += ring.put(black_box(&data[offset..]));
                    ring.get(&mut out);
                }
                offset
            });
        });
    }

    group.finish();
}

/// Benchmark packet handoff through the bounded queue.
fn bench_packet_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_queue");
    let timeout = Duration::from_secs(1);

    group.bench_function("same_thread", |b| {
        let queue = PacketQueue::new();
        b.iter(|| {
            let packet = Packet::from_slice(black_box(b"ls -la\n")).unwrap();
            queue.enqueue(packet, timeout).unwrap();
            queue.dequeue(timeout)
        });
    });

    const BATCH: usize = 256;
    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("cross_thread_256", |b| {
        b.iter(|| {
            let queue = Arc::new(PacketQueue::new());
            let producer = {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..BATCH {
                        let packet = Packet::from_slice(&[i as u8; 16]).unwrap();
                        queue.enqueue(packet, timeout).unwrap();
                    }
                })
            };
            let mut received = 0;
            while received < BATCH {
                if queue.dequeue(timeout).is_some() {
                    received += 1;
                }
            }
            producer.join().unwrap();
            received
        });
    });

    group.finish();
}

/// Benchmark the packet checksum.
fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");

    for size in [64usize, 4096, 65536] {
        let data = vec![0x5Au8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}B"), |b| b.iter(|| checksum(black_box(&data))));
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ring_buffer,
    bench_packet_queue,
    bench_checksum
);

criterion_main!(benches);
