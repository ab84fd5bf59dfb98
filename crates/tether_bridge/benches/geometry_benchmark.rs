//! # Geometry Batch Benchmark
//!
//! Measures the per-tick cost of the geometry path:
//! 1. Encoding a batch of N records into a binary frame
//! 2. Decoding the same frame on the render side
//! 3. Merging repeated updates in the scheduler and composing a flush
//!
//! Target: 1000 moving objects well under 1ms per tick end to end.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tether_bridge::protocol::{decode_frame, encode_geometry_frame, ByteWriter, Decoded};
use tether_bridge::{
    DeferredScheduler, Frame, GeometryRecord, GeometryUpdate, ObjectHandle, Quaternion, Vec3,
};

fn moving_records(count: usize) -> Vec<GeometryRecord> {
    (0..count)
        .map(|i| {
            let f = i as f32;
            let update = GeometryUpdate::new()
                .with_rotation(Quaternion::new(0.0, (f * 0.01).sin(), 0.0, (f * 0.01).cos()))
                .with_translation(Vec3::new(f, 0.5, -f));
            GeometryRecord::new(ObjectHandle(100 + i as u32), update)
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometry_encode");

    for count in [10, 100, 1_000, 10_000] {
        let records = moving_records(count);
        let mut writer = ByteWriter::new();
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("records", count), &records, |b, records| {
            b.iter(|| {
                let written = encode_geometry_frame(&mut writer, 1_000, black_box(records));
                black_box(written);
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometry_decode");

    for count in [10, 100, 1_000, 10_000] {
        let mut writer = ByteWriter::new();
        encode_geometry_frame(&mut writer, 1_000, &moving_records(count));
        let frame = Frame::Binary(writer.into_inner());
        group.throughput(Throughput::Bytes(frame.len() as u64));

        group.bench_with_input(BenchmarkId::new("records", count), &frame, |b, frame| {
            b.iter(|| match decode_frame(black_box(frame)) {
                Ok(Decoded::Geometry { records, .. }) => black_box(records.len()),
                _ => 0,
            });
        });
    }

    group.finish();
}

fn bench_scheduler_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_merge_compose");

    // Each object is updated several times between flushes; only the merged
    // record goes out.
    for updates_per_flush in [1, 4, 16] {
        let records = moving_records(1_000);
        group.throughput(Throughput::Elements((records.len() * updates_per_flush) as u64));

        group.bench_function(format!("1000_objects_{updates_per_flush}x"), |b| {
            let mut scheduler = DeferredScheduler::default();
            b.iter(|| {
                for _ in 0..updates_per_flush {
                    for record in &records {
                        scheduler.enqueue_geometry(record.handle, black_box(&record.update));
                    }
                }
                black_box(scheduler.compose_geometry(1_000, Vec::<GeometryRecord>::new()));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_scheduler_merge);
criterion_main!(benches);
