use rand::Rng;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rtarchive::dedup::NoDuplicate;
use rtarchive::encode::VmuRecord;
use rtarchive::packet::{checksum, Decoder};
use rtarchive::Family;
use std::io::{sink, Write};

fn bench_checksum(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let mut buf = vec![0u8; 64 * 1024];
    rng.fill(&mut buf[..]);

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(buf.len() as u64));
    group.bench_function("sum", |b| {
        b.iter(|| checksum::sum(&buf));
    });
    group.finish();
}

fn records(n: u32) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..n)
        .flat_map(|seq| {
            let mut data = vec![0u8; 1024];
            rng.fill(&mut data[..]);
            VmuRecord::builder()
                .channel(1)
                .sequence(seq)
                .data(data)
                .build()
                .encode()
        })
        .collect()
}

fn bench_decode(c: &mut Criterion) {
    let dat = records(1000);
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(dat.len() as u64));
    group.bench_function("vmu", |b| {
        b.iter(|| {
            let count = Decoder::new(&dat[..], Family::Vmu)
                .packets(true)
                .filter_map(Result::ok)
                .count();
            assert_eq!(count, 1000);
        });
    });
    group.finish();
}

fn bench_dedup(c: &mut Criterion) {
    let dat = records(2);
    let (a, b) = dat.split_at(dat.len() / 2);
    let mut group = c.benchmark_group("dedup");
    group.throughput(Throughput::Bytes(dat.len() as u64 * 500));
    group.bench_function("alternating", |bench| {
        bench.iter(|| {
            let mut w = NoDuplicate::new(sink());
            for _ in 0..500 {
                w.write_all(a).unwrap();
                w.write_all(b).unwrap();
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_checksum, bench_decode, bench_dedup);
criterion_main!(benches);
