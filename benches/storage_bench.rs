//! Benchmarks for StrataDB storage operations

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;

use stratadb::{MapConfig, StrataMap};

fn prepared_map(entries: u64) -> (TempDir, StrataMap<u64>) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bench.strata");
    let mut map: StrataMap<u64> = StrataMap::create(&path, MapConfig::default()).unwrap();
    map.begin_transaction();
    for i in 0..entries {
        map.set(&format!("key{i}"), &i).unwrap();
    }
    map.end_transaction().unwrap();
    (temp, map)
}

fn write_benchmarks(c: &mut Criterion) {
    c.bench_function("map_set_1000_in_transaction", |b| {
        b.iter_batched(
            || prepared_map(0),
            |(_temp, mut map)| {
                map.begin_transaction();
                for i in 0..1000u64 {
                    map.set(&format!("key{i}"), &i).unwrap();
                }
                map.end_transaction().unwrap();
            },
            BatchSize::PerIteration,
        );
    });
}

fn read_benchmarks(c: &mut Criterion) {
    let (_temp, mut map) = prepared_map(10_000);

    c.bench_function("map_get_cached", |b| {
        b.iter(|| map.get("key5000").unwrap());
    });

    let (_temp_cold, mut cold) = prepared_map(10_000);
    let cold_path = cold.path().to_path_buf();
    drop(cold);
    let mut uncached: StrataMap<u64> = StrataMap::open_with_cache(&cold_path, 0).unwrap();
    let mut i = 0u64;
    c.bench_function("map_get_uncached", |b| {
        b.iter(|| {
            i = (i + 7) % 10_000;
            uncached.get(&format!("key{i}")).unwrap()
        });
    });
}

criterion_group!(benches, write_benchmarks, read_benchmarks);
criterion_main!(benches);
