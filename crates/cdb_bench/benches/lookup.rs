use cdb_core::{build, ConstantDatabase};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N: usize = 100_000;

fn pairs() -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut rng = StdRng::seed_from_u64(1);
    (0..N)
        .map(|i| {
            let val: Vec<u8> = (0..rng.random_range(8..128)).map(|_| rng.random()).collect();
            (format!("user:{i:08}").into_bytes(), val)
        })
        .collect()
}

fn bench_cdb(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.cdb");
    let data = pairs();

    c.bench_function("build_100k", |b| {
        b.iter(|| build(&path, data.iter().map(|(k, v)| (k, v))).unwrap())
    });

    build(&path, data.iter().map(|(k, v)| (k, v))).unwrap();
    let db = ConstantDatabase::open(&path).unwrap();
    let map = ConstantDatabase::open_mmap(&path).unwrap();

    let mut i = 0usize;
    c.bench_function("get_hit", |b| {
        b.iter(|| {
            i = (i + 7919) % N;
            black_box(db.get(&data[i].0).unwrap())
        })
    });
    c.bench_function("get_hit_mmap", |b| {
        b.iter(|| {
            i = (i + 7919) % N;
            black_box(map.get(&data[i].0).unwrap())
        })
    });
    c.bench_function("get_miss", |b| {
        b.iter(|| {
            i = (i + 7919) % N;
            black_box(db.get(format!("nobody:{i:08}").as_bytes()).unwrap())
        })
    });
}

criterion_group!(benches, bench_cdb);
criterion_main!(benches);
