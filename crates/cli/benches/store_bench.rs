use blockdev::RamBlockDevice;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use store::Store;

const REGION: u32 = 128 * 1024;
const N_KEYS: usize = 500;
const VALUE_SIZE: usize = 64;

fn fresh_store() -> Store<RamBlockDevice> {
    let bd = RamBlockDevice::new(REGION, 1, 16, 4096);
    Store::open(bd, 0, REGION).unwrap()
}

fn populated_store() -> Store<RamBlockDevice> {
    let mut store = fresh_store();
    for i in 0..N_KEYS {
        store
            .write(&format!("key{i:04}"), &[i as u8; VALUE_SIZE])
            .unwrap();
    }
    store
}

fn write_benchmark(c: &mut Criterion) {
    c.bench_function("store_write_500_keys", |b| {
        b.iter_batched(
            fresh_store,
            |mut store| {
                for i in 0..N_KEYS {
                    store
                        .write(&format!("key{i:04}"), &[i as u8; VALUE_SIZE])
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn read_hit_benchmark(c: &mut Criterion) {
    c.bench_function("store_read_hit_500_keys", |b| {
        b.iter_batched(
            populated_store,
            |mut store| {
                let mut buf = [0u8; VALUE_SIZE];
                for i in 0..N_KEYS {
                    let n = store.read(&format!("key{i:04}"), &mut buf).unwrap();
                    assert_eq!(n as usize, VALUE_SIZE);
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn churn_with_gc_benchmark(c: &mut Criterion) {
    // rewriting one key through a full area forces garbage collections
    c.bench_function("store_churn_one_key_5000_updates", |b| {
        b.iter_batched(
            fresh_store,
            |mut store| {
                for i in 0..5000u32 {
                    store.write("churn", &i.to_le_bytes()).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    write_benchmark,
    read_hit_benchmark,
    churn_with_gc_benchmark
);
criterion_main!(benches);
