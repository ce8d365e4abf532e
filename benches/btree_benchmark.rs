use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cowbtree::{Action, BTree, Natural};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;

const SIZE: u64 = 10_000;

fn shuffled() -> Vec<u64> {
    let mut keys: Vec<u64> = (0..SIZE).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(7));
    keys
}

fn filled(max_items: usize, keys: &[u64]) -> BTree<u64> {
    let mut tree = BTree::with_allocator(max_items, Natural, cowbtree::Global);
    for &key in keys {
        tree.set(key).unwrap();
    }
    tree
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("BTree Insert");
    let keys = shuffled();

    group.bench_function("std_btree_set_insert", |b| {
        b.iter(|| {
            let mut set = BTreeSet::new();
            for &key in &keys {
                set.insert(black_box(key));
            }
            set
        });
    });

    for max_items in [8, 32, 64, 256] {
        group.bench_with_input(BenchmarkId::new("cow_btree_set", max_items), &max_items, |b, &m| {
            b.iter(|| filled(m, black_box(&keys)));
        });
    }

    group.bench_function("cow_btree_load_sorted", |b| {
        b.iter(|| {
            let mut tree = BTree::new();
            for key in 0..SIZE {
                tree.load(black_box(key)).unwrap();
            }
            tree
        });
    });

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("BTree Lookup");
    let keys = shuffled();
    let set: BTreeSet<u64> = keys.iter().copied().collect();
    let tree = filled(64, &keys);

    group.bench_function("std_btree_set_get", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(set.get(key));
            }
        });
    });

    group.bench_function("cow_btree_get", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(tree.get(key));
            }
        });
    });

    group.bench_function("cow_btree_iter", |b| {
        b.iter(|| tree.iter().copied().sum::<u64>());
    });

    group.finish();
}

fn bench_copy_on_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("BTree Copy-on-write");
    let keys = shuffled();
    let tree = filled(64, &keys);

    group.bench_function("clone", |b| {
        b.iter(|| black_box(tree.clone()));
    });

    group.bench_function("clone_then_write_one", |b| {
        b.iter(|| {
            let mut copy = tree.clone();
            copy.set(black_box(SIZE + 1)).unwrap();
            copy
        });
    });

    group.bench_function("std_clone_then_write_one", |b| {
        let set: BTreeSet<u64> = keys.iter().copied().collect();
        b.iter(|| {
            let mut copy = set.clone();
            copy.insert(black_box(SIZE + 1));
            copy
        });
    });

    group.finish();
}

fn bench_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("BTree Delete");
    let keys = shuffled();
    let tree = filled(64, &keys);

    group.bench_function("delete_all", |b| {
        b.iter_batched(
            || tree.clone(),
            |mut copy| {
                for key in &keys {
                    copy.delete(key).unwrap();
                }
                copy
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("sweep_delete_half", |b| {
        b.iter_batched(
            || tree.clone(),
            |mut copy| {
                copy.ascend_mut(None, |key| if *key % 2 == 0 { Action::Delete } else { Action::None })
                    .unwrap();
                copy
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup, bench_copy_on_write, bench_delete);
criterion_main!(benches);
