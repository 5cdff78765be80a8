use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use dirindex::{
    codec::{U64Codec, UnitCodec},
    comparator::natural,
    Cursor, OrderedTree, Table, TreeSerializer,
};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// The seed for our prng-generated benchmarks
const SEED: [u8; 32] = [
    0x7f, 0xc3, 0x59, 0x18, 0x45, 0x19, 0xc0, 0xaa, 0xd2, 0xec, 0x31, 0x26, 0xbb, 0x74, 0x2f, 0x8b,
    0x11, 0x7d, 0xc, 0xe4, 0x64, 0xbf, 0x72, 0x17, 0x46, 0x28, 0x46, 0x42, 0xb2, 0x4b, 0x72, 0x18,
];

const SIZES: [usize; 3] = [1_000, 10_000, 100_000];

fn shuffled_keys(length: usize) -> Vec<u64> {
    let mut rng = Xoshiro256StarStar::from_seed(SEED);
    let mut keys: Vec<u64> = (0..length as u64).collect();
    keys.shuffle(&mut rng);
    keys
}

fn tree_of(keys: &[u64]) -> OrderedTree<u64> {
    let mut tree = OrderedTree::new(natural());
    for &key in keys {
        tree.insert(key, ());
    }
    tree
}

fn tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree");
    for size in SIZES {
        let keys = shuffled_keys(size);
        group.bench_with_input(BenchmarkId::new("insert", size), &keys, |b, keys| {
            b.iter(|| tree_of(black_box(keys)))
        });
        group.bench_with_input(BenchmarkId::new("remove", size), &keys, |b, keys| {
            b.iter_batched(
                || tree_of(keys),
                |mut tree| {
                    for key in keys {
                        tree.remove(key);
                    }
                    tree
                },
                BatchSize::LargeInput,
            )
        });

        let tree = tree_of(&keys);
        let serializer = TreeSerializer::new(natural(), U64Codec, UnitCodec);
        let bytes = serializer.serialize(&tree).unwrap();
        group.bench_with_input(BenchmarkId::new("serialize", size), &tree, |b, tree| {
            b.iter(|| serializer.serialize(black_box(tree)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("deserialize", size), &bytes, |b, bytes| {
            b.iter(|| serializer.deserialize(black_box(bytes)).unwrap())
        });
    }
    group.finish();
}

/// Builds a duplicate-enabled table where a few keys hold most of the
/// values, like an `objectClass` index.
fn skewed_table(size: usize, limit: usize) -> Table<u32, u64> {
    let mut rng = Xoshiro256StarStar::from_seed(SEED);
    let mut table = Table::with_config(
        &dirindex::config::TableConfig::new("objectClass", true).with_duplicate_limit(limit),
        natural(),
        Some(natural()),
        std::sync::Arc::new(dirindex::storage::memory::MemoryStoreFactory::default()),
    )
    .unwrap();
    for id in 0..size as u64 {
        let key = rng.gen_range(0..64u32).min(rng.gen_range(0..64u32));
        table.put(key, id).unwrap();
    }
    table
}

fn table(c: &mut Criterion) {
    let mut group = c.benchmark_group("table");
    for size in SIZES {
        for limit in [64, usize::MAX] {
            let name = if limit == usize::MAX { "inline" } else { "redirect" };
            group.bench_function(BenchmarkId::new(format!("put/{name}"), size), |b| {
                b.iter(|| skewed_table(size, limit))
            });

            let table = skewed_table(size, limit);
            group.bench_function(BenchmarkId::new(format!("scan/{name}"), size), |b| {
                b.iter(|| {
                    let mut cursor = table.cursor();
                    let mut n = 0;
                    while cursor.next().unwrap() {
                        n += 1;
                    }
                    n
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, tree, table);
criterion_main!(benches);
