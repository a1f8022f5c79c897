use breachmerge::common::records;
use breachmerge::extsort::ExternalSorter;
use breachmerge::shard::{ShardAddress, ShardKey};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn generate_combolist(lines: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(lines * 24);
    for i in 0..lines {
        let first = b"aZ9_mQx!"[i % 8];
        data.push(first);
        data.extend_from_slice(format!("user{}@mail.test:pw{}\n", i % (lines / 2 + 1), i).as_bytes());
    }
    data
}

fn bench_route_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_window");
    for size_mb in [1, 10] {
        let data = generate_combolist(size_mb * 1024 * 1024 / 24);
        let leaves: Vec<ShardAddress> = ShardKey::all()
            .map(|k| ShardAddress::new(vec![k]))
            .collect();
        group.bench_with_input(
            BenchmarkId::new("all_leaves", format!("{}MB", size_mb)),
            &data,
            |b, data| {
                b.iter(|| {
                    let mut hits = 0usize;
                    for leaf in &leaves {
                        hits += records(black_box(data))
                            .filter(|r| leaf.matches(r))
                            .count();
                    }
                    hits
                })
            },
        );
    }
    group.finish();
}

fn bench_external_sort(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("leaf");
    std::fs::write(&src, generate_combolist(200_000)).unwrap();
    let out = dir.path().join("leaf.tmp");

    let mut group = c.benchmark_group("external_sort");
    group.sample_size(10);
    for budget_kb in [256, 4096] {
        group.bench_function(BenchmarkId::new("budget", format!("{}KB", budget_kb)), |b| {
            b.iter(|| {
                ExternalSorter::new(&src, budget_kb * 1024)
                    .sort(&out)
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_route_window, bench_external_sort);
criterion_main!(benches);
