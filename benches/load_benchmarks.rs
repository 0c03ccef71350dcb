use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use geoload::{Config, Engine, Point, SpatialIndexManager};
use std::time::Duration;

fn scattered(i: usize) -> Point {
    Point::new(
        -74.0060 + (i % 100) as f64 * 0.001,
        40.7128 + (i / 100 % 100) as f64 * 0.001,
    )
}

fn benchmark_record_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_request");

    let engine = Engine::new().unwrap();

    // One hot location: the cascade settles at max level after the first split
    group.bench_function("single_location", |b| {
        let nyc = Point::new(-74.0060, 40.7128);
        b.iter(|| engine.record_request(black_box("hot"), black_box(&nyc)).unwrap())
    });

    group.bench_function("scattered_locations", |b| {
        let mut counter = 0;
        b.iter(|| {
            let location = scattered(counter);
            counter += 1;
            engine
                .record_request(black_box("spread"), black_box(&location))
                .unwrap()
        })
    });

    group.finish();
}

fn benchmark_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");

    for clients in [1_000, 10_000, 50_000] {
        let index = SpatialIndexManager::with_config(Config::default().with_thresholds(100, 40)).unwrap();
        for i in 0..clients {
            index.insert("svc-a", &scattered(i)).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("centroids", clients), &index, |b, index| {
            b.iter(|| index.centroids(black_box("svc-a")))
        });

        group.bench_with_input(
            BenchmarkId::new("weighted_centroids", clients),
            &index,
            |b, index| b.iter(|| index.weighted_centroids(black_box("svc-a"))),
        );
    }

    group.finish();
}

fn benchmark_merge_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_sweep");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("split_then_collapse", |b| {
        b.iter(|| {
            let index = SpatialIndexManager::with_config(Config::default().with_thresholds(20, 10)).unwrap();
            for i in 0..2_000 {
                index.insert("svc-a", &scattered(i)).unwrap();
            }
            for i in 0..2_000 {
                index.remove("svc-a", &scattered(i), 1).unwrap();
            }
            black_box(index.merge_sweep("svc-a"))
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_record_request,
    benchmark_queries,
    benchmark_merge_sweep
);

criterion_main!(benches);
