use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use simstep::{EngineConfig, LinearScan, Method, Metric, Operation, Point, RunConfig, Simulation};

const K: usize = 10;
const SEED: u64 = 0;
const N: u32 = 500;

fn benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("knn");
    group.sample_size(10);

    for method in Method::ALL {
        group.bench_function(format!("{method:?}"), |b| b.iter(|| bench_method(method)));
    }
    group.bench_function("Linear", |b| b.iter(bench_linear));
}

criterion_group!(benches, benchmark);
criterion_main!(benches);

fn bench_method(method: Method) {
    let config = RunConfig::new(method, Operation::Knn { k: K }, dataset(), query())
        .with_engine(EngineConfig::new().with_capacity(8).with_pivots(16));
    let mut simulation = Simulation::new(config).unwrap();
    simulation.run_to_end();
}

fn bench_linear() {
    let data = dataset();
    let scan = LinearScan::new(&data, Metric::L2);
    scan.knn(&query(), K).unwrap();
}

fn dataset() -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(SEED);
    (0..N).map(|id| Point::new(id, vec![rng.gen(), rng.gen()])).collect()
}

fn query() -> Point {
    Point::new(N, vec![0.5, 0.5])
}
