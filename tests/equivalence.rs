use std::collections::BTreeSet;

use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use simstep::{
    distance::distance, EngineConfig, LinearScan, Method, Metric, Operation, Point, PointId,
    RunConfig, Simulation, Step,
};

const QUERY_ID: PointId = 10_000;

fn random_dataset(rng: &mut StdRng, n: u32, dim: usize) -> Vec<Point> {
    (0..n)
        .map(|id| Point::new(id, (0..dim).map(|_| rng.gen_range(-50.0..50.0)).collect()))
        .collect()
}

fn final_result(config: RunConfig) -> (Vec<Step>, Vec<PointId>) {
    let (steps, _) = Simulation::run(config).unwrap();
    let result = steps.last().map(|s| s.result.clone()).unwrap_or_default();
    (steps, result)
}

/// Every point that left the candidate set without an exact distance and
/// without having been part of the answer was dropped by a bound above the
/// threshold.
fn assert_sound_eliminations(steps: &[Step]) {
    for pair in steps.windows(2) {
        let (before, step) = (&pair[0], &pair[1]);
        let measured = step.distances.iter().map(|d| d.to).collect::<BTreeSet<_>>();
        let dropped = step
            .eliminated
            .difference(&before.eliminated)
            .filter(|id| !measured.contains(id) && !before.result.contains(id))
            .count();
        if dropped > 0 {
            let bound = step.lower_bound.expect("bound elimination without a bound");
            let threshold = step.threshold.expect("bound elimination without a threshold");
            assert!(bound > threshold, "{}", step.description);
        }
    }
}

#[test]
fn all_methods_match_the_linear_scan() {
    let mut rng = StdRng::seed_from_u64(0);
    for round in 0..12 {
        let dim = 1 + round % 3;
        let n = rng.gen_range(5..60);
        let dataset = random_dataset(&mut rng, n, dim);
        let query = Point::new(QUERY_ID, (0..dim).map(|_| rng.gen_range(-50.0..50.0)).collect());
        let metric = Metric::ALL[round % Metric::ALL.len()];
        let engine = EngineConfig::new()
            .with_capacity(rng.gen_range(2..6))
            .with_max_height(32)
            .with_pivots(rng.gen_range(1..4));
        let scan = LinearScan::new(&dataset, metric);

        let k = rng.gen_range(1..=dataset.len());
        let radius = rng.gen_range(0.0..40.0);
        let expected_knn = scan.knn(&query, k).unwrap();
        let expected_range = scan.range(&query, radius).unwrap();

        for method in Method::ALL {
            let base = RunConfig::new(method, Operation::Knn { k }, dataset.clone(), query.clone())
                .with_metric(metric)
                .with_engine(engine.clone());
            let (steps, result) = final_result(base.clone());
            assert_eq!(result, expected_knn, "{method:?} knn round {round}");
            assert_sound_eliminations(&steps);

            let config = RunConfig {
                operation: Operation::Range { radius },
                ..base
            };
            let (steps, result) = final_result(config);
            assert_eq!(result, expected_range, "{method:?} range round {round}");
            assert_sound_eliminations(&steps);
        }
    }
}

#[test]
fn indexes_save_distance_computations() {
    let mut rng = StdRng::seed_from_u64(7);
    let dataset = random_dataset(&mut rng, 200, 2);
    let query = Point::new(QUERY_ID, vec![0.0, 0.0]);
    for method in [Method::Aesa, Method::Laesa] {
        let config = RunConfig::new(method, Operation::Range { radius: 5.0 }, dataset.clone(), query.clone())
            .with_engine(EngineConfig::new().with_pivots(8));
        let (_, stats) = Simulation::run(config).unwrap();
        assert!(stats.distance_calls < stats.brute_force, "{method:?}");
        assert!(stats.eliminated_by_bound > 0, "{method:?}");
        assert!(stats.savings() > 0.0, "{method:?}");
    }
}

fn points() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-100.0..100.0_f64, -100.0..100.0_f64), 1..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn knn_answers_are_the_k_closest(
        coords in points(),
        (qx, qy) in (-100.0..100.0_f64, -100.0..100.0_f64),
        k_seed in 0..64_usize,
        method in prop::sample::select(Method::ALL.to_vec()),
    ) {
        let dataset = coords
            .iter()
            .zip(0..)
            .map(|(&(x, y), id)| Point::new(id, vec![x, y]))
            .collect::<Vec<_>>();
        let query = Point::new(QUERY_ID, vec![qx, qy]);
        let k = 1 + k_seed % dataset.len();
        let config = RunConfig::new(method, Operation::Knn { k }, dataset.clone(), query.clone())
            .with_engine(EngineConfig::new().with_pivots((dataset.len() - 1).clamp(1, 2)));
        let (steps, result) = final_result(config);

        prop_assert_eq!(result.len(), k);
        let farthest = result
            .iter()
            .map(|id| distance(&query, &dataset[*id as usize], Metric::L2).unwrap())
            .fold(0.0_f64, f64::max);
        for point in dataset.iter().filter(|p| !result.contains(&p.id)) {
            prop_assert!(distance(&query, point, Metric::L2).unwrap() >= farthest);
        }
        assert_sound_eliminations(&steps);
    }

    #[test]
    fn range_answers_are_exact(
        coords in points(),
        (qx, qy) in (-100.0..100.0_f64, -100.0..100.0_f64),
        radius in 0.0..80.0_f64,
    ) {
        let dataset = coords
            .iter()
            .zip(0..)
            .map(|(&(x, y), id)| Point::new(id, vec![x, y]))
            .collect::<Vec<_>>();
        let query = Point::new(QUERY_ID, vec![qx, qy]);
        let expected = LinearScan::new(&dataset, Metric::L2).range(&query, radius).unwrap();
        for method in Method::ALL {
            let config = RunConfig::new(method, Operation::Range { radius }, dataset.clone(), query.clone())
                .with_engine(
                    EngineConfig::new()
                        .with_capacity(3)
                        .with_max_height(12)
                        .with_pivots((dataset.len() - 1).clamp(1, 3)),
                );
            let (_, result) = final_result(config);
            prop_assert_eq!(&result, &expected);
        }
    }
}
