use simstep::{
    EngineConfig, Method, Metric, Operation, Point, PointId, RunConfig, Simulation, Step,
    StepKind,
};

fn dataset() -> Vec<Point> {
    vec![
        Point::labeled(1, "A", vec![30.0, 40.0]),
        Point::labeled(2, "B", vec![60.0, 75.0]),
        Point::labeled(3, "C", vec![75.0, 35.0]),
        Point::labeled(4, "D", vec![45.0, 20.0]),
        Point::labeled(5, "E", vec![10.0, 90.0]),
        Point::labeled(6, "F", vec![95.0, 85.0]),
    ]
}

fn query() -> Point {
    Point::labeled(0, "Q", vec![50.0, 50.0])
}

fn run(method: Method, operation: Operation) -> Vec<Step> {
    let config = RunConfig::new(method, operation, dataset(), query()).with_metric(Metric::L2);
    let (steps, _) = Simulation::run(config).unwrap();
    steps
}

fn ids(set: &std::collections::BTreeSet<PointId>) -> Vec<PointId> {
    set.iter().copied().collect()
}

#[test]
fn range_35_keeps_four_points() {
    for method in Method::ALL {
        let steps = run(method, Operation::Range { radius: 35.0 });
        let last = steps.last().unwrap();
        assert_eq!(last.kind, StepKind::Done, "{method:?}");
        assert_eq!(last.result, vec![1, 2, 3, 4], "{method:?}");
        assert_eq!(ids(&last.eliminated), vec![5, 6], "{method:?}");
        assert!(last.candidates.is_empty(), "{method:?}");
        assert_eq!(last.threshold, Some(35.0), "{method:?}");
    }
}

#[test]
fn three_nearest() {
    for method in Method::ALL {
        let steps = run(method, Operation::Knn { k: 3 });
        let last = steps.last().unwrap();
        assert_eq!(last.result, vec![1, 2, 3], "{method:?}");
        // d(Q, C) = sqrt(625 + 225)
        let threshold = last.threshold.unwrap();
        assert!((threshold - 850_f64.sqrt()).abs() < 1e-9, "{method:?}");
    }
}

#[test]
fn steps_start_and_end_on_listing_bounds() {
    for method in Method::ALL {
        for operation in [Operation::Range { radius: 35.0 }, Operation::Knn { k: 2 }, Operation::Insert] {
            let steps = run(method, operation);
            assert_eq!(steps[0].line, 0);
            assert_eq!(steps[0].distance_calls, 0);
            for pair in steps.windows(2) {
                assert!(pair[0].distance_calls <= pair[1].distance_calls);
            }
        }
    }
}

#[test]
fn laesa_spreads_its_pivots() {
    let config = RunConfig::new(Method::Laesa, Operation::Range { radius: 35.0 }, dataset(), query());
    let (steps, stats) = Simulation::run(config).unwrap();
    // A first, then F as the farthest point from A
    assert_eq!(steps[1].focus, Some(1));
    assert_eq!(steps[2].focus, Some(6));
    assert!(stats.distance_calls <= 6);
    assert_eq!(stats.brute_force, 6);
}

#[test]
fn insert_reports_the_new_point() {
    let point = Point::labeled(7, "G", vec![55.0, 45.0]);
    for method in Method::ALL {
        let config = RunConfig::new(method, Operation::Insert, dataset(), point.clone())
            .with_engine(EngineConfig::new().with_capacity(3));
        let (steps, stats) = Simulation::run(config).unwrap();
        let last = steps.last().unwrap();
        assert_eq!(last.result, vec![7], "{method:?}");
        assert_eq!(last.focus, Some(7), "{method:?}");
        match method {
            Method::Aesa => assert_eq!(stats.distance_calls, 6),
            Method::Laesa => assert_eq!(stats.distance_calls, 2),
            Method::MTree => assert!(stats.distance_calls > 0),
        }
    }
}

#[test]
fn steps_serialize() {
    let steps = run(Method::Aesa, Operation::Knn { k: 2 });
    let json = serde_json::to_value(&steps[1]).unwrap();
    assert_eq!(json["kind"], "Progress");
    assert_eq!(json["distances"][0]["from"], 0);
}
