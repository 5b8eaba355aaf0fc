use simstep::{
    EngineConfig, MTree, Method, Metric, Operation, Point, RunConfig, Simulation, StepKind,
};

fn main() {
    // The six-point teaching example
    let dataset = vec![
        Point::labeled(1, "A", vec![30.0, 40.0]),
        Point::labeled(2, "B", vec![60.0, 75.0]),
        Point::labeled(3, "C", vec![75.0, 35.0]),
        Point::labeled(4, "D", vec![45.0, 20.0]),
        Point::labeled(5, "E", vec![10.0, 90.0]),
        Point::labeled(6, "F", vec![95.0, 85.0]),
    ];
    let query = Point::labeled(0, "Q", vec![50.0, 50.0]);
    let inserted = Point::labeled(7, "G", vec![55.0, 45.0]);
    let engine = EngineConfig::new().with_capacity(3);

    let operations = [
        Operation::Range { radius: 35.0 },
        Operation::Knn { k: 3 },
        Operation::Insert,
    ];
    for method in Method::ALL {
        for operation in operations {
            let point = match operation {
                Operation::Insert => inserted.clone(),
                _ => query.clone(),
            };
            let config = RunConfig::new(method, operation, dataset.clone(), point)
                .with_engine(engine.clone());
            println!("== {method:?} {operation:?}");
            let mut simulation = match Simulation::new(config) {
                Ok(simulation) => simulation,
                Err(err) => {
                    println!("rejected: {err}");
                    continue;
                }
            };
            while let Some(step) = simulation.next_step() {
                let marker = match step.kind {
                    StepKind::Progress => ' ',
                    StepKind::Done => '*',
                    StepKind::Diagnostic => '!',
                };
                println!("{marker} [{}] {}", step.line, step.description);
            }
            let stats = simulation.stats();
            println!(
                "   {} steps, {} of {} distances, {:.0}% saved",
                stats.steps,
                stats.distance_calls,
                stats.brute_force,
                stats.savings() * 100.0
            );
        }
    }

    let mut tree = match MTree::from_config(&engine, Metric::L2) {
        Ok(tree) => tree,
        Err(err) => {
            println!("rejected: {err}");
            return;
        }
    };
    for point in dataset.into_iter().chain(std::iter::once(inserted)) {
        if let Err(err) = tree.insert(point) {
            println!("insert failed: {err}");
            return;
        }
    }
    println!("== M-Tree after inserting G, height {}", tree.height());
    for row in tree.rows() {
        println!("{row}");
    }
}
