use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use simstep::{
    EngineConfig, InvariantViolation, Method, Operation, Player, PlayerState, Point, RunConfig,
    SimError, Simulation, StepKind,
};

fn config(method: Method, operation: Operation) -> RunConfig {
    let mut rng = StdRng::seed_from_u64(3);
    let dataset = (0..20)
        .map(|id| Point::new(id, vec![rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)]))
        .collect();
    RunConfig::new(method, operation, dataset, Point::new(99, vec![5.0, 5.0]))
        .with_engine(EngineConfig::new().with_capacity(3))
}

fn operations() -> [Operation; 3] {
    [
        Operation::Knn { k: 4 },
        Operation::Range { radius: 2.5 },
        Operation::Insert,
    ]
}

#[test]
fn restart_matches_a_fresh_run() {
    let mut rng = StdRng::seed_from_u64(11);
    for method in Method::ALL {
        for operation in operations() {
            let (fresh, _) = Simulation::run(config(method, operation)).unwrap();

            let mut player = Player::new(config(method, operation)).unwrap();
            // Random commands before the restart
            let mut now = Duration::ZERO;
            for _ in 0..rng.gen_range(0..30) {
                match rng.gen_range(0..4) {
                    0 => {
                        player.advance();
                    }
                    1 => player.play(now),
                    2 => player.pause(),
                    _ => {
                        now += player.delay();
                        player.tick(now);
                    }
                }
            }
            player.restart();
            assert_eq!(player.state(), PlayerState::Idle);

            while player.advance().is_some() {}
            assert_eq!(player.history(), &fresh[..], "{method:?} {operation:?}");
            assert_eq!(player.state(), PlayerState::Finished);
        }
    }
}

#[test]
fn automatic_playback_emits_every_step() {
    let (fresh, _) = Simulation::run(config(Method::MTree, Operation::Knn { k: 4 })).unwrap();

    let mut player = Player::new(config(Method::MTree, Operation::Knn { k: 4 })).unwrap();
    player.set_speed(Duration::from_millis(40));
    player.play(Duration::ZERO);

    let mut ticks = 0;
    while let Some(deadline) = player.next_deadline() {
        assert!(player.tick(deadline));
        ticks += 1;
    }
    assert_eq!(ticks, fresh.len());
    assert_eq!(player.state(), PlayerState::Finished);
    assert_eq!(player.history(), &fresh[..]);
}

#[test]
fn reconfiguring_restarts() {
    let mut player = Player::new(config(Method::Aesa, Operation::Knn { k: 4 })).unwrap();
    player.play(Duration::ZERO);
    player.tick(player.delay());
    assert_eq!(player.history().len(), 1);

    player
        .configure(config(Method::Laesa, Operation::Range { radius: 1.0 }))
        .unwrap();
    assert_eq!(player.state(), PlayerState::Idle);
    assert!(player.next_deadline().is_none());
    assert!(player.current_step().is_none());
    assert_eq!(player.stats().steps, 0);
}

#[test]
fn height_limit_ends_an_insert_run() {
    let shallow = || {
        let dataset = vec![Point::new(0, vec![0.0, 0.0]), Point::new(1, vec![1.0, 0.0])];
        RunConfig::new(Method::MTree, Operation::Insert, dataset, Point::new(2, vec![2.0, 0.0]))
            .with_engine(EngineConfig::new().with_capacity(2).with_max_height(1))
    };

    let mut simulation = Simulation::new(shallow()).unwrap();
    let steps = simulation.run_to_end();
    assert_eq!(steps.last().map(|s| s.kind), Some(StepKind::Diagnostic));
    assert_eq!(
        simulation.failure(),
        Some(&InvariantViolation::HeightExceeded { max: 1 })
    );
    assert!(matches!(
        Simulation::run(shallow()),
        Err(SimError::Invariant(InvariantViolation::HeightExceeded { max: 1 }))
    ));

    let mut player = Player::new(shallow()).unwrap();
    while player.advance().is_some() {}
    assert_eq!(player.state(), PlayerState::Finished);
    assert_eq!(player.current_step().map(|s| s.kind), Some(StepKind::Diagnostic));
    assert_eq!(player.history(), &steps[..]);
}
