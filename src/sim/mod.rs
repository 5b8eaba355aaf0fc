//! Step-by-step simulation of metric search algorithms.
//!
//! A [`RunConfig`] names a method, an operation, a dataset and a query.
//! [`Simulation::new`] validates it, builds the index the method needs and
//! wraps a cursor that yields one [`Step`] per unit of algorithmic work.
//! Cursors are explicit state machines: nothing runs between two calls to
//! [`Simulation::next_step`].

pub mod aesa;
pub mod insert;
pub mod laesa;
pub mod mtree;
pub mod step;
pub(crate) mod tally;

use std::collections::HashSet;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::EngineConfig,
    distance::Metric,
    error::{ConfigError, InvariantViolation, SimError},
    point::Point,
    stats::RunStats,
};
pub use step::{DistanceRecord, Step, StepKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Aesa,
    Laesa,
    MTree,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Aesa, Method::Laesa, Method::MTree];
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Knn { k: usize },
    Range { radius: f64 },
    Insert,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Knn,
    Range,
    Insert,
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Knn { .. } => OperationKind::Knn,
            Operation::Range { .. } => OperationKind::Range,
            Operation::Insert => OperationKind::Insert,
        }
    }
}

/// Number of pseudocode lines shown for a method and operation.
pub trait LineCounts {
    fn line_count(&self, method: Method, operation: OperationKind) -> usize;
}

/// Line counts of the listings the built-in cursors point into.
pub struct PseudocodeLines;

pub const PSEUDOCODE_LINES: PseudocodeLines = PseudocodeLines;

impl LineCounts for PseudocodeLines {
    fn line_count(&self, method: Method, operation: OperationKind) -> usize {
        match (method, operation) {
            (Method::Aesa, OperationKind::Knn | OperationKind::Range) => aesa::LINES,
            (Method::Laesa, OperationKind::Knn | OperationKind::Range) => laesa::LINES,
            (Method::MTree, OperationKind::Knn | OperationKind::Range) => mtree::SEARCH_LINES,
            (Method::Aesa | Method::Laesa, OperationKind::Insert) => insert::TABLE_LINES,
            (Method::MTree, OperationKind::Insert) => insert::TREE_LINES,
        }
    }
}

/// Everything a run depends on. Immutable once the run starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub method: Method,
    pub operation: Operation,
    pub dataset: Vec<Point>,
    /// Query point, or the point to insert.
    pub query: Point,
    pub metric: Metric,
    pub engine: EngineConfig,
}

impl RunConfig {
    #[must_use]
    pub fn new(method: Method, operation: Operation, dataset: Vec<Point>, query: Point) -> Self {
        RunConfig {
            method,
            operation,
            dataset,
            query,
            metric: Metric::default(),
            engine: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(first) = self.dataset.first() else {
            return Err(ConfigError::EmptyDataset);
        };
        let expected = first.dimensionality();

        let mut ids = HashSet::new();
        for point in self.dataset.iter().chain(std::iter::once(&self.query)) {
            if point.dimensionality() != expected {
                return Err(ConfigError::DimensionMismatch {
                    id: point.id,
                    expected,
                    found: point.dimensionality(),
                });
            }
            if point.coords.iter().any(|x| !x.is_finite()) {
                return Err(ConfigError::NonFiniteCoordinate(point.id));
            }
            if !ids.insert(point.id) {
                return Err(ConfigError::DuplicateId(point.id));
            }
        }

        let size = self.dataset.len();
        match self.operation {
            Operation::Knn { k } => {
                if k == 0 || k > size {
                    return Err(ConfigError::InvalidK { k, size });
                }
            }
            Operation::Range { radius } => {
                if !radius.is_finite() || radius < 0.0 {
                    return Err(ConfigError::InvalidRadius(radius));
                }
            }
            Operation::Insert => {}
        }

        match self.method {
            Method::Aesa => {}
            Method::Laesa => {
                // Pivots are a strict subset unless the dataset has one point.
                let count = self.engine.pivots;
                if count == 0 || count > size.saturating_sub(1).max(1) {
                    return Err(ConfigError::InvalidPivotCount { count, size });
                }
            }
            Method::MTree => self.engine.validate()?,
        }
        Ok(())
    }
}

/// A resumable algorithm. Each call performs one bounded unit of work and
/// yields exactly one step; `None` once the run is over.
pub trait StepCursor {
    fn resume(&mut self) -> Option<Result<Step, InvariantViolation>>;

    fn stats(&self) -> RunStats;
}

/// One run of one algorithm over one configuration.
pub struct Simulation {
    config: RunConfig,
    cursor: Box<dyn StepCursor>,
    line_count: usize,
    last: Option<Step>,
    steps: usize,
    finished: bool,
    failure: Option<InvariantViolation>,
}

impl Simulation {
    pub fn new(config: RunConfig) -> Result<Self, ConfigError> {
        Self::with_lines(config, &PSEUDOCODE_LINES)
    }

    pub fn with_lines(config: RunConfig, lines: &dyn LineCounts) -> Result<Self, ConfigError> {
        config.validate()?;
        let line_count = lines.line_count(config.method, config.operation.kind());
        let cursor = build_cursor(&config)?;
        debug!(
            "simulation {:?} {:?}: {} points, metric {}",
            config.method,
            config.operation,
            config.dataset.len(),
            config.metric.name()
        );
        Ok(Simulation {
            config,
            cursor,
            line_count,
            last: None,
            steps: 0,
            finished: false,
            failure: None,
        })
    }

    /// Validates, builds and plays a whole run. A run that stopped on a
    /// broken invariant is reported as an error.
    pub fn run(config: RunConfig) -> Result<(Vec<Step>, RunStats), SimError> {
        let mut simulation = Simulation::new(config)?;
        let steps = simulation.run_to_end();
        match simulation.failure.take() {
            Some(violation) => Err(violation.into()),
            None => Ok((steps, simulation.stats())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The violation that stopped the run, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&InvariantViolation> {
        self.failure.as_ref()
    }

    #[must_use]
    pub fn last_step(&self) -> Option<&Step> {
        self.last.as_ref()
    }

    #[must_use]
    pub fn stats(&self) -> RunStats {
        RunStats {
            steps: self.steps,
            ..self.cursor.stats()
        }
    }

    /// Advances the cursor by one step. Broken invariants end the run with a
    /// diagnostic step instead of an error.
    pub fn next_step(&mut self) -> Option<Step> {
        if self.finished {
            return None;
        }
        let step = match self.cursor.resume() {
            None => {
                self.finished = true;
                return None;
            }
            Some(Ok(step)) if step.line >= self.line_count => {
                let violation = InvariantViolation::LineOutOfRange {
                    line: step.line,
                    count: self.line_count,
                };
                self.diagnose(violation)
            }
            Some(Ok(step)) => step,
            Some(Err(violation)) => self.diagnose(violation),
        };
        trace!("step {}: {}", self.steps, step.description);
        if step.is_terminal() {
            self.finished = true;
        }
        self.steps += 1;
        self.last = Some(step.clone());
        Some(step)
    }

    /// Runs the simulation to the end and returns every step.
    pub fn run_to_end(&mut self) -> Vec<Step> {
        let mut steps = Vec::new();
        while let Some(step) = self.next_step() {
            steps.push(step);
        }
        steps
    }

    fn diagnose(&mut self, violation: InvariantViolation) -> Step {
        warn!(
            "{:?} {:?} stopped: {}",
            self.config.method, self.config.operation, violation
        );
        let step = Step::diagnostic(self.last.as_ref(), &violation);
        self.failure = Some(violation);
        step
    }
}

fn build_cursor(config: &RunConfig) -> Result<Box<dyn StepCursor>, ConfigError> {
    let cursor: Box<dyn StepCursor> = match (config.method, config.operation.kind()) {
        (Method::Aesa, OperationKind::Knn | OperationKind::Range) => {
            Box::new(aesa::AesaCursor::new(config)?)
        }
        (Method::Laesa, OperationKind::Knn | OperationKind::Range) => {
            Box::new(laesa::LaesaCursor::new(config)?)
        }
        (Method::MTree, OperationKind::Knn | OperationKind::Range) => {
            Box::new(mtree::MTreeSearchCursor::new(config)?)
        }
        (Method::Aesa | Method::Laesa, OperationKind::Insert) => {
            Box::new(insert::TableInsertCursor::new(config)?)
        }
        (Method::MTree, OperationKind::Insert) => Box::new(insert::MTreeInsertCursor::new(config)?),
    };
    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use super::{LineCounts, Method, Operation, OperationKind, RunConfig, Simulation, StepKind};
    use crate::{
        config::EngineConfig,
        error::{ConfigError, InvariantViolation, SimError},
        point::Point,
    };

    fn dataset() -> Vec<Point> {
        (0..6)
            .map(|i| Point::new(i, vec![f64::from(i), f64::from(i % 3)]))
            .collect()
    }

    fn query() -> Point {
        Point::new(100, vec![2.5, 1.0])
    }

    #[test]
    fn validation() {
        let config = RunConfig::new(Method::Aesa, Operation::Knn { k: 0 }, dataset(), query());
        assert_eq!(config.validate(), Err(ConfigError::InvalidK { k: 0, size: 6 }));

        let config = RunConfig::new(Method::Aesa, Operation::Knn { k: 7 }, dataset(), query());
        assert_eq!(config.validate(), Err(ConfigError::InvalidK { k: 7, size: 6 }));

        let config = RunConfig::new(Method::Aesa, Operation::Range { radius: -1.0 }, dataset(), query());
        assert_eq!(config.validate(), Err(ConfigError::InvalidRadius(-1.0)));

        let config = RunConfig::new(Method::Aesa, Operation::Insert, Vec::new(), query());
        assert_eq!(config.validate(), Err(ConfigError::EmptyDataset));

        let config = RunConfig::new(Method::Aesa, Operation::Insert, dataset(), Point::new(100, vec![1.0]));
        assert_eq!(
            config.validate(),
            Err(ConfigError::DimensionMismatch {
                id: 100,
                expected: 2,
                found: 1
            })
        );

        let config = RunConfig::new(Method::Aesa, Operation::Insert, dataset(), Point::new(3, vec![1.0, 1.0]));
        assert_eq!(config.validate(), Err(ConfigError::DuplicateId(3)));

        let config = RunConfig::new(Method::Laesa, Operation::Insert, dataset(), query())
            .with_engine(EngineConfig::new().with_pivots(0));
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPivotCount { count: 0, size: 6 })
        );

        let config = RunConfig::new(Method::Laesa, Operation::Knn { k: 1 }, dataset(), query())
            .with_engine(EngineConfig::new().with_pivots(6));
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPivotCount { count: 6, size: 6 })
        );

        let config = RunConfig::new(Method::Laesa, Operation::Knn { k: 1 }, dataset(), query())
            .with_engine(EngineConfig::new().with_pivots(5));
        assert!(config.validate().is_ok());

        let single = vec![Point::new(1, vec![0.0, 0.0])];
        let config = RunConfig::new(Method::Laesa, Operation::Knn { k: 1 }, single, query())
            .with_engine(EngineConfig::new().with_pivots(1));
        assert!(config.validate().is_ok());

        let config = RunConfig::new(Method::MTree, Operation::Insert, dataset(), query())
            .with_engine(EngineConfig::new().with_capacity(1));
        assert_eq!(config.validate(), Err(ConfigError::InvalidCapacity(1)));

        let config = RunConfig::new(Method::Aesa, Operation::Range { radius: 1.0 }, dataset(), query());
        assert!(Simulation::new(config).is_ok());
    }

    #[test]
    fn shallow_tree_is_a_config_error() {
        let config = RunConfig::new(Method::MTree, Operation::Knn { k: 2 }, dataset(), query())
            .with_engine(EngineConfig::new().with_capacity(2).with_max_height(1));
        assert!(matches!(
            Simulation::new(config),
            Err(ConfigError::MaxHeightTooSmall { .. })
        ));
    }

    #[test]
    fn every_run_ends_with_a_done_step() {
        for method in Method::ALL {
            for operation in [
                Operation::Knn { k: 2 },
                Operation::Range { radius: 1.5 },
                Operation::Insert,
            ] {
                let config = RunConfig::new(method, operation, dataset(), query());
                let mut simulation = Simulation::new(config).unwrap();
                let steps = simulation.run_to_end();
                assert!(steps.len() >= 2);
                assert_eq!(steps.last().map(|s| s.kind), Some(StepKind::Done));
                assert!(steps[..steps.len() - 1]
                    .iter()
                    .all(|s| s.kind == StepKind::Progress));
                assert!(simulation.is_finished());
                assert_eq!(simulation.next_step(), None);
                assert_eq!(simulation.stats().steps, steps.len());
            }
        }
    }

    struct ShortListings;

    impl LineCounts for ShortListings {
        fn line_count(&self, _: Method, _: OperationKind) -> usize {
            2
        }
    }

    #[test]
    fn out_of_range_line_stops_the_run() {
        let config = RunConfig::new(Method::Aesa, Operation::Knn { k: 2 }, dataset(), query());
        let mut simulation = Simulation::with_lines(config, &ShortListings).unwrap();
        let steps = simulation.run_to_end();

        let last = steps.last().unwrap();
        assert_eq!(last.kind, StepKind::Diagnostic);
        assert!(simulation.is_finished());
        assert!(matches!(
            simulation.failure(),
            Some(InvariantViolation::LineOutOfRange { count: 2, .. })
        ));
    }

    #[test]
    fn run_reports_config_errors() {
        let config = RunConfig::new(Method::Laesa, Operation::Range { radius: 2.0 }, dataset(), query());
        let (steps, stats) = Simulation::run(config).unwrap();
        assert_eq!(stats.steps, steps.len());

        let config = RunConfig::new(Method::Laesa, Operation::Knn { k: 9 }, dataset(), query());
        assert_eq!(
            Simulation::run(config).err(),
            Some(SimError::Config(ConfigError::InvalidK { k: 9, size: 6 }))
        );
    }
}
