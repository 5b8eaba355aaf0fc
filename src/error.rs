use thiserror::Error;

use crate::point::PointId;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistanceError {
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Rejected run configurations. A run with a config error never starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("dataset is empty")]
    EmptyDataset,
    #[error("k must be in 1..={size}, got {k}")]
    InvalidK { k: usize, size: usize },
    #[error("radius must be finite and non-negative, got {0}")]
    InvalidRadius(f64),
    #[error("point {id} has {found} coordinates, expected {expected}")]
    DimensionMismatch {
        id: PointId,
        expected: usize,
        found: usize,
    },
    #[error("point {0} has a non-finite coordinate")]
    NonFiniteCoordinate(PointId),
    #[error("point id {0} is used more than once")]
    DuplicateId(PointId),
    #[error("pivot count must be at least 1 and below the dataset size {size}, got {count}")]
    InvalidPivotCount { count: usize, size: usize },
    #[error("node capacity must be at least 2, got {0}")]
    InvalidCapacity(usize),
    #[error("maximum tree height must be at least 1")]
    InvalidMaxHeight,
    #[error("a tree of height {max_height} cannot hold {points} points")]
    MaxHeightTooSmall { max_height: usize, points: usize },
    #[error("index build failed: {0}")]
    IndexBuild(InvariantViolation),
}

/// Broken internal invariants. These are defects, not user errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("threshold regressed from {previous} to {current}")]
    ThresholdRegression { previous: f64, current: f64 },
    #[error("tree height would exceed the maximum of {max}")]
    HeightExceeded { max: usize },
    #[error("point id {0} is already indexed")]
    DuplicateId(PointId),
    #[error("line {line} is out of range for a {count}-line listing")]
    LineOutOfRange { line: usize, count: usize },
    #[error(transparent)]
    Distance(#[from] DistanceError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl From<DistanceError> for SimError {
    fn from(err: DistanceError) -> Self {
        SimError::Invariant(InvariantViolation::Distance(err))
    }
}
