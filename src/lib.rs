//! Step-by-step simulation of metric-space similarity search.
//!
//! AESA, LAESA and the M-Tree answer kNN and range queries and accept new
//! points. Every run is replayed as a deterministic sequence of [`Step`]s
//! that expose candidates, eliminations, distances and the highlighted
//! pseudocode line; a [`Player`] plays them back under user commands.

pub mod config;
pub mod distance;
pub mod error;
#[allow(clippy::module_name_repetitions)]
pub mod linear;
pub mod mtree;
pub mod neighbors;
pub mod playback;
pub mod point;
pub mod sim;
pub mod stats;
pub mod store;

pub use config::{EngineConfig, PivotPolicy, PlaybackConfig};
pub use distance::Metric;
pub use error::{ConfigError, DistanceError, InvariantViolation, SimError};
pub use linear::LinearScan;
pub use mtree::MTree;
pub use playback::{Player, PlayerState};
pub use point::{Point, PointId};
pub use sim::{
    LineCounts, Method, Operation, OperationKind, RunConfig, Simulation, Step, StepKind,
    PSEUDOCODE_LINES,
};
pub use stats::RunStats;
pub use store::DistanceStore;
