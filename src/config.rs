//! Engine and playback configuration.
//!
//! Everything a run needs besides its dataset and query: node capacity and
//! height limit of the M-Tree, LAESA pivot count and selection policy, and the
//! automatic playback delay.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CAPACITY: usize = 4;
pub const DEFAULT_MAX_HEIGHT: usize = 8;
pub const DEFAULT_PIVOTS: usize = 2;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);
pub const MIN_DELAY: Duration = Duration::from_millis(10);
pub const MAX_DELAY: Duration = Duration::from_secs(10);

/// How LAESA chooses its pivots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PivotPolicy {
    /// The first `k` points of the dataset.
    First,
    /// Farthest-first traversal starting at the first point, ties to the smaller id.
    #[default]
    MaxSpread,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of entries in an M-Tree node.
    pub capacity: usize,
    /// Maximum number of M-Tree levels.
    pub max_height: usize,
    /// Number of LAESA pivots.
    pub pivots: usize,
    pub pivot_policy: PivotPolicy,
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_height: DEFAULT_MAX_HEIGHT,
            pivots: DEFAULT_PIVOTS,
            pivot_policy: PivotPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_max_height(mut self, max_height: usize) -> Self {
        self.max_height = max_height;
        self
    }

    #[must_use]
    pub fn with_pivots(mut self, pivots: usize) -> Self {
        self.pivots = pivots;
        self
    }

    #[must_use]
    pub fn with_pivot_policy(mut self, policy: PivotPolicy) -> Self {
        self.pivot_policy = policy;
        self
    }

    /// Checks the tree parameters. The pivot count depends on the dataset and
    /// is checked by the run configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < 2 {
            return Err(ConfigError::InvalidCapacity(self.capacity));
        }
        if self.max_height == 0 {
            return Err(ConfigError::InvalidMaxHeight);
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackConfig {
    delay: Duration,
}

impl PlaybackConfig {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: clamp_delay(delay),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = clamp_delay(delay);
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

fn clamp_delay(delay: Duration) -> Duration {
    delay.clamp(MIN_DELAY, MAX_DELAY)
}
