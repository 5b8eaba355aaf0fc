use conv::ValueFrom;
use serde::Serialize;

/// Counters of one simulation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub steps: usize,
    /// Exact distances computed while the run was playing (index builds excluded).
    pub distance_calls: usize,
    /// Points discarded by a lower bound without an exact distance.
    pub eliminated_by_bound: usize,
    pub nodes_visited: usize,
    pub nodes_pruned: usize,
    /// Distances a linear scan would have needed for the same answer.
    pub brute_force: usize,
}

impl RunStats {
    #[must_use]
    pub fn with_brute_force(brute_force: usize) -> Self {
        RunStats {
            brute_force,
            ..RunStats::default()
        }
    }

    /// Fraction of the brute-force distance computations avoided; negative
    /// when the run paid more than a linear scan.
    #[must_use]
    pub fn savings(&self) -> f64 {
        if self.brute_force == 0 {
            return 0.0;
        }
        let calls = f64::value_from(self.distance_calls).unwrap_or(f64::MAX);
        let brute_force = f64::value_from(self.brute_force).unwrap_or(f64::MAX);
        1.0 - calls / brute_force
    }
}
