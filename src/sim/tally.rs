use std::collections::BTreeSet;

use crate::{
    error::InvariantViolation,
    neighbors::{Neighbors, Offer},
    point::PointId,
    stats::RunStats,
};

use super::{step::Step, Operation};

/// What a query run is looking for and how far it may look.
pub(crate) enum Goal {
    Range {
        radius: f64,
        hits: BTreeSet<PointId>,
    },
    Knn(Neighbors),
}

impl Goal {
    pub(crate) fn new(operation: &Operation) -> Goal {
        match *operation {
            Operation::Knn { k } => Goal::Knn(Neighbors::new(k)),
            Operation::Range { radius } => Goal::Range {
                radius,
                hits: BTreeSet::new(),
            },
            Operation::Insert => Goal::Range {
                radius: 0.0,
                hits: BTreeSet::new(),
            },
        }
    }

    pub(crate) fn threshold(&self) -> f64 {
        match self {
            Goal::Range { radius, .. } => *radius,
            Goal::Knn(neighbors) => neighbors.threshold(),
        }
    }

    pub(crate) fn result(&self) -> Vec<PointId> {
        match self {
            Goal::Range { hits, .. } => hits.iter().copied().collect(),
            Goal::Knn(neighbors) => neighbors.ids(),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Goal::Range { radius, .. } => format!("radius {radius}"),
            Goal::Knn(neighbors) => format!("k-th distance {}", fmt_threshold(neighbors.threshold())),
        }
    }
}

pub(crate) fn fmt_threshold(threshold: f64) -> String {
    if threshold.is_infinite() {
        "∞".to_string()
    } else {
        format!("{threshold:.2}")
    }
}

/// Bookkeeping shared by the query cursors: which points are still
/// candidates, which are eliminated, the current answer and the counters.
pub(crate) struct Tally {
    pending: BTreeSet<PointId>,
    eliminated: BTreeSet<PointId>,
    goal: Goal,
    last_threshold: f64,
    pub(crate) stats: RunStats,
}

impl Tally {
    pub(crate) fn new(ids: impl IntoIterator<Item = PointId>, goal: Goal) -> Tally {
        let pending = ids.into_iter().collect::<BTreeSet<_>>();
        let brute_force = pending.len();
        let last_threshold = goal.threshold();
        Tally {
            pending,
            eliminated: BTreeSet::new(),
            goal,
            last_threshold,
            stats: RunStats::with_brute_force(brute_force),
        }
    }

    pub(crate) fn threshold(&self) -> f64 {
        self.goal.threshold()
    }

    pub(crate) fn goal(&self) -> &Goal {
        &self.goal
    }

    pub(crate) fn is_pending(&self, id: PointId) -> bool {
        self.pending.contains(&id)
    }

    /// Drops `id` without an exact distance.
    pub(crate) fn eliminate_by_bound(&mut self, id: PointId) {
        if self.pending.remove(&id) {
            self.eliminated.insert(id);
            self.stats.eliminated_by_bound += 1;
        }
    }

    /// Settles `id` given its exact distance. Returns whether it joined the result.
    pub(crate) fn consider(&mut self, id: PointId, distance: f64) -> Result<bool, InvariantViolation> {
        self.pending.remove(&id);
        let accepted = match &mut self.goal {
            Goal::Range { radius, hits } => {
                if distance <= *radius {
                    hits.insert(id);
                    true
                } else {
                    false
                }
            }
            Goal::Knn(neighbors) => match neighbors.offer(distance, id) {
                Offer::Accepted { evicted } => {
                    if let Some(evicted) = evicted {
                        self.eliminated.insert(evicted);
                    }
                    true
                }
                Offer::Rejected => false,
            },
        };
        if !accepted {
            self.eliminated.insert(id);
        }

        let current = self.goal.threshold();
        if current > self.last_threshold {
            return Err(InvariantViolation::ThresholdRegression {
                previous: self.last_threshold,
                current,
            });
        }
        self.last_threshold = current;
        Ok(accepted)
    }

    /// Fills the shared state of a step.
    pub(crate) fn stamp(&self, mut step: Step) -> Step {
        step.candidates = self.pending.clone();
        step.eliminated = self.eliminated.clone();
        step.result = self.goal.result();
        step.distance_calls = self.stats.distance_calls;
        if step.threshold.is_none() {
            step.threshold = Some(self.threshold());
        }
        step
    }
}
