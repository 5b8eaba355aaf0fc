use std::collections::BTreeSet;

use serde::Serialize;

use crate::{
    error::InvariantViolation,
    mtree::node::NodeId,
    point::PointId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StepKind {
    Progress,
    /// Last step of a run, carrying the final result.
    Done,
    /// The run hit a broken invariant and stopped.
    Diagnostic,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DistanceRecord {
    pub from: PointId,
    pub to: PointId,
    pub value: f64,
}

/// Snapshot of a run after one unit of work.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Step {
    /// Highlighted pseudocode line.
    pub line: usize,
    pub kind: StepKind,
    /// Points not decided yet.
    pub candidates: BTreeSet<PointId>,
    pub eliminated: BTreeSet<PointId>,
    /// Current answer. kNN results are ordered by distance.
    pub result: Vec<PointId>,
    /// Exact distances computed by this step, in order.
    pub distances: Vec<DistanceRecord>,
    pub lower_bound: Option<f64>,
    pub threshold: Option<f64>,
    /// Point the step is about.
    pub focus: Option<PointId>,
    /// Tree node the step is about.
    pub node: Option<NodeId>,
    /// Exact distances computed so far in the run.
    pub distance_calls: usize,
    pub description: String,
}

impl Step {
    pub(crate) fn new(line: usize, description: impl Into<String>) -> Step {
        Step {
            line,
            kind: StepKind::Progress,
            candidates: BTreeSet::new(),
            eliminated: BTreeSet::new(),
            result: Vec::new(),
            distances: Vec::new(),
            lower_bound: None,
            threshold: None,
            focus: None,
            node: None,
            distance_calls: 0,
            description: description.into(),
        }
    }

    /// Repeats the state of `last` (if any) and reports `violation`.
    pub(crate) fn diagnostic(last: Option<&Step>, violation: &InvariantViolation) -> Step {
        let mut step = last.cloned().unwrap_or_else(|| Step::new(0, ""));
        step.kind = StepKind::Diagnostic;
        step.distances.clear();
        step.lower_bound = None;
        step.focus = None;
        step.description = format!("Simulation stopped: {violation}");
        step
    }

    pub(crate) fn done(mut self) -> Step {
        self.kind = StepKind::Done;
        self
    }

    pub(crate) fn distance(mut self, from: PointId, to: PointId, value: f64) -> Step {
        self.distances.push(DistanceRecord { from, to, value });
        self
    }

    pub(crate) fn bound(mut self, lower_bound: f64) -> Step {
        self.lower_bound = Some(lower_bound);
        self
    }

    pub(crate) fn threshold(mut self, threshold: f64) -> Step {
        self.threshold = Some(threshold);
        self
    }

    pub(crate) fn focus(mut self, id: PointId) -> Step {
        self.focus = Some(id);
        self
    }

    pub(crate) fn node(mut self, node: NodeId) -> Step {
        self.node = Some(node);
        self
    }

    pub(crate) fn candidates(mut self, candidates: impl IntoIterator<Item = PointId>) -> Step {
        self.candidates = candidates.into_iter().collect();
        self
    }

    pub(crate) fn result(mut self, result: Vec<PointId>) -> Step {
        self.result = result;
        self
    }

    pub(crate) fn calls(mut self, distance_calls: usize) -> Step {
        self.distance_calls = distance_calls;
        self
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind != StepKind::Progress
    }
}
