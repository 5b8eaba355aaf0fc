//! LAESA: a few pivots, one stored row per pivot.
//!
//! ```text
//! 0  P <- select pivots; threshold <- r (range) or inf (kNN)
//! 1  for p in P: compute d(q, p); update the result
//! 2  for o not in P: lb(o) <- max over p of |d(q, p) - D(p, o)|
//! 3  for o in order of increasing lb
//! 4      if lb(o) > threshold: eliminate o
//! 5      else compute d(q, o); update the result
//! 6  return result
//! ```

use std::collections::BTreeMap;

use log::debug;
use ordered_float::OrderedFloat;

use crate::{
    error::{ConfigError, InvariantViolation},
    point::{Point, PointId},
    stats::RunStats,
    store::{select_pivots, DistanceStore},
};

use super::{
    step::Step,
    tally::{fmt_threshold, Goal, Tally},
    RunConfig, StepCursor,
};

pub const LINES: usize = 7;

const INIT: usize = 0;
const PIVOT: usize = 1;
const BOUNDS: usize = 2;
const ELIMINATE: usize = 4;
const COMPUTE: usize = 5;
const RETURN: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Pivot(usize),
    Bounds,
    Scan(usize),
    Finish,
    Exhausted,
}

pub struct LaesaCursor {
    query: Point,
    points: BTreeMap<PointId, Point>,
    store: DistanceStore,
    pivots: Vec<PointId>,
    /// Non-pivot points with their lower bounds, sorted by `(bound, id)`.
    order: Vec<(PointId, f64)>,
    tally: Tally,
    phase: Phase,
}

impl LaesaCursor {
    pub fn new(config: &RunConfig) -> Result<Self, ConfigError> {
        let engine = &config.engine;
        let pivots = select_pivots(&config.dataset, engine.pivots, engine.pivot_policy, config.metric)
            .map_err(|err| ConfigError::IndexBuild(err.into()))?;
        let store = DistanceStore::build(&config.dataset, &pivots, config.metric)
            .map_err(|err| ConfigError::IndexBuild(err.into()))?;
        debug!("laesa pivots {:?} ({:?})", pivots, engine.pivot_policy);

        let points = config
            .dataset
            .iter()
            .map(|p| (p.id, p.clone()))
            .collect::<BTreeMap<_, _>>();
        let tally = Tally::new(points.keys().copied(), Goal::new(&config.operation));
        Ok(LaesaCursor {
            query: config.query.clone(),
            points,
            store,
            pivots,
            order: Vec::new(),
            tally,
            phase: Phase::Start,
        })
    }

    #[must_use]
    pub fn pivots(&self) -> &[PointId] {
        &self.pivots
    }

    fn start(&mut self) -> Step {
        self.phase = Phase::Pivot(0);
        let names = self
            .pivots
            .iter()
            .map(|&id| self.name(id))
            .collect::<Vec<_>>()
            .join(", ");
        let description = format!(
            "Pivots {names} with {} stored distances. Threshold is the {}.",
            self.store.len(),
            self.tally.goal().describe()
        );
        self.tally.stamp(Step::new(INIT, description))
    }

    fn pivot(&mut self, index: usize) -> Result<Step, InvariantViolation> {
        let id = self.pivots[index];
        let d = self.store.get_or_compute(&self.query, &self.points[&id])?;
        self.tally.stats.distance_calls = self.store.computed();
        let accepted = self.tally.consider(id, d)?;

        self.phase = if index + 1 < self.pivots.len() {
            Phase::Pivot(index + 1)
        } else {
            Phase::Bounds
        };
        let verdict = if accepted { "kept" } else { "rejected" };
        let description = format!("Pivot {}: d(q, {}) = {d:.2}, {verdict}.", self.name(id), self.name(id));
        let step = Step::new(PIVOT, description)
            .distance(self.query.id, id, d)
            .focus(id);
        Ok(self.tally.stamp(step))
    }

    fn bounds(&mut self) -> Step {
        let mut order = self
            .points
            .keys()
            .filter(|id| !self.store.is_pivot(**id))
            .map(|&id| (id, self.store.lower_bound(self.query.id, id, &self.pivots)))
            .collect::<Vec<_>>();
        order.sort_by_key(|&(id, bound)| (OrderedFloat(bound), id));
        self.order = order;

        self.phase = if self.order.is_empty() {
            Phase::Finish
        } else {
            Phase::Scan(0)
        };
        let listing = self
            .order
            .iter()
            .map(|&(id, bound)| format!("{}={bound:.2}", self.name(id)))
            .collect::<Vec<_>>()
            .join(", ");
        let description = format!("Lower bounds from the pivot rows, in visiting order: {listing}.");
        self.tally.stamp(Step::new(BOUNDS, description))
    }

    fn scan(&mut self, index: usize) -> Result<Step, InvariantViolation> {
        let (id, bound) = self.order[index];
        self.phase = if index + 1 < self.order.len() {
            Phase::Scan(index + 1)
        } else {
            Phase::Finish
        };

        let threshold = self.tally.threshold();
        if bound > threshold {
            self.tally.eliminate_by_bound(id);
            let description = format!(
                "Lower bound of {} is {bound:.2} > {}: eliminated without computing its distance.",
                self.name(id),
                fmt_threshold(threshold)
            );
            let step = Step::new(ELIMINATE, description)
                .bound(bound)
                .threshold(threshold)
                .focus(id);
            return Ok(self.tally.stamp(step));
        }

        let d = self.store.get_or_compute(&self.query, &self.points[&id])?;
        self.tally.stats.distance_calls = self.store.computed();
        let accepted = self.tally.consider(id, d)?;
        let verdict = if accepted { "kept" } else { "rejected" };
        let description = format!(
            "Lower bound of {} is {bound:.2} <= {}: d(q, {}) = {d:.2}, {verdict}.",
            self.name(id),
            fmt_threshold(threshold),
            self.name(id)
        );
        let step = Step::new(COMPUTE, description)
            .distance(self.query.id, id, d)
            .bound(bound)
            .threshold(threshold)
            .focus(id);
        Ok(self.tally.stamp(step))
    }

    fn finish(&mut self) -> Step {
        self.phase = Phase::Exhausted;
        let description = format!(
            "All points decided with {} exact distances ({} pivots).",
            self.store.computed(),
            self.pivots.len()
        );
        self.tally.stamp(Step::new(RETURN, description)).done()
    }

    fn name(&self, id: PointId) -> String {
        self.points.get(&id).map_or_else(|| format!("#{id}"), Point::name)
    }
}

impl StepCursor for LaesaCursor {
    fn resume(&mut self) -> Option<Result<Step, InvariantViolation>> {
        let result = match self.phase {
            Phase::Exhausted => return None,
            Phase::Start => Ok(self.start()),
            Phase::Pivot(index) => self.pivot(index),
            Phase::Bounds => Ok(self.bounds()),
            Phase::Scan(index) => self.scan(index),
            Phase::Finish => Ok(self.finish()),
        };
        if result.is_err() {
            self.phase = Phase::Exhausted;
        }
        Some(result)
    }

    fn stats(&self) -> RunStats {
        self.tally.stats
    }
}
