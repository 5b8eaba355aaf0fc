//! AESA: every dataset point is a pivot.
//!
//! ```text
//! 0  alive <- dataset; lb(o) <- 0; threshold <- r (range) or inf (kNN)
//! 1  while alive is not empty
//! 2      s <- alive point with the smallest lb
//! 3      if lb(s) > threshold: eliminate s; continue
//! 4      compute d(q, s); update the result
//! 5      for o in alive: lb(o) <- max(lb(o), |d(q, s) - D(s, o)|)
//! 6      eliminate every o with lb(o) > threshold
//! 7  return result
//! ```

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::{
    error::{ConfigError, InvariantViolation},
    point::{Point, PointId},
    stats::RunStats,
    store::DistanceStore,
};

use super::{
    step::Step,
    tally::{fmt_threshold, Goal, Tally},
    RunConfig, StepCursor,
};

pub const LINES: usize = 8;

const INIT: usize = 0;
const SKIP: usize = 3;
const COMPUTE: usize = 4;
const ELIMINATE: usize = 6;
const RETURN: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Approximate,
    Eliminate,
    Exhausted,
}

pub struct AesaCursor {
    query: Point,
    points: BTreeMap<PointId, Point>,
    store: DistanceStore,
    /// Lower bound of every point still alive.
    alive: BTreeMap<PointId, f64>,
    /// Points whose distance to the query is known, in computation order.
    pivots: Vec<PointId>,
    tally: Tally,
    phase: Phase,
}

impl AesaCursor {
    pub fn new(config: &RunConfig) -> Result<Self, ConfigError> {
        let store = DistanceStore::full(&config.dataset, config.metric)
            .map_err(|err| ConfigError::IndexBuild(err.into()))?;
        let points = config
            .dataset
            .iter()
            .map(|p| (p.id, p.clone()))
            .collect::<BTreeMap<_, _>>();
        let alive = points.keys().map(|&id| (id, 0.0)).collect();
        let tally = Tally::new(points.keys().copied(), Goal::new(&config.operation));
        Ok(AesaCursor {
            query: config.query.clone(),
            points,
            store,
            alive,
            pivots: Vec::new(),
            tally,
            phase: Phase::Start,
        })
    }

    fn start(&mut self) -> Step {
        self.phase = Phase::Approximate;
        let description = format!(
            "Full distance matrix over {} points ({} pairs). All lower bounds start at 0, threshold is the {}.",
            self.points.len(),
            self.store.len(),
            self.tally.goal().describe()
        );
        self.tally.stamp(Step::new(INIT, description))
    }

    fn approximate(&mut self) -> Result<Step, InvariantViolation> {
        let next = self
            .alive
            .iter()
            .min_by_key(|&(&id, &bound)| (OrderedFloat(bound), id))
            .map(|(&id, &bound)| (id, bound));
        let Some((id, bound)) = next else {
            return Ok(self.finish());
        };

        let threshold = self.tally.threshold();
        if bound > threshold {
            // Smallest bound already too large: every alive point goes
            self.alive.remove(&id);
            self.tally.eliminate_by_bound(id);
            let description = format!(
                "Smallest lower bound {bound:.2} of {} exceeds the threshold {}: eliminated.",
                self.name(id),
                fmt_threshold(threshold)
            );
            let step = Step::new(SKIP, description)
                .bound(bound)
                .threshold(threshold)
                .focus(id);
            return Ok(self.tally.stamp(step));
        }

        let point = &self.points[&id];
        let d = self.store.get_or_compute(&self.query, point)?;
        self.tally.stats.distance_calls = self.store.computed();
        self.alive.remove(&id);
        self.pivots.push(id);
        let accepted = self.tally.consider(id, d)?;

        for (&other, other_bound) in &mut self.alive {
            let bound = self.store.lower_bound(self.query.id, other, &[id]);
            *other_bound = other_bound.max(bound);
        }

        self.phase = Phase::Eliminate;
        let verdict = if accepted { "kept" } else { "rejected" };
        let description = format!(
            "{} has the smallest lower bound ({bound:.2}); d(q, {}) = {d:.2}, {verdict}. Bounds of the alive points tightened with its matrix row.",
            self.name(id),
            self.name(id)
        );
        let step = Step::new(COMPUTE, description)
            .distance(self.query.id, id, d)
            .bound(bound)
            .focus(id);
        Ok(self.tally.stamp(step))
    }

    fn eliminate(&mut self) -> Option<Step> {
        let threshold = self.tally.threshold();
        let (id, bound) = self
            .alive
            .iter()
            .find(|&(_, &bound)| bound > threshold)
            .map(|(&id, &bound)| (id, bound))?;
        self.alive.remove(&id);
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
        Some(self.tally.stamp(step))
    }

    fn finish(&mut self) -> Step {
        self.phase = Phase::Exhausted;
        let description = format!(
            "No alive points left. {} of {} points served as pivots.",
            self.pivots.len(),
            self.points.len()
        );
        self.tally.stamp(Step::new(RETURN, description)).done()
    }

    fn name(&self, id: PointId) -> String {
        self.points.get(&id).map_or_else(|| format!("#{id}"), Point::name)
    }
}

impl StepCursor for AesaCursor {
    fn resume(&mut self) -> Option<Result<Step, InvariantViolation>> {
        let result = match self.phase {
            Phase::Exhausted => return None,
            Phase::Start => Ok(self.start()),
            Phase::Eliminate => match self.eliminate() {
                Some(step) => Ok(step),
                None => {
                    self.phase = Phase::Approximate;
                    self.approximate()
                }
            },
            Phase::Approximate => self.approximate(),
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
