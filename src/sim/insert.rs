//! Dynamic insertion.
//!
//! AESA and LAESA extend their distance tables:
//!
//! ```text
//! 0  o <- new point; R <- dataset (AESA) or pivots (LAESA)
//! 1  for p in R: compute D(o, p) and store it
//! 2  append o to the dataset
//! ```
//!
//! The M-Tree descends and splits:
//!
//! ```text
//! 0  N <- root
//! 1  while N is a routing node
//! 2      if some entry covers o: e <- the one with the closest pivot
//! 3      else e <- least enlargement; e.r <- d(o, e.pivot)
//! 4      N <- e.child
//! 5  add o to leaf N
//! 6  if N overflows: split N, promote the farthest pair
//! 7  if the parent overflows: split it as well
//! 8  done
//! ```

use std::collections::BTreeSet;

use crate::{
    error::{ConfigError, DistanceError, InvariantViolation},
    mtree::{
        node::{Node, NodeId},
        InsertCursor, InsertEvent, MTree,
    },
    point::{Point, PointId},
    stats::RunStats,
    store::{select_pivots, DistanceStore},
};

use super::{mtree::build_tree, step::Step, Method, RunConfig, StepCursor};

pub const TABLE_LINES: usize = 3;
pub const TREE_LINES: usize = 9;

const TABLE_INIT: usize = 0;
const TABLE_DISTANCE: usize = 1;
const TABLE_APPEND: usize = 2;

const TREE_INIT: usize = 0;
const TREE_FITS: usize = 2;
const TREE_ENLARGE: usize = 3;
const TREE_PLACE: usize = 5;
const TREE_SPLIT_LEAF: usize = 6;
const TREE_SPLIT_ROUTING: usize = 7;
const TREE_DONE: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TablePhase {
    Start,
    Distance(usize),
    Append,
    Exhausted,
}

/// Insertion into the AESA matrix or the LAESA pivot rows.
pub struct TableInsertCursor {
    method: Method,
    point: Point,
    dataset: Vec<Point>,
    store: DistanceStore,
    /// Points the new one needs a stored distance to.
    targets: Vec<Point>,
    stats: RunStats,
    phase: TablePhase,
}

impl TableInsertCursor {
    pub fn new(config: &RunConfig) -> Result<Self, ConfigError> {
        let index_error = |err: DistanceError| ConfigError::IndexBuild(err.into());
        let (store, targets) = match config.method {
            Method::Laesa => {
                let engine = &config.engine;
                let pivots =
                    select_pivots(&config.dataset, engine.pivots, engine.pivot_policy, config.metric)
                        .map_err(index_error)?;
                let store = DistanceStore::build(&config.dataset, &pivots, config.metric)
                    .map_err(index_error)?;
                let targets = config
                    .dataset
                    .iter()
                    .filter(|p| pivots.contains(&p.id))
                    .cloned()
                    .collect();
                (store, targets)
            }
            _ => {
                let store = DistanceStore::full(&config.dataset, config.metric).map_err(index_error)?;
                (store, config.dataset.clone())
            }
        };
        let stats = RunStats::with_brute_force(config.dataset.len());
        Ok(TableInsertCursor {
            method: config.method,
            point: config.query.clone(),
            dataset: config.dataset.clone(),
            store,
            targets,
            stats,
            phase: TablePhase::Start,
        })
    }

    #[must_use]
    pub fn store(&self) -> &DistanceStore {
        &self.store
    }

    fn remaining(&self, from: usize) -> Vec<PointId> {
        self.targets.iter().skip(from).map(|p| p.id).collect()
    }

    fn step(&mut self) -> Result<Step, InvariantViolation> {
        match self.phase {
            TablePhase::Start => {
                self.phase = if self.targets.is_empty() {
                    TablePhase::Append
                } else {
                    TablePhase::Distance(0)
                };
                let rows = match self.method {
                    Method::Laesa => "pivot",
                    _ => "dataset",
                };
                let description = format!(
                    "Insert {}: {} distances to compute, one per {rows} point.",
                    self.point.name(),
                    self.targets.len()
                );
                Ok(Step::new(TABLE_INIT, description)
                    .candidates(self.remaining(0))
                    .focus(self.point.id))
            }
            TablePhase::Distance(index) => {
                let other = &self.targets[index];
                let target = other.id;
                let d = self.store.get_or_compute(&self.point, other)?;
                self.stats.distance_calls = self.store.computed();
                self.phase = if index + 1 < self.targets.len() {
                    TablePhase::Distance(index + 1)
                } else {
                    TablePhase::Append
                };
                let description = format!(
                    "D({}, {}) = {d:.2} stored.",
                    self.point.name(),
                    other.name()
                );
                Ok(Step::new(TABLE_DISTANCE, description)
                    .distance(self.point.id, target, d)
                    .candidates(self.remaining(index + 1))
                    .focus(target)
                    .calls(self.stats.distance_calls))
            }
            TablePhase::Append => {
                self.phase = TablePhase::Exhausted;
                self.dataset.push(self.point.clone());
                if self.method == Method::Aesa {
                    self.store.add_pivot(self.point.id);
                }
                let description = format!(
                    "{} appended; the dataset now holds {} points and {} stored distances.",
                    self.point.name(),
                    self.dataset.len(),
                    self.store.len()
                );
                Ok(Step::new(TABLE_APPEND, description)
                    .result(vec![self.point.id])
                    .focus(self.point.id)
                    .calls(self.stats.distance_calls)
                    .done())
            }
            TablePhase::Exhausted => unreachable!("exhausted cursors are not resumed"),
        }
    }
}

impl StepCursor for TableInsertCursor {
    fn resume(&mut self) -> Option<Result<Step, InvariantViolation>> {
        if self.phase == TablePhase::Exhausted {
            return None;
        }
        let result = self.step();
        if result.is_err() {
            self.phase = TablePhase::Exhausted;
        }
        Some(result)
    }

    fn stats(&self) -> RunStats {
        self.stats
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TreePhase {
    Start,
    Insert,
    Exhausted,
}

/// Stepwise insertion into an M-Tree built from the dataset.
pub struct MTreeInsertCursor {
    tree: MTree,
    cursor: InsertCursor,
    stats: RunStats,
    phase: TreePhase,
}

impl MTreeInsertCursor {
    pub fn new(config: &RunConfig) -> Result<Self, ConfigError> {
        let tree = build_tree(config)?;
        let cursor = tree
            .begin_insert(config.query.clone())
            .map_err(ConfigError::IndexBuild)?;
        Ok(MTreeInsertCursor {
            tree,
            cursor,
            stats: RunStats::with_brute_force(config.dataset.len()),
            phase: TreePhase::Start,
        })
    }

    #[must_use]
    pub fn tree(&self) -> &MTree {
        &self.tree
    }

    fn centers(&self, node: NodeId) -> BTreeSet<PointId> {
        self.tree
            .node(node)
            .map(Node::center_ids)
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    fn step(&mut self) -> Result<Step, InvariantViolation> {
        let id = self.cursor.point().id;
        let name = self.cursor.point().name();
        if self.phase == TreePhase::Start {
            self.phase = TreePhase::Insert;
            let root = self.tree.root();
            let description = format!(
                "Insert {name} into an M-Tree of height {} with {} points.",
                self.tree.height(),
                self.tree.len()
            );
            let mut step = Step::new(TREE_INIT, description).focus(id).node(root);
            step.candidates = self.centers(root);
            return Ok(step);
        }

        let Some(event) = self.tree.insert_step(&mut self.cursor)? else {
            self.phase = TreePhase::Exhausted;
            let description = format!(
                "{name} inserted. Tree height {}, {} points.",
                self.tree.height(),
                self.tree.len()
            );
            return Ok(Step::new(TREE_DONE, description)
                .result(vec![id])
                .focus(id)
                .node(self.tree.root())
                .calls(self.stats.distance_calls)
                .done());
        };

        let mut step = match event {
            InsertEvent::Routed(choice) => {
                self.stats.nodes_visited += 1;
                self.stats.distance_calls += choice.distances.len();
                let (line, description) = if choice.fits() {
                    (
                        TREE_FITS,
                        format!(
                            "Node {}: entry #{} covers {name} (d={:.2} <= r={:.2}) and has the closest pivot.",
                            choice.node, choice.pivot, choice.distance, choice.old_radius
                        ),
                    )
                } else {
                    (
                        TREE_ENLARGE,
                        format!(
                            "Node {}: no entry covers {name}; entry #{} needs the least enlargement, r {:.2} -> {:.2}.",
                            choice.node, choice.pivot, choice.old_radius, choice.distance
                        ),
                    )
                };
                let mut step = Step::new(line, description).node(choice.node);
                for (pivot, d) in &choice.distances {
                    step = step.distance(id, *pivot, *d);
                }
                step.candidates = self.centers(choice.node);
                step
            }
            InsertEvent::Placed {
                leaf,
                parent_distance,
                overflow,
            } => {
                self.stats.nodes_visited += 1;
                let state = if overflow {
                    format!("overflows its capacity of {}", self.tree.capacity())
                } else {
                    "has room".to_string()
                };
                let description =
                    format!("{name} added to leaf {leaf} (pd={parent_distance:.2}); the leaf {state}.");
                let mut step = Step::new(TREE_PLACE, description).node(leaf);
                step.candidates = self.centers(leaf);
                step
            }
            InsertEvent::Split(report) => {
                self.stats.distance_calls += report.computed;
                let line = if self.tree.node(report.node).map_or(true, Node::is_leaf) {
                    TREE_SPLIT_LEAF
                } else {
                    TREE_SPLIT_ROUTING
                };
                let grown = if report.new_root {
                    " A new root was created."
                } else {
                    ""
                };
                let description = format!(
                    "Split node {}: seeds #{} and #{} are farthest apart ({:.2}); {:?} stay, {:?} move to node {}.{grown}",
                    report.node,
                    report.seeds.0,
                    report.seeds.1,
                    report.seed_distance,
                    report.left,
                    report.right,
                    report.sibling
                );
                let mut step = Step::new(line, description).node(report.node);
                step.candidates = report.left.iter().chain(report.right.iter()).copied().collect();
                step
            }
        };
        step.focus = Some(id);
        step.distance_calls = self.stats.distance_calls;
        Ok(step)
    }
}

impl StepCursor for MTreeInsertCursor {
    fn resume(&mut self) -> Option<Result<Step, InvariantViolation>> {
        if self.phase == TreePhase::Exhausted {
            return None;
        }
        let result = self.step();
        if result.is_err() {
            self.phase = TreePhase::Exhausted;
        }
        Some(result)
    }

    fn stats(&self) -> RunStats {
        self.stats
    }
}
