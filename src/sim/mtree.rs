//! M-Tree range and kNN search, best first.
//!
//! ```text
//! 0  frontier <- {root}; threshold <- r (range) or inf (kNN)
//! 1  while frontier is not empty: N <- pop the entry with the smallest dmin
//! 2      if dmin(N) > threshold: prune N
//! 3      for each entry e of N
//! 4          if |d(q, parent) - e.pd| - e.r > threshold: prune e
//! 5          compute d(q, e)
//! 6          leaf: update the result with e
//! 7          routing: if d(q, e) - e.r <= threshold push e.child, else prune
//! 8  return result
//! ```

use std::{cmp::Reverse, collections::BinaryHeap};

use ordered_float::OrderedFloat;

use crate::{
    distance::distance,
    error::{ConfigError, InvariantViolation},
    mtree::{
        node::{Node, NodeId},
        MTree,
    },
    point::{Point, PointId},
    stats::RunStats,
};

use super::{
    step::Step,
    tally::{fmt_threshold, Goal, Tally},
    RunConfig, StepCursor,
};

pub const SEARCH_LINES: usize = 9;

const INIT: usize = 0;
const VISIT: usize = 1;
const PRUNE_NODE: usize = 2;
const PRUNE_ENTRY: usize = 4;
const LEAF_ENTRY: usize = 6;
const ROUTING_ENTRY: usize = 7;
const RETURN: usize = 8;

/// Builds the tree a run starts from by inserting the dataset in order.
pub(crate) fn build_tree(config: &RunConfig) -> Result<MTree, ConfigError> {
    let mut tree = MTree::from_config(&config.engine, config.metric)?;
    for point in &config.dataset {
        tree.insert(point.clone()).map_err(|violation| match violation {
            InvariantViolation::HeightExceeded { max } => ConfigError::MaxHeightTooSmall {
                max_height: max,
                points: config.dataset.len(),
            },
            violation => ConfigError::IndexBuild(violation),
        })?;
    }
    Ok(tree)
}

/// Frontier item: `(dmin, push order, node, d(q, pivot above node))`.
type Pending = Reverse<(OrderedFloat<f64>, usize, NodeId, Option<OrderedFloat<f64>>)>;

#[derive(Clone, Copy, Debug)]
struct Open {
    node: NodeId,
    to_parent: Option<f64>,
    next: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Search,
    Exhausted,
}

pub struct MTreeSearchCursor {
    query: Point,
    tree: MTree,
    frontier: BinaryHeap<Pending>,
    pushed: usize,
    open: Option<Open>,
    tally: Tally,
    phase: Phase,
}

impl MTreeSearchCursor {
    pub fn new(config: &RunConfig) -> Result<Self, ConfigError> {
        let tree = build_tree(config)?;
        let tally = Tally::new(config.dataset.iter().map(|p| p.id), Goal::new(&config.operation));
        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse((OrderedFloat(0.0), 0, tree.root(), None)));
        Ok(MTreeSearchCursor {
            query: config.query.clone(),
            tree,
            frontier,
            pushed: 1,
            open: None,
            tally,
            phase: Phase::Start,
        })
    }

    #[must_use]
    pub fn tree(&self) -> &MTree {
        &self.tree
    }

    fn start(&mut self) -> Step {
        self.phase = Phase::Search;
        let description = format!(
            "M-Tree of height {} over {} points, capacity {}. Threshold is the {}.",
            self.tree.height(),
            self.tree.len(),
            self.tree.capacity(),
            self.tally.goal().describe()
        );
        self.tally.stamp(Step::new(INIT, description).node(self.tree.root()))
    }

    fn search(&mut self) -> Result<Step, InvariantViolation> {
        if let Some(open) = self.open {
            let len = self.tree.node(open.node).map_or(0, Node::len);
            if open.next < len {
                self.open = Some(Open {
                    next: open.next + 1,
                    ..open
                });
                return self.examine(open);
            }
            self.open = None;
        }

        let Some(Reverse((dmin, _, node, to_parent))) = self.frontier.pop() else {
            return Ok(self.finish());
        };
        let dmin = dmin.0;
        let threshold = self.tally.threshold();
        if dmin > threshold {
            let pruned = self.prune_subtree(node);
            let description = format!(
                "Node {node}: dmin {dmin:.2} > {}, {pruned} points pruned.",
                fmt_threshold(threshold)
            );
            let step = Step::new(PRUNE_NODE, description)
                .bound(dmin)
                .threshold(threshold)
                .node(node);
            return Ok(self.tally.stamp(step));
        }

        self.tally.stats.nodes_visited += 1;
        self.open = Some(Open {
            node,
            to_parent: to_parent.map(|d| d.0),
            next: 0,
        });
        let kind = if self.tree.node(node).map_or(true, Node::is_leaf) {
            "leaf"
        } else {
            "routing node"
        };
        let description = format!(
            "Visit {kind} {node}: dmin {dmin:.2} <= {}.",
            fmt_threshold(threshold)
        );
        let step = Step::new(VISIT, description)
            .bound(dmin)
            .threshold(threshold)
            .node(node);
        Ok(self.tally.stamp(step))
    }

    fn examine(&mut self, open: Open) -> Result<Step, InvariantViolation> {
        let threshold = self.tally.threshold();
        let metric = self.tree.metric();
        let Some(node) = self.tree.node(open.node) else {
            return Ok(self.finish());
        };

        match node {
            Node::Leaf(entries) => {
                let entry = &entries[open.next];
                let id = entry.point.id;
                let name = entry.point.name();
                let parent_bound = open
                    .to_parent
                    .map(|dp| (dp - entry.parent_distance).abs());
                if let Some(bound) = parent_bound.filter(|&b| b > threshold) {
                    self.tally.eliminate_by_bound(id);
                    let description = format!(
                        "{name}: |d(q, parent) - {:.2}| = {bound:.2} > {}, pruned without a distance.",
                        entry.parent_distance,
                        fmt_threshold(threshold)
                    );
                    let step = Step::new(PRUNE_ENTRY, description)
                        .bound(bound)
                        .threshold(threshold)
                        .focus(id)
                        .node(open.node);
                    return Ok(self.tally.stamp(step));
                }

                let d = distance(&self.query, &entry.point, metric)?;
                self.tally.stats.distance_calls += 1;
                let accepted = self.tally.consider(id, d)?;
                let verdict = if accepted { "kept" } else { "rejected" };
                let description = format!("{name}: d(q, {name}) = {d:.2}, {verdict}.");
                let mut step = Step::new(LEAF_ENTRY, description)
                    .distance(self.query.id, id, d)
                    .threshold(threshold)
                    .focus(id)
                    .node(open.node);
                if let Some(bound) = parent_bound {
                    step = step.bound(bound);
                }
                Ok(self.tally.stamp(step))
            }
            Node::Routing(entries) => {
                let entry = &entries[open.next];
                let pivot = entry.pivot.id;
                let name = entry.pivot.name();
                let radius = entry.covering_radius;
                let child = entry.child;
                let parent_bound = open
                    .to_parent
                    .map(|dp| ((dp - entry.parent_distance).abs() - radius).max(0.0));
                if let Some(bound) = parent_bound.filter(|&b| b > threshold) {
                    let parent_distance = entry.parent_distance;
                    let pruned = self.prune_subtree(child);
                    let description = format!(
                        "Entry {name} (r={radius:.2}, pd={parent_distance:.2}): parent bound {bound:.2} > {}, {pruned} points pruned without a distance.",
                        fmt_threshold(threshold)
                    );
                    let step = Step::new(PRUNE_ENTRY, description)
                        .bound(bound)
                        .threshold(threshold)
                        .focus(pivot)
                        .node(child);
                    return Ok(self.tally.stamp(step));
                }

                let d = distance(&self.query, &entry.pivot, metric)?;
                self.tally.stats.distance_calls += 1;
                let dmin = (d - radius).max(0.0);
                let step = if dmin > threshold {
                    let pruned = self.prune_subtree(child);
                    let description = format!(
                        "Entry {name}: d(q, {name}) = {d:.2}, dmin {dmin:.2} > {}, {pruned} points pruned.",
                        fmt_threshold(threshold)
                    );
                    Step::new(ROUTING_ENTRY, description)
                } else {
                    self.frontier.push(Reverse((
                        OrderedFloat(dmin),
                        self.pushed,
                        child,
                        Some(OrderedFloat(d)),
                    )));
                    self.pushed += 1;
                    let description = format!(
                        "Entry {name}: d(q, {name}) = {d:.2}, dmin {dmin:.2} <= {}, node {child} queued.",
                        fmt_threshold(threshold)
                    );
                    Step::new(ROUTING_ENTRY, description)
                };
                let step = step
                    .distance(self.query.id, pivot, d)
                    .bound(dmin)
                    .threshold(threshold)
                    .focus(pivot)
                    .node(child);
                Ok(self.tally.stamp(step))
            }
        }
    }

    /// Eliminates every still pending point below `node`.
    fn prune_subtree(&mut self, node: NodeId) -> usize {
        self.tally.stats.nodes_pruned += 1;
        let ids = self
            .tree
            .subtree_points(node)
            .into_iter()
            .map(|p| p.id)
            .collect::<Vec<PointId>>();
        let mut pruned = 0;
        for id in ids {
            if self.tally.is_pending(id) {
                self.tally.eliminate_by_bound(id);
                pruned += 1;
            }
        }
        pruned
    }

    fn finish(&mut self) -> Step {
        self.phase = Phase::Exhausted;
        let description = format!(
            "Frontier empty. {} nodes visited, {} subtrees pruned, {} exact distances.",
            self.tally.stats.nodes_visited,
            self.tally.stats.nodes_pruned,
            self.tally.stats.distance_calls
        );
        self.tally.stamp(Step::new(RETURN, description)).done()
    }
}

impl StepCursor for MTreeSearchCursor {
    fn resume(&mut self) -> Option<Result<Step, InvariantViolation>> {
        let result = match self.phase {
            Phase::Exhausted => return None,
            Phase::Start => Ok(self.start()),
            Phase::Search => self.search(),
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
