pub mod node;

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet, VecDeque},
};

use log::trace;
use ordered_float::OrderedFloat;

use crate::{
    config::EngineConfig,
    distance::{distance, Metric},
    error::{ConfigError, DistanceError, InvariantViolation},
    neighbors::Neighbors,
    point::{Point, PointId},
};
use node::{DataEntry, Node, NodeId, RoutingEntry};

/// Arena-backed M-Tree.
///
/// Nodes live in `nodes` and refer to their children by index. Parents are
/// never stored; insertion remembers the path it descended instead.
pub struct MTree {
    capacity: usize,
    max_height: usize,
    metric: Metric,
    root: NodeId,
    height: usize,
    nodes: Vec<Node>,
    ids: HashSet<PointId>,
}

/// Resumable state of one insertion.
#[derive(Clone, Debug)]
pub struct InsertCursor {
    point: Point,
    node: NodeId,
    parent_distance: f64,
    path: Vec<(NodeId, usize)>,
    /// Covering radii before descent enlarged them, restored on failure.
    enlarged: Vec<(NodeId, usize, f64)>,
    phase: InsertPhase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InsertPhase {
    Descend,
    Split(NodeId),
    Done,
}

impl InsertCursor {
    #[must_use]
    pub fn point(&self) -> &Point {
        &self.point
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.phase == InsertPhase::Done
    }

    /// Node the next step will work on.
    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        match self.phase {
            InsertPhase::Descend => Some(self.node),
            InsertPhase::Split(node) => Some(node),
            InsertPhase::Done => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteChoice {
    pub node: NodeId,
    pub entry: usize,
    pub pivot: PointId,
    /// Distance from the inserted point to every pivot of the node, in entry order.
    pub distances: Vec<(PointId, f64)>,
    pub distance: f64,
    pub old_radius: f64,
    pub enlargement: f64,
}

impl RouteChoice {
    #[must_use]
    pub fn fits(&self) -> bool {
        self.enlargement <= 0.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SplitReport {
    pub node: NodeId,
    pub sibling: NodeId,
    pub seeds: (PointId, PointId),
    pub seed_distance: f64,
    pub left: Vec<PointId>,
    pub right: Vec<PointId>,
    pub new_root: bool,
    /// Exact distances the split computed.
    pub computed: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InsertEvent {
    Routed(RouteChoice),
    Placed {
        leaf: NodeId,
        parent_distance: f64,
        overflow: bool,
    },
    Split(SplitReport),
}

impl MTree {
    pub fn new(capacity: usize, max_height: usize, metric: Metric) -> Result<Self, ConfigError> {
        if capacity < 2 {
            return Err(ConfigError::InvalidCapacity(capacity));
        }
        if max_height == 0 {
            return Err(ConfigError::InvalidMaxHeight);
        }
        Ok(MTree {
            capacity,
            max_height,
            metric,
            root: 0,
            height: 1,
            nodes: vec![Node::leaf()],
            ids: HashSet::new(),
        })
    }

    pub fn from_config(config: &EngineConfig, metric: Metric) -> Result<Self, ConfigError> {
        Self::new(config.capacity, config.max_height, metric)
    }

    pub fn insert(&mut self, point: Point) -> Result<(), InvariantViolation> {
        let mut cursor = self.begin_insert(point)?;
        while self.insert_step(&mut cursor)?.is_some() {}
        Ok(())
    }

    pub fn begin_insert(&self, point: Point) -> Result<InsertCursor, InvariantViolation> {
        if self.ids.contains(&point.id) {
            return Err(InvariantViolation::DuplicateId(point.id));
        }
        Ok(InsertCursor {
            point,
            node: self.root,
            parent_distance: 0.0,
            path: Vec::new(),
            enlarged: Vec::new(),
            phase: InsertPhase::Descend,
        })
    }

    /// Performs one unit of an insertion: a routing decision, the leaf
    /// placement, or one split. Returns `None` once the insertion is complete.
    pub fn insert_step(
        &mut self,
        cursor: &mut InsertCursor,
    ) -> Result<Option<InsertEvent>, InvariantViolation> {
        match cursor.phase {
            InsertPhase::Done => Ok(None),
            InsertPhase::Descend => {
                if self.nodes[cursor.node].is_leaf() {
                    Ok(Some(self.place(cursor)?))
                } else {
                    let choice = self.route(cursor)?;
                    Ok(Some(InsertEvent::Routed(choice)))
                }
            }
            InsertPhase::Split(node) => {
                let report = self.split(cursor, node)?;
                Ok(Some(InsertEvent::Split(report)))
            }
        }
    }

    fn route(&mut self, cursor: &mut InsertCursor) -> Result<RouteChoice, InvariantViolation> {
        let node = cursor.node;
        let Node::Routing(entries) = &mut self.nodes[node] else {
            unreachable!("route is only called on routing nodes");
        };

        let mut distances = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            let d = distance(&cursor.point, &entry.pivot, self.metric)?;
            distances.push((entry.pivot.id, d));
        }

        // Closest covering pivot if one exists, otherwise the least enlargement.
        let covering = (0..entries.len())
            .filter(|&i| distances[i].1 <= entries[i].covering_radius)
            .min_by_key(|&i| (OrderedFloat(distances[i].1), i));
        let best = covering.unwrap_or_else(|| {
            (0..entries.len())
                .min_by_key(|&i| {
                    let enlargement = distances[i].1 - entries[i].covering_radius;
                    (
                        OrderedFloat(enlargement),
                        OrderedFloat(entries[i].covering_radius),
                        i,
                    )
                })
                .unwrap_or(0)
        });

        let entry = &mut entries[best];
        let d = distances[best].1;
        let old_radius = entry.covering_radius;
        entry.covering_radius = old_radius.max(d);
        cursor.enlarged.push((node, best, old_radius));

        let choice = RouteChoice {
            node,
            entry: best,
            pivot: entry.pivot.id,
            distances,
            distance: d,
            old_radius,
            enlargement: (d - old_radius).max(0.0),
        };
        trace!(
            "insert {}: node {} -> entry {} (d={:.3}, +{:.3})",
            cursor.point.id,
            node,
            best,
            d,
            choice.enlargement
        );

        cursor.path.push((node, best));
        cursor.parent_distance = d;
        cursor.node = entry.child;
        Ok(choice)
    }

    fn place(&mut self, cursor: &mut InsertCursor) -> Result<InsertEvent, InvariantViolation> {
        let leaf = cursor.node;
        if self.outgrows(leaf, &cursor.path) {
            self.restore_radii(cursor);
            cursor.phase = InsertPhase::Done;
            return Err(InvariantViolation::HeightExceeded {
                max: self.max_height,
            });
        }
        let parent_distance = if cursor.path.is_empty() {
            0.0
        } else {
            cursor.parent_distance
        };
        let Node::Leaf(entries) = &mut self.nodes[leaf] else {
            unreachable!("place is only called on leaves");
        };
        entries.push(DataEntry {
            point: cursor.point.clone(),
            parent_distance,
        });
        let overflow = entries.len() > self.capacity;
        self.ids.insert(cursor.point.id);

        cursor.phase = if overflow {
            InsertPhase::Split(leaf)
        } else {
            InsertPhase::Done
        };
        Ok(InsertEvent::Placed {
            leaf,
            parent_distance,
            overflow,
        })
    }

    /// Whether adding an entry to `leaf` would split every node up to a root
    /// that can no longer grow.
    fn outgrows(&self, leaf: NodeId, path: &[(NodeId, usize)]) -> bool {
        self.height >= self.max_height
            && self.nodes[leaf].len() >= self.capacity
            && path
                .iter()
                .all(|&(node, _)| self.nodes[node].len() >= self.capacity)
    }

    fn restore_radii(&mut self, cursor: &mut InsertCursor) {
        for (node, slot, radius) in cursor.enlarged.drain(..).rev() {
            if let Node::Routing(entries) = &mut self.nodes[node] {
                entries[slot].covering_radius = radius;
            }
        }
    }

    fn split(
        &mut self,
        cursor: &mut InsertCursor,
        node: NodeId,
    ) -> Result<SplitReport, InvariantViolation> {
        let parent = cursor.path.pop();
        if parent.is_none() && self.height >= self.max_height {
            cursor.phase = InsertPhase::Done;
            return Err(InvariantViolation::HeightExceeded {
                max: self.max_height,
            });
        }

        // Pairwise distances between entry centers
        let centers = self.nodes[node]
            .centers()
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        let n = centers.len();
        let mut matrix = vec![vec![0.0; n]; n];
        let mut computed = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                let d = distance(&centers[i], &centers[j], self.metric)?;
                matrix[i][j] = d;
                matrix[j][i] = d;
                computed += 1;
            }
        }

        // Farthest pair promotion
        let mut seeds = (0, 1);
        for i in 0..n {
            for j in (i + 1)..n {
                if matrix[i][j] > matrix[seeds.0][seeds.1] {
                    seeds = (i, j);
                }
            }
        }
        let (a, b) = seeds;
        let goes_left = (0..n)
            .map(|i| i == a || (i != b && matrix[i][a] <= matrix[i][b]))
            .collect::<Vec<_>>();

        let (left_node, right_node, radius_a, radius_b) =
            match std::mem::take(&mut self.nodes[node]) {
                Node::Leaf(entries) => {
                    let (mut left, mut right) = (Vec::new(), Vec::new());
                    let (mut ra, mut rb): (f64, f64) = (0.0, 0.0);
                    for (i, mut entry) in entries.into_iter().enumerate() {
                        if goes_left[i] {
                            entry.parent_distance = matrix[i][a];
                            ra = ra.max(entry.parent_distance);
                            left.push(entry);
                        } else {
                            entry.parent_distance = matrix[i][b];
                            rb = rb.max(entry.parent_distance);
                            right.push(entry);
                        }
                    }
                    (Node::Leaf(left), Node::Leaf(right), ra, rb)
                }
                Node::Routing(entries) => {
                    let (mut left, mut right) = (Vec::new(), Vec::new());
                    let (mut ra, mut rb): (f64, f64) = (0.0, 0.0);
                    for (i, mut entry) in entries.into_iter().enumerate() {
                        if goes_left[i] {
                            entry.parent_distance = matrix[i][a];
                            ra = ra.max(entry.parent_distance + entry.covering_radius);
                            left.push(entry);
                        } else {
                            entry.parent_distance = matrix[i][b];
                            rb = rb.max(entry.parent_distance + entry.covering_radius);
                            right.push(entry);
                        }
                    }
                    (Node::Routing(left), Node::Routing(right), ra, rb)
                }
            };

        let left_ids = left_node.center_ids();
        let right_ids = right_node.center_ids();
        self.nodes[node] = left_node;
        let sibling = self.add_slot(right_node);

        let mut promoted_a = RoutingEntry {
            pivot: centers[a].clone(),
            covering_radius: radius_a,
            parent_distance: 0.0,
            child: node,
        };
        let mut promoted_b = RoutingEntry {
            pivot: centers[b].clone(),
            covering_radius: radius_b,
            parent_distance: 0.0,
            child: sibling,
        };

        let new_root = parent.is_none();
        match parent {
            Some((parent, slot)) => {
                // The pivot above the parent, if the parent is not the root
                if let Some(&(grand, grand_slot)) = cursor.path.last() {
                    if let Node::Routing(entries) = &self.nodes[grand] {
                        let pivot = &entries[grand_slot].pivot;
                        promoted_a.parent_distance = distance(&promoted_a.pivot, pivot, self.metric)?;
                        promoted_b.parent_distance = distance(&promoted_b.pivot, pivot, self.metric)?;
                        computed += 2;
                    }
                }
                let Node::Routing(entries) = &mut self.nodes[parent] else {
                    unreachable!("parents on the insertion path are routing nodes");
                };
                entries[slot] = promoted_a;
                entries.push(promoted_b);
                cursor.phase = if entries.len() > self.capacity {
                    InsertPhase::Split(parent)
                } else {
                    InsertPhase::Done
                };
            }
            None => {
                self.root = self.add_slot(Node::Routing(vec![promoted_a, promoted_b]));
                self.height += 1;
                cursor.phase = InsertPhase::Done;
            }
        }

        trace!(
            "split node {} into {} and {} (seeds {} / {})",
            node,
            node,
            sibling,
            centers[a].id,
            centers[b].id
        );

        Ok(SplitReport {
            node,
            sibling,
            seeds: (centers[a].id, centers[b].id),
            seed_distance: matrix[a][b],
            left: left_ids,
            right: right_ids,
            new_root,
            computed,
        })
    }

    fn add_slot(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: PointId) -> bool {
        self.ids.contains(&id)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// All points stored below `node`.
    #[must_use]
    pub fn subtree_points(&self, node: NodeId) -> Vec<&Point> {
        let mut points = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            match &self.nodes[id] {
                Node::Leaf(entries) => points.extend(entries.iter().map(|e| &e.point)),
                Node::Routing(entries) => stack.extend(entries.iter().map(|e| e.child)),
            }
        }
        points
    }

    /// Finds a routing entry whose covering radius under-reports its subtree.
    pub fn check_covering(&self) -> Result<Option<(NodeId, usize)>, DistanceError> {
        for (id, node) in self.nodes.iter().enumerate() {
            let Node::Routing(entries) = node else {
                continue;
            };
            for (slot, entry) in entries.iter().enumerate() {
                for point in self.subtree_points(entry.child) {
                    let d = distance(&entry.pivot, point, self.metric)?;
                    if d > entry.covering_radius + 1e-9 {
                        return Ok(Some((id, slot)));
                    }
                }
            }
        }
        Ok(None)
    }

    /// All points within `radius` of `query`, sorted by id.
    pub fn range(&self, query: &Point, radius: f64) -> Result<Vec<(PointId, f64)>, DistanceError> {
        let mut result = Vec::new();
        let mut stack = vec![(self.root, None::<f64>)];
        while let Some((node_id, to_parent)) = stack.pop() {
            match &self.nodes[node_id] {
                Node::Leaf(entries) => {
                    for entry in entries {
                        if let Some(dp) = to_parent {
                            if (dp - entry.parent_distance).abs() > radius {
                                continue;
                            }
                        }
                        let d = distance(query, &entry.point, self.metric)?;
                        if d <= radius {
                            result.push((entry.point.id, d));
                        }
                    }
                }
                Node::Routing(entries) => {
                    for entry in entries {
                        let reach = radius + entry.covering_radius;
                        if let Some(dp) = to_parent {
                            if (dp - entry.parent_distance).abs() > reach {
                                continue;
                            }
                        }
                        let d = distance(query, &entry.pivot, self.metric)?;
                        if d <= reach {
                            stack.push((entry.child, Some(d)));
                        }
                    }
                }
            }
        }
        result.sort_by_key(|&(id, _)| id);
        Ok(result)
    }

    /// The `k` nearest points ordered by `(distance, id)`.
    pub fn knn(&self, query: &Point, k: usize) -> Result<Vec<(PointId, f64)>, DistanceError> {
        let mut neighbors = Neighbors::new(k);
        let mut frontier = BinaryHeap::new();
        let mut pushed = 0_usize;
        frontier.push(Reverse((OrderedFloat(0.0), pushed, self.root, None::<OrderedFloat<f64>>)));

        while let Some(Reverse((dmin, _, node_id, to_parent))) = frontier.pop() {
            if dmin.0 > neighbors.threshold() {
                break;
            }
            match &self.nodes[node_id] {
                Node::Leaf(entries) => {
                    for entry in entries {
                        if let Some(dp) = to_parent {
                            if (dp.0 - entry.parent_distance).abs() > neighbors.threshold() {
                                continue;
                            }
                        }
                        let d = distance(query, &entry.point, self.metric)?;
                        neighbors.offer(d, entry.point.id);
                    }
                }
                Node::Routing(entries) => {
                    for entry in entries {
                        let reach = neighbors.threshold() + entry.covering_radius;
                        if let Some(dp) = to_parent {
                            if (dp.0 - entry.parent_distance).abs() > reach {
                                continue;
                            }
                        }
                        let d = distance(query, &entry.pivot, self.metric)?;
                        let lower = (d - entry.covering_radius).max(0.0);
                        if lower <= neighbors.threshold() {
                            pushed += 1;
                            frontier.push(Reverse((
                                OrderedFloat(lower),
                                pushed,
                                entry.child,
                                Some(OrderedFloat(d)),
                            )));
                        }
                    }
                }
            }
        }
        Ok(neighbors.pairs())
    }

    /// One text row per node, root first, level by level.
    #[must_use]
    pub fn rows(&self) -> Vec<String> {
        let mut rows = Vec::new();
        let mut queue = VecDeque::from(vec![(self.root, 0_usize)]);
        while let Some((id, depth)) = queue.pop_front() {
            let node = &self.nodes[id];
            rows.push(format!("{}{}: {}", "  ".repeat(depth), id, node));
            if let Node::Routing(entries) = node {
                queue.extend(entries.iter().map(|e| (e.child, depth + 1)));
            }
        }
        rows
    }
}
