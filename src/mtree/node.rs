use std::fmt;

use serde::Serialize;

use crate::point::{Point, PointId};

pub type NodeId = usize;

#[derive(Clone, Debug, Serialize)]
pub struct RoutingEntry {
    pub pivot: Point,
    pub covering_radius: f64,
    /// Distance from `pivot` to the pivot of the entry pointing at this node,
    /// `0.0` in the root.
    pub parent_distance: f64,
    pub child: NodeId,
}

#[derive(Clone, Debug, Serialize)]
pub struct DataEntry {
    pub point: Point,
    pub parent_distance: f64,
}

#[derive(Clone, Debug, Serialize)]
pub enum Node {
    Routing(Vec<RoutingEntry>),
    Leaf(Vec<DataEntry>),
}

impl Node {
    #[must_use]
    pub fn leaf() -> Node {
        Node::Leaf(Vec::new())
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Node::Routing(entries) => entries.len(),
            Node::Leaf(entries) => entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The point each entry is centered on: pivots for routing entries,
    /// the stored points for leaf entries.
    #[must_use]
    pub fn centers(&self) -> Vec<&Point> {
        match self {
            Node::Routing(entries) => entries.iter().map(|e| &e.pivot).collect(),
            Node::Leaf(entries) => entries.iter().map(|e| &e.point).collect(),
        }
    }

    #[must_use]
    pub fn center_ids(&self) -> Vec<PointId> {
        self.centers().iter().map(|p| p.id).collect()
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::leaf()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Routing(entries) => {
                write!(f, "routing")?;
                for entry in entries {
                    write!(
                        f,
                        " [{} r={:.2} pd={:.2} -> {}]",
                        entry.pivot.name(),
                        entry.covering_radius,
                        entry.parent_distance,
                        entry.child
                    )?;
                }
            }
            Node::Leaf(entries) => {
                write!(f, "leaf")?;
                for entry in entries {
                    write!(f, " [{} pd={:.2}]", entry.point.name(), entry.parent_distance)?;
                }
            }
        }
        Ok(())
    }
}
