use ordered_float::OrderedFloat;

use crate::point::PointId;

/// Outcome of offering a point to a [`Neighbors`] list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    Accepted { evicted: Option<PointId> },
    Rejected,
}

/// The current `k` best candidates ordered by `(distance, id)`.
///
/// Ordering by id on equal distances keeps results identical across methods
/// that discover points in different orders.
#[derive(Clone, Debug)]
pub struct Neighbors {
    k: usize,
    items: Vec<(OrderedFloat<f64>, PointId)>,
}

impl Neighbors {
    #[must_use]
    pub fn new(k: usize) -> Self {
        Neighbors {
            k,
            items: Vec::with_capacity(k + 1),
        }
    }

    pub fn offer(&mut self, distance: f64, id: PointId) -> Offer {
        let item = (OrderedFloat(distance), id);
        if self.items.len() == self.k && self.items.last().map_or(true, |last| item >= *last) {
            return Offer::Rejected;
        }
        let position = self.items.partition_point(|x| *x < item);
        self.items.insert(position, item);
        let evicted = if self.items.len() > self.k {
            self.items.pop().map(|(_, id)| id)
        } else {
            None
        };
        Offer::Accepted { evicted }
    }

    /// Distance of the k-th candidate, infinite until `k` candidates exist.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        if self.items.len() < self.k {
            return f64::INFINITY;
        }
        self.items.last().map_or(f64::INFINITY, |(d, _)| d.0)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<PointId> {
        self.items.iter().map(|(_, id)| *id).collect()
    }

    #[must_use]
    pub fn pairs(&self) -> Vec<(PointId, f64)> {
        self.items.iter().map(|(d, id)| (*id, d.0)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
