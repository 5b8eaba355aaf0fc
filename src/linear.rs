use crate::{
    distance::{distance, Metric},
    error::DistanceError,
    neighbors::Neighbors,
    point::{Point, PointId},
};

/// Brute-force reference answers: one exact distance per point.
pub struct LinearScan<'a> {
    metric: Metric,
    data: &'a [Point],
}

impl<'a> LinearScan<'a> {
    #[must_use]
    pub fn new(data: &'a [Point], metric: Metric) -> Self {
        Self { metric, data }
    }

    /// Ids within `radius` of `query`, sorted.
    pub fn range(&self, query: &Point, radius: f64) -> Result<Vec<PointId>, DistanceError> {
        let mut result = Vec::new();
        for point in self.data {
            if distance(query, point, self.metric)? <= radius {
                result.push(point.id);
            }
        }
        result.sort_unstable();
        Ok(result)
    }

    /// The `k` nearest ids ordered by `(distance, id)`.
    pub fn knn(&self, query: &Point, k: usize) -> Result<Vec<PointId>, DistanceError> {
        let mut neighbors = Neighbors::new(k);
        for point in self.data {
            neighbors.offer(distance(query, point, self.metric)?, point.id);
        }
        Ok(neighbors.ids())
    }

    /// Number of distance computations a brute-force answer costs.
    #[must_use]
    pub fn cost(&self) -> usize {
        self.data.len()
    }
}
