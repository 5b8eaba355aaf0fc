use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::{
    config::PivotPolicy,
    distance::{distance, Metric},
    error::DistanceError,
    point::{Point, PointId},
};

/// Memoized pairwise distances keyed by unordered id pairs.
///
/// AESA builds it with every point as a pivot (the full matrix), LAESA with a
/// handful of pivots (one row per pivot). Distances computed after the build
/// through [`DistanceStore::get_or_compute`] are counted as exact computations.
pub struct DistanceStore {
    metric: Metric,
    pivots: Vec<PointId>,
    table: HashMap<(PointId, PointId), f64>,
    computed: usize,
}

impl DistanceStore {
    pub fn build(dataset: &[Point], pivots: &[PointId], metric: Metric) -> Result<Self, DistanceError> {
        let mut store = DistanceStore {
            metric,
            pivots: pivots.to_vec(),
            table: HashMap::new(),
            computed: 0,
        };
        for pivot_id in pivots {
            let Some(pivot) = dataset.iter().find(|p| p.id == *pivot_id) else {
                continue;
            };
            for point in dataset {
                if point.id == pivot.id || store.stored(pivot.id, point.id).is_some() {
                    continue;
                }
                let value = distance(pivot, point, metric)?;
                store.table.insert(key(pivot.id, point.id), value);
            }
        }
        Ok(store)
    }

    /// Full matrix: every dataset point acts as a pivot.
    pub fn full(dataset: &[Point], metric: Metric) -> Result<Self, DistanceError> {
        let ids = dataset.iter().map(|p| p.id).collect::<Vec<_>>();
        Self::build(dataset, &ids, metric)
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    #[must_use]
    pub fn pivots(&self) -> &[PointId] {
        &self.pivots
    }

    #[must_use]
    pub fn is_pivot(&self, id: PointId) -> bool {
        self.pivots.contains(&id)
    }

    /// Number of exact distances computed on demand since the build.
    #[must_use]
    pub fn computed(&self) -> usize {
        self.computed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[must_use]
    pub fn stored(&self, a: PointId, b: PointId) -> Option<f64> {
        if a == b {
            return Some(0.0);
        }
        self.table.get(&key(a, b)).copied()
    }

    pub fn get_or_compute(&mut self, a: &Point, b: &Point) -> Result<f64, DistanceError> {
        if let Some(value) = self.stored(a.id, b.id) {
            return Ok(value);
        }
        let value = distance(a, b, self.metric)?;
        self.table.insert(key(a.id, b.id), value);
        self.computed += 1;
        Ok(value)
    }

    /// Largest triangle-inequality bound `|d(q, p) - d(p, candidate)|` over the
    /// given pivots. Pivots whose distance to the query or to the candidate is
    /// not stored are skipped; never computes a distance.
    #[must_use]
    pub fn lower_bound(&self, query: PointId, candidate: PointId, pivots: &[PointId]) -> f64 {
        let mut bound: f64 = 0.0;
        for &pivot in pivots {
            if let (Some(to_query), Some(to_candidate)) =
                (self.stored(query, pivot), self.stored(pivot, candidate))
            {
                bound = bound.max((to_query - to_candidate).abs());
            }
        }
        bound
    }

    /// Registers a newly inserted point as a pivot (AESA keeps every point as one).
    pub fn add_pivot(&mut self, id: PointId) {
        if !self.pivots.contains(&id) {
            self.pivots.push(id);
        }
    }
}

fn key(a: PointId, b: PointId) -> (PointId, PointId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Deterministic LAESA pivot selection.
pub fn select_pivots(
    dataset: &[Point],
    count: usize,
    policy: PivotPolicy,
    metric: Metric,
) -> Result<Vec<PointId>, DistanceError> {
    let count = count.min(dataset.len());
    match policy {
        PivotPolicy::First => Ok(dataset.iter().take(count).map(|p| p.id).collect()),
        PivotPolicy::MaxSpread => {
            let Some(first) = dataset.first() else {
                return Ok(Vec::new());
            };
            let mut chosen = vec![0];
            let mut spread = dataset
                .iter()
                .map(|p| distance(first, p, metric))
                .collect::<Result<Vec<_>, _>>()?;
            while chosen.len() < count {
                let next = (0..dataset.len())
                    .filter(|i| !chosen.contains(i))
                    .max_by_key(|&i| (OrderedFloat(spread[i]), std::cmp::Reverse(dataset[i].id)));
                let Some(next) = next else {
                    break;
                };
                chosen.push(next);
                for (i, point) in dataset.iter().enumerate() {
                    let d = distance(&dataset[next], point, metric)?;
                    spread[i] = spread[i].min(d);
                }
            }
            Ok(chosen.into_iter().map(|i| dataset[i].id).collect())
        }
    }
}
