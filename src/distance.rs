use serde::{Deserialize, Serialize};

use crate::{error::DistanceError, point::Point};

/// Minkowski-family metrics selectable per run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    L1,
    #[default]
    L2,
    L3,
    LInf,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::L1, Metric::L2, Metric::L3, Metric::LInf];

    /// Distance between two coordinate slices of equal length.
    pub fn distance(self, a: &[f64], b: &[f64]) -> Result<f64, DistanceError> {
        if a.len() != b.len() {
            return Err(DistanceError::DimensionMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        let value = match self {
            Metric::L1 => manhattan(a, b),
            Metric::L2 => euclidean(a, b),
            Metric::L3 => minkowski3(a, b),
            Metric::LInf => chebyshev(a, b),
        };
        Ok(value)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Metric::L1 => "L1",
            Metric::L2 => "L2",
            Metric::L3 => "L3",
            Metric::LInf => "L∞",
        }
    }
}

pub fn distance(a: &Point, b: &Point, metric: Metric) -> Result<f64, DistanceError> {
    metric.distance(&a.coords, &b.coords)
}

fn manhattan(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += (x - y).powi(2);
    }
    sum.sqrt()
}

fn minkowski3(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += (x - y).abs().powi(3);
    }
    sum.cbrt()
}

fn chebyshev(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .fold(0.0, |max: f64, (x, y)| max.max((x - y).abs()))
}
