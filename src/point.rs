use serde::{Deserialize, Serialize};

pub type PointId = u32;

/// A dataset point. Coordinates never change after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub label: Option<String>,
    pub coords: Vec<f64>,
}

impl Point {
    #[must_use]
    pub fn new(id: PointId, coords: Vec<f64>) -> Point {
        Point {
            id,
            label: None,
            coords,
        }
    }

    #[must_use]
    pub fn labeled(id: PointId, label: &str, coords: Vec<f64>) -> Point {
        Point {
            id,
            label: Some(label.to_string()),
            coords,
        }
    }

    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.coords.len()
    }

    /// Label if one was given, the id otherwise.
    #[must_use]
    pub fn name(&self) -> String {
        self.label.clone().unwrap_or_else(|| format!("#{}", self.id))
    }
}
