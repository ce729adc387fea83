use serde::{Deserialize, Serialize};

/// Compartment values at unit-spaced evaluation points `t = 0, 1, 2, ...`
///
/// Row `k` holds the state at `t = k`, one column per compartment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    rows: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    /// Number of evaluation points
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, t: usize) -> Option<&[f64]> {
        self.rows.get(t).map(Vec::as_slice)
    }

    pub fn last(&self) -> Option<&[f64]> {
        self.rows.last().map(Vec::as_slice)
    }

    /// One compartment over time
    pub fn column(&self, compartment: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[compartment]).collect()
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }
}
