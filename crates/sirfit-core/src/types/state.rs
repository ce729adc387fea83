use serde::{Deserialize, Serialize};

/// Compartment populations at one instant, in the order given by the model's
/// compartment names (e.g. `[S, I, R]` or `[S, I, H, R, F]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompartmentState(Vec<f64>);

impl CompartmentState {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Total population across compartments; conserved by every model
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for CompartmentState {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}
