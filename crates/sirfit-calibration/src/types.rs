//! Type definitions for calibration

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sirfit_core::{Bounds, ModelKind, Parameter};

/// Parameter to be calibrated with its bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameter {
    pub parameter: Parameter,

    /// Minimum allowed value
    pub min_bound: f64,

    /// Maximum allowed value
    pub max_bound: f64,

    /// Optional initial guess (if None, the midpoint of the bounds is used)
    pub initial_guess: Option<f64>,
}

impl CalibrationParameter {
    pub fn new(parameter: Parameter, (min_bound, max_bound): Bounds) -> Self {
        Self {
            parameter,
            min_bound,
            max_bound,
            initial_guess: None,
        }
    }

    pub fn with_initial_guess(mut self, guess: f64) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    /// The initial guess moved inside the bounds, or the midpoint of the bounds
    pub fn initial_value(&self) -> f64 {
        self.initial_guess
            .map(|guess| self.clamp(guess))
            .unwrap_or_else(|| (self.min_bound + self.max_bound) / 2.0)
    }

    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min_bound && value <= self.max_bound
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min_bound, self.max_bound)
    }

    /// Width of the admissible interval; zero for a pinned parameter
    pub fn range(&self) -> f64 {
        self.max_bound - self.min_bound
    }
}

/// Derived quantity restricted by an admissible interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    R0Lower,
    R0Upper,
    GammaLower,
    GammaUpper,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintKind::R0Lower => write!(f, "R0 >= lower"),
            ConstraintKind::R0Upper => write!(f, "R0 <= upper"),
            ConstraintKind::GammaLower => write!(f, "gamma >= lower"),
            ConstraintKind::GammaUpper => write!(f, "gamma <= upper"),
        }
    }
}

/// Signed distance from a constraint boundary; negative when violated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintMargin {
    pub kind: ConstraintKind,
    pub margin: f64,
}

/// How the optimizer stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerStatus {
    /// Whether the solver met its own convergence criterion (or the target cost)
    pub converged: bool,

    /// Number of iterations performed
    pub iterations: u64,

    pub termination_reason: String,
}

/// Result from a calibration run, before it is attached to a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Best parameter values found
    pub best_parameters: Vec<f64>,

    /// Parameter names (in same order as best_parameters)
    pub parameter_names: Vec<String>,

    /// Final value of the penalized objective
    pub final_loss: f64,

    pub status: OptimizerStatus,
}

/// A fitted model: parameters, achieved loss and derived quantities.
///
/// Always check [`status`](Self::status) before trusting the parameters; an
/// unconverged fit still carries the best point found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,

    /// Parameter names, in parameter-vector order
    pub parameter_names: Vec<String>,

    pub parameters: Vec<f64>,

    /// Weighted RMSE at the fitted point (without constraint penalty)
    pub loss: f64,

    /// Implied reproduction number β / effective γ
    pub r0: f64,

    pub effective_gamma: f64,

    pub constraint_margins: Vec<ConstraintMargin>,

    pub status: OptimizerStatus,
}

impl FitResult {
    /// Get parameters as a HashMap for easy lookup
    pub fn parameters_map(&self) -> HashMap<String, f64> {
        self.parameter_names
            .iter()
            .zip(self.parameters.iter())
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameter_names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.parameters[idx])
    }

    /// `true` when no constraint margin is negative beyond `tolerance`
    pub fn is_feasible(&self, tolerance: f64) -> bool {
        self.constraint_margins
            .iter()
            .all(|m| m.margin >= -tolerance)
    }
}

/// Daily hospital bed flows derived from new infections
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HospitalLoad {
    pub admissions: f64,
    pub discharges: f64,
    pub occupancy: f64,
}

/// One date of a prediction table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub date: NaiveDate,

    /// Observed values, `None` past the last observed date
    pub actual: Vec<Option<f64>>,

    /// Simulated values, one per compartment column
    pub simulated: Vec<f64>,

    pub hospital: Option<HospitalLoad>,
}

impl PredictionRow {
    pub fn new(date: NaiveDate, actual: Vec<Option<f64>>, simulated: Vec<f64>) -> Self {
        Self {
            date,
            actual,
            simulated,
            hospital: None,
        }
    }
}

/// Date-indexed actual and simulated values over the fit window plus horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionTable {
    /// Names of the simulated columns
    pub columns: Vec<String>,

    /// Names of the observed columns
    pub actual_columns: Vec<String>,

    pub rows: Vec<PredictionRow>,
}

impl PredictionTable {
    pub fn new(columns: Vec<String>, actual_columns: Vec<String>, rows: Vec<PredictionRow>) -> Self {
        Self {
            columns,
            actual_columns,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|row| row.date).collect()
    }

    /// Simulated values of one column over all dates
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row.simulated[idx]).collect())
    }

    /// Observed values of one column over all dates
    pub fn actual_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.actual_columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row.actual[idx]).collect())
    }

    /// Last date carrying an observation
    pub fn last_observed_date(&self) -> Option<NaiveDate> {
        self.rows
            .iter()
            .rev()
            .find(|row| row.actual.iter().any(Option::is_some))
            .map(|row| row.date)
    }

    pub fn occupancy(&self) -> Option<Vec<f64>> {
        self.rows
            .iter()
            .map(|row| row.hospital.map(|load| load.occupancy))
            .collect()
    }
}

/// One walk-forward fit, keyed by the last date it saw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingEntry {
    pub date: NaiveDate,
    pub fit: FitResult,
}

/// Fits over growing prefixes of the observed series, in date order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingSeries {
    pub entries: Vec<RollingEntry>,
}

impl RollingSeries {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.entries.iter().map(|entry| entry.date).collect()
    }

    /// How one fitted parameter evolves over the cutoff dates
    pub fn parameter_series(&self, name: &str) -> Vec<(NaiveDate, f64)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.fit.parameter(name).map(|value| (entry.date, value)))
            .collect()
    }

    pub fn r0_series(&self) -> Vec<(NaiveDate, f64)> {
        self.entries
            .iter()
            .map(|entry| (entry.date, entry.fit.r0))
            .collect()
    }
}
