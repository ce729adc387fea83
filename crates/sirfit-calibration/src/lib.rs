//! Fitting, projection and hospital demand for sirfit compartment models.
//!
//! ```rust,ignore
//! use sirfit_calibration::{annotate_with, fit, predict};
//! use sirfit_core::{align, ModelConfig};
//!
//! let config = ModelConfig::from_json_file("brazil.json")?;
//! let aligned = align(&confirmed, &recovered, &fatal, &config)?;
//! let result = fit(&aligned, &config)?;
//! if !result.status.converged {
//!     eprintln!("fit did not converge: {}", result.status.termination_reason);
//! }
//! let table = annotate_with(predict(&result, &aligned, &config)?, &config.hospital)?;
//! ```

pub mod calibration_problem;
pub mod estimator;
pub mod forecast;
pub mod hospital;
pub mod optimization;
pub mod progress;
pub mod rolling;
pub mod types;

pub use calibration_problem::CalibrationProblem;
pub use estimator::{calibration_parameters, fit};
pub use forecast::predict;
pub use hospital::{annotate, annotate_with};
pub use optimization::optimize;
pub use progress::ProgressObserver;
pub use rolling::rolling_fit;
pub use types::{
    CalibrationParameter, CalibrationResult, ConstraintKind, ConstraintMargin, FitResult,
    HospitalLoad, OptimizerStatus, PredictionRow, PredictionTable, RollingEntry, RollingSeries,
};
