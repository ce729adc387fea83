//! Error type shared by every sirfit crate

/// Errors raised while aligning data, validating configuration, integrating
/// a model or driving the optimizer.
///
/// Optimizer non-convergence is not an error: it is reported through
/// the status attached to a fit result, never as an error.
#[derive(Debug, thiserror::Error)]
pub enum FitError {
    /// Threshold never reached, or input series that cannot be aligned
    #[error("Data alignment error: {0}")]
    DataAlignment(String),

    /// A configuration value outside its admissible domain
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The integrator could not advance the state
    #[error("Integration failure at t={t}: {reason}")]
    IntegrationFailure { t: f64, reason: String },

    /// The optimizer could not be set up or aborted with an error
    #[error("Optimizer error: {0}")]
    Optimizer(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FitError>;
