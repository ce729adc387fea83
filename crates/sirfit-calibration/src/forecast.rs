//! Forward projection of a fitted model

use sirfit_core::{AlignedSeries, CompartmentModel, FitError, ModelConfig, Result};
use sirfit_ode::simulate;

use crate::types::{FitResult, PredictionRow, PredictionTable};

/// Project `fit` over the observed window plus `config.horizon` days.
///
/// The table starts on the first aligned date and has one row per day;
/// observed cells are `None` after the last aligned date. Integration starts
/// from the same initial state the estimator used, so the fit window of the
/// table reproduces the fitted trajectory. Calling this twice with the same
/// inputs yields identical tables.
pub fn predict(
    fit: &FitResult,
    aligned: &AlignedSeries,
    config: &ModelConfig,
) -> Result<PredictionTable> {
    let first_date = aligned.first_date().ok_or_else(|| {
        FitError::DataAlignment(format!("{}: no observations to project from", config.entity))
    })?;

    let model = CompartmentModel::for_series(config, aligned);
    if model.kind() != fit.model || model.parameter_count() != fit.parameters.len() {
        return Err(FitError::InvalidConfig(format!(
            "fit is for {} with {} parameters but the configuration builds {} with {}",
            fit.model,
            fit.parameters.len(),
            model.kind(),
            model.parameter_count()
        )));
    }

    let observed = aligned.len();
    let size = observed + config.horizon;
    let initial = model.initial_state(aligned, &fit.parameters)?;
    let trajectory = simulate(&model, &initial, &fit.parameters, size, &config.integrator)?;

    let observables = model.observables();
    let actual_series: Vec<Vec<f64>> = observables.iter().map(|o| o.actual(aligned)).collect();

    let rows = first_date
        .iter_days()
        .zip(trajectory.rows())
        .enumerate()
        .map(|(t, (date, state))| {
            let actual = actual_series
                .iter()
                .map(|series| series.get(t).copied())
                .collect();
            PredictionRow::new(date, actual, model.report_row(state))
        })
        .collect();

    log::debug!(
        "{}: projected {} days ({} observed, horizon {})",
        config.entity,
        size,
        observed,
        config.horizon
    );

    Ok(PredictionTable::new(
        model.report_columns(),
        observables.iter().map(|o| o.label().to_string()).collect(),
        rows,
    ))
}
