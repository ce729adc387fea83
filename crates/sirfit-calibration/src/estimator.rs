//! Parameter estimation for one aligned series

use sirfit_core::{AlignedSeries, CompartmentModel, FitError, ModelConfig, Result};

use crate::calibration_problem::CalibrationProblem;
use crate::optimization::optimize;
use crate::types::{CalibrationParameter, FitResult};

/// Margin below which a constraint counts as violated in the fit summary
const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// Parameters of `model` with the configured search bounds, starting from the
/// model's default point moved inside those bounds
pub fn calibration_parameters(
    model: &CompartmentModel,
    config: &ModelConfig,
) -> Vec<CalibrationParameter> {
    model
        .parameters()
        .into_iter()
        .zip(model.default_start_point())
        .map(|(parameter, start)| {
            CalibrationParameter::new(parameter, config.search_bounds(parameter))
                .with_initial_guess(start)
        })
        .collect()
}

/// Fit the configured model to `aligned`.
///
/// Returns the best point found within the iteration budget. Optimizer
/// non-convergence is not an error; check `FitResult::status`. A forced β or
/// γ is returned exactly.
pub fn fit(aligned: &AlignedSeries, config: &ModelConfig) -> Result<FitResult> {
    config.validate()?;
    if aligned.is_empty() {
        return Err(FitError::DataAlignment(format!(
            "{}: no observations to fit",
            config.entity
        )));
    }

    let model = CompartmentModel::for_series(config, aligned);
    let parameters = calibration_parameters(&model, config);

    log::debug!(
        "{}: fitting {} over {} days ({} .. {:?})",
        config.entity,
        model.kind(),
        aligned.len(),
        aligned.dates()[0],
        aligned.last_date()
    );
    for param in &parameters {
        log::debug!(
            "{}:   {} in [{}, {}], start {}",
            config.entity,
            param.parameter,
            param.min_bound,
            param.max_bound,
            param.initial_value()
        );
    }

    let problem = CalibrationProblem::new(model.clone(), aligned, parameters, config)?;
    let evaluator = problem.clone();
    let result = optimize(problem, &config.optimizer, &config.entity)?;

    // Nelder-Mead reports the raw simplex point; the model only ever saw its
    // clamped image
    let parameters = evaluator.clamp_to_bounds(&result.best_parameters);
    let loss = evaluator.loss(&parameters).unwrap_or(f64::INFINITY);
    let constraint_margins = evaluator.constraint_margins(&parameters);

    let fit = FitResult {
        model: model.kind(),
        parameter_names: result.parameter_names,
        r0: model.implied_r0(&parameters),
        effective_gamma: model.effective_gamma(&parameters),
        parameters,
        loss,
        constraint_margins,
        status: result.status,
    };

    log::info!(
        "{}: {} fit {:?} loss={:.6e} R0={:.4} ({})",
        config.entity,
        fit.model,
        fit.parameters_map(),
        fit.loss,
        fit.r0,
        fit.status.termination_reason
    );
    if !fit.status.converged {
        log::warn!(
            "{}: optimizer stopped without converging after {} iterations",
            config.entity,
            fit.status.iterations
        );
    }
    for margin in &fit.constraint_margins {
        if margin.margin < -FEASIBILITY_TOLERANCE {
            log::warn!(
                "{}: constraint {} violated by {:.4e}",
                config.entity,
                margin.kind,
                -margin.margin
            );
        }
    }

    Ok(fit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sirfit_core::{ModelKind, NelderMeadConfig, OptimizationConfig, Parameter};

    #[test]
    fn test_start_point_is_moved_inside_bounds() {
        let mut config = ModelConfig::new("Test", 1e6).with_model(ModelKind::Sihrf);
        config.bounds.gamma_i = (0.1, 0.2);
        let model = CompartmentModel::new(&config, 0);
        let params = calibration_parameters(&model, &config);

        assert_eq!(params.len(), 6);
        assert_eq!(params[1].parameter, Parameter::GammaI);
        assert_eq!(params[1].initial_value(), 0.1);
        assert!(params.iter().all(|p| p.is_within_bounds(p.initial_value())));
    }

    #[test]
    fn test_invalid_config_rejected_before_fitting() {
        let config = ModelConfig::new("Test", 1e6)
            .with_alpha(2.0)
            .with_optimizer(OptimizationConfig::NelderMead(
                NelderMeadConfig::new().with_max_iterations(1),
            ));
        let aligned = {
            let start = chrono::NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
            let series = sirfit_core::TimeSeries::daily(start, vec![10.0, 20.0]);
            let zeros = sirfit_core::TimeSeries::daily(start, vec![0.0, 0.0]);
            sirfit_core::align(&series, &zeros, &zeros, &ModelConfig::default()).unwrap()
        };
        assert!(matches!(
            fit(&aligned, &config),
            Err(FitError::InvalidConfig(_))
        ));
    }
}
