//! Calibration problem definition and implementation

use argmin::core::{CostFunction, Error};
use sirfit_core::{
    AlignedSeries, Bounds, CompartmentModel, FitError, IntegratorConfig, ModelConfig, Observable,
    Result,
};
use sirfit_ode::simulate;

use crate::types::{CalibrationParameter, ConstraintKind, ConstraintMargin};

/// One observed series the simulated trajectory is compared against
#[derive(Debug, Clone)]
struct Target {
    observable: Observable,
    actual: Vec<f64>,
    weight: f64,
}

/// Weighted-RMSE calibration of one compartment model against one aligned
/// series.
///
/// Every trial point is integrated from scratch: the model holds only run
/// constants and the parameter vector is threaded explicitly into the
/// derivative, so evaluations share no mutable state.
///
/// # Example
///
/// ```rust,ignore
/// use sirfit_calibration::{CalibrationProblem, CalibrationParameter};
///
/// let model = CompartmentModel::for_series(&config, &aligned);
/// let params = vec![
///     CalibrationParameter::new(Parameter::Beta, (0.0, 1.0)),
///     CalibrationParameter::new(Parameter::Gamma, (0.0, 0.5)),
/// ];
/// let problem = CalibrationProblem::new(model, &aligned, params, &config)?;
/// ```
#[derive(Debug, Clone)]
pub struct CalibrationProblem<'a> {
    model: CompartmentModel,

    aligned: &'a AlignedSeries,

    targets: Vec<Target>,

    /// Parameters to calibrate with their bounds
    parameters: Vec<CalibrationParameter>,

    r0_bounds: Option<Bounds>,

    gamma_bounds: Option<Bounds>,

    constraint_penalty: f64,

    integrator: IntegratorConfig,
}

impl<'a> CalibrationProblem<'a> {
    /// Create a new calibration problem
    ///
    /// Fails with [`FitError::InvalidConfig`] if the parameter list does not
    /// match the model's layout or the series is empty.
    pub fn new(
        model: CompartmentModel,
        aligned: &'a AlignedSeries,
        parameters: Vec<CalibrationParameter>,
        config: &ModelConfig,
    ) -> Result<Self> {
        if aligned.is_empty() {
            return Err(FitError::DataAlignment("no observations to fit".into()));
        }

        let expected = model.parameters();
        let given: Vec<_> = parameters.iter().map(|p| p.parameter).collect();
        if given != expected {
            return Err(FitError::InvalidConfig(format!(
                "{} expects parameters {:?}, got {:?}",
                model.kind(),
                expected,
                given
            )));
        }

        let weights = model.loss_weights(config);
        let targets = model
            .observables()
            .iter()
            .zip(weights)
            .map(|(&observable, weight)| Target {
                observable,
                actual: observable.actual(aligned),
                weight,
            })
            .collect();

        Ok(Self {
            model,
            aligned,
            targets,
            parameters,
            r0_bounds: config.r0_bounds,
            gamma_bounds: config.gamma_bounds,
            constraint_penalty: config.constraint_penalty,
            integrator: config.integrator.clone(),
        })
    }

    pub fn model(&self) -> &CompartmentModel {
        &self.model
    }

    /// Get the number of parameters being calibrated
    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameters(&self) -> &[CalibrationParameter] {
        &self.parameters
    }

    /// Get parameter names in order
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|p| p.parameter.to_string())
            .collect()
    }

    /// Get initial parameter values
    pub fn initial_parameters(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.initial_value()).collect()
    }

    /// Get parameter bounds as (min, max) tuples
    pub fn parameter_bounds(&self) -> Vec<Bounds> {
        self.parameters
            .iter()
            .map(|p| (p.min_bound, p.max_bound))
            .collect()
    }

    /// Clamp parameter values to their defined bounds
    ///
    /// Nelder-Mead explores outside the box; the model only ever sees
    /// admissible values.
    pub fn clamp_to_bounds(&self, param_values: &[f64]) -> Vec<f64> {
        param_values
            .iter()
            .zip(&self.parameters)
            .map(|(value, param)| param.clamp(*value))
            .collect()
    }

    /// Weighted sum of per-observable RMSE at `params`
    pub fn loss(&self, params: &[f64]) -> Result<f64> {
        let initial = self.model.initial_state(self.aligned, params)?;
        let trajectory = simulate(
            &self.model,
            &initial,
            params,
            self.aligned.len(),
            &self.integrator,
        )?;

        let mut loss = 0.0;
        for target in &self.targets {
            let mut sum_squared_error = 0.0;
            for (row, actual) in trajectory.rows().iter().zip(&target.actual) {
                let simulated = self.model.simulated(target.observable, row).ok_or_else(|| {
                    FitError::InvalidConfig(format!(
                        "{} does not simulate {:?}",
                        self.model.kind(),
                        target.observable
                    ))
                })?;
                let error = simulated - actual;
                sum_squared_error += error * error;
            }
            let rmse = (sum_squared_error / target.actual.len() as f64).sqrt();
            loss += target.weight * rmse;
        }

        Ok(loss)
    }

    /// Signed margins `value - lower` and `upper - value` of the configured
    /// R0 and aggregate-γ intervals
    pub fn constraint_margins(&self, params: &[f64]) -> Vec<ConstraintMargin> {
        let mut margins = Vec::new();
        if let Some((lower, upper)) = self.r0_bounds {
            let r0 = self.model.implied_r0(params);
            margins.push(ConstraintMargin {
                kind: ConstraintKind::R0Lower,
                margin: r0 - lower,
            });
            margins.push(ConstraintMargin {
                kind: ConstraintKind::R0Upper,
                margin: upper - r0,
            });
        }
        if let Some((lower, upper)) = self.gamma_bounds {
            let gamma = self.model.effective_gamma(params);
            margins.push(ConstraintMargin {
                kind: ConstraintKind::GammaLower,
                margin: gamma - lower,
            });
            margins.push(ConstraintMargin {
                kind: ConstraintKind::GammaUpper,
                margin: upper - gamma,
            });
        }
        margins
    }

    /// Objective seen by the optimizer.
    ///
    /// A point the integrator cannot handle, or one with a non-finite loss,
    /// costs `+inf`. Constraint violations add
    /// `penalty * (1 + loss) * sum(min(0, margin)^2)`.
    pub fn penalized_loss(&self, params: &[f64]) -> f64 {
        let loss = match self.loss(params) {
            Ok(loss) if loss.is_finite() => loss,
            Ok(_) => return f64::INFINITY,
            Err(e) => {
                log::trace!("rejecting {:?}: {}", params, e);
                return f64::INFINITY;
            }
        };

        let violation: f64 = self
            .constraint_margins(params)
            .iter()
            .map(|m| {
                if m.margin.is_nan() {
                    f64::INFINITY
                } else {
                    m.margin.min(0.0).powi(2)
                }
            })
            .sum();

        if violation == 0.0 {
            loss
        } else {
            loss + self.constraint_penalty * (1.0 + loss) * violation
        }
    }

    /// Validate parameter vector length
    fn validate_parameter_count(&self, param_values: &[f64]) -> std::result::Result<(), String> {
        if param_values.len() != self.parameters.len() {
            return Err(format!(
                "Expected {} parameters, got {}",
                self.parameters.len(),
                param_values.len()
            ));
        }
        Ok(())
    }
}

impl CostFunction for CalibrationProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param_values: &Self::Param) -> std::result::Result<Self::Output, Error> {
        self.validate_parameter_count(param_values)
            .map_err(Error::msg)?;

        let clamped_params = self.clamp_to_bounds(param_values);

        Ok(self.penalized_loss(&clamped_params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use crate::estimator::calibration_parameters;
    use sirfit_core::{align, CompartmentState, ModelKind, Parameter, TimeSeries};

    const N: f64 = 1e5;

    /// Series generated by the SIR model itself at β = 0.3, γ = 0.1
    fn synthetic(config: &ModelConfig) -> AlignedSeries {
        let model = CompartmentModel::new(config, 0);
        let initial = CompartmentState::new(vec![N - 120.0, 100.0, 20.0]);
        let trajectory =
            simulate(&model, &initial, &[0.3, 0.1], 30, &IntegratorConfig::default()).unwrap();
        let confirmed: Vec<f64> = trajectory.rows().iter().map(|r| r[1] + r[2]).collect();
        let recovered = trajectory.column(2);
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        align(
            &TimeSeries::daily(start, confirmed),
            &TimeSeries::daily(start, recovered),
            &TimeSeries::daily(start, vec![0.0; 30]),
            config,
        )
        .unwrap()
    }

    fn sir_parameters(config: &ModelConfig) -> Vec<CalibrationParameter> {
        [Parameter::Beta, Parameter::Gamma]
            .into_iter()
            .map(|p| CalibrationParameter::new(p, config.search_bounds(p)))
            .collect()
    }

    #[test]
    fn test_true_parameters_have_near_zero_loss() {
        let config = ModelConfig::new("Test", N);
        let aligned = synthetic(&config);
        let model = CompartmentModel::new(&config, aligned.intervention_offset());
        let problem =
            CalibrationProblem::new(model, &aligned, sir_parameters(&config), &config).unwrap();

        let at_truth = problem.loss(&[0.3, 0.1]).unwrap();
        let elsewhere = problem.loss(&[0.2, 0.1]).unwrap();
        assert!(at_truth < 1e-6, "loss at truth {}", at_truth);
        assert!(elsewhere > 1.0);
    }

    #[test]
    fn test_rejects_mismatched_parameter_layout() {
        let config = ModelConfig::new("Test", N);
        let aligned = synthetic(&config);
        let model = CompartmentModel::new(&config, 0);
        let params = vec![CalibrationParameter::new(Parameter::Beta, (0.0, 1.0))];
        assert!(matches!(
            CalibrationProblem::new(model, &aligned, params, &config),
            Err(FitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_cost_clamps_to_bounds() {
        let config = ModelConfig::new("Test", N);
        let aligned = synthetic(&config);
        let model = CompartmentModel::new(&config, 0);
        let params = vec![
            CalibrationParameter::new(Parameter::Beta, (0.0, 0.3)),
            CalibrationParameter::new(Parameter::Gamma, (0.0, 0.5)),
        ];
        let problem = CalibrationProblem::new(model, &aligned, params, &config).unwrap();

        let outside = problem.cost(&vec![5.0, 0.1]).unwrap();
        let boundary = problem.cost(&vec![0.3, 0.1]).unwrap();
        assert_eq!(outside, boundary);
        assert!(problem.cost(&vec![0.3]).is_err());
    }

    #[test]
    fn test_constraint_margins_and_penalty() {
        let config = ModelConfig::new("Test", N).with_r0_bounds(2.0, 2.5);
        let aligned = synthetic(&config);
        let model = CompartmentModel::new(&config, 0);
        let problem =
            CalibrationProblem::new(model, &aligned, sir_parameters(&config), &config).unwrap();

        let margins = problem.constraint_margins(&[0.3, 0.1]);
        assert_eq!(margins.len(), 2);
        assert_relative_eq!(margins[0].margin, 1.0, max_relative = 1e-12);
        // upper margin uses the upper bound
        assert_relative_eq!(margins[1].margin, -0.5, max_relative = 1e-12);

        let loss = problem.loss(&[0.3, 0.1]).unwrap();
        let expected = loss + 1e4 * (1.0 + loss) * 0.25;
        assert_relative_eq!(
            problem.penalized_loss(&[0.3, 0.1]),
            expected,
            max_relative = 1e-12
        );

        // feasible point carries no penalty
        let feasible = [0.22, 0.1];
        assert_eq!(
            problem.penalized_loss(&feasible),
            problem.loss(&feasible).unwrap()
        );
    }

    #[test]
    fn test_gamma_interval_bounds_sihrf_aggregate_rate() {
        let mut config = ModelConfig::new("Test", N)
            .with_model(ModelKind::Sihrf)
            .with_gamma_bounds(0.05, 0.06);
        config.hospital.rate = 0.1;
        let aligned = synthetic(&ModelConfig::new("Test", N));
        let model = CompartmentModel::new(&config, 0);
        let parameters = calibration_parameters(&model, &config);
        let problem = CalibrationProblem::new(model, &aligned, parameters, &config).unwrap();

        // γ_eff = 0.9 * 0.06 + 0.1 * (0.75 * 0.05 + 0.25 * 0.02)
        let inside = [0.3, 0.06, 0.05, 0.02, 0.25, 0.5];
        let margins = problem.constraint_margins(&inside);
        assert_eq!(
            margins.iter().map(|m| m.kind).collect::<Vec<_>>(),
            vec![ConstraintKind::GammaLower, ConstraintKind::GammaUpper]
        );
        assert_relative_eq!(margins[0].margin, 0.05825 - 0.05, max_relative = 1e-9);
        assert_relative_eq!(margins[1].margin, 0.06 - 0.05825, max_relative = 1e-9);
        let loss = problem.loss(&inside).unwrap();
        assert!(loss.is_finite());
        assert_eq!(problem.penalized_loss(&inside), loss);

        // raising γ_I alone pushes the blend past the upper bound
        let above = [0.3, 0.07, 0.05, 0.02, 0.25, 0.5];
        let margins = problem.constraint_margins(&above);
        assert!(margins[0].margin > 0.0);
        assert_relative_eq!(margins[1].margin, 0.06 - 0.06725, max_relative = 1e-9);
        let loss = problem.loss(&above).unwrap();
        assert_relative_eq!(
            problem.penalized_loss(&above),
            loss + 1e4 * (1.0 + loss) * 0.00725f64.powi(2),
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_failed_integration_costs_infinity() {
        let mut config = ModelConfig::new("Test", N);
        config.integrator.max_steps = 1;
        let aligned = synthetic(&ModelConfig::new("Test", N));
        let model = CompartmentModel::new(&config, 0);
        let problem =
            CalibrationProblem::new(model, &aligned, sir_parameters(&config), &config).unwrap();
        assert_eq!(problem.penalized_loss(&[0.3, 0.1]), f64::INFINITY);
    }
}
