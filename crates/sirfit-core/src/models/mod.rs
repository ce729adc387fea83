//! # Compartment models
//!
//! The closed family of ODE models the fitter supports. Every variant shares
//! one capability set (derivative, initial state, parameter layout, implied
//! R0) and is selected once from the run configuration.
//!
//! Trial parameters are always passed explicitly: a model value holds only
//! run constants (population, intervention offset, hospitalization split),
//! never the point currently being evaluated.
//!
//! | Variant | Compartments | Parameters |
//! |---|---|---|
//! | SIR | S I R | β γ |
//! | SIR two-phase | S I R | β γ (β₂) |
//! | SIR sigmoid | S I R | β γ β₂ λ |
//! | SEIR | S E I R | β γ (β₂) (σ) |
//! | SIHRF | S I H R F | β γ_I γ_H ω δ s0 |
//!
//! SIR-family and SEIR models append `s0_fraction` when the susceptible pool
//! is fitted. Two-phase shapes drop β₂ when the second phase reuses β.

mod seir;
mod sihrf;
mod sir;
mod transmission;

pub use seir::SeirModel;
pub use sihrf::SihrfModel;
pub use sir::SirModel;
pub use transmission::{Transmission, SIGMOID_DELAY_DAYS};

use serde::{Deserialize, Serialize};

use crate::align::AlignedSeries;
use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::{CompartmentState, Parameter};

/// Model variant selected in the configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Sir,
    SirTwoPhase,
    SirSigmoid,
    Seir,
    Sihrf,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Sir => write!(f, "SIR"),
            ModelKind::SirTwoPhase => write!(f, "SIR (two-phase)"),
            ModelKind::SirSigmoid => write!(f, "SIR (sigmoid)"),
            ModelKind::Seir => write!(f, "SEIR"),
            ModelKind::Sihrf => write!(f, "SIHRF"),
        }
    }
}

/// An observed quantity that a simulated trajectory is compared against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observable {
    /// Currently infectious (confirmed - recovered - fatal)
    Infectious,
    /// Recovered plus fatal
    Removed,
    Recovered,
    Fatal,
}

impl Observable {
    /// Observed values over the aligned window
    pub fn actual(&self, aligned: &AlignedSeries) -> Vec<f64> {
        match self {
            Observable::Infectious => aligned.infectious_actual(),
            Observable::Removed => aligned.removed_actual(),
            Observable::Recovered => aligned.recovered().to_vec(),
            Observable::Fatal => aligned.fatal().to_vec(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Observable::Infectious => "I_actual",
            Observable::Removed | Observable::Recovered => "R_actual",
            Observable::Fatal => "F_actual",
        }
    }
}

/// Starting value used when the optimizer has no better guess
pub(crate) fn default_start(parameter: Parameter) -> f64 {
    match parameter {
        Parameter::Beta => 0.2,
        Parameter::Gamma => 0.07,
        Parameter::Beta2 => 0.1,
        Parameter::Lambda => 0.5,
        Parameter::Sigma => 1.0 / 7.0,
        Parameter::S0Fraction => 0.5,
        Parameter::GammaI => 0.07,
        Parameter::GammaH => 0.07,
        Parameter::Omega => 0.07,
        Parameter::Delta => 0.05,
    }
}

/// New infections per unit time; zero when the susceptible pool is empty
#[inline]
pub(crate) fn infection_flow(beta: f64, s: f64, i: f64, pool: f64) -> f64 {
    if pool > 0.0 && pool.is_finite() {
        beta * s * i / pool
    } else {
        0.0
    }
}

/// A compartment model bound to the constants of one run
#[derive(Clone, Debug, PartialEq)]
pub enum CompartmentModel {
    Sir(SirModel),
    Seir(SeirModel),
    Sihrf(SihrfModel),
}

impl CompartmentModel {
    /// Build the configured variant.
    ///
    /// `intervention_offset` is the position of the intervention date in the
    /// aligned index; the two-phase and sigmoid variants switch around it.
    /// No reopening phase is applied; [`Self::for_series`] anchors that date
    /// on a series.
    pub fn new(config: &ModelConfig, intervention_offset: usize) -> Self {
        Self::with_offsets(config, intervention_offset as f64, None)
    }

    /// Build the configured variant with every configured date placed on the
    /// day index of `aligned`
    pub fn for_series(config: &ModelConfig, aligned: &AlignedSeries) -> Self {
        let reopening = config
            .reopening_date
            .and_then(|date| aligned.day_offset(date));
        Self::with_offsets(config, aligned.intervention_offset() as f64, reopening)
    }

    fn with_offsets(config: &ModelConfig, offset: f64, reopening: Option<f64>) -> Self {
        let population = config.population;
        let two_phase = Transmission::TwoPhase {
            offset,
            reopening,
            fit_beta2: config.estimate_beta2,
        };
        match config.model {
            ModelKind::Sir => CompartmentModel::Sir(SirModel::new(
                population,
                Transmission::Constant,
                config.estimate_s0,
            )),
            ModelKind::SirTwoPhase => {
                CompartmentModel::Sir(SirModel::new(population, two_phase, config.estimate_s0))
            }
            ModelKind::SirSigmoid => CompartmentModel::Sir(SirModel::new(
                population,
                Transmission::Sigmoid {
                    center: offset + SIGMOID_DELAY_DAYS,
                },
                config.estimate_s0,
            )),
            ModelKind::Seir => CompartmentModel::Seir(SeirModel::new(
                population,
                two_phase,
                config.incubation_period,
                config.estimate_sigma,
                config.estimate_s0,
                config.forced_e0,
            )),
            ModelKind::Sihrf => {
                CompartmentModel::Sihrf(SihrfModel::new(population, config.hospital.rate))
            }
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            CompartmentModel::Sir(m) => match m.transmission() {
                Transmission::Constant => ModelKind::Sir,
                Transmission::TwoPhase { .. } => ModelKind::SirTwoPhase,
                Transmission::Sigmoid { .. } => ModelKind::SirSigmoid,
            },
            CompartmentModel::Seir(_) => ModelKind::Seir,
            CompartmentModel::Sihrf(_) => ModelKind::Sihrf,
        }
    }

    pub fn compartments(&self) -> &'static [&'static str] {
        match self {
            CompartmentModel::Sir(_) => &SirModel::COMPARTMENTS,
            CompartmentModel::Seir(_) => &SeirModel::COMPARTMENTS,
            CompartmentModel::Sihrf(_) => &SihrfModel::COMPARTMENTS,
        }
    }

    /// Length of the state vector
    pub fn dimension(&self) -> usize {
        self.compartments().len()
    }

    /// Fitted parameters, in parameter-vector order
    pub fn parameters(&self) -> Vec<Parameter> {
        match self {
            CompartmentModel::Sir(m) => m.parameters(),
            CompartmentModel::Seir(m) => m.parameters(),
            CompartmentModel::Sihrf(m) => m.parameters(),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters().len()
    }

    pub fn default_start_point(&self) -> Vec<f64> {
        match self {
            CompartmentModel::Sir(m) => m.default_start_point(),
            CompartmentModel::Seir(m) => m.default_start_point(),
            CompartmentModel::Sihrf(m) => m.default_start_point(),
        }
    }

    /// Write `dy/dt` at `(t, y)` for parameter point `params` into `dy`
    #[inline]
    pub fn derivative(&self, t: f64, y: &[f64], params: &[f64], dy: &mut [f64]) {
        match self {
            CompartmentModel::Sir(m) => m.derivative(t, y, params, dy),
            CompartmentModel::Seir(m) => m.derivative(t, y, params, dy),
            CompartmentModel::Sihrf(m) => m.derivative(t, y, params, dy),
        }
    }

    /// Initial compartments derived from the first aligned observation.
    ///
    /// Takes the parameter point because a fitted susceptible pool sets S(0).
    pub fn initial_state(&self, aligned: &AlignedSeries, params: &[f64]) -> Result<CompartmentState> {
        match self {
            CompartmentModel::Sir(m) => m.initial_state(aligned, params),
            CompartmentModel::Seir(m) => m.initial_state(aligned, params),
            CompartmentModel::Sihrf(m) => m.initial_state(aligned, params),
        }
    }

    /// Removal rate used for reporting R0
    pub fn effective_gamma(&self, params: &[f64]) -> f64 {
        match self {
            CompartmentModel::Sir(m) => m.effective_gamma(params),
            CompartmentModel::Seir(m) => m.effective_gamma(params),
            CompartmentModel::Sihrf(m) => m.effective_gamma(params),
        }
    }

    /// β / effective γ, using the initial β for time-varying variants
    pub fn implied_r0(&self, params: &[f64]) -> f64 {
        let gamma = self.effective_gamma(params);
        if gamma > 0.0 {
            params[0] / gamma
        } else {
            f64::INFINITY
        }
    }

    /// Observed quantities the loss compares against, in weight order
    pub fn observables(&self) -> &'static [Observable] {
        match self {
            CompartmentModel::Sir(m) => m.observables(),
            CompartmentModel::Seir(m) => m.observables(),
            CompartmentModel::Sihrf(m) => m.observables(),
        }
    }

    /// Simulated counterpart of `observable` in state `y`
    pub fn simulated(&self, observable: Observable, y: &[f64]) -> Option<f64> {
        match self {
            CompartmentModel::Sir(m) => m.simulated(observable, y),
            CompartmentModel::Seir(m) => m.simulated(observable, y),
            CompartmentModel::Sihrf(m) => m.simulated(observable, y),
        }
    }

    /// Loss weight per observable: `(α, 1-α)` or the configured triple
    pub fn loss_weights(&self, config: &ModelConfig) -> Vec<f64> {
        match self.observables().len() {
            3 => config.alphas.to_vec(),
            _ => vec![config.alpha, 1.0 - config.alpha],
        }
    }

    /// Column names of a reported state row
    pub fn report_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.compartments().iter().map(|c| c.to_string()).collect();
        if let CompartmentModel::Sihrf(_) = self {
            columns.push("I_total".to_string());
        }
        columns
    }

    /// A state row as reported, with derived columns appended
    pub fn report_row(&self, y: &[f64]) -> Vec<f64> {
        let mut row = y.to_vec();
        if let CompartmentModel::Sihrf(_) = self {
            row.push(y[1] + y[2]);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeSeries;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use chrono::NaiveDate;

    fn aligned(confirmed: &[f64], recovered: &[f64], fatal: &[f64]) -> AlignedSeries {
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        crate::align::align(
            &TimeSeries::daily(start, confirmed.to_vec()),
            &TimeSeries::daily(start, recovered.to_vec()),
            &TimeSeries::daily(start, fatal.to_vec()),
            &ModelConfig::default(),
        )
        .unwrap()
    }

    fn all_variants() -> Vec<(CompartmentModel, Vec<f64>)> {
        let base = ModelConfig::new("Test", 1e6);
        vec![
            (
                CompartmentModel::new(&base.clone().with_model(ModelKind::Sir), 10),
                vec![0.3, 0.1],
            ),
            (
                CompartmentModel::new(&base.clone().with_model(ModelKind::SirTwoPhase), 10),
                vec![0.3, 0.1, 0.15],
            ),
            (
                CompartmentModel::new(
                    &base
                        .clone()
                        .with_model(ModelKind::SirSigmoid)
                        .with_estimate_s0(true),
                    10,
                ),
                vec![0.3, 0.1, 0.15, 0.8, 0.4],
            ),
            (
                CompartmentModel::new(&base.clone().with_model(ModelKind::Seir), 10),
                vec![0.3, 0.1, 0.15],
            ),
            (
                CompartmentModel::new(&base.clone().with_model(ModelKind::Sihrf), 10),
                vec![0.3, 0.06, 0.05, 0.02, 0.2, 0.3],
            ),
        ]
    }

    #[test]
    fn test_parameter_counts_match_start_points() {
        for (model, params) in all_variants() {
            assert_eq!(model.parameter_count(), params.len(), "{}", model.kind());
            assert_eq!(model.default_start_point().len(), params.len());
        }
    }

    #[test]
    fn test_derivatives_conserve_population() {
        for (model, params) in all_variants() {
            let n = model.dimension();
            let y: Vec<f64> = (0..n).map(|k| 1e5 * (k as f64 + 1.0)).collect();
            let mut dy = vec![0.0; n];
            for t in [0.0, 9.5, 10.0, 17.0, 40.0] {
                model.derivative(t, &y, &params, &mut dy);
                let total: f64 = dy.iter().sum();
                assert_abs_diff_eq!(total, 0.0, epsilon = 1e-6);
                assert!(dy.iter().all(|v| v.is_finite()));
            }
        }
    }

    #[test]
    fn test_empty_pool_gives_finite_derivative() {
        let model = CompartmentModel::new(&ModelConfig::default().with_model(ModelKind::Sihrf), 0);
        let params = [0.3, 0.06, 0.05, 0.02, 0.2, 0.0];
        let mut dy = [0.0; 5];
        model.derivative(0.0, &[0.0, 10.0, 5.0, 1.0, 1.0], &params, &mut dy);
        assert!(dy.iter().all(|v| v.is_finite()));
        assert_eq!(dy[0], 0.0);
    }

    #[test]
    fn test_sir_initial_state_sums_to_population() {
        let config = ModelConfig::new("Test", 1e6);
        let model = CompartmentModel::new(&config, 0);
        let data = aligned(&[100.0, 150.0], &[10.0, 20.0], &[5.0, 6.0]);
        let state = model.initial_state(&data, &[0.3, 0.1]).unwrap();
        assert_eq!(state.as_slice(), &[1e6 - 100.0, 85.0, 15.0]);
        assert_relative_eq!(state.total(), 1e6);
    }

    #[test]
    fn test_fitted_pool_sets_initial_susceptible() {
        let config = ModelConfig::new("Test", 1e6).with_estimate_s0(true);
        let model = CompartmentModel::new(&config, 0);
        let data = aligned(&[100.0], &[0.0], &[0.0]);
        let state = model.initial_state(&data, &[0.3, 0.1, 0.25]).unwrap();
        assert_relative_eq!(state.as_slice()[0], 250_000.0);
    }

    #[test]
    fn test_seir_initial_exposed_from_first_days() {
        let config = ModelConfig::new("Test", 1e6).with_model(ModelKind::Seir);
        let model = CompartmentModel::new(&config, 0);
        let confirmed = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0];
        let zeros = [0.0; 8];
        let data = aligned(&confirmed, &zeros, &zeros);
        let state = model.initial_state(&data, &[0.3, 0.1, 0.2]).unwrap();
        // first six infectious values sum to 210, spread over 7 days
        assert_eq!(state.as_slice()[1], 30.0);
        assert_relative_eq!(state.total(), 1e6);
    }

    #[test]
    fn test_seir_fitted_sigma_and_forced_exposed() {
        let config = ModelConfig::new("Test", 1e6)
            .with_model(ModelKind::Seir)
            .with_estimate_sigma(true)
            .with_forced_e0(12.0);
        let model = CompartmentModel::new(&config, 10);
        assert_eq!(
            model.parameters(),
            vec![Parameter::Beta, Parameter::Gamma, Parameter::Beta2, Parameter::Sigma]
        );
        assert_relative_eq!(model.default_start_point()[3], 1.0 / 7.0);

        let mut dy = [0.0; 4];
        model.derivative(0.0, &[1e5, 200.0, 100.0, 0.0], &[0.3, 0.1, 0.15, 0.5], &mut dy);
        // σE - γI with the fitted σ, not 1 / incubation_period
        assert_relative_eq!(dy[2], 0.5 * 200.0 - 0.1 * 100.0);
        assert_relative_eq!(dy[1], 3.0 - 0.5 * 200.0);

        let data = aligned(&[100.0, 120.0, 150.0], &[0.0; 3], &[0.0; 3]);
        let state = model
            .initial_state(&data, &[0.3, 0.1, 0.15, 0.5])
            .unwrap();
        assert_eq!(state.as_slice(), &[1e6 - 112.0, 12.0, 100.0, 0.0]);
    }

    #[test]
    fn test_pinned_beta2_drops_parameter() {
        let config = ModelConfig::new("Test", 1e6)
            .with_model(ModelKind::Seir)
            .with_estimate_beta2(false)
            .with_estimate_sigma(true);
        let model = CompartmentModel::new(&config, 10);
        assert_eq!(
            model.parameters(),
            vec![Parameter::Beta, Parameter::Gamma, Parameter::Sigma]
        );

        // σ now sits right after γ, and β holds past the intervention
        let mut dy = [0.0; 4];
        model.derivative(20.0, &[1e5, 200.0, 100.0, 0.0], &[0.3, 0.1, 0.5], &mut dy);
        assert_relative_eq!(dy[0], -3.0);
        assert_relative_eq!(dy[2], 0.5 * 200.0 - 0.1 * 100.0);

        let sir = CompartmentModel::new(
            &config.with_model(ModelKind::SirTwoPhase).with_estimate_s0(true),
            10,
        );
        assert_eq!(
            sir.parameters(),
            vec![Parameter::Beta, Parameter::Gamma, Parameter::S0Fraction]
        );
    }

    #[test]
    fn test_reopening_date_anchored_on_series() {
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let config = ModelConfig::new("Test", 1e6)
            .with_model(ModelKind::SirTwoPhase)
            .with_intervention_date(NaiveDate::from_ymd_opt(2020, 3, 5).unwrap())
            .with_reopening_date(NaiveDate::from_ymd_opt(2020, 3, 25).unwrap());
        let confirmed: Vec<f64> = (1..=10).map(|d| 10.0 * d as f64).collect();
        let data = crate::align::align(
            &TimeSeries::daily(start, confirmed),
            &TimeSeries::daily(start, vec![0.0; 10]),
            &TimeSeries::daily(start, vec![0.0; 10]),
            &config,
        )
        .unwrap();
        let reopening = NaiveDate::from_ymd_opt(2020, 3, 25).unwrap();
        assert_eq!(data.day_offset(reopening), Some(24.0));

        let model = CompartmentModel::for_series(&config, &data);
        assert_eq!(
            model,
            CompartmentModel::Sir(SirModel::new(
                1e6,
                Transmission::TwoPhase {
                    offset: 4.0,
                    reopening: Some(24.0),
                    fit_beta2: true,
                },
                false,
            ))
        );

        let (s, i) = (5e5, 1e3);
        let mut dy = [0.0; 3];
        for (t, beta) in [(3.0, 0.3), (10.0, 0.1), (30.0, 0.2)] {
            model.derivative(t, &[s, i, 0.0], &[0.3, 0.1, 0.1], &mut dy);
            assert_relative_eq!(dy[0], -beta * s * i / 1e6, max_relative = 1e-12);
        }

        // without a series there is nothing to anchor the date on
        assert_eq!(
            CompartmentModel::new(&config, 4),
            CompartmentModel::Sir(SirModel::new(
                1e6,
                Transmission::TwoPhase {
                    offset: 4.0,
                    reopening: None,
                    fit_beta2: true,
                },
                false,
            ))
        );
    }

    #[test]
    fn test_sihrf_splits_initial_infectious() {
        let mut config = ModelConfig::new("Test", 1e6).with_model(ModelKind::Sihrf);
        config.hospital.rate = 0.2;
        let model = CompartmentModel::new(&config, 0);
        let data = aligned(&[120.0], &[10.0], &[10.0]);
        let state = model
            .initial_state(&data, &[0.3, 0.06, 0.05, 0.02, 0.2, 0.5])
            .unwrap();
        for (got, want) in state.as_slice().iter().zip([500_000.0, 80.0, 20.0, 10.0, 10.0]) {
            assert_relative_eq!(*got, want, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_sihrf_effective_gamma_is_reporting_blend() {
        let mut config = ModelConfig::new("Test", 1e6).with_model(ModelKind::Sihrf);
        config.hospital.rate = 0.1;
        let model = CompartmentModel::new(&config, 0);
        let params = [0.3, 0.06, 0.05, 0.02, 0.25, 0.5];
        let expected = 0.9 * 0.06 + 0.1 * (0.75 * 0.05 + 0.25 * 0.02);
        assert_relative_eq!(model.effective_gamma(&params), expected);
        assert_relative_eq!(model.implied_r0(&params), 0.3 / expected);
    }

    #[test]
    fn test_zero_gamma_reports_infinite_r0() {
        let model = CompartmentModel::new(&ModelConfig::default(), 0);
        assert_eq!(model.implied_r0(&[0.3, 0.0]), f64::INFINITY);
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            ModelKind::Sir,
            ModelKind::SirTwoPhase,
            ModelKind::SirSigmoid,
            ModelKind::Seir,
            ModelKind::Sihrf,
        ] {
            let model = CompartmentModel::new(&ModelConfig::default().with_model(kind), 3);
            assert_eq!(model.kind(), kind);
        }
    }
}
