use crate::align::AlignedSeries;
use crate::error::Result;
use crate::types::{CompartmentState, Parameter};

use super::sir::first_observation;
use super::{default_start, infection_flow, Observable};

/// SIR with the infectious split into non-hospitalized and hospitalized and
/// the removed split into recovered and fatal
///
/// ```text
/// dS/dt = -β S I / S₀
/// dI/dt = (1-ρ) β S I / S₀ - γ_I I
/// dH/dt =    ρ  β S I / S₀ - (1-δ) γ_H H - δ ω H
/// dR/dt = γ_I I + (1-δ) γ_H H
/// dF/dt = δ ω H
/// ```
///
/// Parameters: `[beta, gamma_i, gamma_h, omega, delta, s0_fraction]`.
/// ρ is the configured hospitalization rate.
#[derive(Clone, Debug, PartialEq)]
pub struct SihrfModel {
    population: f64,
    rho: f64,
}

const PARAMETERS: [Parameter; 6] = [
    Parameter::Beta,
    Parameter::GammaI,
    Parameter::GammaH,
    Parameter::Omega,
    Parameter::Delta,
    Parameter::S0Fraction,
];

impl SihrfModel {
    pub const COMPARTMENTS: [&'static str; 5] = ["S", "I", "H", "R", "F"];

    pub fn new(population: f64, rho: f64) -> Self {
        Self { population, rho }
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        PARAMETERS.to_vec()
    }

    pub fn default_start_point(&self) -> Vec<f64> {
        PARAMETERS.iter().copied().map(default_start).collect()
    }

    pub fn susceptible_pool(&self, params: &[f64]) -> f64 {
        params[5] * self.population
    }

    #[inline]
    pub fn derivative(&self, _t: f64, y: &[f64], params: &[f64], dy: &mut [f64]) {
        let (s, i, h) = (y[0], y[1], y[2]);
        let (beta, gamma_i, gamma_h, omega, delta) =
            (params[0], params[1], params[2], params[3], params[4]);

        let infection = infection_flow(beta, s, i, self.susceptible_pool(params));
        let recovery_i = gamma_i * i;
        let recovery_h = (1.0 - delta) * gamma_h * h;
        let death = delta * omega * h;

        dy[0] = -infection;
        dy[1] = (1.0 - self.rho) * infection - recovery_i;
        dy[2] = self.rho * infection - recovery_h - death;
        dy[3] = recovery_i + recovery_h;
        dy[4] = death;
    }

    pub fn initial_state(&self, aligned: &AlignedSeries, params: &[f64]) -> Result<CompartmentState> {
        let (confirmed, recovered, fatal) = first_observation(aligned)?;
        let infectious = confirmed - recovered - fatal;
        Ok(CompartmentState::new(vec![
            self.susceptible_pool(params),
            (1.0 - self.rho) * infectious,
            self.rho * infectious,
            recovered,
            fatal,
        ]))
    }

    /// Aggregate removal rate `(1-ρ) γ_I + ρ ((1-δ) γ_H + δ ω)`.
    ///
    /// Reporting only: the ODE keeps the individual rates.
    pub fn effective_gamma(&self, params: &[f64]) -> f64 {
        let (gamma_i, gamma_h, omega, delta) = (params[1], params[2], params[3], params[4]);
        (1.0 - self.rho) * gamma_i + self.rho * ((1.0 - delta) * gamma_h + delta * omega)
    }

    pub fn observables(&self) -> &'static [Observable] {
        &[
            Observable::Infectious,
            Observable::Recovered,
            Observable::Fatal,
        ]
    }

    pub fn simulated(&self, observable: Observable, y: &[f64]) -> Option<f64> {
        match observable {
            Observable::Infectious => Some(y[1] + y[2]),
            Observable::Recovered => Some(y[3]),
            Observable::Fatal => Some(y[4]),
            Observable::Removed => Some(y[3] + y[4]),
        }
    }
}
