use crate::align::AlignedSeries;
use crate::error::{FitError, Result};
use crate::types::{CompartmentState, Parameter};

use super::transmission::Transmission;
use super::{default_start, infection_flow, Observable};

/// SIR with constant, two-phase or sigmoid transmission
///
/// ```text
/// dS/dt = -β(t) S I / S₀
/// dI/dt =  β(t) S I / S₀ - γ I
/// dR/dt =  γ I
/// ```
///
/// Parameters: `[beta, gamma, <transmission extras>, (s0_fraction)]`.
#[derive(Clone, Debug, PartialEq)]
pub struct SirModel {
    population: f64,
    transmission: Transmission,
    estimate_s0: bool,
}

impl SirModel {
    pub const COMPARTMENTS: [&'static str; 3] = ["S", "I", "R"];

    pub fn new(population: f64, transmission: Transmission, estimate_s0: bool) -> Self {
        Self {
            population,
            transmission,
            estimate_s0,
        }
    }

    pub fn transmission(&self) -> Transmission {
        self.transmission
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        let mut parameters = vec![Parameter::Beta, Parameter::Gamma];
        parameters.extend_from_slice(self.transmission.extra_parameters());
        if self.estimate_s0 {
            parameters.push(Parameter::S0Fraction);
        }
        parameters
    }

    pub fn default_start_point(&self) -> Vec<f64> {
        self.parameters().into_iter().map(default_start).collect()
    }

    fn extras<'p>(&self, params: &'p [f64]) -> &'p [f64] {
        &params[2..2 + self.transmission.extra_parameters().len()]
    }

    /// Population the infection term is normalized by
    pub fn susceptible_pool(&self, params: &[f64]) -> f64 {
        if self.estimate_s0 {
            params[params.len() - 1] * self.population
        } else {
            self.population
        }
    }

    #[inline]
    pub fn derivative(&self, t: f64, y: &[f64], params: &[f64], dy: &mut [f64]) {
        let (s, i) = (y[0], y[1]);
        let gamma = params[1];
        let beta = self.transmission.rate(t, params[0], self.extras(params));

        let infection = infection_flow(beta, s, i, self.susceptible_pool(params));
        let removal = gamma * i;

        dy[0] = -infection;
        dy[1] = infection - removal;
        dy[2] = removal;
    }

    pub fn initial_state(&self, aligned: &AlignedSeries, params: &[f64]) -> Result<CompartmentState> {
        let (confirmed, recovered, fatal) = first_observation(aligned)?;
        let r0 = recovered + fatal;
        let i0 = confirmed - r0;
        let s0 = if self.estimate_s0 {
            self.susceptible_pool(params)
        } else {
            self.population - i0 - r0
        };
        Ok(CompartmentState::new(vec![s0, i0, r0]))
    }

    pub fn effective_gamma(&self, params: &[f64]) -> f64 {
        params[1]
    }

    pub fn observables(&self) -> &'static [Observable] {
        &[Observable::Infectious, Observable::Removed]
    }

    pub fn simulated(&self, observable: Observable, y: &[f64]) -> Option<f64> {
        match observable {
            Observable::Infectious => Some(y[1]),
            Observable::Removed => Some(y[2]),
            Observable::Recovered | Observable::Fatal => None,
        }
    }
}

pub(super) fn first_observation(aligned: &AlignedSeries) -> Result<(f64, f64, f64)> {
    match (
        aligned.confirmed().first(),
        aligned.recovered().first(),
        aligned.fatal().first(),
    ) {
        (Some(&c), Some(&r), Some(&f)) => Ok((c, r, f)),
        _ => Err(FitError::DataAlignment(
            "cannot derive initial conditions from an empty series".into(),
        )),
    }
}
