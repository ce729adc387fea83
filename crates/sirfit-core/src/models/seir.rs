use crate::align::AlignedSeries;
use crate::error::Result;
use crate::types::{CompartmentState, Parameter};

use super::sir::first_observation;
use super::transmission::Transmission;
use super::{default_start, infection_flow, Observable};

/// SEIR with a latent compartment and a step change of β at the intervention
///
/// ```text
/// dS/dt = -β(t) S I / S₀
/// dE/dt =  β(t) S I / S₀ - σ E
/// dI/dt =  σ E - γ I
/// dR/dt =  γ I
/// ```
///
/// Parameters: `[beta, gamma, (beta2), (sigma), (s0_fraction)]`. β₂ is
/// fitted unless the second phase reuses β; σ is `1 / incubation_period`
/// unless it is fitted.
#[derive(Clone, Debug, PartialEq)]
pub struct SeirModel {
    population: f64,
    transmission: Transmission,
    incubation_period: f64,
    estimate_sigma: bool,
    estimate_s0: bool,
    forced_e0: Option<f64>,
}

impl SeirModel {
    pub const COMPARTMENTS: [&'static str; 4] = ["S", "E", "I", "R"];

    pub fn new(
        population: f64,
        transmission: Transmission,
        incubation_period: f64,
        estimate_sigma: bool,
        estimate_s0: bool,
        forced_e0: Option<f64>,
    ) -> Self {
        Self {
            population,
            transmission,
            incubation_period,
            estimate_sigma,
            estimate_s0,
            forced_e0,
        }
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        let mut parameters = vec![Parameter::Beta, Parameter::Gamma];
        parameters.extend_from_slice(self.transmission.extra_parameters());
        if self.estimate_sigma {
            parameters.push(Parameter::Sigma);
        }
        if self.estimate_s0 {
            parameters.push(Parameter::S0Fraction);
        }
        parameters
    }

    pub fn default_start_point(&self) -> Vec<f64> {
        self.parameters()
            .into_iter()
            .map(|p| match p {
                Parameter::Sigma => 1.0 / self.incubation_period,
                other => default_start(other),
            })
            .collect()
    }

    fn extras<'p>(&self, params: &'p [f64]) -> &'p [f64] {
        &params[2..2 + self.transmission.extra_parameters().len()]
    }

    fn sigma(&self, params: &[f64]) -> f64 {
        if self.estimate_sigma {
            params[2 + self.transmission.extra_parameters().len()]
        } else {
            1.0 / self.incubation_period
        }
    }

    pub fn susceptible_pool(&self, params: &[f64]) -> f64 {
        if self.estimate_s0 {
            params[params.len() - 1] * self.population
        } else {
            self.population
        }
    }

    #[inline]
    pub fn derivative(&self, t: f64, y: &[f64], params: &[f64], dy: &mut [f64]) {
        let (s, e, i) = (y[0], y[1], y[2]);
        let gamma = params[1];
        let sigma = self.sigma(params);
        let beta = self.transmission.rate(t, params[0], self.extras(params));

        let infection = infection_flow(beta, s, i, self.susceptible_pool(params));
        let onset = sigma * e;
        let removal = gamma * i;

        dy[0] = -infection;
        dy[1] = infection - onset;
        dy[2] = onset - removal;
        dy[3] = removal;
    }

    /// Initial exposed: the forced value, or the mean daily infectious count
    /// over the first `incubation_period - 1` observations spread over the
    /// incubation period.
    fn initial_exposed(&self, aligned: &AlignedSeries) -> f64 {
        if let Some(e0) = self.forced_e0 {
            return e0;
        }
        let window = (self.incubation_period as usize).saturating_sub(1);
        let total: f64 = aligned.infectious_actual().iter().take(window).sum();
        (total / self.incubation_period).floor()
    }

    pub fn initial_state(&self, aligned: &AlignedSeries, params: &[f64]) -> Result<CompartmentState> {
        let (confirmed, recovered, fatal) = first_observation(aligned)?;
        let r0 = recovered + fatal;
        let i0 = confirmed - r0;
        let e0 = self.initial_exposed(aligned);
        let s0 = if self.estimate_s0 {
            self.susceptible_pool(params)
        } else {
            self.population - i0 - r0 - e0
        };
        Ok(CompartmentState::new(vec![s0, e0, i0, r0]))
    }

    pub fn effective_gamma(&self, params: &[f64]) -> f64 {
        params[1]
    }

    pub fn observables(&self) -> &'static [Observable] {
        &[Observable::Infectious, Observable::Removed]
    }

    pub fn simulated(&self, observable: Observable, y: &[f64]) -> Option<f64> {
        match observable {
            Observable::Infectious => Some(y[2]),
            Observable::Removed => Some(y[3]),
            Observable::Recovered | Observable::Fatal => None,
        }
    }
}
