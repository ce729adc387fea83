//! Run configuration
//!
//! A [`ModelConfig`] is built once per run (in code, or from a JSON file) and
//! passed by reference to every stage. Nothing downstream mutates it.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::models::ModelKind;
use crate::types::Parameter;

/// Closed interval `(lower, upper)`
pub type Bounds = (f64, f64);

/// Search interval for every fittable parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterBounds {
    pub beta: Bounds,
    pub gamma: Bounds,
    pub beta2: Bounds,
    pub lambda: Bounds,
    pub sigma: Bounds,
    /// Bounds on the susceptible pool as a fraction of the population
    pub s0_fraction: Bounds,
    pub gamma_i: Bounds,
    pub gamma_h: Bounds,
    pub omega: Bounds,
    pub delta: Bounds,
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            beta: (1e-8, 2.0),
            gamma: (1e-8, 2.0),
            beta2: (1e-8, 2.0),
            lambda: (0.01, 5.0),
            sigma: (1e-5, 2.0),
            s0_fraction: (1e-4, 1.0),
            gamma_i: (1.0 / 21.0, 1.0 / 14.0),
            gamma_h: (1.0 / 42.0, 1.0 / 14.0),
            omega: (0.001, 0.1),
            delta: (0.0, 1.0),
        }
    }
}

impl ParameterBounds {
    /// Bounds for a single parameter
    pub fn get(&self, parameter: Parameter) -> Bounds {
        match parameter {
            Parameter::Beta => self.beta,
            Parameter::Gamma => self.gamma,
            Parameter::Beta2 => self.beta2,
            Parameter::Lambda => self.lambda,
            Parameter::Sigma => self.sigma,
            Parameter::S0Fraction => self.s0_fraction,
            Parameter::GammaI => self.gamma_i,
            Parameter::GammaH => self.gamma_h,
            Parameter::Omega => self.omega,
            Parameter::Delta => self.delta,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (Parameter, Bounds)> + '_ {
        [
            Parameter::Beta,
            Parameter::Gamma,
            Parameter::Beta2,
            Parameter::Lambda,
            Parameter::Sigma,
            Parameter::S0Fraction,
            Parameter::GammaI,
            Parameter::GammaH,
            Parameter::Omega,
            Parameter::Delta,
        ]
        .into_iter()
        .map(move |p| (p, self.get(p)))
    }
}

/// Hospital bed demand settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HospitalConfig {
    /// Share of new infections needing a bed (also the SIHRF split ρ)
    pub rate: f64,
    /// Days between infection and admission
    pub days_to_hosp: usize,
    /// Days a patient occupies a bed
    pub stay_duration: usize,
}

impl Default for HospitalConfig {
    fn default() -> Self {
        Self {
            rate: 0.15,
            days_to_hosp: 7,
            stay_duration: 7,
        }
    }
}

/// Configuration for Nelder-Mead optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadConfig {
    /// Maximum number of iterations
    pub max_iterations: u64,

    /// Sample standard deviation tolerance (convergence criterion)
    pub sd_tolerance: f64,

    /// Reflection parameter, must be > 0 (argmin default 1.0)
    pub alpha: Option<f64>,

    /// Expansion parameter, must be > 1 (argmin default 2.0)
    pub gamma: Option<f64>,

    /// Contraction parameter, must be in (0, 0.5] (argmin default 0.5)
    pub rho: Option<f64>,

    /// Shrinking parameter, must be in (0, 1] (argmin default 0.5)
    pub sigma: Option<f64>,

    /// Print iteration progress to the terminal
    pub verbose: bool,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            sd_tolerance: 1e-6,
            alpha: None,
            gamma: None,
            rho: None,
            sigma: None,
            verbose: false,
        }
    }
}

impl NelderMeadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_sd_tolerance(mut self, tolerance: f64) -> Self {
        self.sd_tolerance = tolerance;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Configuration for Particle Swarm Optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSwarmConfig {
    /// Number of particles in the swarm
    pub num_particles: usize,

    /// Maximum number of iterations
    pub max_iterations: u64,

    /// Stop once the best cost reaches this value
    pub target_cost: Option<f64>,

    /// Inertia weight applied to particle velocity (argmin default 1/(2 ln 2))
    pub inertia_factor: Option<f64>,

    /// Attraction to the particle's personal best (argmin default 0.5 + ln 2)
    pub cognitive_factor: Option<f64>,

    /// Attraction to the swarm's best (argmin default 0.5 + ln 2)
    pub social_factor: Option<f64>,

    /// Print iteration progress to the terminal
    pub verbose: bool,
}

impl Default for ParticleSwarmConfig {
    fn default() -> Self {
        Self {
            num_particles: 20,
            max_iterations: 1000,
            target_cost: None,
            inertia_factor: None,
            cognitive_factor: None,
            social_factor: None,
            verbose: false,
        }
    }
}

impl ParticleSwarmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_particles(mut self, num_particles: usize) -> Self {
        self.num_particles = num_particles;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_target_cost(mut self, target_cost: f64) -> Self {
        self.target_cost = Some(target_cost);
        self
    }
}

/// Algorithm-specific optimization configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OptimizationConfig {
    /// Nelder-Mead simplex, box bounds enforced by clamping
    NelderMead(NelderMeadConfig),

    /// Particle swarm over the bound box (global search)
    ParticleSwarm(ParticleSwarmConfig),
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        OptimizationConfig::NelderMead(NelderMeadConfig::default())
    }
}

impl OptimizationConfig {
    pub fn max_iterations(&self) -> u64 {
        match self {
            OptimizationConfig::NelderMead(c) => c.max_iterations,
            OptimizationConfig::ParticleSwarm(c) => c.max_iterations,
        }
    }

    pub fn verbose(&self) -> bool {
        match self {
            OptimizationConfig::NelderMead(c) => c.verbose,
            OptimizationConfig::ParticleSwarm(c) => c.verbose,
        }
    }
}

/// How trajectories are advanced between unit-spaced evaluation points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationScheme {
    /// Adaptive Dormand-Prince 5(4)
    #[default]
    DormandPrince,
    /// One forward-difference step per day
    Difference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    pub scheme: IntegrationScheme,
    /// Relative error tolerance per step
    pub rtol: f64,
    /// Absolute error tolerance per step
    pub atol: f64,
    /// Smallest step before giving up
    pub min_step: f64,
    /// Step budget for one integration run (accepted and rejected steps)
    pub max_steps: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            scheme: IntegrationScheme::DormandPrince,
            rtol: 1e-3,
            atol: 1e-6,
            min_step: 1e-10,
            max_steps: 100_000,
        }
    }
}

/// Dispatch strategy for the independent fits of the rolling estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Worker pool; `threads: None` uses the global rayon pool
    Parallel { threads: Option<usize> },
}

/// Immutable settings for one fitting run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Country or region the series belong to
    pub entity: String,
    /// Total population N
    pub population: f64,
    /// Multiplier on confirmed and recovered counts for unreported cases
    pub infected_assumption: f64,
    /// Extra multiplier on recovered counts
    pub recovered_assumption: f64,
    /// Case count at which modelling starts
    pub nth: f64,
    /// Date the transmission rate changes; defaults to the last observed date
    pub intervention_date: Option<NaiveDate>,
    /// Date restrictions are relaxed; two-phase transmission moves to the
    /// midpoint of β and β₂ from here on
    pub reopening_date: Option<NaiveDate>,
    /// Days to project beyond the last observation
    pub horizon: usize,
    pub model: ModelKind,
    /// Fit a separate post-intervention β₂ for two-phase models; otherwise
    /// β carries through every phase
    pub estimate_beta2: bool,
    /// Fit the susceptible pool as a fraction of N
    pub estimate_s0: bool,
    /// Fit the SEIR incubation rate instead of fixing it
    pub estimate_sigma: bool,
    /// SEIR incubation period in days (σ = 1 / period when not fitted)
    pub incubation_period: f64,
    /// Fixed initial exposed count for SEIR
    pub forced_e0: Option<f64>,
    pub bounds: ParameterBounds,
    /// Pin β to this value
    pub forced_beta: Option<f64>,
    /// Pin γ to this value
    pub forced_gamma: Option<f64>,
    /// Admissible interval for the implied reproduction number
    pub r0_bounds: Option<Bounds>,
    /// Admissible interval for the aggregate removal rate
    pub gamma_bounds: Option<Bounds>,
    /// Weight of squared constraint violations in the penalized loss
    pub constraint_penalty: f64,
    /// Weight of the infectious term in two-term losses
    pub alpha: f64,
    /// Weights of the infectious, recovered and fatal terms for SIHRF
    pub alphas: [f64; 3],
    pub hospital: HospitalConfig,
    /// Smooth the recovered curve before fitting
    pub adjust_recovered: bool,
    pub optimizer: OptimizationConfig,
    pub integrator: IntegratorConfig,
    pub execution: ExecutionMode,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            entity: String::new(),
            population: 200e6,
            infected_assumption: 1.0,
            recovered_assumption: 1.0,
            nth: 1.0,
            intervention_date: None,
            reopening_date: None,
            horizon: 150,
            model: ModelKind::Sir,
            estimate_beta2: true,
            estimate_s0: false,
            estimate_sigma: false,
            incubation_period: 7.0,
            forced_e0: None,
            bounds: ParameterBounds::default(),
            forced_beta: None,
            forced_gamma: None,
            r0_bounds: None,
            gamma_bounds: None,
            constraint_penalty: 1e4,
            alpha: 0.5,
            alphas: [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
            hospital: HospitalConfig::default(),
            adjust_recovered: false,
            optimizer: OptimizationConfig::default(),
            integrator: IntegratorConfig::default(),
            execution: ExecutionMode::default(),
        }
    }
}

impl ModelConfig {
    pub fn new(entity: impl Into<String>, population: f64) -> Self {
        Self {
            entity: entity.into(),
            population,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    pub fn with_nth(mut self, nth: f64) -> Self {
        self.nth = nth;
        self
    }

    pub fn with_intervention_date(mut self, date: NaiveDate) -> Self {
        self.intervention_date = Some(date);
        self
    }

    pub fn with_reopening_date(mut self, date: NaiveDate) -> Self {
        self.reopening_date = Some(date);
        self
    }

    pub fn with_estimate_beta2(mut self, estimate_beta2: bool) -> Self {
        self.estimate_beta2 = estimate_beta2;
        self
    }

    pub fn with_estimate_sigma(mut self, estimate_sigma: bool) -> Self {
        self.estimate_sigma = estimate_sigma;
        self
    }

    pub fn with_forced_e0(mut self, e0: f64) -> Self {
        self.forced_e0 = Some(e0);
        self
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_estimate_s0(mut self, estimate_s0: bool) -> Self {
        self.estimate_s0 = estimate_s0;
        self
    }

    pub fn with_bounds(mut self, bounds: ParameterBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_forced_beta(mut self, beta: f64) -> Self {
        self.forced_beta = Some(beta);
        self
    }

    pub fn with_forced_gamma(mut self, gamma: f64) -> Self {
        self.forced_gamma = Some(gamma);
        self
    }

    pub fn with_r0_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.r0_bounds = Some((lower, upper));
        self
    }

    pub fn with_gamma_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.gamma_bounds = Some((lower, upper));
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_alphas(mut self, alphas: [f64; 3]) -> Self {
        self.alphas = alphas;
        self
    }

    pub fn with_hospital(mut self, hospital: HospitalConfig) -> Self {
        self.hospital = hospital;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizationConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_integrator(mut self, integrator: IntegratorConfig) -> Self {
        self.integrator = integrator;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    /// Search interval actually handed to the optimizer for `parameter`.
    ///
    /// A forced β or γ collapses the interval to a single point, so the
    /// optimizer still sees the parameter but cannot move it.
    pub fn search_bounds(&self, parameter: Parameter) -> Bounds {
        match (parameter, self.forced_beta, self.forced_gamma) {
            (Parameter::Beta, Some(beta), _) => (beta, beta),
            (Parameter::Gamma, _, Some(gamma)) => (gamma, gamma),
            _ => self.bounds.get(parameter),
        }
    }

    /// Check every value against its admissible domain
    pub fn validate(&self) -> Result<()> {
        if !(self.population.is_finite() && self.population > 0.0) {
            return invalid(format!(
                "population must be positive, got {}",
                self.population
            ));
        }

        for (name, value) in [
            ("infected_assumption", self.infected_assumption),
            ("recovered_assumption", self.recovered_assumption),
            ("nth", self.nth),
            ("constraint_penalty", self.constraint_penalty),
            ("hospital.rate", self.hospital.rate),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(format!("{} must be non-negative, got {}", name, value));
            }
        }

        if !(self.incubation_period.is_finite() && self.incubation_period > 0.0) {
            return invalid(format!(
                "incubation_period must be positive, got {}",
                self.incubation_period
            ));
        }

        if self.hospital.rate > 1.0 {
            return invalid(format!(
                "hospital.rate is a share and cannot exceed 1, got {}",
                self.hospital.rate
            ));
        }

        for (parameter, bounds) in self.bounds.iter() {
            check_bounds(parameter.as_str(), bounds)?;
        }
        if let Some(bounds) = self.r0_bounds {
            check_bounds("r0_bounds", bounds)?;
        }
        if let Some(bounds) = self.gamma_bounds {
            check_bounds("gamma_bounds", bounds)?;
        }

        for (name, forced) in [
            ("forced_beta", self.forced_beta),
            ("forced_gamma", self.forced_gamma),
        ] {
            if let Some(value) = forced {
                if !(value.is_finite() && value > 0.0) {
                    return invalid(format!("{} must be positive, got {}", name, value));
                }
            }
        }
        if let Some(e0) = self.forced_e0 {
            if !(e0.is_finite() && e0 >= 0.0) {
                return invalid(format!("forced_e0 must be non-negative, got {}", e0));
            }
        }

        if let (Some(intervention), Some(reopening)) = (self.intervention_date, self.reopening_date)
        {
            if reopening <= intervention {
                return invalid(format!(
                    "reopening_date {} must fall after intervention_date {}",
                    reopening, intervention
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.alpha) {
            return invalid(format!("alpha must lie in [0, 1], got {}", self.alpha));
        }
        if self.alphas.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return invalid(format!("alphas must be non-negative, got {:?}", self.alphas));
        }
        let alphas_sum: f64 = self.alphas.iter().sum();
        if (alphas_sum - 1.0).abs() > 1e-9 {
            return invalid(format!("alphas must sum to 1, got {}", alphas_sum));
        }

        let integrator = &self.integrator;
        if !(integrator.rtol > 0.0 && integrator.atol > 0.0 && integrator.min_step > 0.0) {
            return invalid("integrator tolerances and min_step must be positive".to_string());
        }
        if integrator.max_steps == 0 {
            return invalid("integrator.max_steps must be at least 1".to_string());
        }

        match &self.optimizer {
            OptimizationConfig::NelderMead(nm) => {
                if !(nm.sd_tolerance >= 0.0) {
                    return invalid(format!(
                        "sd_tolerance must be non-negative, got {}",
                        nm.sd_tolerance
                    ));
                }
            }
            OptimizationConfig::ParticleSwarm(ps) => {
                if ps.num_particles == 0 {
                    return invalid("particle swarm needs at least one particle".to_string());
                }
            }
        }

        if let ExecutionMode::Parallel { threads: Some(0) } = self.execution {
            return invalid("parallel execution needs at least one thread".to_string());
        }

        Ok(())
    }
}

fn invalid(message: String) -> Result<()> {
    Err(FitError::InvalidConfig(message))
}

fn check_bounds(name: &str, (lower, upper): Bounds) -> Result<()> {
    if !(lower.is_finite() && upper.is_finite()) {
        return invalid(format!("{} bounds must be finite, got ({}, {})", name, lower, upper));
    }
    if lower > upper {
        return invalid(format!(
            "{} lower bound {} exceeds upper bound {}",
            name, lower, upper
        ));
    }
    Ok(())
}
