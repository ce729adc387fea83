//! Forward integration of sirfit compartment models.
//!
//! [`simulate`] is the single entry point used by both the estimator (over the
//! fit window) and the forecaster (over fit window plus horizon). The scheme
//! is picked from [`IntegratorConfig::scheme`].

pub mod difference;
pub mod integrator;
pub mod trajectory;

pub use difference::DifferenceStepper;
pub use integrator::DormandPrince;
pub use trajectory::Trajectory;

use sirfit_core::{CompartmentModel, CompartmentState, IntegrationScheme, IntegratorConfig, Result};

/// Right-hand side of an autonomous or time-dependent ODE system
///
/// Implementations write into a caller-owned buffer so integrators can reuse
/// their stage storage for every evaluation. There is no batched form: each
/// Runge-Kutta stage is evaluated at a state built from the previous stages,
/// so an integration only ever has one state to evaluate at a time.
pub trait OdeSystem {
    /// Length of the state vector
    fn dimension(&self) -> usize;

    /// Write `dy/dt` at `(t, y)` into `dy`
    fn rhs(&self, t: f64, y: &[f64], dy: &mut [f64]);
}

/// A compartment model paired with one parameter point
#[derive(Clone, Copy, Debug)]
pub struct ModelSystem<'a> {
    model: &'a CompartmentModel,
    params: &'a [f64],
}

impl<'a> ModelSystem<'a> {
    pub fn new(model: &'a CompartmentModel, params: &'a [f64]) -> Self {
        Self { model, params }
    }
}

impl OdeSystem for ModelSystem<'_> {
    fn dimension(&self) -> usize {
        self.model.dimension()
    }

    #[inline]
    fn rhs(&self, t: f64, y: &[f64], dy: &mut [f64]) {
        self.model.derivative(t, y, self.params, dy);
    }
}

/// Integrate `model` at `params` from `initial`, returning `size` daily states
/// (`t = 0, 1, ..., size - 1`).
///
/// Fails with `FitError::IntegrationFailure` when the solver cannot advance.
pub fn simulate(
    model: &CompartmentModel,
    initial: &CompartmentState,
    params: &[f64],
    size: usize,
    config: &IntegratorConfig,
) -> Result<Trajectory> {
    let system = ModelSystem::new(model, params);
    match config.scheme {
        IntegrationScheme::DormandPrince => {
            DormandPrince::from_config(config).integrate(&system, initial.as_slice(), size)
        }
        IntegrationScheme::Difference => {
            let mut stepper = DifferenceStepper::new(&system, initial.as_slice())?;
            if size == 0 {
                return Ok(Trajectory::default());
            }
            stepper.run(size - 1)
        }
    }
}
