use sirfit_core::{FitError, Result};

use crate::{OdeSystem, Trajectory};

/// Unit-step forward difference: `x[t+1] = x[t] + f(t, x[t])`
///
/// Each call to [`step`](Self::step) applies one day of flows. Cheaper and
/// coarser than the adaptive integrator; used for linear projections.
pub struct DifferenceStepper<'s, S: OdeSystem> {
    system: &'s S,
    state: Vec<f64>,
    flows: Vec<f64>,
    current_step: f64,
    // Kept for reset
    initial_state: Vec<f64>,
}

impl<'s, S: OdeSystem> DifferenceStepper<'s, S> {
    pub fn new(system: &'s S, initial_state: &[f64]) -> Result<Self> {
        let dimension = system.dimension();
        if initial_state.len() != dimension {
            return Err(FitError::IntegrationFailure {
                t: 0.0,
                reason: format!(
                    "state has {} compartments, system expects {}",
                    initial_state.len(),
                    dimension
                ),
            });
        }
        Ok(Self {
            system,
            state: initial_state.to_vec(),
            flows: vec![0.0; dimension],
            current_step: 0.0,
            initial_state: initial_state.to_vec(),
        })
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn current_step(&self) -> f64 {
        self.current_step
    }

    pub fn step(&mut self) -> Result<()> {
        self.system.rhs(self.current_step, &self.state, &mut self.flows);

        if self.flows.iter().any(|f| !f.is_finite()) {
            return Err(FitError::IntegrationFailure {
                t: self.current_step,
                reason: "non-finite flow".into(),
            });
        }

        for (value, flow) in self.state.iter_mut().zip(&self.flows) {
            *value += flow;
        }
        self.current_step += 1.0;

        Ok(())
    }

    /// Record the current state, then `num_steps` further states
    pub fn run(&mut self, num_steps: usize) -> Result<Trajectory> {
        let mut rows = Vec::with_capacity(num_steps + 1);
        rows.push(self.state.clone());

        for _ in 0..num_steps {
            self.step()?;
            rows.push(self.state.clone());
        }

        Ok(Trajectory::new(rows))
    }

    pub fn reset(&mut self) {
        self.state.clone_from(&self.initial_state);
        self.current_step = 0.0;
    }
}
