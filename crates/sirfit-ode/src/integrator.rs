//! Adaptive Dormand-Prince 5(4) integration with error control

use sirfit_core::{FitError, IntegratorConfig, Result};

use crate::{OdeSystem, Trajectory};

const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

const A2: [f64; 1] = [1.0 / 5.0];
const A3: [f64; 2] = [3.0 / 40.0, 9.0 / 40.0];
const A4: [f64; 3] = [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0];
const A5: [f64; 4] = [
    19372.0 / 6561.0,
    -25360.0 / 2187.0,
    64448.0 / 6561.0,
    -212.0 / 729.0,
];
const A6: [f64; 5] = [
    9017.0 / 3168.0,
    -355.0 / 33.0,
    46732.0 / 5247.0,
    49.0 / 176.0,
    -5103.0 / 18656.0,
];

/// Fifth-order weights (also the last stage row, so the final stage is FSAL)
const B: [f64; 6] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
];

/// Difference between the fifth- and fourth-order weights
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const ERROR_EXPONENT: f64 = -1.0 / 5.0;

/// Explicit adaptive Runge-Kutta solver for small non-stiff systems
#[derive(Clone, Debug, PartialEq)]
pub struct DormandPrince {
    rtol: f64,
    atol: f64,
    min_step: f64,
    max_steps: usize,
}

impl DormandPrince {
    pub fn new(rtol: f64, atol: f64) -> Self {
        let defaults = IntegratorConfig::default();
        Self {
            rtol,
            atol,
            min_step: defaults.min_step,
            max_steps: defaults.max_steps,
        }
    }

    pub fn from_config(config: &IntegratorConfig) -> Self {
        Self {
            rtol: config.rtol,
            atol: config.atol,
            min_step: config.min_step,
            max_steps: config.max_steps,
        }
    }

    pub fn with_min_step(mut self, min_step: f64) -> Self {
        self.min_step = min_step;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Integrate from `t = 0`, returning the state at `t = 0, 1, ..., size - 1`.
    ///
    /// Internal steps are shortened so every evaluation point is hit exactly;
    /// no interpolation is involved.
    pub fn integrate<S: OdeSystem + ?Sized>(
        &self,
        system: &S,
        y0: &[f64],
        size: usize,
    ) -> Result<Trajectory> {
        let n = system.dimension();
        if y0.len() != n {
            return Err(failure(
                0.0,
                format!("state has {} compartments, system expects {}", y0.len(), n),
            ));
        }
        if size == 0 {
            return Ok(Trajectory::default());
        }

        let mut rows = Vec::with_capacity(size);
        rows.push(y0.to_vec());
        if size == 1 {
            return Ok(Trajectory::new(rows));
        }

        let mut work = Workspace::new(n);
        let mut y = y0.to_vec();
        let mut t = 0.0;

        system.rhs(t, &y, &mut work.k[0]);
        if !all_finite(&work.k[0]) {
            return Err(failure(t, "non-finite derivative at the initial state".into()));
        }

        let mut h = self.initial_step(&y, &work.k[0]);
        let mut steps = 0usize;
        let mut rejected = 0usize;

        for target in 1..size {
            let t_target = target as f64;
            while t < t_target {
                if steps >= self.max_steps {
                    return Err(failure(
                        t,
                        format!("step budget of {} exhausted", self.max_steps),
                    ));
                }
                steps += 1;

                let remaining = t_target - t;
                let lands = remaining <= h * (1.0 + 1e-9);
                let step = if lands { remaining } else { h };

                self.attempt(system, t, step, &y, &mut work);
                let error = self.error_norm(step, &y, &work);

                if error.is_finite() && error <= 1.0 && all_finite(&work.y_new) {
                    let factor = if error == 0.0 {
                        MAX_FACTOR
                    } else {
                        (SAFETY * error.powf(ERROR_EXPONENT)).clamp(MIN_FACTOR, MAX_FACTOR)
                    };
                    t = if lands { t_target } else { t + step };
                    std::mem::swap(&mut y, &mut work.y_new);
                    work.k.swap(0, 6);
                    // A step shortened to land on an evaluation point says
                    // nothing about the size the next step can take
                    if !(lands && step < h) {
                        h = step * factor;
                    }
                } else {
                    rejected += 1;
                    let factor = if error.is_finite() {
                        (SAFETY * error.powf(ERROR_EXPONENT)).clamp(MIN_FACTOR, 1.0)
                    } else {
                        MIN_FACTOR
                    };
                    h = step * factor;
                    if h < self.min_step {
                        return Err(failure(
                            t,
                            format!("step size {:e} fell below the minimum {:e}", h, self.min_step),
                        ));
                    }
                }
            }
            rows.push(y.clone());
        }

        log::trace!(
            "integrated {} points: {} steps ({} rejected)",
            size,
            steps,
            rejected
        );

        Ok(Trajectory::new(rows))
    }

    /// Hairer's starting step estimate, capped at one evaluation interval
    fn initial_step(&self, y0: &[f64], f0: &[f64]) -> f64 {
        let scale = |i: usize| self.atol + self.rtol * y0[i].abs();
        let d0 = rms((0..y0.len()).map(|i| y0[i] / scale(i)));
        let d1 = rms((0..y0.len()).map(|i| f0[i] / scale(i)));
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        h0.max(self.min_step).min(1.0)
    }

    /// Evaluate stages 2..7 and the fifth-order solution for one trial step
    fn attempt<S: OdeSystem + ?Sized>(
        &self,
        system: &S,
        t: f64,
        h: f64,
        y: &[f64],
        work: &mut Workspace,
    ) {
        let rows: [&[f64]; 5] = [&A2, &A3, &A4, &A5, &A6];
        for (stage, weights) in rows.iter().enumerate() {
            let stage = stage + 1;
            for i in 0..y.len() {
                let increment: f64 = weights
                    .iter()
                    .enumerate()
                    .map(|(j, a)| a * work.k[j][i])
                    .sum();
                work.y_stage[i] = y[i] + h * increment;
            }
            system.rhs(t + C[stage] * h, &work.y_stage, &mut work.k[stage]);
        }

        for i in 0..y.len() {
            let increment: f64 = B.iter().enumerate().map(|(j, b)| b * work.k[j][i]).sum();
            work.y_new[i] = y[i] + h * increment;
        }
        system.rhs(t + h, &work.y_new, &mut work.k[6]);
    }

    /// Scaled RMS of the embedded error estimate; accept when <= 1
    fn error_norm(&self, h: f64, y: &[f64], work: &Workspace) -> f64 {
        rms((0..y.len()).map(|i| {
            let estimate: f64 = E.iter().enumerate().map(|(j, e)| e * work.k[j][i]).sum();
            let scale = self.atol + self.rtol * y[i].abs().max(work.y_new[i].abs());
            h * estimate / scale
        }))
    }
}

impl Default for DormandPrince {
    fn default() -> Self {
        Self::from_config(&IntegratorConfig::default())
    }
}

/// Stage buffers reused across steps of one integration run
struct Workspace {
    k: [Vec<f64>; 7],
    y_stage: Vec<f64>,
    y_new: Vec<f64>,
}

impl Workspace {
    fn new(n: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![0.0; n]),
            y_stage: vec![0.0; n],
            y_new: vec![0.0; n],
        }
    }
}

fn rms(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let len = values.len().max(1) as f64;
    (values.map(|v| v * v).sum::<f64>() / len).sqrt()
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

fn failure(t: f64, reason: String) -> FitError {
    FitError::IntegrationFailure { t, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Decay(f64);

    impl OdeSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn rhs(&self, _t: f64, y: &[f64], dy: &mut [f64]) {
            dy[0] = -self.0 * y[0];
        }
    }

    /// Harmonic oscillator; exercises stages with mixed signs
    struct Oscillator;

    impl OdeSystem for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn rhs(&self, _t: f64, y: &[f64], dy: &mut [f64]) {
            dy[0] = y[1];
            dy[1] = -y[0];
        }
    }

    struct Broken;

    impl OdeSystem for Broken {
        fn dimension(&self) -> usize {
            1
        }

        fn rhs(&self, _t: f64, _y: &[f64], dy: &mut [f64]) {
            dy[0] = f64::NAN;
        }
    }

    #[test]
    fn test_exponential_decay_matches_closed_form() {
        let solver = DormandPrince::new(1e-9, 1e-12);
        let trajectory = solver.integrate(&Decay(0.5), &[1.0], 11).unwrap();
        assert_eq!(trajectory.len(), 11);
        for (t, row) in trajectory.rows().iter().enumerate() {
            assert_relative_eq!(row[0], (-0.5 * t as f64).exp(), max_relative = 1e-7);
        }
    }

    #[test]
    fn test_oscillator_stays_on_circle() {
        let solver = DormandPrince::new(1e-8, 1e-10);
        let trajectory = solver.integrate(&Oscillator, &[1.0, 0.0], 21).unwrap();
        let end = trajectory.last().unwrap();
        assert_relative_eq!(end[0], 20f64.cos(), epsilon = 1e-5);
        assert_relative_eq!(end[1], -20f64.sin(), epsilon = 1e-5);
    }

    #[test]
    fn test_default_tolerance_is_reasonable() {
        let trajectory = DormandPrince::default()
            .integrate(&Decay(0.2), &[1000.0], 31)
            .unwrap();
        assert_relative_eq!(
            trajectory.last().unwrap()[0],
            1000.0 * (-6.0f64).exp(),
            max_relative = 1e-2
        );
    }

    #[test]
    fn test_single_point_returns_initial_state() {
        let trajectory = DormandPrince::default()
            .integrate(&Decay(1.0), &[3.0], 1)
            .unwrap();
        assert_eq!(trajectory.rows(), &[vec![3.0]]);
        assert!(DormandPrince::default()
            .integrate(&Decay(1.0), &[3.0], 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_nan_derivative_is_integration_failure() {
        let err = DormandPrince::default()
            .integrate(&Broken, &[1.0], 5)
            .unwrap_err();
        assert!(matches!(err, FitError::IntegrationFailure { .. }));
    }

    #[test]
    fn test_step_budget_is_enforced() {
        let solver = DormandPrince::new(1e-10, 1e-12).with_max_steps(3);
        let err = solver.integrate(&Decay(1.0), &[1.0], 50).unwrap_err();
        assert!(matches!(err, FitError::IntegrationFailure { .. }));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        assert!(DormandPrince::default()
            .integrate(&Oscillator, &[1.0], 3)
            .is_err());
    }
}
