//! Optimization solver setup and execution

use argmin::core::observers::ObserverMode;
use argmin::core::{
    CostFunction, Executor, OptimizationResult, Solver, State, TerminationReason,
    TerminationStatus,
};
use argmin::solver::neldermead::NelderMead;
use argmin::solver::particleswarm::ParticleSwarm;
use argmin_observer_slog::SlogLogger;
use sirfit_core::{
    Bounds, FitError, NelderMeadConfig, OptimizationConfig, ParticleSwarmConfig, Result,
};

use crate::calibration_problem::CalibrationProblem;
use crate::progress::ProgressObserver;
use crate::types::{CalibrationResult, OptimizerStatus};

/// Log the optimization header
fn log_optimization_header(
    algorithm: &str,
    parameter_names: &[String],
    initial_values: &[f64],
    max_iterations: u64,
) {
    log::debug!("=== {} Optimization ===", algorithm);
    log::debug!("Parameters: {:?}", parameter_names);
    log::debug!("Initial values: {:?}", initial_values);
    log::debug!("Max iterations: {}", max_iterations);
}

/// Run executor, attaching a progress observer when anyone is listening
fn run_observed<O, S, I>(
    executor: Executor<O, S, I>,
    verbose: bool,
    label: &str,
) -> Result<OptimizationResult<O, S, I>>
where
    O: CostFunction,
    S: Solver<O, I>,
    I: State,
    <I as State>::Float: std::fmt::LowerExp,
{
    let executor = if verbose {
        executor.add_observer(SlogLogger::term(), ObserverMode::Always)
    } else if log::log_enabled!(log::Level::Debug) {
        executor.add_observer(ProgressObserver::new(label), ObserverMode::Always)
    } else {
        executor
    };

    executor
        .run()
        .map_err(|e| FitError::Optimizer(format!("Optimization failed: {}", e)))
}

/// Converged means the solver's own criterion (or the target cost) stopped
/// it; running out of iterations does not count.
fn optimizer_status(status: &TerminationStatus, iterations: u64) -> OptimizerStatus {
    let converged = matches!(
        status,
        TerminationStatus::Terminated(
            TerminationReason::SolverConverged | TerminationReason::TargetCostReached
        )
    );
    OptimizerStatus {
        converged,
        iterations,
        termination_reason: format!("{:?}", status),
    }
}

/// Run optimization on a calibration problem
///
/// `label` tags progress output (usually the entity being fitted).
///
/// # Example
///
/// ```rust,ignore
/// use sirfit_calibration::optimize;
/// use sirfit_core::{NelderMeadConfig, OptimizationConfig};
///
/// let config = OptimizationConfig::NelderMead(
///     NelderMeadConfig::new()
///         .with_max_iterations(1000)
///         .with_sd_tolerance(1e-6),
/// );
///
/// let result = optimize(problem, &config, "Brazil")?;
/// println!("Best parameters: {:?}", result.best_parameters);
/// ```
pub fn optimize(
    problem: CalibrationProblem<'_>,
    config: &OptimizationConfig,
    label: &str,
) -> Result<CalibrationResult> {
    let initial_params = problem.initial_parameters();
    let parameter_names = problem.parameter_names();

    match config {
        OptimizationConfig::NelderMead(nm_config) => {
            optimize_nelder_mead(problem, initial_params, parameter_names, nm_config, label)
        }
        OptimizationConfig::ParticleSwarm(ps_config) => {
            optimize_particle_swarm(problem, initial_params, parameter_names, ps_config, label)
        }
    }
}

/// Initial simplex: the start point plus one vertex per parameter.
///
/// Each vertex moves one coordinate by 10% of its value (5% of the bound range
/// when the value is zero), staying inside the bounds. When the bound forbids
/// the move (a pinned parameter, or a start on the upper bound) the vertex
/// steps the other way so the simplex never degenerates.
fn initial_simplex(initial_params: &[f64], bounds: &[Bounds]) -> Vec<Vec<f64>> {
    let mut vertices = vec![initial_params.to_vec()];

    for (i, &(lower, upper)) in bounds.iter().enumerate() {
        let value = initial_params[i];
        let step = if value != 0.0 {
            0.1 * value.abs()
        } else if upper > lower {
            0.05 * (upper - lower)
        } else {
            0.05
        };

        let mut vertex = initial_params.to_vec();
        let forward = (value + step).clamp(lower, upper);
        vertex[i] = if forward != value {
            forward
        } else {
            value - step
        };
        vertices.push(vertex);
    }

    vertices
}

/// Build Nelder-Mead solver from configuration
fn build_nelder_mead_solver(
    initial_params: &[f64],
    bounds: &[Bounds],
    config: &NelderMeadConfig,
) -> Result<NelderMead<Vec<f64>, f64>> {
    let vertices = initial_simplex(initial_params, bounds);
    let setup = |what: &str, e: argmin::core::Error| {
        FitError::Optimizer(format!("Failed to set {}: {}", what, e))
    };

    let mut solver = NelderMead::new(vertices)
        .with_sd_tolerance(config.sd_tolerance)
        .map_err(|e| setup("sd_tolerance", e))?;

    if let Some(alpha) = config.alpha {
        solver = solver.with_alpha(alpha).map_err(|e| setup("alpha", e))?;
    }

    if let Some(gamma) = config.gamma {
        solver = solver.with_gamma(gamma).map_err(|e| setup("gamma", e))?;
    }

    if let Some(rho) = config.rho {
        solver = solver.with_rho(rho).map_err(|e| setup("rho", e))?;
    }

    if let Some(sigma) = config.sigma {
        solver = solver.with_sigma(sigma).map_err(|e| setup("sigma", e))?;
    }

    Ok(solver)
}

/// Optimize using Nelder-Mead algorithm
fn optimize_nelder_mead(
    problem: CalibrationProblem<'_>,
    initial_params: Vec<f64>,
    parameter_names: Vec<String>,
    config: &NelderMeadConfig,
    label: &str,
) -> Result<CalibrationResult> {
    let bounds = problem.parameter_bounds();
    let solver = build_nelder_mead_solver(&initial_params, &bounds, config)?;

    log_optimization_header(
        "Nelder-Mead",
        &parameter_names,
        &initial_params,
        config.max_iterations,
    );
    log::debug!("SD tolerance: {}", config.sd_tolerance);

    let executor =
        Executor::new(problem, solver).configure(|state| state.max_iters(config.max_iterations));
    let result = run_observed(executor, config.verbose, label)?;

    let state = result.state();

    Ok(CalibrationResult {
        best_parameters: state.best_param.clone().unwrap_or(initial_params),
        parameter_names,
        final_loss: state.best_cost,
        status: optimizer_status(&state.termination_status, state.iter),
    })
}

/// Optimize using Particle Swarm algorithm
fn optimize_particle_swarm(
    problem: CalibrationProblem<'_>,
    initial_params: Vec<f64>,
    parameter_names: Vec<String>,
    config: &ParticleSwarmConfig,
    label: &str,
) -> Result<CalibrationResult> {
    let bounds = problem.parameter_bounds();
    let lower_bound: Vec<f64> = bounds.iter().map(|(min, _)| *min).collect();
    let upper_bound: Vec<f64> = bounds.iter().map(|(_, max)| *max).collect();

    let setup = |what: &str, e: argmin::core::Error| {
        FitError::Optimizer(format!("Failed to set {}: {}", what, e))
    };

    let mut solver = ParticleSwarm::new((lower_bound, upper_bound), config.num_particles);

    if let Some(inertia) = config.inertia_factor {
        solver = solver
            .with_inertia_factor(inertia)
            .map_err(|e| setup("inertia_factor", e))?;
    }

    if let Some(cognitive) = config.cognitive_factor {
        solver = solver
            .with_cognitive_factor(cognitive)
            .map_err(|e| setup("cognitive_factor", e))?;
    }

    if let Some(social) = config.social_factor {
        solver = solver
            .with_social_factor(social)
            .map_err(|e| setup("social_factor", e))?;
    }

    log_optimization_header(
        "Particle Swarm",
        &parameter_names,
        &initial_params,
        config.max_iterations,
    );
    log::debug!("Bounds: {:?}", bounds);
    log::debug!("Num particles: {}", config.num_particles);
    if let Some(target) = config.target_cost {
        log::debug!("Target cost: {}", target);
    }

    let executor = Executor::new(problem, solver).configure(|state| {
        let mut state = state.max_iters(config.max_iterations);
        if let Some(target) = config.target_cost {
            state = state.target_cost(target);
        }
        state
    });
    let result = run_observed(executor, config.verbose, label)?;

    let state = result.state();

    // For ParticleSwarm, best_individual contains the best particle found
    let (best_params, best_cost) = match &state.best_individual {
        Some(particle) => (particle.position.clone(), particle.cost),
        None => (initial_params, f64::INFINITY),
    };

    Ok(CalibrationResult {
        best_parameters: best_params,
        parameter_names,
        final_loss: best_cost,
        status: optimizer_status(&state.termination_status, state.iter),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplex_perturbs_each_coordinate_once() {
        let vertices = initial_simplex(&[0.2, 0.0], &[(0.0, 1.0), (0.0, 0.4)]);
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[0], vec![0.2, 0.0]);
        assert_eq!(vertices[1][1], 0.0);
        assert!((vertices[1][0] - 0.22).abs() < 1e-12);
        assert_eq!(vertices[2][0], 0.2);
        assert!((vertices[2][1] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_simplex_steps_back_from_upper_bound_and_pinned_values() {
        let vertices = initial_simplex(&[1.0, 0.3], &[(0.0, 1.0), (0.3, 0.3)]);
        assert!((vertices[1][0] - 0.9).abs() < 1e-12);
        assert!(vertices[2][1] < 0.3);
    }

    #[test]
    fn test_only_solver_criteria_count_as_converged() {
        let converged = optimizer_status(
            &TerminationStatus::Terminated(TerminationReason::SolverConverged),
            12,
        );
        assert!(converged.converged);
        assert_eq!(converged.iterations, 12);

        let exhausted = optimizer_status(
            &TerminationStatus::Terminated(TerminationReason::MaxItersReached),
            5,
        );
        assert!(!exhausted.converged);
        assert!(exhausted.termination_reason.contains("MaxItersReached"));
    }
}
