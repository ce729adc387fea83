//! Walk-forward re-estimation over growing prefixes of the observed series

use rayon::prelude::*;
use sirfit_core::{AlignedSeries, ExecutionMode, FitError, ModelConfig, Result};

use crate::estimator::fit;
use crate::types::{RollingEntry, RollingSeries};

/// Refit from scratch on every prefix `aligned[..=k]`, one entry per observed
/// date in chronological order.
///
/// Fits are independent. With [`ExecutionMode::Parallel`] they run on a rayon
/// pool (a dedicated one when `threads` is set); the result order matches the
/// dates regardless of completion order. The first failing fit aborts the run.
pub fn rolling_fit(aligned: &AlignedSeries, config: &ModelConfig) -> Result<RollingSeries> {
    config.validate()?;
    if aligned.is_empty() {
        return Err(FitError::DataAlignment(format!(
            "{}: no observations to re-estimate over",
            config.entity
        )));
    }

    let cutoffs: Vec<usize> = (1..=aligned.len()).collect();
    let fit_prefix = |&len: &usize| -> Result<RollingEntry> {
        let prefix = aligned.prefix(len);
        let date = aligned.dates()[len - 1];
        log::debug!("{}: walk-forward fit through {}", config.entity, date);
        Ok(RollingEntry {
            date,
            fit: fit(&prefix, config)?,
        })
    };

    let entries = match config.execution {
        ExecutionMode::Sequential => cutoffs.iter().map(fit_prefix).collect::<Result<Vec<_>>>()?,
        ExecutionMode::Parallel { threads: None } => cutoffs
            .par_iter()
            .map(fit_prefix)
            .collect::<Result<Vec<_>>>()?,
        ExecutionMode::Parallel {
            threads: Some(threads),
        } => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| FitError::Optimizer(format!("Failed to start worker pool: {}", e)))?;
            pool.install(|| {
                cutoffs
                    .par_iter()
                    .map(fit_prefix)
                    .collect::<Result<Vec<_>>>()
            })?
        }
    };

    log::info!(
        "{}: {} walk-forward fits from {} to {}",
        config.entity,
        entries.len(),
        aligned.dates()[0],
        aligned.dates()[aligned.len() - 1]
    );

    Ok(RollingSeries { entries })
}
