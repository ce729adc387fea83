//! argmin observer that reports optimization progress through `log`

use argmin::core::observers::Observe;
use argmin::core::{State, KV};

/// Observer that writes optimization progress as table rows at debug level
pub struct ProgressObserver {
    /// Number of iterations between header repeats
    header_interval: u64,
    /// Last iteration where header was printed
    last_header_iter: u64,
    /// Prefix identifying the fit (usually the entity)
    label: String,
}

impl ProgressObserver {
    /// Create a new observer with default header interval of 100
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            header_interval: 100,
            last_header_iter: 0,
            label: label.into(),
        }
    }

    pub fn with_header_interval(mut self, header_interval: u64) -> Self {
        self.header_interval = header_interval;
        self
    }

    fn header_due(&self, iter: u64) -> bool {
        iter == 0 || iter.saturating_sub(self.last_header_iter) >= self.header_interval
    }

    fn print_header(&self) {
        log::debug!("{}: {}", self.label, "=".repeat(92));
        log::debug!(
            "{}: {:>12} | {:>14} | {:>16} | {:>16} | {:>16}",
            self.label,
            "Iteration",
            "Time (s)",
            "Objective",
            "Best Objective",
            "Obj. Evaluations"
        );
        log::debug!("{}: {}", self.label, "=".repeat(92));
    }
}

impl<I> Observe<I> for ProgressObserver
where
    I: State,
    <I as State>::Float: std::fmt::LowerExp,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), argmin::core::Error> {
        let iter = state.get_iter();

        if self.header_due(iter) {
            self.print_header();
            self.last_header_iter = iter;
        }

        let obj = state.get_cost();
        let best_obj = state.get_best_cost();
        let time = state.get_time().map(|d| d.as_secs_f64()).unwrap_or(0.0);
        let obj_evaluations = state
            .get_func_counts()
            .get("cost_count")
            .copied()
            .unwrap_or(0);

        log::debug!(
            "{}: {:>12} | {:>14.6} | {:>16} | {:>16} | {:>16}",
            self.label,
            iter,
            time,
            format!("{:.6e}", obj),
            format!("{:.6e}", best_obj),
            obj_evaluations,
        );
        Ok(())
    }
}
