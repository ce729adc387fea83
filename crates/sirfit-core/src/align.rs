//! Alignment of raw case series
//!
//! Raw confirmed/recovered/fatal series are scaled by the reporting
//! multipliers, optionally smoothed, and truncated to start on the first date
//! the confirmed count reaches the configured threshold.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{FitError, Result};
use crate::types::TimeSeries;

/// Observed series truncated to the modelling window, plus the intervention
/// mask over the same dates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignedSeries {
    dates: Vec<NaiveDate>,
    confirmed: Vec<f64>,
    recovered: Vec<f64>,
    fatal: Vec<f64>,
    intervention_mask: Vec<bool>,
    intervention_date: NaiveDate,
    intervention_offset: usize,
}

impl AlignedSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn confirmed(&self) -> &[f64] {
        &self.confirmed
    }

    pub fn recovered(&self) -> &[f64] {
        &self.recovered
    }

    pub fn fatal(&self) -> &[f64] {
        &self.fatal
    }

    /// `true` on and after the intervention date
    pub fn intervention_mask(&self) -> &[bool] {
        &self.intervention_mask
    }

    pub fn intervention_date(&self) -> NaiveDate {
        self.intervention_date
    }

    /// Position of the intervention date within the aligned index
    pub fn intervention_offset(&self) -> usize {
        self.intervention_offset
    }

    /// Days from the first aligned date to `date`; dates past the window give
    /// offsets beyond [`Self::len`]
    pub fn day_offset(&self, date: NaiveDate) -> Option<f64> {
        self.first_date().map(|first| (date - first).num_days() as f64)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Currently infectious: confirmed minus recovered minus fatal
    pub fn infectious_actual(&self) -> Vec<f64> {
        self.confirmed
            .iter()
            .zip(&self.recovered)
            .zip(&self.fatal)
            .map(|((c, r), f)| c - r - f)
            .collect()
    }

    /// Removed: recovered plus fatal
    pub fn removed_actual(&self) -> Vec<f64> {
        self.recovered
            .iter()
            .zip(&self.fatal)
            .map(|(r, f)| r + f)
            .collect()
    }

    /// The first `len` observations, keeping the intervention offset.
    ///
    /// Used for walk-forward re-estimation; `len` is capped at the series
    /// length.
    pub fn prefix(&self, len: usize) -> AlignedSeries {
        let len = len.min(self.len());
        AlignedSeries {
            dates: self.dates[..len].to_vec(),
            confirmed: self.confirmed[..len].to_vec(),
            recovered: self.recovered[..len].to_vec(),
            fatal: self.fatal[..len].to_vec(),
            intervention_mask: self.intervention_mask[..len].to_vec(),
            intervention_date: self.intervention_date,
            intervention_offset: self.intervention_offset,
        }
    }
}

/// Align raw series for one entity according to `config`.
///
/// Fails with [`FitError::DataAlignment`] when the series do not share a date
/// index, contain negative counts, never reach `config.nth`, or produce a
/// negative infectious count after truncation.
pub fn align(
    confirmed: &TimeSeries,
    recovered: &TimeSeries,
    fatal: &TimeSeries,
    config: &ModelConfig,
) -> Result<AlignedSeries> {
    if confirmed.is_empty() {
        return Err(FitError::DataAlignment("confirmed series is empty".into()));
    }
    if confirmed.dates() != recovered.dates() || confirmed.dates() != fatal.dates() {
        return Err(FitError::DataAlignment(
            "confirmed, recovered and fatal series must share the same dates".into(),
        ));
    }
    for (name, series) in [
        ("confirmed", confirmed),
        ("recovered", recovered),
        ("fatal", fatal),
    ] {
        if let Some(idx) = series.values().iter().position(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(FitError::DataAlignment(format!(
                "{} count {} on {} is not a non-negative number",
                name,
                series.values()[idx],
                series.dates()[idx]
            )));
        }
    }

    let recovered_raw = if config.adjust_recovered {
        smooth_monotone(recovered.values())
    } else {
        recovered.values().to_vec()
    };

    let confirmed_scaled: Vec<f64> = confirmed
        .values()
        .iter()
        .map(|v| v * config.infected_assumption)
        .collect();
    let recovered_scaled: Vec<f64> = recovered_raw
        .iter()
        .map(|v| v * config.infected_assumption * config.recovered_assumption)
        .collect();

    let start = confirmed_scaled
        .iter()
        .position(|&c| c >= config.nth)
        .ok_or_else(|| {
            FitError::DataAlignment(format!(
                "{}: confirmed cases never reach the threshold of {}",
                config.entity, config.nth
            ))
        })?;

    let all_dates = confirmed.dates();
    let intervention_date = config
        .intervention_date
        .unwrap_or(all_dates[all_dates.len() - 1]);

    let dates = all_dates[start..].to_vec();
    let intervention_mask = dates.iter().map(|d| *d >= intervention_date).collect();
    let intervention_offset = dates.partition_point(|d| *d < intervention_date);

    let aligned = AlignedSeries {
        dates,
        confirmed: confirmed_scaled[start..].to_vec(),
        recovered: recovered_scaled[start..].to_vec(),
        fatal: fatal.values()[start..].to_vec(),
        intervention_mask,
        intervention_date,
        intervention_offset,
    };

    if let Some(idx) = aligned.infectious_actual().iter().position(|&i| i < 0.0) {
        return Err(FitError::DataAlignment(format!(
            "{}: recovered plus fatal exceed confirmed on {}",
            config.entity, aligned.dates[idx]
        )));
    }

    log::debug!(
        "{}: aligned {} observations starting {} (intervention offset {})",
        config.entity,
        aligned.len(),
        aligned.dates[0],
        aligned.intervention_offset
    );

    Ok(aligned)
}

/// Replace non-increasing day-over-day values with gaps and fill the gaps by
/// linear interpolation. Trailing gaps take the last valid value.
pub fn smooth_monotone(values: &[f64]) -> Vec<f64> {
    let mut kept: Vec<Option<f64>> = Vec::with_capacity(values.len());
    for (idx, &value) in values.iter().enumerate() {
        if idx > 0 && value - values[idx - 1] <= 0.0 {
            kept.push(None);
        } else {
            kept.push(Some(value));
        }
    }

    let mut smoothed = Vec::with_capacity(values.len());
    let mut last_valid: Option<(usize, f64)> = None;
    for idx in 0..kept.len() {
        match kept[idx] {
            Some(value) => {
                smoothed.push(value);
                last_valid = Some((idx, value));
            }
            None => {
                let next_valid = kept[idx + 1..]
                    .iter()
                    .enumerate()
                    .find_map(|(k, v)| v.map(|v| (idx + 1 + k, v)));
                let filled = match (last_valid, next_valid) {
                    (Some((i0, v0)), Some((i1, v1))) => {
                        v0 + (v1 - v0) * (idx - i0) as f64 / (i1 - i0) as f64
                    }
                    (Some((_, v0)), None) => v0,
                    (None, _) => values[idx],
                };
                smoothed.push(filled);
            }
        }
    }
    smoothed
}
