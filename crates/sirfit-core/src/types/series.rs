use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// An ordered sequence of daily observations with strictly increasing dates
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Create a time series, checking that dates and values line up and that
    /// dates are strictly increasing (which also rules out duplicates).
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(FitError::DataAlignment(format!(
                "{} dates but {} values",
                dates.len(),
                values.len()
            )));
        }

        if let Some(pair) = dates.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(FitError::DataAlignment(format!(
                "dates must be strictly increasing ({} is followed by {})",
                pair[0], pair[1]
            )));
        }

        Ok(Self { dates, values })
    }

    /// Build a series of consecutive days starting at `start`
    pub fn daily(start: NaiveDate, values: Vec<f64>) -> Self {
        let dates = start.iter_days().take(values.len()).collect();
        Self { dates, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value observed on `date`, if any
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|idx| self.values[idx])
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    #[test]
    fn test_rejects_unsorted_dates() {
        let err = TimeSeries::new(vec![day(2), day(1)], vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, FitError::DataAlignment(_)));
    }

    #[test]
    fn test_rejects_duplicate_dates() {
        assert!(TimeSeries::new(vec![day(1), day(1)], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_rejects_length_mismatch() {
        assert!(TimeSeries::new(vec![day(1)], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_daily_and_lookup() {
        let series = TimeSeries::daily(day(1), vec![1.0, 2.0, 3.0]);
        assert_eq!(series.len(), 3);
        assert_eq!(series.last_date(), Some(day(3)));
        assert_eq!(series.get(day(2)), Some(2.0));
        assert_eq!(series.get(day(9)), None);
    }
}
