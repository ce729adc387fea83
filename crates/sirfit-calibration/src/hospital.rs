//! Hospital bed demand derived from a prediction table

use sirfit_core::{FitError, HospitalConfig, Result};

use crate::types::{HospitalLoad, PredictionTable};

/// Add admissions, discharges and occupancy to every row of `table`.
///
/// New hospitalizations on day `t` are `hosp_rate * (S[t-1] - S[t])`. They are
/// admitted `days_to_hosp` days later and discharged `stay_duration` days
/// after admission; occupancy is cumulative admissions minus cumulative
/// discharges. Lagged values are zero until the lag is covered.
pub fn annotate(
    mut table: PredictionTable,
    hosp_rate: f64,
    days_to_hosp: usize,
    stay_duration: usize,
) -> Result<PredictionTable> {
    if !(0.0..=1.0).contains(&hosp_rate) {
        return Err(FitError::InvalidConfig(format!(
            "hospitalization rate must lie in [0, 1], got {}",
            hosp_rate
        )));
    }
    let susceptible = table.column("S").ok_or_else(|| {
        FitError::InvalidConfig("prediction table has no susceptible column".into())
    })?;

    let demand: Vec<f64> = std::iter::once(0.0)
        .chain(susceptible.windows(2).map(|w| hosp_rate * (w[0] - w[1])))
        .take(susceptible.len())
        .collect();
    let admissions = lagged(&demand, days_to_hosp);
    let discharges = lagged(&demand, days_to_hosp.saturating_add(stay_duration));

    let mut admitted = 0.0;
    let mut discharged = 0.0;
    for ((row, admissions), discharges) in table.rows.iter_mut().zip(admissions).zip(discharges) {
        admitted += admissions;
        discharged += discharges;
        row.hospital = Some(HospitalLoad {
            admissions,
            discharges,
            occupancy: admitted - discharged,
        });
    }

    Ok(table)
}

/// [`annotate`] with the settings from a run configuration
pub fn annotate_with(table: PredictionTable, config: &HospitalConfig) -> Result<PredictionTable> {
    annotate(table, config.rate, config.days_to_hosp, config.stay_duration)
}

/// `series` shifted `lag` places later, zero-filled at the front
fn lagged(series: &[f64], lag: usize) -> Vec<f64> {
    (0..series.len())
        .map(|t| if t >= lag { series[t - lag] } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PredictionRow;
    use chrono::NaiveDate;

    fn table(susceptible: &[f64]) -> PredictionTable {
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let rows = start
            .iter_days()
            .zip(susceptible)
            .map(|(date, &s)| PredictionRow::new(date, vec![], vec![s, 1000.0 - s]))
            .collect();
        PredictionTable::new(vec!["S".into(), "I".into()], vec![], rows)
    }

    #[test]
    fn test_single_unit_drop_is_admitted_and_discharged_once() {
        let d = 3;
        let (days_to_hosp, stay_duration) = (2, 4);
        let susceptible: Vec<f64> = (0..15).map(|t| if t < d { 500.0 } else { 499.0 }).collect();

        let annotated = annotate(table(&susceptible), 1.0, days_to_hosp, stay_duration).unwrap();
        let loads: Vec<HospitalLoad> = annotated.rows.iter().map(|r| r.hospital.unwrap()).collect();

        let admitted_on = d + days_to_hosp;
        let discharged_on = admitted_on + stay_duration;
        for (t, load) in loads.iter().enumerate() {
            let admissions = if t == admitted_on { 1.0 } else { 0.0 };
            let discharges = if t == discharged_on { 1.0 } else { 0.0 };
            let occupancy = if (admitted_on..discharged_on).contains(&t) { 1.0 } else { 0.0 };
            assert_eq!(load.admissions, admissions, "admissions on day {}", t);
            assert_eq!(load.discharges, discharges, "discharges on day {}", t);
            assert_eq!(load.occupancy, occupancy, "occupancy on day {}", t);
        }
    }

    #[test]
    fn test_rate_scales_demand() {
        let annotated = annotate(table(&[100.0, 80.0, 80.0]), 0.25, 0, 10).unwrap();
        assert_eq!(annotated.occupancy(), Some(vec![0.0, 5.0, 5.0]));
    }

    #[test]
    fn test_invalid_rate_rejected() {
        assert!(annotate(table(&[1.0]), 1.5, 1, 1).is_err());
    }

    #[test]
    fn test_lags_beyond_the_table_never_discharge() {
        let annotated = annotate(table(&[10.0, 9.0, 8.0]), 1.0, 1, usize::MAX).unwrap();
        assert_eq!(annotated.occupancy(), Some(vec![0.0, 0.0, 1.0]));
        assert!(annotated
            .rows
            .iter()
            .all(|r| r.hospital.map(|h| h.discharges) == Some(0.0)));

        let annotated = annotate(table(&[10.0, 9.0]), 1.0, usize::MAX, usize::MAX).unwrap();
        assert_eq!(annotated.occupancy(), Some(vec![0.0, 0.0]));
    }

    #[test]
    fn test_config_settings_are_used() {
        let config = HospitalConfig {
            rate: 1.0,
            days_to_hosp: 1,
            stay_duration: 1,
        };
        let annotated = annotate_with(table(&[10.0, 9.0, 9.0, 9.0]), &config).unwrap();
        assert_eq!(annotated.occupancy(), Some(vec![0.0, 0.0, 1.0, 0.0]));
    }
}
