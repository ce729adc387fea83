use crate::types::Parameter;

/// Shape of the transmission rate over time for SIR-family models
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Transmission {
    /// β for the whole run
    Constant,
    /// β before `offset`, β₂ from `offset` on.
    ///
    /// Without `fit_beta2` the second phase reuses β and no extra parameter
    /// is fitted. From `reopening` on the rate is the midpoint β₃ = (β + β₂) / 2.
    TwoPhase {
        offset: f64,
        reopening: Option<f64>,
        fit_beta2: bool,
    },
    /// Logistic blend from β to β₂ centred on `center`, slope λ
    Sigmoid { center: f64 },
}

/// Days between the intervention and the midpoint of the sigmoid transition
pub const SIGMOID_DELAY_DAYS: f64 = 7.0;

impl Transmission {
    /// Parameters this shape adds after `[beta, gamma]`
    pub fn extra_parameters(&self) -> &'static [Parameter] {
        match self {
            Transmission::Constant => &[],
            Transmission::TwoPhase { fit_beta2: true, .. } => &[Parameter::Beta2],
            Transmission::TwoPhase { fit_beta2: false, .. } => &[],
            Transmission::Sigmoid { .. } => &[Parameter::Beta2, Parameter::Lambda],
        }
    }

    /// Instantaneous transmission rate at `t`.
    ///
    /// `extras` holds the values of [`Self::extra_parameters`] in order.
    #[inline]
    pub fn rate(&self, t: f64, beta: f64, extras: &[f64]) -> f64 {
        match *self {
            Transmission::Constant => beta,
            Transmission::TwoPhase {
                offset,
                reopening,
                fit_beta2,
            } => {
                let beta2 = if fit_beta2 { extras[0] } else { beta };
                if t < offset {
                    beta
                } else if reopening.map_or(true, |r| t < r) {
                    beta2
                } else {
                    0.5 * (beta + beta2)
                }
            }
            Transmission::Sigmoid { center } => {
                let (beta2, lambda) = (extras[0], extras[1]);
                // exp overflow gives +inf and a weight of 0, never NaN
                let weight = 1.0 / (1.0 + (-lambda * (t - center)).exp());
                beta + (beta2 - beta) * weight
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_two_phase_switches_at_offset() {
        let shape = Transmission::TwoPhase {
            offset: 10.0,
            reopening: None,
            fit_beta2: true,
        };
        assert_eq!(shape.rate(9.99, 0.4, &[0.1]), 0.4);
        assert_eq!(shape.rate(10.0, 0.4, &[0.1]), 0.1);
        assert_eq!(shape.rate(1e4, 0.4, &[0.1]), 0.1);
    }

    #[test]
    fn test_reopening_uses_midpoint_rate() {
        let shape = Transmission::TwoPhase {
            offset: 10.0,
            reopening: Some(30.0),
            fit_beta2: true,
        };
        assert_eq!(shape.rate(29.5, 0.4, &[0.1]), 0.1);
        assert_relative_eq!(shape.rate(30.0, 0.4, &[0.1]), 0.25);
        assert_relative_eq!(shape.rate(90.0, 0.4, &[0.1]), 0.25);
    }

    #[test]
    fn test_pinned_beta2_keeps_beta_after_switch() {
        let shape = Transmission::TwoPhase {
            offset: 10.0,
            reopening: Some(20.0),
            fit_beta2: false,
        };
        assert!(shape.extra_parameters().is_empty());
        for t in [0.0, 10.0, 25.0] {
            assert_eq!(shape.rate(t, 0.4, &[]), 0.4);
        }
    }

    #[test]
    fn test_sigmoid_midpoint_and_tails() {
        let shape = Transmission::Sigmoid { center: 17.0 };
        assert_relative_eq!(shape.rate(17.0, 0.4, &[0.1, 1.0]), 0.25);
        assert_relative_eq!(shape.rate(-1e4, 0.4, &[0.1, 1.0]), 0.4);
        assert_relative_eq!(shape.rate(1e4, 0.4, &[0.1, 1.0]), 0.1);
    }
}
