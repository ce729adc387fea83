use serde::{Deserialize, Serialize};

/// A fittable model quantity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// Transmission rate (initial rate for time-varying variants)
    Beta,
    /// Removal rate I -> R
    Gamma,
    /// Post-intervention transmission rate
    Beta2,
    /// Slope of the sigmoid transition between `Beta` and `Beta2`
    Lambda,
    /// Incubation rate E -> I
    Sigma,
    /// Effective susceptible pool as a fraction of the population
    S0Fraction,
    /// Recovery rate of non-hospitalized infectious
    GammaI,
    /// Recovery rate of hospitalized
    GammaH,
    /// Death rate of hospitalized
    Omega,
    /// Share of hospitalized cases resolving to death
    Delta,
}

impl Parameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Beta => "beta",
            Parameter::Gamma => "gamma",
            Parameter::Beta2 => "beta2",
            Parameter::Lambda => "lambda",
            Parameter::Sigma => "sigma",
            Parameter::S0Fraction => "s0_fraction",
            Parameter::GammaI => "gamma_i",
            Parameter::GammaH => "gamma_h",
            Parameter::Omega => "omega",
            Parameter::Delta => "delta",
        }
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
