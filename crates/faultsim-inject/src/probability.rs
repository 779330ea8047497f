//! ---
//! fsim_section: "02-failure-injection"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Failure taxonomy and injection planning."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a value cannot be used as a probability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbabilityError {
    /// The value is finite but outside `[0, 1]`.
    #[error("probability {0} is outside the range [0, 1]")]
    OutOfRange(f64),
    /// The value is NaN or infinite.
    #[error("probability must be a finite number")]
    NotFinite,
    /// The textual form could not be parsed as a float.
    #[error("'{0}' is not a valid number")]
    Unparseable(String),
}

/// A validated probability in the closed interval `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Probability(f64);

impl Probability {
    /// Never fires.
    pub const ZERO: Probability = Probability(0.0);
    /// Always fires.
    pub const ONE: Probability = Probability(1.0);

    /// Validate and wrap a raw value.
    pub fn new(value: f64) -> Result<Self, ProbabilityError> {
        if !value.is_finite() {
            return Err(ProbabilityError::NotFinite);
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ProbabilityError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Literal constructor for in-range constants.
    pub(crate) const fn from_unchecked(value: f64) -> Self {
        Self(value)
    }

    /// Raw value.
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether a uniform draw in `[0, 1)` triggers this probability.
    ///
    /// A probability of one fires for every draw; zero never fires.
    pub fn fires(self, draw: f64) -> bool {
        draw < self.0
    }
}

impl TryFrom<f64> for Probability {
    type Error = ProbabilityError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Probability> for f64 {
    fn from(value: Probability) -> Self {
        value.0
    }
}

impl FromStr for Probability {
    type Err = ProbabilityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let value = trimmed
            .parse::<f64>()
            .map_err(|_| ProbabilityError::Unparseable(trimmed.to_owned()))?;
        Self::new(value)
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
