//! Bounded relationship scores.
//!
//! Trust and collaboration history are both [`Score`]s: a value in
//! `[0.0, 1.0]` where 0.5 is the neutral starting point for an unknown peer.

use serde::{Deserialize, Serialize};

use crate::ParleyError;

/// A score between 0.0 and 1.0.
///
/// - 0.0 = no confidence at all
/// - 0.5 = neutral (unknown peer)
/// - 1.0 = complete confidence
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Score(f64);

impl Score {
    /// Perfect score (1.0).
    pub const PERFECT: Self = Self(1.0);

    /// Worst score (0.0).
    pub const ZERO: Self = Self(0.0);

    /// Neutral score for unknown peers (0.5).
    pub const NEUTRAL: Self = Self(0.5);

    /// Creates a score from a value.
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::InvalidScore` if the value is outside [0.0, 1.0].
    pub fn new(value: f64) -> Result<Self, ParleyError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ParleyError::InvalidScore(value));
        }
        Ok(Self(value))
    }

    /// Creates a score, clamping the value into [0.0, 1.0]. NaN maps to zero.
    #[must_use]
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Returns the raw score value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Returns this score shifted by `delta`, clamped into range.
    #[must_use]
    pub fn adjusted(self, delta: f64) -> Self {
        Self::saturating(self.0 + delta)
    }

    /// Exponential moving average step towards `observation`.
    ///
    /// `rate` is the weight of the new observation: `old * (1 - rate) + obs * rate`.
    #[must_use]
    pub fn blended(self, observation: f64, rate: f64) -> Self {
        let rate = rate.clamp(0.0, 1.0);
        Self::saturating(self.0.mul_add(1.0 - rate, observation * rate))
    }

    /// Returns true if this is a "poor" score (< 0.3).
    #[must_use]
    pub fn is_poor(self) -> bool {
        self.0 < 0.3
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl TryFrom<f64> for Score {
    type Error = ParleyError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for f64 {
    fn from(score: Score) -> Self {
        score.0
    }
}
