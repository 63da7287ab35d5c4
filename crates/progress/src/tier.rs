//! Qualitative care tier from the ADL total.
//!
//! The assessment only records raw sub-scores; turning them into a tier is
//! an injectable policy rather than a fixed formula.

use serde::{Deserialize, Serialize};

/// Lowest possible ADL total (four fields at level 1).
pub const ADL_TOTAL_MIN: i64 = 4;
/// Highest possible ADL total (four fields at level 3).
pub const ADL_TOTAL_MAX: i64 = 12;

/// Qualitative care need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareTier {
    /// Manages daily living alone
    Independent,
    /// Occasional help
    Mild,
    /// Regular help
    Moderate,
    /// Constant help
    Severe,
}

/// Maps an ADL total to a care tier.
pub trait CareTierClassifier: Send + Sync {
    /// Classify an ADL total in `4..=12`.
    fn classify(&self, adl_total: i64) -> CareTier;
}

/// Errors building a classifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TierError {
    /// Thresholds must be strictly ascending
    #[error("thresholds must be strictly ascending: {0:?}")]
    NotAscending([i64; 3]),

    /// Thresholds must fall inside the ADL total range
    #[error("threshold {0} outside the ADL total range 4..=12")]
    OutOfRange(i64),
}

/// Classifier over three inclusive upper bounds.
///
/// `total <= t[0]` is Independent, `<= t[1]` Mild, `<= t[2]` Moderate, and
/// anything above Severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdClassifier {
    thresholds: [i64; 3],
}

impl ThresholdClassifier {
    /// Create a classifier from ascending upper bounds.
    pub fn new(thresholds: [i64; 3]) -> Result<Self, TierError> {
        if let Some(&t) = thresholds
            .iter()
            .find(|t| !(ADL_TOTAL_MIN..=ADL_TOTAL_MAX).contains(*t))
        {
            return Err(TierError::OutOfRange(t));
        }
        if thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TierError::NotAscending(thresholds));
        }
        Ok(Self { thresholds })
    }

    /// Configured bounds.
    pub fn thresholds(&self) -> [i64; 3] {
        self.thresholds
    }
}

impl CareTierClassifier for ThresholdClassifier {
    fn classify(&self, adl_total: i64) -> CareTier {
        let [mild, moderate, severe] = self.thresholds;
        if adl_total <= mild {
            CareTier::Independent
        } else if adl_total <= moderate {
            CareTier::Mild
        } else if adl_total <= severe {
            CareTier::Moderate
        } else {
            CareTier::Severe
        }
    }
}
