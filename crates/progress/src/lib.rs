//! Progress and scoring.
//!
//! Completion percentage, submit readiness, and ADL care-tier
//! classification.

#![warn(missing_docs)]

pub mod tracker;
pub mod tier;

pub use tracker::{ProgressSnapshot, ScoreAggregator};
pub use tier::{CareTier, CareTierClassifier, ThresholdClassifier, TierError};
