//! Carematch core data models.
//!
//! This crate defines the records the care-need assessment engine works on:
//! the draft under edit, the fields it exposes, the step plan that groups
//! those fields, validation results and engine configuration.

#![warn(missing_docs)]

// Identities
mod id;

// The record under edit
mod draft;
mod field;

// Step plan and validation output
mod step;
mod validation;

// Configuration
mod config;

// Re-exports
pub use id::*;

pub use draft::{AssessmentDraft, CareTargetStatus, Gender, MealType};
pub use field::{Field, FieldKind, FieldValue};
pub use step::{StepDefinition, StepPlan};
pub use validation::{FieldErrors, ValidationResult};
pub use config::{AssessmentConfig, ConfigError, DemographicsPolicy};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
