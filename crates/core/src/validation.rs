//! Validation output types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::field::Field;

/// Error message per field; at most one message per field.
pub type FieldErrors = BTreeMap<Field, String>;

/// Outcome of validating one step against a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Step index
    pub step: usize,

    /// Whether every required field is present and in range
    pub is_valid: bool,

    /// First failing rule message per field
    pub errors: FieldErrors,
}

impl ValidationResult {
    /// Build a result; validity is derived from the error map.
    pub fn new(step: usize, errors: FieldErrors) -> Self {
        Self {
            step,
            is_valid: errors.is_empty(),
            errors,
        }
    }
}
