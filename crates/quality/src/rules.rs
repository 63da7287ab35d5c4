//! Field rules and the registry that holds them.

use carematch_core::{AssessmentDraft, Field, FieldValue};
use std::collections::BTreeMap;

/// A single check on a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    /// The field must hold a value
    Required,
    /// An integer value must lie in `min..=max`
    Range {
        /// Lowest accepted value
        min: i64,
        /// Highest accepted value
        max: i64,
    },
}

impl FieldRule {
    /// Evaluate the rule; `Some(message)` on failure.
    pub fn check(&self, field: Field, value: &FieldValue) -> Option<String> {
        match self {
            FieldRule::Required => {
                if value.is_present() {
                    None
                } else {
                    Some(format!("{} is required", field))
                }
            }
            FieldRule::Range { min, max } => match value.as_integer() {
                Some(v) if v < *min || v > *max => {
                    Some(format!("{} must be between {} and {}", field, min, max))
                }
                _ => None,
            },
        }
    }
}

/// Format rules per field, evaluated after the presence check.
///
/// `Required` is never stored here: whether a field is required depends on
/// the step being validated, not on the field.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: BTreeMap<Field, Vec<FieldRule>>,
}

impl RuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Standard assessment rules.
    ///
    /// ADL levels are 1..=3, the LTCI grade 1..=8 and the birth year
    /// `min_birth_year..=current_year`.
    pub fn standard(current_year: i64, min_birth_year: i64) -> Self {
        let mut registry = Self::new();
        for field in Field::ADL {
            registry.register(field, FieldRule::Range { min: 1, max: 3 });
        }
        registry.register(Field::LtciGrade, FieldRule::Range { min: 1, max: 8 });
        registry.register(
            Field::BirthYear,
            FieldRule::Range {
                min: min_birth_year,
                max: current_year,
            },
        );
        registry
    }

    /// Register a rule for a field. Rules run in registration order.
    pub fn register(&mut self, field: Field, rule: FieldRule) {
        self.rules.entry(field).or_default().push(rule);
    }

    /// Rules registered for a field.
    pub fn get(&self, field: Field) -> &[FieldRule] {
        self.rules.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run the format rules for a present value; first failure wins.
    ///
    /// Absent values always pass: absence is only an error where the step
    /// requires the field.
    pub fn check_present(&self, field: Field, draft: &AssessmentDraft) -> Option<String> {
        let value = draft.get(field);
        if !value.is_present() {
            return None;
        }
        self.get(field).iter().find_map(|rule| rule.check(field, &value))
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
