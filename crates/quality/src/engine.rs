//! Step validation engine.

use carematch_core::{AssessmentDraft, Field, FieldErrors, StepDefinition, StepPlan, ValidationResult};

use crate::rules::{FieldRule, RuleRegistry};

/// Pure rule evaluator over a draft and a step definition.
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    rules: RuleRegistry,
}

impl ValidationEngine {
    /// Create an engine with the standard rules.
    pub fn new(current_year: i64, min_birth_year: i64) -> Self {
        Self::with_rules(RuleRegistry::standard(current_year, min_birth_year))
    }

    /// Create an engine over a custom rule registry.
    pub fn with_rules(rules: RuleRegistry) -> Self {
        Self { rules }
    }

    /// Rule registry in use.
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Validate one step.
    ///
    /// Only the step's required fields are evaluated. For each, presence is
    /// checked first and short-circuits; a present value then runs its
    /// format rules. One message per field.
    pub fn validate(&self, step: &StepDefinition, draft: &AssessmentDraft) -> ValidationResult {
        let mut errors = FieldErrors::new();

        for &field in &step.required_fields {
            if let Some(message) = self.check_required(field, draft) {
                errors.insert(field, message);
            }
        }

        let result = ValidationResult::new(step.order_index, errors);
        tracing::debug!(
            "Validated step {} ({}): valid={} errors={}",
            step.order_index,
            step.id,
            result.is_valid,
            result.errors.len()
        );
        result
    }

    /// Format check of a single present field, regardless of step.
    pub fn check_field(&self, field: Field, draft: &AssessmentDraft) -> Option<String> {
        self.rules.check_present(field, draft)
    }

    /// Everything that must hold before the draft may be submitted: every
    /// mandatory step validates, and every other present field is in range.
    pub fn validate_for_submission(&self, plan: &StepPlan, draft: &AssessmentDraft) -> FieldErrors {
        let mut errors = FieldErrors::new();

        for step in plan.mandatory_steps() {
            errors.extend(self.validate(step, draft).errors);
        }

        for field in Field::ALL {
            if errors.contains_key(&field) {
                continue;
            }
            if let Some(message) = self.check_field(field, draft) {
                errors.insert(field, message);
            }
        }

        errors
    }

    fn check_required(&self, field: Field, draft: &AssessmentDraft) -> Option<String> {
        FieldRule::Required
            .check(field, &draft.get(field))
            .or_else(|| self.rules.check_present(field, draft))
    }
}
