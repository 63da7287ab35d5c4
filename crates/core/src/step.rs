//! Step model - the ordered pages of the assessment wizard.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use crate::config::{ConfigError, DemographicsPolicy};
use crate::field::Field;

/// One page of the assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Stable identifier
    pub id: String,

    /// Display title
    pub title: String,

    /// Position in the plan (0-based)
    pub order_index: usize,

    /// Fields that must be present before leaving this step
    pub required_fields: Vec<Field>,

    /// Whether this step must be complete before submission
    pub is_required_step: bool,
}

impl StepDefinition {
    /// Create a step with no required fields.
    pub fn new(id: impl Into<String>, title: impl Into<String>, order_index: usize) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            order_index,
            required_fields: Vec::new(),
            is_required_step: false,
        }
    }

    /// Add required fields.
    pub fn with_required(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.required_fields.extend(fields);
        self
    }

    /// Mark the step as mandatory for submission.
    pub fn mandatory(mut self) -> Self {
        self.is_required_step = true;
        self
    }

    /// Whether `field` is in this step's required set.
    pub fn requires(&self, field: Field) -> bool {
        self.required_fields.contains(&field)
    }
}

/// A validated, immutable list of steps.
///
/// Built once per session; construction rejects malformed plans so the
/// engine never has to cope with them at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    steps: Vec<StepDefinition>,
}

impl StepPlan {
    /// Validate and wrap a list of steps.
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::EmptyPlan);
        }

        let mut ids = HashSet::new();
        let mut seen_fields = BTreeSet::new();
        for (position, step) in steps.iter().enumerate() {
            if step.order_index != position {
                return Err(ConfigError::OrderIndex {
                    step: step.id.clone(),
                    expected: position,
                    found: step.order_index,
                });
            }
            if !ids.insert(step.id.as_str()) {
                return Err(ConfigError::DuplicateStep(step.id.clone()));
            }
            for field in &step.required_fields {
                if !seen_fields.insert(*field) {
                    return Err(ConfigError::FieldInTwoSteps(*field));
                }
            }
        }

        Ok(Self { steps })
    }

    /// The standard care-need plan: basic info, four ADL pages, LTCI grade,
    /// additional info and a terminal review page.
    pub fn standard(demographics: DemographicsPolicy) -> Self {
        let basic = StepDefinition::new("basic-info", "Basic information", 0).mandatory();
        let basic = match demographics {
            DemographicsPolicy::Required => basic.with_required([Field::Gender, Field::BirthYear]),
            DemographicsPolicy::Optional => basic,
        };

        let steps = vec![
            basic,
            StepDefinition::new("mobility", "Mobility", 1)
                .with_required([Field::MobilityLevel])
                .mandatory(),
            StepDefinition::new("eating", "Eating", 2)
                .with_required([Field::EatingLevel])
                .mandatory(),
            StepDefinition::new("toilet", "Toileting", 3)
                .with_required([Field::ToiletLevel])
                .mandatory(),
            StepDefinition::new("communication", "Communication", 4)
                .with_required([Field::CommunicationLevel])
                .mandatory(),
            StepDefinition::new("ltci-grade", "Long-term care grade", 5),
            StepDefinition::new("additional-info", "Additional information", 6),
            StepDefinition::new("review", "Review", 7),
        ];

        Self { steps }
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; a plan has at least one step.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the terminal step.
    pub fn last_index(&self) -> usize {
        self.steps.len() - 1
    }

    /// Step at `index`.
    pub fn get(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    /// All steps in order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Indices of steps whose required set contains `field`.
    pub fn steps_requiring(&self, field: Field) -> impl Iterator<Item = usize> + '_ {
        self.steps
            .iter()
            .filter(move |s| s.requires(field))
            .map(|s| s.order_index)
    }

    /// Steps that must be complete before submission.
    pub fn mandatory_steps(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter().filter(|s| s.is_required_step)
    }
}
