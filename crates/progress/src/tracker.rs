//! Derived progress values.

use carematch_core::{AssessmentDraft, Field, StepDefinition, StepPlan};
use serde::{Deserialize, Serialize};

/// Derived values at a point of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Completion percentage (0..=100)
    pub percentage: u8,

    /// Steps up to the current one whose required fields are all present
    pub completed_steps: usize,

    /// Total steps in the plan
    pub total_steps: usize,

    /// Whether the draft may be submitted
    pub can_submit: bool,
}

/// Pure functions computing progress from a draft and a step plan.
pub struct ScoreAggregator;

impl ScoreAggregator {
    /// Whether every required field of `step` is present.
    ///
    /// Range validity is not considered; this is a presence measure.
    pub fn is_step_complete(step: &StepDefinition, draft: &AssessmentDraft) -> bool {
        step.required_fields.iter().all(|f| draft.is_present(*f))
    }

    /// Number of complete steps in `0..=current_step`.
    ///
    /// A step without required fields has nothing to fill in; it counts
    /// once the user has moved past it, or has reached it as the last step.
    pub fn completed_steps(plan: &StepPlan, draft: &AssessmentDraft, current_step: usize) -> usize {
        let last = plan.last_index();
        plan.steps()
            .iter()
            .enumerate()
            .take(current_step.saturating_add(1))
            .filter(|(index, step)| {
                if step.required_fields.is_empty() {
                    *index < current_step || (*index == last && last > 0)
                } else {
                    Self::is_step_complete(step, draft)
                }
            })
            .count()
    }

    /// Completion percentage tied to the navigation position.
    pub fn completion_percentage(plan: &StepPlan, draft: &AssessmentDraft, current_step: usize) -> u8 {
        let total = plan.len();
        if total == 0 {
            return 0;
        }
        let complete = Self::completed_steps(plan, draft, current_step);
        ((complete as f64 / total as f64) * 100.0).round() as u8
    }

    /// Whether every required field across the mandatory steps is present.
    ///
    /// Independent of the navigation position.
    pub fn can_submit(plan: &StepPlan, draft: &AssessmentDraft) -> bool {
        plan.mandatory_steps().all(|s| Self::is_step_complete(s, draft))
    }

    /// Sum of the four ADL levels (4..=12), when all are present and in range.
    pub fn adl_total(draft: &AssessmentDraft) -> Option<i64> {
        Field::ADL.iter().try_fold(0i64, |acc, field| {
            let level = draft.get(*field).as_integer()?;
            (1..=3).contains(&level).then_some(acc + level)
        })
    }

    /// All derived values at once.
    pub fn snapshot(plan: &StepPlan, draft: &AssessmentDraft, current_step: usize) -> ProgressSnapshot {
        ProgressSnapshot {
            percentage: Self::completion_percentage(plan, draft, current_step),
            completed_steps: Self::completed_steps(plan, draft, current_step),
            total_steps: plan.len(),
            can_submit: Self::can_submit(plan, draft),
        }
    }
}
