//! Per-step validation result cache.

use std::collections::HashMap;
use carematch_core::{Field, StepPlan, ValidationResult};

/// Last validation result per step index.
///
/// Entries go stale the moment one of the step's required fields changes;
/// callers must route every field write through [`ValidationCache::invalidate_field`].
#[derive(Debug, Clone, Default)]
pub struct ValidationCache {
    results: HashMap<usize, ValidationResult>,
}

impl ValidationCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for a step.
    pub fn get(&self, step: usize) -> Option<&ValidationResult> {
        self.results.get(&step)
    }

    /// Store a result, replacing any previous one for the same step.
    pub fn insert(&mut self, result: ValidationResult) {
        self.results.insert(result.step, result);
    }

    /// Drop results for every step whose required set contains `field`.
    pub fn invalidate_field(&mut self, plan: &StepPlan, field: Field) {
        for step in plan.steps_requiring(field) {
            if self.results.remove(&step).is_some() {
                tracing::debug!("Invalidated cached validation for step {} after {} changed", step, field);
            }
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.results.clear();
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
