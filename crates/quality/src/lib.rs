//! Assessment validation.
//!
//! Per-field rules, the step validation engine, and the per-step result
//! cache.

#![warn(missing_docs)]

pub mod rules;
pub mod engine;
pub mod cache;

pub use rules::{FieldRule, RuleRegistry};
pub use engine::ValidationEngine;
pub use cache::ValidationCache;
