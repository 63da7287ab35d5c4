//! Step sequencing: the current index and the legal moves from it.

use carematch_core::ValidationResult;

/// Result of a forward move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMove {
    /// Index moved forward
    Moved {
        /// Previous index
        from: usize,
        /// New index
        to: usize,
    },
    /// The current step failed validation; index unchanged
    Blocked,
    /// Already on the terminal step; index unchanged
    AtTerminal,
}

impl StepMove {
    /// Whether the index changed.
    pub fn moved(&self) -> bool {
        matches!(self, StepMove::Moved { .. })
    }
}

/// Error for an out-of-range jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("step {index} out of range (0..{total})")]
pub struct InvalidStep {
    /// Requested index
    pub index: usize,
    /// Number of steps
    pub total: usize,
}

/// Owns the current step index.
#[derive(Debug, Clone)]
pub struct StepSequencer {
    current: usize,
    total: usize,
}

impl StepSequencer {
    /// Start at step 0 of `total` steps. `total` must be non-zero.
    pub fn new(total: usize) -> Self {
        debug_assert!(total > 0, "a step plan is never empty");
        Self { current: 0, total }
    }

    /// Current index.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of steps.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether the current step is the terminal one.
    pub fn is_terminal(&self) -> bool {
        self.current + 1 >= self.total
    }

    /// Move forward if `gate` (the current step's validation) passed.
    pub fn advance(&mut self, gate: &ValidationResult) -> StepMove {
        debug_assert_eq!(gate.step, self.current, "gate must validate the current step");
        if !gate.is_valid {
            return StepMove::Blocked;
        }
        if self.is_terminal() {
            return StepMove::AtTerminal;
        }
        let from = self.current;
        self.current += 1;
        tracing::debug!("Step {} -> {}", from, self.current);
        StepMove::Moved { from, to: self.current }
    }

    /// Move back one step; stays at 0 on the first step.
    pub fn retreat(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    /// Jump to any existing step.
    pub fn go_to(&mut self, index: usize) -> Result<(), InvalidStep> {
        if index >= self.total {
            return Err(InvalidStep {
                index,
                total: self.total,
            });
        }
        tracing::debug!("Jump {} -> {}", self.current, index);
        self.current = index;
        Ok(())
    }

    /// Back to step 0.
    pub fn reset(&mut self) {
        self.current = 0;
    }
}
