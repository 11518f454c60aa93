//! Rewrite loop policies
//!
//! The writer/critic cycle is the only loop in the graph. It is bounded by a
//! cycle budget; what happens after a rewrite and once the budget runs out is
//! chosen here.

use serde::{Deserialize, Serialize};

/// Where the writer goes after a criticism-driven rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewritePolicy {
    /// A rewrite goes straight to the assembler
    #[default]
    OneShot,
    /// A rewrite is re-reviewed by the critic until it passes or the budget runs out
    Recritique,
}

/// What to do when failing sections remain after the last allowed rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Assemble anyway and list the unresolved sections in the report
    #[default]
    AcceptBestEffort,
    /// Fail the run
    FailRun,
}

/// Cycle budget for the rewrite loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteBudget {
    max_cycles: u32,
}

impl RewriteBudget {
    /// Create budget allowing `max_cycles` rewrite passes
    #[inline]
    #[must_use]
    pub fn new(max_cycles: u32) -> Self {
        Self { max_cycles }
    }

    /// Maximum rewrite passes
    #[inline]
    #[must_use]
    pub fn max_cycles(&self) -> u32 {
        self.max_cycles
    }

    /// Check if another rewrite pass is allowed after `performed` passes
    #[inline]
    #[must_use]
    pub fn allows(&self, performed: u32) -> bool {
        performed < self.max_cycles
    }

    /// Passes left after `performed`
    #[inline]
    #[must_use]
    pub fn remaining(&self, performed: u32) -> u32 {
        self.max_cycles.saturating_sub(performed)
    }
}

impl Default for RewriteBudget {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_counts_down() {
        let budget = RewriteBudget::new(2);
        assert!(budget.allows(0));
        assert!(budget.allows(1));
        assert!(!budget.allows(2));
        assert_eq!(budget.remaining(1), 1);
        assert_eq!(budget.remaining(5), 0);
    }

    #[test]
    fn zero_budget_never_rewrites() {
        assert!(!RewriteBudget::new(0).allows(0));
    }

    #[test]
    fn policies_use_snake_case() {
        assert_eq!(
            serde_json::to_string(&RewritePolicy::OneShot).unwrap(),
            "\"one_shot\""
        );
        assert_eq!(
            serde_json::from_str::<ExhaustionPolicy>("\"fail_run\"").unwrap(),
            ExhaustionPolicy::FailRun
        );
    }
}
