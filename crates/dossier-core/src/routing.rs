//! Conditional edges
//!
//! Pure functions over the state. Each returns an explicit decision that the
//! engine matches exhaustively.

use crate::error::RoutingError;
use crate::retry::{RewriteBudget, RewritePolicy};
use crate::state::ResearchState;

/// Next step after the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterWriter {
    /// Review the sections
    Critic,
    /// Assemble the report
    Assembler,
}

/// Next step after the critic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterCritic {
    /// Every verdict passed
    Assemble,
    /// Failing sections and budget left
    Rewrite,
    /// Failing sections and no budget left
    Exhausted,
}

/// Decide the edge out of the writer
///
/// Under [`RewritePolicy::OneShot`] a completed rewrite always goes to the
/// assembler; under [`RewritePolicy::Recritique`] every writer pass is reviewed.
#[must_use]
pub fn route_after_writer(state: &ResearchState, policy: RewritePolicy) -> AfterWriter {
    match policy {
        RewritePolicy::OneShot if state.needs_rewrite => AfterWriter::Assembler,
        RewritePolicy::OneShot | RewritePolicy::Recritique => AfterWriter::Critic,
    }
}

/// Decide the edge out of the critic
pub fn route_after_critic(
    state: &ResearchState,
    budget: RewriteBudget,
) -> Result<AfterCritic, RoutingError> {
    let criticism = state
        .criticism
        .as_ref()
        .ok_or(RoutingError::MissingCriticism)?;

    if criticism.values().all(|v| v.is_pass()) {
        Ok(AfterCritic::Assemble)
    } else if budget.allows(state.rewrite_cycles) {
        Ok(AfterCritic::Rewrite)
    } else {
        Ok(AfterCritic::Exhausted)
    }
}
