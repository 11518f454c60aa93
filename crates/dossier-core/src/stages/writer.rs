//! Writer stage
//!
//! Two modes, chosen from the current criticism:
//! - **Expand**: no failing verdict present. Every topic becomes a section;
//!   a failed call leaves `""` at that index.
//! - **Rewrite**: at least one failing verdict. Only failing sections are
//!   regenerated from topic data, critique and previous text; passing
//!   sections are copied unchanged and a failed call keeps the previous text.

use crate::collaborators::Role;
use crate::error::StageError;
use crate::fanout::gather_ordered;
use crate::prompts;
use crate::stage::{Stage, StageContext, StageKind};
use crate::state::{ResearchState, StateUpdate, Verdict};
use async_trait::async_trait;
use dossier_knowledge::{KnowledgeBase, Topic};
use std::sync::Arc;

/// Writer operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterMode {
    /// First pass over every topic
    Expand,
    /// Criticism-driven rewrite of failing sections
    Rewrite,
}

impl WriterMode {
    /// Mode implied by the state
    #[must_use]
    pub fn for_state(state: &ResearchState) -> Self {
        let failing = state
            .criticism
            .as_ref()
            .is_some_and(|c| c.values().any(|v| !v.is_pass()));
        if failing {
            Self::Rewrite
        } else {
            Self::Expand
        }
    }
}

/// Expands topics into sections and rewrites criticized ones
#[derive(Debug, Clone)]
pub struct WriterStage {
    ctx: Arc<StageContext>,
}

impl WriterStage {
    /// Create writer stage
    #[inline]
    #[must_use]
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    async fn expand(&self, kb: &KnowledgeBase) -> Vec<String> {
        let work = kb
            .topics
            .iter()
            .enumerate()
            .map(|(index, topic)| self.expand_one(index, topic))
            .collect::<Vec<_>>();
        gather_ordered(work, self.ctx.config.max_concurrency).await
    }

    async fn expand_one(&self, index: usize, topic: &Topic) -> String {
        let request = self
            .ctx
            .request(
                Role::Writer,
                prompts::WRITER_INSTRUCTIONS,
                prompts::writer_input(topic),
            )
            .for_item(index);

        match self.ctx.generator.generate(&request).await {
            Ok(text) => {
                tracing::debug!(index, topic = %topic.title, "section expanded");
                text.trim().to_string()
            }
            Err(e) => {
                tracing::warn!(
                    index,
                    topic = %topic.title,
                    error = %e,
                    "expansion failed; leaving section empty"
                );
                String::new()
            }
        }
    }

    async fn rewrite(
        &self,
        kb: &KnowledgeBase,
        sections: &[String],
        state: &ResearchState,
    ) -> Vec<String> {
        let criticism = state.criticism.as_ref();
        let work = sections.iter().enumerate().map(|(index, previous)| {
            let critique = criticism
                .and_then(|c| c.get(&index))
                .and_then(Verdict::critique);
            let topic = kb.topics.get(index);
            async move {
                match (critique, topic) {
                    (Some(critique), Some(topic)) => {
                        self.rewrite_one(index, topic, previous, critique).await
                    }
                    _ => previous.clone(),
                }
            }
        })
        .collect::<Vec<_>>();
        gather_ordered(work, self.ctx.config.max_concurrency).await
    }

    async fn rewrite_one(
        &self,
        index: usize,
        topic: &Topic,
        previous: &str,
        critique: &str,
    ) -> String {
        let request = self
            .ctx
            .request(
                Role::Writer,
                prompts::REWRITE_INSTRUCTIONS,
                prompts::rewrite_input(topic, previous, critique),
            )
            .for_item(index);

        match self.ctx.generator.generate(&request).await {
            Ok(text) => {
                tracing::debug!(index, topic = %topic.title, "section rewritten");
                text.trim().to_string()
            }
            Err(e) => {
                tracing::warn!(
                    index,
                    topic = %topic.title,
                    error = %e,
                    "rewrite failed; keeping previous text"
                );
                previous.to_string()
            }
        }
    }
}

#[async_trait]
impl Stage for WriterStage {
    fn kind(&self) -> StageKind {
        StageKind::Writer
    }

    async fn execute(&self, state: &ResearchState) -> Result<StateUpdate, StageError> {
        let kb = state
            .knowledge_base
            .as_ref()
            .ok_or_else(|| StageError::input("knowledge base is missing"))?;

        match WriterMode::for_state(state) {
            WriterMode::Expand => {
                tracing::info!(topics = kb.topic_count(), "expanding sections");
                let sections = self.expand(kb).await;
                Ok(StateUpdate::new()
                    .with_report_sections(sections)
                    .with_needs_rewrite(false))
            }
            WriterMode::Rewrite => {
                let previous = state
                    .report_sections
                    .as_ref()
                    .ok_or_else(|| StageError::input("no sections to rewrite"))?;
                let cycle = state.rewrite_cycles + 1;
                tracing::info!(
                    cycle,
                    failing = ?state.failing_sections(),
                    "rewriting criticized sections"
                );
                let sections = self.rewrite(kb, previous, state).await;
                Ok(StateUpdate::new()
                    .with_report_sections(sections)
                    .with_needs_rewrite(true)
                    .with_rewrite_cycles(cycle))
            }
        }
    }
}
