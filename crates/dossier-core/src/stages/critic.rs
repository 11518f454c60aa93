//! Critic stage: review every section against its topic

use crate::collaborators::Role;
use crate::error::StageError;
use crate::fanout::try_gather_ordered;
use crate::prompts;
use crate::stage::{Stage, StageContext, StageKind};
use crate::state::{Criticism, ResearchState, StateUpdate, Verdict};
use async_trait::async_trait;
use dossier_knowledge::Topic;
use std::sync::Arc;

/// Reviews each section independently; any failed review aborts the stage
#[derive(Debug, Clone)]
pub struct CriticStage {
    ctx: Arc<StageContext>,
}

impl CriticStage {
    /// Create critic stage
    #[inline]
    #[must_use]
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    async fn review(
        &self,
        index: usize,
        topic: &Topic,
        section: &str,
    ) -> Result<Verdict, StageError> {
        let request = self
            .ctx
            .request(
                Role::Critic,
                prompts::CRITIC_INSTRUCTIONS,
                prompts::critic_input(topic, section),
            )
            .for_item(index);

        let response = self
            .ctx
            .generator
            .generate(&request)
            .await
            .map_err(|source| StageError::Critique { index, source })?;
        let verdict =
            Verdict::from_response(&response).ok_or(StageError::EmptyVerdict { index })?;

        tracing::debug!(index, pass = verdict.is_pass(), "section reviewed");
        Ok(verdict)
    }
}

#[async_trait]
impl Stage for CriticStage {
    fn kind(&self) -> StageKind {
        StageKind::Critic
    }

    async fn execute(&self, state: &ResearchState) -> Result<StateUpdate, StageError> {
        let kb = state
            .knowledge_base
            .as_ref()
            .ok_or_else(|| StageError::input("knowledge base is missing"))?;
        let sections = state
            .report_sections
            .as_ref()
            .ok_or_else(|| StageError::input("report sections are missing"))?;
        if sections.len() != kb.topic_count() {
            return Err(StageError::input(format!(
                "{} sections for {} topics",
                sections.len(),
                kb.topic_count()
            )));
        }

        let work = kb
            .topics
            .iter()
            .zip(sections)
            .enumerate()
            .map(|(index, (topic, section))| self.review(index, topic, section))
            .collect::<Vec<_>>();
        let verdicts = try_gather_ordered(work, self.ctx.config.max_concurrency).await?;

        let criticism: Criticism = verdicts.into_iter().enumerate().collect();
        let failing = criticism.values().filter(|v| !v.is_pass()).count();
        tracing::info!(sections = criticism.len(), failing, "review complete");

        Ok(StateUpdate::new()
            .with_criticism(criticism)
            .with_is_criticized(true))
    }
}
