//! Assembler stage: hand sections to the renderer

use crate::collaborators::ReportMetadata;
use crate::error::StageError;
use crate::retry::RewritePolicy;
use crate::stage::{Stage, StageContext, StageKind};
use crate::state::{ResearchState, StateUpdate};
use async_trait::async_trait;
use std::sync::Arc;

/// Terminal stage producing the final report
#[derive(Debug, Clone)]
pub struct AssemblerStage {
    ctx: Arc<StageContext>,
}

impl AssemblerStage {
    /// Create assembler stage
    #[inline]
    #[must_use]
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    /// Split failing sections into `(unresolved, unverified)`
    ///
    /// After a one-shot rewrite the verdicts predate the new text: the
    /// criticized sections were rewritten but never re-reviewed.
    fn classify(&self, state: &ResearchState) -> (Vec<usize>, Vec<usize>) {
        let failing = state.failing_sections();
        if state.needs_rewrite && self.ctx.config.rewrite_policy == RewritePolicy::OneShot {
            (Vec::new(), failing)
        } else {
            (failing, Vec::new())
        }
    }
}

#[async_trait]
impl Stage for AssemblerStage {
    fn kind(&self) -> StageKind {
        StageKind::Assembler
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

        let (unresolved_sections, unverified_sections) = self.classify(state);
        let metadata = ReportMetadata {
            title: kb.title.clone(),
            topic: state.topic.clone(),
            abstract_text: kb.abstract_text.clone(),
            conclusion: kb.conclusion.clone(),
            sources: kb.sources.clone(),
            section_titles: kb.topics.iter().map(|t| t.title.clone()).collect(),
            unresolved_sections,
            unverified_sections,
        };
        if !metadata.unverified_sections.is_empty() {
            tracing::info!(
                unverified = ?metadata.unverified_sections,
                "assembling rewritten sections without re-review"
            );
        }
        if !metadata.unresolved_sections.is_empty() {
            tracing::warn!(
                unresolved = ?metadata.unresolved_sections,
                "assembling with unresolved critiques"
            );
        }

        let report = self.ctx.renderer.assemble(sections, &metadata).await?;
        tracing::info!(chars = report.body.len(), "report assembled");

        Ok(StateUpdate::new().with_final_report(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Retrievers;
    use crate::config::PipelineConfig;
    use crate::state::{Criticism, Verdict};
    use crate::testing::{context, sample_kb, FnGenerator};

    fn stage(config: PipelineConfig) -> AssemblerStage {
        AssemblerStage::new(context(FnGenerator::reply(""), Retrievers::new(), config))
    }

    fn ready() -> ResearchState {
        let mut state = ResearchState::new("Quantum Computing");
        state.knowledge_base = Some(sample_kb());
        state.report_sections = Some(vec!["## Qubits\nbody".into(), "## Algorithms\nbody".into()]);
        state.criticism = Some(Criticism::from([
            (0, Verdict::Pass),
            (1, Verdict::Critique("weak".into())),
        ]));
        state
    }

    #[tokio::test]
    async fn renders_sections_and_lists_unresolved() {
        let update = stage(PipelineConfig::default()).execute(&ready()).await.unwrap();

        let report = update.final_report.unwrap();
        assert!(report.body.contains("## Qubits"));
        assert!(report.body.contains("## Algorithms"));
        assert_eq!(report.unresolved_sections, vec![1]);
    }

    #[tokio::test]
    async fn one_shot_rewrite_marks_sections_unverified() {
        let mut state = ready();
        state.needs_rewrite = true;

        let report = stage(PipelineConfig::default())
            .execute(&state)
            .await
            .unwrap()
            .final_report
            .unwrap();
        assert!(report.unresolved_sections.is_empty());
        assert_eq!(report.unverified_sections, vec![1]);

        let recritique = PipelineConfig::default().with_rewrite_policy(RewritePolicy::Recritique);
        let report = stage(recritique).execute(&state).await.unwrap().final_report.unwrap();
        assert_eq!(report.unresolved_sections, vec![1]);
        assert!(report.unverified_sections.is_empty());
    }

    #[tokio::test]
    async fn clean_review_has_nothing_unverified() {
        let mut state = ready();
        state.criticism = Some(Criticism::from([(0, Verdict::Pass), (1, Verdict::Pass)]));

        let report = stage(PipelineConfig::default())
            .execute(&state)
            .await
            .unwrap()
            .final_report
            .unwrap();
        assert!(report.unresolved_sections.is_empty());
        assert!(report.unverified_sections.is_empty());
    }

    #[tokio::test]
    async fn requires_sections() {
        let mut state = ready();
        state.report_sections = None;
        let err = stage(PipelineConfig::default()).execute(&state).await.unwrap_err();
        assert!(matches!(err, StageError::InputContract(_)));
    }
}
