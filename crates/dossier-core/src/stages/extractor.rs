//! Extractor stage: documents to knowledge base

use crate::collaborators::Role;
use crate::error::StageError;
use crate::prompts;
use crate::stage::{Stage, StageContext, StageKind};
use crate::state::{ResearchState, StateUpdate};
use async_trait::async_trait;
use dossier_knowledge::parse_knowledge_base;
use std::sync::Arc;

/// Builds a validated knowledge base from the retrieved documents
#[derive(Debug, Clone)]
pub struct ExtractorStage {
    ctx: Arc<StageContext>,
}

impl ExtractorStage {
    /// Create extractor stage
    #[inline]
    #[must_use]
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage for ExtractorStage {
    fn kind(&self) -> StageKind {
        StageKind::Extractor
    }

    async fn execute(&self, state: &ResearchState) -> Result<StateUpdate, StageError> {
        if state.raw_documents.is_blank() {
            return Err(StageError::input("no documents were retrieved"));
        }

        let request = self.ctx.request(
            Role::Extractor,
            prompts::extractor_instructions(),
            prompts::extractor_input(&state.topic, &state.raw_documents),
        );
        let payload = self.ctx.generator.generate(&request).await?;

        let kb = match parse_knowledge_base(&payload) {
            Ok(kb) => kb,
            Err(source) => {
                tracing::error!(error = %source, "knowledge base rejected");
                return Err(StageError::SchemaViolation { source, payload });
            }
        };
        tracing::info!(
            topics = kb.topic_count(),
            sources = kb.sources.len(),
            "knowledge base extracted"
        );

        Ok(StateUpdate::new().with_knowledge_base(kb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Retrievers;
    use crate::config::PipelineConfig;
    use crate::state::DocumentSource;
    use crate::testing::{context, sample_kb, FnGenerator};
    use dossier_knowledge::KnowledgeError;

    fn with_docs() -> ResearchState {
        let mut state = ResearchState::new("Quantum Computing");
        state.raw_documents.insert(DocumentSource::Wiki, "qubits are...");
        state
    }

    fn stage(generator: FnGenerator) -> ExtractorStage {
        ExtractorStage::new(context(generator, Retrievers::new(), PipelineConfig::default()))
    }

    #[tokio::test]
    async fn extracts_fenced_payload() {
        let json = serde_json::to_string(&sample_kb()).unwrap();
        let update = stage(FnGenerator::reply(format!("```json\n{json}\n```")))
            .execute(&with_docs())
            .await
            .unwrap();

        assert_eq!(update.knowledge_base, Some(sample_kb()));
    }

    #[tokio::test]
    async fn blank_documents_violate_input_contract() {
        let generator = FnGenerator::reply("{}");
        let err = stage(generator.clone())
            .execute(&ResearchState::new("QC"))
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::InputContract(_)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn dangling_reference_is_schema_violation_with_payload() {
        let mut kb = sample_kb();
        kb.topics[0].references.push(42);
        let raw = serde_json::to_string(&kb).unwrap();

        let err = stage(FnGenerator::reply(raw.clone()))
            .execute(&with_docs())
            .await
            .unwrap_err();

        match err {
            StageError::SchemaViolation { source, payload } => {
                assert!(matches!(source, KnowledgeError::Invalid { .. }));
                assert_eq!(payload, raw);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn uses_extractor_sampling() {
        let generator = FnGenerator::reply(serde_json::to_string(&sample_kb()).unwrap());
        stage(generator.clone()).execute(&with_docs()).await.unwrap();

        let request = &generator.requests()[0];
        assert_eq!(request.role, Role::Extractor);
        assert!(request.input.contains("qubits are..."));
        assert!(request.temperature.abs() < f32::EPSILON);
    }
}
