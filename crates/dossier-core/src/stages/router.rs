//! Router stage: pick sources, retrieve documents

use crate::collaborators::Role;
use crate::error::StageError;
use crate::fanout::gather_ordered;
use crate::prompts;
use crate::stage::{Stage, StageContext, StageKind};
use crate::state::{DocumentSource, RawDocuments, ResearchState, SourceSelection, StateUpdate};
use async_trait::async_trait;
use std::sync::Arc;

/// Chooses sources and retrieves documents for the topic
#[derive(Debug, Clone)]
pub struct RouterStage {
    ctx: Arc<StageContext>,
}

impl RouterStage {
    /// Create router stage
    #[inline]
    #[must_use]
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    async fn retrieve(&self, topic: &str, source: DocumentSource) -> (DocumentSource, String) {
        let Some(retriever) = self.ctx.retrievers.get(source) else {
            tracing::warn!(%source, "no retriever registered; using empty document");
            return (source, String::new());
        };

        match retriever.search(topic).await {
            Ok(text) => {
                tracing::debug!(%source, chars = text.len(), "retrieved");
                (source, truncate_chars(text, self.ctx.config.max_document_chars))
            }
            Err(e) => {
                tracing::warn!(%source, error = %e, "retrieval failed; using empty document");
                (source, String::new())
            }
        }
    }
}

#[async_trait]
impl Stage for RouterStage {
    fn kind(&self) -> StageKind {
        StageKind::Router
    }

    async fn execute(&self, state: &ResearchState) -> Result<StateUpdate, StageError> {
        let topic = state.topic.trim();
        if topic.is_empty() {
            return Err(StageError::input("topic is empty"));
        }

        let request = self.ctx.request(
            Role::Router,
            prompts::ROUTER_INSTRUCTIONS,
            prompts::router_input(topic),
        );
        let response = self.ctx.generator.generate(&request).await?;
        let selection = SourceSelection::parse_decision(&response)
            .ok_or(StageError::MalformedDecision { response })?;
        tracing::info!(%selection, "sources selected");

        let mut sources = selection.sources().to_vec();
        if self.ctx.config.include_news {
            sources.push(DocumentSource::News);
        }

        let fetched = gather_ordered(
            sources
                .iter()
                .map(|s| self.retrieve(topic, *s))
                .collect::<Vec<_>>(),
            self.ctx.config.max_concurrency,
        )
        .await;

        let mut documents = RawDocuments::empty();
        for (source, text) in fetched {
            documents.insert(source, text);
        }

        Ok(StateUpdate::new()
            .with_source_selection(selection)
            .with_raw_documents(documents))
    }
}

/// Keep at most `max` characters, cutting on a char boundary
fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max) {
        text.truncate(cut);
    }
    text
}
