//! Local stubs for unit tests
//!
//! Integration tests use `dossier-test-utils`; unit tests cannot, since that
//! crate links its own copy of these types.

use crate::collaborators::{GenerationRequest, Retriever, Retrievers, TextGenerator};
use crate::config::PipelineConfig;
use crate::error::{GenerationError, RetrievalError};
use crate::render::MarkdownRenderer;
use crate::stage::StageContext;
use crate::state::DocumentSource;
use async_trait::async_trait;
use dossier_knowledge::{KnowledgeBase, Source, Subtopic, Topic};
use parking_lot::Mutex;
use std::sync::Arc;

type Handler = dyn Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync;

/// Generator driven by a closure, recording every request
#[derive(Clone)]
pub(crate) struct FnGenerator {
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl FnGenerator {
    pub(crate) fn new(
        handler: impl Fn(&GenerationRequest) -> Result<String, GenerationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            requests: Arc::default(),
        }
    }

    pub(crate) fn reply(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for FnGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().push(request.clone());
        (self.handler)(request)
    }
}

/// Retriever returning a fixed document or failing
pub(crate) struct FixedRetriever {
    source: DocumentSource,
    text: Option<String>,
}

impl FixedRetriever {
    pub(crate) fn ok(source: DocumentSource, text: &str) -> Arc<dyn Retriever> {
        Arc::new(Self {
            source,
            text: Some(text.to_string()),
        })
    }

    pub(crate) fn failing(source: DocumentSource) -> Arc<dyn Retriever> {
        Arc::new(Self { source, text: None })
    }
}

#[async_trait]
impl Retriever for FixedRetriever {
    fn source(&self) -> DocumentSource {
        self.source
    }

    async fn search(&self, _topic: &str) -> Result<String, RetrievalError> {
        self.text
            .clone()
            .ok_or_else(|| RetrievalError::Unavailable(self.source.to_string()))
    }
}

pub(crate) fn context(
    generator: FnGenerator,
    retrievers: Retrievers,
    config: PipelineConfig,
) -> Arc<StageContext> {
    Arc::new(StageContext {
        generator: Arc::new(generator),
        retrievers,
        renderer: Arc::new(MarkdownRenderer),
        config,
    })
}

/// Two topics, three sources
pub(crate) fn sample_kb() -> KnowledgeBase {
    KnowledgeBase {
        title: "Quantum Computing".into(),
        sources: vec![
            Source::new(1, "Quantum computing").with_origin("wikipedia"),
            Source::new(2, "Polynomial-Time Algorithms for Prime Factorization"),
            Source::new(3, "A fast quantum mechanical algorithm for database search"),
        ],
        topics: vec![
            Topic::new("t1", "Qubits")
                .with_point("Qubits hold superpositions of 0 and 1")
                .with_references([1])
                .with_subtopic(
                    Subtopic::new("t1.1", "Decoherence")
                        .with_point("Environmental noise destroys coherence")
                        .with_references([1]),
                ),
            Topic::new("t2", "Algorithms")
                .with_point("Shor factors integers in polynomial time")
                .with_point("Grover searches unsorted data quadratically faster")
                .with_references([2, 3]),
        ],
        abstract_text: "An overview of quantum computing.".into(),
        conclusion: "Practical machines remain an engineering challenge.".into(),
    }
}
