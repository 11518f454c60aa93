//! External collaborator interfaces
//!
//! Text generation, retrieval, persistence and rendering live outside the
//! engine. Each is a trait object injected at build time so the engine can be
//! driven by scripted implementations in tests.

use crate::error::{GenerationError, PersistError, RenderError, RetrievalError};
use crate::persist::RunId;
use crate::state::{DocumentSource, FinalReport, ResearchState};
use async_trait::async_trait;
use dossier_knowledge::Source;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Role a generation request is made for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Source selection
    Router,
    /// Knowledge extraction
    Extractor,
    /// Section writing and rewriting
    Writer,
    /// Section review
    Critic,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Router => "router",
            Self::Extractor => "extractor",
            Self::Writer => "writer",
            Self::Critic => "critic",
        })
    }
}

/// Model size hint for the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheap, fast model
    Small,
    /// Full model
    #[default]
    Default,
}

/// One generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Requesting role
    pub role: Role,
    /// Fixed role instructions
    pub instructions: String,
    /// Structured input for this call
    pub input: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Model size hint
    pub tier: ModelTier,
    /// Section index for per-item writer/critic calls
    pub item: Option<usize>,
}

impl GenerationRequest {
    /// Create new request with default sampling
    #[inline]
    #[must_use]
    pub fn new(role: Role, instructions: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            role,
            instructions: instructions.into(),
            input: input.into(),
            temperature: 0.0,
            tier: ModelTier::Default,
            item: None,
        }
    }

    /// With temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// With model tier
    #[inline]
    #[must_use]
    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }

    /// For a section index
    #[inline]
    #[must_use]
    pub fn for_item(mut self, index: usize) -> Self {
        self.item = Some(index);
        self
    }
}

/// Text generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a completion for the request
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Document retrieval for one source
///
/// "No results" is `Ok(String::new())`, never an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Source this retriever serves
    fn source(&self) -> DocumentSource;

    /// Search for documents about a topic
    async fn search(&self, topic: &str) -> Result<String, RetrievalError>;
}

/// Run state persistence
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Save a state snapshot under a run id
    async fn save(&self, run_id: &RunId, state: &ResearchState) -> Result<(), PersistError>;

    /// Load the latest snapshot, if any
    async fn load(&self, run_id: &RunId) -> Result<Option<ResearchState>, PersistError>;
}

/// Report rendering
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Combine ordered sections and metadata into a report
    async fn assemble(
        &self,
        sections: &[String],
        metadata: &ReportMetadata,
    ) -> Result<FinalReport, RenderError>;
}

/// Everything besides section bodies the renderer needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report title
    pub title: String,
    /// Research topic as entered
    pub topic: String,
    /// Abstract
    pub abstract_text: String,
    /// Conclusion
    pub conclusion: String,
    /// Cited sources
    pub sources: Vec<Source>,
    /// Topic titles, index-aligned with sections
    pub section_titles: Vec<String>,
    /// Sections that still fail review
    pub unresolved_sections: Vec<usize>,
    /// Sections rewritten after their last review and not reviewed since
    #[serde(default)]
    pub unverified_sections: Vec<usize>,
}

/// Retrievers keyed by source
#[derive(Clone, Default)]
pub struct Retrievers {
    inner: BTreeMap<DocumentSource, Arc<dyn Retriever>>,
}

impl Retrievers {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With retriever, replacing any previous one for the same source
    #[must_use]
    pub fn with(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.register(retriever);
        self
    }

    /// Register retriever
    pub fn register(&mut self, retriever: Arc<dyn Retriever>) {
        self.inner.insert(retriever.source(), retriever);
    }

    /// Retriever for a source
    #[inline]
    #[must_use]
    pub fn get(&self, source: DocumentSource) -> Option<&Arc<dyn Retriever>> {
        self.inner.get(&source)
    }

    /// Registered sources
    pub fn sources(&self) -> impl Iterator<Item = DocumentSource> + '_ {
        self.inner.keys().copied()
    }
}

impl fmt::Debug for Retrievers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.keys()).finish()
    }
}
