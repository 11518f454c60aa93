//! Stage contract
//!
//! A stage reads the current [`ResearchState`] and returns a partial update.
//! Each stage owns a fixed set of fields; the engine rejects updates that
//! write anything else.

use crate::collaborators::{GenerationRequest, Renderer, Retrievers, Role, TextGenerator};
use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::state::{ResearchState, StateField, StateUpdate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pipeline stage identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Chooses sources and retrieves documents
    Router,
    /// Builds the knowledge base
    Extractor,
    /// Expands or rewrites report sections
    Writer,
    /// Checks each section against its topic data
    Critic,
    /// Combines sections into the final report
    Assembler,
}

impl StageKind {
    /// Pipeline order
    pub const ALL: [StageKind; 5] = [
        Self::Router,
        Self::Extractor,
        Self::Writer,
        Self::Critic,
        Self::Assembler,
    ];

    /// Fields this stage may write
    #[must_use]
    pub fn owned_fields(&self) -> &'static [StateField] {
        match self {
            Self::Router => &[StateField::SourceSelection, StateField::RawDocuments],
            Self::Extractor => &[StateField::KnowledgeBase],
            Self::Writer => &[
                StateField::ReportSections,
                StateField::NeedsRewrite,
                StateField::RewriteCycles,
            ],
            Self::Critic => &[StateField::Criticism, StateField::IsCriticized],
            Self::Assembler => &[StateField::FinalReport],
        }
    }

    /// Check if this stage owns a field
    #[inline]
    #[must_use]
    pub fn owns(&self, field: StateField) -> bool {
        self.owned_fields().contains(&field)
    }

    /// Lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Extractor => "extractor",
            Self::Writer => "writer",
            Self::Critic => "critic",
            Self::Assembler => "assembler",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work in the pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which stage this is; determines writable fields
    fn kind(&self) -> StageKind;

    /// Run against a read-only view of the state
    async fn execute(&self, state: &ResearchState) -> Result<StateUpdate, StageError>;
}

/// Collaborators and settings shared by every stage of a run
#[derive(Clone)]
pub struct StageContext {
    /// Text generation backend
    pub generator: Arc<dyn TextGenerator>,
    /// Retrieval backends
    pub retrievers: Retrievers,
    /// Report renderer
    pub renderer: Arc<dyn Renderer>,
    /// Pipeline settings
    pub config: PipelineConfig,
}

impl StageContext {
    /// Build a request with the role's configured sampling
    #[must_use]
    pub fn request(
        &self,
        role: Role,
        instructions: impl Into<String>,
        input: impl Into<String>,
    ) -> GenerationRequest {
        let settings = self.config.roles.get(role);
        GenerationRequest::new(role, instructions, input)
            .with_temperature(settings.temperature)
            .with_tier(settings.tier)
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("retrievers", &self.retrievers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
