//! Dossier Core - research workflow engine
//!
//! Turns a research topic into a cited, multi-section report by driving a
//! fixed graph of stages over a shared state:
//! - Router picks sources and retrieves documents
//! - Extractor builds a validated knowledge base
//! - Writer expands each topic into a section
//! - Critic reviews every section; failing ones loop back to the writer
//! - Assembler renders the final report
//!
//! Text generation, retrieval, persistence and rendering are injected
//! collaborators (see [`collaborators`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use dossier_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(generator: Arc<dyn TextGenerator>) -> Result<(), ConfigError> {
//! let engine = WorkflowEngine::builder()
//!     .with_generator(generator)
//!     .with_store(Arc::new(JsonFileStore::new("data")))
//!     .build()?;
//!
//! let outcome = engine.run("Quantum Computing").await;
//! if let Some(report) = outcome.report() {
//!     println!("{}", report.body);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod persist;
pub mod prompts;
pub mod render;
pub mod retry;
pub mod routing;
pub mod stage;
pub mod stages;
pub mod state;

#[cfg(test)]
mod testing;

pub use collaborators::{
    GenerationRequest, ModelTier, Renderer, ReportMetadata, Retriever, Retrievers, Role,
    StateStore, TextGenerator,
};
pub use config::{PipelineConfig, RoleConfig, RoleSettings};
pub use engine::{
    allowed_transitions, format_elapsed, validate_transition, Phase, RunOutcome, WorkflowEngine,
    WorkflowEngineBuilder,
};
pub use error::{
    ConfigError, GenerationError, PersistError, PipelineError, RenderError, RetrievalError,
    RoutingError, StageError,
};
pub use persist::{sanitize, JsonFileStore, MemoryStore, RunId, Snapshot};
pub use render::MarkdownRenderer;
pub use retry::{ExhaustionPolicy, RewriteBudget, RewritePolicy};
pub use routing::{route_after_critic, route_after_writer, AfterCritic, AfterWriter};
pub use stage::{Stage, StageContext, StageKind};
pub use state::{
    Criticism, DocumentSource, FinalReport, RawDocuments, ReportFormat, ResearchState,
    SourceSelection, StateError, StateField, StateUpdate, Verdict,
};

pub use dossier_knowledge::{KnowledgeBase, KnowledgeError, Source, Subtopic, Topic};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the engine
    pub use crate::{
        ConfigError, DocumentSource, ExhaustionPolicy, FinalReport, GenerationError,
        GenerationRequest, JsonFileStore, MemoryStore, PipelineConfig, PipelineError,
        ResearchState, RetrievalError, Retriever, RewritePolicy, Role, RunOutcome, StateStore,
        TextGenerator, WorkflowEngine,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
