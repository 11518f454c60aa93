//! Error types for Dossier Core
//!
//! Provides error handling for:
//! - Stage failures (input contracts, schema violations, generation)
//! - Collaborator failures (generation, retrieval, persistence, rendering)
//! - Engine failures (state merge, routing, timeouts, cancellation)
//! - Configuration loading

use crate::engine::Phase;
use crate::stage::StageKind;
use crate::state::StateError;
use dossier_knowledge::KnowledgeError;

/// Run-level error, caught once at the engine boundary
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage failed
    #[error("{stage} stage failed: {source}")]
    Stage {
        /// Stage that failed
        stage: StageKind,
        /// Underlying failure
        #[source]
        source: StageError,
    },

    /// A stage update could not be merged
    #[error("state merge rejected: {0}")]
    State(#[from] StateError),

    /// Edge evaluation failed
    #[error("routing failed: {0}")]
    Routing(#[from] RoutingError),

    /// Engine attempted a transition outside the graph
    #[error("illegal phase transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current phase
        from: Phase,
        /// Requested phase
        to: Phase,
    },

    /// Critique loop hit its cycle budget and the policy is to fail
    #[error("rewrite budget exhausted after {cycles} cycles; failing sections {failing:?}")]
    RewriteBudgetExhausted {
        /// Rewrite passes performed
        cycles: u32,
        /// Sections still failing review
        failing: Vec<usize>,
    },

    /// Stage exceeded its time budget
    #[error("{stage} stage timed out after {duration_secs}s")]
    Timeout {
        /// Stage that timed out
        stage: StageKind,
        /// Configured budget
        duration_secs: u64,
    },

    /// Run was cancelled at a stage boundary
    #[error("run cancelled before {stage} stage")]
    Cancelled {
        /// Stage that was about to run
        stage: StageKind,
    },
}

impl PipelineError {
    /// Wrap a stage error
    #[inline]
    #[must_use]
    pub fn stage(stage: StageKind, source: StageError) -> Self {
        Self::Stage { stage, source }
    }

    /// Check if this is an input-contract violation
    #[inline]
    #[must_use]
    pub fn is_input_contract(&self) -> bool {
        matches!(
            self,
            Self::Stage {
                source: StageError::InputContract(_),
                ..
            }
        )
    }

    /// Check if the run could reasonably be retried as a whole
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stage { source, .. } => source.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Stage the failure is attributed to, if any
    #[inline]
    #[must_use]
    pub fn failed_stage(&self) -> Option<StageKind> {
        match self {
            Self::Stage { stage, .. } | Self::Timeout { stage, .. } | Self::Cancelled { stage } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

/// Stage-local error
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Required input missing or invalid
    #[error("input contract violated: {0}")]
    InputContract(String),

    /// Router response was not one of the allowed tokens
    #[error("malformed routing decision: {response:?}")]
    MalformedDecision {
        /// Raw generator response
        response: String,
    },

    /// Extractor payload failed to parse or validate
    #[error("knowledge base rejected: {source}")]
    SchemaViolation {
        /// Parse or validation failure
        #[source]
        source: KnowledgeError,
        /// Raw generator response, kept for diagnosis
        payload: String,
    },

    /// Generation call failed
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Critique of one section failed
    #[error("critique of section {index} failed: {source}")]
    Critique {
        /// Section index
        index: usize,
        /// Underlying failure
        #[source]
        source: GenerationError,
    },

    /// Critic returned nothing for a section
    #[error("critic returned an empty verdict for section {index}")]
    EmptyVerdict {
        /// Section index
        index: usize,
    },

    /// Rendering collaborator failed
    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),
}

impl StageError {
    /// Create input-contract error
    #[inline]
    pub fn input(message: impl Into<String>) -> Self {
        Self::InputContract(message.into())
    }

    /// Check if error is transient
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Generation(e) | Self::Critique { source: e, .. } => e.is_transient(),
            _ => false,
        }
    }

    /// Raw offending payload, for schema violations
    #[inline]
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::SchemaViolation { payload, .. } => Some(payload),
            Self::MalformedDecision { response } => Some(response),
            _ => None,
        }
    }
}

/// Edge evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// Post-critic decision requested without a verdict set
    #[error("no criticism available to route on")]
    MissingCriticism,
}

/// Text generation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Provider rate limit
    #[error("rate limited")]
    RateLimited,

    /// Provider returned an error
    #[error("backend error: {0}")]
    Backend(String),

    /// No generator configured for this role
    #[error("generator not configured")]
    NotConfigured,
}

impl GenerationError {
    /// Check if a retry by a wrapping layer may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited)
    }
}

/// Retrieval failures (never used for "no results")
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    /// Source could not be reached
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Source answered with an error
    #[error("source error: {0}")]
    Backend(String),
}

/// Persistence failures
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store-specific failure
    #[error("store error: {0}")]
    Backend(String),
}

/// Rendering failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Nothing to render
    #[error("no sections to render")]
    Empty,

    /// Renderer-specific failure
    #[error("renderer error: {0}")]
    Backend(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),

    /// A required collaborator was not supplied
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}
