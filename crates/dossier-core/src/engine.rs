//! Workflow engine
//!
//! Drives one run through the static stage graph:
//!
//! ```text
//! Routing -> Extracting -> Writing -> Critiquing -> Assembling -> Done
//!                             ^           |
//!                             +-----------+   (rewrite loop, bounded)
//! ```
//!
//! Every phase may also move to the absorbing `Failed` phase. The engine owns
//! the state, merges each stage's update after checking field ownership,
//! evaluates the outgoing edge and persists the state at the end of the run
//! whether it completed or not.

use crate::collaborators::{Renderer, Retriever, Retrievers, StateStore, TextGenerator};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, PersistError, PipelineError};
use crate::persist::{MemoryStore, RunId};
use crate::render::MarkdownRenderer;
use crate::retry::ExhaustionPolicy;
use crate::routing::{route_after_critic, route_after_writer, AfterCritic, AfterWriter};
use crate::stage::{Stage, StageContext, StageKind};
use crate::stages::{AssemblerStage, CriticStage, ExtractorStage, RouterStage, WriterStage};
use crate::state::{FinalReport, ResearchState, StateUpdate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use ulid::Ulid;

/// Engine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Router stage
    Routing,
    /// Extractor stage
    Extracting,
    /// Writer stage
    Writing,
    /// Critic stage
    Critiquing,
    /// Assembler stage
    Assembling,
    /// Report produced
    Done,
    /// Run aborted
    Failed,
}

impl Phase {
    /// Stage executed in this phase; `None` for terminal phases
    #[must_use]
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Routing => Some(StageKind::Router),
            Self::Extracting => Some(StageKind::Extractor),
            Self::Writing => Some(StageKind::Writer),
            Self::Critiquing => Some(StageKind::Critic),
            Self::Assembling => Some(StageKind::Assembler),
            Self::Done | Self::Failed => None,
        }
    }

    /// Check if terminal
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl From<StageKind> for Phase {
    fn from(kind: StageKind) -> Self {
        match kind {
            StageKind::Router => Self::Routing,
            StageKind::Extractor => Self::Extracting,
            StageKind::Writer => Self::Writing,
            StageKind::Critic => Self::Critiquing,
            StageKind::Assembler => Self::Assembling,
        }
    }
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: Phase) -> Vec<Phase> {
    use Phase::*;
    match from {
        Routing => vec![Extracting, Failed],
        Extracting => vec![Writing, Failed],
        Writing => vec![Critiquing, Assembling, Failed],
        Critiquing => vec![Writing, Assembling, Failed],
        Assembling => vec![Done, Failed],
        Done | Failed => vec![],
    }
}

/// Validate a phase transition
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), PipelineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PipelineError::IllegalTransition { from, to })
    }
}

/// Result of one run
///
/// Completed and failed runs are told apart by the presence of a final
/// report in `state`.
#[derive(Debug)]
pub struct RunOutcome {
    /// Topic-derived run id, also the persistence key
    pub run_id: RunId,
    /// Unique id of this execution
    pub instance: Ulid,
    /// Final (or last partial) state
    pub state: ResearchState,
    /// Failure, if the run did not complete
    pub error: Option<PipelineError>,
    /// Phases entered, in order, ending with `Done` or `Failed`
    pub trace: Vec<Phase>,
    /// Wall-clock duration
    pub elapsed: Duration,
}

impl RunOutcome {
    /// Check if a report was produced
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// The report, if produced
    #[inline]
    #[must_use]
    pub fn report(&self) -> Option<&FinalReport> {
        self.state.final_report.as_ref()
    }

    /// Number of times a phase was entered
    #[must_use]
    pub fn visits(&self, phase: Phase) -> usize {
        self.trace.iter().filter(|p| **p == phase).count()
    }
}

/// Format a duration as `Xm Y.YYs`
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let minutes = (secs / 60.0).floor();
    format!("{}m {:.2}s", minutes as u64, secs - minutes * 60.0)
}

/// Composes stages and collaborators into the research workflow
pub struct WorkflowEngine {
    ctx: Arc<StageContext>,
    store: Arc<dyn StateStore>,
    router: RouterStage,
    extractor: ExtractorStage,
    writer: WriterStage,
    critic: CriticStage,
    assembler: AssemblerStage,
}

impl WorkflowEngine {
    /// Start building an engine
    #[inline]
    #[must_use]
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::default()
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    /// Run the pipeline for a topic
    pub async fn run(&self, topic: impl Into<String>) -> RunOutcome {
        self.run_with_cancellation(topic, CancellationToken::new())
            .await
    }

    /// Run the pipeline, stopping at the next stage boundary once `cancel` fires
    pub async fn run_with_cancellation(
        &self,
        topic: impl Into<String>,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let topic = topic.into();
        let run_id = RunId::for_topic(&topic);
        let instance = Ulid::new();
        let span = tracing::info_span!(
            "research_run",
            run_id = %run_id,
            instance = %instance,
            topic = %topic
        );

        self.execute_run(topic, run_id, instance, cancel)
            .instrument(span)
            .await
    }

    /// Load the last persisted state for a topic
    pub async fn load_state(&self, topic: &str) -> Result<Option<ResearchState>, PersistError> {
        self.store.load(&RunId::for_topic(topic)).await
    }

    async fn execute_run(
        &self,
        topic: String,
        run_id: RunId,
        instance: Ulid,
        cancel: CancellationToken,
    ) -> RunOutcome {
        tracing::info!("research run started");
        let started = Instant::now();
        let mut state = ResearchState::new(topic);
        let mut trace = Vec::new();

        let result = self.drive(&mut state, &mut trace, &run_id, &cancel).await;
        let elapsed = started.elapsed();

        let error = match result {
            Ok(()) => {
                trace.push(Phase::Done);
                tracing::info!(
                    elapsed = %format_elapsed(elapsed),
                    rewrite_cycles = state.rewrite_cycles,
                    "research run completed"
                );
                None
            }
            Err(e) => {
                trace.push(Phase::Failed);
                tracing::error!(
                    error = %e,
                    stage = ?e.failed_stage(),
                    elapsed = %format_elapsed(elapsed),
                    "research run failed"
                );
                Some(e)
            }
        };

        self.persist(&run_id, &state).await;

        RunOutcome {
            run_id,
            instance,
            state,
            error,
            trace,
            elapsed,
        }
    }

    async fn drive(
        &self,
        state: &mut ResearchState,
        trace: &mut Vec<Phase>,
        run_id: &RunId,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let mut kind = StageKind::Router;

        loop {
            let phase = Phase::from(kind);
            trace.push(phase);
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled { stage: kind });
            }

            let update = self.execute_stage(kind, state).await?;
            state.merge(kind, update)?;

            if self.ctx.config.checkpoint_each_stage {
                self.persist(run_id, state).await;
            }

            let next = self.next_phase(kind, state)?;
            validate_transition(phase, next)?;
            match next.stage() {
                Some(stage) => kind = stage,
                None => return Ok(()),
            }
        }
    }

    async fn execute_stage(
        &self,
        kind: StageKind,
        state: &ResearchState,
    ) -> Result<StateUpdate, PipelineError> {
        tracing::info!(stage = %kind, "stage started");
        let started = Instant::now();
        let stage = self.stage(kind);
        debug_assert_eq!(stage.kind(), kind);

        let result = match self.ctx.config.stage_timeout() {
            Some(limit) => tokio::time::timeout(limit, stage.execute(state))
                .await
                .map_err(|_| PipelineError::Timeout {
                    stage: kind,
                    duration_secs: limit.as_secs(),
                })?,
            None => stage.execute(state).await,
        };

        let update = result.map_err(|e| PipelineError::stage(kind, e))?;
        tracing::info!(
            stage = %kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage finished"
        );
        Ok(update)
    }

    /// Phase entered after `kind` completes
    fn next_phase(&self, kind: StageKind, state: &ResearchState) -> Result<Phase, PipelineError> {
        let config = &self.ctx.config;
        let budget = config.budget();
        let next = match kind {
            StageKind::Router => Phase::Extracting,
            StageKind::Extractor => Phase::Writing,
            StageKind::Writer => match route_after_writer(state, config.rewrite_policy) {
                AfterWriter::Critic => Phase::Critiquing,
                AfterWriter::Assembler => Phase::Assembling,
            },
            StageKind::Critic => match route_after_critic(state, budget)? {
                AfterCritic::Assemble => Phase::Assembling,
                AfterCritic::Rewrite => {
                    tracing::debug!(
                        remaining = budget.remaining(state.rewrite_cycles),
                        "rewrite scheduled"
                    );
                    Phase::Writing
                }
                AfterCritic::Exhausted => {
                    let failing = state.failing_sections();
                    match config.exhaustion_policy {
                        ExhaustionPolicy::AcceptBestEffort => {
                            tracing::warn!(
                                cycles = state.rewrite_cycles,
                                max_cycles = budget.max_cycles(),
                                ?failing,
                                "rewrite budget exhausted; assembling best effort"
                            );
                            Phase::Assembling
                        }
                        ExhaustionPolicy::FailRun => {
                            return Err(PipelineError::RewriteBudgetExhausted {
                                cycles: state.rewrite_cycles,
                                failing,
                            })
                        }
                    }
                }
            },
            StageKind::Assembler => Phase::Done,
        };
        Ok(next)
    }

    fn stage(&self, kind: StageKind) -> &dyn Stage {
        match kind {
            StageKind::Router => &self.router,
            StageKind::Extractor => &self.extractor,
            StageKind::Writer => &self.writer,
            StageKind::Critic => &self.critic,
            StageKind::Assembler => &self.assembler,
        }
    }

    async fn persist(&self, run_id: &RunId, state: &ResearchState) {
        if let Err(e) = self.store.save(run_id, state).await {
            tracing::error!(%run_id, error = %e, "failed to persist state");
        }
    }
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

/// Builder for [`WorkflowEngine`]
#[derive(Default)]
pub struct WorkflowEngineBuilder {
    generator: Option<Arc<dyn TextGenerator>>,
    retrievers: Retrievers,
    store: Option<Arc<dyn StateStore>>,
    renderer: Option<Arc<dyn Renderer>>,
    config: PipelineConfig,
}

impl WorkflowEngineBuilder {
    /// With text generator (required)
    #[inline]
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// With retriever for its source
    #[inline]
    #[must_use]
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retrievers.register(retriever);
        self
    }

    /// With retriever registry
    #[inline]
    #[must_use]
    pub fn with_retrievers(mut self, retrievers: Retrievers) -> Self {
        self.retrievers = retrievers;
        self
    }

    /// With state store; defaults to [`MemoryStore`]
    #[inline]
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// With renderer; defaults to [`MarkdownRenderer`]
    #[inline]
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// With configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<WorkflowEngine, ConfigError> {
        self.config.validate()?;
        let generator = self
            .generator
            .ok_or(ConfigError::MissingCollaborator("text generator"))?;

        let ctx = Arc::new(StageContext {
            generator,
            retrievers: self.retrievers,
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(MarkdownRenderer::new())),
            config: self.config,
        });

        Ok(WorkflowEngine {
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            router: RouterStage::new(Arc::clone(&ctx)),
            extractor: ExtractorStage::new(Arc::clone(&ctx)),
            writer: WriterStage::new(Arc::clone(&ctx)),
            critic: CriticStage::new(Arc::clone(&ctx)),
            assembler: AssemblerStage::new(Arc::clone(&ctx)),
            ctx,
        })
    }
}

impl fmt::Debug for WorkflowEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngineBuilder")
            .field("has_generator", &self.generator.is_some())
            .field("retrievers", &self.retrievers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Role;
    use crate::state::DocumentSource;
    use crate::testing::{sample_kb, FixedRetriever, FnGenerator};
    use proptest::prelude::*;

    const ALL: [Phase; 7] = [
        Phase::Routing,
        Phase::Extracting,
        Phase::Writing,
        Phase::Critiquing,
        Phase::Assembling,
        Phase::Done,
        Phase::Failed,
    ];

    fn happy_generator() -> FnGenerator {
        let kb = serde_json::to_string(&sample_kb()).unwrap_or_default();
        FnGenerator::new(move |req| match req.role {
            Role::Router => Ok("wiki".into()),
            Role::Extractor => Ok(kb.clone()),
            Role::Writer => Ok(format!("## Section {}", req.item.unwrap_or(0))),
            Role::Critic => Ok("PASS".into()),
        })
    }

    #[test]
    fn terminal_phases_have_no_exits() {
        assert!(allowed_transitions(Phase::Done).is_empty());
        assert!(allowed_transitions(Phase::Failed).is_empty());
        assert!(validate_transition(Phase::Routing, Phase::Writing).is_err());
        assert!(validate_transition(Phase::Critiquing, Phase::Writing).is_ok());
    }

    proptest! {
        #[test]
        fn every_live_phase_can_fail(i in 0usize..5) {
            prop_assert!(validate_transition(ALL[i], Phase::Failed).is_ok());
        }

        #[test]
        fn transitions_agree_with_table(i in 0usize..7, j in 0usize..7) {
            let (from, to) = (ALL[i], ALL[j]);
            prop_assert_eq!(
                validate_transition(from, to).is_ok(),
                allowed_transitions(from).contains(&to)
            );
        }
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_millis(1_500)), "0m 1.50s");
        assert_eq!(format_elapsed(Duration::from_millis(125_250)), "2m 5.25s");
    }

    #[test]
    fn stage_phases_round_trip() {
        for kind in StageKind::ALL {
            assert_eq!(Phase::from(kind).stage(), Some(kind));
        }
    }

    #[test]
    fn engine_dispatches_each_kind_to_its_stage() {
        let engine = WorkflowEngine::builder()
            .with_generator(Arc::new(happy_generator()))
            .build()
            .unwrap();
        for kind in StageKind::ALL {
            assert_eq!(engine.stage(kind).kind(), kind);
        }
    }

    #[test]
    fn assembler_is_followed_by_done() {
        let engine = WorkflowEngine::builder()
            .with_generator(Arc::new(happy_generator()))
            .build()
            .unwrap();
        let next = engine
            .next_phase(StageKind::Assembler, &ResearchState::new("QC"))
            .unwrap();
        assert_eq!(next, Phase::Done);
        assert!(next.stage().is_none());
    }

    #[test]
    fn builder_requires_generator() {
        let err = WorkflowEngine::builder().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCollaborator(_)));

        let bad = PipelineConfig::default().with_max_concurrency(0);
        let err = WorkflowEngine::builder()
            .with_generator(Arc::new(happy_generator()))
            .with_config(bad)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[tokio::test]
    async fn happy_path_skips_the_loop() {
        let store = Arc::new(MemoryStore::new());
        let engine = WorkflowEngine::builder()
            .with_generator(Arc::new(happy_generator()))
            .with_retriever(FixedRetriever::ok(DocumentSource::Wiki, "qubits"))
            .with_store(store.clone())
            .build()
            .unwrap();

        let outcome = engine.run("Quantum Computing").await;

        assert!(outcome.is_complete(), "{:?}", outcome.error);
        assert_eq!(
            outcome.trace,
            vec![
                Phase::Routing,
                Phase::Extracting,
                Phase::Writing,
                Phase::Critiquing,
                Phase::Assembling,
                Phase::Done
            ]
        );
        assert_eq!(store.save_count(), 1);
        assert!(engine
            .load_state("Quantum Computing")
            .await
            .unwrap()
            .is_some_and(|s| s.is_complete()));
    }

    #[tokio::test]
    async fn checkpointing_saves_after_every_stage() {
        let store = Arc::new(MemoryStore::new());
        let engine = WorkflowEngine::builder()
            .with_generator(Arc::new(happy_generator()))
            .with_retriever(FixedRetriever::ok(DocumentSource::Wiki, "qubits"))
            .with_store(store.clone())
            .with_config(PipelineConfig::default().with_checkpointing(true))
            .build()
            .unwrap();

        let outcome = engine.run("QC").await;
        assert!(outcome.is_complete());
        // five stages plus the final save
        assert_eq!(store.save_count(), 6);
    }

    #[tokio::test]
    async fn cancelled_run_stops_at_first_boundary() {
        let generator = happy_generator();
        let engine = WorkflowEngine::builder()
            .with_generator(Arc::new(generator.clone()))
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = engine.run_with_cancellation("QC", cancel).await;

        assert!(matches!(
            outcome.error,
            Some(PipelineError::Cancelled { stage: StageKind::Router })
        ));
        assert_eq!(outcome.trace, vec![Phase::Routing, Phase::Failed]);
        assert_eq!(generator.calls(), 0);
    }
}
