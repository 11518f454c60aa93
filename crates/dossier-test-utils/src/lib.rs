//! Testing utilities for Dossier workspace
//!
//! Scripted collaborators and fixtures shared by the integration tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use dossier_core::prompts::REWRITE_INSTRUCTIONS;
use dossier_core::{
    DocumentSource, GenerationError, GenerationRequest, MemoryStore, PersistError,
    PipelineConfig, ResearchState, RetrievalError, Retriever, Role, RunId, StateStore,
    TextGenerator, WorkflowEngine,
};
use dossier_knowledge::{KnowledgeBase, Source, Subtopic, Topic};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-role handler; `attempt` counts earlier calls with the same role and item
type Handler = dyn Fn(&GenerationRequest, usize) -> Result<String, GenerationError> + Send + Sync;

/// Generator with a scripted handler per role, recording every request
#[derive(Clone)]
pub struct ScriptedGenerator {
    handlers: HashMap<Role, Arc<Handler>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    /// Happy path: `both`, the quantum fixture, one section per topic, all `PASS`
    pub fn new() -> Self {
        let kb = quantum_kb_json();
        Self {
            handlers: HashMap::new(),
            requests: Arc::default(),
        }
        .with_router_reply("both")
        .with_extractor_reply(kb)
        .with_writer(|req, attempt| {
            Ok(if attempt == 0 {
                default_section(req)
            } else {
                revised_section(req, attempt)
            })
        })
        .with_critic(|_, _| Ok("PASS".into()))
    }

    pub fn with_handler(
        mut self,
        role: Role,
        handler: impl Fn(&GenerationRequest, usize) -> Result<String, GenerationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.handlers.insert(role, Arc::new(handler));
        self
    }

    pub fn with_router_reply(self, reply: impl Into<String>) -> Self {
        let reply = reply.into();
        self.with_handler(Role::Router, move |_, _| Ok(reply.clone()))
    }

    pub fn with_extractor_reply(self, reply: impl Into<String>) -> Self {
        let reply = reply.into();
        self.with_handler(Role::Extractor, move |_, _| Ok(reply.clone()))
    }

    pub fn with_writer(
        self,
        handler: impl Fn(&GenerationRequest, usize) -> Result<String, GenerationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.with_handler(Role::Writer, handler)
    }

    pub fn with_critic(
        self,
        handler: impl Fn(&GenerationRequest, usize) -> Result<String, GenerationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.with_handler(Role::Critic, handler)
    }

    /// Critic replies per review round; `rounds[k][i]` answers the k-th review
    /// of section `i`. Rounds past the end repeat the last one.
    pub fn with_critic_rounds(self, rounds: Vec<Vec<&'static str>>) -> Self {
        self.with_critic(move |req, attempt| {
            let round = rounds
                .get(attempt)
                .or_else(|| rounds.last())
                .ok_or_else(|| GenerationError::Backend("no critic rounds scripted".into()))?;
            let index = req.item.unwrap_or(0);
            round
                .get(index)
                .map(|s| (*s).to_string())
                .ok_or_else(|| GenerationError::Backend(format!("no verdict for section {index}")))
        })
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self, role: Role) -> usize {
        self.requests.lock().iter().filter(|r| r.role == role).count()
    }

    /// Writer requests made in rewrite mode
    pub fn rewrite_requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.role == Role::Writer && r.instructions == REWRITE_INSTRUCTIONS)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let attempt = {
            let mut log = self.requests.lock();
            let attempt = log
                .iter()
                .filter(|r| r.role == request.role && r.item == request.item)
                .count();
            log.push(request.clone());
            attempt
        };
        let handler = self
            .handlers
            .get(&request.role)
            .ok_or(GenerationError::NotConfigured)?;
        handler(request, attempt)
    }
}

/// Section text the default writer produces
pub fn default_section(req: &GenerationRequest) -> String {
    let index = req.item.unwrap_or(0);
    format!("## Section {index}\n\nDraft body for section {index} [1].")
}

/// Section text the default writer produces on its `attempt`-th rewrite
pub fn revised_section(req: &GenerationRequest, attempt: usize) -> String {
    let index = req.item.unwrap_or(0);
    format!("## Section {index}\n\nRevision {attempt} of section {index} [1].")
}

/// Retriever returning a fixed document, failing, and counting calls
pub struct StubRetriever {
    source: DocumentSource,
    reply: Result<String, RetrievalError>,
    calls: AtomicUsize,
}

impl StubRetriever {
    pub fn ok(source: DocumentSource, text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            source,
            reply: Ok(text.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(source: DocumentSource) -> Arc<Self> {
        Arc::new(Self {
            source,
            reply: Err(RetrievalError::Unavailable(format!("{source} is down"))),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Share a stub as a retriever trait object
pub fn as_retriever(stub: &Arc<StubRetriever>) -> Arc<dyn Retriever> {
    stub.clone()
}

#[async_trait]
impl Retriever for StubRetriever {
    fn source(&self) -> DocumentSource {
        self.source
    }

    async fn search(&self, _topic: &str) -> Result<String, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

/// Store that always fails
#[derive(Debug, Default)]
pub struct FailingStore {
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for FailingStore {
    async fn save(&self, _run_id: &RunId, _state: &ResearchState) -> Result<(), PersistError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PersistError::Backend("disk full".into()))
    }

    async fn load(&self, _run_id: &RunId) -> Result<Option<ResearchState>, PersistError> {
        Err(PersistError::Backend("disk full".into()))
    }
}

/// "Quantum Computing": two topics, three sources
pub fn quantum_kb() -> KnowledgeBase {
    KnowledgeBase {
        title: "Quantum Computing".into(),
        sources: vec![
            Source::new(1, "Quantum computing")
                .with_origin("https://en.wikipedia.org/wiki/Quantum_computing"),
            Source::new(2, "Polynomial-Time Algorithms for Prime Factorization")
                .with_origin("arXiv:quant-ph/9508027"),
            Source::new(3, "A fast quantum mechanical algorithm for database search")
                .with_origin("arXiv:quant-ph/9605043"),
        ],
        topics: vec![
            Topic::new("t1", "Qubits and Superposition")
                .with_point("A qubit can exist in a superposition of 0 and 1")
                .with_point("Measurement collapses the state")
                .with_references([1])
                .with_subtopic(
                    Subtopic::new("t1.1", "Decoherence")
                        .with_point("Interaction with the environment destroys coherence")
                        .with_references([1]),
                ),
            Topic::new("t2", "Quantum Algorithms")
                .with_point("Shor's algorithm factors integers in polynomial time")
                .with_point("Grover's algorithm gives a quadratic search speedup")
                .with_references([2, 3]),
        ],
        abstract_text: "This report surveys qubits and the algorithms they enable.".into(),
        conclusion: "Fault-tolerant hardware remains the main obstacle.".into(),
    }
}

pub fn quantum_kb_json() -> String {
    serde_json::to_string_pretty(&quantum_kb()).unwrap_or_default()
}

/// Wiki and arxiv stubs that both succeed
pub fn default_retrievers() -> Vec<Arc<dyn Retriever>> {
    vec![
        as_retriever(&StubRetriever::ok(
            DocumentSource::Wiki,
            "Quantum computing uses qubits.",
        )),
        as_retriever(&StubRetriever::ok(
            DocumentSource::Arxiv,
            "We present a factoring algorithm.",
        )),
    ]
}

/// Engine over a memory store with the given generator, retrievers and config
pub fn engine_with(
    generator: &ScriptedGenerator,
    retrievers: Vec<Arc<dyn Retriever>>,
    config: PipelineConfig,
) -> (WorkflowEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let mut builder = WorkflowEngine::builder()
        .with_generator(Arc::new(generator.clone()))
        .with_store(store.clone())
        .with_config(config);
    for retriever in retrievers {
        builder = builder.with_retriever(retriever);
    }
    let engine = builder.build().expect("valid test engine");
    (engine, store)
}

/// Engine with default retrievers and config
pub fn engine(generator: &ScriptedGenerator) -> (WorkflowEngine, Arc<MemoryStore>) {
    engine_with(generator, default_retrievers(), PipelineConfig::default())
}
