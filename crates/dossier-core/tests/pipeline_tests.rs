use dossier_core::prelude::*;
use dossier_core::{Phase, RunId, SourceSelection, StageError, StageKind};
use dossier_test_utils::{
    as_retriever, default_retrievers, engine, engine_with, quantum_kb, FailingStore,
    ScriptedGenerator, StubRetriever,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn quantum_computing_end_to_end() {
    let generator = ScriptedGenerator::new();
    let (engine, store) = engine(&generator);

    let outcome = engine.run("Quantum Computing").await;

    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert!(outcome.is_complete());
    assert_eq!(
        outcome.trace,
        vec![
            Phase::Routing,
            Phase::Extracting,
            Phase::Writing,
            Phase::Critiquing,
            Phase::Assembling,
            Phase::Done,
        ]
    );

    let state = &outcome.state;
    assert_eq!(state.source_selection, Some(SourceSelection::Both));
    assert_eq!(state.knowledge_base, Some(quantum_kb()));
    assert!(state.is_criticized);
    assert!(!state.needs_rewrite);
    assert_eq!(state.rewrite_cycles, 0);

    let report = outcome.report().unwrap();
    assert!(report.body.contains("## Section 0"));
    assert!(report.body.contains("## Section 1"));
    assert!(report.body.contains("# Quantum Computing"));
    assert!(report.unresolved_sections.is_empty());

    assert_eq!(generator.calls(Role::Writer), 2);
    assert_eq!(generator.calls(Role::Critic), 2);
    assert!(generator.rewrite_requests().is_empty());

    assert_eq!(store.save_count(), 1);
    let saved = store.get(&outcome.run_id).unwrap();
    assert!(saved.is_complete());
}

#[tokio::test]
async fn sections_topics_and_verdicts_stay_aligned() {
    let generator = ScriptedGenerator::new();
    let (engine, _) = engine(&generator);

    let outcome = engine.run("Quantum Computing").await;
    let state = outcome.state;

    let topics = state.knowledge_base.unwrap().topics.len();
    assert_eq!(state.report_sections.unwrap().len(), topics);
    let criticism = state.criticism.unwrap();
    assert_eq!(criticism.len(), topics);
    assert_eq!(criticism.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
}

#[tokio::test]
async fn failing_source_degrades_gracefully() {
    let generator = ScriptedGenerator::new();
    let wiki = StubRetriever::ok(DocumentSource::Wiki, "Qubits are two-level systems.");
    let arxiv = StubRetriever::failing(DocumentSource::Arxiv);
    let (engine, _) = engine_with(
        &generator,
        vec![as_retriever(&wiki), as_retriever(&arxiv)],
        PipelineConfig::default(),
    );

    let outcome = engine.run("Quantum Computing").await;

    assert!(outcome.is_complete());
    assert!(outcome.trace.contains(&Phase::Extracting));
    let docs = &outcome.state.raw_documents;
    assert_eq!(docs.text(DocumentSource::Arxiv), "");
    assert_eq!(docs.text(DocumentSource::Wiki), "Qubits are two-level systems.");
    assert_eq!(arxiv.calls(), 1);

    let extractor = generator
        .requests()
        .into_iter()
        .find(|r| r.role == Role::Extractor)
        .unwrap();
    assert!(extractor.input.contains("Qubits are two-level systems."));
    assert!(!extractor.input.contains("ARXIV"));
}

#[tokio::test]
async fn no_documents_fails_extraction() {
    let generator = ScriptedGenerator::new();
    let (engine, store) = engine_with(
        &generator,
        vec![
            as_retriever(&StubRetriever::failing(DocumentSource::Wiki)),
            as_retriever(&StubRetriever::failing(DocumentSource::Arxiv)),
        ],
        PipelineConfig::default(),
    );

    let outcome = engine.run("Quantum Computing").await;

    let err = outcome.error.unwrap();
    assert!(err.is_input_contract());
    assert_eq!(err.failed_stage(), Some(StageKind::Extractor));
    assert_eq!(generator.calls(Role::Extractor), 0);
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn news_is_queried_only_when_enabled() {
    let generator = ScriptedGenerator::new();
    let news = StubRetriever::ok(DocumentSource::News, "Record qubit count announced.");
    let mut retrievers = default_retrievers();
    retrievers.push(as_retriever(&news));

    let (engine, _) = engine_with(&generator, retrievers.clone(), PipelineConfig::default());
    let outcome = engine.run("Quantum Computing").await;
    assert_eq!(outcome.state.raw_documents.text(DocumentSource::News), "");
    assert_eq!(news.calls(), 0);

    let (engine, _) = engine_with(
        &generator,
        retrievers,
        PipelineConfig::default().with_news(true),
    );
    let outcome = engine.run("Quantum Computing").await;
    assert_eq!(
        outcome.state.raw_documents.text(DocumentSource::News),
        "Record qubit count announced."
    );
    assert_eq!(news.calls(), 1);
}

#[tokio::test]
async fn empty_topic_is_rejected_before_any_call() {
    let generator = ScriptedGenerator::new();
    let (engine, store) = engine(&generator);

    let outcome = engine.run("   ").await;

    let err = outcome.error.as_ref().unwrap();
    assert!(err.is_input_contract());
    assert_eq!(err.failed_stage(), Some(StageKind::Router));
    assert!(generator.requests().is_empty());
    assert_eq!(outcome.trace, vec![Phase::Routing, Phase::Failed]);
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn malformed_router_decision_fails_run() {
    let generator = ScriptedGenerator::new().with_router_reply("I would use Google Scholar.");
    let (engine, _) = engine(&generator);

    let outcome = engine.run("Quantum Computing").await;

    match outcome.error {
        Some(PipelineError::Stage {
            stage: StageKind::Router,
            source: StageError::MalformedDecision { response },
        }) => assert_eq!(response, "I would use Google Scholar."),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(outcome.state.source_selection.is_none());
}

#[tokio::test]
async fn schema_violation_persists_partial_state_with_payload() {
    let mut kb = quantum_kb();
    kb.topics[1].references.push(9);
    let payload = serde_json::to_string(&kb).unwrap();

    let generator = ScriptedGenerator::new().with_extractor_reply(payload.clone());
    let (engine, store) = engine(&generator);

    let outcome = engine.run("Quantum Computing").await;

    assert!(!outcome.is_complete());
    assert_eq!(
        outcome.trace,
        vec![Phase::Routing, Phase::Extracting, Phase::Failed]
    );
    let err = outcome.error.unwrap();
    match &err {
        PipelineError::Stage {
            stage: StageKind::Extractor,
            source,
        } => assert_eq!(source.payload(), Some(payload.as_str())),
        other => panic!("unexpected error: {other}"),
    }

    let saved = store.get(&RunId::for_topic("Quantum Computing")).unwrap();
    assert!(saved.source_selection.is_some());
    assert!(saved.knowledge_base.is_none());
    assert!(saved.final_report.is_none());
    assert_eq!(generator.calls(Role::Writer), 0);
}

#[tokio::test]
async fn critic_failure_aborts_run() {
    let generator = ScriptedGenerator::new().with_critic(|req, _| match req.item {
        Some(1) => Err(GenerationError::RateLimited),
        _ => Ok("PASS".into()),
    });
    let (engine, store) = engine(&generator);

    let outcome = engine.run("Quantum Computing").await;

    let err = outcome.error.unwrap();
    assert_eq!(err.failed_stage(), Some(StageKind::Critic));
    assert!(err.is_retryable());
    assert!(outcome.state.criticism.is_none());
    assert!(store
        .get(&outcome.run_id)
        .unwrap()
        .report_sections
        .is_some());
}

#[tokio::test]
async fn writer_failure_leaves_placeholder_section() {
    let generator = ScriptedGenerator::new().with_writer(|req, _| match req.item {
        Some(0) => Err(GenerationError::Timeout),
        _ => Ok("## Algorithms\n\nShor and Grover [2, 3].".into()),
    });
    let (engine, _) = engine(&generator);

    let outcome = engine.run("Quantum Computing").await;

    assert!(outcome.is_complete());
    let sections = outcome.state.report_sections.as_ref().unwrap();
    assert_eq!(sections[0], "");
    let body = &outcome.report().unwrap().body;
    assert!(body.contains("## Qubits and Superposition"));
    assert!(body.contains("Shor and Grover"));
}

#[tokio::test]
async fn persistence_failure_does_not_change_outcome() {
    let generator = ScriptedGenerator::new();
    let store = Arc::new(FailingStore::default());
    let mut builder = WorkflowEngine::builder()
        .with_generator(Arc::new(generator.clone()))
        .with_store(store.clone());
    for retriever in default_retrievers() {
        builder = builder.with_retriever(retriever);
    }
    let engine = assert_ok!(builder.build());

    let outcome = engine.run("Quantum Computing").await;

    assert!(outcome.is_complete());
    assert!(outcome.error.is_none());
    assert_eq!(store.attempts(), 1);
    assert_err!(engine.load_state("Quantum Computing").await);
}

#[tokio::test]
async fn file_store_receives_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let mut builder = WorkflowEngine::builder()
        .with_generator(Arc::new(ScriptedGenerator::new()))
        .with_store(store.clone());
    for retriever in default_retrievers() {
        builder = builder.with_retriever(retriever);
    }
    let engine = builder.build().unwrap();

    let outcome = engine.run("Quantum Computing").await;

    let path = store.path_for(&outcome.run_id);
    assert!(path.exists());
    assert!(path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("quantumcomputing-")));

    let snapshot = store.load_snapshot(&outcome.run_id).await.unwrap().unwrap();
    assert!(snapshot.complete);
    assert_eq!(snapshot.state, outcome.state);
}

struct SlowGenerator;

#[async_trait::async_trait]
impl TextGenerator for SlowGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("both".into())
    }
}

#[tokio::test]
async fn stage_timeout_fails_run() {
    let engine = WorkflowEngine::builder()
        .with_generator(Arc::new(SlowGenerator))
        .with_config(PipelineConfig::default().with_stage_timeout_secs(1))
        .build()
        .unwrap();

    let outcome = engine.run("Quantum Computing").await;

    assert!(matches!(
        outcome.error,
        Some(PipelineError::Timeout {
            stage: StageKind::Router,
            duration_secs: 1
        })
    ));
}

#[tokio::test]
async fn cancellation_between_stages_persists_partial_state() {
    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    let generator = ScriptedGenerator::new().with_handler(Role::Extractor, move |_, _| {
        trigger.cancel();
        Ok(dossier_test_utils::quantum_kb_json())
    });
    let (engine, store) = engine(&generator);

    let outcome = engine
        .run_with_cancellation("Quantum Computing", cancel)
        .await;

    assert!(matches!(
        outcome.error,
        Some(PipelineError::Cancelled {
            stage: StageKind::Writer
        })
    ));
    assert!(outcome.state.knowledge_base.is_some());
    assert_eq!(generator.calls(Role::Writer), 0);
    assert!(store
        .get(&outcome.run_id)
        .unwrap()
        .knowledge_base
        .is_some());
}

#[tokio::test]
async fn config_file_drives_the_run() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dossier.toml");
    std::fs::write(
        &path,
        "max_rewrite_cycles = 0\n\
         checkpoint_each_stage = true\n\
         \n\
         [roles.critic]\n\
         temperature = 0.0\n",
    )?;
    let config = PipelineConfig::load(&path)?;

    let generator = ScriptedGenerator::new().with_critic(|req, _| {
        Ok(match req.item {
            Some(0) => "Section 0 cites nothing.".into(),
            _ => "PASS".into(),
        })
    });
    let (engine, store) = engine_with(&generator, default_retrievers(), config);

    let outcome = engine.run("Quantum Computing").await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.report().map(|r| r.unresolved_sections.clone()), Some(vec![0]));
    assert!(generator.rewrite_requests().is_empty());
    assert!(generator
        .requests()
        .iter()
        .filter(|r| r.role == Role::Critic)
        .all(|r| r.temperature.abs() < f32::EPSILON));
    assert_eq!(store.save_count(), 6);
    Ok(())
}
