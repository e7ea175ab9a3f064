//! End-to-end pipeline scenarios driven through the public API, with real
//! filesystem collaborators over a temp directory and mocked network
//! edges.

use lodestar_core::config::{IndexConfig, RagConfig, ResearchConfig};
use lodestar_core::index::HomeDirIndex;
use lodestar_core::ocr::StubOcrProcessor;
use lodestar_core::pipeline::{PipelineCoordinator, PipelineStatus, Stage};
use lodestar_core::rag::ChunkingContextBuilder;
use lodestar_core::research::probe::MockProbe;
use lodestar_core::research::transport::MockResearchTransport;
use lodestar_core::research::ResearchEngine;
use lodestar_core::store::SavedResultStore;
use lodestar_core::synthesis::MockSynthesizer;
use lodestar_core::PLACEHOLDER_MARKER;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn engine(transport: MockResearchTransport) -> Arc<ResearchEngine> {
    let mut config = ResearchConfig::default();
    config.retry.backoff_ms = 0;
    Arc::new(ResearchEngine::new(
        Arc::new(transport),
        Arc::new(MockProbe::always_reachable()),
        config,
    ))
}

fn coordinator_over(
    home: &Path,
    transport: MockResearchTransport,
    synthesizer: Arc<MockSynthesizer>,
    credential: Option<String>,
) -> PipelineCoordinator {
    PipelineCoordinator::new(
        false,
        false,
        Arc::new(HomeDirIndex::with_root(
            home.to_path_buf(),
            &IndexConfig::default(),
        )),
        Arc::new(ChunkingContextBuilder::new(
            home.to_path_buf(),
            RagConfig::default(),
        )),
        Arc::new(StubOcrProcessor::new(Duration::from_millis(1))),
        synthesizer,
        engine(transport),
        credential,
    )
}

async fn finish(coordinator: &PipelineCoordinator, status: PipelineStatus) -> PipelineStatus {
    match status {
        PipelineStatus::AwaitingResearch => coordinator.await_research().await.unwrap(),
        other => other,
    }
}

#[tokio::test]
async fn full_pipeline_with_real_files_and_live_research() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(
        home.path().join("ownership_notes.md"),
        "Ownership in Rust prevents use-after-free at compile time.",
    )
    .unwrap();

    let transport = MockResearchTransport::new();
    transport.queue(Ok(MockResearchTransport::completion(
        "Rust ownership is checked statically.\n\nReferences:\n\
         1. The Rust Book - ownership chapter - https://doc.rust-lang.org/book/ch04\n",
    )));
    let synthesizer = Arc::new(MockSynthesizer::new());
    synthesizer.queue(Ok(MockSynthesizer::answer(
        "Combined answer citing the book and local notes.",
    )));

    let coordinator = coordinator_over(
        home.path(),
        transport,
        synthesizer.clone(),
        Some("pplx-test".into()),
    );

    let status = coordinator.start("ownership").await.unwrap();
    let PipelineStatus::AwaitingFileSelection { candidates } = status else {
        panic!("expected selection gate, got {status:?}");
    };
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].name, "ownership_notes.md");

    let status = coordinator
        .resume_with_selection(vec![candidates[0].path.clone()])
        .await
        .unwrap();
    let status = finish(&coordinator, status).await;
    let PipelineStatus::Complete { answer } = status else {
        panic!("expected completion, got {status:?}");
    };
    assert_eq!(answer, "Combined answer citing the book and local notes.");

    let session = coordinator.session().await.unwrap();
    assert_eq!(session.stage, Stage::Complete);
    let research = session.web_research.as_ref().unwrap();
    assert!(!research.simulated());
    assert_eq!(research.references.len(), 1);
    assert_eq!(
        research.references[0].url,
        "https://doc.rust-lang.org/book/ch04"
    );
    assert!(session.local_context.contains("use-after-free"));

    // The synthesizer saw both context branches.
    let calls = synthesizer.calls();
    assert!(calls[0].1.contains("use-after-free"));
    assert!(calls[0].2.contains("checked statically"));
}

#[tokio::test]
async fn degraded_end_to_end_persists_a_saved_result() {
    let home = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();

    // No credential: research degrades to the deterministic placeholder;
    // no files on disk: the selection gate is skipped entirely.
    let coordinator = coordinator_over(
        home.path(),
        MockResearchTransport::new(),
        Arc::new(MockSynthesizer::new()),
        None,
    );

    let status = coordinator.start("quantum computing").await.unwrap();
    let status = finish(&coordinator, status).await;
    let PipelineStatus::Complete { answer } = status else {
        panic!("expected completion, got {status:?}");
    };
    assert!(answer.contains(PLACEHOLDER_MARKER));

    let saved = coordinator.saved_result().await.unwrap();
    let store = SavedResultStore::new(data.path());
    let id = store.save(&saved).unwrap();

    let listed = store.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].query, "quantum computing");
    assert!(!listed[0].sources.is_empty());
}

#[tokio::test]
async fn selection_gate_survives_research_resolving_first() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("topic_notes.txt"), "notes").unwrap();

    let transport = MockResearchTransport::new();
    transport.queue(Ok(MockResearchTransport::completion("fast answer")));
    let coordinator = coordinator_over(
        home.path(),
        transport,
        Arc::new(MockSynthesizer::new()),
        Some("pplx-test".into()),
    );

    let status = coordinator.start("topic").await.unwrap();
    let PipelineStatus::AwaitingFileSelection { candidates } = status else {
        panic!("expected selection gate");
    };

    // Give the research branch time to finish while the session is still
    // suspended at the gate; the out-of-order completion must not advance
    // the session on its own.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let session = coordinator.session().await.unwrap();
    assert_eq!(session.stage, Stage::AwaitingFileSelection);
    assert!(session.web_research.is_none());

    // Resuming consumes the already-resolved branch without suspending.
    let status = coordinator
        .resume_with_selection(vec![candidates[0].path.clone()])
        .await
        .unwrap();
    let status = finish(&coordinator, status).await;
    assert!(matches!(status, PipelineStatus::Complete { .. }));

    let session = coordinator.session().await.unwrap();
    assert_eq!(session.web_research.as_ref().unwrap().answer, "fast answer");
}

#[tokio::test]
async fn intentionally_empty_selection_is_valid() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("topic_draft.md"), "draft").unwrap();

    let coordinator = coordinator_over(
        home.path(),
        MockResearchTransport::new(),
        Arc::new(MockSynthesizer::new()),
        None,
    );

    let status = coordinator.start("topic").await.unwrap();
    assert!(matches!(
        status,
        PipelineStatus::AwaitingFileSelection { .. }
    ));

    let status = coordinator.resume_with_selection(Vec::new()).await.unwrap();
    let status = finish(&coordinator, status).await;
    assert!(matches!(status, PipelineStatus::Complete { .. }));

    let session = coordinator.session().await.unwrap();
    assert_eq!(session.local_context, "");
    assert!(session.file_snapshots.is_empty());
}
