// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end flows through the engine facade over in-memory repositories.

use std::sync::Arc;

use mnemograph_memory::{
    AddEpisodeOutcome, BroadcastEventBus, Episode, EpisodeInput, EpisodeRepository, EpisodeType,
    InMemoryEpisodeRepository, InMemoryPatternRepository, InMemorySummaryRepository, MemoryConfig,
    MemoryEngine, MemoryEvent, MemoryQuery, NoopEventBus, PatternConfidence, PatternFilter,
    SummarizerConfig,
};

fn input(project: &str, episode_type: EpisodeType, content: &str) -> EpisodeInput {
    EpisodeInput {
        project_id: project.into(),
        workspace_id: "ws-main".into(),
        story_id: None,
        agent_type: "dev".into(),
        episode_type,
        content: content.into(),
        entities: vec![],
        confidence: 0.8,
        metadata: None,
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn engine() -> MemoryEngine {
    init_tracing();
    MemoryEngine::in_memory(MemoryConfig::default(), Arc::new(NoopEventBus))
}

#[tokio::test]
async fn ingest_then_query_ranks_relevant_episodes() {
    let engine = engine();
    engine
        .add_episode(input(
            "p1",
            EpisodeType::Decision,
            "adopt postgres with pgbouncer for all persistence",
        ))
        .await
        .unwrap();
    engine
        .add_episode(input(
            "p1",
            EpisodeType::Fact,
            "frontend uses vite for bundling",
        ))
        .await
        .unwrap();

    let result = engine
        .query(&MemoryQuery::new("p1", "ws-main", "postgres pgbouncer setup"))
        .await
        .unwrap();
    assert_eq!(result.total_count, 2);
    assert!(result.episodes[0].episode.content.contains("postgres"));
}

#[tokio::test]
async fn duplicate_ingestion_returns_existing_episode() {
    let engine = engine();
    let first = engine
        .add_episode(input("p1", EpisodeType::Fact, "ci runs clippy before merge"))
        .await
        .unwrap();
    let second = engine
        .add_episode(input("p1", EpisodeType::Fact, "ci runs clippy before merge"))
        .await
        .unwrap();
    assert!(matches!(second, AddEpisodeOutcome::Duplicate { .. }));
    assert_eq!(second.episode_id(), first.episode_id());
}

#[tokio::test]
async fn two_projects_sharing_an_observation_yield_one_low_confidence_pattern() {
    let engine = engine();
    let observation = "flaky integration tests stabilized by pinning container image digests";
    engine
        .add_episode(input("p1", EpisodeType::Pattern, observation))
        .await
        .unwrap();
    engine
        .add_episode(input("p2", EpisodeType::Pattern, observation))
        .await
        .unwrap();

    let outcome = engine.detect_patterns("ws-main").await.unwrap();
    assert_eq!(outcome.projects_scanned, 2);
    assert_eq!(outcome.new_patterns, 1);
    assert!(!outcome.truncated);

    let patterns = engine
        .get_workspace_patterns("ws-main", &PatternFilter::default())
        .await
        .unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].occurrence_count, 2);
    assert_eq!(patterns[0].confidence, PatternConfidence::Low);
}

#[tokio::test]
async fn single_project_workspace_detects_nothing() {
    let engine = engine();
    engine
        .add_episode(input("p1", EpisodeType::Pattern, "anything at all"))
        .await
        .unwrap();

    let outcome = engine.detect_patterns("ws-main").await.unwrap();
    assert_eq!(outcome.projects_scanned, 1);
    assert_eq!(outcome.comparisons, 0);
    assert_eq!(outcome.new_patterns, 0);
}

#[tokio::test]
async fn agent_context_respects_token_budget() {
    let engine = engine();
    for i in 0..20 {
        engine
            .add_episode(input(
                "p1",
                EpisodeType::Fact,
                &format!("observation {i}: subsystem {i} exposes a dedicated health endpoint"),
            ))
            .await
            .unwrap();
    }

    let generous = engine
        .query_for_agent_context("p1", "ws-main", "health endpoints", "dev", Some(4000))
        .await
        .unwrap();
    assert!(generous.episodes_included > 0);
    assert!(generous.estimated_tokens <= 4000);

    let tight = engine
        .query_for_agent_context("p1", "ws-main", "health endpoints", "dev", Some(30))
        .await
        .unwrap();
    assert!(tight.estimated_tokens <= 30);
    assert!(tight.episodes_included < generous.episodes_included);
}

#[tokio::test]
async fn feedback_loop_promotes_useful_episodes() {
    let engine = engine();
    let liked = engine
        .add_episode(input("p1", EpisodeType::Fact, "retry with exponential backoff"))
        .await
        .unwrap();
    engine
        .add_episode(input(
            "p1",
            EpisodeType::Fact,
            "retry with exponential backoff on writes",
        ))
        .await
        .unwrap();

    assert!(
        engine
            .record_relevance_feedback(&liked.episode_id(), true)
            .await
    );

    let result = engine
        .query(&MemoryQuery::new("p1", "ws-main", "retry exponential backoff"))
        .await
        .unwrap();
    assert_eq!(result.episodes[0].episode.id, liked.episode_id());
}

#[tokio::test]
async fn consolidation_archives_but_never_deletes() {
    init_tracing();
    let bus = Arc::new(BroadcastEventBus::new(16));
    let mut receiver = bus.subscribe();
    let config = MemoryConfig {
        summarizer: SummarizerConfig {
            episode_threshold: 1,
            ..SummarizerConfig::default()
        },
        ..MemoryConfig::default()
    };

    // Seed the store directly with a backdated episode so it is old enough
    // to consolidate.
    let episodes = Arc::new(InMemoryEpisodeRepository::new());
    let mut old = Episode::from_input(input("p1", EpisodeType::Fact, "legacy job runs nightly"));
    old.timestamp = chrono::Utc::now() - chrono::Duration::days(90);
    episodes.add_episode(&old).await.unwrap();
    let id = old.id;

    let engine = MemoryEngine::from_parts(
        episodes,
        Arc::new(InMemorySummaryRepository::new()),
        Arc::new(InMemoryPatternRepository::new()),
        bus,
        config,
    );

    let first = engine.check_and_summarize("p1", "ws-main").await.unwrap();
    assert!(!first.skipped);
    assert_eq!(first.summaries_created, 1);
    assert_eq!(first.episodes_archived, 1);

    // Archived, still present.
    let archived = engine.get_episode(&id).await.unwrap().unwrap();
    assert!(archived.metadata.archived);
    assert!(archived.metadata.summary_id.is_some());

    // Second run converges instead of duplicating.
    let second = engine.summarize_project("p1", "ws-main").await.unwrap();
    assert_eq!(second.summaries_created, 0);
    assert_eq!(second.episodes_archived, 0);

    // Every run emitted a completion event.
    let mut completions = 0;
    while let Ok(event) = receiver.try_recv() {
        if let MemoryEvent::SummarizationCompleted { .. } = event {
            completions += 1;
        }
    }
    assert_eq!(completions, 2);
}
