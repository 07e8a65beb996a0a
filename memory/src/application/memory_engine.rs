// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Memory engine facade
//!
//! Wires the repositories, dedup gate, relevance engine, summarizer and
//! pattern engine together behind one entry point. Hosts construct it either
//! against a Neo4j store or fully in memory.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::application::{
    AgentContext, DedupConfig, DedupEngine, DedupOutcome, EventBus, MemoryQuery, PatternConfig,
    PatternEngine, PatternProvider, PatternRecommendation, QueryResult, RelevanceConfig,
    RelevanceEngine, SummarizationOutcome, Summarizer, SummarizerConfig,
};
use crate::application::patterns::{AdoptionStats, DetectionOutcome};
use crate::domain::{
    Episode, EpisodeId, EpisodeInput, PatternId, Result, WorkspacePattern,
};
use crate::infrastructure::{
    BroadcastEventBus, EpisodeRepository, GraphConfig, GraphEpisodeRepository, GraphHealth,
    GraphPatternRepository, GraphStats, GraphStore, GraphSummaryRepository,
    InMemoryEpisodeRepository, InMemoryPatternRepository, InMemorySummaryRepository,
    PatternFilter, PatternRepository, SummaryRepository,
};

/// Aggregate configuration for the whole engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    pub graph: GraphConfig,
    pub dedup: DedupConfig,
    pub relevance: RelevanceConfig,
    pub summarizer: SummarizerConfig,
    pub patterns: PatternConfig,
}

/// What happened to an ingested episode.
#[derive(Debug, Clone, PartialEq)]
pub enum AddEpisodeOutcome {
    /// Stored as a new episode.
    Added(EpisodeId),
    /// Stored, but flagged as a likely near-duplicate.
    AddedFlagged {
        id: EpisodeId,
        duplicate_of: EpisodeId,
        score: f64,
    },
    /// Rejected; `existing_id` already covers this content.
    Duplicate { existing_id: EpisodeId, score: f64 },
}

impl AddEpisodeOutcome {
    /// Episode id visible to the caller after ingestion: the new id when
    /// stored, the existing one when rejected.
    pub fn episode_id(&self) -> EpisodeId {
        match self {
            AddEpisodeOutcome::Added(id) => *id,
            AddEpisodeOutcome::AddedFlagged { id, .. } => *id,
            AddEpisodeOutcome::Duplicate { existing_id, .. } => *existing_id,
        }
    }
}

/// Pattern source for context assembly, backed by the pattern repository.
struct RepositoryPatternProvider {
    patterns: Arc<dyn PatternRepository>,
}

#[async_trait]
impl PatternProvider for RepositoryPatternProvider {
    async fn active_patterns(&self, workspace_id: &str) -> Result<Vec<WorkspacePattern>> {
        self.patterns
            .list_patterns(workspace_id, &PatternFilter::default())
            .await
    }
}

/// Facade over the memory subsystem.
pub struct MemoryEngine {
    store: Option<Arc<GraphStore>>,
    episodes: Arc<dyn EpisodeRepository>,
    dedup: DedupEngine,
    relevance: RelevanceEngine,
    summarizer: Arc<Summarizer>,
    patterns: Arc<PatternEngine>,
}

impl MemoryEngine {
    /// Connect to the graph store and wire graph-backed repositories. A
    /// failed connection still yields a working engine whose read paths
    /// degrade and whose health reports unavailable.
    pub async fn connect(config: MemoryConfig, event_bus: Arc<dyn EventBus>) -> Self {
        let store = Arc::new(GraphStore::new(config.graph.clone()));
        if store.connect().await {
            store.bootstrap_schema().await;
        }
        let episodes: Arc<dyn EpisodeRepository> =
            Arc::new(GraphEpisodeRepository::new(store.clone()));
        let summaries: Arc<dyn SummaryRepository> =
            Arc::new(GraphSummaryRepository::new(store.clone()));
        let patterns: Arc<dyn PatternRepository> =
            Arc::new(GraphPatternRepository::new(store.clone()));
        Self::assemble(Some(store), episodes, summaries, patterns, event_bus, config)
    }

    /// Connect with a default broadcast event bus.
    pub async fn connect_with_defaults(config: MemoryConfig) -> Self {
        Self::connect(config, Arc::new(BroadcastEventBus::with_default_capacity())).await
    }

    /// Fully in-memory engine, for tests and storeless hosts.
    pub fn in_memory(config: MemoryConfig, event_bus: Arc<dyn EventBus>) -> Self {
        let episodes: Arc<dyn EpisodeRepository> = Arc::new(InMemoryEpisodeRepository::new());
        let summaries: Arc<dyn SummaryRepository> = Arc::new(InMemorySummaryRepository::new());
        let patterns: Arc<dyn PatternRepository> = Arc::new(InMemoryPatternRepository::new());
        Self::assemble(None, episodes, summaries, patterns, event_bus, config)
    }

    /// Engine over caller-supplied repositories.
    pub fn from_parts(
        episodes: Arc<dyn EpisodeRepository>,
        summaries: Arc<dyn SummaryRepository>,
        patterns: Arc<dyn PatternRepository>,
        event_bus: Arc<dyn EventBus>,
        config: MemoryConfig,
    ) -> Self {
        Self::assemble(None, episodes, summaries, patterns, event_bus, config)
    }

    fn assemble(
        store: Option<Arc<GraphStore>>,
        episodes: Arc<dyn EpisodeRepository>,
        summaries: Arc<dyn SummaryRepository>,
        patterns: Arc<dyn PatternRepository>,
        event_bus: Arc<dyn EventBus>,
        config: MemoryConfig,
    ) -> Self {
        let provider = Arc::new(RepositoryPatternProvider {
            patterns: patterns.clone(),
        });
        Self {
            store,
            dedup: DedupEngine::new(episodes.clone(), config.dedup),
            relevance: RelevanceEngine::new(episodes.clone(), provider, config.relevance),
            summarizer: Arc::new(Summarizer::new(
                episodes.clone(),
                summaries,
                event_bus.clone(),
                config.summarizer,
            )),
            patterns: Arc::new(PatternEngine::new(
                episodes.clone(),
                patterns,
                event_bus,
                config.patterns,
            )),
            episodes,
        }
    }

    /// The summarizer, for wiring into a background sweeper.
    pub fn summarizer(&self) -> Arc<Summarizer> {
        self.summarizer.clone()
    }

    /// The pattern engine, for wiring into a background sweeper.
    pub fn pattern_engine(&self) -> Arc<PatternEngine> {
        self.patterns.clone()
    }

    /// Ingest one episode through the dedup gate.
    pub async fn add_episode(&self, input: EpisodeInput) -> Result<AddEpisodeOutcome> {
        input.validate()?;
        match self.dedup.check_duplicate(&input).await {
            DedupOutcome::Duplicate { existing_id, score } => {
                debug!(existing = %existing_id, score, "episode rejected as duplicate");
                Ok(AddEpisodeOutcome::Duplicate { existing_id, score })
            }
            DedupOutcome::Flagged {
                duplicate_of,
                score,
            } => {
                let mut episode = Episode::from_input(input);
                episode.metadata.duplicate_of = Some(duplicate_of);
                episode.metadata.duplicate_score = Some(score);
                self.episodes.add_episode(&episode).await?;
                Ok(AddEpisodeOutcome::AddedFlagged {
                    id: episode.id,
                    duplicate_of,
                    score,
                })
            }
            DedupOutcome::Unique => {
                let episode = Episode::from_input(input);
                self.episodes.add_episode(&episode).await?;
                Ok(AddEpisodeOutcome::Added(episode.id))
            }
        }
    }

    pub async fn get_episode(&self, id: &EpisodeId) -> Result<Option<Episode>> {
        self.episodes.get_episode(id).await
    }

    pub async fn query(&self, query: &MemoryQuery) -> Result<QueryResult> {
        self.relevance.query(query).await
    }

    pub async fn query_for_agent_context(
        &self,
        project_id: &str,
        workspace_id: &str,
        task_description: &str,
        agent_type: &str,
        token_budget: Option<usize>,
    ) -> Result<AgentContext> {
        self.relevance
            .query_for_agent_context(
                project_id,
                workspace_id,
                task_description,
                agent_type,
                token_budget,
            )
            .await
    }

    /// Best-effort feedback recording; never errors.
    pub async fn record_relevance_feedback(&self, id: &EpisodeId, was_useful: bool) -> bool {
        self.relevance.record_feedback(id, was_useful).await
    }

    pub async fn check_and_summarize(
        &self,
        project_id: &str,
        workspace_id: &str,
    ) -> Result<SummarizationOutcome> {
        self.summarizer
            .check_and_summarize(project_id, workspace_id)
            .await
    }

    pub async fn summarize_project(
        &self,
        project_id: &str,
        workspace_id: &str,
    ) -> Result<SummarizationOutcome> {
        self.summarizer
            .summarize_project(project_id, workspace_id)
            .await
    }

    pub async fn detect_patterns(&self, workspace_id: &str) -> Result<DetectionOutcome> {
        self.patterns.detect_patterns(workspace_id).await
    }

    pub async fn get_workspace_patterns(
        &self,
        workspace_id: &str,
        filter: &PatternFilter,
    ) -> Result<Vec<WorkspacePattern>> {
        self.patterns.get_workspace_patterns(workspace_id, filter).await
    }

    pub async fn get_pattern_recommendations(
        &self,
        workspace_id: &str,
        project_id: &str,
        task_description: &str,
    ) -> Result<Vec<PatternRecommendation>> {
        self.patterns
            .get_pattern_recommendations(workspace_id, project_id, task_description)
            .await
    }

    pub async fn override_pattern(
        &self,
        id: &PatternId,
        overridden_by: &str,
        reason: &str,
    ) -> Result<WorkspacePattern> {
        self.patterns.override_pattern(id, overridden_by, reason).await
    }

    pub async fn restore_pattern(&self, id: &PatternId) -> Result<WorkspacePattern> {
        self.patterns.restore_pattern(id).await
    }

    pub async fn get_pattern_adoption_stats(&self, workspace_id: &str) -> Result<AdoptionStats> {
        self.patterns.get_adoption_stats(workspace_id).await
    }

    /// Backing-store health. The in-memory engine is always available.
    pub async fn get_health(&self) -> GraphHealth {
        match &self.store {
            Some(store) => store.health().await,
            None => GraphHealth {
                status: "ok",
                connected: true,
            },
        }
    }

    /// Per-label node counts. Only meaningful for graph-backed engines; the
    /// in-memory engine reports availability with zero counts.
    pub async fn get_graph_stats(&self) -> GraphStats {
        match &self.store {
            Some(store) => store.graph_stats().await,
            None => GraphStats {
                available: true,
                ..GraphStats::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EpisodeType;
    use crate::infrastructure::NoopEventBus;

    fn engine() -> MemoryEngine {
        MemoryEngine::in_memory(MemoryConfig::default(), Arc::new(NoopEventBus))
    }

    fn input(content: &str) -> EpisodeInput {
        EpisodeInput {
            project_id: "p1".into(),
            workspace_id: "w1".into(),
            story_id: None,
            agent_type: "dev".into(),
            episode_type: EpisodeType::Fact,
            content: content.into(),
            entities: vec![],
            confidence: 0.8,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_add_episode_gates_duplicates() {
        let engine = engine();
        let first = engine
            .add_episode(input("we chose postgres for persistence"))
            .await
            .unwrap();
        let first_id = match first {
            AddEpisodeOutcome::Added(id) => id,
            other => panic!("expected added, got {other:?}"),
        };

        let second = engine
            .add_episode(input("we chose postgres for persistence"))
            .await
            .unwrap();
        match second {
            AddEpisodeOutcome::Duplicate { existing_id, .. } => {
                assert_eq!(existing_id, first_id)
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(second.episode_id(), first_id);
    }

    #[tokio::test]
    async fn test_flagged_episode_carries_markers() {
        let engine = engine();
        engine
            .add_episode(input(
                "service alpha uses postgres fourteen with pgbouncer pooling enabled production",
            ))
            .await
            .unwrap();
        let outcome = engine
            .add_episode(input(
                "service alpha uses postgres fourteen with pgbouncer pooling enabled staging",
            ))
            .await
            .unwrap();
        let id = match outcome {
            AddEpisodeOutcome::AddedFlagged { id, .. } => id,
            other => panic!("expected flagged, got {other:?}"),
        };
        let stored = engine.get_episode(&id).await.unwrap().unwrap();
        assert!(stored.metadata.duplicate_of.is_some());
        assert!(stored.metadata.duplicate_score.is_some());
    }

    #[tokio::test]
    async fn test_rejected_input_fails_validation() {
        let engine = engine();
        let mut bad = input("x");
        bad.project_id = String::new();
        assert!(engine.add_episode(bad).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_health() {
        let engine = engine();
        let health = engine.get_health().await;
        assert_eq!(health.status, "ok");
        let stats = engine.get_graph_stats().await;
        assert!(stats.available);
    }
}
