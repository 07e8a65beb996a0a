// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Relevance query engine
//!
//! Ranks episodes for a task with a weighted blend of keyword overlap,
//! recency decay, type priority and recorded feedback, and assembles a
//! token-budgeted context document for agents. Read paths degrade to empty
//! results when the graph store is unavailable.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::text::{estimate_tokens, jaccard, keyword_set};
use crate::domain::{
    best_effort, Episode, EpisodeFilter, EpisodeId, EpisodeType, MemoryError, PatternConfidence,
    Result, WorkspacePattern,
};
use crate::infrastructure::EpisodeRepository;

/// Scoring weights and budgets for the query engine.
#[derive(Debug, Clone)]
pub struct RelevanceConfig {
    pub keyword_weight: f64,
    pub recency_weight: f64,
    pub type_priority_weight: f64,
    pub feedback_weight: f64,
    /// Recency half-life in days.
    pub half_life_days: f64,
    /// Caps at or below this over-fetch candidates before scoring.
    pub small_result_cap: usize,
    /// Candidate multiplier applied to small result caps.
    pub overfetch_factor: usize,
    pub default_limit: usize,
    /// Default agent-context budget in estimated tokens.
    pub token_budget: usize,
    pub chars_per_token: usize,
    /// Sub-budget for the workspace patterns section.
    pub pattern_token_budget: usize,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 0.5,
            recency_weight: 0.2,
            type_priority_weight: 0.2,
            feedback_weight: 0.1,
            half_life_days: 30.0,
            small_result_cap: 10,
            overfetch_factor: 3,
            default_limit: 10,
            token_budget: 4000,
            chars_per_token: 4,
            pattern_token_budget: 2000,
        }
    }
}

/// A scoped relevance query.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    pub project_id: String,
    pub workspace_id: String,
    pub text: String,
    pub episode_types: Option<Vec<EpisodeType>>,
    pub entities: Option<Vec<String>>,
    pub since: Option<chrono::DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl MemoryQuery {
    pub fn new(
        project_id: impl Into<String>,
        workspace_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            workspace_id: workspace_id.into(),
            text: text.into(),
            episode_types: None,
            entities: None,
            since: None,
            limit: None,
        }
    }
}

/// One ranked episode.
#[derive(Debug, Clone)]
pub struct ScoredEpisode {
    pub episode: Episode,
    pub score: f64,
}

/// Ranked query result. `total_count` reports the full candidate pool size
/// before the cap was applied.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub episodes: Vec<ScoredEpisode>,
    pub total_count: usize,
}

/// Assembled context document for an agent.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub text: String,
    pub episodes_included: usize,
    pub patterns_included: usize,
    pub estimated_tokens: usize,
}

/// Source of workspace patterns for context assembly. The engine works
/// without one; wire the pattern engine in through this seam when present.
#[async_trait]
pub trait PatternProvider: Send + Sync {
    async fn active_patterns(&self, workspace_id: &str) -> Result<Vec<WorkspacePattern>>;
}

/// Provider used when no pattern engine is wired in.
#[derive(Default, Clone)]
pub struct NoopPatternProvider;

#[async_trait]
impl PatternProvider for NoopPatternProvider {
    async fn active_patterns(&self, _workspace_id: &str) -> Result<Vec<WorkspacePattern>> {
        Ok(Vec::new())
    }
}

/// Fixed section order for agent context assembly, highest priority first.
const SECTIONS: &[(EpisodeType, &str)] = &[
    (EpisodeType::Decision, "## Decisions"),
    (EpisodeType::Problem, "## Problems Solved"),
    (EpisodeType::Fact, "## Facts"),
    (EpisodeType::Pattern, "## Patterns"),
    (EpisodeType::Preference, "## Preferences"),
];

fn confidence_tag(confidence: PatternConfidence) -> &'static str {
    match confidence {
        PatternConfidence::High => "[AUTO-APPLY]",
        PatternConfidence::Medium => "[RECOMMENDED]",
        PatternConfidence::Low => "[SUGGESTION]",
    }
}

/// Episode types an agent role cares about. Unknown roles see everything.
fn types_for_agent(agent_type: &str) -> Option<Vec<EpisodeType>> {
    match agent_type {
        "dev" | "developer" => Some(vec![
            EpisodeType::Decision,
            EpisodeType::Problem,
            EpisodeType::Fact,
        ]),
        "qa" | "test" => Some(vec![
            EpisodeType::Pattern,
            EpisodeType::Problem,
            EpisodeType::Fact,
        ]),
        "architect" => Some(vec![
            EpisodeType::Decision,
            EpisodeType::Pattern,
            EpisodeType::Fact,
        ]),
        _ => None,
    }
}

/// Multi-factor episode ranking over an [`EpisodeRepository`].
pub struct RelevanceEngine {
    episodes: Arc<dyn EpisodeRepository>,
    patterns: Arc<dyn PatternProvider>,
    config: RelevanceConfig,
}

impl RelevanceEngine {
    pub fn new(
        episodes: Arc<dyn EpisodeRepository>,
        patterns: Arc<dyn PatternProvider>,
        config: RelevanceConfig,
    ) -> Self {
        Self {
            episodes,
            patterns,
            config,
        }
    }

    /// Exponential recency decay over episode age. Future timestamps score
    /// 1.0 so clock skew is never penalized.
    fn recency_score(&self, episode: &Episode) -> f64 {
        let age = Utc::now() - episode.timestamp;
        let age_days = age.num_milliseconds() as f64 / 86_400_000.0;
        if age_days <= 0.0 {
            return 1.0;
        }
        (-0.693 * age_days / self.config.half_life_days).exp()
    }

    fn feedback_score(episode: &Episode) -> f64 {
        let useful = episode.metadata.useful_count;
        let not_useful = episode.metadata.not_useful_count;
        if useful > not_useful {
            1.0
        } else if not_useful > useful {
            -0.5
        } else {
            0.0
        }
    }

    /// Blend of keyword, recency, type priority and feedback, clamped to
    /// [0, 1].
    fn score_episode(&self, query_keywords: &HashSet<String>, episode: &Episode) -> f64 {
        let content_keywords = keyword_set(&episode.content);
        let keyword = if query_keywords.is_empty() || content_keywords.is_empty() {
            0.0
        } else {
            jaccard(query_keywords, &content_keywords)
        };
        let score = self.config.keyword_weight * keyword
            + self.config.recency_weight * self.recency_score(episode)
            + self.config.type_priority_weight * episode.episode_type.retrieval_priority()
            + self.config.feedback_weight * Self::feedback_score(episode);
        score.clamp(0.0, 1.0)
    }

    /// Ranked, capped search. A small result cap over-fetches candidates so
    /// ranking has material to work with. Degrades to an empty result when
    /// the store is unavailable.
    pub async fn query(&self, q: &MemoryQuery) -> Result<QueryResult> {
        let cap = q.limit.unwrap_or(self.config.default_limit);
        let fetch_limit = if cap <= self.config.small_result_cap {
            cap * self.config.overfetch_factor
        } else {
            cap
        };

        let mut filter =
            EpisodeFilter::scoped(&q.project_id, &q.workspace_id).with_limit(fetch_limit);
        if let Some(types) = &q.episode_types {
            filter = filter.with_types(types.clone());
        }
        if let Some(entities) = &q.entities {
            filter = filter.with_entities(entities.clone());
        }
        if let Some(since) = q.since {
            filter = filter.with_since(since);
        }

        let candidates = match self.episodes.search_episodes(&filter).await {
            Ok(candidates) => candidates,
            Err(MemoryError::GraphUnavailable(reason)) => {
                warn!(reason, "relevance query degraded to empty result");
                return Ok(QueryResult::default());
            }
            Err(err) => return Err(err),
        };

        let query_keywords = keyword_set(&q.text);
        let total_count = candidates.len();
        let mut scored: Vec<ScoredEpisode> = candidates
            .into_iter()
            .map(|episode| {
                let score = self.score_episode(&query_keywords, &episode);
                ScoredEpisode { episode, score }
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(cap);

        debug!(
            total_count,
            returned = scored.len(),
            "relevance query completed"
        );
        Ok(QueryResult {
            episodes: scored,
            total_count,
        })
    }

    /// Assemble a natural-language context document for an agent, grouped by
    /// episode type in priority order and trimmed to a token budget.
    ///
    /// A section is dropped entirely when its header alone would overflow;
    /// within a section, lines stop once the next would overflow. A trailing
    /// workspace patterns section uses its own sub-budget.
    pub async fn query_for_agent_context(
        &self,
        project_id: &str,
        workspace_id: &str,
        task_description: &str,
        agent_type: &str,
        token_budget: Option<usize>,
    ) -> Result<AgentContext> {
        let budget = token_budget.unwrap_or(self.config.token_budget);
        let mut query = MemoryQuery::new(project_id, workspace_id, task_description);
        query.episode_types = types_for_agent(agent_type);
        let result = self.query(&query).await?;

        let mut text = String::new();
        let mut used = 0usize;
        let mut episodes_included = 0usize;

        for (episode_type, header) in SECTIONS {
            let lines: Vec<String> = result
                .episodes
                .iter()
                .filter(|s| s.episode.episode_type == *episode_type)
                .map(|s| format!("- {}", s.episode.content))
                .collect();
            if lines.is_empty() {
                continue;
            }
            let header_cost = estimate_tokens(header, self.config.chars_per_token);
            if used + header_cost > budget {
                continue;
            }
            let mut section = String::new();
            let mut section_used = header_cost;
            for line in lines {
                let line_cost = estimate_tokens(&line, self.config.chars_per_token);
                if used + section_used + line_cost > budget {
                    break;
                }
                let _ = writeln!(section, "{line}");
                section_used += line_cost;
                episodes_included += 1;
            }
            if section.is_empty() {
                continue;
            }
            let _ = writeln!(text, "{header}");
            text.push_str(&section);
            let _ = writeln!(text);
            used += section_used;
        }

        let patterns_included = self
            .append_pattern_section(workspace_id, budget.saturating_sub(used), &mut text, &mut used)
            .await;

        Ok(AgentContext {
            estimated_tokens: used,
            text,
            episodes_included,
            patterns_included,
        })
    }

    /// Append the workspace patterns section within
    /// `min(remaining, pattern_token_budget)`. Best-effort: provider failures
    /// leave the document without the section.
    async fn append_pattern_section(
        &self,
        workspace_id: &str,
        remaining: usize,
        text: &mut String,
        used: &mut usize,
    ) -> usize {
        let budget = remaining.min(self.config.pattern_token_budget);
        let patterns = match best_effort(
            "workspace pattern fetch",
            self.patterns.active_patterns(workspace_id).await,
        ) {
            Some(patterns) => patterns,
            None => return 0,
        };
        if patterns.is_empty() {
            return 0;
        }

        let header = "## Workspace Patterns";
        let header_cost = estimate_tokens(header, self.config.chars_per_token);
        if header_cost > budget {
            return 0;
        }
        let mut section = String::new();
        let mut section_used = header_cost;
        let mut included = 0usize;
        for pattern in &patterns {
            let line = format!(
                "- {} {}",
                confidence_tag(pattern.confidence),
                pattern.content
            );
            let line_cost = estimate_tokens(&line, self.config.chars_per_token);
            if section_used + line_cost > budget {
                break;
            }
            let _ = writeln!(section, "{line}");
            section_used += line_cost;
            included += 1;
        }
        if included == 0 {
            return 0;
        }
        let _ = writeln!(text, "{header}");
        text.push_str(&section);
        *used += section_used;
        included
    }

    /// Record a usefulness signal on an episode. Best-effort: returns `false`
    /// when the episode is missing or the write fails, never an error.
    pub async fn record_feedback(&self, id: &EpisodeId, was_useful: bool) -> bool {
        let episode = match best_effort("feedback lookup", self.episodes.get_episode(id).await) {
            Some(Some(episode)) => episode,
            Some(None) => {
                debug!(episode = %id, "feedback for unknown episode ignored");
                return false;
            }
            None => return false,
        };
        let mut metadata = episode.metadata.clone();
        if was_useful {
            metadata.useful_count += 1;
        } else {
            metadata.not_useful_count += 1;
        }
        best_effort(
            "feedback persist",
            self.episodes.update_metadata(id, &metadata).await,
        )
        .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfidenceThresholds, EpisodeInput, PatternType};
    use crate::infrastructure::InMemoryEpisodeRepository;
    use chrono::Duration;

    fn input(episode_type: EpisodeType, content: &str) -> EpisodeInput {
        EpisodeInput {
            project_id: "p1".into(),
            workspace_id: "w1".into(),
            story_id: None,
            agent_type: "dev".into(),
            episode_type,
            content: content.into(),
            entities: vec![],
            confidence: 0.8,
            metadata: None,
        }
    }

    fn engine(repo: Arc<InMemoryEpisodeRepository>) -> RelevanceEngine {
        RelevanceEngine::new(
            repo,
            Arc::new(NoopPatternProvider),
            RelevanceConfig::default(),
        )
    }

    struct FixedPatterns(Vec<WorkspacePattern>);

    #[async_trait]
    impl PatternProvider for FixedPatterns {
        async fn active_patterns(&self, _workspace_id: &str) -> Result<Vec<WorkspacePattern>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_keyword_match_ranks_higher() {
        let repo = Arc::new(InMemoryEpisodeRepository::new());
        repo.add_episode(&Episode::from_input(input(
            EpisodeType::Fact,
            "postgres connection pool exhausted under load",
        )))
        .await
        .unwrap();
        repo.add_episode(&Episode::from_input(input(
            EpisodeType::Fact,
            "frontend bundle size reduced by code splitting",
        )))
        .await
        .unwrap();

        let engine = engine(repo);
        let result = engine
            .query(&MemoryQuery::new("p1", "w1", "postgres pool tuning"))
            .await
            .unwrap();
        assert_eq!(result.total_count, 2);
        assert!(result.episodes[0]
            .episode
            .content
            .contains("postgres connection pool"));
        assert!(result.episodes[0].score > result.episodes[1].score);
    }

    #[tokio::test]
    async fn test_recency_decay_and_future_clamp() {
        let repo = Arc::new(InMemoryEpisodeRepository::new());
        let engine = engine(repo);

        let mut old = Episode::from_input(input(EpisodeType::Fact, "x"));
        old.timestamp = Utc::now() - Duration::days(30);
        let half_life = engine.recency_score(&old);
        assert!((half_life - 0.5).abs() < 0.02, "was {half_life}");

        let mut future = Episode::from_input(input(EpisodeType::Fact, "x"));
        future.timestamp = Utc::now() + Duration::days(3);
        assert_eq!(engine.recency_score(&future), 1.0);
    }

    #[tokio::test]
    async fn test_feedback_shifts_ranking() {
        let repo = Arc::new(InMemoryEpisodeRepository::new());
        let mut liked = Episode::from_input(input(EpisodeType::Fact, "retry with backoff"));
        liked.metadata.useful_count = 3;
        let mut disliked = Episode::from_input(input(EpisodeType::Fact, "retry with backoff"));
        disliked.metadata.not_useful_count = 3;
        repo.add_episode(&liked).await.unwrap();
        repo.add_episode(&disliked).await.unwrap();

        let engine = engine(repo);
        let result = engine
            .query(&MemoryQuery::new("p1", "w1", "retry backoff"))
            .await
            .unwrap();
        assert_eq!(result.episodes[0].episode.id, liked.id);
    }

    #[tokio::test]
    async fn test_scores_are_clamped() {
        let repo = Arc::new(InMemoryEpisodeRepository::new());
        let mut episode = Episode::from_input(input(
            EpisodeType::Decision,
            "adopt postgres for persistence",
        ));
        episode.metadata.useful_count = 10;
        repo.add_episode(&episode).await.unwrap();

        let engine = engine(repo);
        let result = engine
            .query(&MemoryQuery::new("p1", "w1", "adopt postgres for persistence"))
            .await
            .unwrap();
        let score = result.episodes[0].score;
        assert!((0.0..=1.0).contains(&score));
    }

    #[tokio::test]
    async fn test_agent_context_sections_and_budget() {
        let repo = Arc::new(InMemoryEpisodeRepository::new());
        repo.add_episode(&Episode::from_input(input(
            EpisodeType::Decision,
            "use postgres for persistence",
        )))
        .await
        .unwrap();
        repo.add_episode(&Episode::from_input(input(
            EpisodeType::Problem,
            "fixed deadlock in postgres migration",
        )))
        .await
        .unwrap();

        let engine = engine(repo.clone());
        let context = engine
            .query_for_agent_context("p1", "w1", "postgres work", "dev", None)
            .await
            .unwrap();
        assert!(context.text.contains("## Decisions"));
        assert!(context.text.contains("## Problems Solved"));
        assert_eq!(context.episodes_included, 2);

        // A tiny budget drops whole sections rather than truncating lines.
        let tight = engine
            .query_for_agent_context("p1", "w1", "postgres work", "dev", Some(3))
            .await
            .unwrap();
        assert!(tight.text.is_empty());
        assert_eq!(tight.episodes_included, 0);
    }

    #[tokio::test]
    async fn test_agent_type_filters_sections() {
        let repo = Arc::new(InMemoryEpisodeRepository::new());
        repo.add_episode(&Episode::from_input(input(
            EpisodeType::Decision,
            "use postgres for persistence",
        )))
        .await
        .unwrap();
        repo.add_episode(&Episode::from_input(input(
            EpisodeType::Preference,
            "postgres tabs over spaces",
        )))
        .await
        .unwrap();

        let engine = engine(repo);
        let context = engine
            .query_for_agent_context("p1", "w1", "postgres", "dev", None)
            .await
            .unwrap();
        // Dev agents never see preferences.
        assert!(context.text.contains("## Decisions"));
        assert!(!context.text.contains("## Preferences"));
    }

    #[tokio::test]
    async fn test_pattern_section_tags_confidence() {
        let repo = Arc::new(InMemoryEpisodeRepository::new());
        let thresholds = ConfidenceThresholds::default();
        let provider = FixedPatterns(vec![
            WorkspacePattern::new(
                "w1",
                PatternType::Architecture,
                "services expose health endpoints",
                vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()],
                vec![],
                &thresholds,
            ),
            WorkspacePattern::new(
                "w1",
                PatternType::Testing,
                "integration tests run against containers",
                vec!["a".into(), "b".into()],
                vec![],
                &thresholds,
            ),
        ]);
        let engine = RelevanceEngine::new(repo, Arc::new(provider), RelevanceConfig::default());

        let context = engine
            .query_for_agent_context("p1", "w1", "anything", "dev", None)
            .await
            .unwrap();
        assert!(context.text.contains("## Workspace Patterns"));
        assert!(context.text.contains("[AUTO-APPLY] services expose"));
        assert!(context.text.contains("[SUGGESTION] integration tests"));
        assert_eq!(context.patterns_included, 2);
    }

    #[tokio::test]
    async fn test_record_feedback() {
        let repo = Arc::new(InMemoryEpisodeRepository::new());
        let episode = Episode::from_input(input(EpisodeType::Fact, "x"));
        repo.add_episode(&episode).await.unwrap();

        let engine = engine(repo.clone());
        assert!(engine.record_feedback(&episode.id, true).await);
        assert!(engine.record_feedback(&episode.id, false).await);
        let stored = repo.get_episode(&episode.id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.useful_count, 1);
        assert_eq!(stored.metadata.not_useful_count, 1);

        // Unknown id reports false without erroring.
        assert!(!engine.record_feedback(&EpisodeId::new(), true).await);
    }
}
