// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Summarization engine
//!
//! Consolidates old episodes into one extractive summary per calendar month
//! and soft-archives the source episodes. Archival is append-only: episodes
//! gain archived markers and a link to their summary, they are never deleted.
//!
//! Per-month failures accumulate into the outcome while later months keep
//! processing, and a completion event is emitted on every run.

use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::EventBus;
use crate::domain::{
    Episode, EpisodeFilter, EpisodeType, MemoryEvent, MemorySummary, MonthKey, Result, SummaryId,
    TenantScope,
};
use crate::infrastructure::{EpisodeRepository, SummaryRepository};

/// Thresholds and shape parameters for consolidation.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Non-archived episode count at which consolidation kicks in.
    pub episode_threshold: usize,
    /// Episodes younger than this never consolidate.
    pub min_age_days: i64,
    /// Episodes at or above this confidence never consolidate.
    pub max_confidence: f64,
    /// Representative content strings kept per type per month.
    pub examples_per_type: usize,
    /// Summary text cap; longer text is cut with an ellipsis.
    pub max_summary_chars: usize,
    /// Tag recorded on each summary identifying how it was produced.
    pub model: String,
    /// Upper bound on episodes fetched per consolidation run.
    pub fetch_limit: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            episode_threshold: 1000,
            min_age_days: 30,
            max_confidence: 0.95,
            examples_per_type: 10,
            max_summary_chars: 2000,
            model: "extractive-v1".into(),
            fetch_limit: 10_000,
        }
    }
}

/// Counters reported by a consolidation run.
#[derive(Debug, Clone, Default)]
pub struct SummarizationOutcome {
    pub skipped: bool,
    pub summaries_created: usize,
    pub episodes_archived: usize,
    pub episodes_processed: usize,
    pub errors: Vec<String>,
}

/// Month-bucketed extractive consolidation over episode and summary stores.
pub struct Summarizer {
    episodes: Arc<dyn EpisodeRepository>,
    summaries: Arc<dyn SummaryRepository>,
    event_bus: Arc<dyn EventBus>,
    config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(
        episodes: Arc<dyn EpisodeRepository>,
        summaries: Arc<dyn SummaryRepository>,
        event_bus: Arc<dyn EventBus>,
        config: SummarizerConfig,
    ) -> Self {
        Self {
            episodes,
            summaries,
            event_bus,
            config,
        }
    }

    /// Consolidate only when the project's live episode count has crossed the
    /// threshold; below it the run is recorded as skipped.
    pub async fn check_and_summarize(
        &self,
        project_id: &str,
        workspace_id: &str,
    ) -> Result<SummarizationOutcome> {
        let scope = TenantScope::project(project_id, workspace_id);
        let count = self.episodes.count_episodes(&scope, false).await?;
        if count < self.config.episode_threshold {
            debug!(
                project_id,
                count,
                threshold = self.config.episode_threshold,
                "below consolidation threshold"
            );
            let outcome = SummarizationOutcome {
                skipped: true,
                ..SummarizationOutcome::default()
            };
            self.emit_completion(project_id, workspace_id, &outcome, 0)
                .await;
            return Ok(outcome);
        }
        self.summarize_project(project_id, workspace_id).await
    }

    /// Full consolidation run for one project, oldest month first.
    ///
    /// A failing month is recorded in the outcome and the run moves on to the
    /// next month. The completion event fires even when the initial fetch
    /// fails, so callers always observe an outcome.
    pub async fn summarize_project(
        &self,
        project_id: &str,
        workspace_id: &str,
    ) -> Result<SummarizationOutcome> {
        let started = std::time::Instant::now();
        let mut outcome = SummarizationOutcome::default();

        let filter = EpisodeFilter::scoped(project_id, workspace_id)
            .with_limit(self.config.fetch_limit);
        let all = match self.episodes.search_episodes(&filter).await {
            Ok(all) => all,
            Err(err) => {
                warn!(project_id, error = %err, "consolidation fetch failed");
                outcome.errors.push(format!("episode fetch: {err}"));
                self.emit_completion(
                    project_id,
                    workspace_id,
                    &outcome,
                    started.elapsed().as_millis() as u64,
                )
                .await;
                return Ok(outcome);
            }
        };

        let cutoff = Utc::now() - Duration::days(self.config.min_age_days);
        // Eligible episodes bucketed by month; BTreeMap keeps months ordered
        // oldest first. keyDecisions/keyPatterns draw from all episodes of
        // the month, so bucket those separately.
        let mut eligible: BTreeMap<MonthKey, Vec<&Episode>> = BTreeMap::new();
        let mut by_month: BTreeMap<MonthKey, Vec<&Episode>> = BTreeMap::new();
        for episode in &all {
            let month = MonthKey::of(episode.timestamp);
            by_month.entry(month).or_default().push(episode);
            if self.is_eligible(episode, &cutoff) {
                eligible.entry(month).or_default().push(episode);
            }
        }

        for (month, members) in &eligible {
            outcome.episodes_processed += members.len();
            let month_episodes = by_month.get(month).map(Vec::as_slice).unwrap_or(&[]);
            match self
                .consolidate_month(project_id, workspace_id, *month, members, month_episodes)
                .await
            {
                Ok(archived) => {
                    outcome.summaries_created += 1;
                    outcome.episodes_archived += archived;
                }
                Err(err) => {
                    warn!(project_id, month = %month, error = %err, "month consolidation failed");
                    outcome.errors.push(format!("{month}: {err}"));
                }
            }
        }

        info!(
            project_id,
            summaries = outcome.summaries_created,
            archived = outcome.episodes_archived,
            errors = outcome.errors.len(),
            "consolidation run finished"
        );
        self.emit_completion(
            project_id,
            workspace_id,
            &outcome,
            started.elapsed().as_millis() as u64,
        )
        .await;
        Ok(outcome)
    }

    fn is_eligible(&self, episode: &Episode, cutoff: &chrono::DateTime<Utc>) -> bool {
        episode.episode_type != EpisodeType::Decision
            && !episode.metadata.pinned
            && !episode.metadata.archived
            && episode.confidence < self.config.max_confidence
            && episode.timestamp <= *cutoff
    }

    /// Build, upsert and archive one month. Returns the archived count.
    async fn consolidate_month(
        &self,
        project_id: &str,
        workspace_id: &str,
        month: MonthKey,
        eligible: &[&Episode],
        month_episodes: &[&Episode],
    ) -> Result<usize> {
        let (period_start, period_end) = month.bounds();
        let summary_text = self.build_summary_text(month, eligible);

        let key_decisions = month_episodes
            .iter()
            .filter(|e| e.episode_type == EpisodeType::Decision)
            .map(|e| e.content.clone())
            .collect();
        let key_patterns = month_episodes
            .iter()
            .filter(|e| e.episode_type == EpisodeType::Pattern)
            .map(|e| e.content.clone())
            .collect();
        let archived_ids: Vec<_> = eligible.iter().map(|e| e.id).collect();

        let summary = MemorySummary {
            id: SummaryId::new(),
            project_id: project_id.into(),
            workspace_id: workspace_id.into(),
            period_start,
            period_end,
            original_episode_count: eligible.len(),
            summary: summary_text,
            key_decisions,
            key_patterns,
            archived_episode_ids: archived_ids.clone(),
            summarization_model: self.config.model.clone(),
            created_at: Utc::now(),
            metadata: Default::default(),
        };
        let stored = self.summaries.upsert_summary(&summary).await?;

        // One batched archival per month, linked against the stored (possibly
        // pre-existing) summary node.
        let archived = self
            .episodes
            .archive_episodes(&archived_ids, &stored.id, Utc::now())
            .await?;
        Ok(archived)
    }

    /// Deterministic extractive summary: header line, then up to N
    /// representative content strings per type under labeled sub-headings.
    fn build_summary_text(&self, month: MonthKey, eligible: &[&Episode]) -> String {
        let (start, end) = month.bounds();
        let mut text = format!(
            "Period {} to {} ({} episodes consolidated)\n",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            eligible.len()
        );
        let sections: [(EpisodeType, &str); 4] = [
            (EpisodeType::Fact, "Key facts"),
            (EpisodeType::Problem, "Problems resolved"),
            (EpisodeType::Pattern, "Patterns observed"),
            (EpisodeType::Preference, "Preferences"),
        ];
        for (episode_type, heading) in sections {
            let examples: Vec<&str> = eligible
                .iter()
                .filter(|e| e.episode_type == episode_type)
                .take(self.config.examples_per_type)
                .map(|e| e.content.as_str())
                .collect();
            if examples.is_empty() {
                continue;
            }
            text.push_str(heading);
            text.push_str(":\n");
            for example in examples {
                text.push_str("- ");
                text.push_str(example);
                text.push('\n');
            }
        }
        if text.len() > self.config.max_summary_chars {
            let mut cut = self.config.max_summary_chars.saturating_sub(3);
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("...");
        }
        text
    }

    async fn emit_completion(
        &self,
        project_id: &str,
        workspace_id: &str,
        outcome: &SummarizationOutcome,
        duration_ms: u64,
    ) {
        let event = MemoryEvent::SummarizationCompleted {
            project_id: project_id.into(),
            workspace_id: workspace_id.into(),
            skipped: outcome.skipped,
            summaries_created: outcome.summaries_created,
            episodes_archived: outcome.episodes_archived,
            episodes_processed: outcome.episodes_processed,
            duration_ms,
            errors: outcome.errors.clone(),
            timestamp: Utc::now(),
        };
        if let Err(err) = self.event_bus.publish(event).await {
            warn!(error = %err, "failed to publish summarization event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EpisodeInput;
    use crate::infrastructure::{InMemoryEpisodeRepository, InMemorySummaryRepository};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockEventBus {
        events: Mutex<Vec<MemoryEvent>>,
    }

    impl MockEventBus {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<MemoryEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventBus for MockEventBus {
        async fn publish(&self, event: MemoryEvent) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn old_episode(episode_type: EpisodeType, content: &str, age_days: i64) -> Episode {
        let mut episode = Episode::from_input(EpisodeInput {
            project_id: "p1".into(),
            workspace_id: "w1".into(),
            story_id: None,
            agent_type: "dev".into(),
            episode_type,
            content: content.into(),
            entities: vec![],
            confidence: 0.8,
            metadata: None,
        });
        episode.timestamp = Utc::now() - Duration::days(age_days);
        episode
    }

    struct Fixture {
        episodes: Arc<InMemoryEpisodeRepository>,
        summaries: Arc<InMemorySummaryRepository>,
        bus: Arc<MockEventBus>,
        summarizer: Summarizer,
    }

    fn fixture(config: SummarizerConfig) -> Fixture {
        let episodes = Arc::new(InMemoryEpisodeRepository::new());
        let summaries = Arc::new(InMemorySummaryRepository::new());
        let bus = Arc::new(MockEventBus::new());
        let summarizer = Summarizer::new(
            episodes.clone(),
            summaries.clone(),
            bus.clone(),
            config,
        );
        Fixture {
            episodes,
            summaries,
            bus,
            summarizer,
        }
    }

    #[tokio::test]
    async fn test_below_threshold_is_skipped() {
        let f = fixture(SummarizerConfig::default());
        f.episodes
            .add_episode(&old_episode(EpisodeType::Fact, "x", 60))
            .await
            .unwrap();

        let outcome = f.summarizer.check_and_summarize("p1", "w1").await.unwrap();
        assert!(outcome.skipped);
        assert_eq!(outcome.summaries_created, 0);

        let events = f.bus.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            MemoryEvent::SummarizationCompleted { skipped, .. } => assert!(skipped),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_archives_eligible_and_preserves_decisions() {
        let f = fixture(SummarizerConfig {
            episode_threshold: 1,
            ..SummarizerConfig::default()
        });
        let fact = old_episode(EpisodeType::Fact, "ci runs clippy", 60);
        let decision = old_episode(EpisodeType::Decision, "adopt postgres", 60);
        let mut pinned = old_episode(EpisodeType::Fact, "pinned fact", 60);
        pinned.metadata.pinned = true;
        let fresh = old_episode(EpisodeType::Fact, "fresh fact", 2);
        for e in [&fact, &decision, &pinned, &fresh] {
            f.episodes.add_episode(e).await.unwrap();
        }

        let outcome = f.summarizer.check_and_summarize("p1", "w1").await.unwrap();
        assert!(!outcome.skipped);
        assert_eq!(outcome.summaries_created, 1);
        assert_eq!(outcome.episodes_archived, 1);

        // Archived, not deleted.
        let stored = f.episodes.get_episode(&fact.id).await.unwrap().unwrap();
        assert!(stored.metadata.archived);
        assert!(stored.metadata.summary_id.is_some());

        // Decisions survive verbatim on the summary, unarchived.
        let summaries = f.summaries.list_summaries("p1", "w1").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].key_decisions, vec!["adopt postgres"]);
        let decision_row = f.episodes.get_episode(&decision.id).await.unwrap().unwrap();
        assert!(!decision_row.metadata.archived);

        // Pinned and fresh episodes stay live.
        assert!(!f
            .episodes
            .get_episode(&pinned.id)
            .await
            .unwrap()
            .unwrap()
            .metadata
            .archived);
        assert!(!f
            .episodes
            .get_episode(&fresh.id)
            .await
            .unwrap()
            .unwrap()
            .metadata
            .archived);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let f = fixture(SummarizerConfig {
            episode_threshold: 1,
            ..SummarizerConfig::default()
        });
        f.episodes
            .add_episode(&old_episode(EpisodeType::Fact, "ci runs clippy", 60))
            .await
            .unwrap();

        f.summarizer.summarize_project("p1", "w1").await.unwrap();
        let second = f.summarizer.summarize_project("p1", "w1").await.unwrap();

        // Already-archived episodes are no longer eligible.
        assert_eq!(second.summaries_created, 0);
        assert_eq!(second.episodes_archived, 0);
        let summaries = f.summaries.list_summaries("p1", "w1").await.unwrap();
        assert_eq!(summaries.len(), 1);
    }

    #[tokio::test]
    async fn test_months_are_bucketed_separately() {
        let f = fixture(SummarizerConfig {
            episode_threshold: 1,
            ..SummarizerConfig::default()
        });
        f.episodes
            .add_episode(&old_episode(EpisodeType::Fact, "from two months ago", 70))
            .await
            .unwrap();
        f.episodes
            .add_episode(&old_episode(EpisodeType::Fact, "from four months ago", 130))
            .await
            .unwrap();

        let outcome = f.summarizer.summarize_project("p1", "w1").await.unwrap();
        assert_eq!(outcome.summaries_created, 2);
        let summaries = f.summaries.list_summaries("p1", "w1").await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].period_start < summaries[1].period_start);
    }

    #[tokio::test]
    async fn test_summary_text_truncated_with_ellipsis() {
        let f = fixture(SummarizerConfig {
            episode_threshold: 1,
            max_summary_chars: 120,
            ..SummarizerConfig::default()
        });
        for i in 0..5 {
            f.episodes
                .add_episode(&old_episode(
                    EpisodeType::Fact,
                    &format!("a reasonably long observation about subsystem number {i}"),
                    60,
                ))
                .await
                .unwrap();
        }

        f.summarizer.summarize_project("p1", "w1").await.unwrap();
        let summaries = f.summaries.list_summaries("p1", "w1").await.unwrap();
        assert!(summaries[0].summary.len() <= 120);
        assert!(summaries[0].summary.ends_with("..."));
    }
}
