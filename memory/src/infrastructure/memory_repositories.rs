// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-memory repository implementations
//!
//! Mirror the graph-backed semantics over `HashMap`s. Used by the test suite
//! and by hosts that run without a graph store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{
    Episode, EpisodeFilter, EpisodeId, EpisodeMetadata, MemoryError, MemorySummary, PatternId,
    Result, SummaryId, TenantScope, WorkspacePattern,
};
use crate::infrastructure::repository::{
    EpisodeRepository, PatternFilter, PatternRepository, SummaryRepository,
};

/// In-memory implementation of [`EpisodeRepository`].
#[derive(Default)]
pub struct InMemoryEpisodeRepository {
    episodes: Arc<RwLock<HashMap<EpisodeId, Episode>>>,
}

impl InMemoryEpisodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(episode: &Episode, filter: &EpisodeFilter) -> bool {
    if episode.project_id != filter.project_id || episode.workspace_id != filter.workspace_id {
        return false;
    }
    if !filter.include_archived && episode.metadata.archived {
        return false;
    }
    if let Some(types) = &filter.episode_types {
        if !types.contains(&episode.episode_type) {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if episode.timestamp < since {
            return false;
        }
    }
    if let Some(entities) = &filter.entities {
        if !episode.entities.iter().any(|name| entities.contains(name)) {
            return false;
        }
    }
    true
}

#[async_trait]
impl EpisodeRepository for InMemoryEpisodeRepository {
    async fn add_episode(&self, episode: &Episode) -> Result<()> {
        let mut episodes = self.episodes.write().await;
        episodes.insert(episode.id, episode.clone());
        Ok(())
    }

    async fn get_episode(&self, id: &EpisodeId) -> Result<Option<Episode>> {
        let episodes = self.episodes.read().await;
        Ok(episodes.get(id).cloned())
    }

    async fn search_episodes(&self, filter: &EpisodeFilter) -> Result<Vec<Episode>> {
        let episodes = self.episodes.read().await;
        let mut matched: Vec<Episode> = episodes
            .values()
            .filter(|e| matches_filter(e, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(filter.limit);
        Ok(matched)
    }

    async fn delete_episode(&self, id: &EpisodeId) -> Result<()> {
        let mut episodes = self.episodes.write().await;
        episodes
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MemoryError::not_found("episode", id.to_string()))
    }

    async fn archive_episodes(
        &self,
        ids: &[EpisodeId],
        summary_id: &SummaryId,
        archived_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut episodes = self.episodes.write().await;
        let mut archived = 0;
        for id in ids {
            if let Some(episode) = episodes.get_mut(id) {
                episode.mark_archived(*summary_id, archived_at);
                archived += 1;
            }
        }
        Ok(archived)
    }

    async fn count_episodes(&self, scope: &TenantScope, include_archived: bool) -> Result<usize> {
        let episodes = self.episodes.read().await;
        Ok(episodes
            .values()
            .filter(|e| match scope {
                TenantScope::Project {
                    project_id,
                    workspace_id,
                } => e.project_id == *project_id && e.workspace_id == *workspace_id,
                TenantScope::Workspace { workspace_id } => e.workspace_id == *workspace_id,
            })
            .filter(|e| include_archived || !e.metadata.archived)
            .count())
    }

    async fn distinct_project_ids(&self, workspace_id: &str) -> Result<Vec<String>> {
        let episodes = self.episodes.read().await;
        let mut projects: Vec<String> = episodes
            .values()
            .filter(|e| e.workspace_id == workspace_id)
            .map(|e| e.project_id.clone())
            .collect();
        projects.sort();
        projects.dedup();
        Ok(projects)
    }

    async fn recent_episodes_by_project(
        &self,
        workspace_id: &str,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<Episode>> {
        self.search_episodes(&EpisodeFilter::scoped(project_id, workspace_id).with_limit(limit))
            .await
    }

    async fn update_metadata(&self, id: &EpisodeId, metadata: &EpisodeMetadata) -> Result<()> {
        let mut episodes = self.episodes.write().await;
        match episodes.get_mut(id) {
            Some(episode) => {
                episode.metadata = metadata.clone();
                Ok(())
            }
            None => Err(MemoryError::not_found("episode", id.to_string())),
        }
    }
}

type SummaryKey = (String, String, DateTime<Utc>, DateTime<Utc>);

/// In-memory implementation of [`SummaryRepository`].
#[derive(Default)]
pub struct InMemorySummaryRepository {
    summaries: Arc<RwLock<HashMap<SummaryKey, MemorySummary>>>,
}

impl InMemorySummaryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SummaryRepository for InMemorySummaryRepository {
    async fn upsert_summary(&self, summary: &MemorySummary) -> Result<MemorySummary> {
        let key = (
            summary.project_id.clone(),
            summary.workspace_id.clone(),
            summary.period_start,
            summary.period_end,
        );
        let mut summaries = self.summaries.write().await;
        match summaries.get_mut(&key) {
            Some(existing) => {
                existing.merge_from(summary);
                Ok(existing.clone())
            }
            None => {
                summaries.insert(key, summary.clone());
                Ok(summary.clone())
            }
        }
    }

    async fn get_summary(
        &self,
        project_id: &str,
        workspace_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<MemorySummary>> {
        let key = (
            project_id.to_string(),
            workspace_id.to_string(),
            period_start,
            period_end,
        );
        let summaries = self.summaries.read().await;
        Ok(summaries.get(&key).cloned())
    }

    async fn list_summaries(
        &self,
        project_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<MemorySummary>> {
        let summaries = self.summaries.read().await;
        let mut matched: Vec<MemorySummary> = summaries
            .values()
            .filter(|s| s.project_id == project_id && s.workspace_id == workspace_id)
            .cloned()
            .collect();
        matched.sort_by_key(|s| s.period_start);
        Ok(matched)
    }
}

/// In-memory implementation of [`PatternRepository`].
#[derive(Default)]
pub struct InMemoryPatternRepository {
    patterns: Arc<RwLock<HashMap<PatternId, WorkspacePattern>>>,
}

impl InMemoryPatternRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternRepository for InMemoryPatternRepository {
    async fn create_pattern(&self, pattern: &WorkspacePattern) -> Result<()> {
        let mut patterns = self.patterns.write().await;
        patterns.insert(pattern.id, pattern.clone());
        Ok(())
    }

    async fn update_pattern(&self, pattern: &WorkspacePattern) -> Result<()> {
        let mut patterns = self.patterns.write().await;
        if !patterns.contains_key(&pattern.id) {
            return Err(MemoryError::not_found("pattern", pattern.id.to_string()));
        }
        patterns.insert(pattern.id, pattern.clone());
        Ok(())
    }

    async fn get_pattern(&self, id: &PatternId) -> Result<Option<WorkspacePattern>> {
        let patterns = self.patterns.read().await;
        Ok(patterns.get(id).cloned())
    }

    async fn list_patterns(
        &self,
        workspace_id: &str,
        filter: &PatternFilter,
    ) -> Result<Vec<WorkspacePattern>> {
        let patterns = self.patterns.read().await;
        let mut matched: Vec<WorkspacePattern> = patterns
            .values()
            .filter(|p| p.workspace_id == workspace_id)
            .filter(|p| filter.pattern_type.map_or(true, |t| p.pattern_type == t))
            .filter(|p| filter.confidence.map_or(true, |c| p.confidence == c))
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then(b.updated_at.cmp(&a.updated_at))
        });
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn count_patterns(&self, workspace_id: &str) -> Result<usize> {
        let patterns = self.patterns.read().await;
        Ok(patterns
            .values()
            .filter(|p| p.workspace_id == workspace_id)
            .count())
    }
}
