// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Repository interfaces for the memory bounded context
//!
//! Defines the storage contracts for episodes, summaries and patterns. Two
//! implementations exist: graph-backed (Neo4j) and in-memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Episode, EpisodeFilter, EpisodeId, EpisodeMetadata, MemorySummary, PatternConfidence,
    PatternId, PatternStatus, PatternType, Result, SummaryId, TenantScope, WorkspacePattern,
};

/// Storage contract for episode and entity-reference nodes.
#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    /// Persist a new episode, merging project/workspace anchors and entity
    /// references in one batched operation.
    async fn add_episode(&self, episode: &Episode) -> Result<()>;

    /// Fetch an episode with its resolved entity names.
    async fn get_episode(&self, id: &EpisodeId) -> Result<Option<Episode>>;

    /// Tenant-scoped search, newest first. Archived episodes are excluded
    /// unless the filter opts in.
    async fn search_episodes(&self, filter: &EpisodeFilter) -> Result<Vec<Episode>>;

    /// Hard delete, for compliance workflows only. The engine itself never
    /// calls this.
    async fn delete_episode(&self, id: &EpisodeId) -> Result<()>;

    /// Soft-archive a batch of episodes against a summary in one statement.
    /// Returns the number of episodes archived.
    async fn archive_episodes(
        &self,
        ids: &[EpisodeId],
        summary_id: &SummaryId,
        archived_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Soft-archive a single episode.
    async fn archive_episode(&self, id: &EpisodeId, summary_id: &SummaryId) -> Result<()> {
        let archived = self
            .archive_episodes(std::slice::from_ref(id), summary_id, Utc::now())
            .await?;
        if archived == 0 {
            return Err(crate::domain::MemoryError::not_found(
                "episode",
                id.to_string(),
            ));
        }
        Ok(())
    }

    /// Count episodes in a project or workspace scope.
    async fn count_episodes(&self, scope: &TenantScope, include_archived: bool) -> Result<usize>;

    /// Distinct project ids with recorded episodes in a workspace.
    async fn distinct_project_ids(&self, workspace_id: &str) -> Result<Vec<String>>;

    /// Most recent non-archived episodes of one project, newest first.
    async fn recent_episodes_by_project(
        &self,
        workspace_id: &str,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<Episode>>;

    /// Persist updated metadata (feedback counters, duplicate flags).
    async fn update_metadata(&self, id: &EpisodeId, metadata: &EpisodeMetadata) -> Result<()>;
}

/// Storage contract for consolidation summaries.
#[async_trait]
pub trait SummaryRepository: Send + Sync {
    /// Upsert keyed on `(project_id, workspace_id, period_start, period_end)`.
    /// A second run for the same period merges into the stored summary and
    /// returns the merged row.
    async fn upsert_summary(&self, summary: &MemorySummary) -> Result<MemorySummary>;

    async fn get_summary(
        &self,
        project_id: &str,
        workspace_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<MemorySummary>>;

    /// All summaries of a project, oldest period first.
    async fn list_summaries(
        &self,
        project_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<MemorySummary>>;
}

/// Filter for workspace pattern listings. Defaults to active patterns only.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    pub pattern_type: Option<PatternType>,
    pub confidence: Option<PatternConfidence>,
    /// `None` means any status.
    pub status: Option<PatternStatus>,
    pub limit: Option<usize>,
}

impl Default for PatternFilter {
    fn default() -> Self {
        Self {
            pattern_type: None,
            confidence: None,
            status: Some(PatternStatus::Active),
            limit: None,
        }
    }
}

impl PatternFilter {
    pub fn any_status() -> Self {
        Self {
            status: None,
            ..Self::default()
        }
    }
}

/// Storage contract for cross-project workspace patterns.
#[async_trait]
pub trait PatternRepository: Send + Sync {
    async fn create_pattern(&self, pattern: &WorkspacePattern) -> Result<()>;

    /// Replace the stored pattern (source sets, confidence, status fields).
    async fn update_pattern(&self, pattern: &WorkspacePattern) -> Result<()>;

    async fn get_pattern(&self, id: &PatternId) -> Result<Option<WorkspacePattern>>;

    /// Patterns of a workspace, ordered by occurrence count then recency.
    async fn list_patterns(
        &self,
        workspace_id: &str,
        filter: &PatternFilter,
    ) -> Result<Vec<WorkspacePattern>>;

    async fn count_patterns(&self, workspace_id: &str) -> Result<usize>;
}
