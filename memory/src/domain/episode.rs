// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Episode entities — the atomic observations recorded by agents
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Episode, entity reference and search filter types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::error::{MemoryError, Result};
use super::summary::SummaryId;

/// Episode identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeId(pub Uuid);

impl EpisodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EpisodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of observation an episode records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeType {
    Decision,
    Problem,
    Fact,
    Pattern,
    Preference,
}

impl EpisodeType {
    pub const ALL: [EpisodeType; 5] = [
        EpisodeType::Decision,
        EpisodeType::Problem,
        EpisodeType::Fact,
        EpisodeType::Pattern,
        EpisodeType::Preference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeType::Decision => "decision",
            EpisodeType::Problem => "problem",
            EpisodeType::Fact => "fact",
            EpisodeType::Pattern => "pattern",
            EpisodeType::Preference => "preference",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "decision" => Ok(EpisodeType::Decision),
            "problem" => Ok(EpisodeType::Problem),
            "fact" => Ok(EpisodeType::Fact),
            "pattern" => Ok(EpisodeType::Pattern),
            "preference" => Ok(EpisodeType::Preference),
            other => Err(MemoryError::Validation(format!(
                "unknown episode type: {other}"
            ))),
        }
    }

    /// Fixed retrieval priority used by the relevance engine.
    ///
    /// Decisions outrank problems outrank facts outrank patterns outrank
    /// preferences, strictly.
    pub fn retrieval_priority(&self) -> f64 {
        match self {
            EpisodeType::Decision => 1.0,
            EpisodeType::Problem => 0.9,
            EpisodeType::Fact => 0.7,
            EpisodeType::Pattern => 0.6,
            EpisodeType::Preference => 0.5,
        }
    }
}

impl fmt::Display for EpisodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open metadata bag attached to every episode.
///
/// Known keys are typed fields; anything else round-trips through `extra`
/// so unknown keys written by other agents are never dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary_id: Option<SummaryId>,
    #[serde(default)]
    pub useful_count: u32,
    #[serde(default)]
    pub not_useful_count: u32,
    /// Set when ingestion flagged this episode as a near-duplicate.
    #[serde(default)]
    pub duplicate_of: Option<EpisodeId>,
    #[serde(default)]
    pub duplicate_score: Option<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// An atomic observation recorded by an agent.
///
/// Every read and write path is scoped by `(project_id, workspace_id)`;
/// cross-tenant leakage is a correctness bug. Episodes are never hard-deleted
/// by the engine — consolidation only flips the archival fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub project_id: String,
    pub workspace_id: String,
    pub story_id: Option<String>,
    pub agent_type: String,
    pub timestamp: DateTime<Utc>,
    pub episode_type: EpisodeType,
    pub content: String,
    pub entities: Vec<String>,
    pub confidence: f64,
    pub metadata: EpisodeMetadata,
}

impl Episode {
    /// Materialize an input into a stored episode, generating id and timestamp.
    pub fn from_input(input: EpisodeInput) -> Self {
        Self {
            id: EpisodeId::new(),
            project_id: input.project_id,
            workspace_id: input.workspace_id,
            story_id: input.story_id,
            agent_type: input.agent_type,
            timestamp: Utc::now(),
            episode_type: input.episode_type,
            content: input.content,
            entities: input.entities,
            confidence: input.confidence,
            metadata: input.metadata.unwrap_or_default(),
        }
    }

    /// Soft archival mutation. The node itself stays in place.
    pub fn mark_archived(&mut self, summary_id: SummaryId, archived_at: DateTime<Utc>) {
        self.metadata.archived = true;
        self.metadata.archived_at = Some(archived_at);
        self.metadata.summary_id = Some(summary_id);
    }
}

/// Caller-supplied fields for a new episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeInput {
    pub project_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub story_id: Option<String>,
    pub agent_type: String,
    pub episode_type: EpisodeType,
    pub content: String,
    #[serde(default)]
    pub entities: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Option<EpisodeMetadata>,
}

impl EpisodeInput {
    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(MemoryError::Validation("project_id is required".into()));
        }
        if self.workspace_id.trim().is_empty() {
            return Err(MemoryError::Validation("workspace_id is required".into()));
        }
        if self.content.trim().is_empty() {
            return Err(MemoryError::Validation("content must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(MemoryError::Validation(format!(
                "confidence must be within [0,1], got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// A named concept (library, API, ...) referenced by episodes.
///
/// Merged, not duplicated, by `(name, project_id, workspace_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: Uuid,
    pub name: String,
    pub project_id: String,
    pub workspace_id: String,
    pub created_at: DateTime<Utc>,
}

/// Tenant scope for counting operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    Project {
        project_id: String,
        workspace_id: String,
    },
    Workspace {
        workspace_id: String,
    },
}

impl TenantScope {
    pub fn project(project_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self::Project {
            project_id: project_id.into(),
            workspace_id: workspace_id.into(),
        }
    }

    pub fn workspace(workspace_id: impl Into<String>) -> Self {
        Self::Workspace {
            workspace_id: workspace_id.into(),
        }
    }

    pub fn workspace_id(&self) -> &str {
        match self {
            TenantScope::Project { workspace_id, .. } => workspace_id,
            TenantScope::Workspace { workspace_id } => workspace_id,
        }
    }
}

/// Search filter over episodes. Archived episodes are excluded unless the
/// caller opts in explicitly.
#[derive(Debug, Clone)]
pub struct EpisodeFilter {
    pub project_id: String,
    pub workspace_id: String,
    pub episode_types: Option<Vec<EpisodeType>>,
    pub since: Option<DateTime<Utc>>,
    pub entities: Option<Vec<String>>,
    pub include_archived: bool,
    pub limit: usize,
}

impl EpisodeFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn scoped(project_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            workspace_id: workspace_id.into(),
            episode_types: None,
            since: None,
            entities: None,
            include_archived: false,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn with_types(mut self, types: Vec<EpisodeType>) -> Self {
        self.episode_types = Some(types);
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = Some(entities);
        self
    }

    pub fn with_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> EpisodeInput {
        EpisodeInput {
            project_id: "proj-1".into(),
            workspace_id: "ws-1".into(),
            story_id: None,
            agent_type: "dev".into(),
            episode_type: EpisodeType::Fact,
            content: "Use library X for feature Y".into(),
            entities: vec!["library X".into()],
            confidence: 0.8,
            metadata: None,
        }
    }

    #[test]
    fn test_from_input_generates_identity() {
        let episode = Episode::from_input(input());
        assert_ne!(episode.id, Episode::from_input(input()).id);
        assert!(!episode.metadata.archived);
    }

    #[test]
    fn test_validation_rejects_bad_confidence() {
        let mut bad = input();
        bad.confidence = 1.5;
        assert!(matches!(bad.validate(), Err(MemoryError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_empty_content() {
        let mut bad = input();
        bad.content = "   ".into();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_type_priority_is_strictly_ordered() {
        let priorities: Vec<f64> = EpisodeType::ALL
            .iter()
            .map(|t| t.retrieval_priority())
            .collect();
        for pair in priorities.windows(2) {
            assert!(pair[0] > pair[1], "priorities must strictly decrease");
        }
    }

    #[test]
    fn test_mark_archived_is_soft() {
        let mut episode = Episode::from_input(input());
        let summary_id = SummaryId::new();
        let now = Utc::now();
        episode.mark_archived(summary_id, now);
        assert!(episode.metadata.archived);
        assert_eq!(episode.metadata.summary_id, Some(summary_id));
        assert_eq!(episode.metadata.archived_at, Some(now));
    }

    #[test]
    fn test_metadata_roundtrips_unknown_keys() {
        let json = r#"{"pinned":true,"custom_flag":"kept"}"#;
        let meta: EpisodeMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.pinned);
        assert_eq!(meta.extra["custom_flag"], "kept");
        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["custom_flag"], "kept");
    }
}
