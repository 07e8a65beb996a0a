// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Cross-project workspace patterns
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** WorkspacePattern entity, confidence tiers, status lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::episode::EpisodeId;

/// Pattern identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Category a recurring observation falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Architecture,
    Error,
    Testing,
    Deployment,
    Security,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Architecture => "architecture",
            PatternType::Error => "error",
            PatternType::Testing => "testing",
            PatternType::Deployment => "deployment",
            PatternType::Security => "security",
        }
    }

    pub fn parse(s: &str) -> crate::domain::Result<Self> {
        match s {
            "architecture" => Ok(PatternType::Architecture),
            "error" => Ok(PatternType::Error),
            "testing" => Ok(PatternType::Testing),
            "deployment" => Ok(PatternType::Deployment),
            "security" => Ok(PatternType::Security),
            other => Err(crate::domain::MemoryError::Validation(format!(
                "unknown pattern type: {other}"
            ))),
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reliability tier derived from how many distinct projects exhibit the
/// pattern. Ordered: Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternConfidence {
    Low,
    Medium,
    High,
}

impl PatternConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternConfidence::Low => "low",
            PatternConfidence::Medium => "medium",
            PatternConfidence::High => "high",
        }
    }

    pub fn parse(s: &str) -> crate::domain::Result<Self> {
        match s {
            "low" => Ok(PatternConfidence::Low),
            "medium" => Ok(PatternConfidence::Medium),
            "high" => Ok(PatternConfidence::High),
            other => Err(crate::domain::MemoryError::Validation(format!(
                "unknown confidence tier: {other}"
            ))),
        }
    }

    /// Derive the tier from the number of distinct source projects.
    pub fn from_project_count(count: usize, thresholds: &ConfidenceThresholds) -> Self {
        if count <= thresholds.low_max {
            PatternConfidence::Low
        } else if count <= thresholds.medium_max {
            PatternConfidence::Medium
        } else {
            PatternConfidence::High
        }
    }
}

/// Tunable project-count boundaries for confidence tiering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// Highest project count still considered low confidence.
    pub low_max: usize,
    /// Highest project count still considered medium confidence.
    pub medium_max: usize,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            low_max: 2,
            medium_max: 4,
        }
    }
}

/// Whether a pattern is live or has been overridden by a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Active,
    Overridden,
}

impl PatternStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternStatus::Active => "active",
            PatternStatus::Overridden => "overridden",
        }
    }

    pub fn parse(s: &str) -> crate::domain::Result<Self> {
        match s {
            "active" => Ok(PatternStatus::Active),
            "overridden" => Ok(PatternStatus::Overridden),
            other => Err(crate::domain::MemoryError::Validation(format!(
                "unknown pattern status: {other}"
            ))),
        }
    }
}

/// A generalization observed independently in two or more projects of a
/// workspace.
///
/// Invariant: `occurrence_count == source_project_ids.len()` at all times.
/// Patterns are created and updated by the pattern engine, overridden and
/// restored by human action, and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspacePattern {
    pub id: PatternId,
    pub workspace_id: String,
    pub pattern_type: PatternType,
    /// Representative text of the recurring observation.
    pub content: String,
    pub source_project_ids: Vec<String>,
    pub source_episode_ids: Vec<EpisodeId>,
    pub occurrence_count: usize,
    pub confidence: PatternConfidence,
    pub status: PatternStatus,
    pub overridden_by: Option<String>,
    pub override_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl WorkspacePattern {
    pub fn new(
        workspace_id: impl Into<String>,
        pattern_type: PatternType,
        content: impl Into<String>,
        source_project_ids: Vec<String>,
        source_episode_ids: Vec<EpisodeId>,
        thresholds: &ConfidenceThresholds,
    ) -> Self {
        let now = Utc::now();
        let mut distinct_projects = source_project_ids;
        distinct_projects.sort();
        distinct_projects.dedup();
        let occurrence_count = distinct_projects.len();
        Self {
            id: PatternId::new(),
            workspace_id: workspace_id.into(),
            pattern_type,
            content: content.into(),
            source_project_ids: distinct_projects,
            source_episode_ids,
            occurrence_count,
            confidence: PatternConfidence::from_project_count(occurrence_count, thresholds),
            status: PatternStatus::Active,
            overridden_by: None,
            override_reason: None,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    /// Fold additional evidence into the pattern, keeping the occurrence
    /// invariant and recomputing confidence.
    pub fn absorb(
        &mut self,
        project_ids: &[String],
        episode_ids: &[EpisodeId],
        thresholds: &ConfidenceThresholds,
    ) {
        for project in project_ids {
            if !self.source_project_ids.contains(project) {
                self.source_project_ids.push(project.clone());
            }
        }
        for episode in episode_ids {
            if !self.source_episode_ids.contains(episode) {
                self.source_episode_ids.push(*episode);
            }
        }
        self.occurrence_count = self.source_project_ids.len();
        self.confidence =
            PatternConfidence::from_project_count(self.occurrence_count, thresholds);
        self.updated_at = Utc::now();
    }

    pub fn mark_overridden(&mut self, by: impl Into<String>, reason: impl Into<String>) {
        self.status = PatternStatus::Overridden;
        self.overridden_by = Some(by.into());
        self.override_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    pub fn restore(&mut self) {
        self.status = PatternStatus::Active;
        self.overridden_by = None;
        self.override_reason = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(projects: Vec<&str>) -> WorkspacePattern {
        WorkspacePattern::new(
            "ws-1",
            PatternType::Architecture,
            "Use library X for feature Y",
            projects.into_iter().map(String::from).collect(),
            vec![EpisodeId::new()],
            &ConfidenceThresholds::default(),
        )
    }

    #[test]
    fn test_confidence_is_monotonic_in_project_count() {
        let thresholds = ConfidenceThresholds::default();
        let mut previous = PatternConfidence::Low;
        for count in 1..=8 {
            let tier = PatternConfidence::from_project_count(count, &thresholds);
            assert!(tier >= previous, "confidence must be non-decreasing");
            previous = tier;
        }
        assert_eq!(
            PatternConfidence::from_project_count(1, &thresholds),
            PatternConfidence::Low
        );
        assert_eq!(
            PatternConfidence::from_project_count(5, &thresholds),
            PatternConfidence::High
        );
    }

    #[test]
    fn test_occurrence_tracks_distinct_projects() {
        let p = pattern(vec!["a", "b", "b"]);
        assert_eq!(p.occurrence_count, 2);
        assert_eq!(p.occurrence_count, p.source_project_ids.len());
        assert_eq!(p.confidence, PatternConfidence::Low);
    }

    #[test]
    fn test_absorb_upgrades_confidence() {
        let mut p = pattern(vec!["a", "b"]);
        p.absorb(
            &["c".into(), "d".into(), "e".into()],
            &[EpisodeId::new()],
            &ConfidenceThresholds::default(),
        );
        assert_eq!(p.occurrence_count, 5);
        assert_eq!(p.confidence, PatternConfidence::High);
        assert_eq!(p.occurrence_count, p.source_project_ids.len());
    }

    #[test]
    fn test_override_and_restore() {
        let mut p = pattern(vec!["a", "b"]);
        p.mark_overridden("alice", "superseded by platform guideline");
        assert_eq!(p.status, PatternStatus::Overridden);
        assert_eq!(p.overridden_by.as_deref(), Some("alice"));
        p.restore();
        assert_eq!(p.status, PatternStatus::Active);
        assert!(p.overridden_by.is_none());
        assert!(p.override_reason.is_none());
    }
}
