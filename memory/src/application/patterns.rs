// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Cross-project pattern engine
//!
//! Mines recurring observations across the projects of a workspace. Recent
//! episodes are greedily clustered by keyword overlap, clusters spanning
//! multiple projects become (or reinforce) workspace patterns, and humans can
//! override patterns without losing them.

use chrono::Utc;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::text::{jaccard, keyword_set, keyword_similarity};
use crate::domain::{
    ConfidenceThresholds, Episode, EpisodeType, MemoryError, MemoryEvent, PatternConfidence,
    PatternId, PatternStatus, PatternType, Result, WorkspacePattern,
};
use crate::application::EventBus;
use crate::infrastructure::{EpisodeRepository, PatternFilter, PatternRepository};

/// Tuning for detection, matching and capping.
#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Recent episodes fetched per project per sweep.
    pub batch_size: usize,
    /// Keyword similarity at which two episodes cluster together.
    pub similarity_threshold: f64,
    /// Stricter similarity at which a cluster reinforces an existing pattern
    /// instead of creating a new one.
    pub existing_match_threshold: f64,
    /// Minimum episodes in a cluster before it can become a pattern.
    pub min_group_size: usize,
    /// Worst-case bound on pairwise comparisons per sweep.
    pub comparison_budget: usize,
    /// Maximum patterns stored per workspace.
    pub pattern_cap: usize,
    pub confidence: ConfidenceThresholds,
    /// Patterns surfaced by the adoption stats.
    pub stats_top_n: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            similarity_threshold: 0.7,
            existing_match_threshold: 0.85,
            min_group_size: 2,
            comparison_budget: 50_000,
            pattern_cap: 500,
            confidence: ConfidenceThresholds::default(),
            stats_top_n: 10,
        }
    }
}

/// Counters reported by one detection sweep.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    pub projects_scanned: usize,
    pub comparisons: usize,
    pub new_patterns: usize,
    pub updated_patterns: usize,
    /// True when the comparison budget cut the sweep short.
    pub truncated: bool,
    pub errors: Vec<String>,
}

/// An active pattern ranked against a task description.
#[derive(Debug, Clone)]
pub struct PatternRecommendation {
    pub pattern: WorkspacePattern,
    pub relevance: f64,
}

/// Aggregate view of how a workspace's patterns are faring.
#[derive(Debug, Clone, Default)]
pub struct AdoptionStats {
    pub total: usize,
    pub by_confidence: HashMap<PatternConfidence, usize>,
    pub by_type: HashMap<PatternType, usize>,
    /// overridden / (active + overridden)
    pub override_rate: f64,
    pub mean_occurrence: f64,
    pub top_patterns: Vec<WorkspacePattern>,
}

/// Keyword vocabularies used to classify a cluster into a pattern type.
static TYPE_VOCABULARIES: Lazy<Vec<(PatternType, HashSet<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            PatternType::Architecture,
            [
                "architecture", "service", "module", "layer", "interface", "api", "schema",
                "database", "cache", "queue", "event", "design", "dependency", "boundary",
            ]
            .into_iter()
            .collect(),
        ),
        (
            PatternType::Error,
            [
                "error", "bug", "crash", "failure", "exception", "timeout", "deadlock", "leak",
                "panic", "regression", "retry", "fix",
            ]
            .into_iter()
            .collect(),
        ),
        (
            PatternType::Testing,
            [
                "test", "tests", "testing", "coverage", "mock", "fixture", "assertion", "flaky",
                "integration", "unit", "e2e",
            ]
            .into_iter()
            .collect(),
        ),
        (
            PatternType::Deployment,
            [
                "deploy", "deployment", "release", "rollout", "rollback", "pipeline", "ci", "cd",
                "container", "docker", "kubernetes", "infra",
            ]
            .into_iter()
            .collect(),
        ),
        (
            PatternType::Security,
            [
                "security", "auth", "authentication", "authorization", "token", "secret",
                "credential", "encryption", "vulnerability", "cve", "permission",
            ]
            .into_iter()
            .collect(),
        ),
    ]
});

/// One in-progress cluster during a sweep. New episodes join by similarity to
/// the first member.
struct CandidateGroup<'a> {
    keywords: HashSet<String>,
    members: Vec<&'a Episode>,
}

/// Workspace-wide pattern mining and lifecycle management.
pub struct PatternEngine {
    episodes: Arc<dyn EpisodeRepository>,
    patterns: Arc<dyn PatternRepository>,
    event_bus: Arc<dyn EventBus>,
    config: PatternConfig,
}

impl PatternEngine {
    pub fn new(
        episodes: Arc<dyn EpisodeRepository>,
        patterns: Arc<dyn PatternRepository>,
        event_bus: Arc<dyn EventBus>,
        config: PatternConfig,
    ) -> Self {
        Self {
            episodes,
            patterns,
            event_bus,
            config,
        }
    }

    /// One detection sweep over a workspace.
    ///
    /// With fewer than two projects there is nothing cross-project to learn
    /// and the sweep is a no-op. Per-project fetch failures accumulate into
    /// the outcome; the sweep continues with the projects it has. A
    /// completion event fires on every sweep.
    pub async fn detect_patterns(&self, workspace_id: &str) -> Result<DetectionOutcome> {
        let started = std::time::Instant::now();
        let mut outcome = DetectionOutcome::default();

        let projects = match self.episodes.distinct_project_ids(workspace_id).await {
            Ok(projects) => projects,
            Err(err) => {
                warn!(workspace_id, error = %err, "project enumeration failed");
                outcome.errors.push(format!("project enumeration: {err}"));
                self.emit_completion(workspace_id, &outcome, started.elapsed().as_millis() as u64)
                    .await;
                return Ok(outcome);
            }
        };
        outcome.projects_scanned = projects.len();
        if projects.len() < 2 {
            debug!(workspace_id, projects = projects.len(), "nothing cross-project to learn");
            self.emit_completion(workspace_id, &outcome, started.elapsed().as_millis() as u64)
                .await;
            return Ok(outcome);
        }

        let mut pool: Vec<Episode> = Vec::new();
        for project in &projects {
            match self
                .episodes
                .recent_episodes_by_project(workspace_id, project, self.config.batch_size)
                .await
            {
                Ok(batch) => pool.extend(batch),
                Err(err) => {
                    warn!(workspace_id, project, error = %err, "episode batch fetch failed");
                    outcome.errors.push(format!("{project}: {err}"));
                }
            }
        }

        let groups = self.cluster(&pool, &mut outcome);
        self.persist_groups(workspace_id, groups, &mut outcome).await;

        info!(
            workspace_id,
            comparisons = outcome.comparisons,
            new_patterns = outcome.new_patterns,
            updated_patterns = outcome.updated_patterns,
            truncated = outcome.truncated,
            "pattern sweep finished"
        );
        self.emit_completion(workspace_id, &outcome, started.elapsed().as_millis() as u64)
            .await;
        Ok(outcome)
    }

    /// Greedy clustering: each episode joins the first group whose founding
    /// member it resembles, otherwise founds its own. The comparison budget
    /// stops the sweep early with whatever groups exist so far.
    fn cluster<'a>(
        &self,
        pool: &'a [Episode],
        outcome: &mut DetectionOutcome,
    ) -> Vec<CandidateGroup<'a>> {
        let mut groups: Vec<CandidateGroup<'a>> = Vec::new();
        'episodes: for episode in pool {
            let keywords = keyword_set(&episode.content);
            if keywords.is_empty() {
                continue;
            }
            for group in &mut groups {
                if outcome.comparisons >= self.config.comparison_budget {
                    outcome.truncated = true;
                    break 'episodes;
                }
                outcome.comparisons += 1;
                if jaccard(&keywords, &group.keywords) >= self.config.similarity_threshold {
                    group.members.push(episode);
                    continue 'episodes;
                }
            }
            groups.push(CandidateGroup {
                keywords,
                members: vec![episode],
            });
        }
        groups
    }

    /// Turn qualifying clusters into new or reinforced patterns.
    async fn persist_groups(
        &self,
        workspace_id: &str,
        groups: Vec<CandidateGroup<'_>>,
        outcome: &mut DetectionOutcome,
    ) {
        let existing = match self
            .patterns
            .list_patterns(workspace_id, &PatternFilter::any_status())
            .await
        {
            Ok(existing) => existing,
            Err(err) => {
                warn!(workspace_id, error = %err, "existing pattern fetch failed");
                outcome.errors.push(format!("pattern fetch: {err}"));
                return;
            }
        };
        let mut pattern_count = existing.len();
        let mut existing = existing;

        for group in groups {
            if group.members.len() < self.config.min_group_size {
                continue;
            }
            let project_ids: Vec<String> = group
                .members
                .iter()
                .map(|e| e.project_id.clone())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            if project_ids.len() < 2 {
                continue;
            }
            let representative = &group.members[0].content;
            let episode_ids: Vec<_> = group.members.iter().map(|e| e.id).collect();

            let matched = existing
                .iter()
                .enumerate()
                .map(|(idx, p)| (idx, keyword_similarity(representative, &p.content)))
                .filter(|(_, score)| *score >= self.config.existing_match_threshold)
                .max_by(|a, b| a.1.total_cmp(&b.1));

            match matched {
                Some((idx, _)) if existing[idx].status == PatternStatus::Overridden => {
                    // A human said no; neither reinforce nor re-create.
                    debug!(pattern = %existing[idx].id, "cluster matches an overridden pattern; skipping");
                }
                Some((idx, _)) => {
                    let pattern = &mut existing[idx];
                    pattern.absorb(&project_ids, &episode_ids, &self.config.confidence);
                    match self.patterns.update_pattern(pattern).await {
                        Ok(()) => outcome.updated_patterns += 1,
                        Err(err) => {
                            warn!(pattern = %pattern.id, error = %err, "pattern update failed");
                            outcome.errors.push(format!("update {}: {err}", pattern.id));
                        }
                    }
                }
                None => {
                    if pattern_count >= self.config.pattern_cap {
                        debug!(workspace_id, cap = self.config.pattern_cap, "pattern cap reached");
                        continue;
                    }
                    let pattern = WorkspacePattern::new(
                        workspace_id,
                        classify_group(&group),
                        representative.clone(),
                        project_ids,
                        episode_ids,
                        &self.config.confidence,
                    );
                    match self.patterns.create_pattern(&pattern).await {
                        Ok(()) => {
                            pattern_count += 1;
                            outcome.new_patterns += 1;
                            existing.push(pattern);
                        }
                        Err(err) => {
                            warn!(error = %err, "pattern create failed");
                            outcome.errors.push(format!("create: {err}"));
                        }
                    }
                }
            }
        }
    }

    /// Filtered pattern listing; defaults to active patterns only.
    pub async fn get_workspace_patterns(
        &self,
        workspace_id: &str,
        filter: &PatternFilter,
    ) -> Result<Vec<WorkspacePattern>> {
        self.patterns.list_patterns(workspace_id, filter).await
    }

    /// Active patterns ranked for a task: confidence tier first, keyword
    /// relevance second. Overridden patterns are never surfaced. Workspace
    /// patterns apply across the whole workspace, so `project_id` only
    /// identifies the asking project today.
    pub async fn get_pattern_recommendations(
        &self,
        workspace_id: &str,
        project_id: &str,
        task_description: &str,
    ) -> Result<Vec<PatternRecommendation>> {
        debug!(workspace_id, project_id, "ranking pattern recommendations");
        let active = self
            .patterns
            .list_patterns(workspace_id, &PatternFilter::default())
            .await?;
        let mut recommendations: Vec<PatternRecommendation> = active
            .into_iter()
            .filter_map(|pattern| {
                let relevance = keyword_similarity(task_description, &pattern.content);
                (relevance > 0.0).then_some(PatternRecommendation { pattern, relevance })
            })
            .collect();
        recommendations.sort_by(|a, b| {
            b.pattern
                .confidence
                .cmp(&a.pattern.confidence)
                .then(b.relevance.total_cmp(&a.relevance))
        });
        Ok(recommendations)
    }

    /// Mark a pattern overridden with attribution. Missing id is an error.
    pub async fn override_pattern(
        &self,
        id: &PatternId,
        overridden_by: &str,
        reason: &str,
    ) -> Result<WorkspacePattern> {
        let mut pattern = self
            .patterns
            .get_pattern(id)
            .await?
            .ok_or_else(|| MemoryError::not_found("pattern", id.to_string()))?;
        pattern.mark_overridden(overridden_by, reason);
        self.patterns.update_pattern(&pattern).await?;
        let event = MemoryEvent::PatternOverridden {
            pattern_id: *id,
            workspace_id: pattern.workspace_id.clone(),
            overridden_by: overridden_by.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        };
        if let Err(err) = self.event_bus.publish(event).await {
            warn!(error = %err, "failed to publish override event");
        }
        Ok(pattern)
    }

    /// Reactivate an overridden pattern. Missing id is an error.
    pub async fn restore_pattern(&self, id: &PatternId) -> Result<WorkspacePattern> {
        let mut pattern = self
            .patterns
            .get_pattern(id)
            .await?
            .ok_or_else(|| MemoryError::not_found("pattern", id.to_string()))?;
        pattern.restore();
        self.patterns.update_pattern(&pattern).await?;
        let event = MemoryEvent::PatternRestored {
            pattern_id: *id,
            workspace_id: pattern.workspace_id.clone(),
            timestamp: Utc::now(),
        };
        if let Err(err) = self.event_bus.publish(event).await {
            warn!(error = %err, "failed to publish restore event");
        }
        Ok(pattern)
    }

    /// Aggregate counts, override rate, mean occurrence and the top patterns
    /// by occurrence.
    pub async fn get_adoption_stats(&self, workspace_id: &str) -> Result<AdoptionStats> {
        let all = self
            .patterns
            .list_patterns(workspace_id, &PatternFilter::any_status())
            .await?;
        let mut stats = AdoptionStats {
            total: all.len(),
            ..AdoptionStats::default()
        };
        let mut overridden = 0usize;
        let mut occurrence_total = 0usize;
        for pattern in &all {
            *stats.by_confidence.entry(pattern.confidence).or_default() += 1;
            *stats.by_type.entry(pattern.pattern_type).or_default() += 1;
            occurrence_total += pattern.occurrence_count;
            if pattern.status == PatternStatus::Overridden {
                overridden += 1;
            }
        }
        if !all.is_empty() {
            stats.override_rate = overridden as f64 / all.len() as f64;
            stats.mean_occurrence = occurrence_total as f64 / all.len() as f64;
        }
        // Listing order is already occurrence-first.
        stats.top_patterns = all.into_iter().take(self.config.stats_top_n).collect();
        Ok(stats)
    }

    async fn emit_completion(
        &self,
        workspace_id: &str,
        outcome: &DetectionOutcome,
        duration_ms: u64,
    ) {
        let event = MemoryEvent::PatternDetectionCompleted {
            workspace_id: workspace_id.into(),
            projects_scanned: outcome.projects_scanned,
            comparisons: outcome.comparisons,
            new_patterns: outcome.new_patterns,
            updated_patterns: outcome.updated_patterns,
            truncated: outcome.truncated,
            duration_ms,
            errors: outcome.errors.clone(),
            timestamp: Utc::now(),
        };
        if let Err(err) = self.event_bus.publish(event).await {
            warn!(error = %err, "failed to publish detection event");
        }
    }
}

/// Keyword-bucket vote across the five type vocabularies. Ties go to the
/// first bucket in declaration order (architecture first). When no keyword
/// matches any vocabulary, fall back to the episode-type majority: clusters
/// of problems read as error patterns, everything else as architecture.
fn classify_group(group: &CandidateGroup<'_>) -> PatternType {
    let mut best: Option<(PatternType, usize)> = None;
    for (pattern_type, vocabulary) in TYPE_VOCABULARIES.iter() {
        let hits = group
            .keywords
            .iter()
            .filter(|k| vocabulary.contains(k.as_str()))
            .count();
        if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
            best = Some((*pattern_type, hits));
        }
    }
    if let Some((pattern_type, _)) = best {
        return pattern_type;
    }
    let problems = group
        .members
        .iter()
        .filter(|e| e.episode_type == EpisodeType::Problem)
        .count();
    if problems * 2 > group.members.len() {
        PatternType::Error
    } else {
        PatternType::Architecture
    }
}
