// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Graph-backed repository implementations
//!
//! Cypher over the [`GraphStore`] adapter. Node labels: `Episode`,
//! `EntityRef`, `MemorySummary`, `WorkspacePattern`, plus the `Project` /
//! `Workspace` anchors. Relationships: `BELONGS_TO`, `IN_WORKSPACE`,
//! `REFERENCES`, `SUMMARIZES`. Batch operations (entity linking, episode
//! archival) are single multi-row statements, never per-row round-trips.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use neo4rs::{query, BoltNull, BoltType, Query, Row};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    Episode, EpisodeFilter, EpisodeId, EpisodeMetadata, EpisodeType, MemoryError, MemorySummary,
    PatternConfidence, PatternId, PatternStatus, PatternType, Result, SummaryId, TenantScope,
    WorkspacePattern,
};
use crate::infrastructure::graph_store::GraphStore;
use crate::infrastructure::repository::{
    EpisodeRepository, PatternFilter, PatternRepository, SummaryRepository,
};

fn column<T: serde::de::DeserializeOwned>(row: &Row, name: &str) -> Result<T> {
    row.get::<T>(name)
        .map_err(|err| MemoryError::GraphUnavailable(format!("malformed column {name}: {err}")))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|err| MemoryError::GraphUnavailable(format!("malformed id {value}: {err}")))
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| MemoryError::GraphUnavailable(format!("timestamp out of range: {ms}")))
}

fn bolt_null() -> BoltType {
    BoltType::Null(BoltNull)
}

fn opt_string(value: Option<&String>) -> BoltType {
    match value {
        Some(s) => BoltType::from(s.clone()),
        None => bolt_null(),
    }
}

fn json_string<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|err| MemoryError::Validation(format!("unserializable metadata: {err}")))
}

const EPISODE_COLUMNS: &str = "e.id AS id, e.project_id AS project_id, \
     e.workspace_id AS workspace_id, e.story_id AS story_id, e.agent_type AS agent_type, \
     e.timestamp AS timestamp, e.episode_type AS episode_type, e.content AS content, \
     e.entities AS entities, e.confidence AS confidence, e.pinned AS pinned, \
     e.archived AS archived, e.archived_at AS archived_at, e.summary_id AS summary_id, \
     e.useful_count AS useful_count, e.not_useful_count AS not_useful_count, \
     e.duplicate_of AS duplicate_of, e.duplicate_score AS duplicate_score, \
     e.metadata_extra AS metadata_extra";

fn row_to_episode(row: &Row) -> Result<Episode> {
    let summary_id = column::<Option<String>>(row, "summary_id")?
        .map(|s| parse_uuid(&s).map(SummaryId))
        .transpose()?;
    let duplicate_of = column::<Option<String>>(row, "duplicate_of")?
        .map(|s| parse_uuid(&s).map(EpisodeId))
        .transpose()?;
    let archived_at = column::<Option<i64>>(row, "archived_at")?
        .map(millis_to_utc)
        .transpose()?;
    let extra_json: Option<String> = column(row, "metadata_extra")?;
    let extra = match extra_json.as_deref() {
        Some(json) if !json.is_empty() => serde_json::from_str(json)
            .map_err(|err| MemoryError::GraphUnavailable(format!("malformed metadata: {err}")))?,
        _ => Default::default(),
    };
    let metadata = EpisodeMetadata {
        pinned: column::<Option<bool>>(row, "pinned")?.unwrap_or(false),
        archived: column::<Option<bool>>(row, "archived")?.unwrap_or(false),
        archived_at,
        summary_id,
        useful_count: column::<Option<i64>>(row, "useful_count")?.unwrap_or(0).max(0) as u32,
        not_useful_count: column::<Option<i64>>(row, "not_useful_count")?
            .unwrap_or(0)
            .max(0) as u32,
        duplicate_of,
        duplicate_score: column::<Option<f64>>(row, "duplicate_score")?,
        extra,
    };
    Ok(Episode {
        id: EpisodeId(parse_uuid(&column::<String>(row, "id")?)?),
        project_id: column(row, "project_id")?,
        workspace_id: column(row, "workspace_id")?,
        story_id: column(row, "story_id")?,
        agent_type: column(row, "agent_type")?,
        timestamp: millis_to_utc(column(row, "timestamp")?)?,
        episode_type: EpisodeType::parse(&column::<String>(row, "episode_type")?)?,
        content: column(row, "content")?,
        entities: column::<Option<Vec<String>>>(row, "entities")?.unwrap_or_default(),
        confidence: column(row, "confidence")?,
        metadata,
    })
}

/// Episodes, entity references and their anchors in the graph.
pub struct GraphEpisodeRepository {
    store: Arc<GraphStore>,
}

impl GraphEpisodeRepository {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EpisodeRepository for GraphEpisodeRepository {
    async fn add_episode(&self, episode: &Episode) -> Result<()> {
        // One statement: anchors merged, node created, entity refs merged and
        // linked via UNWIND. An empty entity list simply produces no rows for
        // the trailing segment.
        let q = query(
            "MERGE (p:Project {id: $project_id}) \
             MERGE (w:Workspace {id: $workspace_id}) \
             CREATE (e:Episode {id: $id, project_id: $project_id, workspace_id: $workspace_id, \
                     story_id: $story_id, agent_type: $agent_type, timestamp: $timestamp, \
                     episode_type: $episode_type, content: $content, entities: $entities, \
                     confidence: $confidence, pinned: $pinned, archived: $archived, \
                     archived_at: null, summary_id: null, useful_count: $useful_count, \
                     not_useful_count: $not_useful_count, duplicate_of: $duplicate_of, \
                     duplicate_score: $duplicate_score, metadata_extra: $metadata_extra}) \
             MERGE (e)-[:BELONGS_TO]->(p) \
             MERGE (e)-[:IN_WORKSPACE]->(w) \
             WITH e \
             UNWIND $entity_names AS entity_name \
             MERGE (n:EntityRef {name: entity_name, project_id: $project_id, \
                    workspace_id: $workspace_id}) \
             ON CREATE SET n.id = randomUUID(), n.created_at = $timestamp \
             MERGE (e)-[:REFERENCES]->(n)",
        )
        .param("id", episode.id.to_string())
        .param("project_id", episode.project_id.clone())
        .param("workspace_id", episode.workspace_id.clone())
        .param("story_id", opt_string(episode.story_id.as_ref()))
        .param("agent_type", episode.agent_type.clone())
        .param("timestamp", episode.timestamp.timestamp_millis())
        .param("episode_type", episode.episode_type.as_str())
        .param("content", episode.content.clone())
        .param("entities", episode.entities.clone())
        .param("entity_names", episode.entities.clone())
        .param("confidence", episode.confidence)
        .param("pinned", episode.metadata.pinned)
        .param("archived", episode.metadata.archived)
        .param("useful_count", episode.metadata.useful_count as i64)
        .param("not_useful_count", episode.metadata.not_useful_count as i64)
        .param(
            "duplicate_of",
            opt_string(episode.metadata.duplicate_of.map(|d| d.to_string()).as_ref()),
        )
        .param(
            "duplicate_score",
            episode
                .metadata
                .duplicate_score
                .map(BoltType::from)
                .unwrap_or_else(bolt_null),
        )
        .param("metadata_extra", json_string(&episode.metadata.extra)?);
        self.store.run(q).await
    }

    async fn get_episode(&self, id: &EpisodeId) -> Result<Option<Episode>> {
        let q = query(&format!(
            "MATCH (e:Episode {{id: $id}}) RETURN {EPISODE_COLUMNS}"
        ))
        .param("id", id.to_string());
        let rows = self.store.execute(q).await?;
        rows.first().map(row_to_episode).transpose()
    }

    async fn search_episodes(&self, filter: &EpisodeFilter) -> Result<Vec<Episode>> {
        let mut conditions: Vec<&str> = Vec::new();
        if !filter.include_archived {
            conditions.push("NOT coalesce(e.archived, false)");
        }
        if filter.episode_types.is_some() {
            conditions.push("e.episode_type IN $types");
        }
        if filter.since.is_some() {
            conditions.push("e.timestamp >= $since");
        }
        if filter.entities.is_some() {
            conditions.push("any(name IN e.entities WHERE name IN $entity_names)");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {} ", conditions.join(" AND "))
        };
        let statement = format!(
            "MATCH (e:Episode {{project_id: $project_id, workspace_id: $workspace_id}}) \
             {where_clause}RETURN {EPISODE_COLUMNS} \
             ORDER BY e.timestamp DESC LIMIT $limit"
        );
        let mut q = query(&statement)
            .param("project_id", filter.project_id.clone())
            .param("workspace_id", filter.workspace_id.clone())
            .param("limit", filter.limit as i64);
        if let Some(types) = &filter.episode_types {
            let names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
            q = q.param("types", names);
        }
        if let Some(since) = filter.since {
            q = q.param("since", since.timestamp_millis());
        }
        if let Some(entities) = &filter.entities {
            q = q.param("entity_names", entities.clone());
        }
        let rows = self.store.execute(q).await?;
        rows.iter().map(row_to_episode).collect()
    }

    async fn delete_episode(&self, id: &EpisodeId) -> Result<()> {
        let q = query(
            "MATCH (e:Episode {id: $id}) DETACH DELETE e RETURN count(e) AS deleted",
        )
        .param("id", id.to_string());
        let rows = self.store.execute(q).await?;
        let deleted: i64 = rows.first().map(|r| column(r, "deleted")).transpose()?.unwrap_or(0);
        if deleted == 0 {
            return Err(MemoryError::not_found("episode", id.to_string()));
        }
        Ok(())
    }

    async fn archive_episodes(
        &self,
        ids: &[EpisodeId],
        summary_id: &SummaryId,
        archived_at: DateTime<Utc>,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        // Archive-not-delete: one batched SET plus SUMMARIZES links.
        let q = query(
            "MATCH (s:MemorySummary {id: $summary_id}) \
             UNWIND $ids AS episode_id \
             MATCH (e:Episode {id: episode_id}) \
             SET e.archived = true, e.archived_at = $archived_at, e.summary_id = $summary_id \
             MERGE (s)-[:SUMMARIZES]->(e) \
             RETURN count(e) AS archived",
        )
        .param("summary_id", summary_id.to_string())
        .param(
            "ids",
            ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        )
        .param("archived_at", archived_at.timestamp_millis());
        let rows = self.store.execute(q).await?;
        let archived: i64 = rows
            .first()
            .map(|r| column(r, "archived"))
            .transpose()?
            .unwrap_or(0);
        Ok(archived.max(0) as usize)
    }

    async fn count_episodes(&self, scope: &TenantScope, include_archived: bool) -> Result<usize> {
        let archived_clause = if include_archived {
            ""
        } else {
            "AND NOT coalesce(e.archived, false) "
        };
        let q = match scope {
            TenantScope::Project {
                project_id,
                workspace_id,
            } => {
                let statement = format!(
                    "MATCH (e:Episode) WHERE e.project_id = $project_id \
                     AND e.workspace_id = $workspace_id {archived_clause}\
                     RETURN count(e) AS total"
                );
                query(&statement)
                    .param("project_id", project_id.clone())
                    .param("workspace_id", workspace_id.clone())
            }
            TenantScope::Workspace { workspace_id } => {
                let statement = format!(
                    "MATCH (e:Episode) WHERE e.workspace_id = $workspace_id {archived_clause}\
                     RETURN count(e) AS total"
                );
                query(&statement).param("workspace_id", workspace_id.clone())
            }
        };
        let rows = self.store.execute(q).await?;
        let total: i64 = rows
            .first()
            .map(|r| column(r, "total"))
            .transpose()?
            .unwrap_or(0);
        Ok(total.max(0) as usize)
    }

    async fn distinct_project_ids(&self, workspace_id: &str) -> Result<Vec<String>> {
        let q = query(
            "MATCH (e:Episode {workspace_id: $workspace_id}) \
             RETURN DISTINCT e.project_id AS project_id ORDER BY project_id",
        )
        .param("workspace_id", workspace_id.to_string());
        let rows = self.store.execute(q).await?;
        rows.iter().map(|r| column(r, "project_id")).collect()
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
        let q = query(
            "MATCH (e:Episode {id: $id}) \
             SET e.pinned = $pinned, e.archived = $archived, e.archived_at = $archived_at, \
                 e.summary_id = $summary_id, e.useful_count = $useful_count, \
                 e.not_useful_count = $not_useful_count, e.duplicate_of = $duplicate_of, \
                 e.duplicate_score = $duplicate_score, e.metadata_extra = $metadata_extra \
             RETURN count(e) AS updated",
        )
        .param("id", id.to_string())
        .param("pinned", metadata.pinned)
        .param("archived", metadata.archived)
        .param(
            "archived_at",
            metadata
                .archived_at
                .map(|ts| BoltType::from(ts.timestamp_millis()))
                .unwrap_or_else(bolt_null),
        )
        .param(
            "summary_id",
            opt_string(metadata.summary_id.map(|s| s.to_string()).as_ref()),
        )
        .param("useful_count", metadata.useful_count as i64)
        .param("not_useful_count", metadata.not_useful_count as i64)
        .param(
            "duplicate_of",
            opt_string(metadata.duplicate_of.map(|d| d.to_string()).as_ref()),
        )
        .param(
            "duplicate_score",
            metadata
                .duplicate_score
                .map(BoltType::from)
                .unwrap_or_else(bolt_null),
        )
        .param("metadata_extra", json_string(&metadata.extra)?);
        let rows = self.store.execute(q).await?;
        let updated: i64 = rows
            .first()
            .map(|r| column(r, "updated"))
            .transpose()?
            .unwrap_or(0);
        if updated == 0 {
            return Err(MemoryError::not_found("episode", id.to_string()));
        }
        Ok(())
    }
}

const SUMMARY_COLUMNS: &str = "s.id AS id, s.project_id AS project_id, \
     s.workspace_id AS workspace_id, s.period_start AS period_start, \
     s.period_end AS period_end, s.original_episode_count AS original_episode_count, \
     s.summary AS summary, s.key_decisions AS key_decisions, s.key_patterns AS key_patterns, \
     s.archived_episode_ids AS archived_episode_ids, \
     s.summarization_model AS summarization_model, s.created_at AS created_at, \
     s.metadata AS metadata";

fn row_to_summary(row: &Row) -> Result<MemorySummary> {
    let archived_ids = column::<Option<Vec<String>>>(row, "archived_episode_ids")?
        .unwrap_or_default()
        .iter()
        .map(|s| parse_uuid(s).map(EpisodeId))
        .collect::<Result<Vec<_>>>()?;
    let metadata_json: Option<String> = column(row, "metadata")?;
    let metadata = match metadata_json.as_deref() {
        Some(json) if !json.is_empty() => serde_json::from_str(json)
            .map_err(|err| MemoryError::GraphUnavailable(format!("malformed metadata: {err}")))?,
        _ => Default::default(),
    };
    Ok(MemorySummary {
        id: SummaryId(parse_uuid(&column::<String>(row, "id")?)?),
        project_id: column(row, "project_id")?,
        workspace_id: column(row, "workspace_id")?,
        period_start: millis_to_utc(column(row, "period_start")?)?,
        period_end: millis_to_utc(column(row, "period_end")?)?,
        original_episode_count: column::<i64>(row, "original_episode_count")?.max(0) as usize,
        summary: column(row, "summary")?,
        key_decisions: column::<Option<Vec<String>>>(row, "key_decisions")?.unwrap_or_default(),
        key_patterns: column::<Option<Vec<String>>>(row, "key_patterns")?.unwrap_or_default(),
        archived_episode_ids: archived_ids,
        summarization_model: column(row, "summarization_model")?,
        created_at: millis_to_utc(column(row, "created_at")?)?,
        metadata,
    })
}

/// Consolidation summaries in the graph.
pub struct GraphSummaryRepository {
    store: Arc<GraphStore>,
}

impl GraphSummaryRepository {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SummaryRepository for GraphSummaryRepository {
    async fn upsert_summary(&self, summary: &MemorySummary) -> Result<MemorySummary> {
        // MERGE keyed on the period so concurrent runs converge on one node.
        let statement = format!(
            "MERGE (s:MemorySummary {{project_id: $project_id, workspace_id: $workspace_id, \
                    period_start: $period_start, period_end: $period_end}}) \
             ON CREATE SET s.id = $id, s.created_at = $created_at, \
                 s.original_episode_count = $count, s.summary = $summary, \
                 s.key_decisions = $key_decisions, s.key_patterns = $key_patterns, \
                 s.archived_episode_ids = $archived_ids, \
                 s.summarization_model = $model, s.metadata = $metadata \
             ON MATCH SET s.original_episode_count = s.original_episode_count + $count, \
                 s.summary = $summary, \
                 s.key_decisions = s.key_decisions + \
                     [d IN $key_decisions WHERE NOT d IN s.key_decisions], \
                 s.key_patterns = s.key_patterns + \
                     [p IN $key_patterns WHERE NOT p IN s.key_patterns], \
                 s.archived_episode_ids = s.archived_episode_ids + \
                     [i IN $archived_ids WHERE NOT i IN s.archived_episode_ids] \
             WITH s \
             MERGE (p:Project {{id: $project_id}}) \
             MERGE (w:Workspace {{id: $workspace_id}}) \
             MERGE (s)-[:BELONGS_TO]->(p) \
             MERGE (s)-[:IN_WORKSPACE]->(w) \
             RETURN {SUMMARY_COLUMNS}"
        );
        let q = query(&statement)
            .param("id", summary.id.to_string())
            .param("project_id", summary.project_id.clone())
            .param("workspace_id", summary.workspace_id.clone())
            .param("period_start", summary.period_start.timestamp_millis())
            .param("period_end", summary.period_end.timestamp_millis())
            .param("count", summary.original_episode_count as i64)
            .param("summary", summary.summary.clone())
            .param("key_decisions", summary.key_decisions.clone())
            .param("key_patterns", summary.key_patterns.clone())
            .param(
                "archived_ids",
                summary
                    .archived_episode_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>(),
            )
            .param("model", summary.summarization_model.clone())
            .param("created_at", summary.created_at.timestamp_millis())
            .param("metadata", json_string(&summary.metadata)?);
        let rows = self.store.execute(q).await?;
        let row = rows.first().ok_or_else(|| {
            MemoryError::GraphUnavailable("summary upsert returned no row".into())
        })?;
        row_to_summary(row)
    }

    async fn get_summary(
        &self,
        project_id: &str,
        workspace_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<MemorySummary>> {
        let q = query(&format!(
            "MATCH (s:MemorySummary {{project_id: $project_id, workspace_id: $workspace_id, \
                    period_start: $period_start, period_end: $period_end}}) \
             RETURN {SUMMARY_COLUMNS}"
        ))
        .param("project_id", project_id.to_string())
        .param("workspace_id", workspace_id.to_string())
        .param("period_start", period_start.timestamp_millis())
        .param("period_end", period_end.timestamp_millis());
        let rows = self.store.execute(q).await?;
        rows.first().map(row_to_summary).transpose()
    }

    async fn list_summaries(
        &self,
        project_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<MemorySummary>> {
        let q = query(&format!(
            "MATCH (s:MemorySummary {{project_id: $project_id, workspace_id: $workspace_id}}) \
             RETURN {SUMMARY_COLUMNS} ORDER BY s.period_start"
        ))
        .param("project_id", project_id.to_string())
        .param("workspace_id", workspace_id.to_string());
        let rows = self.store.execute(q).await?;
        rows.iter().map(row_to_summary).collect()
    }
}

const PATTERN_COLUMNS: &str = "p.id AS id, p.workspace_id AS workspace_id, \
     p.pattern_type AS pattern_type, p.content AS content, \
     p.source_project_ids AS source_project_ids, p.source_episode_ids AS source_episode_ids, \
     p.occurrence_count AS occurrence_count, p.confidence AS confidence, p.status AS status, \
     p.overridden_by AS overridden_by, p.override_reason AS override_reason, \
     p.created_at AS created_at, p.updated_at AS updated_at, p.metadata AS metadata";

fn row_to_pattern(row: &Row) -> Result<WorkspacePattern> {
    let episode_ids = column::<Option<Vec<String>>>(row, "source_episode_ids")?
        .unwrap_or_default()
        .iter()
        .map(|s| parse_uuid(s).map(EpisodeId))
        .collect::<Result<Vec<_>>>()?;
    let metadata_json: Option<String> = column(row, "metadata")?;
    let metadata = match metadata_json.as_deref() {
        Some(json) if !json.is_empty() => serde_json::from_str(json)
            .map_err(|err| MemoryError::GraphUnavailable(format!("malformed metadata: {err}")))?,
        _ => Default::default(),
    };
    Ok(WorkspacePattern {
        id: PatternId(parse_uuid(&column::<String>(row, "id")?)?),
        workspace_id: column(row, "workspace_id")?,
        pattern_type: PatternType::parse(&column::<String>(row, "pattern_type")?)?,
        content: column(row, "content")?,
        source_project_ids: column::<Option<Vec<String>>>(row, "source_project_ids")?
            .unwrap_or_default(),
        source_episode_ids: episode_ids,
        occurrence_count: column::<i64>(row, "occurrence_count")?.max(0) as usize,
        confidence: PatternConfidence::parse(&column::<String>(row, "confidence")?)?,
        status: PatternStatus::parse(&column::<String>(row, "status")?)?,
        overridden_by: column(row, "overridden_by")?,
        override_reason: column(row, "override_reason")?,
        created_at: millis_to_utc(column(row, "created_at")?)?,
        updated_at: millis_to_utc(column(row, "updated_at")?)?,
        metadata,
    })
}

/// Workspace patterns in the graph.
pub struct GraphPatternRepository {
    store: Arc<GraphStore>,
}

impl GraphPatternRepository {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    fn pattern_params(q: Query, pattern: &WorkspacePattern) -> Result<Query> {
        Ok(q.param("id", pattern.id.to_string())
            .param("workspace_id", pattern.workspace_id.clone())
            .param("pattern_type", pattern.pattern_type.as_str())
            .param("content", pattern.content.clone())
            .param("source_project_ids", pattern.source_project_ids.clone())
            .param(
                "source_episode_ids",
                pattern
                    .source_episode_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>(),
            )
            .param("occurrence_count", pattern.occurrence_count as i64)
            .param("confidence", pattern.confidence.as_str())
            .param("status", pattern.status.as_str())
            .param("overridden_by", opt_string(pattern.overridden_by.as_ref()))
            .param(
                "override_reason",
                opt_string(pattern.override_reason.as_ref()),
            )
            .param("created_at", pattern.created_at.timestamp_millis())
            .param("updated_at", pattern.updated_at.timestamp_millis())
            .param("metadata", json_string(&pattern.metadata)?))
    }
}

#[async_trait]
impl PatternRepository for GraphPatternRepository {
    async fn create_pattern(&self, pattern: &WorkspacePattern) -> Result<()> {
        let q = query(
            "MERGE (w:Workspace {id: $workspace_id}) \
             CREATE (p:WorkspacePattern {id: $id, workspace_id: $workspace_id, \
                     pattern_type: $pattern_type, content: $content, \
                     source_project_ids: $source_project_ids, \
                     source_episode_ids: $source_episode_ids, \
                     occurrence_count: $occurrence_count, confidence: $confidence, \
                     status: $status, overridden_by: $overridden_by, \
                     override_reason: $override_reason, created_at: $created_at, \
                     updated_at: $updated_at, metadata: $metadata}) \
             MERGE (p)-[:IN_WORKSPACE]->(w)",
        );
        self.store.run(Self::pattern_params(q, pattern)?).await
    }

    async fn update_pattern(&self, pattern: &WorkspacePattern) -> Result<()> {
        let q = query(
            "MATCH (p:WorkspacePattern {id: $id}) \
             SET p.pattern_type = $pattern_type, p.content = $content, \
                 p.source_project_ids = $source_project_ids, \
                 p.source_episode_ids = $source_episode_ids, \
                 p.occurrence_count = $occurrence_count, p.confidence = $confidence, \
                 p.status = $status, p.overridden_by = $overridden_by, \
                 p.override_reason = $override_reason, p.updated_at = $updated_at \
             RETURN count(p) AS updated",
        );
        let rows = self
            .store
            .execute(Self::pattern_params(q, pattern)?)
            .await?;
        let updated: i64 = rows
            .first()
            .map(|r| column(r, "updated"))
            .transpose()?
            .unwrap_or(0);
        if updated == 0 {
            return Err(MemoryError::not_found("pattern", pattern.id.to_string()));
        }
        Ok(())
    }

    async fn get_pattern(&self, id: &PatternId) -> Result<Option<WorkspacePattern>> {
        let q = query(&format!(
            "MATCH (p:WorkspacePattern {{id: $id}}) RETURN {PATTERN_COLUMNS}"
        ))
        .param("id", id.to_string());
        let rows = self.store.execute(q).await?;
        rows.first().map(row_to_pattern).transpose()
    }

    async fn list_patterns(
        &self,
        workspace_id: &str,
        filter: &PatternFilter,
    ) -> Result<Vec<WorkspacePattern>> {
        let mut conditions: Vec<&str> = Vec::new();
        if filter.pattern_type.is_some() {
            conditions.push("p.pattern_type = $pattern_type");
        }
        if filter.confidence.is_some() {
            conditions.push("p.confidence = $confidence");
        }
        if filter.status.is_some() {
            conditions.push("p.status = $status");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {} ", conditions.join(" AND "))
        };
        let limit_clause = if filter.limit.is_some() {
            " LIMIT $limit"
        } else {
            ""
        };
        let statement = format!(
            "MATCH (p:WorkspacePattern {{workspace_id: $workspace_id}}) \
             {where_clause}RETURN {PATTERN_COLUMNS} \
             ORDER BY p.occurrence_count DESC, p.updated_at DESC{limit_clause}"
        );
        let mut q = query(&statement).param("workspace_id", workspace_id.to_string());
        if let Some(pattern_type) = filter.pattern_type {
            q = q.param("pattern_type", pattern_type.as_str());
        }
        if let Some(confidence) = filter.confidence {
            q = q.param("confidence", confidence.as_str());
        }
        if let Some(status) = filter.status {
            q = q.param("status", status.as_str());
        }
        if let Some(limit) = filter.limit {
            q = q.param("limit", limit as i64);
        }
        let rows = self.store.execute(q).await?;
        rows.iter().map(row_to_pattern).collect()
    }

    async fn count_patterns(&self, workspace_id: &str) -> Result<usize> {
        let q = query(
            "MATCH (p:WorkspacePattern {workspace_id: $workspace_id}) \
             RETURN count(p) AS total",
        )
        .param("workspace_id", workspace_id.to_string());
        let rows = self.store.execute(q).await?;
        let total: i64 = rows
            .first()
            .map(|r| column(r, "total"))
            .transpose()?
            .unwrap_or(0);
        Ok(total.max(0) as usize)
    }
}
